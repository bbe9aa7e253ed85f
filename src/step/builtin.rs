//! Steps shipped with the engine

use async_trait::async_trait;
use serde_json::Value;

use super::{Step, StepContext, StepResult};
use crate::connection::Connection;
use crate::execution::RunOptions;
use crate::facts::{CommandRequired, IsFile, Local, Template, Validator};
use crate::transfer::TransferOutcome;

/// Run a shell command
pub struct RunCommand {
    command: String,
    options: RunOptions,
    requires: Vec<String>,
}

impl RunCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            options: RunOptions::default(),
            requires: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Fail validation unless `command` is on the host's `$PATH`
    pub fn requires(mut self, command: impl Into<String>) -> Self {
        self.requires.push(command.into());
        self
    }
}

#[async_trait]
impl Step for RunCommand {
    fn name(&self) -> String {
        format!("run `{}`", self.command)
    }

    fn validators(&self, _ctx: &StepContext<'_>) -> Vec<Box<dyn Validator>> {
        self.requires
            .iter()
            .map(|command| Box::new(CommandRequired::new(command.as_str())) as Box<dyn Validator>)
            .collect()
    }

    async fn run(&self, c: &dyn Connection, _ctx: &StepContext<'_>) -> crate::Result<StepResult> {
        let result = c.run(&self.command, &self.options).await?;
        Ok(StepResult {
            changed: true,
            msg: None,
            command: Some(result),
        })
    }
}

/// Upload a controller file
pub struct PutFile {
    src: String,
    dst: String,
}

impl PutFile {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

#[async_trait]
impl Step for PutFile {
    fn name(&self) -> String {
        format!("put {} -> {}", self.src, self.dst)
    }

    fn validators(&self, _ctx: &StepContext<'_>) -> Vec<Box<dyn Validator>> {
        vec![Box::new(Local::new(IsFile::new(self.src.as_str())))]
    }

    async fn run(&self, c: &dyn Connection, ctx: &StepContext<'_>) -> crate::Result<StepResult> {
        let outcome = ctx.transfer.put(&self.src, c, &self.dst).await?;
        Ok(transfer_result(outcome, &self.dst))
    }
}

/// Download a host file to the controller
pub struct GetFile {
    src: String,
    dst: String,
}

impl GetFile {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

#[async_trait]
impl Step for GetFile {
    fn name(&self) -> String {
        format!("get {} -> {}", self.src, self.dst)
    }

    fn validators(&self, _ctx: &StepContext<'_>) -> Vec<Box<dyn Validator>> {
        vec![Box::new(IsFile::new(self.src.as_str()))]
    }

    async fn run(&self, c: &dyn Connection, ctx: &StepContext<'_>) -> crate::Result<StepResult> {
        let outcome = ctx.transfer.get(c, &self.src, &self.dst).await?;
        Ok(transfer_result(outcome, &self.dst))
    }
}

/// Render a template on the controller and upload the result
pub struct PutTemplate {
    template: String,
    dst: String,
    vars: Value,
}

impl PutTemplate {
    pub fn new(template: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            dst: dst.into(),
            vars: Value::Object(Default::default()),
        }
    }

    /// Extra variables, taking precedence over the context's
    pub fn with_vars(mut self, vars: Value) -> Self {
        self.vars = vars;
        self
    }

    fn context(&self, ctx: &StepContext<'_>) -> Value {
        merge_vars(&ctx.vars, &self.vars)
    }
}

#[async_trait]
impl Step for PutTemplate {
    fn name(&self) -> String {
        format!("template {} -> {}", self.template, self.dst)
    }

    fn validators(&self, ctx: &StepContext<'_>) -> Vec<Box<dyn Validator>> {
        vec![Box::new(Template::new(
            ctx.renderer.clone(),
            self.template.as_str(),
            self.context(ctx),
        ))]
    }

    async fn run(&self, c: &dyn Connection, ctx: &StepContext<'_>) -> crate::Result<StepResult> {
        let outcome = ctx
            .transfer
            .put_template(ctx.renderer.as_ref(), &self.template, &self.context(ctx), c, &self.dst)
            .await?;
        Ok(transfer_result(outcome, &self.dst))
    }
}

fn transfer_result(outcome: TransferOutcome, path: &str) -> StepResult {
    match outcome {
        TransferOutcome::Unchanged => StepResult::changed(false).with_msg(format!("{path} is up to date")),
        TransferOutcome::Transferred { bytes } => {
            StepResult::changed(true).with_msg(format!("{path}: {bytes} bytes written"))
        }
    }
}

/// Shallow merge of two JSON objects, `extra` wins
fn merge_vars(base: &Value, extra: &Value) -> Value {
    match (base, extra) {
        (Value::Object(base), Value::Object(extra)) => {
            let mut merged = base.clone();
            merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        _ => extra.clone(),
    }
}
