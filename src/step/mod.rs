//! Units of work executed against one connection
//!
//! [`run_steps`] opens a scoped connection to a host, checks every step's
//! validators and runs the steps in declared order. The connection is closed
//! on every exit path.

pub mod builtin;

pub use builtin::{GetFile, PutFile, PutTemplate, RunCommand};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::Error;
use crate::execution::CommandResult;
use crate::facts::{FactCache, Validator};
use crate::host::Host;
use crate::settings::ConnectSettings;
use crate::template::{HandlebarsRenderer, TemplateRenderer};
use crate::transfer::FileTransfer;

/// Everything a step may need besides its connection
pub struct StepContext<'a> {
    pub settings: &'a ConnectSettings,
    pub facts: &'a FactCache,
    pub transfer: FileTransfer,
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Variables available to templates
    pub vars: Value,
}

impl<'a> StepContext<'a> {
    pub fn new(settings: &'a ConnectSettings, facts: &'a FactCache) -> Self {
        Self {
            settings,
            facts,
            transfer: FileTransfer::new(settings),
            renderer: Arc::new(HandlebarsRenderer::default()),
            vars: Value::Object(Default::default()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_vars(mut self, vars: Value) -> Self {
        self.vars = vars;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepResult {
    pub changed: bool,
    pub msg: Option<String>,
    pub command: Option<CommandResult>,
}

impl StepResult {
    pub fn changed(changed: bool) -> Self {
        Self {
            changed,
            ..Self::default()
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> String;

    /// Preconditions checked before `run`
    fn validators(&self, _ctx: &StepContext<'_>) -> Vec<Box<dyn Validator>> {
        Vec::new()
    }

    /// Error messages of every failing validator
    async fn validate(&self, c: &dyn Connection, ctx: &StepContext<'_>) -> crate::Result<Vec<String>> {
        let mut errors = Vec::new();
        for validator in self.validators(ctx) {
            if let Some(message) = validator.validate(c, ctx.facts).await? {
                errors.push(message);
            }
        }
        Ok(errors)
    }

    async fn run(&self, c: &dyn Connection, ctx: &StepContext<'_>) -> crate::Result<StepResult>;
}

/// Check every step's preconditions on `c` without running anything
pub async fn validate_all(
    c: &dyn Connection,
    steps: &[Box<dyn Step>],
    ctx: &StepContext<'_>,
) -> crate::Result<()> {
    for step in steps {
        let errors = step.validate(c, ctx).await?;
        if !errors.is_empty() {
            return Err(Error::Validation {
                step: step.name(),
                host: c.host().addr().to_string(),
                errors,
            });
        }
    }
    Ok(())
}

async fn execute(
    c: &dyn Connection,
    steps: &[Box<dyn Step>],
    ctx: &StepContext<'_>,
) -> crate::Result<Vec<StepResult>> {
    let mut results = Vec::with_capacity(steps.len());
    for step in steps {
        info!("{} {}", c.host(), step.name());
        let result = step.run(c, ctx).await?;
        debug!("{} finished (changed: {})", step.name(), result.changed);
        results.push(result);
    }
    Ok(results)
}

/// Validate every step, then run them in order on an already open connection
pub async fn run_on(
    c: &dyn Connection,
    steps: &[Box<dyn Step>],
    ctx: &StepContext<'_>,
) -> crate::Result<Vec<StepResult>> {
    validate_all(c, steps, ctx).await?;
    execute(c, steps, ctx).await
}

/// Open a connection to `host`, run `steps` and close it again
pub async fn run_steps(
    host: &Host,
    steps: &[Box<dyn Step>],
    ctx: &StepContext<'_>,
) -> crate::Result<Vec<StepResult>> {
    let mut results = run_task(&[host], steps, ctx).await?;
    Ok(results.pop().map(|(_, r)| r).unwrap_or_default())
}

/// Run `steps` on each host in turn
///
/// All hosts are connected and every step validated on every host before
/// the first step runs. Execution stops at the first failure.
pub async fn run_task(
    hosts: &[&Host],
    steps: &[Box<dyn Step>],
    ctx: &StepContext<'_>,
) -> crate::Result<Vec<(String, Vec<StepResult>)>> {
    let mut connections = Vec::with_capacity(hosts.len());
    for host in hosts {
        match host.connect(ctx.settings) {
            Ok(connection) => connections.push(connection),
            Err(e) => return close_all(connections, Err(e.into())).await,
        }
    }

    let outcome = validate_then_execute(&connections, steps, ctx).await;
    close_all(connections, outcome).await
}

async fn validate_then_execute(
    connections: &[Box<dyn Connection>],
    steps: &[Box<dyn Step>],
    ctx: &StepContext<'_>,
) -> crate::Result<Vec<(String, Vec<StepResult>)>> {
    for connection in connections {
        validate_all(connection.as_ref(), steps, ctx).await?;
    }

    let mut results = Vec::with_capacity(connections.len());
    for connection in connections {
        let host_results = execute(connection.as_ref(), steps, ctx).await?;
        results.push((connection.host().addr().to_string(), host_results));
    }
    Ok(results)
}

async fn close_all<T>(
    connections: Vec<Box<dyn Connection>>,
    outcome: crate::Result<T>,
) -> crate::Result<T> {
    let mut close_error = None;
    for connection in connections.iter().rev() {
        if let Err(e) = connection.close().await {
            warn!("Failed to close connection to {}: {}", connection.host(), e);
            if close_error.is_none() {
                close_error = Some(e);
            }
        }
    }

    match close_error {
        // A step failure is more useful to report than the close failure
        Some(e) if outcome.is_ok() => Err(e.into()),
        _ => outcome,
    }
}
