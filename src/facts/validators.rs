//! Step preconditions, memoized through the fact cache

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

use super::cache::{FactCache, FactKey};
use super::probes;
use crate::connection::{Connection, LocalConnection};
use crate::host::LocalHost;
use crate::settings::ConnectSettings;
use crate::template::TemplateRenderer;

/// Checks whether a step can run against a connection
///
/// `Ok(None)` means the check passed, `Ok(Some(message))` explains why not.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>>;
}

/// Look `key` up, probing and recording it on a miss
async fn memoized<Fut>(facts: &FactCache, key: FactKey, probe: Fut) -> crate::Result<Option<String>>
where
    Fut: std::future::Future<Output = crate::Result<Option<String>>>,
{
    let (hit, value) = facts.try_get(&key);
    if hit {
        return Ok(value);
    }

    let value = probe.await?;
    facts.set(key, value.clone())?;
    Ok(value)
}

/// Requires `command` on the host's `$PATH`
pub struct CommandRequired {
    command: String,
}

impl CommandRequired {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn fact_id(&self) -> String {
        format!("path-{}-required", self.command)
    }
}

#[async_trait]
impl Validator for CommandRequired {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        let key = FactKey::new::<Self>(c.host(), self.fact_id());
        memoized(facts, key, async {
            let exists = probes::is_cmd_exist(c, &self.command).await?;
            Ok::<_, crate::Error>((!exists).then(|| format!("'{}' is required", self.command)))
        })
        .await
    }
}

pub struct IsFile {
    path: String,
}

impl IsFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn fact_id(&self) -> String {
        format!("isfile-{}", self.path)
    }
}

#[async_trait]
impl Validator for IsFile {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        let key = FactKey::new::<Self>(c.host(), self.fact_id());
        memoized(facts, key, async {
            let exists = probes::is_file(c, &self.path).await?;
            Ok::<_, crate::Error>((!exists).then(|| format!("'{}' is not file", self.path)))
        })
        .await
    }
}

pub struct IsDirectory {
    path: String,
}

impl IsDirectory {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn fact_id(&self) -> String {
        format!("is_directory-{}", self.path)
    }
}

#[async_trait]
impl Validator for IsDirectory {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        let key = FactKey::new::<Self>(c.host(), self.fact_id());
        memoized(facts, key, async {
            let exists = probes::is_directory(c, &self.path).await?;
            Ok::<_, crate::Error>((!exists).then(|| format!("'{}' is not directory", self.path)))
        })
        .await
    }
}

type InlineCheck =
    Box<dyn for<'a> Fn(&'a dyn Connection) -> BoxFuture<'a, crate::Result<Option<String>>> + Send + Sync>;

/// Ad-hoc check from a closure, cached only when given a fact id
pub struct Inline {
    fact_id: Option<String>,
    check: InlineCheck,
}

impl Inline {
    pub fn new<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Connection) -> BoxFuture<'a, crate::Result<Option<String>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            fact_id: None,
            check: Box::new(check),
        }
    }

    pub fn cached_as(mut self, fact_id: impl Into<String>) -> Self {
        self.fact_id = Some(fact_id.into());
        self
    }
}

#[async_trait]
impl Validator for Inline {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        match &self.fact_id {
            Some(fact_id) => {
                let key = FactKey::new::<Self>(c.host(), fact_id.clone());
                memoized(facts, key, (self.check)(c)).await
            }
            None => (self.check)(c).await,
        }
    }
}

/// Passes exactly when the inner validator fails
pub struct Not {
    validator: Box<dyn Validator>,
    error_message: String,
}

impl Not {
    pub fn new(validator: impl Validator + 'static, error_message: impl Into<String>) -> Self {
        Self {
            validator: Box::new(validator),
            error_message: error_message.into(),
        }
    }
}

#[async_trait]
impl Validator for Not {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        Ok(match self.validator.validate(c, facts).await? {
            Some(_) => None,
            None => Some(self.error_message.clone()),
        })
    }
}

/// Passes when any inner validator passes, checked in order
pub struct Or {
    validators: Vec<Box<dyn Validator>>,
    error_message: String,
}

impl Or {
    pub fn new(validators: Vec<Box<dyn Validator>>, error_message: impl Into<String>) -> Self {
        Self {
            validators,
            error_message: error_message.into(),
        }
    }
}

#[async_trait]
impl Validator for Or {
    async fn validate(&self, c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        for validator in &self.validators {
            if validator.validate(c, facts).await?.is_none() {
                return Ok(None);
            }
        }
        Ok(Some(self.error_message.clone()))
    }
}

/// Runs the inner validator against the controller instead of the target
pub struct Local {
    validator: Box<dyn Validator>,
    connection: LocalConnection,
}

impl Local {
    pub fn new(validator: impl Validator + 'static) -> Self {
        Self {
            validator: Box::new(validator),
            connection: LocalConnection::new(LocalHost::new(), &ConnectSettings::without_ssh_config()),
        }
    }
}

#[async_trait]
impl Validator for Local {
    async fn validate(&self, _c: &dyn Connection, facts: &FactCache) -> crate::Result<Option<String>> {
        self.validator.validate(&self.connection, facts).await
    }
}

/// Checks that a template renders; never cached
pub struct Template {
    renderer: Arc<dyn TemplateRenderer>,
    template_path: String,
    context: Value,
}

impl Template {
    pub fn new(
        renderer: Arc<dyn TemplateRenderer>,
        template_path: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            renderer,
            template_path: template_path.into(),
            context,
        }
    }
}

#[async_trait]
impl Validator for Template {
    async fn validate(&self, _c: &dyn Connection, _facts: &FactCache) -> crate::Result<Option<String>> {
        Ok(self
            .renderer
            .render(&self.template_path, &self.context)
            .err()
            .map(|e| e.to_string()))
    }
}
