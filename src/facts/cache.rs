//! Process-wide memo of probed facts

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

use crate::host::Host;

static GLOBAL: Lazy<FactCache> = Lazy::new(FactCache::new);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Broken fact cache: '{key}' is already populated")]
    AlreadyPopulated { key: String },
}

/// Identity of one cached fact: who probed, on which host, for what
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    validator: &'static str,
    host: String,
    fact_id: String,
}

impl FactKey {
    pub fn new<V: ?Sized>(host: &Host, fact_id: impl Into<String>) -> Self {
        Self {
            validator: std::any::type_name::<V>(),
            host: host.addr().to_string(),
            fact_id: fact_id.into(),
        }
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.validator, self.host, self.fact_id)
    }
}

/// Write-once cache of validator outcomes
///
/// An absent value (`None`) is a cached outcome like any other. Entries live
/// as long as the cache and are never invalidated, so a step that changes a
/// probed fact must not rely on reading it back here.
#[derive(Debug, Default)]
pub struct FactCache {
    entries: Mutex<HashMap<FactKey, Option<String>>>,
}

impl FactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by the whole process
    pub fn global() -> &'static FactCache {
        &GLOBAL
    }

    /// `(hit, value)`; `value` is `None` both on a miss and for a cached absence
    pub fn try_get(&self, key: &FactKey) -> (bool, Option<String>) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(value) => (true, value.clone()),
            None => (false, None),
        }
    }

    /// Store `value` under `key`; a second write to the same key is an error
    pub fn set(&self, key: FactKey, value: Option<String>) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&key) {
            return Err(CacheError::AlreadyPopulated {
                key: key.to_string(),
            });
        }
        entries.insert(key, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
