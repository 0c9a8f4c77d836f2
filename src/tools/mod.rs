//! Tool registry: name -> [`ToolDef`] lookup with idempotent registration.
//!
//! Mirrors the concurrent-read-friendly registry shape the teacher uses for
//! its built-in tool table, keyed by name instead of by struct identity so
//! re-registration (hot-reloading a skill, re-running setup) replaces
//! cleanly.

pub mod policy;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::context::JobContext;
use crate::error::ToolError;

/// `(ctx, raw_json_input) -> (result_text, error)`. Handlers own their own
/// input validation; the registry never pre-validates against the
/// advertised schema (see [`ToolDef::schema`]).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &JobContext, input: Value) -> Result<String, ToolError>;
}

/// A tool's identity, advertised schema, and handler.
///
/// Identity is the name; two `ToolDef`s with the same name are the same
/// tool as far as the registry and policy resolver are concerned.
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub handler: Arc<dyn Handler>,
    pub builtin: bool,
    pub require_auth: bool,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
            builtin: false,
            require_auth: false,
        }
    }

    pub fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    pub fn require_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("builtin", &self.builtin)
            .field("require_auth", &self.require_auth)
            .finish()
    }
}

/// Name -> [`ToolDef`] table. Concurrent reads via [`tokio::sync::RwLock`];
/// registration takes the write lock and replaces on name collision ("last
/// write wins"), matching the spec's registration contract.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDef>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, def: ToolDef) {
        self.tools.write().await.insert(def.name.clone(), def);
    }

    pub async fn get(&self, name: &str) -> Option<ToolDef> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// All registered names. Used by the "full" profile's wildcard
    /// resolution, taken at policy-evaluation time rather than cached, so a
    /// tool registered after startup is still covered.
    pub async fn names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }
}
