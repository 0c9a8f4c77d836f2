//! Provider registry (spec module 4.B): name -> [`Provider`] lookup. The
//! trait itself is the only abstraction the executor depends on (spec §6).

pub mod candidate;
pub mod cooldown;
pub mod openai_compatible;
pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ProviderRequest, ProviderResult};
use crate::error::ProviderError;

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderResult, ProviderError>;

    /// Identical to `execute` except the request additionally advertises
    /// tool definitions; kept as a separate method (rather than an always-
    /// populated field) because providers without function calling support
    /// can implement only the plain path.
    async fn execute_with_tools(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResult, ProviderError>;
}

/// Name -> [`Provider`] table. Registration replaces on name collision;
/// enumeration returns the registered name set, matching module B's
/// contract in the spec.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: tokio::sync::RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, provider: Arc<dyn Provider>) {
        self.providers
            .write()
            .await
            .insert(provider.name().to_string(), provider);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.providers.read().await.keys().cloned().collect()
    }
}
