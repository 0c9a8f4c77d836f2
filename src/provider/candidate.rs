//! Ordered fallback provider list from (config, task, role) (spec module
//! 4.C).

use crate::config::Config;
use crate::domain::Task;
use crate::error::ProviderError;

/// Builds the ordered, deduplicated candidate list the executor walks.
pub struct CandidateBuilder;

impl CandidateBuilder {
    /// 1. Primary = first non-empty of {task.provider, role.provider,
    ///    cfg.default_provider}.
    /// 2. Append role.fallback_providers in order (if role present).
    /// 3. Append cfg.fallback_providers in order.
    /// 4. Dedup, preserving first occurrence.
    ///
    /// Returns a config error (not attempted execution) when no primary is
    /// resolvable.
    pub fn build(config: &Config, task: &Task, role_id: Option<&str>) -> Result<Vec<String>, ProviderError> {
        let role = role_id.and_then(|id| config.roles.get(id));

        let primary = task
            .provider_hint
            .clone()
            .or_else(|| role.and_then(|r| r.provider.clone()))
            .or_else(|| config.providers.default_provider.clone());

        let Some(primary) = primary else {
            return Err(ProviderError::NoCandidates(
                "no default provider configured and task/role named none".to_string(),
            ));
        };

        let mut ordered = vec![primary];
        if let Some(role) = role {
            ordered.extend(role.fallback_providers.iter().cloned());
        }
        ordered.extend(config.providers.fallback_providers.iter().cloned());

        Ok(dedup_preserve_order(ordered))
    }
}

fn dedup_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
