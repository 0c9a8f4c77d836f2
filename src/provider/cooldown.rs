//! Provider cooldown (supplemented feature, SPEC_FULL §11): a lighter
//! signal than the circuit breaker's Open state, grounded on the
//! `CooldownConfig` exercised in `tests/provider_chaos.rs` — skip a
//! provider for a bit once it has racked up `failure_threshold` consecutive
//! failures, without going through the breaker's full state machine. The
//! agentic loop executor consults this as a cheap pre-filter before
//! `Circuit::allow()`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct CooldownConfig {
    pub cooldown_duration: Duration,
    pub failure_threshold: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_duration: Duration::from_secs(60),
            failure_threshold: 3,
        }
    }
}

struct Entry {
    consecutive_failures: u32,
    cooling_since: Option<Instant>,
}

/// Per-provider consecutive-failure tracker keyed by provider name.
pub struct CooldownTracker {
    config: CooldownConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl CooldownTracker {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True when `provider` should be skipped by the fallback walk.
    pub fn is_cooling(&self, provider: &str) -> bool {
        let mut entries = self.entries.lock().expect("cooldown mutex poisoned");
        match entries.get_mut(provider) {
            Some(entry) => match entry.cooling_since {
                Some(since) if since.elapsed() < self.config.cooldown_duration => true,
                Some(_) => {
                    entry.cooling_since = None;
                    entry.consecutive_failures = 0;
                    false
                }
                None => false,
            },
            None => false,
        }
    }

    pub fn record_success(&self, provider: &str) {
        let mut entries = self.entries.lock().expect("cooldown mutex poisoned");
        entries.remove(provider);
    }

    pub fn record_failure(&self, provider: &str) {
        let mut entries = self.entries.lock().expect("cooldown mutex poisoned");
        let entry = entries.entry(provider.to_string()).or_insert(Entry {
            consecutive_failures: 0,
            cooling_since: None,
        });
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.config.failure_threshold {
            entry.cooling_since = Some(Instant::now());
        }
    }
}
