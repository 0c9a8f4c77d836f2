//! Per-provider circuit breaker and the registry that lazily creates one
//! per provider name (spec module 4.A).
//!
//! Grounded on the `CircuitBreakerConfig`/`CircuitState` shape exercised by
//! the teacher's own provider chaos test suite
//! (`tests/provider_chaos.rs`), adapted from a single-provider decorator
//! into the spec's standalone state machine consulted explicitly by the
//! candidate walk (module C / H) rather than wrapping a provider
//! transparently.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Circuit breaker state. Transitions are exactly Closed->Open (threshold),
/// Open->HalfOpen (elapsed `open_timeout`), HalfOpen->Closed (threshold
/// successes), HalfOpen->Open (any failure). No other transition exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub fail_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Normalizes zero/invalid fields to the documented defaults, since
    /// config sources (env, toml) may leave a field at its zero value
    /// rather than omitting it entirely.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.fail_threshold == 0 {
            self.fail_threshold = defaults.fail_threshold;
        }
        if self.success_threshold == 0 {
            self.success_threshold = defaults.success_threshold;
        }
        if self.open_timeout.is_zero() {
            self.open_timeout = defaults.open_timeout;
        }
        self
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
}

/// A single provider's breaker. All fields live behind one mutex (spec
/// concurrency invariant 3); `state()` may itself mutate state performing
/// the implicit Open->HalfOpen elapsed-time transition, so it takes the
/// same lock as the mutating operations.
pub struct Circuit {
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl Circuit {
    pub fn new(config: CircuitConfig) -> Self {
        let config = config.normalized();
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
                last_state_change: Utc::now(),
            }),
        }
    }

    fn elapsed_transition(inner: &mut Inner, config: &CircuitConfig) {
        if inner.state == CircuitState::Open {
            let elapsed = Utc::now().signed_duration_since(inner.last_state_change);
            if elapsed.to_std().unwrap_or(Duration::ZERO) >= config.open_timeout {
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                inner.last_state_change = Utc::now();
            }
        }
    }

    /// Closed: always true. Open: true only once `open_timeout` has
    /// elapsed, in which case this call itself performs the Open->HalfOpen
    /// transition. HalfOpen: true (single probe in flight is the caller's
    /// responsibility to serialize if desired; spec doesn't require it).
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit mutex poisoned");
        Self::elapsed_transition(&mut inner, &self.config);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit mutex poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.last_state_change = Utc::now();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit mutex poisoned");
        inner.last_failure = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.fail_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Utc::now();
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                inner.last_state_change = Utc::now();
            }
            CircuitState::Open => {}
        }
    }

    /// Idempotent observer; performs the same elapsed-time transition as
    /// `allow()`.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("circuit mutex poisoned");
        Self::elapsed_transition(&mut inner, &self.config);
        inner.state
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("circuit mutex poisoned");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.last_state_change = Utc::now();
    }

    pub fn status(&self) -> CircuitStatus {
        let mut inner = self.inner.lock().expect("circuit mutex poisoned");
        Self::elapsed_transition(&mut inner, &self.config);
        CircuitStatus {
            state: inner.state,
            failures: inner.consecutive_failures,
            last_failure: inner.last_failure,
            successes: (inner.state == CircuitState::HalfOpen)
                .then_some(inner.consecutive_successes),
        }
    }
}

/// Observability shape for one provider's breaker (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successes: Option<u32>,
}

/// Provider name -> [`Circuit`], created lazily on first reference and
/// living until process exit. Uses double-checked locking: a read-lock
/// lookup first, promoting to the write lock only on a miss, re-checking
/// after acquiring it (spec concurrency invariant 4).
#[derive(Default)]
pub struct CircuitRegistry {
    config: CircuitConfig,
    circuits: RwLock<HashMap<String, std::sync::Arc<Circuit>>>,
}

impl CircuitRegistry {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, provider: &str) -> std::sync::Arc<Circuit> {
        if let Some(existing) = self.circuits.read().await.get(provider) {
            return existing.clone();
        }
        let mut write = self.circuits.write().await;
        if let Some(existing) = write.get(provider) {
            return existing.clone();
        }
        let circuit = std::sync::Arc::new(Circuit::new(self.config));
        write.insert(provider.to_string(), circuit.clone());
        circuit
    }

    pub async fn status_snapshot(&self) -> std::collections::BTreeMap<String, CircuitStatus> {
        self.circuits
            .read()
            .await
            .iter()
            .map(|(name, circuit)| (name.clone(), circuit.status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fail: u32, success: u32, timeout: Duration) -> CircuitConfig {
        CircuitConfig {
            fail_threshold: fail,
            success_threshold: success,
            open_timeout: timeout,
        }
    }

    #[test]
    fn trips_open_after_fail_threshold_and_blocks_until_timeout() {
        let breaker = Circuit::new(config(2, 2, Duration::from_millis(30)));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(40));
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_single_failure_reopens() {
        let breaker = Circuit::new(config(1, 2, Duration::from_millis(10)));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = Circuit::new(config(1, 2, Duration::from_millis(10)));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn zero_config_fields_fall_back_to_defaults() {
        let breaker = Circuit::new(CircuitConfig {
            fail_threshold: 0,
            success_threshold: 0,
            open_timeout: Duration::ZERO,
        });
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed, "default threshold is 5");
    }

    #[tokio::test]
    async fn registry_creates_lazily_and_reuses_same_circuit() {
        let registry = CircuitRegistry::new(CircuitConfig::default());
        let a = registry.get_or_create("openai").await;
        let b = registry.get_or_create("openai").await;
        assert!(std::sync::Arc::ptr_eq(&a, &b));

        a.record_failure();
        assert_eq!(b.status().failures, 1);
    }
}
