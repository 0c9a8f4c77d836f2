//! Repeated/alternating tool-call pattern detection (spec module 4.F).
//!
//! Single-task-scoped: a fresh `LoopDetector` is created per
//! [`crate::executor::AgenticLoopExecutor`] run and never shared across
//! tasks (spec concurrency invariant 7).

use std::collections::VecDeque;

/// A canonical fingerprint of a tool call's JSON input: keys sorted
/// recursively, no insignificant whitespace, so two structurally identical
/// inputs fingerprint the same regardless of key order.
pub fn fingerprint(input: &serde_json::Value) -> String {
    canonicalize(input).to_string()
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    fingerprint: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopDetectorConfig {
    pub max_history: usize,
    pub repeat_threshold: usize,
    pub pattern_scan_window: usize,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            repeat_threshold: 3,
            pattern_scan_window: 6,
        }
    }
}

pub struct LoopDetector {
    config: LoopDetectorConfig,
    history: VecDeque<Entry>,
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    pub fn record(&mut self, name: &str, input: &serde_json::Value) {
        self.history.push_back(Entry {
            name: name.to_string(),
            fingerprint: fingerprint(input),
        });
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }
    }

    /// Checks whether the *next* call `(name, input)` would complete either
    /// a same-call-repeated run or an A,B,A,B,… alternation, given the
    /// history recorded so far. Call `record` first, then `check`, so the
    /// call under test is itself part of the window being scanned.
    pub fn check(&self, name: &str, input: &serde_json::Value) -> Option<String> {
        let _ = (name, input);
        if let Some(msg) = self.check_repeat() {
            return Some(msg);
        }
        self.check_alternation()
    }

    fn check_repeat(&self) -> Option<String> {
        let threshold = self.config.repeat_threshold;
        if self.history.len() < threshold {
            return None;
        }
        let tail: Vec<&Entry> = self.history.iter().rev().take(threshold).collect();
        let first = tail[0];
        if tail.iter().all(|e| e.name == first.name && e.fingerprint == first.fingerprint) {
            Some(format!(
                "loop detected: tool `{}` repeated {} times with identical input",
                first.name, threshold
            ))
        } else {
            None
        }
    }

    fn check_alternation(&self) -> Option<String> {
        let window = self.config.pattern_scan_window;
        if self.history.len() < window || window < 2 {
            return None;
        }
        // tail[0] is the most recent call; a strict A,B,A,B,... alternation
        // read backwards is still A,B,A,B,... with parity unchanged.
        let tail: Vec<&Entry> = self.history.iter().rev().take(window).collect();
        let a = tail[0];
        let b = tail[1];
        if a == b {
            return None;
        }
        let alternates = tail
            .iter()
            .enumerate()
            .all(|(i, entry)| *entry == if i % 2 == 0 { a } else { b });
        if alternates {
            Some(format!(
                "pattern detected: `{}` <-> `{}` alternation over {} calls",
                a.name, b.name, window
            ))
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
