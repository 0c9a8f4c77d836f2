//! Priority-tiered, deduped, batched notification delivery (spec module
//! 4.K).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct NotifyMessage {
    pub text: String,
    pub priority: Priority,
    pub event_type: String,
    pub role: Option<String>,
}

/// One delivery channel. `min_priority` is the lowest priority this
/// notifier accepts; the engine filters before calling `deliver`.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn min_priority(&self) -> Priority;
    async fn deliver(&self, message: &NotifyMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct DedupKey {
    event_type: String,
    role: Option<String>,
}

/// Priority-tiered, deduped, batched delivery. Critical/High deliver
/// synchronously on `notify()`; Normal/Low buffer (second arrival for the
/// same `(event_type, role)` key within the batch window is dropped) and
/// go out on the next `flush()`.
pub struct NotificationEngine {
    notifiers: Vec<Box<dyn Notifier>>,
    buffer: Mutex<HashMap<DedupKey, NotifyMessage>>,
    batch_interval: Duration,
}

impl NotificationEngine {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>, batch_interval: Duration) -> Self {
        Self {
            notifiers,
            buffer: Mutex::new(HashMap::new()),
            batch_interval,
        }
    }

    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    pub async fn notify(&self, message: NotifyMessage) -> Result<(), NotifyError> {
        match message.priority {
            Priority::Critical | Priority::High => self.deliver_to_all(&message).await,
            Priority::Normal | Priority::Low => {
                let key = DedupKey {
                    event_type: message.event_type.clone(),
                    role: message.role.clone(),
                };
                self.buffer
                    .lock()
                    .expect("notify buffer mutex poisoned")
                    .insert(key, message);
                Ok(())
            }
        }
    }

    async fn deliver_to_all(&self, message: &NotifyMessage) -> Result<(), NotifyError> {
        for notifier in &self.notifiers {
            if notifier.min_priority() <= message.priority {
                notifier.deliver(message).await?;
            }
        }
        Ok(())
    }

    /// Renders the buffer as a single "Digest — N notifications" message
    /// and delivers it, then clears the buffer. Takes the lock only long
    /// enough to move the buffered messages into a local vec (spec
    /// concurrency invariant 6).
    pub async fn flush(&self) -> Result<usize, NotifyError> {
        let drained: Vec<NotifyMessage> = {
            let mut buffer = self.buffer.lock().expect("notify buffer mutex poisoned");
            buffer.drain().map(|(_, v)| v).collect()
        };
        if drained.is_empty() {
            return Ok(0);
        }
        let count = drained.len();
        let digest = NotifyMessage {
            text: format!(
                "Digest — {count} notifications\n{}",
                drained
                    .iter()
                    .map(|m| format!("- {}", m.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            priority: drained.iter().map(|m| m.priority).max().unwrap_or(Priority::Normal),
            event_type: "digest".to_string(),
            role: None,
        };
        self.deliver_to_all(&digest).await?;
        Ok(count)
    }

    /// Final flush on shutdown.
    pub async fn stop(&self) -> Result<usize, NotifyError> {
        self.flush().await
    }
}

/// Keyword table classifying free text into a priority, used by
/// [`wrap_notify_fn`] to adapt a `(text) -> ()` notifier that can't supply
/// a priority itself. Data-driven rather than branching logic so the list
/// stays the one place to tune (spec design note on keeping the matcher
/// configurable in spirit).
const PRIORITY_KEYWORDS: &[(&str, Priority)] = &[
    ("critical", Priority::Critical),
    ("down", Priority::Critical),
    ("error", Priority::High),
    ("fail", Priority::High),
];

pub fn infer_priority(text: &str, default: Priority) -> Priority {
    let lower = text.to_lowercase();
    PRIORITY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, priority)| *priority)
        .unwrap_or(default)
}

/// Event type is needed for Normal/Low dedup; callers without one get a
/// generic bucket assigned by keyword so messages are still deduplicable.
pub fn infer_event_type(text: &str) -> String {
    let lower = text.to_lowercase();
    if lower.contains("error") || lower.contains("fail") {
        "failure".to_string()
    } else {
        "general".to_string()
    }
}

/// Adapts a simple `(text) -> ()` notifier so callers that cannot supply a
/// priority/event-type still benefit from the engine's dedup and batching.
pub async fn wrap_notify_fn(
    engine: &NotificationEngine,
    text: impl Into<String>,
    default_priority: Priority,
    role: Option<String>,
) -> Result<(), NotifyError> {
    let text = text.into();
    let priority = infer_priority(&text, default_priority);
    let event_type = infer_event_type(&text);
    engine
        .notify(NotifyMessage {
            text,
            priority,
            event_type,
            role,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        min_priority: Priority,
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for Counting {
        fn min_priority(&self) -> Priority {
            self.min_priority
        }
        async fn deliver(&self, _message: &NotifyMessage) -> Result<(), NotifyError> {
            self.count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn msg(priority: Priority, event_type: &str, role: Option<&str>) -> NotifyMessage {
        NotifyMessage {
            text: "hello".to_string(),
            priority,
            event_type: event_type.to_string(),
            role: role.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn critical_and_high_deliver_synchronously() {
        let count = Arc::new(AtomicUsize::new(0));
        let engine = NotificationEngine::new(
            vec![Box::new(Counting { min_priority: Priority::Low, count: count.clone() })],
            Duration::from_secs(300),
        );

        engine.notify(msg(Priority::Critical, "x", None)).await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
        engine.notify(msg(Priority::High, "x", None)).await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn normal_priority_is_buffered_not_delivered_until_flush() {
        let count = Arc::new(AtomicUsize::new(0));
        let engine = NotificationEngine::new(
            vec![Box::new(Counting { min_priority: Priority::Low, count: count.clone() })],
            Duration::from_secs(300),
        );

        engine.notify(msg(Priority::Normal, "x", None)).await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 0);

        let flushed = engine.flush().await.unwrap();
        assert_eq!(flushed, 1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn duplicate_event_type_role_key_collapses_to_one_buffered_entry() {
        let count = Arc::new(AtomicUsize::new(0));
        let engine = NotificationEngine::new(
            vec![Box::new(Counting { min_priority: Priority::Low, count: count.clone() })],
            Duration::from_secs(300),
        );

        engine.notify(msg(Priority::Low, "heartbeat", Some("dev"))).await.unwrap();
        engine.notify(msg(Priority::Low, "heartbeat", Some("dev"))).await.unwrap();
        engine.notify(msg(Priority::Low, "heartbeat", Some("ops"))).await.unwrap();

        let flushed = engine.flush().await.unwrap();
        assert_eq!(flushed, 2, "dev dedup collapses to one; ops is distinct");
    }

    #[tokio::test]
    async fn min_priority_filters_which_notifiers_receive_a_delivery() {
        let high_only_count = Arc::new(AtomicUsize::new(0));
        let all_count = Arc::new(AtomicUsize::new(0));
        let engine = NotificationEngine::new(
            vec![
                Box::new(Counting { min_priority: Priority::High, count: high_only_count.clone() }),
                Box::new(Counting { min_priority: Priority::Low, count: all_count.clone() }),
            ],
            Duration::from_secs(300),
        );

        engine.notify(msg(Priority::Normal, "x", None)).await.unwrap();
        engine.flush().await.unwrap();

        assert_eq!(high_only_count.load(Ordering::Relaxed), 0);
        assert_eq!(all_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn infer_priority_classifies_keywords() {
        assert_eq!(infer_priority("service is down", Priority::Normal), Priority::Critical);
        assert_eq!(infer_priority("job failed", Priority::Normal), Priority::High);
        assert_eq!(infer_priority("all good", Priority::Normal), Priority::Normal);
    }
}
