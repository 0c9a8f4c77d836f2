//! Multi-provider task dispatch and reliability core: candidate selection
//! with circuit breakers and transient-failure fallback, an offline queue
//! for all-providers-down conditions, an agentic tool-execution loop gated
//! by trust/approval/loop-detection, and post-hoc reflection/notification.

pub mod approval;
pub mod circuit;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod executor;
pub mod loop_detector;
pub mod notify;
pub mod provider;
pub mod queue;
pub mod reflection;
pub mod tools;

pub use error::Error;
