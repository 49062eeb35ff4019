//! Shared domain types, port traits, and the crate-wide error enum for
//! the SneakDex crawler core.

pub mod error;
pub mod metrics;
pub mod ports;
pub mod shutdown;
pub mod types;

pub use error::{Result, SneakdexError};
pub use metrics::Metrics;
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use types::{
    DependencyHealth, FailureKind, FetchOutcome, HealthReport, HealthStatus, MetricsSnapshot,
    ProducerRecord, QueueItem,
};
