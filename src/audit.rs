//! Request audit event publishing.
//!
//! This module provides:
//! - `AuditData` / `AuditEvent`: the audit record and its fixed wire schema
//! - `AuditPublisher`: non-blocking, never-failing publisher with a disabled
//!   and an active variant
//! - `PublisherConfig`: sink identity and batching, read once at startup
//! - `Transport`: the seam to the event sink, with a Google Pub/Sub
//!   implementation and an in-memory one
//!
//! Publishing is best-effort and at-most-once. An event that cannot be
//! serialized, queued or delivered is logged with its event type and request
//! id and then dropped; nothing on this path can fail the request being
//! audited.

mod config;
mod event;
mod memory;
mod publisher;
mod pubsub;
mod transport;
mod worker;

pub use config::{
    BatchOptions, BatchSettings, PublisherConfig, SinkTarget, ACCESS_TOKEN_VAR,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT, EMULATOR_HOST_VAR, FLUSH_INTERVAL_MS_VAR,
    MAX_BATCH_BYTES_VAR, MAX_BATCH_EVENTS_VAR, MAX_QUEUE_CAPACITY, PROJECT_ID_VAR,
    QUEUE_CAPACITY_VAR, SHUTDOWN_TIMEOUT_MS_VAR, TOPIC_VAR,
};
pub use event::{AuditData, AuditEvent, RequestStatus, SuccessDetails, Timing};
pub use memory::MemoryTransport;
pub use publisher::{ActivePublisher, AuditPublisher};
pub use pubsub::PubSubTransport;
pub use transport::Transport;
