//! Request telemetry for a query-serving API layer.
//!
//! This crate provides two independent pieces that a request handler calls
//! after serving a query:
//! - **Cache classification**: reduces execution facts to one [`CacheType`]
//!   label describing which tier produced the result
//! - **Request auditing**: publishes one [`AuditEvent`](audit::AuditEvent) per
//!   request lifecycle transition to an external event sink
//!
//! Neither can fail or slow down the request. Classification is a pure
//! function; publishing only enqueues, and a background task batches and
//! delivers events, logging and dropping anything that goes wrong.
//!
//! # Examples
//!
//! ```
//! use request_audit::audit::{AuditData, AuditPublisher, RequestStatus, SuccessDetails};
//! use request_audit::{classify, CacheType, ClassificationInput};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let publisher = AuditPublisher::create();
//!
//! let facts = ClassificationInput::new().with_from_cache(true);
//! let cache_type = classify(&facts);
//! assert_eq!(cache_type, CacheType::PersistentCache);
//!
//! let data = AuditData::new("req-123", "rest", RequestStatus::Success).with_success(
//!     SuccessDetails {
//!         cache_type: Some(cache_type),
//!         ..Default::default()
//!     },
//! );
//! publisher.publish(data, RequestStatus::Success);
//!
//! publisher.close().await;
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
mod cache_type;
mod error;
mod logging;

pub use cache_type::{classify, CacheType, ClassificationInput};
pub use error::{AuditError, TransportError, TransportErrorKind};
