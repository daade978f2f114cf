//! The request audit publisher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::config::{PublisherConfig, SinkTarget};
use super::event::{AuditData, AuditEvent, RequestStatus};
use super::worker::{Command, Envelope, Worker};
use super::{PubSubTransport, Transport};
use crate::logging::DropLog;
use crate::{AuditError, TransportError};

/// Publishes request audit events to an external sink without ever failing
/// or blocking the caller.
///
/// Chosen once at startup: [`Disabled`](AuditPublisher::Disabled) when the
/// sink is not configured, [`Active`](AuditPublisher::Active) otherwise.
/// Construct it explicitly, share it with request handlers (it is
/// `Send + Sync`; wrap it in an `Arc` as needed) and [`close`](Self::close)
/// it during graceful shutdown.
///
/// # Example
///
/// ```
/// use request_audit::audit::{AuditData, AuditPublisher, PublisherConfig, RequestStatus};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// // No sink configured: every call is a no-op.
/// let publisher = AuditPublisher::from_config(&PublisherConfig::default());
/// assert!(!publisher.is_enabled());
///
/// publisher.publish(
///     AuditData::new("req-1", "rest", RequestStatus::Acknowledged),
///     RequestStatus::Acknowledged,
/// );
/// publisher.close().await;
/// # });
/// ```
#[derive(Debug, Default)]
pub enum AuditPublisher {
    /// Auditing is off; every operation is a no-op.
    #[default]
    Disabled,
    /// Events are queued for a background worker that owns the transport.
    Active(ActivePublisher),
}

impl AuditPublisher {
    /// Creates a publisher from the process environment.
    ///
    /// See [`PublisherConfig::from_env`] for the variables read.
    pub fn create() -> Self {
        Self::from_config(&PublisherConfig::from_env())
    }

    /// Creates a publisher that sends to Google Pub/Sub.
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self::from_config_with(config, PubSubTransport::new)
    }

    /// Creates a publisher whose transport is built by `make_transport`.
    ///
    /// `make_transport` is only called when `config` names a sink and an async
    /// runtime is available to host the worker. If it fails, the publisher
    /// is disabled.
    pub fn from_config_with<T, F>(config: &PublisherConfig, make_transport: F) -> Self
    where
        T: Transport,
        F: FnOnce(&SinkTarget) -> Result<T, TransportError>,
    {
        let Some(target) = config.target() else {
            tracing::debug!(target: "request_audit", "request audit disabled: sink not configured");
            return Self::Disabled;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(
                    target: "request_audit",
                    "request audit disabled: no async runtime to host the publisher"
                );
                return Self::Disabled;
            }
        };

        let transport = match make_transport(&target) {
            Ok(transport) => transport,
            Err(error) => {
                tracing::error!(
                    target: "request_audit",
                    project_id = %target.project_id,
                    topic = %target.topic,
                    "request audit disabled: {}",
                    error
                );
                return Self::Disabled;
            }
        };

        let settings = config.batch.resolve(transport.batch_defaults());
        tracing::info!(
            target: "request_audit",
            project_id = %target.project_id,
            topic = %target.topic,
            max_batch_bytes = settings.max_bytes,
            max_batch_events = settings.max_events,
            flush_interval_ms = settings.flush_interval.as_millis() as u64,
            emulator = target.emulator_host.as_deref().unwrap_or("none"),
            "request audit publisher initialized"
        );

        let queue_capacity = config.effective_queue_capacity();
        if queue_capacity != config.queue_capacity {
            tracing::warn!(
                target: "request_audit",
                requested = config.queue_capacity,
                queue_capacity,
                "request audit queue capacity out of range; clamped"
            );
        }

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let worker = Worker::new(transport, target.topic, settings, receiver);
        let handle = runtime.spawn(worker.run());

        Self::Active(ActivePublisher {
            sender,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Returns `true` if events are actually sent somewhere.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Publishes one audit event for `data`.
    ///
    /// Assigns a fresh event id and the current time, serializes the event
    /// and queues it. Returns immediately; the event is sent later with a
    /// batch. Failures are logged and the event is dropped.
    pub fn publish(&self, data: AuditData, event_type: RequestStatus) {
        if let Self::Active(active) = self {
            active.publish(AuditEvent::new(data, event_type));
        }
    }

    /// Publishes one audit event from an untyped data bag.
    ///
    /// A bag that does not match the [`AuditData`] schema is logged and
    /// dropped.
    pub fn publish_value(&self, raw: Value, event_type: RequestStatus) {
        let Self::Active(active) = self else {
            return;
        };

        let request_id = raw
            .get("request_id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();

        match serde_json::from_value::<AuditData>(raw) {
            Ok(data) => active.publish(AuditEvent::new(data, event_type)),
            Err(error) => {
                DropLog::new(event_type, &request_id).dropped(&AuditError::MalformedData(error))
            }
        }
    }

    /// Flushes buffered events and releases the sink connection.
    ///
    /// Waits at most the configured shutdown deadline. Calling it again is a
    /// no-op.
    pub async fn close(&self) {
        if let Self::Active(active) = self {
            active.close().await;
        }
    }
}

/// State behind [`AuditPublisher::Active`].
#[derive(Debug)]
pub struct ActivePublisher {
    sender: mpsc::Sender<Command>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl ActivePublisher {
    fn publish(&self, event: AuditEvent) {
        let log = DropLog::new(event.event_type(), event.request_id());

        if self.closed.load(Ordering::Acquire) {
            log.discarded(&AuditError::Closed);
            return;
        }

        let payload = match event.to_json_bytes() {
            Ok(payload) => payload,
            Err(error) => {
                log.dropped(&AuditError::Serialization(error));
                return;
            }
        };

        match self.sender.try_send(Command::Publish(Envelope::new(&event, payload))) {
            Ok(()) => {}
            // Newest event loses when the queue is full.
            Err(TrySendError::Full(_)) => log.shed(&AuditError::QueueFull),
            Err(TrySendError::Closed(_)) => log.discarded(&AuditError::Closed),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(target: "request_audit", "request audit publisher already closed");
            return;
        }

        let Some(mut handle) = self.worker.lock().await.take() else {
            return;
        };

        let shutdown = async {
            let (ack, acked) = oneshot::channel();
            if self.sender.send(Command::Close(ack)).await.is_ok() {
                let _ = acked.await;
            }
            (&mut handle).await
        };

        let outcome = tokio::time::timeout(self.shutdown_timeout, shutdown).await;
        match outcome {
            Ok(Ok(())) => {
                tracing::debug!(target: "request_audit", "request audit publisher closed");
            }
            Ok(Err(error)) => {
                tracing::error!(
                    target: "request_audit",
                    "request audit worker failed during shutdown: {}",
                    error
                );
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    target: "request_audit",
                    "{}; buffered events were lost",
                    AuditError::ShutdownTimeout(self.shutdown_timeout)
                );
            }
        }
    }
}
