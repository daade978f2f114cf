use std::fmt;

use crate::audit::RequestStatus;

/// Logging handle for a single audit event that is about to be lost.
///
/// Every failure on the publish path ends here, so that each dropped event
/// leaves one diagnosable log line carrying its event type and request id.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DropLog<'a> {
    event_type: RequestStatus,
    request_id: &'a str,
}

impl<'a> DropLog<'a> {
    pub(crate) fn new(event_type: RequestStatus, request_id: &'a str) -> Self {
        Self {
            event_type,
            request_id,
        }
    }

    /// Logs that the event was dropped because of `reason`.
    pub(crate) fn dropped(&self, reason: &dyn fmt::Display) {
        tracing::error!(
            target: "request_audit",
            event_type = %self.event_type,
            request_id = %self.request_id,
            "request audit publish error: {}",
            reason
        );
    }

    /// Logs that the event was shed under load, e.g. because the queue is full.
    pub(crate) fn shed(&self, reason: &dyn fmt::Display) {
        tracing::warn!(
            target: "request_audit",
            event_type = %self.event_type,
            request_id = %self.request_id,
            "request audit event shed: {}",
            reason
        );
    }

    /// Logs a drop that is expected during shutdown.
    pub(crate) fn discarded(&self, reason: &dyn fmt::Display) {
        tracing::debug!(
            target: "request_audit",
            event_type = %self.event_type,
            request_id = %self.request_id,
            "request audit event discarded: {}",
            reason
        );
    }
}
