//! The seam between the publisher and the event sink.

use async_trait::async_trait;

use super::config::BatchSettings;
use crate::TransportError;

/// Delivers serialized audit events to a named destination.
///
/// The publisher's background worker is the only caller. Implementations may
/// retry or back off internally, but each call must eventually return; the
/// publisher logs and discards any error.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one batch of serialized events to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the batch could not be delivered. The
    /// batch is then lost.
    async fn send(&self, topic: &str, messages: Vec<Vec<u8>>) -> Result<(), TransportError>;

    /// Releases the connection. Called once, after the final flush.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection could not be released
    /// cleanly.
    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Batching thresholds used for any value the configuration leaves unset.
    fn batch_defaults(&self) -> BatchSettings {
        BatchSettings::default()
    }
}
