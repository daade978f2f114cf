//! In-memory transport.
//!
//! Records every batch it receives instead of sending it anywhere. Useful in
//! tests and for running a service locally without a sink.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::config::BatchSettings;
use super::Transport;
use crate::TransportError;

#[derive(Debug, Default)]
struct Recorded {
    batches: Vec<(String, Vec<Vec<u8>>)>,
    shutdowns: usize,
}

/// A transport that keeps every batch in memory.
///
/// Clones share the same storage, so a test can keep one handle and give the
/// other to the publisher.
///
/// # Example
///
/// ```
/// use request_audit::audit::{MemoryTransport, Transport};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let transport = MemoryTransport::new();
/// transport.send("audit", vec![br#"{"request_id":"req-1"}"#.to_vec()]).await.unwrap();
///
/// assert_eq!(transport.batch_count(), 1);
/// assert_eq!(transport.events()[0]["request_id"], "req-1");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    recorded: Arc<Mutex<Recorded>>,
    defaults: Option<BatchSettings>,
}

impl MemoryTransport {
    /// Creates a new empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the batching defaults this transport reports.
    pub fn with_batch_defaults(mut self, defaults: BatchSettings) -> Self {
        self.defaults = Some(defaults);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the number of batches received.
    pub fn batch_count(&self) -> usize {
        self.lock().batches.len()
    }

    /// Returns the size of each batch received, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batches.iter().map(|(_, batch)| batch.len()).collect()
    }

    /// Returns the topics each batch was sent to, in order.
    pub fn topics(&self) -> Vec<String> {
        self.lock()
            .batches
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Returns every received event parsed as JSON, in delivery order.
    ///
    /// Messages that are not valid JSON are skipped.
    pub fn events(&self) -> Vec<Value> {
        self.lock()
            .batches
            .iter()
            .flat_map(|(_, batch)| batch.iter())
            .filter_map(|message| serde_json::from_slice(message).ok())
            .collect()
    }

    /// Returns the number of events received.
    pub fn event_count(&self) -> usize {
        self.lock().batches.iter().map(|(_, batch)| batch.len()).sum()
    }

    /// Returns how many times [`Transport::shutdown`] was called.
    pub fn shutdown_count(&self) -> usize {
        self.lock().shutdowns
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, topic: &str, messages: Vec<Vec<u8>>) -> Result<(), TransportError> {
        self.lock().batches.push((topic.to_string(), messages));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.lock().shutdowns += 1;
        Ok(())
    }

    fn batch_defaults(&self) -> BatchSettings {
        self.defaults.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_empty() {
        let transport = MemoryTransport::new();
        assert_eq!(transport.batch_count(), 0);
        assert_eq!(transport.event_count(), 0);
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn records_batches_in_order() {
        let transport = MemoryTransport::new();
        transport
            .send("t1", vec![b"{\"n\":1}".to_vec(), b"{\"n\":2}".to_vec()])
            .await
            .unwrap();
        transport.send("t2", vec![b"{\"n\":3}".to_vec()]).await.unwrap();

        assert_eq!(transport.batch_sizes(), vec![2, 1]);
        assert_eq!(transport.topics(), vec!["t1", "t2"]);
        let ns: Vec<i64> = transport
            .events()
            .iter()
            .map(|event| event["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let transport = MemoryTransport::new();
        let handle = transport.clone();
        transport.send("t", vec![b"{}".to_vec()]).await.unwrap();
        transport.shutdown().await.unwrap();

        assert_eq!(handle.event_count(), 1);
        assert_eq!(handle.shutdown_count(), 1);
    }

    #[test]
    fn reports_configured_defaults() {
        let defaults = BatchSettings {
            max_bytes: 10,
            max_events: 2,
            flush_interval: std::time::Duration::from_secs(1),
        };
        let transport = MemoryTransport::new().with_batch_defaults(defaults);
        assert_eq!(transport.batch_defaults(), defaults);
        assert_eq!(MemoryTransport::new().batch_defaults(), BatchSettings::default());
    }
}
