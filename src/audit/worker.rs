//! Background batching task.
//!
//! The worker is the only owner of the transport. It drains the publisher's
//! queue into a batch and flushes when the batch reaches its byte or event
//! limit, or when its oldest event has waited the flush interval. Flushes run
//! one at a time, so batches leave in submission order.

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::config::BatchSettings;
use super::event::{AuditEvent, RequestStatus};
use super::Transport;
use crate::logging::DropLog;
use crate::AuditError;

/// A serialized event plus what is needed to log its loss.
#[derive(Debug)]
pub(crate) struct Envelope {
    event_type: RequestStatus,
    request_id: String,
    payload: Vec<u8>,
}

impl Envelope {
    pub(crate) fn new(event: &AuditEvent, payload: Vec<u8>) -> Self {
        Self {
            event_type: event.event_type(),
            request_id: event.request_id().to_string(),
            payload,
        }
    }

    fn log(&self) -> DropLog<'_> {
        DropLog::new(self.event_type, &self.request_id)
    }
}

/// Messages from the publisher to the worker.
#[derive(Debug)]
pub(crate) enum Command {
    Publish(Envelope),
    /// Flush everything, shut the transport down, then acknowledge.
    Close(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Batch {
    envelopes: Vec<Envelope>,
    bytes: usize,
    opened_at: Option<Instant>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    fn push(&mut self, envelope: Envelope) {
        if self.opened_at.is_none() {
            self.opened_at = Some(Instant::now());
        }
        self.bytes += envelope.payload.len();
        self.envelopes.push(envelope);
    }

    fn take(&mut self) -> Vec<Envelope> {
        self.bytes = 0;
        self.opened_at = None;
        std::mem::take(&mut self.envelopes)
    }
}

pub(crate) struct Worker<T> {
    transport: T,
    topic: String,
    settings: BatchSettings,
    receiver: mpsc::Receiver<Command>,
    batch: Batch,
}

impl<T: Transport> Worker<T> {
    pub(crate) fn new(
        transport: T,
        topic: String,
        settings: BatchSettings,
        receiver: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            transport,
            topic,
            settings,
            receiver,
            batch: Batch::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self
                .batch
                .opened_at
                .map(|opened_at| opened_at + self.settings.flush_interval);

            let command = match deadline {
                Some(deadline) => {
                    tokio::select! {
                        command = self.receiver.recv() => command,
                        _ = tokio::time::sleep_until(deadline) => {
                            self.flush().await;
                            continue;
                        }
                    }
                }
                None => self.receiver.recv().await,
            };

            match command {
                Some(Command::Publish(envelope)) => self.accept(envelope).await,
                Some(Command::Close(ack)) => {
                    self.finish().await;
                    let _ = ack.send(());
                    return;
                }
                // Every publisher handle is gone.
                None => {
                    self.finish().await;
                    return;
                }
            }
        }
    }

    async fn accept(&mut self, envelope: Envelope) {
        let would_overflow = !self.batch.is_empty()
            && self.batch.bytes + envelope.payload.len() > self.settings.max_bytes;
        if would_overflow {
            self.flush().await;
        }

        self.batch.push(envelope);

        if self.batch.envelopes.len() >= self.settings.max_events
            || self.batch.bytes >= self.settings.max_bytes
        {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let envelopes = self.batch.take();
        let messages = envelopes
            .iter()
            .map(|envelope| envelope.payload.clone())
            .collect::<Vec<_>>();

        tracing::trace!(
            target: "request_audit",
            topic = %self.topic,
            events = messages.len(),
            "flushing request audit batch"
        );

        if let Err(error) = self.transport.send(&self.topic, messages).await {
            let error = AuditError::from(error);
            for envelope in &envelopes {
                envelope.log().dropped(&error);
            }
        }
    }

    async fn finish(&mut self) {
        // Anything still queued was submitted before the close request.
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Publish(envelope) => self.accept(envelope).await,
                Command::Close(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        self.receiver.close();
        self.flush().await;

        // Late publishes that raced the close request.
        while let Ok(command) = self.receiver.try_recv() {
            if let Command::Publish(envelope) = command {
                envelope.log().discarded(&AuditError::Closed);
            }
        }

        if let Err(error) = self.transport.shutdown().await {
            tracing::error!(
                target: "request_audit",
                topic = %self.topic,
                "request audit transport shutdown failed: {}",
                error
            );
        }
    }
}
