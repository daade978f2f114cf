//! Google Pub/Sub transport over the REST API.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gcp_auth::TokenProvider;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::config::{BatchSettings, SinkTarget};
use super::Transport;
use crate::{TransportError, TransportErrorKind};

const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";
const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: Vec<PubsubMessage<'a>>,
}

#[derive(Serialize)]
struct PubsubMessage<'a> {
    data: &'a str,
}

/// How requests are authorized.
enum Credentials {
    /// The emulator accepts unauthenticated requests.
    Anonymous,
    /// A caller-supplied bearer token, sent as is.
    Static(String),
    /// Application-default credentials, resolved on first send. The provider
    /// caches tokens and refreshes them before they expire.
    ApplicationDefault(OnceCell<Arc<dyn TokenProvider>>),
}

impl Credentials {
    fn for_target(target: &SinkTarget) -> Self {
        match (&target.access_token, &target.emulator_host) {
            (Some(token), _) => Self::Static(token.clone()),
            (None, Some(_)) => Self::Anonymous,
            (None, None) => Self::ApplicationDefault(OnceCell::new()),
        }
    }

    async fn bearer(&self) -> Result<Option<String>, TransportError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::ApplicationDefault(provider) => {
                let provider = provider
                    .get_or_try_init(gcp_auth::provider)
                    .await
                    .map_err(auth_error)?;
                let token = provider.token(&[PUBSUB_SCOPE]).await.map_err(auth_error)?;
                Ok(Some(token.as_str().to_string()))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Static(_) => f.write_str("Static(<redacted>)"),
            Self::ApplicationDefault(provider) => f
                .debug_struct("ApplicationDefault")
                .field("resolved", &provider.initialized())
                .finish(),
        }
    }
}

fn auth_error(error: gcp_auth::Error) -> TransportError {
    TransportError::with_message(TransportErrorKind::Auth, error.to_string())
}

/// Publishes batches to one Pub/Sub topic.
///
/// Talks to `https://pubsub.googleapis.com` by default, or to a local emulator
/// over plain HTTP when [`SinkTarget::emulator_host`] is set.
///
/// Authorization, first match wins:
/// 1. [`SinkTarget::access_token`], sent verbatim as a bearer token
/// 2. no authorization when talking to an emulator
/// 3. Google application-default credentials, with the Pub/Sub scope
#[derive(Debug)]
pub struct PubSubTransport {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    credentials: Credentials,
    closed: AtomicBool,
}

impl PubSubTransport {
    /// Creates a transport for `target` with a 30 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the HTTP client cannot be built.
    pub fn new(target: &SinkTarget) -> Result<Self, TransportError> {
        Self::with_request_timeout(target, REQUEST_TIMEOUT)
    }

    /// Creates a transport for `target` whose publish requests give up after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the HTTP client cannot be built.
    pub fn with_request_timeout(
        target: &SinkTarget,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::with_message(TransportErrorKind::Network, e.to_string()))?;

        let base_url = match &target.emulator_host {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => DEFAULT_ENDPOINT.to_string(),
        };

        Ok(Self {
            client,
            base_url,
            project_id: target.project_id.clone(),
            credentials: Credentials::for_target(target),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the publish URL for `topic`.
    pub fn publish_url(&self, topic: &str) -> String {
        format!(
            "{}/v1/projects/{}/topics/{}:publish",
            self.base_url, self.project_id, topic
        )
    }
}

fn encode_batch(messages: &[Vec<u8>]) -> Vec<String> {
    messages.iter().map(|message| STANDARD.encode(message)).collect()
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::Network
    };
    TransportError::with_message(kind, error.to_string())
}

#[async_trait]
impl Transport for PubSubTransport {
    async fn send(&self, topic: &str, messages: Vec<Vec<u8>>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::new(TransportErrorKind::Closed));
        }

        let encoded = encode_batch(&messages);
        let body = PublishRequest {
            messages: encoded.iter().map(|data| PubsubMessage { data }).collect(),
        };

        let mut request = self.client.post(self.publish_url(topic)).json(&body);
        if let Some(token) = self.credentials.bearer().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TransportError::with_message(
                TransportErrorKind::Rejected,
                format!("{}: {}", status, detail.trim()),
            ));
        }

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn batch_defaults(&self) -> BatchSettings {
        BatchSettings::default()
    }
}
