//! Earth messages → transport layer.
//!
//! [`OutboundBridge::forward`] only enqueues a job. A worker task owns the
//! queue and runs every call on its own task, so a slow transport layer never
//! holds up frame processing or other forwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cosmo_core::{to_send_time, Envelope, EventKind};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::errors::TransportError;
use crate::metrics::{FORWARDS_TOTAL, FORWARD_FAILURES_TOTAL};
use crate::registry::ConnectionRegistry;

/// Jobs waiting for the worker before new forwards are refused.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Loss marker attached to envelopes synthesized after a failed forward.
pub const RELAY_FAILURE_ERROR: &str = "Message could not be delivered to the transport layer";

/// Request body understood by the transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    pub username: String,
    pub send_time: String,
    pub message: String,
}

impl ForwardRequest {
    /// Derive the request from an Earth `message` envelope.
    ///
    /// Returns `None` for presence events, envelopes without text, or ids
    /// that cannot be rendered as a date.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        if envelope.event != EventKind::Message {
            return None;
        }
        let message = envelope.message.clone()?;
        let send_time = to_send_time(envelope.id).ok()?;
        Some(Self {
            username: envelope.username.clone(),
            send_time,
            message,
        })
    }
}

/// The external call made for each forwarded message.
#[async_trait]
pub trait RelayTransport: Send + Sync + 'static {
    async fn send(&self, request: &ForwardRequest) -> Result<(), TransportError>;
}

/// `POST`s forward requests as JSON to the configured transport-layer URL.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport whose calls give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RelayTransport for HttpTransport {
    async fn send(&self, request: &ForwardRequest) -> Result<(), TransportError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

struct ForwardJob {
    request: ForwardRequest,
    id: i64,
}

/// Handle used by the Earth node to hand messages to the worker.
#[derive(Clone)]
pub struct OutboundBridge {
    tx: mpsc::Sender<ForwardJob>,
}

impl OutboundBridge {
    /// Spawn the worker and return the bridge handle with the worker's join handle.
    ///
    /// With `notify` set, a failed forward is reported back to that registry
    /// as an error-tagged copy of the message.
    pub fn spawn(
        transport: Arc<dyn RelayTransport>,
        notify: Option<Arc<ConnectionRegistry>>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, transport, notify, cancel));
        (Self { tx }, worker)
    }

    /// Queue an Earth `message` envelope for the transport layer.
    ///
    /// Never waits: a full queue or a stopped worker is reported immediately.
    pub fn forward(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let Some(request) = ForwardRequest::from_envelope(envelope) else {
            return Err(TransportError::Client(format!(
                "envelope {} is not a forwardable message",
                envelope.id
            )));
        };
        let job = ForwardJob {
            request,
            id: envelope.id,
        };
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Stopped,
        })
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<ForwardJob>,
    transport: Arc<dyn RelayTransport>,
    notify: Option<Arc<ConnectionRegistry>>,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                let transport = Arc::clone(&transport);
                let notify = notify.clone();
                let _ = in_flight.spawn(deliver(transport, job, notify));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            () = cancel.cancelled() => break,
        }
    }

    // Calls already made are bounded by the transport timeout.
    let pending = in_flight.len();
    if pending > 0 {
        info!(pending, "waiting for in-flight forwards");
    }
    while in_flight.join_next().await.is_some() {}
    debug!("outbound worker stopped");
}

async fn deliver(
    transport: Arc<dyn RelayTransport>,
    job: ForwardJob,
    notify: Option<Arc<ConnectionRegistry>>,
) {
    let ForwardJob { request, id } = job;
    match transport.send(&request).await {
        Ok(()) => {
            counter!(FORWARDS_TOTAL).increment(1);
            info!(username = %request.username, id, send_time = %request.send_time, "message sent to transport layer");
        }
        Err(e) => {
            counter!(FORWARD_FAILURES_TOTAL, "kind" => e.error_kind()).increment(1);
            warn!(username = %request.username, id, error = %e, "failed to send message to transport layer");
            if let Some(registry) = notify {
                let lost = Envelope::delivered(
                    request.username,
                    request.message,
                    id,
                    Some(RELAY_FAILURE_ERROR.to_owned()),
                );
                let _ = broadcast(&registry, &lost);
            }
        }
    }
}
