use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;

use crate::settings::TrackerSettings;

use super::transport::{Transport, TransportFuture};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// HTTP transport for the behaviour endpoint.
///
/// The beacon path only enqueues: a background task owns the queue and POSTs
/// bodies in order, and keeps draining after the transport is dropped. The
/// keepalive path is a direct POST whose future can be spawned detached.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    beacon_tx: mpsc::Sender<Vec<u8>>,
    beacon_max_bytes: usize,
}

impl HttpTransport {
    /// Must be called inside a tokio runtime; the beacon sender task is
    /// spawned here.
    pub fn new(endpoint: impl Into<String>, queue_capacity: usize, beacon_max_bytes: usize) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("HttpTransport requires a running tokio runtime")?;
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let (beacon_tx, beacon_rx) = mpsc::channel(queue_capacity.max(1));
        runtime.spawn(beacon_worker(client.clone(), endpoint.clone(), beacon_rx));

        log_info!("behaviour transport posting to {endpoint}");

        Ok(Self {
            client,
            endpoint,
            beacon_tx,
            beacon_max_bytes,
        })
    }

    pub fn from_settings(settings: &TrackerSettings) -> Result<Self> {
        Self::new(
            settings.endpoint.clone(),
            settings.beacon_queue_capacity,
            settings.beacon_max_bytes,
        )
    }
}

impl Transport for HttpTransport {
    fn send_beacon(&self, body: &[u8]) -> bool {
        if body.len() > self.beacon_max_bytes {
            log_debug!(
                "beacon refused: {} bytes exceeds quota of {}",
                body.len(),
                self.beacon_max_bytes
            );
            return false;
        }
        self.beacon_tx.try_send(body.to_vec()).is_ok()
    }

    fn send_keepalive(&self, body: Vec<u8>) -> TransportFuture {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move { post_json(&client, &endpoint, body).await })
    }
}

async fn beacon_worker(client: reqwest::Client, endpoint: String, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(body) = rx.recv().await {
        let size = body.len();
        match post_json(&client, &endpoint, body).await {
            Ok(()) => log_debug!("beacon delivered ({size} bytes)"),
            Err(err) => log_warn!("beacon delivery failed: {err:#}"),
        }
    }
    log_debug!("beacon queue closed");
}

async fn post_json(client: &reqwest::Client, endpoint: &str, body: Vec<u8>) -> Result<()> {
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .with_context(|| format!("POST {endpoint} failed"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("POST {endpoint} answered {status}");
    }
    Ok(())
}
