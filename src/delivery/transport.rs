use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub type TransportFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Two-step delivery channel to the behaviour endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Hand `body` off for unload-safe, fire-and-forget delivery.
    ///
    /// Returns whether the body was accepted; says nothing about whether it
    /// reached the server.
    fn send_beacon(&self, body: &[u8]) -> bool;

    /// Ordinary request used when the beacon is refused. The returned future
    /// must keep running if the tracker that issued it goes away.
    fn send_keepalive(&self, body: Vec<u8>) -> TransportFuture;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryOutcome {
    DeliveredPrimary,
    DeliveredFallback,
    Dropped,
}

impl DeliveryOutcome {
    pub fn is_delivered(self) -> bool {
        !matches!(self, DeliveryOutcome::Dropped)
    }
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FlushTrigger {
    Periodic,
    Hidden,
    PageHide,
    Stop,
    Manual,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Periodic => "periodic",
            FlushTrigger::Hidden => "hidden",
            FlushTrigger::PageHide => "pagehide",
            FlushTrigger::Stop => "stop",
            FlushTrigger::Manual => "manual",
        }
    }
}
