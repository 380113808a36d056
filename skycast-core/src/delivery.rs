//! At-least-once delivery of payloads to the companion device.
//!
//! Each payload runs its own small state machine:
//!
//! ```text
//! Pending -> AwaitingAck -> Delivered
//!                        -> Retrying(n) -> (backoff) -> AwaitingAck
//!                        -> Abandoned
//! ```
//!
//! Backoff is flat with jitter: `retry_wait + random(0, retry_wait)`. A payload
//! rejected `max_retries` times is dropped and logged.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::{diagnostics::DebugSink, error::DeliveryRejection, model::Payload};

/// Message transport to the device. `Ok` is an ACK, `Err` a NACK.
#[async_trait]
pub trait DeviceBridge: Send + Sync + Debug {
    async fn send_message(&self, payload: &Payload) -> Result<(), DeliveryRejection>;

    /// Show a one-off notification on the device.
    async fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, body, "device notification");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_wait: Duration) -> Self {
        Self { max_retries, retry_wait }
    }

    /// Delay before the next retransmission.
    pub fn backoff(&self) -> Duration {
        let wait_ms = self.retry_wait.as_millis() as u64;
        let jitter_ms = if wait_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..wait_ms) };
        Duration::from_millis(wait_ms + jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    AwaitingAck { retries: u32 },
    Delivered,
    Retrying(u32),
    Abandoned,
}

impl DeliveryState {
    /// State after the device answered a transmission made with `retries`
    /// prior rejections.
    pub fn after_response(retries: u32, acked: bool, max_retries: u32) -> DeliveryState {
        if acked {
            return DeliveryState::Delivered;
        }
        let retries = retries + 1;
        if retries >= max_retries {
            DeliveryState::Abandoned
        } else {
            DeliveryState::Retrying(retries)
        }
    }
}

/// Terminal result of one payload's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub state: DeliveryState,
    pub transmissions: u32,
}

#[derive(Debug, Clone)]
pub struct DeliveryChannel {
    bridge: Arc<dyn DeviceBridge>,
    policy: RetryPolicy,
    diagnostics: Option<DebugSink>,
}

impl DeliveryChannel {
    pub fn new(bridge: Arc<dyn DeviceBridge>, policy: RetryPolicy) -> Self {
        Self { bridge, policy, diagnostics: None }
    }

    pub fn with_diagnostics(mut self, sink: Option<DebugSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn bridge(&self) -> &Arc<dyn DeviceBridge> {
        &self.bridge
    }

    /// Fire-and-forget: the retry sequence runs on its own task.
    pub fn send(&self, payload: Payload) -> JoinHandle<DeliveryOutcome> {
        let channel = self.clone();
        tokio::spawn(async move { channel.deliver(payload).await })
    }

    /// Drive one payload to a terminal state.
    pub async fn deliver(&self, payload: Payload) -> DeliveryOutcome {
        let mut state = DeliveryState::Pending;
        let mut transmissions = 0;

        loop {
            state = match state {
                DeliveryState::Pending => {
                    if let Some(sink) = &self.diagnostics {
                        sink.post(&payload);
                    }
                    DeliveryState::AwaitingAck { retries: 0 }
                }
                DeliveryState::AwaitingAck { retries } => {
                    transmissions += 1;
                    let response = self.bridge.send_message(&payload).await;
                    if let Err(rejection) = &response {
                        tracing::warn!(
                            kind = payload.kind(),
                            retry = retries + 1,
                            %rejection,
                            "device NACK"
                        );
                    }
                    let max_retries = self.policy.max_retries;
                    DeliveryState::after_response(retries, response.is_ok(), max_retries)
                }
                DeliveryState::Retrying(retries) => {
                    let delay = self.policy.backoff();
                    tracing::debug!(
                        kind = payload.kind(),
                        retries,
                        ?delay,
                        "scheduling retransmission"
                    );
                    tokio::time::sleep(delay).await;
                    DeliveryState::AwaitingAck { retries }
                }
                DeliveryState::Delivered => {
                    tracing::debug!(kind = payload.kind(), transmissions, "device ACK");
                    break;
                }
                DeliveryState::Abandoned => {
                    tracing::warn!(
                        kind = payload.kind(),
                        transmissions,
                        "device NACK, max retries exceeded; dropping payload"
                    );
                    break;
                }
            };
        }

        DeliveryOutcome { state, transmissions }
    }
}
