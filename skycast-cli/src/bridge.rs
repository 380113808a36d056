use async_trait::async_trait;
use skycast_core::{DeliveryRejection, DeviceBridge, Payload};

/// Stands in for the companion device: one JSON line per payload on stdout,
/// every transmission acknowledged.
#[derive(Debug, Default)]
pub struct StdoutBridge;

#[async_trait]
impl DeviceBridge for StdoutBridge {
    async fn send_message(&self, payload: &Payload) -> Result<(), DeliveryRejection> {
        let line =
            serde_json::to_string(payload).map_err(|e| DeliveryRejection::new(e.to_string()))?;
        println!("{line}");
        Ok(())
    }

    async fn notify(&self, title: &str, body: &str) {
        println!("[{title}] {body}");
    }
}
