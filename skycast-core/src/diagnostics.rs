use reqwest::Client;

use crate::{config::Diagnostics, model::Payload};

/// Mirrors payloads to an external debug endpoint as `data=<json>`.
/// Fire-and-forget: failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct DebugSink {
    http: Client,
    url: String,
}

impl DebugSink {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }

    /// `None` unless diagnostics are enabled and a URL is set.
    pub fn from_config(cfg: &Diagnostics, http: &Client) -> Option<Self> {
        match (&cfg.url, cfg.enabled) {
            (Some(url), true) if !url.is_empty() => Some(Self::new(http.clone(), url.clone())),
            _ => None,
        }
    }

    pub fn post(&self, payload: &Payload) {
        let data = match serde_json::to_string(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "could not encode debug payload");
                return;
            }
        };

        let request = self.http.post(&self.url).form(&[("data", data)]);
        tokio::spawn(async move {
            if let Err(e) = request.send().await {
                tracing::warn!(error = %e, "debug POST failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn disabled_or_missing_url_yields_no_sink() {
        let http = Client::new();
        assert!(DebugSink::from_config(&Diagnostics::default(), &http).is_none());
        let cfg = Diagnostics { enabled: true, url: None };
        assert!(DebugSink::from_config(&cfg, &http).is_none());
        let cfg = Diagnostics { enabled: false, url: Some("http://x".into()) };
        assert!(DebugSink::from_config(&cfg, &http).is_none());
        let cfg = Diagnostics { enabled: true, url: Some("http://x".into()) };
        assert!(DebugSink::from_config(&cfg, &http).is_some());
    }

    #[tokio::test]
    async fn post_sends_form_encoded_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("data=%7B%22js_ready%22%3Atrue%7D"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = DebugSink::new(Client::new(), server.uri());
        sink.post(&Payload::ready());

        for _ in 0..50 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let sink = DebugSink::new(Client::new(), "http://127.0.0.1:9/".into());
        sink.post(&Payload::http_error());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
