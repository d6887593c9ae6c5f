//! Remote vision capability
//!
//! The arbitrator only sees the [`RemoteVision`] contract. [`HttpVisionClient`]
//! is the HTTP implementation used by the binary.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Prompt sent with every identification request unless overridden
pub const DEFAULT_PROMPT: &str = "Identify the trading card in this photo. \
Reply with JSON only: {\"success\": bool, \"card_name\": string, \"confidence\": number 0-100, \"diagnostic\": string}. \
Use the exact printed English card name. If the name is not clearly legible, set success to false, \
leave card_name empty and say what is wrong in diagnostic.";

/// Answer of the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVisionResponse {
    pub success: bool,
    /// Empty when the service could not name the card
    #[serde(default, alias = "name")]
    pub card_name: String,
    /// 0 - 100
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub diagnostic: String,
}

/// Black-box remote identification service
#[async_trait]
pub trait RemoteVision: Send + Sync {
    fn name(&self) -> &str;

    /// Identify the card in an encoded image
    async fn identify(&self, image_bytes: &[u8], prompt: &str) -> Result<RemoteVisionResponse>;

    /// Availability probe; `Ok(false)` and `Err` both mean unavailable
    async fn health_check(&self) -> Result<bool>;
}

/// MIME type of encoded image bytes, sniffed from the magic number
pub fn media_type(image_bytes: &[u8]) -> &'static str {
    if image_bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else {
        "image/jpeg"
    }
}

#[derive(Serialize)]
struct IdentifyRequest<'a> {
    image_base64: String,
    media_type: &'a str,
    prompt: &'a str,
}

/// JSON-over-HTTP remote vision client
#[derive(Clone)]
pub struct HttpVisionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpVisionClient {
    /// `timeout` bounds each request at the transport level
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Read the bearer token from the named environment variable
    pub fn from_env(endpoint: &str, api_key_env: Option<&str>, timeout: Duration) -> Result<Self> {
        let api_key = match api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| anyhow!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        Self::new(endpoint, api_key, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteVision for HttpVisionClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn identify(&self, image_bytes: &[u8], prompt: &str) -> Result<RemoteVisionResponse> {
        let body = IdentifyRequest {
            image_base64: BASE64.encode(image_bytes),
            media_type: media_type(image_bytes),
            prompt,
        };

        let response = self
            .authorize(self.client.post(&self.endpoint))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Remote vision error {}: {}", status, text));
        }

        let parsed: RemoteVisionResponse = response
            .json()
            .await
            .context("Remote vision returned malformed JSON")?;
        debug!(
            "Remote vision: success={} name={:?} confidence={:.0}",
            parsed.success, parsed.card_name, parsed.confidence
        );
        Ok(parsed)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Health probe to {} failed", url))?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve one canned HTTP response, returning the base URL and the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_media_type_sniffing() {
        assert_eq!(media_type(&[0x89, b'P', b'N', b'G', 0x0d]), "image/png");
        assert_eq!(media_type(&[0xff, 0xd8, 0xff]), "image/jpeg");
    }

    #[test]
    fn test_response_defaults() {
        let parsed: RemoteVisionResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.card_name, "");
        assert_eq!(parsed.confidence, 0.0);

        let aliased: RemoteVisionResponse =
            serde_json::from_str(r#"{"success": true, "name": "Island", "confidence": 97}"#).unwrap();
        assert_eq!(aliased.card_name, "Island");
    }

    #[tokio::test]
    async fn test_identify_posts_image_and_parses_reply() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"success": true, "card_name": "Black Lotus", "confidence": 96, "diagnostic": ""}"#,
        )
        .await;

        let client = HttpVisionClient::new(&url, Some("secret".to_string()), Duration::from_secs(5)).unwrap();
        let reply = client.identify(&[0xff, 0xd8, 0xff, 0xe0], "name it").await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.card_name, "Black Lotus");
        assert_eq!(reply.confidence, 96.0);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST / "));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""media_type":"image/jpeg""#));
        assert!(request.contains(r#""prompt":"name it""#));
        assert!(request.contains(&format!(r#""image_base64":"{}""#, BASE64.encode([0xff, 0xd8, 0xff, 0xe0]))));
    }

    #[tokio::test]
    async fn test_identify_http_error() {
        let (url, server) = serve_once("503 Service Unavailable", r#"{"error": "busy"}"#).await;
        let client = HttpVisionClient::new(&url, None, Duration::from_secs(5)).unwrap();
        let err = client.identify(b"img", DEFAULT_PROMPT).await.unwrap_err();
        assert!(err.to_string().contains("503"));

        let request = server.await.unwrap();
        assert!(!request.to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (url, server) = serve_once("200 OK", "{}").await;
        let client = HttpVisionClient::new(&format!("{}/", url), None, Duration::from_secs(5)).unwrap();
        assert!(client.health_check().await.unwrap());
        assert!(server.await.unwrap().starts_with("GET /health "));

        let (url, _server) = serve_once("500 Internal Server Error", "{}").await;
        let client = HttpVisionClient::new(&url, None, Duration::from_secs(5)).unwrap();
        assert!(!client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpVisionClient::new(&format!("http://{}", addr), None, Duration::from_secs(2)).unwrap();
        assert!(client.health_check().await.is_err());
    }

    #[test]
    fn test_from_env_missing_variable() {
        let result = HttpVisionClient::from_env(
            "http://localhost:1",
            Some("CARD_SCANNER_TEST_UNSET_KEY"),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
