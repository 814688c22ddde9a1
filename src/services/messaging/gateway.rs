use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::MessagingProvider;

/// Posts messages to the platform's outbound gateway. Each request is
/// signed with HMAC-SHA1 over the JSON body so the gateway can reject
/// forged senders.
pub struct HttpGatewayProvider {
    url: String,
    signing_key: String,
    client: reqwest::Client,
}

impl HttpGatewayProvider {
    pub fn new(url: String, signing_key: String) -> Self {
        Self {
            url,
            signing_key,
            client: reqwest::Client::new(),
        }
    }
}

pub fn sign_payload(key: &str, payload: &str) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    let result = mac.finalize().into_bytes();
    Some(base64::engine::general_purpose::STANDARD.encode(result))
}

#[async_trait]
impl MessagingProvider for HttpGatewayProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        if self.url.is_empty() {
            tracing::warn!("messaging gateway not configured, dropping message");
            return Ok(());
        }

        let payload = serde_json::to_string(&serde_json::json!({ "to": to, "body": body }))?;
        let signature = sign_payload(&self.signing_key, &payload)
            .context("failed to sign gateway payload")?;

        self.client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("x-gateway-signature", signature)
            .body(payload)
            .send()
            .await
            .context("failed to reach messaging gateway")?
            .error_for_status()
            .context("messaging gateway returned error")?;

        Ok(())
    }
}
