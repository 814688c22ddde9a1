pub mod gateway;

use async_trait::async_trait;

/// Outbound messaging seam. The platform's channel fan-out (SMS, chat
/// widget, email) lives behind the gateway; this core only hands it a
/// recipient and a rendered body.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;
}
