//! Outbound messaging seam.

use super::{SessionState, WhatsAppSession};
use async_trait::async_trait;
use simcha_core::{error::SimchaError, phone};
use tracing::debug;
use wacore_binary::jid::Jid;

/// Delivery interface the relay dispatches through. The production
/// implementation is [`WhatsAppSession`]; tests substitute a scripted mock.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Whether the session can currently deliver messages.
    async fn is_ready(&self) -> bool;

    /// Resolve a raw phone number to a deliverable address. `Ok(None)` means
    /// the number cannot be reached on the platform.
    async fn resolve(&self, phone_number: &str) -> Result<Option<String>, SimchaError>;

    /// Deliver a text message to a previously resolved address.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), SimchaError>;
}

#[async_trait]
impl Messenger for WhatsAppSession {
    async fn is_ready(&self) -> bool {
        *self.state.lock().await == SessionState::Ready
    }

    async fn resolve(&self, phone_number: &str) -> Result<Option<String>, SimchaError> {
        match phone::to_international(phone_number) {
            Some(digits) => Ok(Some(format!("{digits}@s.whatsapp.net"))),
            None => Ok(None),
        }
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), SimchaError> {
        let client_guard = self.client.lock().await;
        let client = client_guard
            .as_ref()
            .ok_or_else(|| SimchaError::WhatsApp("whatsapp client not connected".into()))?;

        let jid: Jid = address
            .parse()
            .map_err(|e| SimchaError::WhatsApp(format!("invalid whatsapp JID '{address}': {e}")))?;

        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };

        let msg_id = client
            .send_message(jid, msg)
            .await
            .map_err(|e| SimchaError::WhatsApp(format!("whatsapp send failed: {e}")))?;
        debug!("whatsapp message {msg_id} sent to {address}");

        Ok(())
    }
}
