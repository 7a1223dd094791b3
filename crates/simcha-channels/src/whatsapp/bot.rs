//! Bot lifecycle — building and running the WhatsApp connection.

use super::{SessionState, WhatsAppSession};
use crate::session_store::SessionStore;
use simcha_core::error::SimchaError;
use std::sync::Arc;
use tracing::{info, warn};
use wacore::types::events::Event;
use whatsapp_rust::bot::Bot;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

impl WhatsAppSession {
    /// Build the WhatsApp bot and run it in the background.
    ///
    /// The event handler drives the session state machine: a fresh session
    /// surfaces QR codes and sits in `AwaitingQrScan` until scanned; a
    /// persisted session goes straight to `Ready` on `Connected`.
    pub async fn start(&self) -> Result<(), SimchaError> {
        let db_path = self.session_db_path();
        let client_handle = self.client.clone();

        info!("whatsapp bot building (session: {db_path})");

        let backend = Arc::new(
            SessionStore::new(&db_path)
                .await
                .map_err(|e| SimchaError::WhatsApp(format!("session store init failed: {e}")))?,
        );

        let client_for_event = client_handle.clone();
        let state_handle = self.state.clone();
        let last_qr_handle = self.last_qr.clone();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some("SIMCHA".to_string()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let client_store = client_for_event.clone();
                let state = state_handle.clone();
                let last_qr = last_qr_handle.clone();
                async move {
                    match event {
                        Event::PairingQrCode { code, .. } => {
                            info!("whatsapp QR code generated (scan to pair)");
                            *last_qr.lock().await = Some(code.clone());
                            *state.lock().await = SessionState::AwaitingQrScan;
                            match super::qr::generate_qr_terminal(&code) {
                                Ok(rendered) => println!("\n{rendered}"),
                                Err(e) => warn!("QR render failed: {e}"),
                            }
                        }
                        Event::PairSuccess(_) => {
                            info!("whatsapp pairing successful");
                            *state.lock().await = SessionState::Authenticated;
                        }
                        Event::Connected(_) => {
                            info!("whatsapp connected");
                            *client_store.lock().await = Some(client);
                            *last_qr.lock().await = None;
                            *state.lock().await = SessionState::Ready;
                        }
                        Event::Disconnected(_) => {
                            warn!("whatsapp disconnected");
                            *client_store.lock().await = None;
                            *state.lock().await = SessionState::Authenticated;
                        }
                        Event::LoggedOut(_) => {
                            warn!("whatsapp logged out, session invalidated");
                            *client_store.lock().await = None;
                            *state.lock().await = SessionState::Uninitialized;
                        }
                        _ => {}
                    }
                }
            })
            .build()
            .await
            .map_err(|e| SimchaError::WhatsApp(format!("whatsapp bot build failed: {e}")))?;

        // Client handle is usable before Connected fires; sends still gate
        // on the Ready state.
        *client_handle.lock().await = Some(bot.client());

        let _handle = bot
            .run()
            .await
            .map_err(|e| SimchaError::WhatsApp(format!("whatsapp bot run failed: {e}")))?;

        info!("whatsapp bot started");
        Ok(())
    }
}
