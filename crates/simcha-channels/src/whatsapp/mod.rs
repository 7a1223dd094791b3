//! WhatsApp relay session — pure Rust via `whatsapp-rust`.
//!
//! Speaks the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code, like WhatsApp Web. The session is
//! persisted to `{data_dir}/whatsapp_session/whatsapp.db`, so a restart
//! reconnects without a new scan.

mod bot;
pub mod dispatch;
mod qr;
mod send;

#[cfg(test)]
mod tests;

pub use qr::{generate_qr_terminal, start_pairing};
pub use send::Messenger;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle of the relay's link to WhatsApp.
///
/// `Ready` is the only state in which sends are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No bot running yet.
    Uninitialized,
    /// Bot is up but the session is unpaired; a QR code is pending a scan.
    AwaitingQrScan,
    /// Pairing succeeded, connection handshake still in flight.
    Authenticated,
    /// Connected and able to send.
    Ready,
}

/// Long-lived WhatsApp session shared by the HTTP relay and the CLI.
pub struct WhatsAppSession {
    pub(super) data_dir: String,
    /// Client handle for sending messages, set once the bot is built.
    pub(super) client: Arc<Mutex<Option<Arc<whatsapp_rust::client::Client>>>>,
    pub(super) state: Arc<Mutex<SessionState>>,
    /// Last QR code data, buffered so a late status query can still show it.
    pub(super) last_qr: Arc<Mutex<Option<String>>>,
}

impl WhatsAppSession {
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
            client: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            last_qr: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Last QR code produced by the running bot, if pairing is pending.
    pub async fn pending_qr(&self) -> Option<String> {
        self.last_qr.lock().await.clone()
    }

    pub(super) fn session_db_path(&self) -> String {
        let dir = simcha_core::config::shellexpand(&self.data_dir);
        let session_dir = format!("{dir}/whatsapp_session");
        let _ = std::fs::create_dir_all(&session_dir);
        format!("{session_dir}/whatsapp.db")
    }
}
