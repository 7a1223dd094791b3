//! # simcha-channels
//!
//! Delivery channels for simcha: the SMS gateway client and the WhatsApp
//! relay session.

pub mod pace;
pub mod session_store;
pub mod sms;
pub mod whatsapp;
