//! # simcha-core
//!
//! Core types, config, and error handling for simcha.

pub mod config;
pub mod error;
pub mod invite;
pub mod phone;
