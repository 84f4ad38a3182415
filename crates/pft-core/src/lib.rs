//! Core triage engine for NHS Pharmacy First consultations.
//!
//! Framework-agnostic: channels (voice, chat, console) and storage live behind
//! ports implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod extract;
pub mod interpreter;
pub mod logging;
pub mod orchestrator;
pub mod ports;
pub mod protocol;
pub mod triage;

pub use errors::{Error, Result};
