//! Call session management
//!
//! This module provides the `CallSession` controller that manages:
//! - Microphone capture acquisition
//! - The WebSocket call transport
//! - Outbound audio frame encoding at a fixed cadence
//! - Inbound multiplexing of audio payloads and control messages
//! - The ordered transcript log
//! - Session statistics and lifecycle state

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::CallSession;
pub use stats::{CallStatus, SessionStats};
