//! Chat application module for interactive conversations with AI providers.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! provider clients. It supports:
//!
//! - Streaming responses with live markdown rendering
//! - Bare-word commands for session control
//! - Runtime provider and model switching
//!
//! # Architecture
//!
//! The module is organized into two components:
//!
//! - [`commands`](self): command parsing and help text
//! - [`session`](self): conversation state and exchange orchestration

mod commands;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use session::{ChatSession, ExchangeOutcome};
