//! Ditto client: streaming chat for the Ditto companion backend
//!
//! The core is [`services::chat::ChatClient`], which sends a chat turn and
//! decodes the event-stream response incrementally, routing each event to a
//! caller-supplied [`services::streaming::StreamHandlers`] table.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod services;

// Re-exports for convenience
pub use error::{DittoError, Result};
