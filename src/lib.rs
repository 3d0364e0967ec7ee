//! Docent - streaming document-assistant chat library
//!
//! This library provides the core functionality for Docent: a relay
//! server that streams incremental LLM output to clients as framed
//! events, and a client-side conversation manager with persisted,
//! independent threads.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `relay`: HTTP relay server, upstream generator client, document context
//! - `sse`: wire framing shared by the relay and the consumer
//! - `client`: stream consumer (request, decode loop, deadlines)
//! - `session`: per-send message accumulator state machine
//! - `store`: thread collection, drafts, snapshot persistence
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use docent::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     // Relay or chat-client usage would go here
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod relay;
pub mod session;
pub mod sse;
pub mod store;

// Re-export commonly used types
pub use client::StreamConsumer;
pub use config::Config;
pub use error::{DocentError, Result};
pub use relay::{Generator, OllamaGenerator, RelayState};
pub use session::StreamSession;
pub use store::{Thread, ThreadStore};
