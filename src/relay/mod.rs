//! Streaming relay: HTTP server, upstream generator, document context
//!
//! The relay sits between chat clients and the text generator. It owns
//! prompt assembly (including the bounded document slice) and the wire
//! framing of incremental output; clients only ever see frames.

pub mod context;
pub mod server;
pub mod upstream;

pub use context::{build_system_prompt, ContextSource, FileContextSource, NoContext};
pub use server::{router, serve, RelayState, ERROR_FRAME_TEXT};
pub use upstream::{DeltaStream, Generator, OllamaGenerator, ScriptedEvent, ScriptedGenerator};
