//! Client side of the relay protocol

pub mod consumer;

pub use consumer::{consume_frames, StreamConsumer};
