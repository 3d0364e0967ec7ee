/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `serve`   — Run the streaming relay server
- `chat`    — Interactive chat client against a running relay
- `threads` — Inspect persisted conversation threads

The handlers are intentionally small and wire together the library
components: the relay, the stream consumer, and the thread store.
*/

pub mod chat;
pub mod serve;
pub mod threads;
