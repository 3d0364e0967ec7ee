//! Per-send stream session
//!
//! A `StreamSession` is the ephemeral object bound to one outstanding
//! send. It owns the accumulation buffer and routes every mutation to
//! its thread by id, so the user switching threads mid-stream cannot
//! misroute deltas. It finishes exactly once: after `seal` or `fail`,
//! further deltas and duplicate terminals are dropped.

use crate::error::DocentError;
use crate::store::{PendingStream, ThreadStore, ERROR_MARKER};

use std::sync::{Arc, Mutex, MutexGuard};

fn lock(store: &Mutex<ThreadStore>) -> MutexGuard<'_, ThreadStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Accumulator for one streamed assistant reply
pub struct StreamSession {
    store: Arc<Mutex<ThreadStore>>,
    pending: PendingStream,
    buffer: String,
    done: bool,
}

impl StreamSession {
    /// Bind a session to the placeholder `begin_stream` created
    pub fn new(store: Arc<Mutex<ThreadStore>>, pending: PendingStream) -> Self {
        Self {
            store,
            pending,
            buffer: String::new(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Current accumulated content
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Apply one delta
    ///
    /// The message content becomes the concatenation of every delta seen
    /// so far. Deltas arriving after the session finished are dropped.
    pub fn on_delta(&mut self, delta: &str) {
        if self.done {
            tracing::debug!(
                "Dropping late delta for message {} ({} chars)",
                self.pending.message_id,
                delta.chars().count()
            );
            return;
        }
        self.buffer.push_str(delta);
        let content = self.buffer.clone();
        let message_id = self.pending.message_id;
        lock(&self.store).update_thread_messages(self.pending.thread_id, |messages| {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                if message.typing {
                    message.content = content;
                }
            }
        });
    }

    /// Seal the message with its current content; idempotent
    pub fn seal(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let message_id = self.pending.message_id;
        let mut store = lock(&self.store);
        store.update_thread_messages(self.pending.thread_id, |messages| {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.typing = false;
            }
        });
        store.finish_stream(self.pending.thread_id);
    }

    /// Fail the message, replacing its content wholesale; idempotent
    ///
    /// Partial content is discarded: a half-answer followed by silence
    /// reads as an answer, so the whole message becomes the marked error
    /// string instead.
    pub fn fail(&mut self, error: &DocentError) {
        if self.done {
            return;
        }
        self.done = true;
        let message_id = self.pending.message_id;
        let content = format!("{}{}", ERROR_MARKER, error.chat_message());
        let mut store = lock(&self.store);
        store.update_thread_messages(self.pending.thread_id, |messages| {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.content = content;
                message.typing = false;
            }
        });
        store.finish_stream(self.pending.thread_id);
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // an abandoned session must not leave the thread busy forever
        if !self.done {
            self.fail(&DocentError::Transport("stream abandoned".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageState;
    use uuid::Uuid;

    fn setup() -> (Arc<Mutex<ThreadStore>>, Uuid, StreamSession) {
        let store = Arc::new(Mutex::new(ThreadStore::new()));
        let (thread_id, pending) = {
            let mut guard = store.lock().unwrap();
            let thread_id = guard.create_thread();
            let pending = guard.begin_stream(thread_id, "hello").unwrap();
            (thread_id, pending)
        };
        let session = StreamSession::new(Arc::clone(&store), pending);
        (store, thread_id, session)
    }

    fn assistant_message(store: &Mutex<ThreadStore>, thread_id: Uuid) -> crate::store::Message {
        store
            .lock()
            .unwrap()
            .get(thread_id)
            .unwrap()
            .messages
            .last()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_deltas_concatenate_in_order() {
        let (store, thread_id, mut session) = setup();
        for delta in ["He", "llo", " there"] {
            session.on_delta(delta);
        }
        session.seal();

        let message = assistant_message(&store, thread_id);
        assert_eq!(message.content, "Hello there");
        assert!(!message.typing);
        assert_eq!(message.state(), MessageState::Sealed);
    }

    #[test]
    fn test_seal_is_idempotent() {
        let (store, thread_id, mut session) = setup();
        session.on_delta("Hi");
        session.seal();
        session.seal();

        let message = assistant_message(&store, thread_id);
        assert_eq!(message.content, "Hi");
        assert_eq!(message.state(), MessageState::Sealed);
    }

    #[test]
    fn test_late_deltas_are_dropped() {
        let (store, thread_id, mut session) = setup();
        session.on_delta("final");
        session.seal();
        session.on_delta(" extra");

        assert_eq!(assistant_message(&store, thread_id).content, "final");
    }

    #[test]
    fn test_fail_replaces_partial_content() {
        let (store, thread_id, mut session) = setup();
        session.on_delta("half an ans");
        session.fail(&DocentError::Timeout(60));

        let message = assistant_message(&store, thread_id);
        assert!(message.content.starts_with(ERROR_MARKER));
        assert!(message.content.contains("too long"));
        assert!(!message.content.contains("half an ans"));
        assert_eq!(message.state(), MessageState::Errored);
    }

    #[test]
    fn test_fail_after_seal_is_noop() {
        let (store, thread_id, mut session) = setup();
        session.on_delta("done");
        session.seal();
        session.fail(&DocentError::Transport("reset".to_string()));

        assert_eq!(assistant_message(&store, thread_id).content, "done");
    }

    #[test]
    fn test_finish_clears_busy_flag() {
        let (store, thread_id, mut session) = setup();
        assert!(store.lock().unwrap().get(thread_id).unwrap().busy);
        session.seal();
        assert!(!store.lock().unwrap().get(thread_id).unwrap().busy);
    }

    #[test]
    fn test_deltas_route_to_origin_thread_after_switch() {
        let (store, thread_id, mut session) = setup();
        let other = store.lock().unwrap().create_thread();
        assert_eq!(store.lock().unwrap().active_id(), Some(other));

        session.on_delta("routed");
        session.seal();

        assert_eq!(assistant_message(&store, thread_id).content, "routed");
        let guard = store.lock().unwrap();
        // the other thread only has its greeting
        assert_eq!(guard.get(other).unwrap().messages.len(), 1);
    }

    #[test]
    fn test_dropped_session_errors_its_message() {
        let (store, thread_id, session) = setup();
        drop(session);

        let message = assistant_message(&store, thread_id);
        assert_eq!(message.state(), MessageState::Errored);
        assert!(!store.lock().unwrap().get(thread_id).unwrap().busy);
    }
}
