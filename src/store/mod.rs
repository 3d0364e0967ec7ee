//! Multi-thread conversation state
//!
//! `ThreadStore` owns the ordered thread collection, the active-thread
//! pointer, and the process-wide message id counter. In-memory state is
//! authoritative; every mutation sets a shared dirty flag that the
//! persistence flush task watches. Mutations replace the thread entry
//! wholesale so readers always observe a consistent record.

pub mod persistence;
pub mod thread;

pub use persistence::{FlushTask, SnapshotStore, StoreSnapshot};
pub use thread::{Message, MessageState, Role, Thread, DEFAULT_TITLE, ERROR_MARKER, GREETING};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Handle to a stream opened by `begin_stream`
///
/// Identifies the typing placeholder a session mutates. Carrying the
/// thread id (not "the active thread") means switching threads while a
/// reply streams in cannot misroute deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStream {
    pub thread_id: Uuid,
    pub message_id: u64,
}

/// Ordered collection of conversation threads
#[derive(Debug)]
pub struct ThreadStore {
    threads: Vec<Thread>,
    active: Option<Uuid>,
    next_message_id: u64,
    dirty: Arc<AtomicBool>,
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadStore {
    /// An empty store; call `ensure_thread` before first use
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            active: None,
            next_message_id: 1,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Rebuild a store from a persisted snapshot
    ///
    /// The message id counter resumes above the highest persisted id so
    /// new messages keep the highest-id-is-newest property.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let StoreSnapshot {
            mut threads,
            active,
        } = snapshot;
        // no stream survives a restart
        for thread in &mut threads {
            thread.busy = false;
        }
        let max_id = threads
            .iter()
            .filter_map(Thread::max_message_id)
            .max()
            .unwrap_or(0);
        let active = active.filter(|id| threads.iter().any(|t| t.id == *id));
        Self {
            threads,
            active,
            next_message_id: max_id + 1,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state as a persistable value
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            threads: self.threads.clone(),
            active: self.active,
        }
    }

    /// Shared flag the flush task polls
    pub fn dirty_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dirty)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn allocate_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    /// All threads in insertion order
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: Uuid) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.threads.iter().position(|t| t.id == id)
    }

    /// Create a fresh thread and make it active
    pub fn create_thread(&mut self) -> Uuid {
        let greeting_id = self.allocate_message_id();
        let thread = Thread::new(greeting_id);
        let id = thread.id;
        self.threads.push(thread);
        self.active = Some(id);
        self.mark_dirty();
        tracing::debug!("Created thread {}", id);
        id
    }

    /// Create a thread only if the store is empty
    pub fn ensure_thread(&mut self) -> Uuid {
        match self.active.or_else(|| self.threads.first().map(|t| t.id)) {
            Some(id) => {
                if self.active.is_none() {
                    self.active = Some(id);
                    self.mark_dirty();
                }
                id
            }
            None => self.create_thread(),
        }
    }

    /// Make `id` the active thread; unknown ids are a no-op
    pub fn switch_active(&mut self, id: Uuid) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        if self.active != Some(id) {
            self.active = Some(id);
            self.mark_dirty();
        }
        true
    }

    /// User-invoked rename; blank titles are ignored
    pub fn rename_thread(&mut self, id: Uuid, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let mut entry = self.threads[idx].clone();
        entry.title = title.to_string();
        entry.touch();
        self.threads[idx] = entry;
        self.mark_dirty();
        true
    }

    /// Programmatic rename that never clobbers a user-chosen title
    pub fn rename_if_default(&mut self, id: Uuid, suggested: &str) -> bool {
        match self.get(id) {
            Some(thread) if thread.has_default_title() => self.rename_thread(id, suggested),
            _ => false,
        }
    }

    /// Remove a thread
    ///
    /// If it was active, the pointer moves to the first remaining thread,
    /// or to none when the store empties; callers restore the non-empty
    /// invariant with `ensure_thread`.
    pub fn delete_thread(&mut self, id: Uuid) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        self.threads.remove(idx);
        if self.active == Some(id) {
            self.active = self.threads.first().map(|t| t.id);
        }
        self.mark_dirty();
        tracing::debug!("Deleted thread {}", id);
        true
    }

    /// Overwrite a thread's draft; visible immediately, persisted later
    pub fn set_draft(&mut self, id: Uuid, text: &str) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let mut entry = self.threads[idx].clone();
        entry.draft = text.to_string();
        entry.touch();
        self.threads[idx] = entry;
        self.mark_dirty();
        true
    }

    /// Transform the active thread's messages; no-op without one
    pub fn update_active_messages(&mut self, f: impl FnOnce(&mut Vec<Message>)) -> bool {
        match self.active {
            Some(id) => self.update_thread_messages(id, f),
            None => false,
        }
    }

    /// Transform one thread's messages by id
    ///
    /// In-flight sessions address their thread through this, so deltas
    /// land in the right place even after the user switches away.
    pub fn update_thread_messages(&mut self, id: Uuid, f: impl FnOnce(&mut Vec<Message>)) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let mut entry = self.threads[idx].clone();
        f(&mut entry.messages);
        entry.touch();
        self.threads[idx] = entry;
        self.mark_dirty();
        true
    }

    /// Start a send on a thread
    ///
    /// Appends the sealed user message and the typing placeholder, marks
    /// the thread busy, and returns the handle the session needs. Returns
    /// `None` for an unknown thread or one with a stream already in
    /// flight (single in-flight stream per thread).
    pub fn begin_stream(&mut self, id: Uuid, user_text: &str) -> Option<PendingStream> {
        let idx = self.index_of(id)?;
        if self.threads[idx].busy {
            tracing::debug!("Rejected concurrent send on busy thread {}", id);
            return None;
        }
        let user_id = self.allocate_message_id();
        let assistant_id = self.allocate_message_id();
        let mut entry = self.threads[idx].clone();
        entry.messages.push(Message::user(user_id, user_text));
        entry.messages.push(Message::pending_assistant(assistant_id));
        entry.draft.clear();
        entry.busy = true;
        entry.touch();
        self.threads[idx] = entry;
        self.mark_dirty();
        Some(PendingStream {
            thread_id: id,
            message_id: assistant_id,
        })
    }

    /// End a send; idempotent
    pub fn finish_stream(&mut self, id: Uuid) {
        if let Some(idx) = self.index_of(id) {
            if self.threads[idx].busy {
                self.threads[idx].busy = false;
                self.mark_dirty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty(store: &ThreadStore) -> bool {
        store.dirty_flag().load(Ordering::Acquire)
    }

    fn clear_dirty(store: &ThreadStore) {
        store.dirty_flag().store(false, Ordering::Release);
    }

    #[test]
    fn test_create_thread_becomes_active() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        assert_eq!(store.active_id(), Some(id));
        assert_eq!(store.threads().len(), 1);
        assert!(dirty(&store));
    }

    #[test]
    fn test_ensure_thread_is_lazy() {
        let mut store = ThreadStore::new();
        let id = store.ensure_thread();
        assert_eq!(store.ensure_thread(), id);
        assert_eq!(store.threads().len(), 1);
    }

    #[test]
    fn test_switch_active_unknown_id_is_noop() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        clear_dirty(&store);
        assert!(!store.switch_active(Uuid::new_v4()));
        assert_eq!(store.active_id(), Some(id));
        assert!(!dirty(&store));
    }

    #[test]
    fn test_switch_active_between_threads() {
        let mut store = ThreadStore::new();
        let first = store.create_thread();
        let second = store.create_thread();
        assert_eq!(store.active_id(), Some(second));
        assert!(store.switch_active(first));
        assert_eq!(store.active_id(), Some(first));
    }

    #[test]
    fn test_rename_thread_ignores_blank() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        assert!(!store.rename_thread(id, "   "));
        assert_eq!(store.get(id).unwrap().title, DEFAULT_TITLE);
        assert!(store.rename_thread(id, "Quarterly report"));
        assert_eq!(store.get(id).unwrap().title, "Quarterly report");
    }

    #[test]
    fn test_rename_if_default_never_clobbers_user_title() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();

        assert!(store.rename_if_default(id, "report.pdf"));
        assert_eq!(store.get(id).unwrap().title, "report.pdf");

        // second suggestion must not replace the now-custom title
        assert!(!store.rename_if_default(id, "other.pdf"));
        assert_eq!(store.get(id).unwrap().title, "report.pdf");
    }

    #[test]
    fn test_delete_active_thread_moves_pointer_to_survivor() {
        let mut store = ThreadStore::new();
        let first = store.create_thread();
        let second = store.create_thread();
        assert!(store.delete_thread(second));
        assert_eq!(store.active_id(), Some(first));
    }

    #[test]
    fn test_delete_last_thread_empties_pointer_then_ensure_recreates() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        assert!(store.delete_thread(id));
        assert_eq!(store.active_id(), None);
        assert!(store.threads().is_empty());

        let fresh = store.ensure_thread();
        assert_eq!(store.active_id(), Some(fresh));
        assert_eq!(store.get(fresh).unwrap().messages[0].content, GREETING);
    }

    #[test]
    fn test_set_draft_is_immediately_visible() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        clear_dirty(&store);
        assert!(store.set_draft(id, "unsent text"));
        assert_eq!(store.get(id).unwrap().draft, "unsent text");
        assert!(dirty(&store));
    }

    #[test]
    fn test_drafts_are_independent_per_thread() {
        let mut store = ThreadStore::new();
        let first = store.create_thread();
        let second = store.create_thread();
        store.set_draft(first, "alpha");
        store.set_draft(second, "beta");
        assert_eq!(store.get(first).unwrap().draft, "alpha");
        assert_eq!(store.get(second).unwrap().draft, "beta");
    }

    #[test]
    fn test_begin_stream_appends_user_and_placeholder() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        let pending = store.begin_stream(id, "hello").unwrap();
        assert_eq!(pending.thread_id, id);

        let thread = store.get(id).unwrap();
        assert_eq!(thread.messages.len(), 3);
        assert_eq!(thread.messages[1].role, Role::User);
        assert_eq!(thread.messages[1].content, "hello");
        assert!(thread.messages[2].typing);
        assert_eq!(thread.messages[2].id, pending.message_id);
        assert!(thread.busy);
        // placeholder carries the highest id in the thread
        assert_eq!(thread.max_message_id(), Some(pending.message_id));
    }

    #[test]
    fn test_begin_stream_clears_draft() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        store.set_draft(id, "hello");
        store.begin_stream(id, "hello").unwrap();
        assert!(store.get(id).unwrap().draft.is_empty());
    }

    #[test]
    fn test_second_concurrent_send_on_same_thread_is_rejected() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        assert!(store.begin_stream(id, "first").is_some());
        assert!(store.begin_stream(id, "second").is_none());

        store.finish_stream(id);
        assert!(store.begin_stream(id, "third").is_some());
    }

    #[test]
    fn test_sends_on_distinct_threads_may_overlap() {
        let mut store = ThreadStore::new();
        let first = store.create_thread();
        let second = store.create_thread();
        assert!(store.begin_stream(first, "a").is_some());
        assert!(store.begin_stream(second, "b").is_some());
    }

    #[test]
    fn test_update_thread_messages_routes_by_id_not_active() {
        let mut store = ThreadStore::new();
        let target = store.create_thread();
        let other = store.create_thread();
        store.switch_active(other);

        let before = store.get(other).unwrap().messages.len();
        assert!(store.update_thread_messages(target, |messages| {
            messages.push(Message::assistant(99, "routed"));
        }));
        assert_eq!(store.get(other).unwrap().messages.len(), before);
        assert_eq!(
            store.get(target).unwrap().messages.last().unwrap().content,
            "routed"
        );
    }

    #[test]
    fn test_update_active_messages_noop_without_active() {
        let mut store = ThreadStore::new();
        assert!(!store.update_active_messages(|m| m.clear()));
    }

    #[test]
    fn test_snapshot_roundtrip_resumes_message_ids() {
        let mut store = ThreadStore::new();
        let id = store.create_thread();
        let pending = store.begin_stream(id, "hello").unwrap();
        let snapshot = store.snapshot();

        let mut restored = ThreadStore::from_snapshot(snapshot);
        assert_eq!(restored.active_id(), Some(id));
        let fresh = restored.begin_stream(id, "again").unwrap();
        assert!(fresh.message_id > pending.message_id);
    }

    #[test]
    fn test_from_snapshot_drops_stale_active_pointer() {
        let snapshot = StoreSnapshot {
            threads: Vec::new(),
            active: Some(Uuid::new_v4()),
        };
        let store = ThreadStore::from_snapshot(snapshot);
        assert_eq!(store.active_id(), None);
    }
}
