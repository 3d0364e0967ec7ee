//! Conversation thread data model
//!
//! Threads and messages are plain serializable records; the mutation
//! rules live in the store and the stream session. The `busy` flag is
//! runtime-only and never persisted, so a restart always comes back with
//! no stream in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to every freshly created thread
pub const DEFAULT_TITLE: &str = "New chat";

/// Greeting shown as the first message of a fresh thread
pub const GREETING: &str = "Hello! Upload a document or ask me anything about it.";

/// Marker prefixing the content of an errored message
pub const ERROR_MARKER: &str = "⚠️ ";

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle state of a message, derived from its fields
///
/// `Pending` and `Accumulating` only occur while a stream session owns
/// the message; everything at rest is `Sealed` or `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Placeholder created, no content yet
    Pending,
    /// Deltas arriving, content growing
    Accumulating,
    /// Final content, never stream-mutated again
    Sealed,
    /// Content replaced with a marked error string, final
    Errored,
}

/// One message in a thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Monotonically increasing within the process lifetime
    pub id: u64,
    pub role: Role,
    pub content: String,
    /// True only while content is still being accumulated from a stream
    pub typing: bool,
    /// Creation time, set once
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A sealed user message
    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            typing: false,
            timestamp: Utc::now(),
        }
    }

    /// A sealed assistant message
    pub fn assistant(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            typing: false,
            timestamp: Utc::now(),
        }
    }

    /// The typing placeholder a stream session will fill in
    pub fn pending_assistant(id: u64) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            typing: true,
            timestamp: Utc::now(),
        }
    }

    pub fn state(&self) -> MessageState {
        match (self.typing, self.content.is_empty()) {
            (true, true) => MessageState::Pending,
            (true, false) => MessageState::Accumulating,
            (false, _) if self.content.starts_with(ERROR_MARKER) => MessageState::Errored,
            (false, _) => MessageState::Sealed,
        }
    }
}

/// One independent conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    /// Unsent composer text, kept per thread
    pub draft: String,
    /// Last mutation time; sort/display only
    pub updated_at: DateTime<Utc>,
    /// Set while a stream session targets this thread; runtime-only
    #[serde(skip)]
    pub busy: bool,
}

impl Thread {
    /// A fresh thread with the default title and a sealed greeting
    pub fn new(greeting_id: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            messages: vec![Message::assistant(greeting_id, GREETING)],
            draft: String::new(),
            updated_at: Utc::now(),
            busy: false,
        }
    }

    /// Whether the title is still the one `new` assigned
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Refresh `updated_at` after a mutation
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Highest message id present, if any
    pub fn max_message_id(&self) -> Option<u64> {
        self.messages.iter().map(|m| m.id).max()
    }
}
