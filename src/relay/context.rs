//! Document context seeding for the relay
//!
//! Before each upstream call the relay reads the latest uploaded document
//! text and folds a bounded slice of it into the system prompt. The
//! source is a trait so tests can inject fixed text and the server can
//! run with no document at all.

use crate::error::Result;

use async_trait::async_trait;
use std::path::PathBuf;

/// Placeholder used in the prompt when no document has been uploaded
pub const NO_DOCUMENT: &str = "NO_DOCUMENT_UPLOADED";

/// Provider of the latest document text
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// The current document text, or `None` when nothing is uploaded
    async fn latest_text(&self) -> Result<Option<String>>;
}

/// Context source reading a plain-text file on every request
///
/// Reading per request (rather than caching) means a re-uploaded document
/// is visible to the very next chat send.
pub struct FileContextSource {
    path: PathBuf,
}

impl FileContextSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContextSource for FileContextSource {
    async fn latest_text(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Context source for a relay with no document configured
pub struct NoContext;

#[async_trait]
impl ContextSource for NoContext {
    async fn latest_text(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Fixed-text context source for tests
pub struct StaticContext(pub String);

#[async_trait]
impl ContextSource for StaticContext {
    async fn latest_text(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Build the system prompt for one exchange
///
/// The document slice is bounded by `char_budget` characters (a char
/// boundary, not a byte offset, so multi-byte text never splits) and the
/// reply-language hint becomes the closing instruction line.
pub fn build_system_prompt(
    document: Option<&str>,
    char_budget: usize,
    reply_language: &str,
) -> String {
    let lang_line = match reply_language {
        "ar" => "Answer in Arabic.",
        "en" => "Answer in English.",
        _ => "Answer in the same language of the user.",
    };

    let context = match document {
        Some(text) if !text.is_empty() => bounded_slice(text, char_budget),
        _ => NO_DOCUMENT,
    };

    format!(
        "You are a senior document assistant.\n\
         You have access to the following document context (may be empty):\n\
         \"\"\"{}\"\"\"\n\
         Answer based ONLY on the document when the user asks about its content.\n\
         If info is missing, say you don't have it and suggest to upload/clarify.\n\
         {}",
        context, lang_line
    )
}

/// First `budget` characters of `text`
fn bounded_slice(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_slice_short_text_unchanged() {
        assert_eq!(bounded_slice("hello", 100), "hello");
    }

    #[test]
    fn test_bounded_slice_counts_chars_not_bytes() {
        // four Arabic letters, two-byte each
        assert_eq!(bounded_slice("مرحبا", 3), "مرح");
    }

    #[test]
    fn test_prompt_without_document_uses_placeholder() {
        let prompt = build_system_prompt(None, 100, "auto");
        assert!(prompt.contains(NO_DOCUMENT));
        assert!(prompt.contains("Answer in the same language of the user."));
    }

    #[test]
    fn test_prompt_includes_bounded_document() {
        let prompt = build_system_prompt(Some("abcdef"), 3, "en");
        assert!(prompt.contains("\"\"\"abc\"\"\""));
        assert!(!prompt.contains("abcd"));
        assert!(prompt.ends_with("Answer in English."));
    }

    #[test]
    fn test_prompt_language_lines() {
        assert!(build_system_prompt(None, 10, "ar").ends_with("Answer in Arabic."));
        assert!(build_system_prompt(None, 10, "en").ends_with("Answer in English."));
        assert!(build_system_prompt(None, 10, "auto")
            .ends_with("Answer in the same language of the user."));
    }

    #[tokio::test]
    async fn test_file_source_missing_file_is_none() {
        let source = FileContextSource::new("/nonexistent/document.txt");
        assert!(source.latest_text().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_source_reads_latest_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.txt");
        let source = FileContextSource::new(&path);

        tokio::fs::write(&path, "first").await.unwrap();
        assert_eq!(source.latest_text().await.unwrap().unwrap(), "first");

        tokio::fs::write(&path, "second").await.unwrap();
        assert_eq!(source.latest_text().await.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn test_file_source_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.txt");
        tokio::fs::write(&path, "  \n").await.unwrap();
        let source = FileContextSource::new(&path);
        assert!(source.latest_text().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_context_is_none() {
        assert!(NoContext.latest_text().await.unwrap().is_none());
    }
}
