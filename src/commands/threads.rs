//! Thread inspection command handler

use crate::config::Config;
use crate::error::Result;
use crate::store::{SnapshotStore, StoreSnapshot};

use colored::Colorize;
use serde_json::json;

/// List the persisted threads
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `json` - Emit machine-readable JSON instead of a table
pub fn run_threads(config: Config, json: bool) -> Result<()> {
    let snapshots = SnapshotStore::new(&config.store.path)?;
    let snapshot = snapshots.load()?.unwrap_or(StoreSnapshot {
        threads: Vec::new(),
        active: None,
    });
    print!("{}", render(&snapshot, json));
    Ok(())
}

fn render(snapshot: &StoreSnapshot, json: bool) -> String {
    if json {
        let listing: Vec<_> = snapshot
            .threads
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "title": t.title,
                    "messages": t.messages.len(),
                    "updated_at": t.updated_at,
                    "active": snapshot.active == Some(t.id),
                })
            })
            .collect();
        let mut out = serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string());
        out.push('\n');
        return out;
    }

    if snapshot.threads.is_empty() {
        return "No threads persisted yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, thread) in snapshot.threads.iter().enumerate() {
        let marker = if snapshot.active == Some(thread.id) {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        out.push_str(&format!(
            "{} {:>2}. {}  ({} messages, updated {})\n",
            marker,
            i + 1,
            thread.title,
            thread.messages.len(),
            thread.updated_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ThreadStore;

    fn snapshot_with_threads(n: usize) -> StoreSnapshot {
        let mut store = ThreadStore::new();
        for _ in 0..n {
            store.create_thread();
        }
        store.snapshot()
    }

    #[test]
    fn test_render_empty_table() {
        let snapshot = StoreSnapshot {
            threads: Vec::new(),
            active: None,
        };
        assert_eq!(render(&snapshot, false), "No threads persisted yet.\n");
    }

    #[test]
    fn test_render_table_marks_active() {
        let snapshot = snapshot_with_threads(2);
        let out = render(&snapshot, false);
        assert_eq!(out.lines().count(), 2);
        assert!(out.contains("New chat"));
    }

    #[test]
    fn test_render_json_listing() {
        let snapshot = snapshot_with_threads(2);
        let out = render(&snapshot, true);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let listing = value.as_array().unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0]["active"], false);
        assert_eq!(listing[1]["active"], true);
        assert_eq!(listing[0]["messages"], 1);
    }

    #[test]
    fn test_render_empty_json_is_empty_array() {
        let snapshot = StoreSnapshot {
            threads: Vec::new(),
            active: None,
        };
        let value: serde_json::Value = serde_json::from_str(&render(&snapshot, true)).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }
}
