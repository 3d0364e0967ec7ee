//! Interactive chat client
//!
//! A readline loop over the thread store: plain input is sent to the
//! relay and streamed into the active thread, slash commands manage
//! threads and drafts. State is rehydrated from the snapshot store on
//! startup and flushed by the coalescing task while running.

use crate::client::StreamConsumer;
use crate::config::Config;
use crate::error::Result;
use crate::session::StreamSession;
use crate::store::persistence::flush_now;
use crate::store::{FlushTask, SnapshotStore, ThreadStore};

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock(store: &Mutex<ThreadStore>) -> MutexGuard<'_, ThreadStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// What the command dispatcher wants the loop to do next
enum Flow {
    Continue,
    Quit,
}

/// Start the chat client
///
/// With `message` set, sends it non-interactively into the active thread
/// and exits; otherwise runs the readline loop.
pub async fn run_chat(config: Config, message: Option<String>) -> Result<()> {
    let snapshots = Arc::new(SnapshotStore::new(&config.store.path)?);
    let store = match snapshots.load()? {
        Some(snapshot) => {
            tracing::debug!("Rehydrated {} thread(s) from snapshot", snapshot.threads.len());
            ThreadStore::from_snapshot(snapshot)
        }
        None => ThreadStore::new(),
    };
    let store = Arc::new(Mutex::new(store));
    lock(&store).ensure_thread();

    let flusher = FlushTask::spawn(
        Arc::clone(&store),
        Arc::clone(&snapshots),
        Duration::from_millis(config.store.flush_interval_ms),
    );

    let consumer = StreamConsumer::new(&config.client)?;
    if consumer.check_health().await.is_err() {
        println!(
            "{}",
            format!(
                "Warning: relay at {} is not responding; sends will fail until it is up.",
                config.client.relay_url
            )
            .yellow()
        );
    }

    let outcome = match message {
        Some(text) => {
            send_message(&store, &consumer, &text).await;
            Ok(())
        }
        None => repl(&store, &consumer).await,
    };

    flusher.abort();
    flush_now(&store, &snapshots)?;
    outcome
}

async fn repl(store: &Arc<Mutex<ThreadStore>>, consumer: &StreamConsumer) -> Result<()> {
    println!("{}", "docent chat — /help for commands".cyan());
    let mut rl = DefaultEditor::new()?;

    loop {
        let (title, draft) = {
            let guard = lock(store);
            let thread = guard.active_thread();
            (
                thread.map(|t| t.title.clone()).unwrap_or_default(),
                thread.map(|t| t.draft.clone()).unwrap_or_default(),
            )
        };
        if !draft.is_empty() {
            println!("{}", format!("(draft: {})", draft).dimmed());
        }

        match rl.readline(&format!("[{}] > ", title.cyan())) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                if trimmed.starts_with('/') {
                    match dispatch_command(store, trimmed) {
                        Flow::Continue => continue,
                        Flow::Quit => break,
                    }
                }

                send_message(store, consumer, trimmed).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Send one message into the active thread and stream the reply
async fn send_message(store: &Arc<Mutex<ThreadStore>>, consumer: &StreamConsumer, text: &str) {
    let pending = {
        let mut guard = lock(store);
        let thread_id = guard.ensure_thread();
        guard.begin_stream(thread_id, text)
    };
    let Some(pending) = pending else {
        println!(
            "{}",
            "A reply is still streaming in this thread; wait for it to finish.".yellow()
        );
        return;
    };

    let mut session = StreamSession::new(Arc::clone(store), pending);
    let result = consumer
        .send_chat(text, |delta| {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
            session.on_delta(delta);
        })
        .await;

    match result {
        Ok(()) => {
            session.seal();
            println!();
        }
        Err(e) => {
            session.fail(&e);
            println!("{}", e.chat_message().red());
        }
    }
}

fn dispatch_command(store: &Arc<Mutex<ThreadStore>>, input: &str) -> Flow {
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (input, ""),
    };
    let mut guard = lock(store);

    match command {
        "/new" => {
            guard.create_thread();
            println!("Started a new thread.");
        }
        "/threads" => {
            let active = guard.active_id();
            for (i, thread) in guard.threads().iter().enumerate() {
                let marker = if Some(thread.id) == active { "*" } else { " " };
                println!(
                    "{} {:>2}. {} ({} messages)",
                    marker,
                    i + 1,
                    thread.title,
                    thread.messages.len()
                );
            }
        }
        "/switch" => match rest.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
            Some(idx) => {
                let id = guard.threads().get(idx).map(|t| t.id);
                match id {
                    Some(id) if guard.switch_active(id) => {
                        println!("Switched to thread {}.", rest);
                    }
                    _ => println!("{}", "No such thread.".yellow()),
                }
            }
            None => println!("Usage: /switch <number>"),
        },
        "/rename" => {
            let active = guard.active_id();
            match active {
                Some(id) if guard.rename_thread(id, rest) => {
                    println!("Renamed thread to {}.", rest);
                }
                _ => println!("Usage: /rename <title>"),
            }
        }
        "/delete" => {
            if let Some(id) = guard.active_id() {
                guard.delete_thread(id);
                guard.ensure_thread();
                println!("Thread deleted.");
            }
        }
        "/draft" => {
            if let Some(id) = guard.active_id() {
                guard.set_draft(id, rest);
                println!("Draft saved.");
            }
        }
        "/help" => {
            println!("/new            start a new thread");
            println!("/threads        list threads");
            println!("/switch <n>     make thread n active");
            println!("/rename <title> rename the active thread");
            println!("/delete         delete the active thread");
            println!("/draft <text>   save unsent text on the active thread");
            println!("/quit           exit");
        }
        "/quit" | "/exit" => return Flow::Quit,
        other => println!("Unknown command: {} (try /help)", other),
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_threads(n: usize) -> Arc<Mutex<ThreadStore>> {
        let store = Arc::new(Mutex::new(ThreadStore::new()));
        for _ in 0..n {
            store.lock().unwrap().create_thread();
        }
        store
    }

    #[test]
    fn test_dispatch_new_creates_thread() {
        let store = store_with_threads(1);
        assert!(matches!(dispatch_command(&store, "/new"), Flow::Continue));
        assert_eq!(store.lock().unwrap().threads().len(), 2);
    }

    #[test]
    fn test_dispatch_switch_by_index() {
        let store = store_with_threads(2);
        let first = store.lock().unwrap().threads()[0].id;
        dispatch_command(&store, "/switch 1");
        assert_eq!(store.lock().unwrap().active_id(), Some(first));
    }

    #[test]
    fn test_dispatch_switch_out_of_range_keeps_active() {
        let store = store_with_threads(2);
        let active = store.lock().unwrap().active_id();
        dispatch_command(&store, "/switch 9");
        assert_eq!(store.lock().unwrap().active_id(), active);
    }

    #[test]
    fn test_dispatch_rename_active() {
        let store = store_with_threads(1);
        dispatch_command(&store, "/rename Quarterly report");
        let guard = store.lock().unwrap();
        assert_eq!(guard.active_thread().unwrap().title, "Quarterly report");
    }

    #[test]
    fn test_dispatch_delete_last_thread_recreates() {
        let store = store_with_threads(1);
        dispatch_command(&store, "/delete");
        let guard = store.lock().unwrap();
        assert_eq!(guard.threads().len(), 1);
        assert!(guard.active_id().is_some());
    }

    #[test]
    fn test_dispatch_draft_sets_active_draft() {
        let store = store_with_threads(1);
        dispatch_command(&store, "/draft not ready to send");
        let guard = store.lock().unwrap();
        assert_eq!(guard.active_thread().unwrap().draft, "not ready to send");
    }

    #[test]
    fn test_dispatch_quit() {
        let store = store_with_threads(1);
        assert!(matches!(dispatch_command(&store, "/quit"), Flow::Quit));
        assert!(matches!(dispatch_command(&store, "/exit"), Flow::Quit));
    }
}
