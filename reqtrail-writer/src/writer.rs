//! Append-only JSON line writer.
//!
//! Callers hand over an entry and return immediately: the line is serialised
//! on the caller, queued on an unbounded channel, and appended by a single
//! background task. Write failures go to the configured [`ErrorReporter`]
//! and are otherwise dropped; nothing is retried.
//!
//! Each line is written with one append-mode write, so lines from other
//! processes sharing the file never interleave within a record.

use crate::reporter::ErrorReporter;
use reqtrail_core::{LogEntry, TrailError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

enum WriteTask {
    Append(String),
    /// Acknowledged once every earlier task has been handled.
    Flush(oneshot::Sender<()>),
}

/// Handle to the background append task. Cheap to clone; all clones feed
/// the same queue.
#[derive(Clone)]
pub struct LogWriter {
    path: Arc<PathBuf>,
    tx: mpsc::UnboundedSender<WriteTask>,
    reporter: Arc<dyn ErrorReporter>,
}

impl LogWriter {
    /// Start the background task appending to `path`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, reporter: Arc<dyn ErrorReporter>) -> Self {
        let path = Arc::new(path.into());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(append_loop(Arc::clone(&path), rx, Arc::clone(&reporter)));
        debug!(path = %path.display(), "Log writer started");
        Self { path, tx, reporter }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise `entry` and queue it. Never blocks, never fails.
    pub fn append(&self, entry: &LogEntry, pretty: bool) {
        match entry.to_json_line(pretty) {
            Ok(line) => self.append_line(line),
            Err(e) => self.reporter.report(&self.path, &TrailError::from(e)),
        }
    }

    /// Queue an already serialised, newline-terminated line.
    pub fn append_line(&self, line: String) {
        if self.tx.send(WriteTask::Append(line)).is_err() {
            self.reporter.report(&self.path, &TrailError::WriterClosed);
        }
    }

    /// Wait until every line queued before this call has been handled
    /// (written or reported).
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteTask::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter").field("path", &self.path).finish()
    }
}

async fn append_loop(
    path: Arc<PathBuf>,
    mut rx: mpsc::UnboundedReceiver<WriteTask>,
    reporter: Arc<dyn ErrorReporter>,
) {
    while let Some(task) = rx.recv().await {
        match task {
            WriteTask::Append(line) => {
                if let Err(e) = append_to(&path, line.as_bytes()).await {
                    reporter.report(&path, &e);
                }
            }
            WriteTask::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!(path = %path.display(), "Log writer stopped");
}

async fn append_to(path: &Path, bytes: &[u8]) -> Result<(), TrailError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !fs::try_exists(parent).await.unwrap_or(false) {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::TracingReporter;
    use std::sync::Mutex;

    fn writer(path: &Path) -> LogWriter {
        LogWriter::spawn(path, Arc::new(TracingReporter))
    }

    fn entry(id: &str) -> LogEntry {
        LogEntry::new(id, "GET", "/items?page=2", 200)
    }

    #[tokio::test]
    async fn writes_compact_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let w = writer(&path);

        w.append(&entry("req-1"), false);
        w.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
        assert_eq!(parsed["requestId"], "req-1");
        assert_eq!(parsed["route"], "/items?page=2");
    }

    #[tokio::test]
    async fn appends_in_queue_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let w = writer(&path);

        for id in ["a", "b", "c"] {
            w.append(&entry(id), false);
        }
        w.flush().await;

        let ids: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<LogEntry>(l).unwrap().request_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn appends_to_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        std::fs::write(&path, "existing\n").unwrap();
        let w = writer(&path);

        w.append(&entry("req-2"), false);
        w.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("existing\n"));
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn pretty_output_spans_lines_and_ends_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let w = writer(&path);

        w.append(&entry("req-3"), true);
        w.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\n  \"requestId\": \"req-3\""));
        assert!(content.ends_with("}\n"));
        let parsed: LogEntry = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.status, 200);
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("requests.log");
        let w = writer(&path);

        w.append(&entry("req-4"), false);
        w.flush().await;

        assert!(path.exists());
    }

    #[tokio::test]
    async fn write_failure_goes_to_reporter() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join("requests.log");

        let reported: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&reported);
        let w = LogWriter::spawn(&path, Arc::new(move |p: &Path, e: &TrailError| {
            sink.lock().unwrap().push(format!("{}: {e}", p.display()));
        }));

        w.append(&entry("req-5"), false);
        w.flush().await;

        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("requests.log"));
        assert!(reported[0].contains("IO error"));
    }

    #[tokio::test]
    async fn clones_share_one_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let w = writer(&path);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let w = w.clone();
                tokio::spawn(async move { w.append(&entry(&format!("req-{i}")), false) })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        w.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 8);
        for line in content.lines() {
            serde_json::from_str::<LogEntry>(line).unwrap();
        }
    }
}
