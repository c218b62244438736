//! Destinations for latency records.
//!
//! The turn tracker hands every [`LatencyEvent`] to a [`LatencySink`]. The
//! production sink, [`LatencyLog`], appends the rendered line to a daily log
//! file and mirrors it through `tracing` under the `latency` target.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use time::OffsetDateTime;
use time::macros::format_description;

use super::event::{LatencyEvent, LatencyEventKind};

/// Receives latency records from turn trackers.
///
/// Implementations must be cheap to call: `record` runs on the relay's
/// per-message path.
pub trait LatencySink: Send + Sync {
    fn record(&self, event: &LatencyEvent);
}

/// Append-only latency log file plus `tracing` mirror.
///
/// Lines are written as `"<UTC timestamp> | <event line>"`, one per record.
pub struct LatencyLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl LatencyLog {
    /// Open (or create) `latency_YYYYMMDD.log` for today inside `dir`.
    pub fn open_daily(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let date = OffsetDateTime::now_utc()
            .format(format_description!("[year][month][day]"))
            .map_err(io::Error::other)?;
        Self::open(dir.join(format!("latency_{date}.log")))
    }

    /// Open (or create) an explicit log file path.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the last `limit` lines of the log file.
    ///
    /// A missing file yields an empty list.
    pub async fn tail(&self, limit: usize) -> io::Result<Vec<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(limit);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }

    fn timestamp() -> String {
        OffsetDateTime::now_utc()
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3]"
            ))
            .unwrap_or_default()
    }
}

impl LatencySink for LatencyLog {
    fn record(&self, event: &LatencyEvent) {
        let line = event.to_line();

        if event.kind() == LatencyEventKind::Error {
            tracing::error!(target: "latency", "{}", line);
        } else {
            tracing::info!(target: "latency", "{}", line);
        }

        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{} | {}", Self::timestamp(), line) {
            tracing::warn!(path = %self.path.display(), "Failed to append latency record: {}", e);
        }
    }
}

/// In-memory sink that keeps every record, for tests and embedders that want
/// to inspect measurements directly.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LatencyEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far, in emission order.
    pub fn events(&self) -> Vec<LatencyEvent> {
        self.events.lock().clone()
    }

    /// Records of one kind, in emission order.
    pub fn events_of(&self, kind: LatencyEventKind) -> Vec<LatencyEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events.lock().iter().map(LatencyEvent::to_line).collect()
    }
}

impl LatencySink for MemorySink {
    fn record(&self, event: &LatencyEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_latency_log_appends_timestamped_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log = LatencyLog::open(temp_dir.path().join("latency.log")).unwrap();

        log.record(&LatencyEvent::new("session_1", LatencyEventKind::ConnectionStart));
        log.record(
            &LatencyEvent::new("session_1", LatencyEventKind::ConnectionEstablished)
                .with_duration("latency", Some(Duration::from_millis(50))),
        );

        let lines = log.tail(10).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" | [session_1] CONNECTION_START"));
        assert!(lines[1].ends_with(" | [session_1] CONNECTION_ESTABLISHED | latency=50.00ms"));
    }

    #[tokio::test]
    async fn test_tail_returns_last_lines_only() {
        let temp_dir = TempDir::new().unwrap();
        let log = LatencyLog::open(temp_dir.path().join("latency.log")).unwrap();

        for i in 0..5 {
            log.record(
                &LatencyEvent::new("session_1", LatencyEventKind::SpeechDetected)
                    .with_count("request_num", i),
            );
        }

        let lines = log.tail(2).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("request_num=3"));
        assert!(lines[1].ends_with("request_num=4"));
    }

    #[tokio::test]
    async fn test_tail_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log = LatencyLog::open(temp_dir.path().join("latency.log")).unwrap();
        std::fs::remove_file(log.path()).unwrap();

        assert!(log.tail(10).await.unwrap().is_empty());
    }

    #[test]
    fn test_open_daily_names_file_by_date() {
        let temp_dir = TempDir::new().unwrap();
        let log = LatencyLog::open_daily(temp_dir.path().join("logs")).unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("latency_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "latency_YYYYMMDD.log".len());
    }

    #[test]
    fn test_memory_sink_filters_by_kind() {
        let sink = MemorySink::new();
        sink.record(&LatencyEvent::new("s", LatencyEventKind::ConnectionStart));
        sink.record(&LatencyEvent::new("s", LatencyEventKind::Error).with_text("message", "boom"));

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events_of(LatencyEventKind::Error).len(), 1);
        assert_eq!(sink.lines()[1], "[s] ERROR | message=boom");
    }
}
