//! Progress and event log of a solver session.
//!
//! Every message is mirrored to the `log` facade. The log is serializable so
//! that backups carry it and a restored session can replay it.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Version string reported through [`Progress::progress_map`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Trace,
    Debug,
    Info,
    Stage,
    Warn,
    Error,
    Fatal,
}

impl MessageLevel {
    fn log_level(&self) -> log::Level {
        match self {
            MessageLevel::Trace => log::Level::Trace,
            MessageLevel::Debug => log::Level::Debug,
            MessageLevel::Info | MessageLevel::Stage => log::Level::Info,
            MessageLevel::Warn => log::Level::Warn,
            MessageLevel::Error | MessageLevel::Fatal => log::Level::Error,
        }
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageLevel::Trace => "TRACE",
            MessageLevel::Debug => "DEBUG",
            MessageLevel::Info => "INFO",
            MessageLevel::Stage => "STAGE",
            MessageLevel::Warn => "WARN",
            MessageLevel::Error => "ERROR",
            MessageLevel::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub level: MessageLevel,
    pub date: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for ProgressMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:>5} {}", self.date.format("%H:%M:%S%.3f"), self.level, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Progress {
    status: String,
    phase: String,
    progress: u64,
    max_progress: u64,
    messages: Vec<ProgressMessage>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all messages and resets status and phase.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        log::debug!("Status: {}", self.status);
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Starts a new phase with the given number of steps.
    pub fn set_phase(&mut self, phase: impl Into<String>, max_progress: u64) {
        self.phase = phase.into();
        self.progress = 0;
        self.max_progress = max_progress;
        log::debug!("Phase: {} ({} steps)", self.phase, max_progress);
    }

    pub fn inc_progress(&mut self) {
        self.progress += 1;
    }

    pub fn progress(&self) -> (u64, u64) {
        (self.progress, self.max_progress)
    }

    pub fn message(&mut self, level: MessageLevel, message: impl Into<String>) {
        let message = message.into();
        log::log!(level.log_level(), "{}", message);
        self.messages.push(ProgressMessage {
            level,
            date: Utc::now(),
            message,
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Info, message);
    }

    pub fn stage(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Stage, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Error, message);
    }

    pub fn fatal(&mut self, message: impl Into<String>) {
        self.message(MessageLevel::Fatal, message);
    }

    pub fn warning_count(&self) -> usize {
        self.messages.iter().filter(|m| m.level == MessageLevel::Warn).count()
    }

    pub fn has_fatal(&self) -> bool {
        self.messages.iter().any(|m| m.level == MessageLevel::Fatal)
    }

    /// Messages at or above the given level, oldest first.
    pub fn messages(&self, min_level: MessageLevel) -> Vec<&ProgressMessage> {
        self.messages.iter().filter(|m| m.level >= min_level).collect()
    }

    /// Re-appends messages from a restored log, keeping their timestamps.
    pub fn replay(&mut self, other: &Progress) {
        self.messages.extend(other.messages.iter().cloned());
    }

    pub fn progress_map(&self) -> IndexMap<String, String> {
        let mut map = IndexMap::new();
        map.insert("STATUS".to_string(), self.status.clone());
        map.insert("PHASE".to_string(), self.phase.clone());
        map.insert("PROGRESS".to_string(), self.progress.to_string());
        map.insert("MAX_PROGRESS".to_string(), self.max_progress.to_string());
        map.insert("VERSION".to_string(), VERSION.to_string());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_filter() {
        let mut progress = Progress::new();
        progress.info("Loading input data ...");
        progress.warn("Instructor Ada cannot teach MATH 101");
        progress.warn("Instructor Bob is not available");
        assert_eq!(progress.warning_count(), 2);
        assert!(!progress.has_fatal());
        assert_eq!(progress.messages(MessageLevel::Warn).len(), 2);
        assert_eq!(progress.messages(MessageLevel::Trace).len(), 3);
        progress.fatal("Unable to load input data");
        assert!(progress.has_fatal());
    }

    #[test]
    fn test_progress_map() {
        let mut progress = Progress::new();
        progress.set_status("Solving problem ...");
        progress.set_phase("Searching for initial solution ...", 10);
        progress.inc_progress();
        let map = progress.progress_map();
        assert_eq!(map.get("STATUS").unwrap(), "Solving problem ...");
        assert_eq!(map.get("PROGRESS").unwrap(), "1");
        assert_eq!(map.get("MAX_PROGRESS").unwrap(), "10");
        assert_eq!(map.get("VERSION").unwrap(), VERSION);
    }

    #[test]
    fn test_serde_and_replay() {
        let mut progress = Progress::new();
        progress.stage("Loading done.");
        let json = serde_json::to_string(&progress).unwrap();
        let restored: Progress = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, progress);

        let mut fresh = Progress::new();
        fresh.replay(&restored);
        fresh.stage("Restoring from backup ...");
        assert_eq!(fresh.messages(MessageLevel::Stage).len(), 2);
    }
}
