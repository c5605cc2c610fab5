//! Log sink: the persistent, lossless record of a run.
//!
//! One line per record, `<ISO8601 timestamp> <severity> <text>`. The sink is
//! owned exclusively by the writer thread; nothing else touches the file.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};

/// Timestamp format for log records (milliseconds are enough for forensics).
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Severity attached to every emission and log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational output meant for the user.
    Info,
    /// Step-by-step operation progress.
    Progress,
    /// Something noteworthy but not fatal.
    Warning,
    /// Operation-ending failure.
    Error,
    /// Developer-facing detail for postmortem analysis.
    Trace,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Progress => "progress",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Trace => "trace",
        };
        f.write_str(label)
    }
}

/// Append-only writer for the run log.
pub(crate) struct LogSink {
    file: BufWriter<File>,
}

impl LogSink {
    /// Create (truncating) the log file for this run.
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Append one record. Flushed immediately: the log must survive a
    /// sudden process exit with everything emitted so far.
    pub(crate) fn record(
        &mut self,
        created_at: DateTime<Local>,
        severity: Severity,
        text: &str,
    ) -> io::Result<()> {
        writeln!(
            self.file,
            "{} {severity} {text}",
            created_at.format(TIMESTAMP_FORMAT)
        )?;
        self.file.flush()
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.log");
        let mut sink = LogSink::create(&path).unwrap();
        let when = Local::now();
        sink.record(when, Severity::Info, "hello there").unwrap();
        sink.record(when, Severity::Warning, "watch out").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" info hello there"));
        assert!(lines[1].ends_with(" warning watch out"));
        // ISO8601 with millisecond precision: 2025-01-02T03:04:05.678
        let stamp = lines[0].split(' ').next().unwrap();
        assert_eq!(stamp.len(), 23);
        assert_eq!(&stamp[10..11], "T");
    }

    #[test]
    fn test_records_survive_without_explicit_flush() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.log");
        let mut sink = LogSink::create(&path).unwrap();
        sink.record(Local::now(), Severity::Trace, "kept").unwrap();
        // No flush(), no drop: the per-record flush already hit the disk.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("trace kept"));
        sink.flush().unwrap();
    }

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::Info.to_string(), "info");
        assert_eq!(Severity::Progress.to_string(), "progress");
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(Severity::Trace.to_string(), "trace");
    }
}
