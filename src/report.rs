//! Sync progress reporting.
//!
//! Observable progress for `staffdir sync`: phase boundaries, processing
//! milestones, skipped entries, and the final counts. Progress goes to
//! **stderr** so stdout stays parseable for scripts.
//!
//! The reporter is passed explicitly into the sync engine; there is no
//! process-wide log handle. The per-run file sink ([`RunLog`]) is owned by
//! the caller, which closes it on every exit path; `Drop` flushes as a
//! backstop.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::sync::{SkipReason, SyncPhase};

/// A single progress event for a sync pass.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    PhaseStarted {
        phase: SyncPhase,
    },
    /// Processing milestone, emitted at 10% steps.
    Progress {
        processed: u64,
        total: u64,
        percent: u8,
    },
    EntrySkipped {
        reason: SkipReason,
        dn: Option<String>,
    },
    Finished {
        upserts: u64,
        deletes: u64,
        ldap_count: u64,
    },
    Failed {
        phase: SyncPhase,
        message: String,
    },
}

impl SyncEvent {
    fn to_json(&self) -> serde_json::Value {
        match self {
            SyncEvent::PhaseStarted { phase } => serde_json::json!({
                "event": "phase",
                "phase": phase.as_str(),
            }),
            SyncEvent::Progress {
                processed,
                total,
                percent,
            } => serde_json::json!({
                "event": "progress",
                "processed": processed,
                "total": total,
                "percent": percent,
            }),
            SyncEvent::EntrySkipped { reason, dn } => serde_json::json!({
                "event": "skipped",
                "reason": reason.as_str(),
                "dn": dn,
            }),
            SyncEvent::Finished {
                upserts,
                deletes,
                ldap_count,
            } => serde_json::json!({
                "event": "finished",
                "upserts": upserts,
                "deletes": deletes,
                "ldapCount": ldap_count,
            }),
            SyncEvent::Failed { phase, message } => serde_json::json!({
                "event": "failed",
                "phase": phase.as_str(),
                "message": message,
            }),
        }
    }
}

/// Receives sync progress events. Implementations write to stderr or a file.
pub trait SyncReporter: Send + Sync {
    fn report(&self, event: &SyncEvent);
}

/// Discards all events. Used by tests.
pub struct NullReporter;

impl SyncReporter for NullReporter {
    fn report(&self, _event: &SyncEvent) {}
}

/// Human-friendly progress on stderr:
/// `sync  processing  1,200 / 4,000 entries (30%)`.
pub struct StderrReporter;

impl SyncReporter for StderrReporter {
    fn report(&self, event: &SyncEvent) {
        let line = match event {
            SyncEvent::PhaseStarted { phase } => format!("sync  {}\n", phase.as_str()),
            SyncEvent::Progress {
                processed,
                total,
                percent,
            } => format!(
                "sync  processing  {} / {} entries ({}%)\n",
                format_number(*processed),
                format_number(*total),
                percent
            ),
            SyncEvent::EntrySkipped { reason, dn } => match dn {
                Some(dn) => format!("sync  skipped ({}): {}\n", reason.as_str(), dn),
                None => format!("sync  skipped ({})\n", reason.as_str()),
            },
            SyncEvent::Finished {
                upserts,
                deletes,
                ldap_count,
            } => format!(
                "sync  finished  upserts={} deletes={} fetched={}\n",
                upserts, deletes, ldap_count
            ),
            SyncEvent::Failed { phase, message } => {
                format!("sync  failed during {}: {}\n", phase.as_str(), message)
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonReporter;

impl SyncReporter for JsonReporter {
    fn report(&self, event: &SyncEvent) {
        let mut line = event.to_json().to_string();
        line.push('\n');
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Fans one event out to several reporters (e.g. stderr plus the run log).
pub struct MultiReporter<'a> {
    sinks: Vec<&'a dyn SyncReporter>,
}

impl<'a> MultiReporter<'a> {
    pub fn new(sinks: Vec<&'a dyn SyncReporter>) -> Self {
        Self { sinks }
    }
}

impl SyncReporter for MultiReporter<'_> {
    fn report(&self, event: &SyncEvent) {
        for sink in &self.sinks {
            sink.report(event);
        }
    }
}

/// Append-only per-run log file, one JSON event per line.
///
/// Acquired at pass start and closed explicitly by the caller on every exit
/// path, success or failure.
pub struct RunLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl RunLog {
    /// Create `sync-<UTC timestamp>.log` under `dir`, creating `dir` if needed.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create sync log dir: {}", dir.display()))?;
        let name = format!("sync-{}.log", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
        let path = dir.join(name);
        let file = File::create(&path)
            .with_context(|| format!("cannot create sync log: {}", path.display()))?;
        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the sink. Call this on every exit path.
    pub fn close(self) -> Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut writer) = guard.take() {
            writer.flush().context("failed to flush sync log")?;
        }
        Ok(())
    }
}

impl SyncReporter for RunLog {
    fn report(&self, event: &SyncEvent) {
        let mut line = event.to_json().to_string();
        line.push('\n');
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            let _ = writer.write_all(line.as_bytes());
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(writer) = guard.as_mut() {
                let _ = writer.flush();
            }
        }
    }
}

/// Format a count with thousands separators: 1234567 → "1,234,567".
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_event_json_shape() {
        let json = SyncEvent::Finished {
            upserts: 2,
            deletes: 1,
            ldap_count: 3,
        }
        .to_json();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["upserts"], 2);
        assert_eq!(json["ldapCount"], 3);
    }

    #[test]
    fn test_run_log_writes_events() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = RunLog::create(tmp.path()).unwrap();
        let path = log.path().to_path_buf();
        log.report(&SyncEvent::PhaseStarted {
            phase: SyncPhase::Binding,
        });
        log.close().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\"phase\":\"binding\""));
    }
}
