//! Persistent record of what the batch driver did to each file.
//!
//! [`OutcomeSink`] is the seam; [`JsonlLedger`] appends one JSON object per
//! line so a run can be audited (or grepped) afterwards:
//!
//! ```text
//! {"timestamp":"2026-03-02T09:14:11Z","status":"success","original":"…/scan1.pdf","new_name":"Rental_Contract.pdf",…}
//! {"timestamp":"2026-03-02T09:14:40Z","status":"failure","original":"…/scan2.pdf","reason":"Invalid or no classification: …"}
//! ```

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Receives one record per processed file.
pub trait OutcomeSink: Send + Sync {
    fn record_success(
        &self,
        original: &Path,
        new_name: &str,
        new_path: &Path,
    ) -> Result<(), LedgerError>;

    fn record_failure(&self, original: &Path, reason: &str) -> Result<(), LedgerError>;

    fn record_skipped(&self, original: &Path, reason: &str) -> Result<(), LedgerError>;
}

/// Prefix `reason` and keep the whole string within `max_len` characters.
///
/// The prefix is always kept intact; only the message is truncated.
pub fn bound_failure_reason(prefix: &str, reason: &str, max_len: usize) -> String {
    let room = max_len.saturating_sub(prefix.chars().count());
    let mut out = String::with_capacity(prefix.len() + reason.len().min(room * 4));
    out.push_str(prefix);
    out.extend(reason.chars().take(room));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub status: LedgerStatus,
    pub original: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Append-only JSON-lines ledger.
pub struct JsonlLedger {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlLedger {
    /// Open (or create) the ledger at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, skipping lines that do not parse.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let file = File::open(&self.path).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect())
    }

    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!("Ledger: {:?} {}", entry.status, entry.original.display());
        Ok(())
    }

    fn entry(status: LedgerStatus, original: &Path) -> LedgerEntry {
        LedgerEntry {
            timestamp: Utc::now(),
            status,
            original: original.to_path_buf(),
            new_name: None,
            new_path: None,
            reason: None,
        }
    }
}

impl OutcomeSink for JsonlLedger {
    fn record_success(
        &self,
        original: &Path,
        new_name: &str,
        new_path: &Path,
    ) -> Result<(), LedgerError> {
        self.append(&LedgerEntry {
            new_name: Some(new_name.to_string()),
            new_path: Some(new_path.to_path_buf()),
            ..Self::entry(LedgerStatus::Success, original)
        })
    }

    fn record_failure(&self, original: &Path, reason: &str) -> Result<(), LedgerError> {
        self.append(&LedgerEntry {
            reason: Some(reason.to_string()),
            ..Self::entry(LedgerStatus::Failure, original)
        })
    }

    fn record_skipped(&self, original: &Path, reason: &str) -> Result<(), LedgerError> {
        self.append(&LedgerEntry {
            reason: Some(reason.to_string()),
            ..Self::entry(LedgerStatus::Skipped, original)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "Invalid or no classification: ";

    #[test]
    fn bound_keeps_prefix_and_length() {
        let long = "x".repeat(500);
        let bounded = bound_failure_reason(PREFIX, &long, 200);
        assert!(bounded.starts_with(PREFIX));
        assert_eq!(bounded.chars().count(), 200);

        let short = bound_failure_reason(PREFIX, "timeout", 200);
        assert_eq!(short, format!("{PREFIX}timeout"));
    }

    #[test]
    fn bound_with_tiny_limit_keeps_prefix_only() {
        assert_eq!(bound_failure_reason(PREFIX, "anything", 5), PREFIX);
    }

    #[test]
    fn bound_counts_characters_not_bytes() {
        let bounded = bound_failure_reason("E: ", "ééééé", 6);
        assert_eq!(bounded, "E: ééé");
    }

    #[test]
    fn appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::open(dir.path().join("logs/ledger.jsonl")).unwrap();

        ledger
            .record_success(
                Path::new("/deals/A/scan.pdf"),
                "Rental_Contract.pdf",
                Path::new("/deals/A/Rental_Contract.pdf"),
            )
            .unwrap();
        ledger
            .record_failure(Path::new("/deals/A/b.pdf"), "Rename operation failed: denied")
            .unwrap();
        ledger
            .record_skipped(Path::new("/deals/A/c.txt"), "Unsupported file type")
            .unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, LedgerStatus::Success);
        assert_eq!(entries[0].new_name.as_deref(), Some("Rental_Contract.pdf"));
        assert_eq!(entries[1].status, LedgerStatus::Failure);
        assert_eq!(entries[2].reason.as_deref(), Some("Unsupported file type"));

        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.contains("\"status\":\"skipped\""));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        JsonlLedger::open(&path)
            .unwrap()
            .record_skipped(Path::new("a.pdf"), "Already classified")
            .unwrap();
        let again = JsonlLedger::open(&path).unwrap();
        again.record_skipped(Path::new("b.pdf"), "Already classified").unwrap();
        assert_eq!(again.entries().unwrap().len(), 2);
    }
}
