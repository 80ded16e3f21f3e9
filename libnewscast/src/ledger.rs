//! Persistent record of items already acted upon
//!
//! The store is a plain text log with one `<YYYY-MM-DD>:<identifier>` entry per
//! line. Appends are independent and fsynced, so a kill between two appends
//! never damages earlier lines. Every [`Ledger::load`] prunes entries older
//! than the retention window and rewrites the file with the survivors. A
//! failed rewrite leaves the old file in place; the survivors are still
//! returned and the next load tries again.

use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One line of the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub identifier: String,
    pub date: NaiveDate,
}

impl LedgerEntry {
    /// Parse `<date>:<identifier>`, splitting on the first colon
    pub fn parse(line: &str) -> Option<Self> {
        let (date, identifier) = line.split_once(':')?;
        let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).ok()?;
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        Some(Self {
            identifier: identifier.to_string(),
            date,
        })
    }

    pub fn to_line(&self) -> String {
        format!("{}:{}", self.date.format(DATE_FORMAT), self.identifier)
    }
}

/// File-backed dedup ledger
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    retention: Duration,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_retention(path, DEFAULT_RETENTION_DAYS)
    }

    pub fn with_retention(path: impl Into<PathBuf>, retention_days: i64) -> Self {
        Self {
            path: path.into(),
            retention: Duration::days(retention_days),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the active identifiers and compact the store
    ///
    /// Entries dated before `today - retention` are dropped, as are malformed
    /// lines. A missing store is an empty ledger.
    pub fn load(&self, today: NaiveDate) -> Result<HashSet<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Ledger {} does not exist yet", self.path.display());
                return Ok(HashSet::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let cutoff = today - self.retention;
        let mut survivors: Vec<LedgerEntry> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut expired = 0usize;
        let mut malformed = 0usize;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Some(entry) = LedgerEntry::parse(line) else {
                warn!("Dropping malformed ledger line: {:?}", line);
                malformed += 1;
                continue;
            };
            if entry.date < cutoff {
                expired += 1;
                continue;
            }
            match index.get(&entry.identifier) {
                Some(&i) => {
                    if entry.date > survivors[i].date {
                        survivors[i].date = entry.date;
                    }
                }
                None => {
                    index.insert(entry.identifier.clone(), survivors.len());
                    survivors.push(entry);
                }
            }
        }

        if let Err(e) = self.rewrite(&survivors) {
            warn!("Could not compact ledger, keeping it as is: {}", e);
        } else if expired > 0 || malformed > 0 {
            info!(
                "Compacted ledger: kept {}, expired {}, malformed {}",
                survivors.len(),
                expired,
                malformed
            );
        }

        Ok(survivors.into_iter().map(|e| e.identifier).collect())
    }

    /// Append one identifier dated `today`
    pub fn record(&self, identifier: &str, today: NaiveDate) -> Result<()> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(());
        }
        let entry = LedgerEntry {
            identifier: identifier.replace(['\n', '\r'], " "),
            date: today,
        };

        self.ensure_parent()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", entry.to_line()).map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))?;

        debug!("Recorded {} in ledger", entry.identifier);
        Ok(())
    }

    /// Replace the store with `entries` via a temp file + rename
    fn rewrite(&self, entries: &[LedgerEntry]) -> Result<()> {
        self.ensure_parent()?;
        let tmp = self.path.with_extension("compact");
        let mut body = String::new();
        for entry in entries {
            body.push_str(&entry.to_line());
            body.push('\n');
        }

        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(body.as_bytes())
            .map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> crate::error::NewscastError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn setup() -> (TempDir, Ledger) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Ledger::new(temp_dir.path().join("ledger.log"));
        (temp_dir, ledger)
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let entry = LedgerEntry::parse("2025-03-01:https://example.com/a:b").unwrap();
        assert_eq!(entry.identifier, "https://example.com/a:b");
        assert_eq!(entry.date, date("2025-03-01"));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(LedgerEntry::parse("no separator here").is_none());
        assert!(LedgerEntry::parse("2025-13-45:id").is_none());
        assert!(LedgerEntry::parse("2025-03-01:").is_none());
    }

    #[test]
    fn test_missing_store_is_empty() {
        let (_temp, ledger) = setup();
        let seen = ledger.load(date("2025-03-01")).unwrap();
        assert!(seen.is_empty());
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_record_then_load() {
        let (_temp, ledger) = setup();
        let today = date("2025-03-01");
        ledger.record("https://example.com/1", today).unwrap();
        ledger.record("Title only item", today).unwrap();

        let seen = ledger.load(today).unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("https://example.com/1"));
        assert!(seen.contains("Title only item"));
    }

    #[test]
    fn test_retention_boundary() {
        let (_temp, ledger) = setup();
        let today = date("2025-03-31");
        ledger.record("old", today - Duration::days(31)).unwrap();
        ledger.record("edge", today - Duration::days(30)).unwrap();
        ledger.record("recent", today - Duration::days(29)).unwrap();

        let seen = ledger.load(today).unwrap();
        assert!(!seen.contains("old"));
        assert!(seen.contains("edge"));
        assert!(seen.contains("recent"));
    }

    #[test]
    fn test_load_compacts_store() {
        let (_temp, ledger) = setup();
        let today = date("2025-03-31");
        fs::write(
            ledger.path(),
            "2025-01-01:expired\ngarbage\n2025-03-30:keep\n2025-03-10:keep\n\n2025-xx-01:bad\n",
        )
        .unwrap();

        let first = ledger.load(today).unwrap();
        let after_first = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(after_first, "2025-03-30:keep\n");

        let second = ledger.load(today).unwrap();
        let after_second = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_failed_compaction_still_returns_entries() {
        let (_temp, ledger) = setup();
        let today = date("2025-03-31");
        ledger.record("2025-01-01 expired", date("2025-01-01")).unwrap();
        ledger.record("https://example.com/kept", today).unwrap();
        // A directory in the temp file's place makes every rewrite fail.
        fs::create_dir(ledger.path().with_extension("compact")).unwrap();

        let seen = ledger.load(today).unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("https://example.com/kept"));

        // The original store is untouched and still appendable.
        let content = fs::read_to_string(ledger.path()).unwrap();
        assert!(content.contains("2025-01-01 expired"));
        ledger.record("https://example.com/next", today).unwrap();
        assert!(ledger.load(today).unwrap().contains("https://example.com/next"));
    }

    #[test]
    fn test_record_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Ledger::new(temp_dir.path().join("nested/dir/ledger.log"));
        ledger.record("id", date("2025-03-01")).unwrap();
        assert!(ledger.path().exists());
    }

    #[test]
    fn test_record_flattens_newlines() {
        let (_temp, ledger) = setup();
        let today = date("2025-03-01");
        ledger.record("two\nlines", today).unwrap();
        let seen = ledger.load(today).unwrap();
        assert!(seen.contains("two lines"));
    }
}
