//! Durable-append seam for the ledger.
//!
//! The ledger calls [`Journal::append`] while it still holds the affected
//! account locks and before the new entries become visible. If the append
//! fails, nothing is committed. A journal therefore sees entries in commit
//! order per subject, and every acknowledged entry is already durable.
//!
//! [`NullJournal`] keeps the ledger purely in memory. [`JsonLinesJournal`]
//! writes one JSON object per line and syncs after each append; its file
//! can be fed back through [`read_json_lines`] and `Ledger::restore`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use feud_types::Transaction;

/// Errors produced by a journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Reading or writing the backing file failed.
    #[error("journal I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An entry could not be encoded.
    #[error("failed to encode journal entry: {source}")]
    Encode {
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A line of a journal file is not a valid entry.
    #[error("corrupt journal line {line}: {source}")]
    Corrupt {
        /// One-based line number.
        line: usize,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// A durable sink for committed ledger entries.
pub trait Journal: core::fmt::Debug + Send + Sync {
    /// Durably append `entries`, in order, as one unit.
    ///
    /// Returning `Err` aborts the commit that produced the entries.
    fn append(&self, entries: &[Transaction]) -> Result<(), JournalError>;
}

/// A journal that discards everything. The ledger stays in-memory only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn append(&self, _entries: &[Transaction]) -> Result<(), JournalError> {
        Ok(())
    }
}

/// Appends entries to a file as newline-delimited JSON.
#[derive(Debug)]
pub struct JsonLinesJournal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesJournal {
    /// Open `path` for appending, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// The file this journal writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for JsonLinesJournal {
    fn append(&self, entries: &[Transaction]) -> Result<(), JournalError> {
        let mut writer = self.writer.lock();
        for entry in entries {
            serde_json::to_writer(&mut *writer, entry)
                .map_err(|source| JournalError::Encode { source })?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Read every entry from a JSON-lines journal file. Blank lines are skipped.
pub fn read_json_lines(path: impl AsRef<Path>) -> Result<Vec<Transaction>, JournalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|source| JournalError::Corrupt {
            line: index.saturating_add(1),
            source,
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use feud_types::SubjectId;

    use super::*;
    use crate::TransactionBuilder;

    fn entry(sequence: u64, amount: i64) -> Transaction {
        TransactionBuilder::new(SubjectId::new("alice"), amount)
            .reason("test")
            .build(sequence)
            .unwrap()
    }

    #[test]
    fn null_journal_accepts_everything() {
        assert!(NullJournal.append(&[entry(1, 5)]).is_ok());
    }

    #[test]
    fn json_lines_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let journal = JsonLinesJournal::open(&path).unwrap();
        assert_eq!(journal.path(), path.as_path());

        let written = vec![entry(1, 100), entry(2, -30)];
        journal.append(&written).unwrap();
        journal.append(&[entry(3, 7)]).unwrap();

        let read = read_json_lines(&path).unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read.first(), written.first());
        assert_eq!(read.get(2).map(|e| e.amount), Some(7));
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        JsonLinesJournal::open(&path).unwrap().append(&[entry(1, 10)]).unwrap();
        JsonLinesJournal::open(&path).unwrap().append(&[entry(2, 20)]).unwrap();

        let read = read_json_lines(&path).unwrap();
        assert_eq!(read.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn corrupt_line_is_reported_with_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();

        let result = read_json_lines(&path);
        assert!(matches!(result, Err(JournalError::Corrupt { line: 2, .. })));
    }
}
