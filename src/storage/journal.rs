//! Append-only JSON-lines journal backing the history store.
//!
//! One record per line. On open the longest parseable prefix is kept and
//! anything after the first malformed line (typically a write cut short by
//! a crash) is truncated from the file. Compaction rewrites the file
//! through a temp file and rename so a crash never leaves it half-written.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::types::ObservationRecord;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("journal encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What was recovered when the journal was opened.
#[derive(Debug, Default)]
pub struct JournalRecovery {
    pub records: Vec<ObservationRecord>,
    /// Non-empty lines dropped from the tail
    pub discarded_lines: usize,
    /// Bytes removed from the end of the file
    pub truncated_bytes: u64,
}

impl JournalRecovery {
    pub fn is_clean(&self) -> bool {
        self.discarded_lines == 0
    }
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    lines: usize,
}

impl Journal {
    /// Open (or create) the journal at `path` and recover its contents.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, JournalRecovery), JournalError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| JournalError::Io { path: path.clone(), source };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err(e)),
        };
        let (mut recovery, valid_len, needs_newline) = Self::scan(&bytes);

        if valid_len < bytes.len() {
            recovery.truncated_bytes = (bytes.len() - valid_len) as u64;
            let f = OpenOptions::new().write(true).open(&path).map_err(io_err)?;
            f.set_len(valid_len as u64).map_err(io_err)?;
            f.sync_all().map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        if needs_newline {
            file.write_all(b"\n").map_err(io_err)?;
        }

        debug!(
            path = %path.display(),
            records = recovery.records.len(),
            discarded = recovery.discarded_lines,
            "History journal opened"
        );

        let lines = recovery.records.len();
        Ok((Self { path, file, lines }, recovery))
    }

    /// Split `bytes` into the valid prefix and the discarded tail.
    ///
    /// Returns (recovery, length of valid prefix, whether the prefix lacks
    /// its final newline).
    fn scan(bytes: &[u8]) -> (JournalRecovery, usize, bool) {
        let mut recovery = JournalRecovery::default();
        let mut valid_len = 0usize;
        let mut needs_newline = false;
        let mut offset = 0usize;

        while offset < bytes.len() {
            let (line, next) = match bytes[offset..].iter().position(|&b| b == b'\n') {
                Some(pos) => (&bytes[offset..offset + pos], offset + pos + 1),
                None => (&bytes[offset..], bytes.len()),
            };
            let complete = next <= bytes.len() && bytes.get(next - 1) == Some(&b'\n');

            if line.iter().all(u8::is_ascii_whitespace) {
                if recovery.discarded_lines == 0 {
                    valid_len = next;
                }
                offset = next;
                continue;
            }

            if recovery.discarded_lines == 0 {
                if let Ok(record) = serde_json::from_slice::<ObservationRecord>(line) {
                    recovery.records.push(record);
                    valid_len = next;
                    needs_newline = !complete;
                    offset = next;
                    continue;
                }
            }
            recovery.discarded_lines += 1;
            offset = next;
        }

        (recovery, valid_len, needs_newline)
    }

    /// Append one record and flush it to the OS.
    pub fn append(&mut self, record: &ObservationRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(|source| JournalError::Io { path: self.path.clone(), source })?;
        self.lines += 1;
        Ok(())
    }

    /// Replace the journal contents with `records`.
    pub fn rewrite<'a>(
        &mut self,
        records: impl Iterator<Item = &'a ObservationRecord>,
    ) -> Result<(), JournalError> {
        let io_err = |source| JournalError::Io { path: self.path.clone(), source };

        let mut buf = Vec::new();
        let mut count = 0usize;
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
            count += 1;
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(io_err)?;
            tmp.write_all(&buf).map_err(io_err)?;
            tmp.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        info!(path = %self.path.display(), records = count, "History journal compacted");
        self.lines = count;
        Ok(())
    }

    /// Lines written since the last open or rewrite, including recovered ones.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
