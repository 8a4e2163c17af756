// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable FIFO of records that have not been acknowledged yet.
//!
//! The log is a line-oriented text file, one JSON encoded [`Record`] per line, in arrival
//! order. Appends are synced to disk before they return. Removing the oldest entries
//! rewrites the remaining entries into a sibling temp file which is synced and then
//! renamed over the log, so a crash at any point leaves either the old or the new
//! contents on disk. An in-memory mirror of the entries serves reads.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::errors::StorageError;
use crate::record::Record;

const REWRITE_SUFFIX: &str = ".tmp";

#[derive(Debug)]
pub struct RetryLog {
    path: PathBuf,
    entries: VecDeque<Record>,
}

impl RetryLog {
    /// Opens the log at `path`, creating it (and its parent directories) if needed.
    ///
    /// Entries persisted by a previous process are loaded in order. A rewrite temp file
    /// left behind by an interrupted [`RetryLog::remove_oldest`] is discarded, since the
    /// rename that would have published it never happened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let rewrite_path = rewrite_path(&path);
        match fs::remove_file(&rewrite_path) {
            Ok(()) => warn!(
                "Discarded incomplete retry log rewrite {}",
                rewrite_path.display()
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let (entries, skipped) = load_entries(&path)?;
        let mut log = RetryLog { path, entries };

        if skipped > 0 {
            // Leave a clean file behind so later appends never extend a torn line.
            log.rewrite()?;
        }
        if !log.entries.is_empty() {
            debug!(
                "Loaded {} pending entries from {}",
                log.entries.len(),
                log.path.display()
            );
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Durably appends `record` at the tail of the log.
    pub fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        let mut line = encode_entry(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let previous_len = file.metadata()?.len();

        let written = file
            .write_all(line.as_bytes())
            .and_then(|()| file.sync_all());
        if let Err(e) = written {
            // Drop a partially written line; the caller keeps the record.
            if let Err(truncate_err) = file.set_len(previous_len) {
                error!(
                    "Failed to truncate torn append in {}: {truncate_err}",
                    self.path.display()
                );
            }
            return Err(e.into());
        }

        self.entries.push_back(record.clone());
        Ok(())
    }

    /// Returns up to `max_count` of the oldest entries, oldest first, without removing
    /// them.
    pub fn peek_oldest(&self, max_count: usize) -> Vec<Record> {
        self.entries.iter().take(max_count).cloned().collect()
    }

    /// Durably removes the `count` oldest entries and returns how many were removed.
    ///
    /// The whole remaining log is rewritten and atomically swapped in. On error nothing
    /// is removed, on disk or in memory.
    pub fn remove_oldest(&mut self, count: usize) -> Result<usize, StorageError> {
        let count = count.min(self.entries.len());
        if count == 0 {
            return Ok(0);
        }

        let contents = encode_lines(self.entries.iter().skip(count))?;
        atomic_rewrite(&self.path, contents.as_bytes())?;
        self.entries.drain(..count);
        Ok(count)
    }

    fn rewrite(&mut self) -> Result<(), StorageError> {
        let contents = encode_lines(self.entries.iter())?;
        atomic_rewrite(&self.path, contents.as_bytes())?;
        Ok(())
    }
}

fn rewrite_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("retry"));
    name.push(REWRITE_SUFFIX);
    path.with_file_name(name)
}

fn load_entries(path: &Path) -> Result<(VecDeque<Record>, usize), StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((VecDeque::new(), 0)),
        Err(e) => return Err(e.into()),
    };

    let mut entries = VecDeque::new();
    let mut skipped = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(record) => entries.push_back(record),
            Err(e) => {
                skipped += 1;
                error!(
                    "Dropping undecodable line {} of {}: {e}",
                    index + 1,
                    path.display()
                );
            }
        }
    }
    Ok((entries, skipped))
}

/// JSON has no encoding for NaN or infinities, serde_json would silently write `null`
/// and the entry could never be read back.
fn encode_entry(record: &Record) -> Result<String, StorageError> {
    if record.value().is_some_and(|v| !v.is_finite()) {
        return Err(StorageError::Encode(serde::ser::Error::custom(format!(
            "non-finite value in {record}"
        ))));
    }
    Ok(serde_json::to_string(record)?)
}

fn encode_lines<'a>(records: impl Iterator<Item = &'a Record>) -> Result<String, StorageError> {
    let mut contents = String::new();
    for record in records {
        contents.push_str(&encode_entry(record)?);
        contents.push('\n');
    }
    Ok(contents)
}

fn atomic_rewrite(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let tmp_path = rewrite_path(path);

    let result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
