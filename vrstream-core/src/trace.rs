//! Segment size trace lookup.
//!
//! A trace is a comma-separated table with a header row followed by
//! `time,size` rows. It is loaded once and then queried by exact time index.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors loading a trace dataset.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Dataset file could not be opened
    #[error("cannot open trace file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dataset could not be read after opening
    #[error("failed reading trace data: {0}")]
    Read(#[from] std::io::Error),
}

/// One row of the trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEntry {
    /// Playback time index of the segment
    pub time_index: f64,
    /// Reply size of the segment in bytes
    pub size_bytes: u64,
}

/// Immutable, time-indexed segment size table.
#[derive(Debug, Clone, Default)]
pub struct TraceTable {
    /// Sorted by `time_index`, first row wins on duplicates
    entries: Vec<TraceEntry>,
    skipped_rows: usize,
}

impl TraceTable {
    /// Creates a table with no entries. Every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from in-memory entries.
    pub fn from_entries(entries: impl IntoIterator<Item = TraceEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    /// Loads a trace dataset from `path`.
    ///
    /// # Errors
    ///
    /// - `TraceError::Open` - File cannot be opened
    /// - `TraceError::Read` - File cannot be read
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let table = Self::from_reader(BufReader::new(file))?;
        tracing::info!(
            "Loaded trace {}: {} entries, {} rows skipped",
            path.display(),
            table.len(),
            table.skipped_rows
        );
        Ok(table)
    }

    /// Parses a trace from any buffered reader. The first line is the header.
    ///
    /// Rows whose time or size column cannot be parsed are skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// - `TraceError::Read` - Reader fails
    pub fn from_reader(reader: impl BufRead) -> Result<Self, TraceError> {
        let mut table = Self::default();

        for (line_number, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match parse_row(&line) {
                Some(entry) => table.insert(entry),
                None => {
                    tracing::warn!("Skipping malformed trace row {}: {line:?}", line_number + 1);
                    table.skipped_rows += 1;
                }
            }
        }

        Ok(table)
    }

    fn insert(&mut self, entry: TraceEntry) {
        // Normalizes -0.0 so it matches 0.0 under total ordering
        let entry = TraceEntry {
            time_index: entry.time_index + 0.0,
            ..entry
        };
        if let Err(position) = self.search(entry.time_index) {
            self.entries.insert(position, entry);
        }
    }

    fn search(&self, time_index: f64) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|probe| probe.time_index.total_cmp(&time_index))
    }

    /// Returns the reply size recorded for exactly `time_index`.
    pub fn lookup(&self, time_index: f64) -> Option<u64> {
        if time_index.is_nan() {
            return None;
        }
        let index = self.search(time_index + 0.0).ok()?;
        Some(self.entries[index].size_bytes)
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows dropped while parsing.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Entries in ascending time order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }
}

fn parse_row(line: &str) -> Option<TraceEntry> {
    let mut columns = line.split(',');
    let time_index = columns.next()?.trim().parse::<f64>().ok()?;
    let size_bytes = columns.next()?.trim().parse::<u64>().ok()?;

    if time_index.is_nan() {
        return None;
    }

    Some(TraceEntry {
        time_index,
        size_bytes,
    })
}
