//! Time-stamped metric samples.
//!
//! Samples are `(time, value)` pairs. The CSV sink appends them to one
//! two-column `Time,Value` file per metric.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::timer::SimTime;

/// Metrics emitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Segments in the playback buffer
    BufferLevel,
    /// Segments played so far
    PlaybackPointer,
}

impl Metric {
    /// File name of the metric's CSV series.
    pub fn file_name(self) -> &'static str {
        match self {
            Metric::BufferLevel => "bufferSize.csv",
            Metric::PlaybackPointer => "playbackPointer.csv",
        }
    }
}

/// One recorded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub metric: Metric,
    pub time: SimTime,
    pub value: u64,
}

/// Destination for metric samples.
pub trait MetricsSink {
    /// Records one sample.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - Sample could not be persisted
    fn record(&mut self, metric: Metric, time: SimTime, value: u64) -> std::io::Result<()>;
}

/// Discards every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&mut self, _metric: Metric, _time: SimTime, _value: u64) -> std::io::Result<()> {
        Ok(())
    }
}

/// Appends samples to `Time,Value` CSV files under a directory.
#[derive(Debug)]
pub struct CsvMetricsSink {
    dir: PathBuf,
    files: HashMap<Metric, File>,
}

impl CsvMetricsSink {
    /// Creates a sink writing under `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - Directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: HashMap::new(),
        })
    }

    /// Path of the CSV series for `metric`.
    pub fn path_for(&self, metric: Metric) -> PathBuf {
        self.dir.join(metric.file_name())
    }

    fn open(path: &Path) -> std::io::Result<File> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "Time,Value")?;
        }
        Ok(file)
    }
}

impl MetricsSink for CsvMetricsSink {
    fn record(&mut self, metric: Metric, time: SimTime, value: u64) -> std::io::Result<()> {
        let path = self.path_for(metric);
        let file = match self.files.entry(metric) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Self::open(&path)?),
        };
        writeln!(file, "{},{}", time.as_secs_f64(), value)
    }
}

/// Keeps samples in memory. Clones share the same sample list.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricsSink {
    samples: Rc<RefCell<Vec<Sample>>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All samples recorded so far, in recording order.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.borrow().clone()
    }

    /// Values recorded for `metric`, in recording order.
    pub fn values(&self, metric: Metric) -> Vec<u64> {
        self.samples
            .borrow()
            .iter()
            .filter(|sample| sample.metric == metric)
            .map(|sample| sample.value)
            .collect()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn record(&mut self, metric: Metric, time: SimTime, value: u64) -> std::io::Result<()> {
        self.samples.borrow_mut().push(Sample {
            metric,
            time,
            value,
        });
        Ok(())
    }
}
