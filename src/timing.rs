//! Wall-clock measurement of benchmark regions.
//!
//! A timed region yields a structured [`Sample`] (label, elapsed,
//! byte count); turning a sample into a report line is a separate, pure
//! step in [`report`](crate::report). Samples are emitted immediately and
//! never aggregated.

use std::time::{Duration, Instant};

use crate::error::Result;

/// One measurement: what ran, how long it took, how many bytes it moved.
#[derive(Debug, Clone)]
pub struct Sample {
    pub label: String,
    pub bytes: usize,
    pub elapsed: Duration,
}

impl Sample {
    /// Elapsed time in seconds.
    pub fn secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Derived throughput in GB/s (decimal gigabytes, matching the
    /// report format).
    pub fn gb_per_sec(&self) -> f64 {
        let secs = self.secs();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / 1e9 / secs
    }
}

/// An in-progress timed region.
///
/// `enter` starts the clock, `finish` stops it and yields the sample.
/// Regions nest freely; each instance measures independently.
pub struct Region {
    label: String,
    bytes: usize,
    start: Instant,
}

impl Region {
    /// Start measuring a region.
    pub fn enter(label: impl Into<String>, bytes: usize) -> Self {
        Self {
            label: label.into(),
            bytes,
            start: Instant::now(),
        }
    }

    /// Stop the clock and produce the sample.
    pub fn finish(self) -> Sample {
        Sample {
            elapsed: self.start.elapsed(),
            label: self.label,
            bytes: self.bytes,
        }
    }
}

/// Measure a fallible unit of work.
///
/// The sample is produced whether or not the closure succeeds, so the
/// caller can emit the report line before propagating an error. The
/// measurement always fires once the enclosed work finishes or fails.
pub fn measure<T>(
    label: impl Into<String>,
    bytes: usize,
    f: impl FnOnce() -> Result<T>,
) -> (Result<T>, Sample) {
    let region = Region::enter(label, bytes);
    let result = f();
    (result, region.finish())
}
