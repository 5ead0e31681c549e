//! Rendering timing samples into the report stream.
//!
//! Formatting is a pure function over [`Sample`]; emission goes through a
//! [`Reporter`] wrapping any `io::Write` sink so tests can capture the
//! stream. Production runs use [`Reporter::stdout`].

use std::io::{self, Write};

use crate::timing::Sample;

/// Render one sample as a report line: `<label>: <elapsed>s, <rate> GB/s`.
pub fn format_sample(sample: &Sample) -> String {
    format!(
        "{}: {:.4}s, {:.2} GB/s",
        sample.label,
        sample.secs(),
        sample.gb_per_sec()
    )
}

/// Format a byte count as a human-readable string (e.g. "16.0 MiB").
pub fn format_bytes(nbytes: usize) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = nbytes as f64;
    if b >= GIB {
        format!("{:.1} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{nbytes} B")
    }
}

/// Sink for report lines.
pub struct Reporter {
    out: Box<dyn Write>,
}

impl Reporter {
    /// Report to standard output.
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
        }
    }

    /// Report to an arbitrary writer.
    pub fn new(out: impl Write + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    /// Discard all output. Handy in tests that only check behavior.
    pub fn sink() -> Self {
        Self {
            out: Box::new(io::sink()),
        }
    }

    /// Emit one formatted sample line.
    ///
    /// Reporting is best-effort; a broken sink never fails the benchmark.
    pub fn emit(&mut self, sample: &Sample) {
        let _ = writeln!(self.out, "{}", format_sample(sample));
    }

    /// Emit a free-form note line (strategy headers, warm-up notices).
    pub fn note(&mut self, msg: &str) {
        let _ = writeln!(self.out, "{msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Shared capture buffer usable as a Reporter sink.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_format_sample() {
        let sample = Sample {
            label: "read".into(),
            bytes: 1_000_000_000,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(format_sample(&sample), "read: 1.0000s, 1.00 GB/s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(4 * 1024), "4.0 KiB");
        assert_eq!(format_bytes(16 * 1024 * 1024), "16.0 MiB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0 GiB");
    }

    #[test]
    fn test_reporter_emits_lines() {
        let capture = Capture::default();
        let mut reporter = Reporter::new(capture.clone());

        reporter.note("****** read direct");
        reporter.emit(&Sample {
            label: "read".into(),
            bytes: 2_000_000_000,
            elapsed: Duration::from_secs(1),
        });

        let out = capture.contents();
        assert!(out.contains("****** read direct\n"));
        assert!(out.contains("read: 1.0000s, 2.00 GB/s\n"));
    }
}
