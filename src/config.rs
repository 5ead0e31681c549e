//! Benchmark run configuration.
//!
//! A [`Config`] is a plain value built by the caller and passed explicitly
//! into [`run_all`](crate::strategy::run_all); there is no global state.
//! Environment variables override individual fields:
//!
//! | Variable | Type | Default | Description |
//! |----------|------|---------|-------------|
//! | `XFERBENCH_PIECES` | `usize` | `8` | Piece count for the ping-pong strategy |
//! | `XFERBENCH_DIRECT_IO` | `bool` | `true` | Request `O_DIRECT` on the backing extent |
//! | `XFERBENCH_VERIFY` | `bool` | `false` | Compare device buffer against the file after the run |
//! | `XFERBENCH_DEVICE` | `usize` | `0` | Accelerator device ordinal |

use std::path::PathBuf;

use crate::align::{is_aligned, page_size};
use crate::error::{Error, ErrorKind, Result};

/// Default piece count for the double-buffered strategy.
const DEFAULT_PIECE_COUNT: usize = 8;

/// Configuration for one benchmark run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the backing extent (file or raw block device).
    pub file: PathBuf,
    /// Total bytes to transfer. Operator-supplied, not derived from the
    /// file size.
    pub size: usize,
    /// Number of pieces the ping-pong strategy divides the transfer into.
    /// Must be even and must divide `size` evenly.
    pub piece_count: usize,
    /// Whether to request uncached (`O_DIRECT`) reads. When the filesystem
    /// refuses, reads silently fall back to the buffered descriptor.
    pub direct_io: bool,
    /// Whether to copy the device buffer back after the run and compare it
    /// against the backing extent.
    pub verify: bool,
    /// Accelerator device ordinal.
    pub device_ordinal: usize,
}

impl Config {
    /// Create a configuration with default knobs for the given extent.
    pub fn new(file: impl Into<PathBuf>, size: usize) -> Self {
        Self {
            file: file.into(),
            size,
            piece_count: DEFAULT_PIECE_COUNT,
            direct_io: true,
            verify: false,
            device_ordinal: 0,
        }
    }

    /// Apply `XFERBENCH_*` environment overrides on top of this config.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(val) = env_var("XFERBENCH_PIECES")? {
            self.piece_count = parse_usize(&val, "XFERBENCH_PIECES")?;
        }
        if let Some(val) = env_var("XFERBENCH_DIRECT_IO")? {
            self.direct_io = parse_bool(&val, "XFERBENCH_DIRECT_IO")?;
        }
        if let Some(val) = env_var("XFERBENCH_VERIFY")? {
            self.verify = parse_bool(&val, "XFERBENCH_VERIFY")?;
        }
        if let Some(val) = env_var("XFERBENCH_DEVICE")? {
            self.device_ordinal = parse_usize(&val, "XFERBENCH_DEVICE")?;
        }
        Ok(self)
    }

    /// Size of one ping-pong piece.
    pub fn piece_size(&self) -> usize {
        self.size / self.piece_count
    }

    /// Validate the configuration before any I/O is attempted.
    ///
    /// The checks mirror the preconditions of the strategies: a violation
    /// here would otherwise surface mid-run with the storage offset and
    /// device buffer in an inconsistent state.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::new(ErrorKind::ConfigInvalid, "transfer size is zero")
                .with_operation("Config::validate"));
        }
        if self.piece_count == 0 || self.piece_count % 2 != 0 {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "piece count must be even and nonzero",
            )
            .with_operation("Config::validate")
            .with_context("piece_count", self.piece_count.to_string()));
        }
        if self.size % self.piece_count != 0 {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "size not divisible by piece count",
            )
            .with_operation("Config::validate")
            .with_context("size", self.size.to_string())
            .with_context("piece_count", self.piece_count.to_string()));
        }
        if self.direct_io {
            let ps = page_size();
            if !is_aligned(self.size, ps) || !is_aligned(self.piece_size(), ps) {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    "direct I/O requires page-aligned size and piece size",
                )
                .with_operation("Config::validate")
                .with_context("size", self.size.to_string())
                .with_context("piece_size", self.piece_size().to_string())
                .with_context("page_size", ps.to_string()));
            }
        }
        Ok(())
    }
}

/// Read an environment variable, returning `None` if it is unset or empty.
fn env_var(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(Error::new(
            ErrorKind::ConfigInvalid,
            format!("environment variable {name} contains invalid Unicode"),
        )
        .with_operation("Config::apply_env")
        .with_context("env_var", name)),
    }
}

fn parse_usize(val: &str, var_name: &str) -> Result<usize> {
    val.trim().parse::<usize>().map_err(|e| {
        Error::new(
            ErrorKind::ConfigInvalid,
            format!("invalid value for {var_name}: {val:?}"),
        )
        .with_operation("Config::apply_env")
        .with_context("env_var", var_name)
        .set_source(e)
    })
}

fn parse_bool(val: &str, var_name: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(Error::new(
            ErrorKind::ConfigInvalid,
            format!("invalid boolean value for {var_name}: {val:?}"),
        )
        .with_operation("Config::apply_env")
        .with_context("env_var", var_name)),
    }
}
