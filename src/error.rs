//! Error types for xferbench.
//!
//! # Design
//!
//! - [`ErrorKind`] categorizes *what* went wrong.
//! - [`Error`] adds the failing operation and key-value context.
//!
//! Every error is fatal to the strategy that raised it: the harness
//! privileges accurate throughput measurement over resilience, so there
//! are no retries and no per-strategy isolation. Errors are constructed
//! via a fluent builder:
//!
//! ```
//! use xferbench::error::{Error, ErrorKind};
//!
//! let err = Error::new(ErrorKind::ShortRead, "read returned fewer bytes than requested")
//!     .with_operation("StorageHandle::read_into")
//!     .with_context("requested", "1073741824")
//!     .with_context("actual", "536870912");
//! ```

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

/// A specialized `Result` type for xferbench operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categorizes the type of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An internal error that should not happen under normal conditions.
    Unexpected,
    /// The backing file or device node was not found.
    NotFound,
    /// Permission denied when opening the backing extent.
    PermissionDenied,
    /// Invalid configuration or arguments, detected before any I/O.
    ConfigInvalid,
    /// A storage read returned fewer bytes than requested.
    ///
    /// Direct-mode reads of aligned, full-size requests are expected to be
    /// atomic; a short read is treated as a hard failure with no retry.
    ShortRead,
    /// Pinned host or device memory could not be reserved.
    Allocation,
    /// A device copy or synchronize call failed.
    Transfer,
    /// A POSIX/system call failed.
    SystemError,
}

impl ErrorKind {
    /// Returns a static string label for this error kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::ShortRead => "ShortRead",
            ErrorKind::Allocation => "Allocation",
            ErrorKind::Transfer => "Transfer",
            ErrorKind::SystemError => "SystemError",
        }
    }

    /// Whether to capture a backtrace for this error kind.
    ///
    /// Backtrace capture is expensive; only `Unexpected` warrants it since
    /// its call site is the surprising part.
    fn enable_backtrace(&self) -> bool {
        matches!(self, ErrorKind::Unexpected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for xferbench.
pub struct Error {
    kind: ErrorKind,
    message: String,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    backtrace: Option<Box<Backtrace>>,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: "",
            context: Vec::new(),
            source: None,
            // `Backtrace::capture()` is zero cost when RUST_BACKTRACE is unset.
            backtrace: kind
                .enable_backtrace()
                .then(Backtrace::capture)
                .filter(|bt| bt.status() == BacktraceStatus::Captured)
                .map(Box::new),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the operation that caused this error.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Returns the human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the error context as key-value pairs.
    pub fn context_iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.context.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Set the operation that caused this error.
    ///
    /// If the error already has an operation, the previous one is pushed
    /// into context as `("called", previous_operation)`.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add a key-value context pair.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the underlying source error.
    pub fn set_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} at {} => {}", self.kind, self.operation, self.message)?;
        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in &self.context {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source}")?;
        }
        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.operation)?;
        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}: {v}")?;
            }
            write!(f, " }}")?;
        }
        write!(f, " => {}", self.message)?;
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ErrorKind::ShortRead.as_str(), "ShortRead");
        assert_eq!(ErrorKind::Allocation.as_str(), "Allocation");
        assert_eq!(ErrorKind::Transfer.as_str(), "Transfer");
        assert_eq!(ErrorKind::ConfigInvalid.as_str(), "ConfigInvalid");
        assert_eq!(format!("{}", ErrorKind::SystemError), "SystemError");
    }

    #[test]
    fn test_error_new_defaults() {
        let err = Error::new(ErrorKind::NotFound, "file missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.operation(), "");
        assert_eq!(err.message(), "file missing");
    }

    #[test]
    fn test_error_builder_chain() {
        let err = Error::new(ErrorKind::ShortRead, "read returned 512 bytes")
            .with_operation("StorageHandle::read_into")
            .with_context("requested", "4096");

        assert_eq!(err.kind(), ErrorKind::ShortRead);
        assert_eq!(err.operation(), "StorageHandle::read_into");
        let ctx: Vec<_> = err.context_iter().collect();
        assert_eq!(ctx, vec![("requested", "4096")]);
    }

    #[test]
    fn test_error_operation_chaining() {
        let err = Error::new(ErrorKind::SystemError, "pread failed")
            .with_operation("pread")
            .with_operation("StorageHandle::read_into");

        assert_eq!(err.operation(), "StorageHandle::read_into");
        let ctx: Vec<_> = err.context_iter().collect();
        assert_eq!(ctx, vec![("called", "pread")]);
    }

    #[test]
    fn test_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::new(ErrorKind::SystemError, "failed to open file")
            .with_operation("StorageHandle::open")
            .set_source(io_err);

        let source = StdError::source(&err).unwrap();
        assert!(source.to_string().contains("no such file"));
    }

    #[test]
    fn test_error_display_format() {
        let err = Error::new(ErrorKind::ConfigInvalid, "size not divisible by piece count")
            .with_operation("Config::validate")
            .with_context("size", "1001")
            .with_context("piece_count", "8");

        let display = format!("{err}");
        assert!(display.contains("ConfigInvalid"));
        assert!(display.contains("Config::validate"));
        assert!(display.contains("size: 1001"));
        assert!(display.contains("piece_count: 8"));
        assert!(display.contains("size not divisible by piece count"));
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::new(ErrorKind::Transfer, "copy enqueue failed")
            .with_operation("CompatContext::copy_in_async")
            .with_context("dst_offset", "4096");

        let debug = format!("{err:?}");
        assert!(debug.contains("Transfer"));
        assert!(debug.contains("copy enqueue failed"));
        assert!(debug.contains("dst_offset: 4096"));
    }

    #[test]
    fn test_backtrace_not_captured_for_expected_kinds() {
        for kind in [
            ErrorKind::ShortRead,
            ErrorKind::Allocation,
            ErrorKind::Transfer,
            ErrorKind::ConfigInvalid,
            ErrorKind::SystemError,
        ] {
            let err = Error::new(kind, "x");
            assert!(err.backtrace.is_none(), "{kind} captured a backtrace");
        }
    }

    #[test]
    fn test_error_is_send_sync_std_error() {
        fn assert_bounds<T: std::error::Error + Send + Sync>() {}
        assert_bounds::<Error>();
    }
}
