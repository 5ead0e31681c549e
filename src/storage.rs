//! The storage side of the benchmark: uncached reads and mapped views.
//!
//! [`StorageHandle`] opens the backing extent with two file descriptors,
//! one with `O_DIRECT` and one without. Reads go through the direct
//! descriptor when the filesystem granted it (tmpfs and friends refuse
//! `O_DIRECT`, in which case the buffered descriptor is used so the
//! harness still runs, just without the uncached path).
//!
//! Reads are deliberately single-shot: the benchmark measures one raw
//! read call per request, and a short read is a hard [`ShortRead`]
//! failure rather than something to retry. An aligned full-size request
//! in uncached mode is expected to complete atomically.
//!
//! [`ShortRead`]: crate::error::ErrorKind::ShortRead

use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};

/// An open handle over a fixed-size backing extent.
///
/// The transfer length is operator-supplied and may be smaller than the
/// file; it is validated against the backing extent at open time, before
/// any I/O. The current read offset advances with every sequential read
/// and must be reset with [`seek_to_start`](Self::seek_to_start) before a
/// pass that reads the full extent.
pub struct StorageHandle {
    /// Descriptor with `O_DIRECT`, or -1 when the filesystem refused it.
    fd_direct: RawFd,
    /// Buffered descriptor, always valid while open.
    fd_buffered: RawFd,
    /// Declared transfer length in bytes.
    len: u64,
    /// Current sequential read offset.
    offset: u64,
    /// Whether uncached mode was requested.
    direct: bool,
    /// Path of the backing extent (for diagnostics).
    path: PathBuf,
}

impl StorageHandle {
    /// Open the backing extent at `path` for a transfer of `len` bytes.
    ///
    /// When `direct` is set, an `O_DIRECT` descriptor is attempted in
    /// addition to the buffered one; failure to obtain it is not an error.
    /// A `len` exceeding the backing extent is `ConfigInvalid`.
    pub fn open(path: &Path, len: u64, direct: bool) -> Result<Self> {
        let fd_buffered = posix_open(path, libc::O_RDONLY)
            .map_err(|e| e.with_operation("StorageHandle::open"))?;

        let fd_direct = if direct {
            posix_open(path, libc::O_RDONLY | libc::O_DIRECT).unwrap_or(-1)
        } else {
            -1
        };

        let extent = match extent_size(fd_buffered) {
            Ok(sz) => sz,
            Err(e) => {
                close_fd(fd_buffered);
                close_fd(fd_direct);
                return Err(e.with_operation("StorageHandle::open"));
            }
        };
        if len > extent {
            close_fd(fd_buffered);
            close_fd(fd_direct);
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "requested transfer length exceeds backing extent",
            )
            .with_operation("StorageHandle::open")
            .with_context("path", path.display().to_string())
            .with_context("requested", len.to_string())
            .with_context("extent", extent.to_string()));
        }

        Ok(Self {
            fd_direct,
            fd_buffered,
            len,
            offset: 0,
            direct,
            path: path.to_path_buf(),
        })
    }

    /// Declared transfer length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the declared transfer length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current sequential read offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether uncached reads are actually in effect (requested and granted).
    pub fn is_direct_active(&self) -> bool {
        self.direct && self.fd_direct >= 0
    }

    /// Path of the backing extent.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reset the read offset to the start of the extent.
    pub fn seek_to_start(&mut self) {
        self.offset = 0;
    }

    /// Read exactly `buf.len()` bytes at the current offset with a single
    /// raw read call, advancing the offset on success.
    ///
    /// Fewer bytes than requested is a `ShortRead` error; no second read
    /// is attempted. Reading past the declared transfer length is a
    /// `ConfigInvalid` error, raised before the read.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = buf.len();
        if want == 0 {
            return Ok(0);
        }
        if self.offset + want as u64 > self.len {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "read would pass the declared transfer length",
            )
            .with_operation("StorageHandle::read_into")
            .with_context("offset", self.offset.to_string())
            .with_context("requested", want.to_string())
            .with_context("len", self.len.to_string()));
        }

        let fd = if self.fd_direct >= 0 {
            self.fd_direct
        } else {
            self.fd_buffered
        };

        // SAFETY: buf is valid writable memory for `want` bytes and fd is
        // a descriptor this handle owns.
        let ret = unsafe {
            libc::pread(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                want,
                self.offset as libc::off_t,
            )
        };
        if ret < 0 {
            let io_err = std::io::Error::last_os_error();
            return Err(Error::new(ErrorKind::SystemError, format!("pread failed: {io_err}"))
                .with_operation("StorageHandle::read_into")
                .with_context("path", self.path.display().to_string())
                .with_context("offset", self.offset.to_string())
                .with_context("requested", want.to_string())
                .set_source(io_err));
        }

        let got = ret as usize;
        if got < want {
            return Err(Error::new(
                ErrorKind::ShortRead,
                "read returned fewer bytes than requested",
            )
            .with_operation("StorageHandle::read_into")
            .with_context("path", self.path.display().to_string())
            .with_context("offset", self.offset.to_string())
            .with_context("requested", want.to_string())
            .with_context("actual", got.to_string()));
        }

        self.offset += got as u64;
        Ok(got)
    }

    /// Map the first `sz` bytes of the extent as a shared, populate-on-map
    /// read-only view.
    pub fn map(&self, sz: usize) -> Result<MappedRegion> {
        if sz as u64 > self.len {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "mapping would pass the declared transfer length",
            )
            .with_operation("StorageHandle::map")
            .with_context("requested", sz.to_string())
            .with_context("len", self.len.to_string()));
        }

        // SAFETY: the buffered descriptor stays open for the lifetime of
        // the mapping (the region borrows this handle).
        let map = unsafe {
            memmap2::MmapOptions::new()
                .len(sz)
                .populate()
                .map(self.fd_buffered)
        }
        .map_err(|e| {
            Error::new(ErrorKind::SystemError, format!("mmap failed: {e}"))
                .with_operation("StorageHandle::map")
                .with_context("path", self.path.display().to_string())
                .with_context("size", sz.to_string())
                .set_source(e)
        })?;

        Ok(MappedRegion { map })
    }

    /// Close both descriptors explicitly. Also done on drop.
    pub fn close(&mut self) {
        close_fd(self.fd_buffered);
        close_fd(self.fd_direct);
        self.fd_buffered = -1;
        self.fd_direct = -1;
    }
}

impl Drop for StorageHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("direct_active", &self.is_direct_active())
            .finish()
    }
}

/// Byte stride for forcing page residency, one touch per page.
pub const PAGE_STRIDE: usize = 4096;

/// A shared, populated mapping over the backing extent.
///
/// Lives for the scope of one strategy; the pages are unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
    map: memmap2::Mmap,
}

impl MappedRegion {
    /// Length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// View of the mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// Touch one byte per [`PAGE_STRIDE`] across the whole region and
    /// return the byte sum.
    ///
    /// `MAP_POPULATE` may already have the pages resident; the walk is what
    /// charges the read bandwidth to this process. The sum is routed
    /// through `black_box` so the loop cannot be elided.
    pub fn touch_pages(&self) -> u64 {
        let mut sum: u64 = 0;
        let bytes = self.as_slice();
        let mut i = 0;
        while i < bytes.len() {
            sum += bytes[i] as u64;
            i += PAGE_STRIDE;
        }
        std::hint::black_box(sum)
    }
}

/// Open a file with POSIX `open(2)`, read-only flag combinations only.
fn posix_open(path: &Path, flags: i32) -> Result<RawFd> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
        Error::new(
            ErrorKind::ConfigInvalid,
            format!("path contains null byte: {}", path.display()),
        )
        .with_operation("posix_open")
    })?;

    // SAFETY: c_path is a valid C string.
    let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
    if fd < 0 {
        let io_err = std::io::Error::last_os_error();
        let kind = match io_err.raw_os_error() {
            Some(libc::ENOENT) => ErrorKind::NotFound,
            Some(libc::EACCES) | Some(libc::EPERM) => ErrorKind::PermissionDenied,
            _ => ErrorKind::SystemError,
        };
        Err(Error::new(kind, format!("open failed: {io_err}"))
            .with_operation("posix_open")
            .with_context("path", path.display().to_string())
            .set_source(io_err))
    } else {
        Ok(fd)
    }
}

/// Close a file descriptor, ignoring errors.
fn close_fd(fd: RawFd) {
    if fd >= 0 {
        // SAFETY: only descriptors we opened reach this point.
        unsafe {
            libc::close(fd);
        }
    }
}

/// Size of the backing extent via `fstat`.
fn extent_size(fd: RawFd) -> Result<u64> {
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fd is valid and stat is a valid out-buffer.
    let ret = unsafe { libc::fstat(fd, &mut stat) };
    if ret < 0 {
        let io_err = std::io::Error::last_os_error();
        Err(Error::new(ErrorKind::SystemError, format!("fstat failed: {io_err}"))
            .with_operation("extent_size")
            .set_source(io_err))
    } else {
        Ok(stat.st_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file_with(len: usize) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_open_nonexistent() {
        let err =
            StorageHandle::open(Path::new("/nonexistent/rng"), 4096, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_open_len_exceeds_extent() {
        let tmp = temp_file_with(4096);
        let err = StorageHandle::open(tmp.path(), 8192, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_sequential_reads_advance_offset() {
        let tmp = temp_file_with(8192);
        let mut handle = StorageHandle::open(tmp.path(), 8192, false).unwrap();
        assert_eq!(handle.offset(), 0);

        let mut buf = vec![0u8; 4096];
        assert_eq!(handle.read_into(&mut buf).unwrap(), 4096);
        assert_eq!(handle.offset(), 4096);
        assert_eq!(buf[0], 0);

        assert_eq!(handle.read_into(&mut buf).unwrap(), 4096);
        assert_eq!(handle.offset(), 8192);
        assert_eq!(buf[0], (4096 % 251) as u8);

        handle.seek_to_start();
        assert_eq!(handle.offset(), 0);
        handle.read_into(&mut buf).unwrap();
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_read_past_declared_length() {
        let tmp = temp_file_with(8192);
        // Declared length is smaller than the file.
        let mut handle = StorageHandle::open(tmp.path(), 4096, false).unwrap();
        let mut buf = vec![0u8; 8192];
        let err = handle.read_into(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(handle.offset(), 0, "failed read must not advance the offset");
    }

    #[test]
    fn test_short_read_is_fatal() {
        // A sparse declared length above the actual contents: truncate the
        // file after opening so the single read comes back short.
        let tmp = temp_file_with(8192);
        let mut handle = StorageHandle::open(tmp.path(), 8192, false).unwrap();
        tmp.as_file().set_len(4096).unwrap();

        let mut buf = vec![0u8; 8192];
        let err = handle.read_into(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShortRead);
        let ctx: Vec<_> = err.context_iter().collect();
        assert!(ctx.contains(&("requested", "8192")));
        assert!(ctx.contains(&("actual", "4096")));
        assert_eq!(handle.offset(), 0, "short read must not advance the offset");
    }

    #[test]
    fn test_zero_length_read() {
        let tmp = temp_file_with(4096);
        let mut handle = StorageHandle::open(tmp.path(), 4096, false).unwrap();
        let mut buf = [];
        assert_eq!(handle.read_into(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_direct_request_reads_correctly() {
        // Whether the filesystem grants O_DIRECT (then the destination must
        // be page-aligned) or refuses it (buffered fallback), the read
        // must come back identical.
        let tmp = temp_file_with(4096);
        let mut handle = StorageHandle::open(tmp.path(), 4096, true).unwrap();

        let ps = crate::align::page_size();
        let layout = std::alloc::Layout::from_size_align(4096, ps).unwrap();
        // SAFETY: layout has nonzero size; the allocation is freed below.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        let buf = unsafe { std::slice::from_raw_parts_mut(ptr, 4096) };

        assert_eq!(handle.read_into(buf).unwrap(), 4096);
        assert_eq!(buf[250], 250);
        assert_eq!(buf[251], 0);

        unsafe { std::alloc::dealloc(ptr, layout) };
    }

    #[test]
    fn test_map_contents() {
        let tmp = temp_file_with(16384);
        let handle = StorageHandle::open(tmp.path(), 16384, false).unwrap();
        let region = handle.map(16384).unwrap();
        assert_eq!(region.len(), 16384);
        assert_eq!(region.as_slice()[0], 0);
        assert_eq!(region.as_slice()[250], 250);
        assert_eq!(region.as_slice()[251], 0);
    }

    #[test]
    fn test_map_partial_extent() {
        let tmp = temp_file_with(16384);
        let handle = StorageHandle::open(tmp.path(), 16384, false).unwrap();
        let region = handle.map(4096).unwrap();
        assert_eq!(region.len(), 4096);
    }

    #[test]
    fn test_map_past_declared_length() {
        let tmp = temp_file_with(16384);
        let handle = StorageHandle::open(tmp.path(), 4096, false).unwrap();
        let err = handle.map(8192).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_touch_pages_sum() {
        let tmp = temp_file_with(PAGE_STRIDE * 4);
        let handle = StorageHandle::open(tmp.path(), (PAGE_STRIDE * 4) as u64, false).unwrap();
        let region = handle.map(PAGE_STRIDE * 4).unwrap();

        // One byte per page: offsets 0, 4096, 8192, 12288 under the mod-251
        // fill pattern.
        let expected: u64 = (0..4).map(|p| ((p * PAGE_STRIDE) % 251) as u64).sum();
        assert_eq!(region.touch_pages(), expected);
    }

    #[test]
    fn test_close_idempotent() {
        let tmp = temp_file_with(4096);
        let mut handle = StorageHandle::open(tmp.path(), 4096, false).unwrap();
        handle.close();
        handle.close();
    }
}
