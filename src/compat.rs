//! Host-staging emulation of the accelerator capability.
//!
//! Used when no GPU is present (tests, CI, machines without the `cuda`
//! feature). "Device" memory is ordinary host memory, copies complete
//! eagerly, and `synchronize` is a no-op barrier; the ordering contract
//! of [`DeviceContext`](crate::device::DeviceContext) holds trivially.
//! Staging buffers are page-aligned via `posix_memalign` (so uncached
//! reads can target them directly) and locked with `mlock` best-effort:
//! `RLIMIT_MEMLOCK` is often too small for benchmark-sized buffers, and a
//! failed lock only loses the pinning, not the run.

use crate::align::{align_up, page_size};
use crate::device::{DeviceContext, DeviceMemory, PinnedMemory};
use crate::error::{Error, ErrorKind, Result};

/// Accelerator emulation backed by host memory.
pub struct CompatContext;

/// Host-resident stand-in for a device destination buffer.
pub struct CompatDeviceBuffer {
    data: Vec<u8>,
}

impl DeviceMemory for CompatDeviceBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }
}

/// Page-aligned, best-effort-locked host staging buffer.
pub struct CompatPinned {
    ptr: *mut u8,
    /// Usable length as requested by the caller.
    len: usize,
    /// Allocation length, rounded up to a page multiple.
    alloc_len: usize,
    locked: bool,
}

impl CompatPinned {
    fn alloc(len: usize) -> Result<Self> {
        let ps = page_size();
        let alloc_len = align_up(len.max(1), ps);
        let mut ptr: *mut libc::c_void = std::ptr::null_mut();
        // SAFETY: ps is a power of two and a multiple of sizeof(void*).
        let ret = unsafe { libc::posix_memalign(&mut ptr, ps, alloc_len) };
        if ret != 0 {
            return Err(Error::new(
                ErrorKind::Allocation,
                "posix_memalign failed for staging buffer",
            )
            .with_operation("CompatContext::alloc_pinned")
            .with_context("size", len.to_string()));
        }

        // SAFETY: ptr was just returned by posix_memalign for alloc_len bytes.
        let locked = unsafe { libc::mlock(ptr, alloc_len) } == 0;

        Ok(Self {
            ptr: ptr as *mut u8,
            len,
            alloc_len,
            locked,
        })
    }
}

impl PinnedMemory for CompatPinned {
    fn len(&self) -> usize {
        self.len
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn as_slice(&self) -> Result<&[u8]> {
        // SAFETY: ptr is valid for len bytes for the lifetime of self.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr, self.len) })
    }

    fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        // SAFETY: ptr is valid for len bytes and we have exclusive access.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) })
    }
}

impl Drop for CompatPinned {
    fn drop(&mut self) {
        // SAFETY: ptr came from posix_memalign in alloc().
        unsafe {
            if self.locked {
                libc::munlock(self.ptr as *const libc::c_void, self.alloc_len);
            }
            libc::free(self.ptr as *mut libc::c_void);
        }
    }
}

// SAFETY: the buffer is exclusively owned; the raw pointer is never shared.
unsafe impl Send for CompatPinned {}

impl DeviceContext for CompatContext {
    type Buf = CompatDeviceBuffer;
    type Pinned = CompatPinned;

    fn alloc_device(&self, len: usize) -> Result<Self::Buf> {
        Ok(CompatDeviceBuffer {
            data: vec![0u8; len],
        })
    }

    fn alloc_pinned(&self, len: usize) -> Result<Self::Pinned> {
        CompatPinned::alloc(len)
    }

    fn copy_in_async(&self, dst: &mut Self::Buf, dst_offset: usize, src: &[u8]) -> Result<()> {
        let end = dst_offset
            .checked_add(src.len())
            .filter(|&end| end <= dst.data.len())
            .ok_or_else(|| {
                Error::new(ErrorKind::Transfer, "copy range exceeds device buffer")
                    .with_operation("CompatContext::copy_in_async")
                    .with_context("dst_offset", dst_offset.to_string())
                    .with_context("len", src.len().to_string())
                    .with_context("device_len", dst.data.len().to_string())
            })?;
        // Completes eagerly; the no-op synchronize below is still a valid
        // completion barrier.
        dst.data[dst_offset..end].copy_from_slice(src);
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn copy_out(&self, src: &Self::Buf) -> Result<Vec<u8>> {
        Ok(src.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::is_aligned_ptr;

    #[test]
    fn test_pinned_is_page_aligned() {
        let ctx = CompatContext;
        let buf = ctx.alloc_pinned(8192).unwrap();
        assert_eq!(buf.len(), 8192);
        assert!(is_aligned_ptr(buf.as_slice().unwrap().as_ptr(), page_size()));
    }

    #[test]
    fn test_pinned_read_write() {
        let ctx = CompatContext;
        let mut buf = ctx.alloc_pinned(4096).unwrap();
        for (i, b) in buf.as_mut_slice().unwrap().iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        let view = buf.as_slice().unwrap();
        assert_eq!(view[0], 0);
        assert_eq!(view[255], 255);
        assert_eq!(view[256], 0);
    }

    #[test]
    fn test_copy_in_at_offsets() {
        let ctx = CompatContext;
        let mut dev = ctx.alloc_device(16).unwrap();
        ctx.copy_in_async(&mut dev, 0, &[1, 2, 3, 4]).unwrap();
        ctx.copy_in_async(&mut dev, 8, &[9, 9]).unwrap();
        ctx.synchronize().unwrap();

        let out = ctx.copy_out(&dev).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 0, 0, 0, 0, 9, 9, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_copy_in_out_of_bounds() {
        let ctx = CompatContext;
        let mut dev = ctx.alloc_device(8).unwrap();
        let err = ctx.copy_in_async(&mut dev, 4, &[0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
    }

    #[test]
    fn test_device_buffer_len() {
        let ctx = CompatContext;
        let dev = ctx.alloc_device(12345).unwrap();
        assert_eq!(dev.len(), 12345);
        assert!(!dev.is_empty());
    }
}
