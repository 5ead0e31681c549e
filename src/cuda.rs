//! CUDA backend for the accelerator capability.
//!
//! Builds on [`cudarc`]'s driver API: one context, one stream, device
//! memory via stream allocation, staging memory via pinned host
//! allocation, copies via `memcpy_htod` on the stream. The stream is the
//! transfer channel of the benchmark; `synchronize` drains it.

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaSlice, CudaStream, PinnedHostSlice};

use crate::device::{DeviceContext, DeviceMemory, PinnedMemory};
use crate::error::{Error, ErrorKind, Result};

/// CUDA-backed transfer channel.
pub struct CudaTransfer {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
}

impl CudaTransfer {
    /// Initialize the driver and bind the default stream of `ordinal`.
    pub fn new(ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(ordinal).map_err(|e| {
            Error::new(
                ErrorKind::Transfer,
                format!("CUDA context initialization failed: {e}"),
            )
            .with_operation("CudaTransfer::new")
            .with_context("ordinal", ordinal.to_string())
        })?;
        let stream = ctx.default_stream();
        Ok(Self { ctx, stream })
    }
}

/// Pinned host staging buffer allocated through the CUDA driver.
pub struct CudaPinned {
    inner: PinnedHostSlice<u8>,
    len: usize,
}

impl PinnedMemory for CudaPinned {
    fn len(&self) -> usize {
        self.len
    }

    fn is_locked(&self) -> bool {
        // Driver allocations are page-locked by construction.
        true
    }

    fn as_slice(&self) -> Result<&[u8]> {
        self.inner.as_slice().map_err(|e| {
            Error::new(ErrorKind::Transfer, format!("pinned buffer not accessible: {e}"))
                .with_operation("CudaPinned::as_slice")
        })
    }

    fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        self.inner.as_mut_slice().map_err(|e| {
            Error::new(ErrorKind::Transfer, format!("pinned buffer not accessible: {e}"))
                .with_operation("CudaPinned::as_mut_slice")
        })
    }
}

impl DeviceMemory for CudaSlice<u8> {
    fn len(&self) -> usize {
        CudaSlice::len(self)
    }
}

impl DeviceContext for CudaTransfer {
    type Buf = CudaSlice<u8>;
    type Pinned = CudaPinned;

    fn alloc_device(&self, len: usize) -> Result<Self::Buf> {
        self.stream.alloc_zeros::<u8>(len).map_err(|e| {
            Error::new(
                ErrorKind::Allocation,
                format!("device allocation failed: {e}"),
            )
            .with_operation("CudaTransfer::alloc_device")
            .with_context("size", len.to_string())
        })
    }

    fn alloc_pinned(&self, len: usize) -> Result<Self::Pinned> {
        // SAFETY: the buffer is fully written by the storage read before
        // any byte of it is consumed.
        let inner = unsafe { self.ctx.alloc_pinned::<u8>(len) }.map_err(|e| {
            Error::new(
                ErrorKind::Allocation,
                format!("pinned host allocation failed: {e}"),
            )
            .with_operation("CudaTransfer::alloc_pinned")
            .with_context("size", len.to_string())
        })?;
        Ok(CudaPinned { inner, len })
    }

    fn copy_in_async(&self, dst: &mut Self::Buf, dst_offset: usize, src: &[u8]) -> Result<()> {
        let end = dst_offset
            .checked_add(src.len())
            .filter(|&end| end <= DeviceMemory::len(dst))
            .ok_or_else(|| {
                Error::new(ErrorKind::Transfer, "copy range exceeds device buffer")
                    .with_operation("CudaTransfer::copy_in_async")
                    .with_context("dst_offset", dst_offset.to_string())
                    .with_context("len", src.len().to_string())
            })?;
        let mut view = dst.try_slice_mut(dst_offset..end).ok_or_else(|| {
            Error::new(ErrorKind::Transfer, "device buffer view out of range")
                .with_operation("CudaTransfer::copy_in_async")
        })?;
        self.stream.memcpy_htod(src, &mut view).map_err(|e| {
            Error::new(ErrorKind::Transfer, format!("async copy-in failed: {e}"))
                .with_operation("CudaTransfer::copy_in_async")
                .with_context("dst_offset", dst_offset.to_string())
                .with_context("len", src.len().to_string())
        })
    }

    fn synchronize(&self) -> Result<()> {
        self.stream.synchronize().map_err(|e| {
            Error::new(ErrorKind::Transfer, format!("stream synchronize failed: {e}"))
                .with_operation("CudaTransfer::synchronize")
        })
    }

    fn copy_out(&self, src: &Self::Buf) -> Result<Vec<u8>> {
        self.stream.clone_dtoh(src).map_err(|e| {
            Error::new(ErrorKind::Transfer, format!("device readback failed: {e}"))
                .with_operation("CudaTransfer::copy_out")
        })
    }
}
