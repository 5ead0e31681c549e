//! The accelerator seam: what a device backend must provide.
//!
//! The benchmark treats the accelerator as a capability, not an
//! implementation: a [`DeviceContext`] is constructed by the caller and
//! passed by reference into every strategy, so tests can substitute an
//! instrumented fake and the harness can run against either the CUDA
//! backend (`cuda::CudaTransfer`, feature `cuda`) or the host-staging
//! emulation ([`CompatContext`](crate::compat::CompatContext)).

use crate::error::Result;

/// Accelerator-resident destination memory.
pub trait DeviceMemory {
    /// Size of the buffer in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pinned (page-locked, device-visible) host staging memory.
///
/// Buffers are fixed-size, never implicitly zeroed, and owned exclusively
/// by the strategy that allocated them.
pub trait PinnedMemory {
    /// Size of the buffer in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the pages are actually locked against paging.
    ///
    /// The compat backend locks best-effort and reports the outcome here;
    /// device-driver allocations are always locked.
    fn is_locked(&self) -> bool;

    /// Immutable byte view of the buffer.
    fn as_slice(&self) -> Result<&[u8]>;

    /// Mutable byte view of the buffer.
    fn as_mut_slice(&mut self) -> Result<&mut [u8]>;
}

/// An accelerator transfer channel.
///
/// One channel serves one benchmark run. Copies enqueued with
/// [`copy_in_async`](Self::copy_in_async) are asynchronous with respect to
/// the calling thread; [`synchronize`](Self::synchronize) is the only
/// completion barrier. The central invariant of the pipelined strategy
/// lives here: a staging buffer handed to `copy_in_async` must not be
/// overwritten by a subsequent storage read until a `synchronize` call has
/// confirmed the copy consumed it.
pub trait DeviceContext {
    /// Device-resident destination buffer type.
    type Buf: DeviceMemory;
    /// Pinned host staging buffer type.
    type Pinned: PinnedMemory;

    /// Allocate `len` bytes of device memory.
    fn alloc_device(&self, len: usize) -> Result<Self::Buf>;

    /// Allocate `len` bytes of pinned host memory.
    fn alloc_pinned(&self, len: usize) -> Result<Self::Pinned>;

    /// Enqueue an asynchronous host-to-device copy of `src` into `dst` at
    /// `dst_offset` bytes.
    ///
    /// The source memory must remain untouched until the next
    /// [`synchronize`](Self::synchronize) returns.
    fn copy_in_async(&self, dst: &mut Self::Buf, dst_offset: usize, src: &[u8]) -> Result<()>;

    /// Block until every previously enqueued copy on this channel has
    /// completed.
    fn synchronize(&self) -> Result<()>;

    /// Copy the device buffer back to host memory.
    ///
    /// Used by the verification step and by tests; not part of any timed
    /// region.
    fn copy_out(&self, src: &Self::Buf) -> Result<Vec<u8>>;
}
