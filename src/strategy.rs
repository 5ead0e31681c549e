//! The five transfer strategies and the run driver.
//!
//! All strategies operate on the same storage handle and the same device
//! destination buffer so their numbers are comparable. They execute
//! strictly sequentially on one control thread; the only concurrency is
//! the device copy engine running behind
//! [`copy_in_async`](crate::device::DeviceContext::copy_in_async), ordered
//! by explicit `synchronize` barriers. Failure of any step is fatal to the
//! whole run: strategies share the storage offset and device buffer, and
//! a partial failure would leave them inconsistent. Report lines already
//! emitted for completed strategies remain valid.
//!
//! The double-buffered schedule in [`read_to_gpu_pingpong`] is the core of
//! the harness; see its documentation for the buffer-reuse invariant.

use crate::config::Config;
use crate::device::{DeviceContext, DeviceMemory, PinnedMemory};
use crate::error::{Error, ErrorKind, Result};
use crate::report::{Reporter, format_bytes};
use crate::storage::StorageHandle;
use crate::timing::{Region, measure};

/// Bytes copied by the warm-up transfer before any timed strategy.
const WARMUP_BYTES: usize = 0x4000;

/// Run a fallible step inside a timed region, emitting the sample whether
/// the step succeeds or fails.
fn timed<T>(
    rep: &mut Reporter,
    label: &str,
    bytes: usize,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let (result, sample) = measure(label, bytes, f);
    rep.emit(&sample);
    result
}

/// Strategy 1: one uncached read into an anonymous mapping.
///
/// Allocates an anonymous populate-on-map region of `sz` bytes, then
/// issues a single raw read of `sz` bytes into it from the current
/// offset. A short read is fatal; there is no retry.
pub fn read_direct(file: &mut StorageHandle, sz: usize, rep: &mut Reporter) -> Result<()> {
    let mut buf = timed(rep, "mmap", sz, || {
        memmap2::MmapOptions::new()
            .len(sz)
            .populate()
            .map_anon()
            .map_err(|e| {
                Error::new(
                    ErrorKind::Allocation,
                    format!("anonymous mapping failed: {e}"),
                )
                .with_operation("read_direct")
                .with_context("size", sz.to_string())
                .set_source(e)
            })
    })?;
    timed(rep, "read", sz, || file.read_into(&mut buf))?;
    Ok(())
}

/// Strategy 2: mapped read, no device involvement.
///
/// Maps the extent populate-on-map and touches one byte per page across
/// the whole region, measuring storage-to-process-memory bandwidth.
pub fn read_mmap(file: &StorageHandle, sz: usize, rep: &mut Reporter) -> Result<()> {
    timed(rep, "mmfd", sz, || {
        let region = file.map(sz)?;
        std::hint::black_box(region.touch_pages());
        Ok(())
    })
}

/// Strategy 3: device copy sourced directly from a mapped region.
///
/// Maps the extent (no touch loop), then issues one async copy-in of the
/// whole mapping to the device buffer followed by a synchronize, testing
/// whether the copy engine can consume a mapped region without an
/// intermediate pinned hop.
pub fn read_to_gpu_mmap<D: DeviceContext>(
    dev: &D,
    file: &StorageHandle,
    gpubuf: &mut D::Buf,
    sz: usize,
    rep: &mut Reporter,
) -> Result<()> {
    let outer = Region::enter("gpu copyin", sz);
    let result = (|| {
        let region = timed(rep, "mmfd", sz, || file.map(sz))?;
        dev.copy_in_async(gpubuf, 0, region.as_slice())?;
        dev.synchronize()
    })();
    rep.emit(&outer.finish());
    result
}

/// Strategy 4: sequential pinned-buffer baseline, no overlap.
///
/// Resets the offset, stages the whole transfer through one pinned buffer
/// of `sz` bytes (single read), then one async copy-in plus synchronize.
pub fn read_to_gpu_single<D: DeviceContext>(
    dev: &D,
    file: &mut StorageHandle,
    gpubuf: &mut D::Buf,
    sz: usize,
    rep: &mut Reporter,
) -> Result<()> {
    file.seek_to_start();
    let outer = Region::enter("total", sz);
    let result = (|| {
        let mut hst = timed(rep, "gpu host alloc", sz, || dev.alloc_pinned(sz))?;
        timed(rep, "read to host", sz, || file.read_into(hst.as_mut_slice()?))?;
        timed(rep, "gpu host copy", sz, || {
            dev.copy_in_async(gpubuf, 0, hst.as_slice()?)?;
            dev.synchronize()
        })
    })();
    rep.emit(&outer.finish());
    result
}

/// Strategy 5: double-buffered (ping-pong) pipelined transfer.
///
/// Divides the transfer into `piece_count` equal pieces consumed in
/// storage order, alternating two pinned buffers: even pieces fill A, odd
/// pieces fill B, and piece `j` lands at device offset `j * piece_size`.
/// Each half-iteration reads a piece, synchronizes the channel, then
/// enqueues the copy-in; the synchronize drains the *other* buffer's
/// in-flight copy, so no buffer is ever refilled while a transfer sourced
/// from it is outstanding. One trailing synchronize drains the last copy.
///
/// The whole-channel synchronize limits the achievable overlap to roughly
/// one piece of read/copy concurrency. Per-buffer completion events would
/// allow deeper pipelining; this harness measures the conservative
/// schedule.
pub fn read_to_gpu_pingpong<D: DeviceContext>(
    dev: &D,
    file: &mut StorageHandle,
    gpubuf: &mut D::Buf,
    sz: usize,
    piece_count: usize,
    rep: &mut Reporter,
) -> Result<()> {
    if piece_count == 0 || piece_count % 2 != 0 || sz % piece_count != 0 {
        return Err(Error::new(
            ErrorKind::ConfigInvalid,
            "transfer size must divide evenly into an even piece count",
        )
        .with_operation("read_to_gpu_pingpong")
        .with_context("size", sz.to_string())
        .with_context("piece_count", piece_count.to_string()));
    }
    let psz = sz / piece_count;
    rep.note(&format!("piece size {psz:#x}"));

    let (bufs, sample) = measure("gpu host alloc", sz, || {
        Ok((dev.alloc_pinned(psz)?, dev.alloc_pinned(psz)?))
    });
    rep.emit(&sample);
    let (mut buf_a, mut buf_b) = bufs?;

    file.seek_to_start();
    let outer = Region::enter("total", sz);
    let result = (|| {
        for i in 0..piece_count / 2 {
            timed(rep, "tfer(0)", psz, || {
                file.read_into(buf_a.as_mut_slice()?)?;
                dev.synchronize()?;
                dev.copy_in_async(gpubuf, (2 * i) * psz, buf_a.as_slice()?)
            })?;
            timed(rep, "tfer(1)", psz, || {
                file.read_into(buf_b.as_mut_slice()?)?;
                dev.synchronize()?;
                dev.copy_in_async(gpubuf, (2 * i + 1) * psz, buf_b.as_slice()?)
            })?;
        }
        dev.synchronize()
    })();
    rep.emit(&outer.finish());
    result
}

/// Issue a small untimed copy so the first measured strategy does not pay
/// for copy-engine spin-up.
fn warmup<D: DeviceContext>(dev: &D, gpubuf: &mut D::Buf) -> Result<()> {
    let len = WARMUP_BYTES.min(gpubuf.len());
    if len == 0 {
        return Ok(());
    }
    let mut hst = dev.alloc_pinned(len)?;
    hst.as_mut_slice()?.fill(0);
    dev.copy_in_async(gpubuf, 0, hst.as_slice()?)?;
    dev.synchronize()
}

/// Copy the device buffer back and compare it against the backing extent.
fn verify<D: DeviceContext>(
    dev: &D,
    file: &StorageHandle,
    gpubuf: &D::Buf,
    sz: usize,
    rep: &mut Reporter,
) -> Result<()> {
    let device_bytes = dev.copy_out(gpubuf)?;
    let region = file.map(sz)?;
    if device_bytes[..sz] != *region.as_slice() {
        return Err(Error::new(
            ErrorKind::Unexpected,
            "device buffer does not match backing extent",
        )
        .with_operation("verify")
        .with_context("size", sz.to_string()));
    }
    rep.note("verify: device buffer matches backing extent");
    Ok(())
}

/// Run every strategy once against the configured extent.
///
/// Validates the configuration before any I/O, opens the storage handle
/// (which checks the transfer length against the backing extent),
/// allocates the device destination buffer sized to the full transfer,
/// warms the copy engine, then runs the strategies in a fixed order.
/// With [`Config::verify`] set, the device buffer is compared against
/// the extent after the final strategy.
pub fn run_all<D: DeviceContext>(dev: &D, cfg: &Config, rep: &mut Reporter) -> Result<()> {
    cfg.validate()?;
    let mut file = StorageHandle::open(&cfg.file, cfg.size as u64, cfg.direct_io)?;
    rep.note(&format!(
        "read {} from {} (direct: {})",
        format_bytes(cfg.size),
        cfg.file.display(),
        file.is_direct_active(),
    ));

    let mut gpubuf = timed(rep, "gpu alloc", cfg.size, || dev.alloc_device(cfg.size))?;
    warmup(dev, &mut gpubuf)?;
    rep.note("copy engine is warm");

    rep.note("****** read direct");
    read_direct(&mut file, cfg.size, rep).map_err(|e| e.with_operation("read_direct"))?;

    rep.note("****** read mmap");
    read_mmap(&file, cfg.size, rep).map_err(|e| e.with_operation("read_mmap"))?;

    rep.note("****** read to gpu pingpong");
    read_to_gpu_pingpong(dev, &mut file, &mut gpubuf, cfg.size, cfg.piece_count, rep)
        .map_err(|e| e.with_operation("read_to_gpu_pingpong"))?;

    rep.note("****** read to gpu single");
    read_to_gpu_single(dev, &mut file, &mut gpubuf, cfg.size, rep)
        .map_err(|e| e.with_operation("read_to_gpu_single"))?;

    rep.note("****** read to gpu mmap");
    read_to_gpu_mmap(dev, &file, &mut gpubuf, cfg.size, rep)
        .map_err(|e| e.with_operation("read_to_gpu_mmap"))?;

    if cfg.verify {
        verify(dev, &file, &gpubuf, cfg.size, rep)?;
    }
    Ok(())
}
