//! Integration tests for the storage reader: uncached reads, offset
//! bookkeeping, and mapped views against real files.


use test_utils::{gen_data, temp_file_with};

use xferbench::StorageHandle;
use xferbench::compat::CompatContext;
use xferbench::device::{DeviceContext, PinnedMemory};
use xferbench::error::ErrorKind;
use xferbench::storage::PAGE_STRIDE;

const SZ: usize = 1024 * 1024;

#[test]
fn piecewise_sequential_reads_reassemble_the_extent() {
    let tmp = temp_file_with(SZ);
    let mut handle = StorageHandle::open(tmp.path(), SZ as u64, false).unwrap();

    let piece = SZ / 8;
    let mut assembled = Vec::with_capacity(SZ);
    let mut buf = vec![0u8; piece];
    for _ in 0..8 {
        handle.read_into(&mut buf).unwrap();
        assembled.extend_from_slice(&buf);
    }

    assert_eq!(handle.offset(), SZ as u64);
    assert_eq!(assembled, gen_data(SZ));
}

#[test]
fn reset_then_reread_is_byte_identical() {
    let tmp = temp_file_with(SZ);
    let mut handle = StorageHandle::open(tmp.path(), SZ as u64, false).unwrap();

    let mut first = vec![0u8; SZ];
    handle.read_into(&mut first).unwrap();

    handle.seek_to_start();
    let mut second = vec![0u8; SZ];
    handle.read_into(&mut second).unwrap();

    assert_eq!(first, second);
}

#[test]
fn direct_mode_request_reads_through_pinned_staging() {
    // Temp dirs commonly live on tmpfs, which refuses O_DIRECT and forces
    // the buffered fallback; where O_DIRECT is granted, the page-aligned
    // staging buffer satisfies its alignment rules. Either way the bytes
    // must match.
    let tmp = temp_file_with(SZ);
    let mut handle = StorageHandle::open(tmp.path(), SZ as u64, true).unwrap();

    let dev = CompatContext;
    let mut staging = dev.alloc_pinned(SZ).unwrap();
    handle.read_into(staging.as_mut_slice().unwrap()).unwrap();
    assert_eq!(staging.as_slice().unwrap(), &gen_data(SZ)[..]);
}

#[test]
fn mapped_view_equals_read_contents() {
    let tmp = temp_file_with(SZ);
    let handle = StorageHandle::open(tmp.path(), SZ as u64, false).unwrap();

    let region = handle.map(SZ).unwrap();
    assert_eq!(region.len(), SZ);
    assert_eq!(region.as_slice(), &gen_data(SZ)[..]);
}

#[test]
fn touch_pages_walks_every_page_once() {
    let pages = 16;
    let tmp = temp_file_with(PAGE_STRIDE * pages);
    let handle =
        StorageHandle::open(tmp.path(), (PAGE_STRIDE * pages) as u64, false).unwrap();
    let region = handle.map(PAGE_STRIDE * pages).unwrap();

    let expected: u64 = (0..pages)
        .map(|p| ((p * PAGE_STRIDE) % 251) as u64)
        .sum();
    assert_eq!(region.touch_pages(), expected);
}

#[test]
fn declared_length_bounds_both_read_and_map() {
    let tmp = temp_file_with(SZ);
    // Declare only half the file.
    let mut handle = StorageHandle::open(tmp.path(), (SZ / 2) as u64, false).unwrap();

    let mut buf = vec![0u8; SZ];
    assert_eq!(
        handle.read_into(&mut buf).unwrap_err().kind(),
        ErrorKind::ConfigInvalid
    );
    assert_eq!(handle.map(SZ).unwrap_err().kind(), ErrorKind::ConfigInvalid);

    // The declared half is fully readable.
    let mut buf = vec![0u8; SZ / 2];
    handle.read_into(&mut buf).unwrap();
    assert_eq!(buf, gen_data(SZ)[..SZ / 2]);
}

#[test]
fn short_read_reports_requested_and_actual() {
    let tmp = temp_file_with(SZ);
    let mut handle = StorageHandle::open(tmp.path(), SZ as u64, false).unwrap();
    tmp.as_file().set_len((SZ / 2) as u64).unwrap();

    let mut buf = vec![0u8; SZ];
    let err = handle.read_into(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShortRead);

    let ctx: Vec<_> = err.context_iter().collect();
    assert!(ctx.contains(&("requested", SZ.to_string().as_str())));
    assert!(ctx.contains(&("actual", (SZ / 2).to_string().as_str())));
}
