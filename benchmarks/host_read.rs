//! Host-only read harness: the two device-free strategies.
//!
//! Runs `read direct` and `read mmap` against a generated temp file when
//! no `--file` is given, so it works on any machine. Useful for sizing
//! the storage side before involving an accelerator.
//!
//! # Usage
//!
//! ```sh
//! cargo run --example bench_host_read --release
//! cargo run --example bench_host_read --release -- --file /data/rng --size 256MiB
//! ```

#[path = "common.rs"]
mod common;

use std::io::Write;

use common::{gen_data, parse_args};

use xferbench::{Reporter, StorageHandle, strategy};

fn main() {
    let mut args = parse_args();

    // Without a real extent, benchmark against a generated temp file
    // (page-cache warm, so direct mode is the only interesting number).
    let _tmp;
    let path = match args.file.take() {
        Some(f) => std::path::PathBuf::from(f),
        None => {
            args.size = args.size.min(64 * 1024 * 1024);
            let mut tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
            tmp.write_all(&gen_data(args.size)).expect("failed to fill temp file");
            tmp.flush().expect("failed to flush temp file");
            let path = tmp.path().to_path_buf();
            _tmp = tmp;
            path
        }
    };

    let mut rep = Reporter::stdout();
    let result = (|| {
        let mut file = StorageHandle::open(&path, args.size as u64, args.direct)?;
        rep.note(&format!(
            "read {} bytes from {} (direct: {})",
            args.size,
            path.display(),
            file.is_direct_active(),
        ));

        rep.note("****** read direct");
        strategy::read_direct(&mut file, args.size, &mut rep)?;

        rep.note("****** read mmap");
        strategy::read_mmap(&file, args.size, &mut rep)
    })();

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
