//! Disk-to-device transfer harness: runs all five strategies.
//!
//! Results only mean something against cold storage. Drop the page cache
//! between runs:
//!
//! ```sh
//! sudo su -c "echo 3 > /proc/sys/vm/drop_caches"
//! ```
//!
//! # Usage
//!
//! ```sh
//! cargo run --example bench_transfer --release --features cuda -- \
//!     --file /data/rng --size 1GiB --verify
//! ```
//!
//! Without `--features cuda` the device side is emulated in host memory
//! (the storage-side numbers stay meaningful; the copy-in numbers measure
//! memcpy, not a bus).

#[path = "common.rs"]
mod common;

use common::parse_args;

use xferbench::{Config, Reporter, strategy};

fn main() {
    let args = parse_args();
    let Some(file) = args.file else {
        eprintln!("error: --file is required (see --help)");
        std::process::exit(2);
    };

    let mut cfg = Config::new(file, args.size);
    cfg.piece_count = args.pieces;
    cfg.direct_io = args.direct;
    cfg.verify = args.verify;
    cfg.device_ordinal = args.device;
    let cfg = cfg.apply_env().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(2);
    });

    let mut rep = Reporter::stdout();

    #[cfg(feature = "cuda")]
    let result = {
        let dev = xferbench::cuda::CudaTransfer::new(cfg.device_ordinal).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        });
        strategy::run_all(&dev, &cfg, &mut rep)
    };

    #[cfg(not(feature = "cuda"))]
    let result = {
        rep.note("no cuda feature: emulating the device side in host memory");
        strategy::run_all(&xferbench::compat::CompatContext, &cfg, &mut rep)
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
