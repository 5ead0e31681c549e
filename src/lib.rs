//! # xferbench
//!
//! A throughput-benchmarking harness for moving large, fixed-size blocks
//! from persistent storage into accelerator device memory, comparing five
//! data-movement strategies:
//!
//! 1. **read direct**: one uncached read into an anonymous mapping.
//! 2. **read mmap**: populate-on-map view, touched one byte per page.
//! 3. **read to gpu pingpong**: double-buffered pipelined transfer
//!    through two pinned staging buffers.
//! 4. **read to gpu single**: sequential baseline through one pinned
//!    buffer sized to the whole transfer.
//! 5. **read to gpu mmap**: device copy sourced directly from the
//!    mapped region.
//!
//! Naive "read into host memory, then copy to device" pipelines
//! under-utilize storage and bus bandwidth; the harness measures the
//! alternatives so an operator can pick the fastest path for a given
//! storage/accelerator pairing. Each strategy is timed and reported as a
//! `<label>: <elapsed>s, <rate> GB/s` line.
//!
//! The accelerator is consumed through the [`DeviceContext`] trait:
//! `cuda::CudaTransfer` (feature `cuda`) drives a real GPU via cudarc;
//! [`compat::CompatContext`](compat::CompatContext) emulates the
//! capability with host memory so the harness and its tests run anywhere.
//!
//! ## Example
//!
//! ```no_run
//! use xferbench::{Config, Reporter, strategy};
//! use xferbench::compat::CompatContext;
//!
//! let cfg = Config::new("/data/rng", 1024 * 1024 * 1024)
//!     .apply_env()
//!     .unwrap();
//! strategy::run_all(&CompatContext, &cfg, &mut Reporter::stdout()).unwrap();
//! ```

pub mod align;
pub mod compat;
pub mod config;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod device;
pub mod error;
pub mod report;
pub mod storage;
pub mod strategy;
pub mod timing;

pub use config::Config;
pub use device::{DeviceContext, DeviceMemory, PinnedMemory};
pub use error::{Error, ErrorKind, Result};
pub use report::Reporter;
pub use storage::{MappedRegion, StorageHandle};
pub use timing::Sample;
