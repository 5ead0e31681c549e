//! Shared utilities for xferbench harness binaries.

// Each harness binary includes this module via `#[path]` and uses a
// different subset of these utilities.
#![allow(dead_code)]

/// Parse a size string like "4KiB", "16MiB", "1GiB", or a plain number (bytes).
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1_000)
    } else {
        (s, 1)
    };
    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid size {s:?}: {e}"))?;
    Ok(num * multiplier)
}

/// Parsed harness arguments.
pub struct HarnessArgs {
    /// Path to the backing extent.
    pub file: Option<String>,
    /// Transfer size in bytes.
    pub size: usize,
    /// Piece count for the ping-pong strategy.
    pub pieces: usize,
    /// Whether to request O_DIRECT.
    pub direct: bool,
    /// Whether to verify the device buffer after the run.
    pub verify: bool,
    /// Accelerator device ordinal.
    pub device: usize,
}

impl Default for HarnessArgs {
    fn default() -> Self {
        Self {
            file: None,
            size: 1024 * 1024 * 1024,
            pieces: 8,
            direct: true,
            verify: false,
            device: 0,
        }
    }
}

/// Parse command-line arguments for the harness binaries.
///
/// Supports: `--file <path>`, `--size <size>`, `--pieces <n>`,
/// `--no-direct`, `--verify`, `--device <n>`
pub fn parse_args() -> HarnessArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut out = HarnessArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--file" => {
                i += 1;
                if i < args.len() {
                    out.file = Some(args[i].clone());
                }
            }
            "--size" => {
                i += 1;
                if i < args.len() {
                    out.size = parse_size(&args[i]).unwrap_or_else(|e| panic!("{e}"));
                }
            }
            "--pieces" => {
                i += 1;
                if i < args.len() {
                    out.pieces = args[i].parse().expect("invalid --pieces value");
                }
            }
            "--no-direct" => {
                out.direct = false;
            }
            "--verify" => {
                out.verify = true;
            }
            "--device" => {
                i += 1;
                if i < args.len() {
                    out.device = args[i].parse().expect("invalid --device value");
                }
            }
            "--help" | "-h" => {
                println!("Usage: <harness> [OPTIONS]");
                println!();
                println!("Options:");
                println!("  --file <path>    Backing extent (file or block device)");
                println!("  --size <s>       Transfer size (e.g. 256MiB, 1GiB; default 1GiB)");
                println!("  --pieces <n>     Ping-pong piece count (default: 8)");
                println!("  --no-direct      Skip O_DIRECT, use buffered reads");
                println!("  --verify         Compare device buffer against the file afterwards");
                println!("  --device <n>     Accelerator device ordinal (default: 0)");
                println!("  --help           Show this help");
                std::process::exit(0);
            }
            other => {
                eprintln!("warning: unknown argument: {other}");
            }
        }
        i += 1;
    }

    out
}

/// Generate deterministic test data of the given size.
pub fn gen_data(nbytes: usize) -> Vec<u8> {
    (0..nbytes).map(|i| (i % 251) as u8).collect()
}
