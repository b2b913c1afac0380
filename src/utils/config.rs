//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    /// Config file looked up in the current directory when `--config` is not given.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Concurrency ----

/// Per-volume stream limits used when partitions are derived from mount points.
/// Use [`StreamLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct StreamLimits {
    /// Available threads (from rayon); set by [`StreamLimits::current()`].
    pub all_threads: usize,
    /// Concurrent streams on one SSD volume.
    pub ssd_max: usize,
    /// Concurrent streams on one spinning disk. Seeks dominate, so one at a time.
    pub hdd_max: usize,
    /// Concurrent streams on a network mount.
    pub network_max: usize,
    /// Concurrent streams when the drive type is unknown.
    pub unknown_max: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            ssd_max: Self::SSD_STREAMS,
            hdd_max: Self::HDD_STREAMS,
            network_max: Self::NETWORK_STREAMS,
            unknown_max: Self::UNKNOWN_STREAMS,
        }
    }
}

impl StreamLimits {
    pub const SSD_STREAMS: usize = 4;
    pub const HDD_STREAMS: usize = 1;
    pub const NETWORK_STREAMS: usize = 2;
    pub const UNKNOWN_STREAMS: usize = 2;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

/// How often blocked waits (admission, buffer pool) re-check the cancel token.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the worker -> caller event channel.
pub const EVENT_CHANNEL_CAP: usize = 1024;

// ---- Block buffers ----

/// Block pipeline sizing defaults.
pub struct BufferConsts;

impl BufferConsts {
    /// Buffer budget per worker (bytes). 64 MiB.
    pub const BUFFER_LENGTH: usize = 64 << 20;
    /// Smallest read handed to consumers except the final block of a stream. 1 MiB.
    pub const MIN_READ_LENGTH: usize = 1 << 20;
    /// Largest single read (and block capacity). 8 MiB.
    pub const MAX_READ_LENGTH: usize = 8 << 20;
    /// A pool never holds fewer blocks than this, so the producer can fill one while lanes read another.
    pub const MIN_BLOCKS: usize = 2;
    /// Adaptive reads aim for this fraction of the bytes left in the stream.
    pub const READ_LENGTH_DIVISOR: u64 = 8;
}

// ---- Retry ----

/// Retries granted after the first failed attempt (3 attempts total).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

// ---- Progress ----

/// Progress display tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Interval between progress bar refreshes.
    pub const REFRESH_INTERVAL: Duration = Duration::from_millis(250);
    /// Log "accepted files" during discovery at most this often.
    pub const DISCOVERY_LOG_INTERVAL: Duration = Duration::from_secs(1);
}
