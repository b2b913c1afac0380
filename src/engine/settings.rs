//! Run settings: defaults, typed sub-settings parsed from their string forms, and validation.
//!
//! Built in three layers: [`Settings::default`], then the config file, then CLI flags.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use regex::Regex;
use thiserror::Error;

use crate::engine::reader::{InvalidReadWindow, ReadWindow};
use crate::pipeline::discovery::{DiscoveryOpts, WalkMode};
use crate::pipeline::partition::{PartitionParseError, PartitionSet};
use crate::utils::config::{BufferConsts, DEFAULT_MAX_RETRIES};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("no paths given")]
    NoRoots,
    #[error("invalid --concurrent value: {0}")]
    Partitions(#[from] PartitionParseError),
    #[error("invalid null stream spec {0:?}, expected <count>:<length MiB>:<parallel>")]
    NullStream(String),
    #[error("invalid extension list {0:?}")]
    Extensions(String),
    #[error("{what} of {mib} MiB does not fit in memory")]
    SizeOverflow { what: &'static str, mib: usize },
    #[error("read window must satisfy 0 < min ({min}) <= max ({max})")]
    ReadWindow { min: usize, max: usize },
    #[error("buffer length ({buffer}) must hold at least one max-size read ({max_read})")]
    BufferTooSmall { buffer: usize, max_read: usize },
    #[error("invalid CRC32 error log {value:?}: {reason}")]
    Crc32ErrorLog { value: String, reason: String },
    #[error("{option} needs the {consumer} consumer")]
    NeedsConsumer {
        option: &'static str,
        consumer: &'static str,
    },
}

/// Convert a MiB count from the CLI or config file to bytes.
pub fn mib_to_bytes(what: &'static str, mib: usize) -> Result<usize, SettingsError> {
    mib.checked_mul(1 << 20)
        .ok_or(SettingsError::SizeOverflow { what, mib })
}

/// Extension allow or deny list. Matching is on the real extension, ASCII case-insensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExtensionFilter {
    #[default]
    All,
    /// Only files with one of these extensions.
    Allow(HashSet<String>),
    /// Every file except those with one of these extensions.
    Deny(HashSet<String>),
}

impl ExtensionFilter {
    pub fn accepts(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match self {
            ExtensionFilter::All => true,
            ExtensionFilter::Allow(set) => ext.is_some_and(|e| set.contains(&e)),
            ExtensionFilter::Deny(set) => ext.is_none_or(|e| !set.contains(&e)),
        }
    }
}

impl FromStr for ExtensionFilter {
    type Err = SettingsError;

    /// `"mkv,mp4"` allows, `"-tmp,part"` denies. Leading dots are ignored. Empty means all.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (deny, list) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let exts: HashSet<String> = list
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if exts.iter().any(|e| e.contains(['/', '\\'])) {
            return Err(SettingsError::Extensions(s.to_string()));
        }
        Ok(match (deny, exts.is_empty()) {
            (_, true) => ExtensionFilter::All,
            (true, false) => ExtensionFilter::Deny(exts),
            (false, false) => ExtensionFilter::Allow(exts),
        })
    }
}

/// Replaced by the file's CRC32 (uppercase hex) in a CRC32 error log pattern.
pub const CRC32_PLACEHOLDER: &str = "<CRC32>";

/// Default pattern: the CRC32 appears somewhere in the path, any case.
pub const DEFAULT_CRC32_PATTERN: &str = "(?i)<CRC32>";

/// Log of files whose full path does not match `pattern` once [`CRC32_PLACEHOLDER`] is
/// replaced by the file's CRC32. Each miss is appended as `HEX path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crc32ErrorLog {
    pub path: PathBuf,
    pub pattern: String,
}

impl Crc32ErrorLog {
    /// The regex for one file's CRC32.
    pub fn regex_for(&self, crc32_hex: &str) -> Result<Regex, regex::Error> {
        Regex::new(&self.pattern.replace(CRC32_PLACEHOLDER, crc32_hex))
    }
}

impl FromStr for Crc32ErrorLog {
    type Err = SettingsError;

    /// `PATH[:PATTERN]`. A leading `X:\` or `X:/` drive is part of the path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason: String| SettingsError::Crc32ErrorLog {
            value: s.to_string(),
            reason,
        };
        let drive = match s.as_bytes() {
            [d, b':', b'\\' | b'/', ..] if d.is_ascii_alphabetic() => 2,
            _ => 0,
        };
        let (path, pattern) = match s[drive..].find(':') {
            Some(i) => (&s[..drive + i], &s[drive + i + 1..]),
            None => (s, ""),
        };
        if path.trim().is_empty() {
            return Err(bad("empty path".to_string()));
        }
        let log = Self {
            path: PathBuf::from(path),
            pattern: match pattern {
                "" => DEFAULT_CRC32_PATTERN.to_string(),
                p => p.to_string(),
            },
        };
        // Fail now rather than on the first file.
        log.regex_for("00000000")
            .map_err(|e| bad(e.to_string()))?;
        Ok(log)
    }
}

/// Synthetic workload: `count` zero-filled streams of `length` bytes, `parallel` at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NullStreamTest {
    pub count: u64,
    pub length: u64,
    pub parallel: usize,
}

impl FromStr for NullStreamTest {
    type Err = SettingsError;

    /// `<count>:<length MiB>:<parallel>`, e.g. `"100:64:4"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SettingsError::NullStream(s.to_string());
        let mut parts = s.split(':').map(str::trim);
        let (Some(count), Some(length), Some(parallel), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };
        let count: u64 = count.parse().map_err(|_| bad())?;
        let length_mib: u64 = length.parse().map_err(|_| bad())?;
        let parallel: usize = parallel.parse().map_err(|_| bad())?;
        if parallel == 0 {
            return Err(bad());
        }
        Ok(Self {
            count,
            length: length_mib.checked_mul(1 << 20).ok_or_else(bad)?,
            parallel,
        })
    }
}

impl fmt::Display for NullStreamTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.count, self.length >> 20, self.parallel)
    }
}

/// Everything one run needs, after defaults, config file and CLI are merged.
#[derive(Clone, Debug)]
pub struct Settings {
    pub roots: Vec<PathBuf>,
    /// Consumer names (case-insensitive). Empty means "list what is available".
    pub consumers: Vec<String>,
    pub recursive: bool,
    pub follow_links: bool,
    pub walk_mode: WalkMode,
    /// Explicit partitions; `None` derives them from the roots' volumes.
    pub partitions: Option<PartitionSet>,
    pub buffer_length: usize,
    pub read_window: ReadWindow,
    pub max_retries: u32,
    pub extensions: ExtensionFilter,
    /// Paths listed here are excluded at discovery.
    pub skip_log: Option<PathBuf>,
    /// Paths of successfully processed files are appended here.
    pub processed_log: Option<PathBuf>,
    pub crc32_error_log: Option<Crc32ErrorLog>,
    /// Files whose detected format does not fit their extension are appended here.
    pub ext_diff_log: Option<PathBuf>,
    pub print_hashes: bool,
    pub json: bool,
    pub progress: bool,
    pub verbose: bool,
    pub null_stream: Option<NullStreamTest>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            consumers: Vec::new(),
            recursive: true,
            follow_links: false,
            walk_mode: WalkMode::Auto,
            partitions: None,
            buffer_length: BufferConsts::BUFFER_LENGTH,
            read_window: ReadWindow::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            extensions: ExtensionFilter::All,
            skip_log: None,
            processed_log: None,
            crc32_error_log: None,
            ext_diff_log: None,
            print_hashes: false,
            json: false,
            progress: true,
            verbose: false,
            null_stream: None,
        }
    }
}

impl Settings {
    /// Point both the skip log and the processed log at one file, so reruns resume.
    pub fn set_done_log(&mut self, path: PathBuf) {
        self.skip_log = Some(path.clone());
        self.processed_log = Some(path);
    }

    pub fn discovery_opts(&self) -> DiscoveryOpts {
        DiscoveryOpts {
            recursive: self.recursive,
            follow_links: self.follow_links,
            walk_mode: self.walk_mode,
        }
    }

    /// Check cross-field constraints. Consumer names are checked against the registry separately.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.read_window
            .check()
            .map_err(|InvalidReadWindow { min, max }| SettingsError::ReadWindow { min, max })?;
        if self.buffer_length < self.read_window.max {
            return Err(SettingsError::BufferTooSmall {
                buffer: self.buffer_length,
                max_read: self.read_window.max,
            });
        }
        let has_consumer = |name: &str| self.consumers.iter().any(|c| c.eq_ignore_ascii_case(name));
        if self.crc32_error_log.is_some() && !has_consumer("CRC32") {
            return Err(SettingsError::NeedsConsumer {
                option: "CRC32 error log",
                consumer: "CRC32",
            });
        }
        if self.ext_diff_log.is_some() && !has_consumer("FORMAT") {
            return Err(SettingsError::NeedsConsumer {
                option: "extension difference log",
                consumer: "FORMAT",
            });
        }
        if self.roots.is_empty() && self.null_stream.is_none() {
            return Err(SettingsError::NoRoots);
        }
        Ok(())
    }
}
