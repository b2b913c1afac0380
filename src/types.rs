//! Public and internal types for the fanhash API and pipeline.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::reader::ReadWindow;
use crate::utils::CancelToken;
use crate::utils::config::{BufferConsts, DEFAULT_MAX_RETRIES};

/// A discovered file waiting in its partition queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl PendingFile {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }
}

/// Totals accumulated while discovering files. Only accepted files count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryTotals {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Finalized output of one consumer instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumerValue {
    /// Digest bytes (hash calculators).
    Digest(Vec<u8>),
    /// Detected container / file format (format sniffers); `None` when unrecognised.
    Format(Option<&'static str>),
}

impl ConsumerValue {
    /// Uppercase hex for digests, the detected format (or `unknown`) otherwise.
    pub fn render(&self) -> String {
        match self {
            ConsumerValue::Digest(bytes) => hex::encode_upper(bytes),
            ConsumerValue::Format(Some(f)) => (*f).to_string(),
            ConsumerValue::Format(None) => "unknown".to_string(),
        }
    }

    pub fn digest(&self) -> Option<&[u8]> {
        match self {
            ConsumerValue::Digest(bytes) => Some(bytes),
            ConsumerValue::Format(_) => None,
        }
    }
}

/// A consumer's name together with its finalized value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerResult {
    pub name: String,
    pub value: ConsumerValue,
}

/// Every consumer result for one successfully processed file, in registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDigests {
    pub path: PathBuf,
    pub size: u64,
    /// Retries that were needed before the successful attempt.
    pub retries: u32,
    pub results: Vec<ConsumerResult>,
}

impl FileDigests {
    /// Look up a result by consumer name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ConsumerValue> {
        self.results
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| &r.value)
    }

    pub fn to_report(&self) -> FileReport {
        FileReport {
            path: self.path.display().to_string(),
            size: self.size,
            results: self
                .results
                .iter()
                .map(|r| (r.name.clone(), r.value.render()))
                .collect(),
        }
    }
}

/// Serializable per-file report (one JSON object per line with `--json`).
#[derive(Clone, Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub size: u64,
    pub results: BTreeMap<String, String>,
}

/// Lib-only options for [`digest_paths`](crate::digest_paths).
#[derive(Clone, Debug)]
pub struct DigestOpts {
    /// Consumer names to run (case-insensitive), e.g. `["CRC32", "SHA1"]`.
    pub consumers: Vec<String>,
    /// Descend into subdirectories of each root.
    pub recursive: bool,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
    /// Partition configuration (`"<global>:<path>,<count>;..."`). When None, derived from mount points.
    pub partitions: Option<String>,
    /// Per-worker buffer budget in bytes.
    pub buffer_length: usize,
    /// Adaptive read window in bytes.
    pub read_window: ReadWindow,
    /// Retries after the first failed attempt of a file.
    pub max_retries: u32,
    /// Cancel the run from another thread; in-flight files are dropped without a result.
    pub cancel: CancelToken,
}

impl Default for DigestOpts {
    fn default() -> Self {
        Self {
            consumers: vec!["CRC32".to_string()],
            recursive: true,
            follow_links: false,
            partitions: None,
            buffer_length: BufferConsts::BUFFER_LENGTH,
            read_window: ReadWindow::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            cancel: CancelToken::new(),
        }
    }
}
