//! Plain-text run logs: the skip list read at discovery, and append-only logs written per file
//! (processed paths, CRC32 mismatches, extension differences). UTF-8, one entry per line.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Load the skip list at `path`. A missing file is an empty list.
pub fn load_skip_list(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read skip log {}", path.display()))?;
    Ok(text
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Create the parent directory chain of a log file so later appends cannot fail on it.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Append-only line log. Safe to share between threads.
pub struct RunLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl RunLog {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open run log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append `line` and a newline with a single `write_all`, so concurrent appends never interleave.
    pub fn append_line(&self, line: &str) -> Result<()> {
        let line = format!("{}\n", line);
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to {}", self.path.display()))?;
        Ok(())
    }

    /// Append a path, in the form [`load_skip_list`] reads back.
    pub fn append(&self, path: &Path) -> Result<()> {
        self.append_line(&path.display().to_string())
    }
}
