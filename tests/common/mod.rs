//! Shared fixtures: temp trees under the cargo target dir and in-memory stream openers.
#![allow(dead_code)]

use fanhash::pipeline::StreamOpener;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh, empty directory for one test.
pub fn temp_dir(name: &str) -> PathBuf {
    let n = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR"))
        .join(format!("{}-{}-{}", name, std::process::id(), n));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write `bytes` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

/// Deterministic non-trivial content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

struct Fault {
    remaining: u32,
    after: usize,
    kind: io::ErrorKind,
}

/// Reads an in-memory buffer, optionally failing once `fail_at` bytes were delivered.
struct MemReader {
    data: Arc<Vec<u8>>,
    pos: usize,
    fail_at: Option<(usize, io::ErrorKind)>,
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut end = self.data.len();
        if let Some((at, kind)) = self.fail_at {
            if self.pos >= at {
                return Err(io::Error::new(kind, "injected read failure"));
            }
            end = end.min(at);
        }
        let n = buf.len().min(end - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Path -> bytes opener with per-path failure injection. Unknown paths open as NotFound.
#[derive(Default)]
pub struct MemOpener {
    files: HashMap<PathBuf, Arc<Vec<u8>>>,
    faults: Mutex<HashMap<PathBuf, Fault>>,
    opens: Mutex<HashMap<PathBuf, u32>>,
}

impl MemOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(PathBuf::from(path), Arc::new(bytes));
        self
    }

    /// The next `times` opens of `path` fail with `kind` after `after` bytes were read.
    pub fn fail_reads(self, path: &str, times: u32, after: usize, kind: io::ErrorKind) -> Self {
        self.faults.lock().unwrap().insert(
            PathBuf::from(path),
            Fault {
                remaining: times,
                after,
                kind,
            },
        );
        self
    }

    pub fn open_count(&self, path: &str) -> u32 {
        self.opens
            .lock()
            .unwrap()
            .get(Path::new(path))
            .copied()
            .unwrap_or(0)
    }
}

impl StreamOpener for MemOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        *self
            .opens
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_insert(0) += 1;
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
        let mut faults = self.faults.lock().unwrap();
        let fail_at = match faults.get_mut(path) {
            Some(f) if f.remaining > 0 => {
                f.remaining -= 1;
                Some((f.after, f.kind))
            }
            _ => None,
        };
        Ok(Box::new(MemReader {
            data,
            pos: 0,
            fail_at,
        }))
    }
}

/// Endless zero stream that sleeps before every read. Keeps attempts busy for cancellation tests.
pub struct SlowOpener {
    pub delay: Duration,
}

struct SlowReader {
    delay: Duration,
}

impl Read for SlowReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(self.delay);
        let n = buf.len().min(4096);
        buf[..n].fill(0);
        Ok(n)
    }
}

impl StreamOpener for SlowOpener {
    fn open(&self, _path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(SlowReader { delay: self.delay }))
    }
}
