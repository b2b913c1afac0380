//! Stream provider: turns queued files into opened, admitted streams, one at a time.

use log::debug;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{DiscoveryError, FileError, Phase};
use crate::utils::CancelToken;
use crate::{DiscoveryTotals, PendingFile};

use super::admission::{Acquire, AdmissionController, AdmissionSlot};
use super::discovery::{DiscoveryOpts, discover_root};
use super::partition::PartitionSet;

pub type StreamReader = Box<dyn Read + Send>;

/// Opens the byte stream behind a path. Used for the first open and again for every retry.
pub trait StreamOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<StreamReader>;
}

/// Opens files from the file system.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileOpener;

impl StreamOpener for FileOpener {
    fn open(&self, path: &Path) -> io::Result<StreamReader> {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

/// Every path opens as `length` zero bytes. Drives the null-stream diagnostic workload.
#[derive(Clone, Copy, Debug)]
pub struct NullOpener {
    pub length: u64,
}

impl StreamOpener for NullOpener {
    fn open(&self, _path: &Path) -> io::Result<StreamReader> {
        Ok(Box::new(io::repeat(0).take(self.length)))
    }
}

/// An admitted, opened stream. Owns its admission slot; dropping the stream releases it.
pub struct ProvidedStream {
    tag: PathBuf,
    size: u64,
    reader: Option<StreamReader>,
    opener: Arc<dyn StreamOpener>,
    slot: AdmissionSlot,
}

impl ProvidedStream {
    /// Source path of the stream.
    pub fn tag(&self) -> &Path {
        &self.tag
    }

    /// Size seen at discovery.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn slot(&self) -> &AdmissionSlot {
        &self.slot
    }

    /// The reader opened at admission. `None` once taken.
    pub fn take_reader(&mut self) -> Option<StreamReader> {
        self.reader.take()
    }

    /// Open the source again from byte 0 for a retry. Keeps the admission slot.
    pub fn reopen(&mut self) -> io::Result<StreamReader> {
        self.opener.open(&self.tag)
    }
}

impl fmt::Debug for ProvidedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidedStream")
            .field("tag", &self.tag)
            .field("size", &self.size)
            .field("slot", &self.slot)
            .finish()
    }
}

pub struct StreamProvider {
    admission: Arc<AdmissionController>,
    opener: Arc<dyn StreamOpener>,
    totals: DiscoveryTotals,
}

impl StreamProvider {
    /// Provider over the file system.
    pub fn new(set: &PartitionSet) -> Self {
        Self::with_opener(set, Arc::new(FileOpener))
    }

    pub fn with_opener(set: &PartitionSet, opener: Arc<dyn StreamOpener>) -> Self {
        Self {
            admission: Arc::new(AdmissionController::new(set)),
            opener,
            totals: DiscoveryTotals::default(),
        }
    }

    /// `count` synthetic zero-filled streams of `length` bytes, at most `parallel` at a time.
    pub fn synthetic(count: u64, length: u64, parallel: usize) -> Self {
        let set = PartitionSet {
            global_limit: parallel.max(1),
            partitions: Vec::new(),
        };
        let mut provider = Self::with_opener(&set, Arc::new(NullOpener { length }));
        for i in 0..count {
            provider.enqueue(PathBuf::from(format!("null-stream-{i}")), length);
        }
        provider
    }

    /// Queue one file. Counts toward [`Self::totals`].
    pub fn enqueue(&mut self, path: impl Into<PathBuf>, size: u64) {
        self.totals.file_count += 1;
        self.totals.total_bytes += size;
        self.admission.enqueue(PendingFile::new(path, size));
    }

    /// Walk every root, queueing accepted files on their partitions. Returns the totals added by
    /// this call. Traversal errors go to `on_error` and never stop the walk.
    pub fn discover<P: AsRef<Path>>(
        &mut self,
        roots: &[P],
        opts: &DiscoveryOpts,
        accept: &mut dyn FnMut(&Path) -> bool,
        on_error: &mut dyn FnMut(DiscoveryError),
    ) -> DiscoveryTotals {
        let mut added = DiscoveryTotals::default();
        let admission = &self.admission;
        for root in roots {
            let root_totals = discover_root(
                root.as_ref(),
                opts,
                accept,
                &mut |file: PendingFile| {
                    admission.enqueue(file);
                },
                on_error,
            );
            added.file_count += root_totals.file_count;
            added.total_bytes += root_totals.total_bytes;
        }
        self.totals.file_count += added.file_count;
        self.totals.total_bytes += added.total_bytes;
        added
    }

    /// Everything queued so far.
    pub fn totals(&self) -> DiscoveryTotals {
        self.totals
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Lazy sequence of admitted streams. Ends when every queue is drained, the token is
    /// cancelled or the admission controller is closed.
    pub fn streams(&self, cancel: &CancelToken) -> Streams {
        Streams {
            admission: Arc::clone(&self.admission),
            opener: Arc::clone(&self.opener),
            cancel: cancel.clone(),
        }
    }
}

/// Iterator returned by [`StreamProvider::streams`].
pub struct Streams {
    admission: Arc<AdmissionController>,
    opener: Arc<dyn StreamOpener>,
    cancel: CancelToken,
}

impl Iterator for Streams {
    type Item = Result<ProvidedStream, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (slot, file) = match self.admission.acquire_next(&self.cancel) {
                Acquire::Admitted(slot, file) => (slot, file),
                Acquire::Exhausted | Acquire::Cancelled => return None,
            };
            match self.opener.open(&file.path) {
                Ok(reader) => {
                    return Some(Ok(ProvidedStream {
                        tag: file.path,
                        size: file.size_bytes,
                        reader: Some(reader),
                        opener: Arc::clone(&self.opener),
                        slot,
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Vanished between discovery and open.
                    drop(slot);
                    debug!("{} vanished before open, skipping", file.path.display());
                }
                Err(e) => {
                    drop(slot);
                    return Some(Err(FileError::new(&file.path, Phase::Opening, 0, e.into())));
                }
            }
        }
    }
}
