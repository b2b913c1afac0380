//! Error types carried through the pipeline and the single report shape used to log them.

use log::{debug, error, warn};
use std::any::Any;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::fanout::on_consumer_lane;

/// Where in the lifecycle of a file (or the process) an error happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Opening,
    Reading,
    Finalizing,
    Reporting,
    Process,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Discovery => "discovery",
            Phase::Opening => "opening",
            Phase::Reading => "reading",
            Phase::Finalizing => "finalizing",
            Phase::Reporting => "reporting",
            Phase::Process => "process",
        };
        f.write_str(s)
    }
}

/// Why one read attempt of a stream failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("consumer {consumer} received block {got}, expected {expected}")]
    OutOfOrder {
        consumer: String,
        expected: u64,
        got: u64,
    },
    #[error("consumer {consumer} panicked: {message}")]
    ConsumerPanicked { consumer: String, message: String },
    #[error("all consumer lanes closed before end of stream")]
    LanesClosed,
}

impl AttemptError {
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            AttemptError::Io(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// A per-file error with enough context to tell what happened without re-running.
#[derive(Debug, Error)]
#[error("{phase} {} failed (retry {retry_count}): {cause}", .path.display())]
pub struct FileError {
    pub path: PathBuf,
    pub phase: Phase,
    /// Retries already spent on this file when the error happened.
    pub retry_count: u32,
    /// True when the orchestrator is going to try the file again.
    pub will_retry: bool,
    #[source]
    pub cause: AttemptError,
}

impl FileError {
    pub fn new(path: &Path, phase: Phase, retry_count: u32, cause: AttemptError) -> Self {
        Self {
            path: path.to_path_buf(),
            phase,
            retry_count,
            will_retry: false,
            cause,
        }
    }
}

/// A traversal failure: unreadable directory, permission error, vanished entry.
#[derive(Clone, Debug)]
pub struct DiscoveryError {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "{}: {}", p.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Uniform error record for logging: file errors, discovery errors and process-wide faults all
/// end up here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReport {
    pub phase: Phase,
    pub path: Option<PathBuf>,
    pub retry_count: u32,
    pub will_retry: bool,
    pub cause: String,
}

impl ErrorReport {
    /// A fault that escaped every per-file boundary.
    pub fn fault(cause: &anyhow::Error) -> Self {
        Self {
            phase: Phase::Process,
            path: None,
            retry_count: 0,
            will_retry: false,
            cause: format!("{cause:#}"),
        }
    }

    /// A panic caught by the process panic hook.
    pub fn panic(info: &std::panic::PanicHookInfo<'_>) -> Self {
        Self {
            phase: Phase::Process,
            path: None,
            retry_count: 0,
            will_retry: false,
            cause: format!("panic: {info}"),
        }
    }

    /// Retried errors are warnings; terminal ones are errors.
    pub fn log(&self) {
        if self.will_retry {
            warn!("{}", self);
        } else {
            error!("{}", self);
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.phase)?;
        if let Some(p) = &self.path {
            write!(f, " {}", p.display())?;
        }
        if self.retry_count > 0 || self.will_retry {
            write!(f, " (retry {})", self.retry_count)?;
        }
        write!(f, ": {}", self.cause)?;
        if self.will_retry {
            f.write_str(", retrying")?;
        }
        Ok(())
    }
}

impl From<&FileError> for ErrorReport {
    fn from(e: &FileError) -> Self {
        Self {
            phase: e.phase,
            path: Some(e.path.clone()),
            retry_count: e.retry_count,
            will_retry: e.will_retry,
            cause: e.cause.to_string(),
        }
    }
}

impl From<&DiscoveryError> for ErrorReport {
    fn from(e: &DiscoveryError) -> Self {
        Self {
            phase: Phase::Discovery,
            path: e.path.clone(),
            retry_count: 0,
            will_retry: false,
            cause: e.message.clone(),
        }
    }
}

/// Text of a panic payload, for the usual `&str` and `String` payloads.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Route panics into the same report path as file errors. A panic on a consumer lane only fails
/// its file, and the fan-out reports it with the path, so here it is only a debug line.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        if on_consumer_lane() {
            debug!("consumer lane {}", info);
            return;
        }
        ErrorReport::panic(info).log();
    }));
}
