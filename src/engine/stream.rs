//! Per-stream state machine: open, read through the fan-out, finalize, retry on failure.
//!
//! ```text
//! Pulling -> Opening -> Reading -> Finalizing -> Completed
//!               ^          |            |
//!               |          +-> Failed <-+        (classify says fatal)
//!               +-- Retrying <----------+        (classify says retry)
//! any state -> Cancelled
//! ```
//!
//! Retries reopen the stream from byte 0 with fresh consumer instances and keep the stream's
//! admission slot. Only one attempt of a stream is ever in flight.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};

use crate::FileDigests;
use crate::engine::fanout::{AttemptFailure, FanoutCtx, FanoutEnd, fan_out};
use crate::error::{AttemptError, FileError, Phase};
use crate::pipeline::provider::ProvidedStream;
use crate::utils::config::DEFAULT_MAX_RETRIES;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Waiting on the provider; the stream does not exist yet.
    Pulling,
    Opening,
    Reading,
    Finalizing,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

/// Verdict on one attempt, produced by [`RetryPolicy::classify`].
#[derive(Debug)]
pub enum ReadOutcome {
    Success(FileDigests),
    /// Try again; `attempt` is the retry number about to run (1-based).
    RetryableError { cause: AttemptFailure, attempt: u32 },
    FatalError { cause: AttemptFailure },
    Cancelled,
}

/// Terminal result of a stream.
#[derive(Debug)]
pub enum StreamOutcome {
    Completed(FileDigests),
    /// Already reported through the error callback; carried for the summary.
    Failed { path: PathBuf, retry_count: u32 },
    Cancelled(PathBuf),
}

impl StreamOutcome {
    pub fn path(&self) -> &Path {
        match self {
            StreamOutcome::Completed(d) => &d.path,
            StreamOutcome::Failed { path, .. } => path,
            StreamOutcome::Cancelled(path) => path,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Errors that another attempt cannot fix.
    fn is_permanent(cause: &AttemptError) -> bool {
        match cause {
            AttemptError::ConsumerPanicked { .. } => true,
            AttemptError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::IsADirectory
                    | io::ErrorKind::InvalidInput
            ),
            AttemptError::OutOfOrder { .. } | AttemptError::LanesClosed => false,
        }
    }

    /// Decide what follows a failed attempt, given the retries already spent.
    pub fn classify(&self, retry_count: u32, failure: AttemptFailure) -> ReadOutcome {
        if retry_count < self.max_retries && !Self::is_permanent(&failure.cause) {
            ReadOutcome::RetryableError {
                cause: failure,
                attempt: retry_count + 1,
            }
        } else {
            ReadOutcome::FatalError { cause: failure }
        }
    }
}

fn transition(path: &Path, from: StreamState, to: StreamState) {
    debug!("{}: {:?} -> {:?}", path.display(), from, to);
}

/// Run one attempt: open (reusing the provider's reader on the first attempt), then fan out.
/// `Ok(None)` means the attempt saw the cancel token.
fn attempt(
    stream: &mut ProvidedStream,
    retry_count: u32,
    ctx: &FanoutCtx<'_>,
) -> Result<Option<FileDigests>, AttemptFailure> {
    let reader = match stream.take_reader() {
        Some(reader) => Ok(reader),
        None => stream.reopen(),
    };
    let mut reader = reader.map_err(|e| AttemptFailure {
        phase: Phase::Opening,
        cause: AttemptError::Io(e),
    })?;
    transition(stream.tag(), StreamState::Opening, StreamState::Reading);
    match fan_out(&mut *reader, stream.size(), ctx)? {
        FanoutEnd::Completed { bytes, results, .. } => {
            transition(stream.tag(), StreamState::Reading, StreamState::Finalizing);
            Ok(Some(FileDigests {
                path: stream.tag().to_path_buf(),
                size: bytes,
                retries: retry_count,
                results,
            }))
        }
        FanoutEnd::Cancelled => Ok(None),
    }
}

/// Drive `stream` to a terminal state. Every failed attempt is passed to `report` exactly once,
/// with `will_retry` telling whether another attempt follows. The admission slot is released when
/// `stream` drops at the end of this call.
pub fn consume_stream(
    mut stream: ProvidedStream,
    ctx: &FanoutCtx<'_>,
    policy: &RetryPolicy,
    report: &mut dyn FnMut(FileError),
) -> StreamOutcome {
    transition(stream.tag(), StreamState::Pulling, StreamState::Opening);
    let mut retry_count = 0_u32;
    loop {
        if ctx.cancel.is_cancelled() {
            return StreamOutcome::Cancelled(stream.tag().to_path_buf());
        }
        let outcome = match attempt(&mut stream, retry_count, ctx) {
            Ok(Some(digests)) => ReadOutcome::Success(digests),
            Ok(None) => ReadOutcome::Cancelled,
            // A read torn down by cancellation is not a failure.
            Err(_) if ctx.cancel.is_cancelled() => ReadOutcome::Cancelled,
            Err(failure) => policy.classify(retry_count, failure),
        };
        match outcome {
            ReadOutcome::Success(digests) => {
                transition(stream.tag(), StreamState::Finalizing, StreamState::Completed);
                ctx.progress.file_completed();
                return StreamOutcome::Completed(digests);
            }
            ReadOutcome::Cancelled => {
                debug!("{}: cancelled", stream.tag().display());
                return StreamOutcome::Cancelled(stream.tag().to_path_buf());
            }
            ReadOutcome::RetryableError { cause, attempt: next } => {
                let mut err = FileError::new(stream.tag(), cause.phase, retry_count, cause.cause);
                err.will_retry = true;
                report(err);
                transition(stream.tag(), StreamState::Reading, StreamState::Retrying);
                retry_count = next;
                transition(stream.tag(), StreamState::Retrying, StreamState::Opening);
            }
            ReadOutcome::FatalError { cause } => {
                report(FileError::new(
                    stream.tag(),
                    cause.phase,
                    retry_count,
                    cause.cause,
                ));
                transition(stream.tag(), StreamState::Reading, StreamState::Failed);
                ctx.progress.file_failed();
                return StreamOutcome::Failed {
                    path: stream.tag().to_path_buf(),
                    retry_count,
                };
            }
        }
    }
}
