//! Block producer: reads a stream start to end into pooled blocks and hands each block to every lane.

use crossbeam_channel::Sender;
use std::io::{self, Read};
use std::sync::Arc;
use thiserror::Error;

use crate::engine::block::{Block, BlockPool};
use crate::engine::progress::ProgressCounters;
use crate::utils::CancelToken;
use crate::utils::config::BufferConsts;

/// Bounds on a single read. Every block except the last of a stream holds at least `min` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadWindow {
    pub min: usize,
    pub max: usize,
}

impl Default for ReadWindow {
    fn default() -> Self {
        Self {
            min: BufferConsts::MIN_READ_LENGTH,
            max: BufferConsts::MAX_READ_LENGTH,
        }
    }
}

/// A zero minimum would let the tail of a stream read zero bytes and look like EOF.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("read window must satisfy 0 < min ({min}) <= max ({max})")]
pub struct InvalidReadWindow {
    pub min: usize,
    pub max: usize,
}

impl ReadWindow {
    /// Unchecked; run [`ReadWindow::check`] before reading with it.
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn check(&self) -> Result<(), InvalidReadWindow> {
        if self.min == 0 || self.min > self.max {
            return Err(InvalidReadWindow {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Read length for a stream with `remaining` bytes left: an eighth of what is left,
    /// clamped to `[min, max]`.
    pub fn next_read_length(&self, remaining: u64) -> usize {
        let target = remaining / BufferConsts::READ_LENGTH_DIVISOR;
        let target = usize::try_from(target).unwrap_or(usize::MAX);
        target.clamp(self.min, self.max)
    }
}

/// Message on a consumer lane.
pub enum LaneMsg {
    Block(Arc<Block>),
    /// End of stream: finalize.
    End,
}

/// How a produce run ended when no I/O error occurred.
#[derive(Debug, PartialEq, Eq)]
pub enum ProduceEnd {
    Eof { bytes: u64, blocks: u64 },
    Cancelled,
    /// Every lane hung up (a consumer died); the stream cannot be completed.
    LanesClosed,
}

/// Fill `buf` with up to `want` bytes, stopping early only at EOF. Retries `Interrupted`.
pub fn fill_block(reader: &mut dyn Read, buf: &mut [u8], want: usize) -> io::Result<usize> {
    let want = want.min(buf.len());
    let mut filled = 0;
    while filled < want {
        match reader.read(&mut buf[filled..want]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn broadcast(lanes: &[Sender<LaneMsg>], block: &Arc<Block>) -> bool {
    lanes
        .iter()
        .all(|lane| lane.send(LaneMsg::Block(Arc::clone(block))).is_ok())
}

/// Read `reader` to EOF in blocks from `pool`, sending every block to every lane in order, then
/// [`LaneMsg::End`]. `size_hint` (the size seen at discovery) only steers read lengths; EOF
/// decides where the stream ends. I/O errors are returned as-is for the orchestrator to classify.
pub fn produce_blocks(
    reader: &mut dyn Read,
    size_hint: u64,
    window: ReadWindow,
    pool: &BlockPool,
    lanes: &[Sender<LaneMsg>],
    cancel: &CancelToken,
    progress: &ProgressCounters,
) -> io::Result<ProduceEnd> {
    let mut bytes = 0_u64;
    let mut sequence = 0_u64;
    loop {
        let Some(mut buf) = pool.acquire(cancel) else {
            return Ok(ProduceEnd::Cancelled);
        };
        let remaining = size_hint.saturating_sub(bytes);
        let want = window.next_read_length(remaining).min(buf.len());
        let n = fill_block(reader, &mut buf, want)?;
        if cancel.is_cancelled() {
            return Ok(ProduceEnd::Cancelled);
        }
        if n == 0 {
            break;
        }
        bytes += n as u64;
        progress.add_bytes_produced(n as u64);
        let block = buf.seal(n, sequence);
        sequence += 1;
        if !broadcast(lanes, &block) {
            return Ok(ProduceEnd::LanesClosed);
        }
        if n < want {
            // Short fill means EOF was hit inside this block.
            break;
        }
    }
    for lane in lanes {
        if lane.send(LaneMsg::End).is_err() {
            return Ok(ProduceEnd::LanesClosed);
        }
    }
    Ok(ProduceEnd::Eof {
        bytes,
        blocks: sequence,
    })
}
