//! Bounded pool of reusable byte buffers and the read-only blocks built from them.
//!
//! A [`PooledBuffer`] is exclusively owned by the producer while it fills it. Sealing turns it
//! into an `Arc<Block>` shared with every consumer lane; the buffer goes back to the pool when
//! the last `Arc` is dropped, so a buffer can never be refilled while a lane still reads it.
//! An empty pool blocks the producer (backpressure).

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::utils::CancelToken;
use crate::utils::config::{BufferConsts, CANCEL_POLL_INTERVAL};

pub struct BlockPool {
    free_tx: Sender<Vec<u8>>,
    free_rx: Receiver<Vec<u8>>,
    block_count: usize,
    block_capacity: usize,
}

impl BlockPool {
    /// Allocate `block_count` buffers of `block_capacity` bytes up front.
    /// Allocation failure is returned rather than aborting the process.
    pub fn new(block_count: usize, block_capacity: usize) -> Result<Self> {
        if block_count == 0 || block_capacity == 0 {
            bail!("block pool needs at least one non-empty block");
        }
        let (free_tx, free_rx) = bounded(block_count);
        for _ in 0..block_count {
            let mut buf = Vec::new();
            buf.try_reserve_exact(block_capacity).map_err(|e| {
                anyhow::anyhow!(
                    "allocate {} x {} byte block pool: {}",
                    block_count,
                    block_capacity,
                    e
                )
            })?;
            buf.resize(block_capacity, 0);
            free_tx
                .send(buf)
                .map_err(|_| anyhow::anyhow!("block pool channel closed during setup"))?;
        }
        Ok(Self {
            free_tx,
            free_rx,
            block_count,
            block_capacity,
        })
    }

    /// Size a pool from a byte budget: `buffer_length / max_read_length` blocks (at least
    /// [`BufferConsts::MIN_BLOCKS`]) of `max_read_length` bytes each.
    pub fn for_budget(buffer_length: usize, max_read_length: usize) -> Result<Self> {
        let count = (buffer_length / max_read_length.max(1)).max(BufferConsts::MIN_BLOCKS);
        Self::new(count, max_read_length)
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Buffers currently free. Equals [`Self::block_count`] when nothing is in flight.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Take a free buffer, waiting while the pool is empty. `None` once `cancel` fires.
    pub fn acquire(&self, cancel: &CancelToken) -> Option<PooledBuffer> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.free_rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(buf) => {
                    return Some(PooledBuffer {
                        buf,
                        home: self.free_tx.clone(),
                    });
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // The pool holds its own sender, so this cannot happen while `self` is alive.
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// A buffer on loan from a [`BlockPool`]. Returned to the pool on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    home: Sender<Vec<u8>>,
}

impl PooledBuffer {
    /// Freeze the first `len` bytes as block `sequence`.
    pub fn seal(self, len: usize, sequence: u64) -> Arc<Block> {
        debug_assert!(len <= self.buf.len());
        Arc::new(Block {
            data: self,
            len,
            sequence,
        })
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        // Pool already gone means nobody will reuse the buffer; just free it.
        let _ = self.home.try_send(buf);
    }
}

/// Immutable chunk of a stream, shared by all consumer lanes of that stream.
pub struct Block {
    data: PooledBuffer,
    len: usize,
    sequence: u64,
}

impl Block {
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of this block in its stream, contiguous from 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
