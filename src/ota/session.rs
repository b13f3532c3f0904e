//! Block download session: turns one file's metadata into a sequence of
//! block requests and reassembles the arriving blocks.
//!
//! ```text
//!          begin()                    last block
//!  Idle ─────────────▶ Receiving ─────────────────▶ Complete
//!   ▲                   │   ▲  │                        │
//!   │                   │   └──┘ block N accepted,      │
//!   │                   │        request N+1            │
//!   │                   ▼                               │
//!   └──── abort() ─── Failed(e) ◀── overflow / retries  │
//!   └──────────────────────── reset() ──────────────────┘
//! ```
//!
//! Exactly one block is in flight: block `N+1` is only requested after
//! block `N` was accepted.  Every copy into the reassembly buffer is
//! bounds-checked first; a violation fails the transfer instead of
//! touching memory.

use core::fmt;
use log::{debug, info, warn};

use crate::app::ports::{BlockRequest, BlockTransfer, Publisher};
use crate::config::{BLOCKS_PER_REQUEST, MAX_FILE_SIZE};

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    AlreadyInProgress,
    InvalidBlockSize,
    InvalidSize,
    NotReceiving,
    Overflow,
    ExceedsDeclaredSize,
    ShortBlock,
    RetriesExhausted,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "download already in progress"),
            Self::InvalidBlockSize => write!(f, "block size must be non-zero"),
            Self::InvalidSize => write!(f, "file size is zero or exceeds the buffer"),
            Self::NotReceiving => write!(f, "no download in progress"),
            Self::Overflow => write!(f, "block would overflow the reassembly buffer"),
            Self::ExceedsDeclaredSize => write!(f, "block exceeds the declared file size"),
            Self::ShortBlock => write!(f, "block shorter than expected"),
            Self::RetriesExhausted => write!(f, "block request retries exhausted"),
        }
    }
}

// ── Types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTransferDescriptor {
    pub file_id: u8,
    pub total_size: u32,
    pub block_size: u32,
}

impl FileTransferDescriptor {
    /// `ceil(total_size / block_size)`.
    pub fn total_blocks(&self) -> u32 {
        self.total_size.div_ceil(self.block_size)
    }
}

/// One decoded block as handed to [`BlockDownloadSession::on_block_arrived`].
#[derive(Debug, Clone, Copy)]
pub struct ArrivedBlock<'a> {
    pub file_id: u8,
    pub block_id: u32,
    pub data: &'a [u8],
}

/// When to re-send an unanswered block request, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout_ms: u32,
    pub max_retries: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Receiving,
    Complete,
    Failed(SessionError),
}

/// Why a block was dropped without changing the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    WrongFile,
    /// Duplicate or out of order: not the block currently requested.
    UnexpectedBlock,
    EmptyPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Stored; the next block has been requested.
    Accepted { block_id: u32, blocks_remaining: u32 },
    /// Stored; that was the last block.
    Complete { bytes: usize },
    Discarded { block_id: u32, reason: DiscardReason },
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    offset: u32,
    issued_at_ms: u64,
    retries: u8,
}

// ── Session ───────────────────────────────────────────────────

pub struct BlockDownloadSession<const N: usize = MAX_FILE_SIZE> {
    state: SessionState,
    descriptor: Option<FileTransferDescriptor>,
    next_offset: u32,
    blocks_remaining: u32,
    buffer: heapless::Vec<u8, N>,
    pending: Option<PendingRequest>,
}

impl<const N: usize> Default for BlockDownloadSession<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BlockDownloadSession<N> {
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
            descriptor: None,
            next_offset: 0,
            blocks_remaining: 0,
            buffer: heapless::Vec::new(),
            pending: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_receiving(&self) -> bool {
        self.state == SessionState::Receiving
    }

    pub fn descriptor(&self) -> Option<&FileTransferDescriptor> {
        self.descriptor.as_ref()
    }

    /// Index of the block currently requested.
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    pub fn blocks_remaining(&self) -> u32 {
        self.blocks_remaining
    }

    pub fn bytes_received(&self) -> usize {
        self.buffer.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// The assembled file, once the last block has been stored.
    pub fn image(&self) -> Option<&[u8]> {
        (self.state == SessionState::Complete).then_some(self.buffer.as_slice())
    }

    /// Start a transfer and request block 0.
    ///
    /// A request that the transport refuses is not an error here: it stays
    /// pending and is re-sent by [`poll_timeout`](Self::poll_timeout).
    pub fn begin<P: Publisher, T: BlockTransfer>(
        &mut self,
        descriptor: FileTransferDescriptor,
        now_ms: u64,
        publisher: &mut P,
        transfer: &mut T,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Receiving {
            return Err(SessionError::AlreadyInProgress);
        }
        if descriptor.block_size == 0 {
            return Err(SessionError::InvalidBlockSize);
        }
        if descriptor.total_size == 0 || descriptor.total_size as usize > N {
            return Err(SessionError::InvalidSize);
        }

        self.buffer.clear();
        self.next_offset = 0;
        self.blocks_remaining = descriptor.total_blocks();
        self.descriptor = Some(descriptor);
        self.state = SessionState::Receiving;
        info!(
            "OTA: download file {} ({} bytes, {} blocks of {})",
            descriptor.file_id, descriptor.total_size, self.blocks_remaining, descriptor.block_size
        );

        self.request_next(now_ms, 0, publisher, transfer);
        Ok(())
    }

    /// Store an arriving block and request the following one.
    ///
    /// `Err` is fatal: the session is in `Failed` and the buffer has been
    /// dropped.  `Err(NotReceiving)` is the exception; it leaves the
    /// session untouched.
    pub fn on_block_arrived<P: Publisher, T: BlockTransfer>(
        &mut self,
        block: ArrivedBlock<'_>,
        now_ms: u64,
        publisher: &mut P,
        transfer: &mut T,
    ) -> Result<BlockOutcome, SessionError> {
        let (SessionState::Receiving, Some(descriptor)) = (self.state, self.descriptor) else {
            return Err(SessionError::NotReceiving);
        };

        let discard = |reason| {
            debug!("OTA: discard block {} ({:?})", block.block_id, reason);
            Ok(BlockOutcome::Discarded {
                block_id: block.block_id,
                reason,
            })
        };
        if block.file_id != descriptor.file_id {
            return discard(DiscardReason::WrongFile);
        }
        if block.block_id != self.next_offset {
            return discard(DiscardReason::UnexpectedBlock);
        }
        if block.data.is_empty() {
            return discard(DiscardReason::EmptyPayload);
        }

        let len = block.data.len();
        if self.buffer.len() + len > N {
            return Err(self.fail(SessionError::Overflow));
        }
        let expected = (descriptor.total_size as usize - self.buffer.len())
            .min(descriptor.block_size as usize);
        if len > expected {
            return Err(self.fail(SessionError::ExceedsDeclaredSize));
        }
        if len < expected {
            return Err(self.fail(SessionError::ShortBlock));
        }
        if self.buffer.extend_from_slice(block.data).is_err() {
            return Err(self.fail(SessionError::Overflow));
        }
        self.blocks_remaining -= 1;

        if self.blocks_remaining == 0 {
            self.pending = None;
            self.state = SessionState::Complete;
            info!("OTA: download complete ({} bytes)", self.buffer.len());
            return Ok(BlockOutcome::Complete {
                bytes: self.buffer.len(),
            });
        }

        self.next_offset += 1;
        self.request_next(now_ms, 0, publisher, transfer);
        Ok(BlockOutcome::Accepted {
            block_id: block.block_id,
            blocks_remaining: self.blocks_remaining,
        })
    }

    /// Re-send the outstanding request once it has waited `timeout_ms`.
    ///
    /// Returns the retry number when a request was re-sent.  After
    /// `max_retries` re-sends the session fails with `RetriesExhausted`.
    pub fn poll_timeout<P: Publisher, T: BlockTransfer>(
        &mut self,
        now_ms: u64,
        policy: RetryPolicy,
        publisher: &mut P,
        transfer: &mut T,
    ) -> Result<Option<u8>, SessionError> {
        let (SessionState::Receiving, Some(pending)) = (self.state, self.pending) else {
            return Ok(None);
        };
        if now_ms.saturating_sub(pending.issued_at_ms) < u64::from(policy.timeout_ms) {
            return Ok(None);
        }
        if pending.retries >= policy.max_retries {
            return Err(self.fail(SessionError::RetriesExhausted));
        }
        let attempt = pending.retries + 1;
        warn!(
            "OTA: block {} timed out, retry {}/{}",
            pending.offset, attempt, policy.max_retries
        );
        self.request_next(now_ms, attempt, publisher, transfer);
        Ok(Some(attempt))
    }

    /// Drop any transfer and return to `Idle`.
    pub fn abort(&mut self) {
        if self.state == SessionState::Receiving {
            warn!("OTA: download aborted at block {}", self.next_offset);
        }
        self.reset();
    }

    /// Return to `Idle` after the image has been consumed.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.descriptor = None;
        self.next_offset = 0;
        self.blocks_remaining = 0;
        self.buffer.clear();
        self.pending = None;
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        warn!("OTA: download failed at block {}: {}", self.next_offset, error);
        self.state = SessionState::Failed(error);
        self.pending = None;
        self.buffer.clear();
        error
    }

    fn request_next<P: Publisher, T: BlockTransfer>(
        &mut self,
        now_ms: u64,
        retries: u8,
        publisher: &mut P,
        transfer: &mut T,
    ) {
        let Some(descriptor) = self.descriptor else {
            return;
        };
        let request = BlockRequest {
            file_id: descriptor.file_id,
            block_size: descriptor.block_size,
            offset: self.next_offset,
            count: BLOCKS_PER_REQUEST,
        };
        if !transfer.request_block(publisher, &request) {
            warn!("OTA: request for block {} not published", self.next_offset);
        }
        self.pending = Some(PendingRequest {
            offset: self.next_offset,
            issued_at_ms: now_ms,
            retries,
        });
    }
}
