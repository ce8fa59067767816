//! Incremental diffing for inputs that arrive in chunks.
//!
//! A [`StreamingProcessor`] owns one growable buffer per side. Chunks are
//! appended as raw text, so chunk boundaries may fall anywhere, including in
//! the middle of a line. Tokenizing, aligning, and hunking all happen at query
//! time over the buffers as accumulated so far; a finalized result is
//! therefore identical to [`compute_diff`](crate::diff::compute_diff) over the
//! concatenated texts.
//!
//! ## Session states
//!
//! ```text
//! Empty --add chunk / finish side--> Accumulating --finalize--> Finalized
//!   \______________________________________________________________/
//!                                 dispose --> Disposed
//! ```
//!
//! Several producers can feed one processor by sending [`ChunkMessage`]s over
//! a channel to a single consumer calling [`StreamingProcessor::consume`].

use crate::diff::{self, DiffOptions, DiffResult};
use crate::error::{DiffError, Side};
use log::{debug, trace};
use std::sync::mpsc::Receiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing received yet.
    Empty,
    /// At least one chunk received or one side finished.
    Accumulating,
    /// `finalize` ran; no more chunks accepted.
    Finalized,
    /// Buffers released.
    Disposed,
}

/// A unit of work for a processor fed through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkMessage {
    Old(String),
    New(String),
    FinishOld,
    FinishNew,
}

#[derive(Debug, Default)]
struct SideBuffer {
    text: String,
    finished: bool,
}

/// Accumulates both inputs of one diff session.
#[derive(Debug)]
pub struct StreamingProcessor {
    options: DiffOptions,
    old: SideBuffer,
    new: SideBuffer,
    finalized: bool,
    disposed: bool,
}

impl StreamingProcessor {
    /// Starts a session. Fails if `options` are invalid.
    ///
    /// `maxFileSize` is not enforced here: streaming is the path for inputs
    /// too large for a single-shot diff.
    pub fn new(options: DiffOptions) -> Result<Self, DiffError> {
        options.validate()?;
        Ok(Self::from_validated(options))
    }

    pub(crate) fn from_validated(options: DiffOptions) -> Self {
        Self {
            options,
            old: SideBuffer::default(),
            new: SideBuffer::default(),
            finalized: false,
            disposed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        if self.disposed {
            StreamState::Disposed
        } else if self.finalized {
            StreamState::Finalized
        } else if self.old.text.is_empty()
            && self.new.text.is_empty()
            && !self.old.finished
            && !self.new.finished
        {
            StreamState::Empty
        } else {
            StreamState::Accumulating
        }
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Bytes buffered so far as `(old, new)`, for progress reporting.
    #[inline]
    #[must_use]
    pub fn buffered_bytes(&self) -> (usize, usize) {
        (self.old.text.len(), self.new.text.len())
    }

    pub fn add_old_chunk(&mut self, chunk: &str) -> Result<(), DiffError> {
        self.append(Side::Old, chunk)
    }

    pub fn add_new_chunk(&mut self, chunk: &str) -> Result<(), DiffError> {
        self.append(Side::New, chunk)
    }

    /// Marks the old input complete; later old chunks are rejected.
    pub fn finish_old(&mut self) -> Result<(), DiffError> {
        self.finish(Side::Old)
    }

    /// Marks the new input complete; later new chunks are rejected.
    pub fn finish_new(&mut self) -> Result<(), DiffError> {
        self.finish(Side::New)
    }

    /// Diffs the buffers as they stand. Does not change the session.
    ///
    /// With nothing buffered this is the empty no-op diff.
    #[must_use]
    pub fn intermediate_result(&self) -> DiffResult {
        if self.old.text.is_empty() && self.new.text.is_empty() {
            return DiffResult::empty();
        }
        diff::diff_texts(&self.old.text, &self.new.text, &self.options)
    }

    /// Closes both sides and returns the authoritative result.
    pub fn finalize(&mut self) -> Result<DiffResult, DiffError> {
        match self.state() {
            StreamState::Disposed => return Err(disposed()),
            StreamState::Finalized => {
                return Err(DiffError::invalid_state("streaming diff already finalized"));
            }
            StreamState::Empty | StreamState::Accumulating => {}
        }

        self.old.finished = true;
        self.new.finished = true;
        self.finalized = true;
        let (old_bytes, new_bytes) = self.buffered_bytes();
        debug!("finalizing streaming diff over {old_bytes} + {new_bytes} bytes");
        Ok(diff::diff_texts(&self.old.text, &self.new.text, &self.options))
    }

    /// Applies one channel message.
    pub fn apply(&mut self, message: ChunkMessage) -> Result<(), DiffError> {
        match message {
            ChunkMessage::Old(chunk) => self.append(Side::Old, &chunk),
            ChunkMessage::New(chunk) => self.append(Side::New, &chunk),
            ChunkMessage::FinishOld => self.finish(Side::Old),
            ChunkMessage::FinishNew => self.finish(Side::New),
        }
    }

    /// Applies messages until every sender is dropped or one fails.
    ///
    /// Messages from a single sender apply in send order.
    pub fn consume(&mut self, messages: Receiver<ChunkMessage>) -> Result<(), DiffError> {
        for message in messages {
            self.apply(message)?;
        }
        Ok(())
    }

    /// Releases both buffers. Every later mutation fails.
    pub fn dispose(&mut self) {
        self.old = SideBuffer::default();
        self.new = SideBuffer::default();
        self.disposed = true;
    }

    fn buffer_mut(&mut self, side: Side) -> &mut SideBuffer {
        match side {
            Side::Old => &mut self.old,
            Side::New => &mut self.new,
        }
    }

    fn append(&mut self, side: Side, chunk: &str) -> Result<(), DiffError> {
        if self.disposed {
            return Err(disposed());
        }
        let buffer = self.buffer_mut(side);
        if buffer.finished {
            return Err(DiffError::InvalidState(format!(
                "{side} input already finalized"
            )));
        }
        buffer.text.push_str(chunk);
        trace!("appended {} bytes to {side} buffer ({} total)", chunk.len(), buffer.text.len());
        Ok(())
    }

    fn finish(&mut self, side: Side) -> Result<(), DiffError> {
        if self.disposed {
            return Err(disposed());
        }
        self.buffer_mut(side).finished = true;
        Ok(())
    }
}

fn disposed() -> DiffError {
    DiffError::invalid_state("streaming processor disposed")
}
