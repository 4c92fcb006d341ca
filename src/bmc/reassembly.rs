//! Fetching one SDR across several size-limited Get SDR responses.

use crate::bmc::message::Request;
use crate::errors::DecodeError;
use crate::sdr::record::{self, FRAME_PREFIX, RECORD_HEADER};

/// What to do after a successful chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The whole record is in; the complete response frame.
    Complete(Vec<u8>),
    /// Fetch the next chunk with this request.
    More(Request),
}

#[derive(Debug, Clone)]
pub struct ChunkReassembler {
    record_id: u16,
    chunk_size: u8,
    max_chunk: u8,
    min_chunk: u8,
    /// Record bytes collected so far.
    offset: usize,
    frame: Vec<u8>,
}

impl ChunkReassembler {
    pub fn new(max_chunk: u8, min_chunk: u8) -> Self {
        Self {
            record_id: 0,
            chunk_size: max_chunk,
            max_chunk,
            min_chunk,
            offset: 0,
            frame: Vec::new(),
        }
    }

    pub fn record_id(&self) -> u16 {
        self.record_id
    }

    pub fn chunk_size(&self) -> u8 {
        self.chunk_size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether the chunk size has been shrunk below the configured maximum.
    pub fn is_partial(&self) -> bool {
        self.chunk_size < self.max_chunk
    }

    /// Begin a new record; the current chunk size carries over.
    pub fn start(&mut self, record_id: u16) {
        self.record_id = record_id;
        self.restart();
    }

    fn restart(&mut self) {
        self.offset = 0;
        self.frame.clear();
    }

    /// Request for the chunk at the current offset.
    pub fn request(&self, reservation_id: u16) -> Result<Request, DecodeError> {
        let offset = u8::try_from(self.offset).map_err(|_| DecodeError::RecordTooLong(self.offset))?;
        let count = match self.remaining() {
            Some(remaining) => self.chunk_size.min(u8::try_from(remaining).unwrap_or(u8::MAX)),
            None => self.chunk_size,
        };
        Ok(Request::get_sdr(reservation_id, self.record_id, offset, count))
    }

    /// Record bytes still missing, once the header has arrived.
    fn remaining(&self) -> Option<usize> {
        let total = record::declared_frame_length(&self.frame)?;
        Some(total.saturating_sub(self.frame.len()))
    }

    /// Append a successful Get SDR payload (`[next lo, next hi, data..]`).
    pub fn on_success(&mut self, payload: &[u8], reservation_id: u16) -> Result<Progress, DecodeError> {
        if payload.len() < 2 {
            return Err(DecodeError::Truncated { len: payload.len(), needed: 2 });
        }
        let data = &payload[2..];

        if self.offset == 0 {
            self.frame.clear();
            self.frame.push(0x00);
            self.frame.extend_from_slice(&payload[..2]);
        } else {
            // next id is repeated on every chunk; keep the latest
            self.frame[1..FRAME_PREFIX].copy_from_slice(&payload[..2]);
        }
        self.frame.extend_from_slice(data);
        self.offset += data.len();

        match self.remaining() {
            Some(0) => {
                let total = FRAME_PREFIX + self.offset;
                let mut frame = std::mem::take(&mut self.frame);
                frame.truncate(total.min(frame.len()));
                self.restart();
                Ok(Progress::Complete(frame))
            }
            _ if data.is_empty() => Err(DecodeError::Truncated {
                len: self.frame.len(),
                needed: FRAME_PREFIX + RECORD_HEADER,
            }),
            _ => Ok(Progress::More(self.request(reservation_id)?)),
        }
    }

    /// Halve the chunk size after a size rejection and rewind the record.
    ///
    /// Returns the new size, or `None` once it would drop below the floor.
    pub fn on_size_error(&mut self) -> Option<u8> {
        let halved = self.chunk_size / 2;
        if halved < self.min_chunk {
            return None;
        }
        self.chunk_size = halved;
        self.restart();
        Some(halved)
    }

    /// Rewind the record without touching the chunk size.
    pub fn rewind(&mut self) {
        self.restart();
    }
}
