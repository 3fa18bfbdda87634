//! Bit-level reader for entropy-coded segments.

use crate::error::{JpegError, Result};

/// Reads bits MSB first from the entropy-coded bytes of one scan.
///
/// Handles:
/// - Byte stuffing (0xFF00 → 0xFF)
/// - Fill bytes (0xFF 0xFF) in front of a marker
/// - Markers: the reader stops in front of them without consuming them
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Position of the next unread byte in `data`.
    pos: usize,
    /// Stream offset of `data[0]`, used for diagnostics.
    base_offset: u64,
    bits: u32,
    num_bits: u8,
    /// Marker code the reader is parked in front of.
    marker: Option<u8>,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    /// Create a reader whose error offsets are relative to `base_offset`.
    pub fn with_offset(data: &'a [u8], base_offset: u64) -> Self {
        BitReader {
            data,
            pos: 0,
            base_offset,
            bits: 0,
            num_bits: 0,
            marker: None,
        }
    }

    /// Stream offset of the next unread byte.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    /// The marker the reader stopped at, if any.
    pub fn pending_marker(&self) -> Option<u8> {
        self.marker
    }

    /// Read a single bit.
    #[inline]
    pub fn next_bit(&mut self) -> Result<u8> {
        Ok(self.next_bits(1)? as u8)
    }

    /// Read `count` (at most 16) bits as a big-endian unsigned value.
    pub fn next_bits(&mut self, count: u8) -> Result<u16> {
        debug_assert!(count <= 16);
        if count == 0 {
            return Ok(0);
        }
        if self.num_bits < count {
            self.fill();
            if self.num_bits < count {
                return Err(self.exhausted());
            }
        }
        self.num_bits -= count;
        let value = (self.bits >> self.num_bits) & ((1u32 << count) - 1);
        self.bits &= (1u32 << self.num_bits) - 1;
        Ok(value as u16)
    }

    /// Read `size` bits and sign-extend them (ITU T.81 Figure F.12).
    pub fn receive_extend(&mut self, size: u8) -> Result<i16> {
        if size == 0 {
            return Ok(0);
        }
        let value = self.next_bits(size)? as i32;
        if value < 1 << (size - 1) {
            Ok((value - (1 << size) + 1) as i16)
        } else {
            Ok(value as i16)
        }
    }

    /// Drop all buffered bits, e.g. the 1-padding in front of a restart marker.
    pub fn reset(&mut self) {
        self.bits = 0;
        self.num_bits = 0;
    }

    /// Consume the restart marker the reader is parked at and return its
    /// number (0..=7).
    ///
    /// Buffered bits are discarded. Fails with `MarkerEncountered` if a
    /// different marker is pending and with `EndOfStream` if there is none.
    pub fn take_restart_marker(&mut self) -> Result<u8> {
        self.reset();
        let start = self.pos;
        while self.marker.is_none() && self.pos < self.data.len() {
            self.fill();
            self.reset();
        }
        if self.pos > start {
            log::warn!(
                "skipped {} bytes of entropy-coded data before restart marker at offset {}",
                self.pos - start,
                self.offset()
            );
        }
        match self.marker {
            Some(code @ 0xD0..=0xD7) => {
                self.marker = None;
                self.pos += 2;
                Ok(code - 0xD0)
            }
            _ => Err(self.exhausted()),
        }
    }

    fn exhausted(&self) -> JpegError {
        match self.marker {
            Some(marker) => JpegError::MarkerEncountered {
                marker,
                offset: self.offset(),
            },
            None => JpegError::EndOfStream {
                offset: self.offset(),
            },
        }
    }

    fn fill(&mut self) {
        while self.num_bits <= 24 && self.marker.is_none() && self.pos < self.data.len() {
            let byte = self.data[self.pos];
            if byte != 0xFF {
                self.push_byte(byte);
                self.pos += 1;
                continue;
            }
            match self.data.get(self.pos + 1) {
                Some(0x00) => {
                    self.push_byte(0xFF);
                    self.pos += 2;
                }
                // fill byte, the next 0xFF decides
                Some(0xFF) => self.pos += 1,
                Some(&code) => self.marker = Some(code),
                // a lone trailing 0xFF carries no data
                None => self.pos = self.data.len(),
            }
        }
    }

    #[inline]
    fn push_byte(&mut self, byte: u8) {
        self.bits = (self.bits << 8) | byte as u32;
        self.num_bits += 8;
    }
}
