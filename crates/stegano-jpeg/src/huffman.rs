//! Huffman tables for JPEG entropy coding.
//!
//! Tables are built from DHT segments with the canonical code assignment of
//! ITU T.81 Annex C and decoded bit by bit with the DECODE procedure of
//! Figure F.16.

use std::fmt;

use crate::bit_reader::BitReader;
use crate::error::{JpegError, Result};

/// Table class as stored in the high nibble of the DHT `Tc/Th` byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HuffmanClass {
    Dc = 0,
    Ac = 1,
}

impl fmt::Display for HuffmanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HuffmanClass::Dc => write!(f, "DC"),
            HuffmanClass::Ac => write!(f, "AC"),
        }
    }
}

/// A Huffman table with its derived decode tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    pub class: HuffmanClass,
    /// Table id (0-3).
    pub id: u8,
    /// Number of codes of each length 1..=16.
    pub code_lengths: [u8; 16],
    /// Symbols in code order.
    pub values: Vec<u8>,
    /// Largest code of each length, -1 if there is none. Index 0 is unused.
    maxcode: [i32; 17],
    /// Smallest code of each length.
    mincode: [u16; 17],
    /// Index into `values` of the first symbol of each length.
    valptr: [usize; 17],
}

impl HuffmanTable {
    /// Build a table from its code length counts and symbols.
    pub fn new(
        class: HuffmanClass,
        id: u8,
        code_lengths: [u8; 16],
        values: Vec<u8>,
    ) -> Result<Self> {
        let total: usize = code_lengths.iter().map(|&n| n as usize).sum();
        if total > 256 {
            return Err(invalid_table(format!(
                "{class} table {id} declares {total} symbols, at most 256 are allowed"
            )));
        }
        if total != values.len() {
            return Err(invalid_table(format!(
                "{class} table {id} declares {total} symbols but lists {}",
                values.len()
            )));
        }
        if id > 3 {
            return Err(invalid_table(format!("{class} table id {id} out of range")));
        }

        let codes = canonical_codes(&code_lengths)?;

        let mut maxcode = [-1i32; 17];
        let mut mincode = [0u16; 17];
        let mut valptr = [0usize; 17];
        let mut index = 0;
        for len in 1..=16 {
            let count = code_lengths[len - 1] as usize;
            if count == 0 {
                continue;
            }
            valptr[len] = index;
            mincode[len] = codes[index].0;
            maxcode[len] = codes[index + count - 1].0 as i32;
            index += count;
        }

        Ok(HuffmanTable {
            class,
            id,
            code_lengths,
            values,
            maxcode,
            mincode,
            valptr,
        })
    }

    /// True if the table declares no codes at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decode one symbol, reading one bit at a time.
    pub fn decode_symbol(&self, reader: &mut BitReader) -> Result<u8> {
        if self.is_empty() {
            return Err(JpegError::MalformedHuffmanTable {
                offset: reader.offset(),
                reason: format!("{} table {} has no codes", self.class, self.id),
            });
        }

        let mut code = 0i32;
        for len in 1..=16 {
            let bit = reader.next_bit().map_err(|e| JpegError::MalformedHuffmanTable {
                offset: reader.offset(),
                reason: format!(
                    "bit stream exhausted inside a code of {} table {}: {e}",
                    self.class, self.id
                ),
            })?;
            code = (code << 1) | bit as i32;
            if code <= self.maxcode[len] {
                let index = self.valptr[len] + (code - self.mincode[len] as i32) as usize;
                return Ok(self.values[index]);
            }
        }

        Err(JpegError::MalformedHuffmanTable {
            offset: reader.offset(),
            reason: format!("no code of {} table {} matches the next 16 bits", self.class, self.id),
        })
    }

    /// Append the DHT payload of this table (`Tc/Th`, counts, symbols).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(((self.class as u8) << 4) | self.id);
        out.extend_from_slice(&self.code_lengths);
        out.extend_from_slice(&self.values);
    }
}

/// Parse all tables of a DHT segment payload.
pub fn parse_dht(data: &[u8], offset: u64) -> Result<Vec<HuffmanTable>> {
    let malformed = |reason: String| JpegError::MalformedMarker {
        marker: Some(0xC4),
        offset,
        reason,
    };

    let mut tables = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let tc_th = data[pos];
        pos += 1;
        let class = match tc_th >> 4 {
            0 => HuffmanClass::Dc,
            1 => HuffmanClass::Ac,
            other => return Err(malformed(format!("invalid Huffman table class {other}"))),
        };
        let id = tc_th & 0x0F;
        if id > 3 {
            return Err(malformed(format!("invalid Huffman table id {id}")));
        }

        if pos + 16 > data.len() {
            return Err(malformed("segment too short for code lengths".to_string()));
        }
        let mut code_lengths = [0u8; 16];
        code_lengths.copy_from_slice(&data[pos..pos + 16]);
        pos += 16;

        let total: usize = code_lengths.iter().map(|&n| n as usize).sum();
        if pos + total > data.len() {
            return Err(malformed(format!(
                "segment too short for {total} symbols of {class} table {id}"
            )));
        }
        let values = data[pos..pos + total].to_vec();
        pos += total;

        let table = HuffmanTable::new(class, id, code_lengths, values).map_err(|e| match e {
            JpegError::MalformedHuffmanTable { reason, .. } => malformed(reason),
            other => other,
        })?;
        log::trace!("parsed {class} Huffman table {id} with {total} symbols");
        tables.push(table);
    }

    Ok(tables)
}

/// Compiled table for encoding: symbol → (code, length).
#[derive(Debug, Clone)]
pub struct HuffmanEncoder {
    codes: [Option<(u16, u8)>; 256],
}

impl HuffmanEncoder {
    pub fn from_table(table: &HuffmanTable) -> Result<Self> {
        let mut codes = [None; 256];
        for (&symbol, code) in table.values.iter().zip(canonical_codes(&table.code_lengths)?) {
            codes[symbol as usize] = Some(code);
        }
        Ok(HuffmanEncoder { codes })
    }

    #[inline]
    pub fn code(&self, symbol: u8) -> Option<(u16, u8)> {
        self.codes[symbol as usize]
    }
}

/// Assign canonical codes in ascending length order (ITU T.81 Figures C.1, C.2).
///
/// Returns `(code, length)` per symbol. No code may consist of all 1 bits.
fn canonical_codes(code_lengths: &[u8; 16]) -> Result<Vec<(u16, u8)>> {
    let mut codes = Vec::new();
    let mut code: u32 = 0;
    for (i, &count) in code_lengths.iter().enumerate() {
        let len = i as u8 + 1;
        for _ in 0..count {
            codes.push((code as u16, len));
            code += 1;
        }
        if count > 0 && code >= 1 << len {
            return Err(invalid_table(format!(
                "code lengths over-subscribe the code space at length {len}"
            )));
        }
        code <<= 1;
    }
    Ok(codes)
}

fn invalid_table(reason: String) -> JpegError {
    JpegError::MalformedHuffmanTable { offset: 0, reason }
}
