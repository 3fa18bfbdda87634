//! JPEG writer for re-encoding a working set.
//!
//! Serializes the tables and frame header of a frozen working set and
//! re-encodes its coefficients as a single interleaved baseline scan, e.g.
//! after coefficients were modified in place.

use crate::error::{JpegError, Result, TableKind};
use crate::huffman::{HuffmanClass, HuffmanEncoder};
use crate::marker::Marker;
use crate::scan::ScanLayout;
use crate::tables::{ScanComponent, ScanHeader};
use crate::working_set::WorkingSet;

/// Entropy-coded segment writer.
///
/// Bits collect left-aligned in a 64-bit register and leave it a byte at a
/// time once 32 are pending. Every 0xFF byte is followed by a stuffed zero.
#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    register: u64,
    pending: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BitWriter {
            out: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Append the low `count` bits of `value`, MSB first. `count` is at most 16.
    #[inline]
    pub fn write_bits(&mut self, value: u16, count: u8) {
        debug_assert!(count <= 16);
        if count == 0 {
            return;
        }

        let count = u32::from(count);
        let value = u64::from(value) & ((1 << count) - 1);
        self.register |= value << (64 - self.pending - count);
        self.pending += count;
        if self.pending >= 32 {
            self.drain();
        }
    }

    /// Write the Huffman code of `symbol`.
    #[inline]
    pub fn write_huffman(&mut self, symbol: u8, table: &HuffmanEncoder) -> Result<()> {
        let (code, len) = table.code(symbol).ok_or_else(|| JpegError::MalformedHuffmanTable {
            offset: self.len() as u64,
            reason: format!("symbol 0x{symbol:02X} has no code"),
        })?;
        self.write_bits(code, len);
        Ok(())
    }

    /// Pad to a byte boundary and write restart marker `RSTn`.
    pub fn write_restart(&mut self, n: u8) {
        self.flush();
        write_marker(&mut self.out, Marker::RST(n & 7));
    }

    /// Pad to a byte boundary with 1 bits.
    pub fn flush(&mut self) {
        let padding = (8 - self.pending % 8) % 8;
        self.write_bits((1 << padding) - 1, padding as u8);
        self.drain();
    }

    fn drain(&mut self) {
        while self.pending >= 8 {
            let byte = (self.register >> 56) as u8;
            self.register <<= 8;
            self.pending -= 8;
            self.out.push(byte);
            if byte == 0xFF {
                self.out.push(0x00);
            }
        }
    }

    /// The written bytes, padded to a byte boundary.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush();
        self.out
    }

    /// Bytes written so far, counting complete bytes still in the register.
    pub fn len(&self) -> usize {
        self.out.len() + (self.pending / 8) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty() && self.pending == 0
    }
}

/// Size category and additional bits of a coefficient or DC difference.
///
/// Negative values are stored as `value + 2^size - 1`. This is the inverse of
/// [`BitReader::receive_extend`](crate::BitReader::receive_extend).
#[inline]
pub fn encode_coefficient(value: i32) -> (u8, u16) {
    if value == 0 {
        return (0, 0);
    }

    let magnitude = value.unsigned_abs();
    let size = (32 - magnitude.leading_zeros()) as u8;
    let bits = if value < 0 {
        (1u32 << size) - 1 - magnitude
    } else {
        magnitude
    };
    (size, bits as u16)
}

pub fn write_marker(out: &mut Vec<u8>, marker: Marker) {
    out.push(0xFF);
    out.push(marker.to_u8());
}

/// Write a marker segment: marker, length field, payload.
pub fn write_segment(out: &mut Vec<u8>, marker: Marker, payload: &[u8]) -> Result<()> {
    let length = u16::try_from(payload.len() + 2).map_err(|_| JpegError::MalformedMarker {
        marker: Some(marker.to_u8()),
        offset: out.len() as u64,
        reason: format!("payload of {} bytes does not fit a segment", payload.len()),
    })?;
    write_marker(out, marker);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Re-encode a sequential working set as a baseline JPEG.
///
/// Emits SOI, DQT, SOF, DHT, DRI (if set), one interleaved scan over all
/// components and EOI. Each component is coded with the Huffman tables its
/// last scan used, table 0 if it was never scanned.
pub fn write_baseline_jpeg(working_set: &WorkingSet) -> Result<Vec<u8>> {
    let frame = working_set.frame();
    if frame.is_progressive() {
        return Err(JpegError::UnsupportedFrame {
            sof: frame.process.sof(),
        });
    }
    let tables = working_set.tables();
    let coefficients = working_set.coefficients().components();

    let scan = ScanHeader {
        components: coefficients
            .iter()
            .map(|c| ScanComponent {
                component_id: c.component_id,
                dc_table_id: c.dc_table_id.unwrap_or(0),
                ac_table_id: c.ac_table_id.unwrap_or(0),
            })
            .collect(),
        spectral_start: 0,
        spectral_end: 63,
        approx_high: 0,
        approx_low: 0,
    };

    let mut encoders = Vec::with_capacity(scan.components.len());
    for selector in &scan.components {
        let dc = tables
            .huffman(HuffmanClass::Dc, selector.dc_table_id)
            .ok_or(JpegError::UnknownTableReference {
                kind: TableKind::DcHuffman,
                id: selector.dc_table_id,
                component: selector.component_id,
            })?;
        let ac = tables
            .huffman(HuffmanClass::Ac, selector.ac_table_id)
            .ok_or(JpegError::UnknownTableReference {
                kind: TableKind::AcHuffman,
                id: selector.ac_table_id,
                component: selector.component_id,
            })?;
        encoders.push(ComponentEncoder {
            component_id: selector.component_id,
            dc: HuffmanEncoder::from_table(dc)?,
            ac: HuffmanEncoder::from_table(ac)?,
            predictor: 0,
            max_dc_size: if frame.precision > 8 { 15 } else { 11 },
        });
    }

    let mut out = Vec::new();
    write_marker(&mut out, Marker::SOI);

    let mut payload = Vec::new();
    for table in tables.quantization.iter().flatten() {
        table.encode(&mut payload);
    }
    write_segment(&mut out, Marker::DQT, &payload)?;

    payload.clear();
    frame.encode(&mut payload);
    write_segment(&mut out, Marker::SOF(frame.process.sof()), &payload)?;

    payload.clear();
    for table in tables.dc_huffman.iter().chain(tables.ac_huffman.iter()).flatten() {
        table.encode(&mut payload);
    }
    write_segment(&mut out, Marker::DHT, &payload)?;

    if tables.restart_interval > 0 {
        write_segment(&mut out, Marker::DRI, &tables.restart_interval.to_be_bytes())?;
    }

    payload.clear();
    scan.encode(&mut payload);
    write_segment(&mut out, Marker::SOS, &payload)?;

    let indices: Vec<usize> = (0..coefficients.len()).collect();
    let layout = ScanLayout::new(frame, &indices);
    let restart_interval = tables.restart_interval as usize;
    let mut writer = BitWriter::with_capacity(working_set.coefficients().total_blocks() * 16);
    let mut blocks = Vec::new();
    let mut restarts = 0u8;

    for mcu in 0..layout.mcu_count() {
        if restart_interval > 0 && mcu > 0 && mcu % restart_interval == 0 {
            writer.write_restart(restarts);
            restarts = restarts.wrapping_add(1);
            for encoder in &mut encoders {
                encoder.predictor = 0;
            }
        }

        layout.mcu_blocks(mcu, &mut blocks);
        for block_ref in &blocks {
            let component = &coefficients[block_ref.component];
            let index = block_ref.row * component.blocks_wide + block_ref.col;
            encoders[block_ref.component].encode(
                &mut writer,
                component.block(block_ref.row, block_ref.col),
                index,
            )?;
        }
    }

    let data = writer.into_bytes();
    log::debug!(
        "re-encoded {} MCUs into {} bytes of entropy-coded data",
        layout.mcu_count(),
        data.len()
    );
    out.extend_from_slice(&data);
    write_marker(&mut out, Marker::EOI);

    Ok(out)
}

const EOB: u8 = 0x00;
const ZRL: u8 = 0xF0;

/// Sequential entropy coder state of one scan component.
struct ComponentEncoder {
    component_id: u8,
    dc: HuffmanEncoder,
    ac: HuffmanEncoder,
    predictor: i32,
    /// Largest DC difference category, AC values stay one below it.
    max_dc_size: u8,
}

impl ComponentEncoder {
    /// Code one block in zig-zag order: DC difference, AC run/size pairs with
    /// ZRL for runs past 15, EOB unless the last coefficient is non-zero.
    fn encode(&mut self, writer: &mut BitWriter, block: &[i16], block_index: usize) -> Result<()> {
        let component = self.component_id;
        let unencodable = |index: usize, value: i32| JpegError::UnencodableCoefficient {
            component,
            block: block_index,
            index,
            value,
        };

        let diff = i32::from(block[0]) - self.predictor;
        let (size, bits) = encode_coefficient(diff);
        if size > self.max_dc_size {
            return Err(unencodable(0, diff));
        }
        self.predictor = i32::from(block[0]);
        writer.write_huffman(size, &self.dc)?;
        writer.write_bits(bits, size);

        let last = block[1..64]
            .iter()
            .rposition(|&value| value != 0)
            .map_or(0, |k| k + 1);
        let mut run = 0u8;
        for (k, &value) in block.iter().enumerate().take(last + 1).skip(1) {
            if value == 0 {
                run += 1;
                continue;
            }

            let (size, bits) = encode_coefficient(i32::from(value));
            if size >= self.max_dc_size {
                return Err(unencodable(k, i32::from(value)));
            }
            for _ in 0..run / 16 {
                writer.write_huffman(ZRL, &self.ac)?;
            }
            writer.write_huffman(((run % 16) << 4) | size, &self.ac)?;
            writer.write_bits(bits, size);
            run = 0;
        }

        if last < 63 {
            writer.write_huffman(EOB, &self.ac)?;
        }
        Ok(())
    }
}
