//! Header segment payloads: quantization tables (DQT), frame headers (SOF)
//! and scan headers (SOS).
//!
//! Each type parses from and encodes to the raw segment payload, i.e. the
//! bytes after the marker and the length field.

use crate::error::{JpegError, Result};
use crate::zigzag::{to_natural_order, NATURAL_TO_ZIGZAG};

/// A quantization table (8x8 = 64 values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationTable {
    /// Table id (0-3).
    pub id: u8,
    /// Precision: 0 = 8-bit, 1 = 16-bit.
    pub precision: u8,
    /// Table values in zig-zag order (as stored in JPEG).
    pub values: [u16; 64],
}

impl QuantizationTable {
    /// Get value at natural (row, col) position.
    #[inline]
    pub fn get_natural(&self, row: usize, col: usize) -> u16 {
        self.values[NATURAL_TO_ZIGZAG[row * 8 + col]]
    }

    /// Append the DQT payload of this table.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push((self.precision << 4) | self.id);
        for &value in &self.values {
            if self.precision == 0 {
                out.push(value as u8);
            } else {
                out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }

    /// The table as eight rows of eight, in natural order.
    pub fn natural_rows(&self) -> [[u16; 8]; 8] {
        let natural = to_natural_order(&self.values);
        let mut rows = [[0; 8]; 8];
        for (row, values) in rows.iter_mut().zip(natural.chunks_exact(8)) {
            row.copy_from_slice(values);
        }
        rows
    }
}

/// Parse all tables of a DQT segment payload.
pub fn parse_dqt(data: &[u8], offset: u64) -> Result<Vec<QuantizationTable>> {
    let malformed = |reason: String| JpegError::MalformedMarker {
        marker: Some(0xDB),
        offset,
        reason,
    };

    let mut tables = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let precision = data[pos] >> 4;
        let id = data[pos] & 0x0F;
        pos += 1;

        if precision > 1 {
            return Err(malformed(format!("invalid quantization table precision {precision}")));
        }
        if id > 3 {
            return Err(malformed(format!("invalid quantization table id {id}")));
        }

        let width = precision as usize + 1;
        if pos + 64 * width > data.len() {
            return Err(malformed(format!("segment too short for quantization table {id}")));
        }

        let mut values = [0u16; 64];
        for value in values.iter_mut() {
            *value = if precision == 0 {
                data[pos] as u16
            } else {
                u16::from_be_bytes([data[pos], data[pos + 1]])
            };
            pos += width;
        }
        if values.contains(&0) {
            log::warn!("quantization table {id} contains a zero entry");
        }

        tables.push(QuantizationTable {
            id,
            precision,
            values,
        });
    }

    Ok(tables)
}

/// Coding process announced by the SOF marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodingProcess {
    /// SOF0
    Baseline,
    /// SOF1
    ExtendedSequential,
    /// SOF2
    Progressive,
}

impl CodingProcess {
    /// Map a SOF marker number to its coding process; arithmetic, lossless
    /// and hierarchical processes are not supported.
    pub fn from_sof(sof: u8) -> Result<Self> {
        match sof {
            0 => Ok(CodingProcess::Baseline),
            1 => Ok(CodingProcess::ExtendedSequential),
            2 => Ok(CodingProcess::Progressive),
            _ => Err(JpegError::UnsupportedFrame { sof }),
        }
    }

    pub fn sof(self) -> u8 {
        match self {
            CodingProcess::Baseline => 0,
            CodingProcess::ExtendedSequential => 1,
            CodingProcess::Progressive => 2,
        }
    }
}

/// A frame component as declared in the SOF segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub id: u8,
    /// Horizontal sampling factor (1-4).
    pub h_sampling: u8,
    /// Vertical sampling factor (1-4).
    pub v_sampling: u8,
    pub quant_table_id: u8,
}

/// Frame information from the SOF segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub process: CodingProcess,
    /// Sample precision in bits (8 or 12).
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<ComponentDescriptor>,
}

impl FrameHeader {
    /// Parse the payload of a SOF`sof` segment.
    pub fn parse(sof: u8, data: &[u8], offset: u64) -> Result<Self> {
        let process = CodingProcess::from_sof(sof)?;
        let malformed = |reason: String| JpegError::MalformedMarker {
            marker: Some(0xC0 + sof),
            offset,
            reason,
        };

        if data.len() < 6 {
            return Err(malformed("frame header too short".to_string()));
        }

        let precision = data[0];
        let height = u16::from_be_bytes([data[1], data[2]]);
        let width = u16::from_be_bytes([data[3], data[4]]);
        let count = data[5] as usize;

        let precision_ok = match process {
            CodingProcess::Baseline => precision == 8,
            _ => precision == 8 || precision == 12,
        };
        if !precision_ok {
            return Err(malformed(format!(
                "sample precision {precision} not allowed for {process:?}"
            )));
        }
        if count == 0 || count > 4 {
            return Err(malformed(format!("unsupported component count {count}")));
        }
        if data.len() != 6 + 3 * count {
            return Err(malformed(format!(
                "frame header of {} bytes does not match {count} components",
                data.len()
            )));
        }

        let mut components: Vec<ComponentDescriptor> = Vec::with_capacity(count);
        for entry in data[6..].chunks_exact(3) {
            let component = ComponentDescriptor {
                id: entry[0],
                h_sampling: entry[1] >> 4,
                v_sampling: entry[1] & 0x0F,
                quant_table_id: entry[2],
            };
            let sampling = 1..=4;
            if !sampling.contains(&component.h_sampling)
                || !sampling.contains(&component.v_sampling)
            {
                return Err(malformed(format!(
                    "invalid sampling factors {}x{} for component {}",
                    component.h_sampling, component.v_sampling, component.id
                )));
            }
            if component.quant_table_id > 3 {
                return Err(malformed(format!(
                    "invalid quantization table id {} for component {}",
                    component.quant_table_id, component.id
                )));
            }
            if components.iter().any(|c| c.id == component.id) {
                return Err(malformed(format!("duplicate component id {}", component.id)));
            }
            components.push(component);
        }

        Ok(FrameHeader {
            process,
            precision,
            height,
            width,
            components,
        })
    }

    /// Append the SOF payload of this frame.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.precision);
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.push(self.components.len() as u8);
        for c in &self.components {
            out.push(c.id);
            out.push((c.h_sampling << 4) | c.v_sampling);
            out.push(c.quant_table_id);
        }
    }

    pub fn is_progressive(&self) -> bool {
        self.process == CodingProcess::Progressive
    }

    /// Position of the component with the given id.
    pub fn component_index(&self, id: u8) -> Option<usize> {
        self.components.iter().position(|c| c.id == id)
    }

    pub fn max_h_sampling(&self) -> usize {
        self.components.iter().map(|c| c.h_sampling as usize).max().unwrap_or(1)
    }

    pub fn max_v_sampling(&self) -> usize {
        self.components.iter().map(|c| c.v_sampling as usize).max().unwrap_or(1)
    }

    /// Number of MCU columns of an interleaved scan.
    pub fn mcus_x(&self) -> usize {
        ceil_div(self.width as usize, 8 * self.max_h_sampling())
    }

    /// Number of MCU rows of an interleaved scan.
    pub fn mcus_y(&self) -> usize {
        ceil_div(self.height as usize, 8 * self.max_v_sampling())
    }

    /// Block grid (columns, rows) of a component padded to whole MCUs.
    pub fn padded_blocks(&self, component: &ComponentDescriptor) -> (usize, usize) {
        (
            self.mcus_x() * component.h_sampling as usize,
            self.mcus_y() * component.v_sampling as usize,
        )
    }

    /// Block grid (columns, rows) covered by the component's samples; this is
    /// what a single-component scan walks.
    pub fn covered_blocks(&self, component: &ComponentDescriptor) -> (usize, usize) {
        let samples_x = ceil_div(
            self.width as usize * component.h_sampling as usize,
            self.max_h_sampling(),
        );
        let samples_y = ceil_div(
            self.height as usize * component.v_sampling as usize,
            self.max_v_sampling(),
        );
        (ceil_div(samples_x, 8), ceil_div(samples_y, 8))
    }
}

/// A scan component selector with its entropy table bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    pub component_id: u8,
    pub dc_table_id: u8,
    pub ac_table_id: u8,
}

/// Scan information from the SOS segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    pub components: Vec<ScanComponent>,
    /// Spectral selection start (Ss).
    pub spectral_start: u8,
    /// Spectral selection end (Se).
    pub spectral_end: u8,
    /// Successive approximation bit position high (Ah).
    pub approx_high: u8,
    /// Successive approximation bit position low (Al).
    pub approx_low: u8,
}

impl ScanHeader {
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        let malformed = |reason: String| JpegError::MalformedMarker {
            marker: Some(0xDA),
            offset,
            reason,
        };

        let count = *data
            .first()
            .ok_or_else(|| malformed("scan header empty".to_string()))? as usize;
        if count == 0 || count > 4 {
            return Err(malformed(format!("invalid scan component count {count}")));
        }
        if data.len() != 1 + 2 * count + 3 {
            return Err(malformed(format!(
                "scan header of {} bytes does not match {count} components",
                data.len()
            )));
        }

        let mut components: Vec<ScanComponent> = Vec::with_capacity(count);
        for selector in data[1..1 + 2 * count].chunks_exact(2) {
            let component = ScanComponent {
                component_id: selector[0],
                dc_table_id: selector[1] >> 4,
                ac_table_id: selector[1] & 0x0F,
            };
            if component.dc_table_id > 3 || component.ac_table_id > 3 {
                return Err(malformed(format!(
                    "invalid Huffman table selectors for component {}",
                    component.component_id
                )));
            }
            if components.iter().any(|c| c.component_id == component.component_id) {
                return Err(malformed(format!(
                    "component {} selected twice",
                    component.component_id
                )));
            }
            components.push(component);
        }

        let tail = &data[1 + 2 * count..];
        Ok(ScanHeader {
            components,
            spectral_start: tail[0],
            spectral_end: tail[1],
            approx_high: tail[2] >> 4,
            approx_low: tail[2] & 0x0F,
        })
    }

    /// Append the SOS payload of this scan.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.components.len() as u8);
        for c in &self.components {
            out.push(c.component_id);
            out.push((c.dc_table_id << 4) | c.ac_table_id);
        }
        out.push(self.spectral_start);
        out.push(self.spectral_end);
        out.push((self.approx_high << 4) | self.approx_low);
    }

    /// Number of coefficients per block this scan covers.
    pub fn spectral_width(&self) -> usize {
        (self.spectral_end as usize + 1).saturating_sub(self.spectral_start as usize)
    }
}

#[inline]
pub(crate) fn ceil_div(value: usize, divisor: usize) -> usize {
    (value + divisor - 1) / divisor
}
