//! Decodable state of a JPEG stream: frame geometry, tables and the
//! coefficient buffer the scans decode into.

use crate::error::{JpegError, Result, TableKind};
use crate::huffman::{parse_dht, HuffmanClass, HuffmanTable};
use crate::marker::Marker;
use crate::options::CoderOptions;
use crate::scanner::MarkerSegment;
use crate::tables::{parse_dqt, ComponentDescriptor, FrameHeader, QuantizationTable};
use crate::zigzag::to_natural_order;

/// Coefficients of one frame component.
///
/// Blocks are stored row by row over the MCU-padded block grid, 64 values per
/// block in zig-zag order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentCoefficients {
    pub component_id: u8,
    /// Padded block grid width.
    pub blocks_wide: usize,
    /// Padded block grid height.
    pub blocks_high: usize,
    /// Blocks per row covered by the component's samples.
    pub scan_blocks_wide: usize,
    /// Block rows covered by the component's samples.
    pub scan_blocks_high: usize,
    /// DC Huffman table the last scan of this component used.
    pub dc_table_id: Option<u8>,
    /// AC Huffman table the last scan of this component used.
    pub ac_table_id: Option<u8>,
    data: Vec<i16>,
}

impl ComponentCoefficients {
    pub(crate) fn new(frame: &FrameHeader, component: &ComponentDescriptor) -> Self {
        let (blocks_wide, blocks_high) = frame.padded_blocks(component);
        let (scan_blocks_wide, scan_blocks_high) = frame.covered_blocks(component);
        ComponentCoefficients {
            component_id: component.id,
            blocks_wide,
            blocks_high,
            scan_blocks_wide,
            scan_blocks_high,
            dc_table_id: None,
            ac_table_id: None,
            data: vec![0; blocks_wide * blocks_high * 64],
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks_wide * self.blocks_high
    }

    /// The 64 coefficients of the block at (`row`, `col`).
    #[inline]
    pub fn block(&self, row: usize, col: usize) -> &[i16] {
        let start = (row * self.blocks_wide + col) * 64;
        &self.data[start..start + 64]
    }

    #[inline]
    pub fn block_mut(&mut self, row: usize, col: usize) -> &mut [i16] {
        let start = (row * self.blocks_wide + col) * 64;
        &mut self.data[start..start + 64]
    }

    /// The block at (`row`, `col`) reordered to row-major 8x8 layout.
    pub fn natural_block(&self, row: usize, col: usize) -> [i16; 64] {
        to_natural_order(self.block(row, col))
    }

    /// All blocks in row-major order.
    pub fn blocks(&self) -> impl Iterator<Item = &[i16]> {
        self.data.chunks_exact(64)
    }

    pub fn data(&self) -> &[i16] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [i16] {
        &mut self.data
    }
}

/// One `ComponentCoefficients` per frame component, in frame order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientBuffer {
    components: Vec<ComponentCoefficients>,
}

impl CoefficientBuffer {
    fn allocate(frame: &FrameHeader) -> Self {
        CoefficientBuffer {
            components: frame
                .components
                .iter()
                .map(|c| ComponentCoefficients::new(frame, c))
                .collect(),
        }
    }

    pub fn components(&self) -> &[ComponentCoefficients] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [ComponentCoefficients] {
        &mut self.components
    }

    pub fn component(&self, id: u8) -> Option<&ComponentCoefficients> {
        self.components.iter().find(|c| c.component_id == id)
    }

    pub fn component_mut(&mut self, id: u8) -> Option<&mut ComponentCoefficients> {
        self.components.iter_mut().find(|c| c.component_id == id)
    }

    /// Number of blocks over all components.
    pub fn total_blocks(&self) -> usize {
        self.components.iter().map(ComponentCoefficients::block_count).sum()
    }
}

/// Quantization and Huffman table slots plus the restart interval.
///
/// A table segment for an id that is already set replaces that slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStore {
    pub quantization: [Option<QuantizationTable>; 4],
    pub dc_huffman: [Option<HuffmanTable>; 4],
    pub ac_huffman: [Option<HuffmanTable>; 4],
    /// MCUs between restart markers, 0 if disabled.
    pub restart_interval: u16,
}

impl TableStore {
    pub fn huffman(&self, class: HuffmanClass, id: u8) -> Option<&HuffmanTable> {
        let slots = match class {
            HuffmanClass::Dc => &self.dc_huffman,
            HuffmanClass::Ac => &self.ac_huffman,
        };
        slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Apply a table-defining segment. Frame headers are not handled here.
    fn observe(&mut self, segment: &MarkerSegment) -> Result<()> {
        match segment.marker {
            Marker::DQT => {
                for table in parse_dqt(segment.data(), segment.offset)? {
                    log::debug!("quantization table {} (precision {})", table.id, table.precision);
                    let id = table.id as usize;
                    self.quantization[id] = Some(table);
                }
            }
            Marker::DHT => {
                for table in parse_dht(segment.data(), segment.offset)? {
                    log::debug!("{} Huffman table {}", table.class, table.id);
                    let id = table.id as usize;
                    match table.class {
                        HuffmanClass::Dc => self.dc_huffman[id] = Some(table),
                        HuffmanClass::Ac => self.ac_huffman[id] = Some(table),
                    }
                }
            }
            Marker::DRI => {
                let data = segment.data();
                if data.len() != 2 {
                    return Err(JpegError::MalformedMarker {
                        marker: Some(segment.marker.to_u8()),
                        offset: segment.offset,
                        reason: format!("restart interval segment of {} bytes", data.len()),
                    });
                }
                self.restart_interval = u16::from_be_bytes([data[0], data[1]]);
                log::debug!("restart interval {}", self.restart_interval);
            }
            Marker::DNL => {
                log::debug!("ignoring DNL segment at offset {}", segment.offset);
            }
            other => {
                log::debug!("skipping {other} segment at offset {}", segment.offset);
            }
        }
        Ok(())
    }
}

/// Frozen decodable state of one JPEG stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    pub(crate) frame: FrameHeader,
    pub(crate) tables: TableStore,
    pub(crate) coefficients: CoefficientBuffer,
    pub(crate) scans_decoded: usize,
}

impl WorkingSet {
    pub fn frame(&self) -> &FrameHeader {
        &self.frame
    }

    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    pub fn restart_interval(&self) -> u16 {
        self.tables.restart_interval
    }

    pub fn coefficients(&self) -> &CoefficientBuffer {
        &self.coefficients
    }

    /// Mutable coefficient access, e.g. for embedding.
    pub fn coefficients_mut(&mut self) -> &mut CoefficientBuffer {
        &mut self.coefficients
    }

    /// Number of scans decoded successfully so far.
    pub fn scans_decoded(&self) -> usize {
        self.scans_decoded
    }

    /// Apply a segment found between scans. Tables may be redefined, a second
    /// frame header is an error.
    pub fn observe(&mut self, segment: &MarkerSegment) -> Result<()> {
        if let Marker::SOF(_) = segment.marker {
            return Err(second_frame(segment));
        }
        self.tables.observe(segment)
    }
}

/// Accumulates header segments until the working set is frozen.
#[derive(Debug, Default)]
pub struct WorkingSetBuilder {
    tables: TableStore,
    frame: Option<FrameHeader>,
    frozen: Option<WorkingSet>,
}

impl WorkingSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one header segment. Once frozen, segments go to the working set.
    pub fn observe(&mut self, segment: &MarkerSegment) -> Result<()> {
        if let Some(working_set) = self.frozen.as_mut() {
            return working_set.observe(segment);
        }

        match segment.marker {
            Marker::SOF(n) => {
                if self.frame.is_some() {
                    return Err(second_frame(segment));
                }
                let frame = FrameHeader::parse(n, segment.data(), segment.offset)?;
                log::debug!(
                    "frame {:?} {}x{} with {} components",
                    frame.process,
                    frame.width,
                    frame.height,
                    frame.components.len()
                );
                self.frame = Some(frame);
                Ok(())
            }
            _ => self.tables.observe(segment),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// The frame header seen so far.
    pub fn frame(&self) -> Option<&FrameHeader> {
        match &self.frozen {
            Some(working_set) => Some(&working_set.frame),
            None => self.frame.as_ref(),
        }
    }

    pub fn working_set(&self) -> Option<&WorkingSet> {
        self.frozen.as_ref()
    }

    pub fn working_set_mut(&mut self) -> Option<&mut WorkingSet> {
        self.frozen.as_mut()
    }

    /// Validate the observed headers and allocate the coefficient buffer.
    ///
    /// Freezing again returns the already frozen working set.
    pub fn freeze(&mut self, options: &CoderOptions) -> Result<&WorkingSet> {
        let working_set = match self.frozen.take() {
            Some(working_set) => working_set,
            None => self.build(options)?,
        };
        Ok(self.frozen.insert(working_set))
    }

    fn build(&mut self, options: &CoderOptions) -> Result<WorkingSet> {
        let frame = self.frame.as_ref().ok_or_else(|| JpegError::IncompleteHeader {
            reason: "no frame header (SOF) before the first scan".to_string(),
        })?;
        if frame.height == 0 {
            return Err(JpegError::IncompleteHeader {
                reason: "frame height 0 (defined by DNL) is not supported".to_string(),
            });
        }
        if frame.width == 0 {
            return Err(JpegError::IncompleteHeader {
                reason: "frame width is 0".to_string(),
            });
        }

        for component in &frame.components {
            if self.tables.quantization[component.quant_table_id as usize].is_none() {
                return Err(JpegError::UnknownTableReference {
                    kind: TableKind::Quantization,
                    id: component.quant_table_id,
                    component: component.id,
                });
            }
        }

        let blocks: usize = frame
            .components
            .iter()
            .map(|c| {
                let (wide, high) = frame.padded_blocks(c);
                wide * high
            })
            .sum();
        if blocks > options.max_blocks {
            return Err(JpegError::BufferLimitExceeded {
                blocks,
                limit: options.max_blocks,
            });
        }

        let coefficients = CoefficientBuffer::allocate(frame);
        log::debug!(
            "froze working set: {} MCUs x {} MCUs, {blocks} blocks",
            frame.mcus_x(),
            frame.mcus_y()
        );

        Ok(WorkingSet {
            frame: frame.clone(),
            tables: std::mem::take(&mut self.tables),
            coefficients,
            scans_decoded: 0,
        })
    }
}

fn second_frame(segment: &MarkerSegment) -> JpegError {
    JpegError::MalformedMarker {
        marker: Some(segment.marker.to_u8()),
        offset: segment.offset,
        reason: "second frame header".to_string(),
    }
}
