//! Scan decoding.
//!
//! Decodes the entropy-coded data of one scan into the coefficient buffer of
//! a frozen working set, without dequantization or IDCT.
//!
//! # Module Structure
//!
//! - `baseline` - Sequential (SOF0/SOF1) block decoding
//! - `progressive` - Spectral selection and successive approximation (SOF2)

mod baseline;
mod progressive;

use std::ops::RangeInclusive;

use crate::bit_reader::BitReader;
use crate::error::{JpegError, Result, TableKind};
use crate::huffman::{HuffmanClass, HuffmanTable};
use crate::options::CoderOptions;
use crate::tables::{FrameHeader, ScanHeader};
use crate::working_set::{ComponentCoefficients, TableStore, WorkingSet};

/// Summary of one decoded scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Position of the scan among the successfully decoded scans.
    pub index: usize,
    pub component_ids: Vec<u8>,
    pub spectral_start: u8,
    pub spectral_end: u8,
    pub approx_high: u8,
    pub approx_low: u8,
    /// Blocks visited, including blocks skipped by end-of-band runs.
    pub blocks_decoded: usize,
    /// Coefficients whose value the scan changed.
    pub coefficients_touched: usize,
    /// Stream offset of the SOS marker.
    pub offset: u64,
}

/// A block addressed by a scan: position of the component in the scan and
/// the block's row and column in the component's grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockRef {
    pub component: usize,
    pub row: usize,
    pub col: usize,
}

/// MCU geometry of one scan.
#[derive(Debug, Clone)]
pub(crate) struct ScanLayout {
    /// (h, v) sampling per scan component, (1, 1) for non-interleaved scans.
    sampling: Vec<(usize, usize)>,
    mcus_x: usize,
    mcus_y: usize,
}

impl ScanLayout {
    /// Layout of a scan over the frame components at `indices`.
    pub fn new(frame: &FrameHeader, indices: &[usize]) -> Self {
        if let [index] = indices {
            let (mcus_x, mcus_y) = frame.covered_blocks(&frame.components[*index]);
            ScanLayout {
                sampling: vec![(1, 1)],
                mcus_x,
                mcus_y,
            }
        } else {
            ScanLayout {
                sampling: indices
                    .iter()
                    .map(|&i| {
                        let c = &frame.components[i];
                        (c.h_sampling as usize, c.v_sampling as usize)
                    })
                    .collect(),
                mcus_x: frame.mcus_x(),
                mcus_y: frame.mcus_y(),
            }
        }
    }

    pub fn mcu_count(&self) -> usize {
        self.mcus_x * self.mcus_y
    }

    /// Blocks of MCU number `mcu`, in coding order.
    pub fn mcu_blocks(&self, mcu: usize, out: &mut Vec<BlockRef>) {
        out.clear();
        let mcu_row = mcu / self.mcus_x;
        let mcu_col = mcu % self.mcus_x;
        for (component, &(h, v)) in self.sampling.iter().enumerate() {
            for y in 0..v {
                for x in 0..h {
                    out.push(BlockRef {
                        component,
                        row: mcu_row * v + y,
                        col: mcu_col * h + x,
                    });
                }
            }
        }
    }
}

/// Which of the four progressive procedures (or the sequential one) a scan uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanKind {
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

/// Per-scan decoder state that restart markers reset.
#[derive(Debug, Default)]
pub(crate) struct DecoderState {
    pub predictors: [i32; 4],
    pub eob_run: u32,
}

impl DecoderState {
    fn reset(&mut self) {
        self.predictors = [0; 4];
        self.eob_run = 0;
    }
}

/// Decode one scan into `working_set`.
///
/// `data` holds the entropy-coded bytes starting at stream offset
/// `data_offset`. On failure the scan's components are restored when
/// `options.rollback_failed_scans` is set.
pub fn decode_scan(
    working_set: &mut WorkingSet,
    header: &ScanHeader,
    data: &[u8],
    data_offset: u64,
    sos_offset: u64,
    options: &CoderOptions,
) -> Result<ScanResult> {
    let WorkingSet {
        frame,
        tables,
        coefficients,
        scans_decoded,
    } = working_set;

    let indices = resolve_components(frame, header, sos_offset)?;
    let kind = scan_kind(frame, header, sos_offset)?;

    let needs_dc = matches!(kind, ScanKind::Sequential | ScanKind::DcFirst);
    let needs_ac = header.spectral_end > 0;
    let mut dc_tables: Vec<Option<&HuffmanTable>> = Vec::with_capacity(indices.len());
    let mut ac_tables: Vec<Option<&HuffmanTable>> = Vec::with_capacity(indices.len());
    for selector in &header.components {
        let dc = if needs_dc {
            Some(lookup(tables, HuffmanClass::Dc, selector.dc_table_id, selector.component_id)?)
        } else {
            None
        };
        let ac = if needs_ac {
            Some(lookup(tables, HuffmanClass::Ac, selector.ac_table_id, selector.component_id)?)
        } else {
            None
        };
        dc_tables.push(dc);
        ac_tables.push(ac);
    }

    let band = header.spectral_start as usize..=header.spectral_end as usize;
    let snapshot: Vec<Vec<i16>> = if options.rollback_failed_scans {
        indices
            .iter()
            .map(|&i| save_band(&coefficients.components()[i], &band))
            .collect()
    } else {
        Vec::new()
    };

    let job = ScanJob {
        kind,
        header,
        indices: &indices,
        dc_tables,
        ac_tables,
        layout: ScanLayout::new(frame, &indices),
        restart_interval: tables.restart_interval as usize,
    };
    let components = coefficients.components_mut();
    let mut reader = BitReader::with_offset(data, data_offset);

    let (blocks_decoded, touched) = match job.run(&mut reader, components, options) {
        Ok(counts) => counts,
        Err(e) => {
            if options.rollback_failed_scans {
                for (&i, saved) in indices.iter().zip(&snapshot) {
                    restore_band(&mut components[i], &band, saved);
                }
                log::debug!("rolled back {} components after failed scan", indices.len());
            }
            return Err(e);
        }
    };

    for (n, &i) in indices.iter().enumerate() {
        if needs_dc {
            components[i].dc_table_id = Some(header.components[n].dc_table_id);
        }
        if needs_ac {
            components[i].ac_table_id = Some(header.components[n].ac_table_id);
        }
    }

    let result = ScanResult {
        index: *scans_decoded,
        component_ids: header.components.iter().map(|c| c.component_id).collect(),
        spectral_start: header.spectral_start,
        spectral_end: header.spectral_end,
        approx_high: header.approx_high,
        approx_low: header.approx_low,
        blocks_decoded,
        coefficients_touched: touched,
        offset: sos_offset,
    };
    *scans_decoded += 1;

    log::debug!(
        "scan {} ({kind:?}) components {:?} Ss={} Se={} Ah={} Al={}: {} blocks, {} coefficients",
        result.index,
        result.component_ids,
        result.spectral_start,
        result.spectral_end,
        result.approx_high,
        result.approx_low,
        result.blocks_decoded,
        result.coefficients_touched
    );

    Ok(result)
}

/// Everything needed to walk the MCUs of one validated scan.
struct ScanJob<'a> {
    kind: ScanKind,
    header: &'a ScanHeader,
    /// Frame component index per scan component.
    indices: &'a [usize],
    dc_tables: Vec<Option<&'a HuffmanTable>>,
    ac_tables: Vec<Option<&'a HuffmanTable>>,
    layout: ScanLayout,
    restart_interval: usize,
}

impl ScanJob<'_> {
    /// Decode all MCUs, returning the number of blocks visited and the number
    /// of coefficients changed.
    fn run(
        &self,
        reader: &mut BitReader,
        components: &mut [ComponentCoefficients],
        options: &CoderOptions,
    ) -> Result<(usize, usize)> {
        let mut state = DecoderState::default();
        let mut blocks = Vec::new();
        let mut blocks_decoded = 0;
        let mut touched = 0;
        let mut expected_restart = 0u8;

        for mcu in 0..self.layout.mcu_count() {
            if self.restart_interval > 0 && mcu > 0 && mcu % self.restart_interval == 0 {
                expected_restart = take_restart(reader, expected_restart, options)?;
                state.reset();
            }

            self.layout.mcu_blocks(mcu, &mut blocks);
            for block_ref in &blocks {
                let n = block_ref.component;
                let block = components[self.indices[n]].block_mut(block_ref.row, block_ref.col);
                touched += self
                    .decode_block(reader, block, n, &mut state)
                    .map_err(JpegError::in_entropy_data)?;
                blocks_decoded += 1;
            }
        }

        Ok((blocks_decoded, touched))
    }

    fn decode_block(
        &self,
        reader: &mut BitReader,
        block: &mut [i16],
        n: usize,
        state: &mut DecoderState,
    ) -> Result<usize> {
        let header = self.header;
        match self.kind {
            ScanKind::Sequential => baseline::decode_block(
                reader,
                block,
                self.dc_tables[n],
                self.ac_tables[n],
                &mut state.predictors[n],
            ),
            ScanKind::DcFirst => progressive::decode_dc_first(
                reader,
                block,
                self.dc_tables[n],
                &mut state.predictors[n],
                header.approx_low,
            ),
            ScanKind::DcRefine => progressive::decode_dc_refine(reader, block, header.approx_low),
            ScanKind::AcFirst => progressive::decode_ac_first(
                reader,
                block,
                self.ac_tables[n],
                header,
                &mut state.eob_run,
            ),
            ScanKind::AcRefine => progressive::decode_ac_refine(
                reader,
                block,
                self.ac_tables[n],
                header,
                &mut state.eob_run,
            ),
        }
    }
}

/// Consume the restart marker due after a restart interval and return the
/// number of the next one.
fn take_restart(reader: &mut BitReader, expected: u8, options: &CoderOptions) -> Result<u8> {
    let number = reader.take_restart_marker().map_err(|e| match e {
        JpegError::MarkerEncountered { marker, offset } => JpegError::MalformedMarker {
            marker: Some(marker),
            offset,
            reason: format!("expected restart marker RST{expected}"),
        },
        JpegError::EndOfStream { offset } => JpegError::MalformedMarker {
            marker: None,
            offset,
            reason: format!("entropy-coded data ends where RST{expected} is due"),
        },
        other => other,
    })?;

    if number != expected {
        if options.strict_restart_markers {
            return Err(JpegError::MalformedMarker {
                marker: Some(0xD0 + number),
                offset: reader.offset().saturating_sub(2),
                reason: format!("expected RST{expected}"),
            });
        }
        log::warn!("found RST{number} where RST{expected} was expected");
    }
    Ok((number + 1) & 7)
}

/// Copy coefficients `band` of every block, the only ones a scan writes.
fn save_band(component: &ComponentCoefficients, band: &RangeInclusive<usize>) -> Vec<i16> {
    component
        .data()
        .chunks_exact(64)
        .flat_map(|block| block[band.clone()].iter().copied())
        .collect()
}

fn restore_band(
    component: &mut ComponentCoefficients,
    band: &RangeInclusive<usize>,
    saved: &[i16],
) {
    let width = band.end() - band.start() + 1;
    let blocks = component.data_mut().chunks_exact_mut(64);
    for (block, saved) in blocks.zip(saved.chunks_exact(width)) {
        block[band.clone()].copy_from_slice(saved);
    }
}

fn lookup<'t>(
    tables: &'t TableStore,
    class: HuffmanClass,
    id: u8,
    component: u8,
) -> Result<&'t HuffmanTable> {
    tables
        .huffman(class, id)
        .ok_or(JpegError::UnknownTableReference {
            kind: match class {
                HuffmanClass::Dc => TableKind::DcHuffman,
                HuffmanClass::Ac => TableKind::AcHuffman,
            },
            id,
            component,
        })
}

/// Map scan components to frame component indices.
fn resolve_components(frame: &FrameHeader, header: &ScanHeader, offset: u64) -> Result<Vec<usize>> {
    let indices = header
        .components
        .iter()
        .map(|selector| {
            frame.component_index(selector.component_id).ok_or_else(|| {
                malformed_scan(
                    offset,
                    format!("component {} is not part of the frame", selector.component_id),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if indices.windows(2).any(|w| w[0] >= w[1]) {
        return Err(malformed_scan(offset, "scan components are not in frame order".to_string()));
    }

    if indices.len() > 1 {
        let blocks_per_mcu: usize = indices
            .iter()
            .map(|&i| {
                let c = &frame.components[i];
                c.h_sampling as usize * c.v_sampling as usize
            })
            .sum();
        if blocks_per_mcu > 10 {
            return Err(malformed_scan(
                offset,
                format!("interleaved MCU of {blocks_per_mcu} blocks exceeds 10"),
            ));
        }
    }

    Ok(indices)
}

/// Check the spectral selection and successive approximation parameters
/// against the coding process.
fn scan_kind(frame: &FrameHeader, header: &ScanHeader, offset: u64) -> Result<ScanKind> {
    let (ss, se, ah, al) = (
        header.spectral_start,
        header.spectral_end,
        header.approx_high,
        header.approx_low,
    );

    if !frame.is_progressive() {
        if ss != 0 || se != 63 || ah != 0 || al != 0 {
            return Err(malformed_scan(
                offset,
                format!("sequential scan with Ss={ss} Se={se} Ah={ah} Al={al}"),
            ));
        }
        return Ok(ScanKind::Sequential);
    }

    if se > 63 || ss > se {
        return Err(malformed_scan(offset, format!("invalid spectral selection {ss}..={se}")));
    }
    if ss == 0 && se != 0 {
        return Err(malformed_scan(
            offset,
            "progressive DC scan must not include AC coefficients".to_string(),
        ));
    }
    if ss > 0 && header.components.len() != 1 {
        return Err(malformed_scan(
            offset,
            "progressive AC scan must contain exactly one component".to_string(),
        ));
    }
    if al > 13 {
        return Err(malformed_scan(offset, format!("successive approximation Al={al} exceeds 13")));
    }
    if ah != 0 && ah != al + 1 {
        return Err(malformed_scan(
            offset,
            format!("successive approximation Ah={ah} does not follow Al={al}"),
        ));
    }

    Ok(match (ss == 0, ah == 0) {
        (true, true) => ScanKind::DcFirst,
        (true, false) => ScanKind::DcRefine,
        (false, true) => ScanKind::AcFirst,
        (false, false) => ScanKind::AcRefine,
    })
}

fn malformed_scan(offset: u64, reason: String) -> JpegError {
    JpegError::MalformedMarker {
        marker: Some(0xDA),
        offset,
        reason,
    }
}

/// Fail with a Huffman data error when a required table is absent.
pub(crate) fn required<'t>(
    table: Option<&'t HuffmanTable>,
    reader: &BitReader,
) -> Result<&'t HuffmanTable> {
    table.ok_or_else(|| JpegError::MalformedHuffmanTable {
        offset: reader.offset(),
        reason: "no Huffman table bound for this scan".to_string(),
    })
}
