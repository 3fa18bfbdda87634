//! Synthetic JPEG streams with known coefficients.
//!
//! The encoder here is independent of the crate's writer: it produces
//! sequential and progressive scans (spectral selection, successive
//! approximation, end-of-band runs, restart intervals) so decoded buffers
//! can be compared against the coefficients that went in.
#![allow(dead_code)]

use stegano_jpeg::writer::write_marker;
use stegano_jpeg::{
    encode_coefficient, write_segment, BitWriter, CodingProcess, ComponentDescriptor, FrameHeader,
    HuffmanClass, HuffmanEncoder, HuffmanTable, Marker, QuantizationTable, ScanComponent,
    ScanHeader, WorkingSet,
};

pub const SEED: u64 = 0x5EED_F00D;

/// A table that codes every symbol: 254 codes of 8 bits and 2 of 9 bits.
pub fn flat_table(class: HuffmanClass) -> HuffmanTable {
    let mut lengths = [0u8; 16];
    lengths[7] = 254;
    lengths[8] = 2;
    HuffmanTable::new(class, 0, lengths, (0..=255).collect()).unwrap()
}

pub fn frame(
    process: CodingProcess,
    width: u16,
    height: u16,
    sampling: &[(u8, u8)],
) -> FrameHeader {
    FrameHeader {
        process,
        precision: 8,
        height,
        width,
        components: sampling
            .iter()
            .enumerate()
            .map(|(i, &(h, v))| ComponentDescriptor {
                id: i as u8 + 1,
                h_sampling: h,
                v_sampling: v,
                quant_table_id: 0,
            })
            .collect(),
    }
}

pub fn scan(ids: &[u8], ss: u8, se: u8, ah: u8, al: u8) -> ScanHeader {
    ScanHeader {
        components: ids
            .iter()
            .map(|&component_id| ScanComponent {
                component_id,
                dc_table_id: 0,
                ac_table_id: 0,
            })
            .collect(),
        spectral_start: ss,
        spectral_end: se,
        approx_high: ah,
        approx_low: al,
    }
}

/// One interleaved scan over all components.
pub fn sequential_script(frame: &FrameHeader) -> Vec<ScanHeader> {
    let ids: Vec<u8> = frame.components.iter().map(|c| c.id).collect();
    vec![scan(&ids, 0, 63, 0, 0)]
}

/// DC first, AC first in two bands, DC refinement, two AC refinement passes.
pub fn progressive_script(frame: &FrameHeader) -> Vec<ScanHeader> {
    let ids: Vec<u8> = frame.components.iter().map(|c| c.id).collect();
    let bands = [(1, 5), (6, 63)];
    let mut scans = vec![scan(&ids, 0, 0, 0, 1)];
    for &id in &ids {
        for &(ss, se) in &bands {
            scans.push(scan(&[id], ss, se, 0, 2));
        }
    }
    scans.push(scan(&ids, 0, 0, 1, 0));
    for (ah, al) in [(2, 1), (1, 0)] {
        for &id in &ids {
            for &(ss, se) in &bands {
                scans.push(scan(&[id], ss, se, ah, al));
            }
        }
    }
    scans
}

/// Blocks of each MCU as (component index, row, col), in coding order.
pub fn mcus(frame: &FrameHeader, components: &[usize]) -> Vec<Vec<(usize, usize, usize)>> {
    if let [c] = components {
        let c = *c;
        let (wide, high) = frame.covered_blocks(&frame.components[c]);
        return (0..high)
            .flat_map(|row| (0..wide).map(move |col| vec![(c, row, col)]))
            .collect();
    }

    let mut out = Vec::new();
    for mcu_row in 0..frame.mcus_y() {
        for mcu_col in 0..frame.mcus_x() {
            let mut mcu = Vec::new();
            for &c in components {
                let h = frame.components[c].h_sampling as usize;
                let v = frame.components[c].v_sampling as usize;
                for y in 0..v {
                    for x in 0..h {
                        mcu.push((c, mcu_row * v + y, mcu_col * h + x));
                    }
                }
            }
            out.push(mcu);
        }
    }
    out
}

/// A frame with random coefficients.
pub struct Synthetic {
    pub frame: FrameHeader,
    /// Per component, MCU-padded block grid, 64 zig-zag values per block.
    pub coefficients: Vec<Vec<i16>>,
    pub restart_interval: u16,
}

impl Synthetic {
    /// Blocks outside the area covered by samples only get a DC value, since
    /// single-component scans never reach them.
    pub fn new(frame: FrameHeader, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let coefficients = frame
            .components
            .iter()
            .map(|c| {
                let (wide, high) = frame.padded_blocks(c);
                let (covered_wide, covered_high) = frame.covered_blocks(c);
                let mut data = vec![0i16; wide * high * 64];
                for row in 0..high {
                    for col in 0..wide {
                        let block = &mut data[(row * wide + col) * 64..][..64];
                        block[0] = rng.i16(-1000..=1000);
                        if row >= covered_high || col >= covered_wide {
                            continue;
                        }
                        let density = [0, 4, 12, 40][rng.usize(0..4)];
                        for value in block[1..].iter_mut() {
                            if rng.u8(0..100) >= density {
                                continue;
                            }
                            let magnitude = if rng.u8(0..10) == 0 {
                                rng.i16(21..=500)
                            } else {
                                rng.i16(1..=20)
                            };
                            *value = if rng.bool() { magnitude } else { -magnitude };
                        }
                    }
                }
                data
            })
            .collect();

        Synthetic {
            frame,
            coefficients,
            restart_interval: 0,
        }
    }

    pub fn with_restart_interval(mut self, restart_interval: u16) -> Self {
        self.restart_interval = restart_interval;
        self
    }

    pub fn block(&self, component: usize, row: usize, col: usize) -> &[i16] {
        let (wide, _) = self.frame.padded_blocks(&self.frame.components[component]);
        &self.coefficients[component][(row * wide + col) * 64..][..64]
    }

    pub fn total_blocks(&self) -> usize {
        self.coefficients.iter().map(|c| c.len() / 64).sum()
    }

    /// Entropy-code `header` over this frame's coefficients.
    pub fn encode_scan(&self, header: &ScanHeader) -> Vec<u8> {
        let indices: Vec<usize> = header
            .components
            .iter()
            .map(|s| self.frame.component_index(s.component_id).unwrap())
            .collect();
        let (ss, se) = (header.spectral_start as usize, header.spectral_end as usize);
        let (ah, al) = (header.approx_high, header.approx_low);
        let restart_interval = self.restart_interval as usize;

        let mut encoder = ScanEncoder::new();
        let mut predictors = vec![0i32; self.frame.components.len()];
        for (m, mcu) in mcus(&self.frame, &indices).iter().enumerate() {
            if restart_interval > 0 && m > 0 && m % restart_interval == 0 {
                encoder.emit_eob_run();
                encoder.writer.write_restart((m / restart_interval - 1) as u8);
                predictors.fill(0);
            }
            for &(c, row, col) in mcu {
                let block = self.block(c, row, col);
                if !self.frame.is_progressive() {
                    encoder.sequential(block, &mut predictors[c]);
                } else if ss == 0 && ah == 0 {
                    encoder.dc_first(block, &mut predictors[c], al);
                } else if ss == 0 {
                    encoder.dc_refine(block, al);
                } else if ah == 0 {
                    encoder.ac_first(block, ss, se, al);
                } else {
                    encoder.ac_refine(block, ss, se, al);
                }
            }
        }
        encoder.finish()
    }

    /// Encode every scan of `script`.
    pub fn encode(&self, script: &[ScanHeader]) -> Vec<(ScanHeader, Vec<u8>)> {
        script
            .iter()
            .map(|header| (header.clone(), self.encode_scan(header)))
            .collect()
    }

    /// Assemble a complete stream: SOI, DQT, SOF, DHT, DRI, the scans, EOI.
    pub fn jpeg(&self, scans: &[(ScanHeader, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        write_marker(&mut out, Marker::SOI);

        let mut payload = Vec::new();
        QuantizationTable {
            id: 0,
            precision: 0,
            values: [1; 64],
        }
        .encode(&mut payload);
        write_segment(&mut out, Marker::DQT, &payload).unwrap();

        payload.clear();
        self.frame.encode(&mut payload);
        write_segment(&mut out, Marker::SOF(self.frame.process.sof()), &payload).unwrap();

        payload.clear();
        flat_table(HuffmanClass::Dc).encode(&mut payload);
        flat_table(HuffmanClass::Ac).encode(&mut payload);
        write_segment(&mut out, Marker::DHT, &payload).unwrap();

        if self.restart_interval > 0 {
            write_segment(&mut out, Marker::DRI, &self.restart_interval.to_be_bytes()).unwrap();
        }

        for (header, data) in scans {
            payload.clear();
            header.encode(&mut payload);
            write_segment(&mut out, Marker::SOS, &payload).unwrap();
            out.extend_from_slice(data);
        }

        write_marker(&mut out, Marker::EOI);
        out
    }

    pub fn sequential_jpeg(&self) -> Vec<u8> {
        self.jpeg(&self.encode(&sequential_script(&self.frame)))
    }

    pub fn progressive_jpeg(&self) -> Vec<u8> {
        self.jpeg(&self.encode(&progressive_script(&self.frame)))
    }
}

/// Assert that a decoded working set holds exactly the synthetic coefficients.
pub fn assert_coefficients(working_set: &WorkingSet, synthetic: &Synthetic) {
    let components = working_set.coefficients().components();
    assert_eq!(components.len(), synthetic.coefficients.len());
    for (i, (decoded, expected)) in components.iter().zip(&synthetic.coefficients).enumerate() {
        assert_eq!(decoded.data().len(), expected.len(), "component {i} size");
        if let Some(pos) = decoded.data().iter().zip(expected).position(|(a, b)| a != b) {
            panic!(
                "component {i} block {} coefficient {}: decoded {} expected {}",
                pos / 64,
                pos % 64,
                decoded.data()[pos],
                expected[pos]
            );
        }
    }
}

/// Entropy encoder mirroring the four progressive procedures.
struct ScanEncoder {
    writer: BitWriter,
    dc: HuffmanEncoder,
    ac: HuffmanEncoder,
    eob_run: u32,
    /// Correction bits of the blocks in the pending end-of-band run.
    correction_bits: Vec<u8>,
}

impl ScanEncoder {
    fn new() -> Self {
        ScanEncoder {
            writer: BitWriter::new(),
            dc: HuffmanEncoder::from_table(&flat_table(HuffmanClass::Dc)).unwrap(),
            ac: HuffmanEncoder::from_table(&flat_table(HuffmanClass::Ac)).unwrap(),
            eob_run: 0,
            correction_bits: Vec::new(),
        }
    }

    fn dc_symbol(&mut self, symbol: u8) {
        self.writer.write_huffman(symbol, &self.dc).unwrap();
    }

    fn ac_symbol(&mut self, symbol: u8) {
        self.writer.write_huffman(symbol, &self.ac).unwrap();
    }

    fn dc_difference(&mut self, diff: i32) {
        let (size, bits) = encode_coefficient(diff);
        self.dc_symbol(size);
        self.writer.write_bits(bits, size);
    }

    fn sequential(&mut self, block: &[i16], predictor: &mut i32) {
        let diff = block[0] as i32 - *predictor;
        *predictor = block[0] as i32;
        self.dc_difference(diff);

        let mut run = 0u8;
        for &value in &block[1..] {
            if value == 0 {
                run += 1;
                continue;
            }
            while run >= 16 {
                self.ac_symbol(0xF0);
                run -= 16;
            }
            let (size, bits) = encode_coefficient(value as i32);
            self.ac_symbol((run << 4) | size);
            self.writer.write_bits(bits, size);
            run = 0;
        }
        if run > 0 {
            self.ac_symbol(0x00);
        }
    }

    fn dc_first(&mut self, block: &[i16], predictor: &mut i32, al: u8) {
        let value = (block[0] as i32) >> al;
        let diff = value - *predictor;
        *predictor = value;
        self.dc_difference(diff);
    }

    fn dc_refine(&mut self, block: &[i16], al: u8) {
        self.writer.write_bits((((block[0] as i32) >> al) & 1) as u16, 1);
    }

    fn ac_first(&mut self, block: &[i16], ss: usize, se: usize, al: u8) {
        let mut run = 0u32;
        for &value in &block[ss..=se] {
            let magnitude = (value.unsigned_abs() >> al) as i32;
            if magnitude == 0 {
                run += 1;
                continue;
            }
            self.emit_eob_run();
            while run > 15 {
                self.ac_symbol(0xF0);
                run -= 16;
            }
            let (size, bits) = encode_coefficient(if value < 0 { -magnitude } else { magnitude });
            self.ac_symbol(((run as u8) << 4) | size);
            self.writer.write_bits(bits, size);
            run = 0;
        }
        if run > 0 {
            self.eob_run += 1;
            if self.eob_run == 0x7FFF {
                self.emit_eob_run();
            }
        }
    }

    fn ac_refine(&mut self, block: &[i16], ss: usize, se: usize, al: u8) {
        let magnitudes: Vec<u16> = block[ss..=se].iter().map(|v| v.unsigned_abs() >> al).collect();
        let last_new = magnitudes.iter().rposition(|&m| m == 1);
        let mut run = 0u32;
        let mut pending: Vec<u8> = Vec::new();

        for (i, &magnitude) in magnitudes.iter().enumerate() {
            if magnitude == 0 {
                run += 1;
                continue;
            }
            while run > 15 && last_new.map_or(false, |last| i <= last) {
                self.emit_eob_run();
                self.ac_symbol(0xF0);
                run -= 16;
                for bit in pending.drain(..) {
                    self.writer.write_bits(bit as u16, 1);
                }
            }
            if magnitude > 1 {
                pending.push((magnitude & 1) as u8);
                continue;
            }
            self.emit_eob_run();
            self.ac_symbol(((run as u8) << 4) | 1);
            self.writer.write_bits(if block[ss + i] < 0 { 0 } else { 1 }, 1);
            for bit in pending.drain(..) {
                self.writer.write_bits(bit as u16, 1);
            }
            run = 0;
        }

        if run > 0 || !pending.is_empty() {
            self.eob_run += 1;
            self.correction_bits.extend(pending);
            if self.eob_run == 0x7FFF || self.correction_bits.len() > 900 {
                self.emit_eob_run();
            }
        }
    }

    fn emit_eob_run(&mut self) {
        if self.eob_run > 0 {
            let nbits = 31 - self.eob_run.leading_zeros();
            self.ac_symbol((nbits << 4) as u8);
            if nbits > 0 {
                self.writer
                    .write_bits((self.eob_run & ((1 << nbits) - 1)) as u16, nbits as u8);
            }
            self.eob_run = 0;
        }
        for bit in self.correction_bits.drain(..) {
            self.writer.write_bits(bit as u16, 1);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.emit_eob_run();
        self.writer.into_bytes()
    }
}
