//! Scan-incremental JPEG Coefficient Coder
//!
//! This crate gives coefficient-level access to baseline and progressive JPEG
//! files, the layer a steganographic embedder works on. It parses the header
//! segments into a frozen working set and decodes the entropy-coded scans one
//! at a time into a buffer of quantized DCT coefficients, without
//! dequantization, IDCT or color conversion.
//!
//! # Layer Responsibilities
//!
//! This crate handles **container-level** concerns only:
//! - Walking marker segments and building quantization/Huffman tables
//! - Decoding sequential and progressive scans, including restart intervals
//! - Exposing the coefficient buffer read/write
//! - Re-encoding a sequential working set as a baseline JPEG
//!
//! Embedding policy is left to the caller.
//!
//! # Architecture
//!
//! ```text
//! Read → ScanCursor → WorkingSetBuilder → freeze → WorkingSet
//!                   → SOS + entropy data → decode_scan → CoefficientBuffer
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stegano_jpeg::{Coder, JpegCoder};
//!
//! let file = std::fs::File::open("image.jpg")?;
//! let mut coder = JpegCoder::open(file);
//! coder.load_working_set()?;
//! loop {
//!     match coder.load_scan() {
//!         Ok(scan) => println!("scan {} touched {}", scan.index, scan.coefficients_touched),
//!         Err(e) if e.is_no_more_scans() => break,
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! coder.close();
//! ```

mod bit_reader;
mod coder;
mod error;
pub mod huffman;
pub mod marker;
mod options;
pub mod scan;
pub mod scanner;
pub mod tables;
pub mod working_set;
pub mod writer;
pub mod zigzag;

use std::io::Read;

pub use bit_reader::BitReader;
pub use coder::{Coder, JpegCoder};
pub use error::{JpegError, Result, TableKind};
pub use huffman::{HuffmanClass, HuffmanEncoder, HuffmanTable};
pub use marker::Marker;
pub use options::{CoderOptions, DEFAULT_MAX_BLOCKS};
pub use scan::{decode_scan, ScanResult};
pub use scanner::{MarkerSegment, ScanCursor};
pub use tables::{
    CodingProcess, ComponentDescriptor, FrameHeader, QuantizationTable, ScanComponent, ScanHeader,
};
pub use working_set::{
    CoefficientBuffer, ComponentCoefficients, TableStore, WorkingSet, WorkingSetBuilder,
};
pub use writer::{encode_coefficient, write_baseline_jpeg, write_segment, BitWriter};
pub use zigzag::{NATURAL_TO_ZIGZAG, ZIGZAG_TO_NATURAL};

/// Read the quantization tables of a JPEG stream.
///
/// Only the header up to the first scan is read.
pub fn parse_quantization_tables<R: Read>(reader: R) -> Result<Vec<QuantizationTable>> {
    let mut coder = JpegCoder::open(reader);
    let tables: Vec<QuantizationTable> = coder
        .load_working_set()?
        .tables()
        .quantization
        .iter()
        .flatten()
        .cloned()
        .collect();
    coder.close();
    Ok(tables)
}
