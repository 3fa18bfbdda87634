//! Error types for the JPEG coder.

use std::fmt;
use thiserror::Error;

/// Result type alias for coder operations.
pub type Result<T> = std::result::Result<T, JpegError>;

/// Kind of table a frame or scan header refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Quantization,
    DcHuffman,
    AcHuffman,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Quantization => write!(f, "quantization"),
            TableKind::DcHuffman => write!(f, "DC Huffman"),
            TableKind::AcHuffman => write!(f, "AC Huffman"),
        }
    }
}

/// Errors raised while reading header segments or decoding scans.
#[derive(Error)]
pub enum JpegError {
    /// Structural corruption of the container: bad length fields, truncated
    /// payloads, invalid segment contents or unexpected markers.
    #[error("malformed {} segment at offset {offset}: {reason}", marker_name(.marker))]
    MalformedMarker {
        marker: Option<u8>,
        offset: u64,
        reason: String,
    },

    /// The entropy-coded data does not match the Huffman table in use, or the
    /// table itself is not a valid canonical code.
    #[error("malformed Huffman data at offset {offset}: {reason}")]
    MalformedHuffmanTable { offset: u64, reason: String },

    /// Not enough header segments were seen to freeze a working set.
    #[error("incomplete header: {reason}")]
    IncompleteHeader { reason: String },

    /// A component references a table id that was never defined.
    #[error("component {component} references undefined {kind} table {id}")]
    UnknownTableReference { kind: TableKind, id: u8, component: u8 },

    /// All scans of the stream have been consumed.
    #[error("no more scans (stream exhausted at offset {offset})")]
    NoMoreScans { offset: u64 },

    /// The frame uses a coding process this coder does not decode.
    #[error("unsupported frame type SOF{sof}")]
    UnsupportedFrame { sof: u8 },

    /// The coefficient buffer for the frame would exceed the configured limit.
    #[error("coefficient buffer of {blocks} blocks exceeds the limit of {limit} blocks")]
    BufferLimitExceeded { blocks: usize, limit: usize },

    /// The bit reader ran out of entropy-coded bytes.
    #[error("end of entropy-coded data at offset {offset}")]
    EndOfStream { offset: u64 },

    /// The bit reader stopped in front of a marker.
    #[error("marker 0xFF{marker:02X} encountered at offset {offset}")]
    MarkerEncountered { marker: u8, offset: u64 },

    /// A coefficient or DC difference is out of range for the frame's
    /// precision and has no Huffman category.
    #[error("value {value} at index {index} of component {component} block {block} out of range")]
    UnencodableCoefficient {
        component: u8,
        block: usize,
        index: usize,
        value: i32,
    },

    /// The coder was closed.
    #[error("coder is closed")]
    Closed,

    /// I/O error of the underlying reader.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JpegError {
    /// True once the stream has no further scans to offer.
    pub fn is_no_more_scans(&self) -> bool {
        matches!(self, JpegError::NoMoreScans { .. })
    }

    /// True if the coder stays usable after this error, so a caller may log it
    /// and continue with the next `load_scan`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            JpegError::NoMoreScans { .. }
                | JpegError::MalformedHuffmanTable { .. }
                | JpegError::MalformedMarker { .. }
                | JpegError::UnknownTableReference { .. }
                | JpegError::EndOfStream { .. }
                | JpegError::MarkerEncountered { .. }
        )
    }

    /// Byte offset in the stream the error refers to, if known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            JpegError::MalformedMarker { offset, .. }
            | JpegError::MalformedHuffmanTable { offset, .. }
            | JpegError::NoMoreScans { offset }
            | JpegError::EndOfStream { offset }
            | JpegError::MarkerEncountered { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Reinterpret a bit reader exhaustion as a failure of the entropy-coded
    /// segment it happened in.
    pub(crate) fn in_entropy_data(self) -> Self {
        match self {
            JpegError::EndOfStream { offset } => JpegError::MalformedHuffmanTable {
                offset,
                reason: "entropy-coded data ended in the middle of the scan".to_string(),
            },
            JpegError::MarkerEncountered { marker, offset } => JpegError::MalformedHuffmanTable {
                offset,
                reason: format!("marker 0xFF{marker:02X} inside entropy-coded data"),
            },
            other => other,
        }
    }
}

fn marker_name(marker: &Option<u8>) -> String {
    match marker {
        Some(code) => format!("0xFF{code:02X}"),
        None => "marker".to_string(),
    }
}

impl fmt::Debug for JpegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use Display for Debug so unwrap() shows user-friendly messages
        write!(f, "{self}")
    }
}
