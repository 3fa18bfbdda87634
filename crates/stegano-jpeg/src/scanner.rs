//! Marker segment walker over a JPEG byte stream.

use std::io::{self, BufReader, ErrorKind, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{JpegError, Result};
use crate::marker::Marker;

/// One marker with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSegment {
    pub marker: Marker,
    /// Stream offset of the 0xFF byte in front of the marker code.
    pub offset: u64,
    /// Segment bytes after the length field, `None` for markers without one.
    pub payload: Option<Vec<u8>>,
}

impl MarkerSegment {
    /// The payload, empty for markers without a length field.
    pub fn data(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// Keeps track of how many bytes have been pulled from the inner reader.
struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Cursor over the marker segments of a JPEG stream.
///
/// The cursor never seeks: a marker that terminates a scan's entropy-coded
/// data is remembered as pending and handed out by the next `next_marker`.
pub struct ScanCursor<R: Read> {
    reader: CountingReader<BufReader<R>>,
    /// Marker code and offset already read but not yet returned.
    pending: Option<(u8, u64)>,
    seen_eoi: bool,
    at_eof: bool,
}

impl<R: Read> ScanCursor<R> {
    pub fn new(reader: R) -> Self {
        ScanCursor {
            reader: CountingReader {
                inner: BufReader::new(reader),
                position: 0,
            },
            pending: None,
            seen_eoi: false,
            at_eof: false,
        }
    }

    /// Stream offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.reader.position
    }

    /// True once an EOI marker was returned.
    pub fn seen_eoi(&self) -> bool {
        self.seen_eoi
    }

    /// True if the stream has nothing left to hand out.
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_none() && (self.seen_eoi || self.at_eof)
    }

    /// Marker code waiting to be returned by `next_marker`.
    pub fn pending_marker(&self) -> Option<Marker> {
        self.pending.and_then(|(code, _)| Marker::from_u8(code))
    }

    /// Return the next marker segment, or `None` at the end of the stream.
    ///
    /// Bytes in front of the marker that do not form one (garbage, fill bytes,
    /// stuffed zeros) are skipped.
    pub fn next_marker(&mut self) -> Result<Option<MarkerSegment>> {
        let (code, offset) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.find_marker()? {
                Some(found) => found,
                None => return Ok(None),
            },
        };

        let marker = Marker::from_u8(code).ok_or_else(|| JpegError::MalformedMarker {
            marker: Some(code),
            offset,
            reason: "not a marker code".to_string(),
        })?;
        if marker == Marker::EOI {
            self.seen_eoi = true;
        }

        let payload = if marker.has_length() {
            let length = self
                .reader
                .read_u16::<BigEndian>()
                .map_err(|e| truncated(e, code, offset, "length field"))?;
            if length < 2 {
                return Err(JpegError::MalformedMarker {
                    marker: Some(code),
                    offset,
                    reason: format!("segment length {length} is shorter than the length field"),
                });
            }
            let mut payload = vec![0u8; length as usize - 2];
            self.reader
                .read_exact(&mut payload)
                .map_err(|e| truncated(e, code, offset, "payload"))?;
            Some(payload)
        } else {
            None
        };

        log::trace!(
            "{marker} at offset {offset} with {} payload bytes",
            payload.as_ref().map_or(0, Vec::len)
        );

        Ok(Some(MarkerSegment {
            marker,
            offset,
            payload,
        }))
    }

    /// Read the entropy-coded bytes of a scan.
    ///
    /// Stuffed bytes, restart markers and the fill bytes in front of them stay
    /// in the returned data, so `data[i]` sits at stream offset `start + i`.
    /// Reading stops in front of the next other marker, which becomes pending.
    pub fn read_entropy_data(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let Some(byte) = self.read_byte()? else {
                return Ok(data);
            };
            if byte != 0xFF {
                data.push(byte);
                continue;
            }

            let mut offset = self.offset() - 1;
            let mut fill = 0;
            let code = loop {
                match self.read_byte()? {
                    None => return Ok(data),
                    Some(0xFF) => {
                        offset = self.offset() - 1;
                        fill += 1;
                    }
                    Some(code) => break code,
                }
            };

            match code {
                0x00 | 0xD0..=0xD7 => {
                    data.resize(data.len() + fill + 1, 0xFF);
                    data.push(code);
                }
                _ => {
                    self.pending = Some((code, offset));
                    return Ok(data);
                }
            }
        }
    }

    fn find_marker(&mut self) -> Result<Option<(u8, u64)>> {
        let start = self.offset();
        let found = 'search: loop {
            let Some(byte) = self.read_byte()? else {
                break 'search None;
            };
            if byte != 0xFF {
                continue;
            }
            let mut offset = self.offset() - 1;
            loop {
                match self.read_byte()? {
                    None => break 'search None,
                    Some(0xFF) => offset = self.offset() - 1,
                    Some(0x00) => continue 'search,
                    Some(code) => break 'search Some((code, offset)),
                }
            }
        };

        let skipped = match found {
            Some((_, offset)) => offset - start,
            None => self.offset() - start,
        };
        if skipped > 0 {
            log::warn!("skipped {skipped} bytes in front of offset {}", start + skipped);
        }
        Ok(found)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.reader.read_u8() {
            Ok(byte) => Ok(Some(byte)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.at_eof = true;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn truncated(error: io::Error, code: u8, offset: u64, part: &str) -> JpegError {
    if error.kind() == ErrorKind::UnexpectedEof {
        JpegError::MalformedMarker {
            marker: Some(code),
            offset,
            reason: format!("stream ends inside the {part}"),
        }
    } else {
        error.into()
    }
}
