//! The coder facade: binds an input stream, freezes the working set and
//! decodes the stream's scans one call at a time.

use std::io::Read;

use crate::error::{JpegError, Result};
use crate::marker::Marker;
use crate::options::CoderOptions;
use crate::scan::{decode_scan, ScanResult};
use crate::scanner::{MarkerSegment, ScanCursor};
use crate::tables::ScanHeader;
use crate::working_set::{WorkingSet, WorkingSetBuilder};

/// Scan-incremental access to the coefficients of a JPEG stream.
///
/// Wrappers can implement this trait by holding a [`JpegCoder`] and
/// forwarding the calls they do not change.
pub trait Coder {
    /// Read header segments up to the first scan and freeze them into the
    /// working set. Calling it again returns the same working set.
    fn load_working_set(&mut self) -> Result<&WorkingSet>;

    /// Decode the next scan into the working set.
    ///
    /// Fails with [`JpegError::NoMoreScans`] once the stream is exhausted, on
    /// every further call as well.
    fn load_scan(&mut self) -> Result<ScanResult>;

    /// Release the input stream. Closing twice is a no-op.
    fn close(&mut self);

    /// Load the working set and all scans, skipping scans that fail with a
    /// recoverable error.
    fn load_all_scans(&mut self) -> Result<Vec<ScanResult>> {
        self.load_working_set()?;

        let mut results = Vec::new();
        loop {
            match self.load_scan() {
                Ok(result) => results.push(result),
                Err(e) if e.is_no_more_scans() => break,
                Err(e) if e.is_recoverable() => log::warn!("skipping scan: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}

/// Default [`Coder`] over any `std::io::Read` source.
pub struct JpegCoder<R: Read> {
    cursor: Option<ScanCursor<R>>,
    builder: WorkingSetBuilder,
    options: CoderOptions,
    /// SOS met while reading the header, decoded by the next `load_scan`.
    pending_sos: Option<MarkerSegment>,
    started: bool,
}

impl<R: Read> JpegCoder<R> {
    /// Bind a reader positioned at the start of a JPEG stream.
    pub fn open(reader: R) -> Self {
        Self::with_options(reader, CoderOptions::default())
    }

    pub fn with_options(reader: R, options: CoderOptions) -> Self {
        JpegCoder {
            cursor: Some(ScanCursor::new(reader)),
            builder: WorkingSetBuilder::new(),
            options,
            pending_sos: None,
            started: false,
        }
    }

    pub fn options(&self) -> &CoderOptions {
        &self.options
    }

    /// The frozen working set, if `load_working_set` succeeded.
    pub fn working_set(&self) -> Option<&WorkingSet> {
        self.builder.working_set()
    }

    /// Mutable access to the frozen working set, e.g. to modify coefficients.
    pub fn working_set_mut(&mut self) -> Option<&mut WorkingSet> {
        self.builder.working_set_mut()
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// True if no further scan can be loaded.
    pub fn is_exhausted(&self) -> bool {
        match &self.cursor {
            Some(cursor) => self.pending_sos.is_none() && cursor.is_exhausted(),
            None => true,
        }
    }

    /// Feed header segments to the builder until the first SOS, EOI or the
    /// end of the stream.
    fn read_header(&mut self) -> Result<()> {
        let cursor = self.cursor.as_mut().ok_or(JpegError::Closed)?;

        if !self.started {
            match cursor.next_marker()? {
                Some(segment) if segment.marker == Marker::SOI => self.started = true,
                Some(segment) => {
                    return Err(JpegError::MalformedMarker {
                        marker: Some(segment.marker.to_u8()),
                        offset: segment.offset,
                        reason: "stream does not start with SOI".to_string(),
                    })
                }
                None => {
                    return Err(JpegError::IncompleteHeader {
                        reason: "stream holds no markers".to_string(),
                    })
                }
            }
        }

        while self.pending_sos.is_none() {
            match cursor.next_marker()? {
                Some(segment) if segment.marker == Marker::SOS => self.pending_sos = Some(segment),
                Some(segment) if segment.marker == Marker::EOI => break,
                Some(segment) => self.builder.observe(&segment)?,
                None => break,
            }
        }
        Ok(())
    }
}

impl<R: Read> Coder for JpegCoder<R> {
    fn load_working_set(&mut self) -> Result<&WorkingSet> {
        if self.is_closed() {
            return Err(JpegError::Closed);
        }
        if !self.builder.is_frozen() {
            self.read_header()?;
        }
        self.builder.freeze(&self.options)
    }

    fn load_scan(&mut self) -> Result<ScanResult> {
        let cursor = self.cursor.as_mut().ok_or(JpegError::Closed)?;
        let working_set = self
            .builder
            .working_set_mut()
            .ok_or_else(|| JpegError::IncompleteHeader {
                reason: "working set not loaded".to_string(),
            })?;

        let sos = match self.pending_sos.take() {
            Some(sos) => sos,
            None => loop {
                if cursor.seen_eoi() {
                    return Err(JpegError::NoMoreScans {
                        offset: cursor.offset(),
                    });
                }
                match cursor.next_marker()? {
                    Some(segment) if segment.marker == Marker::SOS => break segment,
                    Some(segment) if segment.marker == Marker::EOI => {
                        return Err(JpegError::NoMoreScans {
                            offset: segment.offset,
                        })
                    }
                    Some(segment) => working_set.observe(&segment)?,
                    None => {
                        return Err(JpegError::NoMoreScans {
                            offset: cursor.offset(),
                        })
                    }
                }
            },
        };

        let data_offset = cursor.offset();
        let data = cursor.read_entropy_data()?;
        log::trace!(
            "scan at offset {} with {} bytes of entropy-coded data",
            sos.offset,
            data.len()
        );

        let header = ScanHeader::parse(sos.data(), sos.offset)?;
        decode_scan(
            working_set,
            &header,
            &data,
            data_offset,
            sos.offset,
            &self.options,
        )
    }

    fn close(&mut self) {
        if self.cursor.take().is_some() {
            log::debug!("coder closed");
        }
        self.pending_sos = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_operations_after_close_fail() {
        let mut coder = JpegCoder::open(Cursor::new(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        coder.close();
        coder.close();

        assert!(coder.is_closed());
        assert!(coder.is_exhausted());
        assert!(matches!(coder.load_working_set(), Err(JpegError::Closed)));
        assert!(matches!(coder.load_scan(), Err(JpegError::Closed)));
    }

    #[test]
    fn test_stream_must_start_with_soi() {
        let mut coder = JpegCoder::open(Cursor::new(vec![0xFF, 0xD9]));
        assert!(matches!(
            coder.load_working_set(),
            Err(JpegError::MalformedMarker { marker: Some(0xD9), .. })
        ));

        let mut coder = JpegCoder::open(Cursor::new(Vec::new()));
        assert!(matches!(
            coder.load_working_set(),
            Err(JpegError::IncompleteHeader { .. })
        ));
    }

    #[test]
    fn test_scan_before_working_set_fails() {
        let mut coder = JpegCoder::open(Cursor::new(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        assert!(matches!(
            coder.load_scan(),
            Err(JpegError::IncompleteHeader { .. })
        ));
    }

    #[test]
    fn test_header_without_frame_is_incomplete() {
        let mut coder = JpegCoder::open(Cursor::new(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        assert!(matches!(
            coder.load_working_set(),
            Err(JpegError::IncompleteHeader { .. })
        ));
        assert!(coder.working_set().is_none());
    }
}
