//! JPEG marker codes (ITU T.81 Table B.1).

use std::fmt;

/// A marker code following a 0xFF byte.
///
/// Every variant keeps enough information to reproduce the exact code byte,
/// so `Marker::from_u8(code).map(Marker::to_u8) == Some(code)` for every
/// code except the stuffing byte 0x00 and the fill byte 0xFF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Marker {
    /// Start of frame, `n` is the low nibble of 0xC0..=0xCF (minus DHT, JPG, DAC).
    SOF(u8),
    DHT,
    JPG,
    DAC,
    /// Restart marker with modulo 8 count.
    RST(u8),
    SOI,
    EOI,
    SOS,
    DQT,
    DNL,
    DRI,
    DHP,
    EXP,
    /// Application segment 0..=15.
    APP(u8),
    /// JPEG extension 0..=13.
    JPGn(u8),
    COM,
    TEM,
    /// Reserved code in 0x02..=0xBF.
    RES(u8),
}

impl Marker {
    /// Map a code byte to a marker. 0x00 (stuffing) and 0xFF (fill) are not markers.
    pub fn from_u8(code: u8) -> Option<Marker> {
        use Marker::*;
        Some(match code {
            0x00 | 0xFF => return None,
            0x01 => TEM,
            0x02..=0xBF => RES(code),
            0xC4 => DHT,
            0xC8 => JPG,
            0xCC => DAC,
            0xC0..=0xCF => SOF(code - 0xC0),
            0xD0..=0xD7 => RST(code - 0xD0),
            0xD8 => SOI,
            0xD9 => EOI,
            0xDA => SOS,
            0xDB => DQT,
            0xDC => DNL,
            0xDD => DRI,
            0xDE => DHP,
            0xDF => EXP,
            0xE0..=0xEF => APP(code - 0xE0),
            0xF0..=0xFD => JPGn(code - 0xF0),
            0xFE => COM,
        })
    }

    /// The code byte of this marker.
    pub fn to_u8(self) -> u8 {
        use Marker::*;
        match self {
            SOF(n) => 0xC0 + n,
            DHT => 0xC4,
            JPG => 0xC8,
            DAC => 0xCC,
            RST(n) => 0xD0 + n,
            SOI => 0xD8,
            EOI => 0xD9,
            SOS => 0xDA,
            DQT => 0xDB,
            DNL => 0xDC,
            DRI => 0xDD,
            DHP => 0xDE,
            EXP => 0xDF,
            APP(n) => 0xE0 + n,
            JPGn(n) => 0xF0 + n,
            COM => 0xFE,
            TEM => 0x01,
            RES(code) => code,
        }
    }

    /// Whether a big-endian length field follows the marker.
    pub fn has_length(self) -> bool {
        !matches!(self, Marker::RST(_) | Marker::SOI | Marker::EOI | Marker::TEM)
    }

    pub fn is_restart(self) -> bool {
        matches!(self, Marker::RST(_))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::SOF(n) => write!(f, "SOF{n}"),
            Marker::RST(n) => write!(f, "RST{n}"),
            Marker::APP(n) => write!(f, "APP{n}"),
            Marker::JPGn(n) => write!(f, "JPG{n}"),
            Marker::RES(code) => write!(f, "RES(0x{code:02X})"),
            other => write!(f, "{other:?}"),
        }
    }
}
