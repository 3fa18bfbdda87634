//! Sequential (SOF0/SOF1) block decoding.
//!
//! Every block carries its full spectral range: a DC difference followed by
//! run/size coded AC coefficients up to EOB.

use super::required;
use crate::bit_reader::BitReader;
use crate::error::{JpegError, Result};
use crate::huffman::HuffmanTable;

/// Decode a single 8x8 block of DCT coefficients in zig-zag order.
///
/// Returns the number of non-zero coefficients written.
pub(crate) fn decode_block(
    reader: &mut BitReader,
    block: &mut [i16],
    dc_table: Option<&HuffmanTable>,
    ac_table: Option<&HuffmanTable>,
    dc_predictor: &mut i32,
) -> Result<usize> {
    let dc_table = required(dc_table, reader)?;
    let ac_table = required(ac_table, reader)?;

    block.fill(0);
    let mut changed = 0;

    let dc_size = dc_table.decode_symbol(reader)?;
    if dc_size > 15 {
        return Err(JpegError::MalformedHuffmanTable {
            offset: reader.offset(),
            reason: format!("invalid DC difference category {dc_size}"),
        });
    }
    *dc_predictor += reader.receive_extend(dc_size)? as i32;
    block[0] = to_coefficient(*dc_predictor, reader)?;
    if block[0] != 0 {
        changed += 1;
    }

    let mut k = 1;
    while k < 64 {
        let symbol = ac_table.decode_symbol(reader)?;
        let run = (symbol >> 4) as usize;
        let size = symbol & 0x0F;

        if size == 0 {
            if run == 0x0F {
                // ZRL
                k += 16;
                continue;
            }
            // EOB
            break;
        }

        k += run;
        if k >= 64 {
            return Err(JpegError::MalformedHuffmanTable {
                offset: reader.offset(),
                reason: format!("AC run/size 0x{symbol:02X} runs past the end of the block"),
            });
        }
        block[k] = reader.receive_extend(size)?;
        changed += 1;
        k += 1;
    }

    Ok(changed)
}

/// Narrow a predictor sum to a stored coefficient.
pub(crate) fn to_coefficient(value: i32, reader: &BitReader) -> Result<i16> {
    i16::try_from(value).map_err(|_| JpegError::MalformedHuffmanTable {
        offset: reader.offset(),
        reason: format!("DC value {value} out of range"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::HuffmanClass;

    /// DC categories: 0 = 00, 1 = 01, 2 = 10, 3 = 110
    fn dc_table() -> HuffmanTable {
        let mut lengths = [0u8; 16];
        lengths[1] = 3;
        lengths[2] = 1;
        HuffmanTable::new(HuffmanClass::Dc, 0, lengths, vec![0, 1, 2, 3]).unwrap()
    }

    /// EOB = 00, 0x01 = 01, 0x21 = 100, ZRL = 101, 0xE1 = 110
    fn ac_table() -> HuffmanTable {
        let mut lengths = [0u8; 16];
        lengths[1] = 2;
        lengths[2] = 3;
        HuffmanTable::new(HuffmanClass::Ac, 0, lengths, vec![0x00, 0x01, 0x21, 0xF0, 0xE1]).unwrap()
    }

    #[test]
    fn test_decode_block_with_runs_and_eob() {
        // DC: cat 2 "10" value +2 "10"; AC: 0x01 "01" +1 "1", 0x21 "100" -1 "0", EOB "00"
        let data = [0b1010_0111, 0b0000_0111];
        let mut reader = BitReader::new(&data);
        let mut block = [7i16; 64];
        let mut predictor = 5;

        let changed = decode_block(
            &mut reader,
            &mut block,
            Some(&dc_table()),
            Some(&ac_table()),
            &mut predictor,
        )
        .unwrap();

        assert_eq!(predictor, 7);
        assert_eq!(block[0], 7);
        assert_eq!(block[1], 1);
        assert_eq!(block[2], 0);
        assert_eq!(block[3], 0);
        assert_eq!(block[4], -1);
        assert!(block[5..].iter().all(|&c| c == 0));
        assert_eq!(changed, 3);
    }

    #[test]
    fn test_zero_run_length() {
        // DC cat 0 "00"; ZRL "101"; 0xE1 "110" + "1"; EOB "00"
        // 14 + 16 zeros puts the coefficient at k = 1 + 16 + 14 = 31
        let data = [0b0010_1110, 0b1001_1111];
        let mut reader = BitReader::new(&data);
        let mut block = [0i16; 64];
        let mut predictor = 0;

        decode_block(&mut reader, &mut block, Some(&dc_table()), Some(&ac_table()), &mut predictor)
            .unwrap();
        assert_eq!(block[31], 1);
        assert_eq!(block.iter().filter(|&&c| c != 0).count(), 1);
    }

    #[test]
    fn test_run_past_block_end_fails() {
        let (dc, ac) = (dc_table(), ac_table());
        let decode = |data: &[u8]| {
            let mut reader = BitReader::new(data);
            let mut block = [0i16; 64];
            let mut predictor = 0;
            decode_block(&mut reader, &mut block, Some(&dc), Some(&ac), &mut predictor).map(|_| ())
        };

        // DC cat 0, four ZRLs end the block at k = 65
        assert!(decode(&[0b0010_1101, 0b1011_0111]).is_ok());

        // DC cat 0, three ZRLs (k = 49), 0x01 at 49, then run 14 lands on 64
        assert!(matches!(
            decode(&[0b0010_1101, 0b1010_1111, 0b0111_1111]),
            Err(JpegError::MalformedHuffmanTable { .. })
        ));
    }

    #[test]
    fn test_missing_table_fails() {
        let data = [0u8; 4];
        let mut reader = BitReader::new(&data);
        let mut block = [0i16; 64];
        let mut predictor = 0;
        assert!(matches!(
            decode_block(&mut reader, &mut block, Some(&dc_table()), None, &mut predictor),
            Err(JpegError::MalformedHuffmanTable { .. })
        ));
    }
}
