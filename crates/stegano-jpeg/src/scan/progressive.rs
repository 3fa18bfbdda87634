//! Progressive (SOF2) block decoding.
//!
//! A progressive frame splits each block over several scans: spectral
//! selection picks a band `Ss..=Se` of the zig-zag coefficients, successive
//! approximation sends the bits above `Al` first and refines one bit per
//! later scan. The four procedures follow ITU T.81 Annex G.

use super::baseline::to_coefficient;
use super::required;
use crate::bit_reader::BitReader;
use crate::error::{JpegError, Result};
use crate::huffman::HuffmanTable;
use crate::tables::ScanHeader;

/// First DC scan: difference coding as in sequential mode, scaled by `Al`.
pub(crate) fn decode_dc_first(
    reader: &mut BitReader,
    block: &mut [i16],
    dc_table: Option<&HuffmanTable>,
    dc_predictor: &mut i32,
    approx_low: u8,
) -> Result<usize> {
    let table = required(dc_table, reader)?;

    let size = table.decode_symbol(reader)?;
    if size > 15 {
        return Err(JpegError::MalformedHuffmanTable {
            offset: reader.offset(),
            reason: format!("invalid DC difference category {size}"),
        });
    }
    *dc_predictor += reader.receive_extend(size)? as i32;
    block[0] = to_coefficient(*dc_predictor << approx_low, reader)?;
    Ok((block[0] != 0) as usize)
}

/// DC refinement: one raw bit per block.
pub(crate) fn decode_dc_refine(
    reader: &mut BitReader,
    block: &mut [i16],
    approx_low: u8,
) -> Result<usize> {
    if reader.next_bit()? == 1 {
        block[0] |= 1 << approx_low;
        return Ok(1);
    }
    Ok(0)
}

/// First AC scan of a band, with end-of-band runs spanning blocks.
pub(crate) fn decode_ac_first(
    reader: &mut BitReader,
    block: &mut [i16],
    ac_table: Option<&HuffmanTable>,
    header: &ScanHeader,
    eob_run: &mut u32,
) -> Result<usize> {
    if *eob_run > 0 {
        *eob_run -= 1;
        return Ok(0);
    }

    let table = required(ac_table, reader)?;
    let end = header.spectral_end as usize;
    let mut k = header.spectral_start as usize;
    let mut changed = 0;

    while k <= end {
        let symbol = table.decode_symbol(reader)?;
        let run = symbol >> 4;
        let size = symbol & 0x0F;

        if size == 0 {
            if run < 15 {
                *eob_run = read_eob_run(reader, run)? - 1;
                break;
            }
            // ZRL
            k += 16;
            continue;
        }

        k += run as usize;
        if k > end {
            return Err(past_band_end(reader, symbol, header));
        }
        let value = (reader.receive_extend(size)? as i32) << header.approx_low;
        block[k] = i16::try_from(value).map_err(|_| JpegError::MalformedHuffmanTable {
            offset: reader.offset(),
            reason: format!("AC value {value} out of range"),
        })?;
        changed += 1;
        k += 1;
    }

    Ok(changed)
}

/// AC refinement: correction bits for coefficients that are already non-zero
/// and new coefficients of magnitude `1 << Al`.
pub(crate) fn decode_ac_refine(
    reader: &mut BitReader,
    block: &mut [i16],
    ac_table: Option<&HuffmanTable>,
    header: &ScanHeader,
    eob_run: &mut u32,
) -> Result<usize> {
    let end = header.spectral_end as usize;
    let bit = 1i16 << header.approx_low;
    let mut k = header.spectral_start as usize;
    let mut changed = 0;

    if *eob_run == 0 {
        let table = required(ac_table, reader)?;
        while k <= end {
            let symbol = table.decode_symbol(reader)?;
            let mut run = symbol >> 4;
            let size = symbol & 0x0F;

            let value = match size {
                0 if run < 15 => {
                    *eob_run = read_eob_run(reader, run)?;
                    break;
                }
                // ZRL: skip 16 zero coefficients, refining non-zero ones on the way
                0 => 0,
                1 if reader.next_bit()? == 1 => bit,
                1 => -bit,
                _ => {
                    return Err(JpegError::MalformedHuffmanTable {
                        offset: reader.offset(),
                        reason: format!("refinement symbol 0x{symbol:02X} with size {size}"),
                    })
                }
            };

            while k <= end {
                if block[k] != 0 {
                    changed += refine(reader, &mut block[k], bit)?;
                } else {
                    if run == 0 {
                        break;
                    }
                    run -= 1;
                }
                k += 1;
            }

            if value != 0 {
                if k > end {
                    return Err(past_band_end(reader, symbol, header));
                }
                block[k] = value;
                changed += 1;
            }
            k += 1;
        }
    }

    if *eob_run > 0 {
        while k <= end {
            if block[k] != 0 {
                changed += refine(reader, &mut block[k], bit)?;
            }
            k += 1;
        }
        *eob_run -= 1;
    }

    Ok(changed)
}

/// Read the end-of-band run length announced by an EOBn symbol, counting the
/// current block.
fn read_eob_run(reader: &mut BitReader, run: u8) -> Result<u32> {
    let mut length = 1u32 << run;
    if run > 0 {
        length += reader.next_bits(run)? as u32;
    }
    Ok(length)
}

/// Apply one correction bit to a non-zero coefficient, moving it away from zero.
fn refine(reader: &mut BitReader, coefficient: &mut i16, bit: i16) -> Result<usize> {
    if reader.next_bit()? == 0 || *coefficient & bit != 0 {
        return Ok(0);
    }
    let delta = if *coefficient >= 0 { bit } else { -bit };
    *coefficient = coefficient
        .checked_add(delta)
        .ok_or_else(|| JpegError::MalformedHuffmanTable {
            offset: reader.offset(),
            reason: format!("refinement of {coefficient} overflows"),
        })?;
    Ok(1)
}

fn past_band_end(reader: &BitReader, symbol: u8, header: &ScanHeader) -> JpegError {
    JpegError::MalformedHuffmanTable {
        offset: reader.offset(),
        reason: format!(
            "AC run/size 0x{symbol:02X} runs past the end of band {}..={}",
            header.spectral_start, header.spectral_end
        ),
    }
}
