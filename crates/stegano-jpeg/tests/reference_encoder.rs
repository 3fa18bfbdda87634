//! Streams written by the `jpeg-encoder` crate decode to the same quantized
//! coefficients whether they were coded sequentially or progressively.

use std::io::Cursor;

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use stegano_jpeg::{Coder, JpegCoder, ScanResult, WorkingSet};

const QUALITY: u8 = 85;

/// Gradients with some noise, so most blocks carry AC energy.
fn image(width: u16, height: u16, channels: usize, seed: u64) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let (width, height) = (width as usize, height as usize);
    let mut data = Vec::with_capacity(width * height * channels);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let gradient = (x * 255 / width + y * (c + 1) * 3) as u8;
                data.push(gradient.wrapping_add(rng.u8(0..48)));
            }
        }
    }
    data
}

struct Options {
    sampling: Option<SamplingFactor>,
    progressive: bool,
    restart_interval: Option<u16>,
}

fn encode(data: &[u8], width: u16, height: u16, color: ColorType, options: &Options) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, QUALITY);
    if let Some(sampling) = options.sampling {
        encoder.set_sampling_factor(sampling);
    }
    encoder.set_progressive(options.progressive);
    if let Some(interval) = options.restart_interval {
        encoder.set_restart_interval(interval);
    }
    encoder.encode(data, width, height, color).unwrap();
    out
}

fn decode(data: Vec<u8>) -> (WorkingSet, Vec<ScanResult>) {
    let mut coder = JpegCoder::open(Cursor::new(data));
    let results = coder.load_all_scans().unwrap();
    let working_set = coder.working_set().unwrap().clone();
    coder.close();
    (working_set, results)
}

/// Blocks covered by samples must match; the padding blocks of a
/// non-interleaved scan are never coded.
fn assert_same_covered_blocks(baseline: &WorkingSet, progressive: &WorkingSet) {
    assert_eq!(baseline.frame().components, progressive.frame().components);
    assert_eq!(baseline.tables().quantization, progressive.tables().quantization);

    let pairs = baseline
        .coefficients()
        .components()
        .iter()
        .zip(progressive.coefficients().components());
    for (left, right) in pairs {
        assert_eq!(left.scan_blocks_wide, right.scan_blocks_wide);
        assert_eq!(left.scan_blocks_high, right.scan_blocks_high);
        for row in 0..left.scan_blocks_high {
            for col in 0..left.scan_blocks_wide {
                assert_eq!(
                    left.block(row, col),
                    right.block(row, col),
                    "component {} block ({row}, {col})",
                    left.component_id
                );
            }
        }
    }
}

fn check(color: ColorType, channels: usize, sampling: Option<SamplingFactor>, seed: u64) {
    let (width, height) = (53, 37);
    let data = image(width, height, channels, seed);

    for restart_interval in [None, Some(2)] {
        let options = |progressive| Options {
            sampling,
            progressive,
            restart_interval,
        };
        let (baseline, baseline_scans) =
            decode(encode(&data, width, height, color, &options(false)));
        let (progressive, progressive_scans) =
            decode(encode(&data, width, height, color, &options(true)));

        assert_eq!(baseline.frame().width, width);
        assert_eq!(baseline.frame().height, height);
        assert!(!baseline.frame().is_progressive());
        assert!(progressive.frame().is_progressive());
        assert_eq!(baseline.restart_interval(), restart_interval.unwrap_or(0));
        assert_eq!(progressive.restart_interval(), restart_interval.unwrap_or(0));
        assert_eq!(baseline_scans.len(), 1);
        assert!(progressive_scans.len() > 1);
        assert_eq!(progressive.scans_decoded(), progressive_scans.len());

        let luma = &baseline.coefficients().components()[0];
        assert!(luma
            .data()
            .chunks_exact(64)
            .any(|block| block[1..].iter().any(|&c| c != 0)));

        assert_same_covered_blocks(&baseline, &progressive);
    }
}

#[test]
fn test_reference_encoder_4_4_4() {
    check(ColorType::Rgb, 3, Some(SamplingFactor::R_4_4_4), 1);
}

#[test]
fn test_reference_encoder_4_2_0() {
    check(ColorType::Rgb, 3, Some(SamplingFactor::R_4_2_0), 2);
}

#[test]
fn test_reference_encoder_4_2_2() {
    check(ColorType::Rgb, 3, Some(SamplingFactor::R_4_2_2), 3);
}

#[test]
fn test_reference_encoder_grayscale() {
    check(ColorType::Luma, 1, None, 4);
}
