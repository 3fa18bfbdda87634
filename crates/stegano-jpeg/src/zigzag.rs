//! Zig-zag ordering of the 64 coefficients of a block.
//!
//! Quantization tables and the coefficient buffer store values in zig-zag
//! order, the order they appear in the entropy-coded data.

/// Zig-zag index → natural (row-major) index.
pub const ZIGZAG_TO_NATURAL: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Natural (row-major) index → zig-zag index.
pub const NATURAL_TO_ZIGZAG: [usize; 64] = [
    0, 1, 5, 6, 14, 15, 27, 28, 2, 4, 7, 13, 16, 26, 29, 42, 3, 8, 12, 17, 25, 30, 41, 43, 9, 11,
    18, 24, 31, 40, 44, 53, 10, 19, 23, 32, 39, 45, 52, 54, 20, 22, 33, 38, 46, 51, 55, 60, 21, 34,
    37, 47, 50, 56, 59, 61, 35, 36, 48, 49, 57, 58, 62, 63,
];

/// Reorder a zig-zag block into row-major order.
pub fn to_natural_order<T: Copy + Default>(zigzag: &[T]) -> [T; 64] {
    let mut natural = [T::default(); 64];
    for (k, &value) in zigzag.iter().take(64).enumerate() {
        natural[ZIGZAG_TO_NATURAL[k]] = value;
    }
    natural
}

/// Reorder a row-major block into zig-zag order.
pub fn to_zigzag_order<T: Copy + Default>(natural: &[T]) -> [T; 64] {
    let mut zigzag = [T::default(); 64];
    for (i, &value) in natural.iter().take(64).enumerate() {
        zigzag[NATURAL_TO_ZIGZAG[i]] = value;
    }
    zigzag
}
