//! Test data generators for synthetic raster cubes.
//!
//! Generators build values in band-major order (band, then row, then
//! column) so expected values are easy to compute by hand;
//! [`interleave_cube`] lays them out in whichever physical order a test
//! needs.

/// Physical layout of a generated cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeLayout {
    /// Band interleaved by pixel
    Bip,
    /// Band interleaved by line
    Bil,
    /// Band sequential
    Bsq,
}

impl CubeLayout {
    pub const ALL: [CubeLayout; 3] = [CubeLayout::Bip, CubeLayout::Bil, CubeLayout::Bsq];

    /// Position of element (row, col, band) in a cube of this layout.
    pub fn index(&self, rows: usize, cols: usize, bands: usize, row: usize, col: usize, band: usize) -> usize {
        match self {
            Self::Bip => (row * cols + col) * bands + band,
            Self::Bil => (row * bands + band) * cols + col,
            Self::Bsq => (band * rows + row) * cols + col,
        }
    }
}

/// Creates a `u8` cube whose values count up in band-major order.
///
/// Element (row, col, band) holds `(band * rows * cols + row * cols + col) % 256`.
///
/// # Example
///
/// ```
/// use test_utils::create_band_major_cube;
///
/// let cube = create_band_major_cube(4, 4, 2);
/// assert_eq!(cube.len(), 32);
/// assert_eq!(cube[6], 6);   // band 0, row 1, col 2
/// assert_eq!(cube[16], 16); // band 1, row 0, col 0
/// ```
pub fn create_band_major_cube(rows: usize, cols: usize, bands: usize) -> Vec<u8> {
    (0..rows * cols * bands).map(|i| (i % 256) as u8).collect()
}

/// Creates an `f32` cube with value `band * 10000 + row * 100 + col`.
///
/// Values are returned in band-major order.
pub fn create_gradient_cube(rows: usize, cols: usize, bands: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(rows * cols * bands);
    for band in 0..bands {
        for row in 0..rows {
            for col in 0..cols {
                data.push((band * 10000 + row * 100 + col) as f32);
            }
        }
    }
    data
}

/// Creates an `f32` cube of deterministic pseudo-random values in
/// `[0, scale)`, band-major.
pub fn create_noise_cube(rows: usize, cols: usize, bands: usize, scale: f32, seed: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity(rows * cols * bands);
    for band in 0..bands {
        for row in 0..rows {
            for col in 0..cols {
                let hash = simple_hash(col as u32, (band * rows + row) as u32, seed);
                data.push((hash % 1_000_000) as f32 / 1_000_000.0 * scale);
            }
        }
    }
    data
}

/// Reorders band-major `values` into `layout`.
pub fn interleave_cube<T: Copy + Default>(
    values: &[T],
    rows: usize,
    cols: usize,
    bands: usize,
    layout: CubeLayout,
) -> Vec<T> {
    assert_eq!(values.len(), rows * cols * bands, "cube size mismatch");
    let mut out = vec![T::default(); values.len()];
    for band in 0..bands {
        for row in 0..rows {
            for col in 0..cols {
                let src = (band * rows + row) * cols + col;
                out[layout.index(rows, cols, bands, row, col, band)] = values[src];
            }
        }
    }
    out
}

/// Native-endian bytes of `values`.
pub fn to_bytes<T: bytemuck::Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Simple hash function for deterministic pseudo-random generation.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
