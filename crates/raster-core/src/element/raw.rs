//! Whole-cube byte access and bulk writes.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

use super::RasterElement;
use crate::accessor::DataAccessor;
use crate::dimension::DimensionDescriptor;
use crate::error::{RasterError, Result};
use crate::pager::PageBlock;
use crate::request::DataRequest;
use crate::types::{EncodingType, InterleaveFormat, ProcessingLocation};

/// The whole-cube page and the accessor that keeps it leased.
struct WholeCube {
    _lease: DataAccessor,
    block: Arc<PageBlock>,
    offset: usize,
    len: usize,
}

/// Read-only view of a whole in-memory cube.
///
/// The view holds a read lease on the cube, so no writable accessor can be
/// opened while it lives.
pub struct RawData<'a> {
    cube: WholeCube,
    _element: PhantomData<&'a RasterElement>,
}

impl Deref for RawData<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.cube.block.as_slice()[self.cube.offset..self.cube.offset + self.cube.len]
    }
}

/// Mutable view of a whole in-memory cube.
///
/// The view holds the cube's writable lease and borrows the element
/// exclusively.
pub struct RawDataMut<'a> {
    cube: WholeCube,
    _element: PhantomData<&'a mut RasterElement>,
}

impl Deref for RawDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.cube.block.as_slice()[self.cube.offset..self.cube.offset + self.cube.len]
    }
}

impl DerefMut for RawDataMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: the block is writable and `cube._lease` holds the pager's
        // writable lease, which is only granted while no other page over the
        // block is out. The returned slice borrows `self` mutably.
        unsafe { std::slice::from_raw_parts_mut(self.cube.block.as_mut_ptr().add(self.cube.offset), self.cube.len) }
    }
}

/// Byte index of `(row, column, band)` in a compact sub-cube.
fn sub_cube_index(
    interleave: InterleaveFormat,
    (rows, columns, bands): (usize, usize, usize),
    row: usize,
    column: usize,
    band: usize,
) -> usize {
    match interleave {
        InterleaveFormat::Bip => (row * columns + column) * bands + band,
        InterleaveFormat::Bil => (row * bands + band) * columns + column,
        InterleaveFormat::Bsq => (band * rows + row) * columns + column,
    }
}

impl RasterElement {
    fn whole_cube(&self, writable: bool) -> Option<WholeCube> {
        let descriptor = self.descriptor();
        if descriptor.processing_location() != ProcessingLocation::InMemory {
            return None;
        }

        let rows = descriptor.row_count();
        let request = DataRequest::new()
            .with_rows(descriptor.active_row(0)?, descriptor.active_row(rows.checked_sub(1)?)?, rows)
            .with_writable(writable);
        let accessor = match self.inner.get_data_accessor(request, writable) {
            Ok(accessor) => accessor,
            Err(e) => {
                debug!(element = %self.name(), error = %e, "whole-cube page unavailable");
                return None;
            }
        };
        if accessor.concurrent_rows() != rows || accessor.interline_bytes() != 0 {
            debug!(element = %self.name(), "pager does not hold the whole cube in one page");
            return None;
        }

        let (block, offset) = accessor.page_block()?;
        let len = descriptor.cube_size_bytes();
        if offset + len > block.len() || (writable && !block.is_writable()) {
            return None;
        }
        Some(WholeCube {
            _lease: accessor,
            block,
            offset,
            len,
        })
    }

    /// The whole cube as contiguous bytes in its native interleave.
    ///
    /// Only available for in-memory elements whose pager serves the cube
    /// from one unpadded block, and not while a writable accessor is open.
    pub fn raw_data(&self) -> Option<RawData<'_>> {
        let cube = self.whole_cube(false)?;
        Some(RawData {
            cube,
            _element: PhantomData,
        })
    }

    /// Mutable form of [`raw_data`](Self::raw_data).
    ///
    /// `None` while any other accessor on the cube is open.
    pub fn raw_data_mut(&mut self) -> Option<RawDataMut<'_>> {
        let cube = self.whole_cube(true)?;
        Some(RawDataMut {
            cube,
            _element: PhantomData,
        })
    }

    /// Write a sub-cube given in `interleave` into the element.
    ///
    /// `data` holds `num_rows × num_columns × num_bands` elements starting at
    /// the given active row, column and band.
    #[allow(clippy::too_many_arguments)]
    pub fn write_raw_data(
        &mut self,
        data: &[u8],
        interleave: InterleaveFormat,
        start_row: usize,
        num_rows: usize,
        start_column: usize,
        num_columns: usize,
        start_band: usize,
        num_bands: usize,
    ) -> Result<()> {
        let elem = self.descriptor().bytes_per_element();
        let expected = num_rows * num_columns * num_bands * elem;
        if num_rows == 0 || num_columns == 0 || num_bands == 0 || data.len() != expected {
            return Err(RasterError::invalid_request(format!(
                "sub-cube of {}x{}x{} needs {} bytes, got {}",
                num_rows,
                num_columns,
                num_bands,
                expected,
                data.len()
            )));
        }

        let descriptor = self.descriptor();
        let dim = |dims: Option<DimensionDescriptor>, what: &str| {
            dims.ok_or_else(|| RasterError::out_of_bounds(what.to_string(), descriptor.extent_string()))
        };
        let first_row = dim(descriptor.active_row(start_row), "start row")?;
        let last_row = dim(descriptor.active_row(start_row + num_rows - 1), "stop row")?;
        let first_column = dim(descriptor.active_column(start_column), "start column")?;
        let last_column = dim(descriptor.active_column(start_column + num_columns - 1), "stop column")?;
        let bands: Vec<DimensionDescriptor> = (start_band..start_band + num_bands)
            .map(|band| dim(descriptor.active_band(band), "band"))
            .collect::<Result<_>>()?;

        // BSQ requests cover one band, so write one pass per band.
        let passes: Vec<(usize, usize)> = match descriptor.interleave() {
            InterleaveFormat::Bsq => (0..num_bands).map(|b| (b, b)).collect(),
            InterleaveFormat::Bip | InterleaveFormat::Bil => vec![(0, num_bands - 1)],
        };
        let shape = (num_rows, num_columns, num_bands);

        for (first, last) in passes {
            let request = DataRequest::new()
                .with_rows(first_row, last_row, 0)
                .with_columns(first_column, last_column, 0)
                .with_bands(bands[first], bands[last], 0)
                .with_writable(true);
            let accessor = self.get_data_accessor_mut(request)?;
            let column_size = accessor.column_size();
            let band_size = accessor.band_size();

            for row in 0..num_rows {
                let mut bytes = accessor.row_mut().ok_or(RasterError::ReadOnlyPage)?;
                for column in 0..num_columns {
                    for band in first..=last {
                        let src = sub_cube_index(interleave, shape, row, column, band) * elem;
                        let dst = column * column_size + (band - first) * band_size;
                        bytes[dst..dst + elem].copy_from_slice(&data[src..src + elem]);
                    }
                }
                drop(bytes);
                accessor.next_row();
            }
        }

        self.update_data();
        Ok(())
    }

    /// Replace NaN and infinite values of a float cube with `value`.
    ///
    /// Returns how many values were replaced. Integer cubes are untouched.
    pub fn sanitize_data(&mut self, value: f64) -> Result<usize> {
        let encoding = self.descriptor().encoding();
        if !encoding.is_float() {
            return Ok(0);
        }

        let band_count = self.descriptor().band_count();
        let passes: Vec<Option<usize>> = match self.descriptor().interleave() {
            InterleaveFormat::Bsq => (0..band_count).map(Some).collect(),
            InterleaveFormat::Bip | InterleaveFormat::Bil => vec![None],
        };

        let mut replaced = 0;
        for band in passes {
            let mut request = DataRequest::new().with_writable(true);
            if let Some(band) = band {
                let band = self.descriptor().active_band(band);
                request.set_bands(band, band, 1);
            }
            let accessor = self.get_data_accessor_mut(request)?;

            while accessor.is_valid() {
                let mut bytes = accessor.row_mut().ok_or(RasterError::ReadOnlyPage)?;
                replaced += match encoding {
                    EncodingType::Flt8Bytes => sanitize_row::<8>(&mut bytes, value),
                    _ => sanitize_row::<4>(&mut bytes, value),
                };
                drop(bytes);
                accessor.next_row();
            }
        }

        if replaced > 0 {
            debug!(element = %self.name(), replaced, "sanitized non-finite values");
            self.update_data();
        }
        Ok(replaced)
    }
}

/// Replace non-finite floats of width `N` in `bytes`.
fn sanitize_row<const N: usize>(bytes: &mut [u8], value: f64) -> usize {
    let mut replaced = 0;
    for chunk in bytes.chunks_exact_mut(N) {
        let finite = match N {
            8 => bytemuck::pod_read_unaligned::<f64>(chunk).is_finite(),
            _ => bytemuck::pod_read_unaligned::<f32>(chunk).is_finite(),
        };
        if !finite {
            match N {
                8 => chunk.copy_from_slice(&value.to_ne_bytes()),
                _ => chunk.copy_from_slice(&(value as f32).to_ne_bytes()),
            }
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RasterConfig;
    use crate::descriptor::RasterDataDescriptor;
    use crate::types::ComplexComponent;

    fn pixel(element: &RasterElement, row: usize, column: usize, band: usize) -> f64 {
        element.pixel_value(
            DimensionDescriptor::new(column),
            DimensionDescriptor::new(row),
            DimensionDescriptor::new(band),
            ComplexComponent::Magnitude,
        )
    }

    #[test]
    fn test_raw_data_covers_cube() {
        for interleave in [InterleaveFormat::Bip, InterleaveFormat::Bil, InterleaveFormat::Bsq] {
            let descriptor = RasterDataDescriptor::new(3, 2, 2, EncodingType::Int1UByte, interleave);
            let data: Vec<u8> = (0..12).collect();
            let mut element = RasterElement::from_vec("raw", descriptor, data.clone(), RasterConfig::default()).unwrap();
            assert_eq!(&*element.raw_data().unwrap(), data.as_slice());

            element.raw_data_mut().unwrap()[5] = 99;
            assert_eq!(element.raw_data().unwrap()[5], 99);
        }
    }

    #[test]
    fn test_raw_data_excludes_open_accessors() {
        let descriptor = RasterDataDescriptor::new(2, 2, 1, EncodingType::Int1UByte, InterleaveFormat::Bip);
        let mut element = RasterElement::from_vec("lease", descriptor, vec![1, 2, 3, 4], RasterConfig::default()).unwrap();

        let reader = element.get_data_accessor(DataRequest::new()).unwrap();
        assert!(element.raw_data_mut().is_none());
        assert_eq!(element.raw_data().unwrap()[0], 1);
        drop(reader);

        let writer = element
            .get_data_accessor_mut(DataRequest::new().with_writable(true))
            .unwrap();
        assert!(element.raw_data().is_none());
        drop(writer);

        let mut raw = element.raw_data_mut().unwrap();
        raw[0] = 7;
        drop(raw);
        assert_eq!(element.raw_data().unwrap()[0], 7);
    }

    #[test]
    fn test_raw_data_unavailable_on_disk() {
        let descriptor = RasterDataDescriptor::new(2, 2, 1, EncodingType::Int1UByte, InterleaveFormat::Bip)
            .with_processing_location(ProcessingLocation::OnDisk);
        let element = RasterElement::new("disk", descriptor, RasterConfig::default()).unwrap();
        assert!(element.raw_data().is_none());
    }

    #[test]
    fn test_write_raw_data_across_interleaves() {
        // 2x2x2 sub-cube in BSQ: value = band * 100 + row * 10 + column
        let mut source = Vec::new();
        for band in 0..2u8 {
            for row in 0..2u8 {
                for column in 0..2u8 {
                    source.push(band * 100 + row * 10 + column);
                }
            }
        }

        for native in [InterleaveFormat::Bip, InterleaveFormat::Bil, InterleaveFormat::Bsq] {
            let descriptor = RasterDataDescriptor::new(4, 4, 3, EncodingType::Int1UByte, native);
            let mut element = RasterElement::new("write", descriptor, RasterConfig::default()).unwrap();
            element
                .write_raw_data(&source, InterleaveFormat::Bsq, 1, 2, 2, 2, 1, 2)
                .unwrap();

            assert_eq!(pixel(&element, 1, 2, 1), 0.0);
            assert_eq!(pixel(&element, 2, 3, 2), 111.0);
            assert_eq!(pixel(&element, 1, 3, 1), 1.0);
            assert_eq!(pixel(&element, 2, 2, 2), 110.0);
            assert_eq!(pixel(&element, 0, 0, 0), 0.0);
            assert!(element.is_modified());
        }
    }

    #[test]
    fn test_write_raw_data_size_mismatch() {
        let descriptor = RasterDataDescriptor::new(2, 2, 1, EncodingType::Int1UByte, InterleaveFormat::Bip);
        let mut element = RasterElement::new("write", descriptor, RasterConfig::default()).unwrap();
        assert!(element
            .write_raw_data(&[1, 2, 3], InterleaveFormat::Bip, 0, 2, 0, 2, 0, 1)
            .is_err());
    }

    #[test]
    fn test_sanitize_data() {
        let values = [1.0f32, f32::NAN, f32::INFINITY, 4.0, f32::NEG_INFINITY, 6.0];
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let descriptor = RasterDataDescriptor::new(3, 1, 2, EncodingType::Flt4Bytes, InterleaveFormat::Bsq);
        let mut element = RasterElement::from_vec("nan", descriptor, data, RasterConfig::default()).unwrap();

        assert_eq!(element.sanitize_data(-1.0).unwrap(), 3);
        assert_eq!(pixel(&element, 1, 0, 0), -1.0);
        assert_eq!(pixel(&element, 2, 0, 0), -1.0);
        assert_eq!(pixel(&element, 1, 0, 1), -1.0);
        assert_eq!(pixel(&element, 2, 0, 1), 6.0);
        assert_eq!(element.sanitize_data(-1.0).unwrap(), 0);
    }

    #[test]
    fn test_sanitize_integer_noop() {
        let descriptor = RasterDataDescriptor::new(1, 1, 1, EncodingType::Int2UBytes, InterleaveFormat::Bip);
        let mut element = RasterElement::new("int", descriptor, RasterConfig::default()).unwrap();
        assert_eq!(element.sanitize_data(0.0).unwrap(), 0);
    }
}
