//! Geometry and encoding metadata of a raster cube.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::dimension::{generate_dimensions, DimensionDescriptor};
use crate::error::{RasterError, Result};
use crate::types::{EncodingType, InterleaveFormat, ProcessingLocation};

/// Layout of an existing raw file backing a cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLayout {
    /// Path of the raw file.
    pub filename: PathBuf,
    /// Bytes to skip at the start of the file.
    pub header_bytes: usize,
    /// Padding bytes after every physical line.
    pub interline_bytes: usize,
}

/// Metadata describing the shape, encoding and storage of a cube.
///
/// Rows, columns and bands are stored as dimension vectors indexed by
/// active number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterDataDescriptor {
    rows: Vec<DimensionDescriptor>,
    columns: Vec<DimensionDescriptor>,
    bands: Vec<DimensionDescriptor>,
    encoding: EncodingType,
    interleave: InterleaveFormat,
    bad_values: Vec<i32>,
    processing_location: ProcessingLocation,
    file_layout: Option<FileLayout>,
}

impl RasterDataDescriptor {
    /// Create a descriptor for a `rows × columns × bands` cube numbered from zero.
    pub fn new(
        rows: usize,
        columns: usize,
        bands: usize,
        encoding: EncodingType,
        interleave: InterleaveFormat,
    ) -> Self {
        Self {
            rows: generate_dimensions(rows),
            columns: generate_dimensions(columns),
            bands: generate_dimensions(bands),
            encoding,
            interleave,
            bad_values: Vec::new(),
            processing_location: ProcessingLocation::InMemory,
            file_layout: None,
        }
    }

    /// Create a descriptor from explicit dimension vectors.
    ///
    /// Active numbers must be `0..len` in order on every axis.
    pub fn from_dimensions(
        rows: Vec<DimensionDescriptor>,
        columns: Vec<DimensionDescriptor>,
        bands: Vec<DimensionDescriptor>,
        encoding: EncodingType,
        interleave: InterleaveFormat,
    ) -> Result<Self> {
        for (axis, dims) in [("row", &rows), ("column", &columns), ("band", &bands)] {
            for (index, dim) in dims.iter().enumerate() {
                if dim.active_number() != Some(index) {
                    return Err(RasterError::invalid_descriptor(format!(
                        "{} {} has active number {:?}",
                        axis,
                        index,
                        dim.active_number()
                    )));
                }
            }
        }

        Ok(Self {
            rows,
            columns,
            bands,
            encoding,
            interleave,
            bad_values: Vec::new(),
            processing_location: ProcessingLocation::InMemory,
            file_layout: None,
        })
    }

    /// Set the processing location.
    pub fn with_processing_location(mut self, location: ProcessingLocation) -> Self {
        self.processing_location = location;
        self
    }

    /// Set the bad values.
    pub fn with_bad_values(mut self, bad_values: Vec<i32>) -> Self {
        self.set_bad_values(bad_values);
        self
    }

    /// Set the file layout of an existing raw file.
    pub fn with_file_layout(mut self, layout: FileLayout) -> Self {
        self.file_layout = Some(layout);
        self
    }

    pub fn rows(&self) -> &[DimensionDescriptor] {
        &self.rows
    }

    pub fn columns(&self) -> &[DimensionDescriptor] {
        &self.columns
    }

    pub fn bands(&self) -> &[DimensionDescriptor] {
        &self.bands
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Row with the given active number.
    pub fn active_row(&self, index: usize) -> Option<DimensionDescriptor> {
        self.rows.get(index).copied()
    }

    /// Column with the given active number.
    pub fn active_column(&self, index: usize) -> Option<DimensionDescriptor> {
        self.columns.get(index).copied()
    }

    /// Band with the given active number.
    pub fn active_band(&self, index: usize) -> Option<DimensionDescriptor> {
        self.bands.get(index).copied()
    }

    /// Row with the given original number.
    pub fn original_row(&self, number: usize) -> Option<DimensionDescriptor> {
        self.rows.iter().find(|d| d.original_number() == Some(number)).copied()
    }

    /// Column with the given original number.
    pub fn original_column(&self, number: usize) -> Option<DimensionDescriptor> {
        self.columns.iter().find(|d| d.original_number() == Some(number)).copied()
    }

    /// Band with the given original number.
    pub fn original_band(&self, number: usize) -> Option<DimensionDescriptor> {
        self.bands.iter().find(|d| d.original_number() == Some(number)).copied()
    }

    pub fn encoding(&self) -> EncodingType {
        self.encoding
    }

    pub fn bytes_per_element(&self) -> usize {
        self.encoding.bytes_per_element()
    }

    pub fn interleave(&self) -> InterleaveFormat {
        self.interleave
    }

    /// Bad values, sorted ascending.
    pub fn bad_values(&self) -> &[i32] {
        &self.bad_values
    }

    /// Replace the bad values. Duplicates are dropped.
    pub fn set_bad_values(&mut self, mut bad_values: Vec<i32>) {
        bad_values.sort_unstable();
        bad_values.dedup();
        self.bad_values = bad_values;
    }

    pub fn processing_location(&self) -> ProcessingLocation {
        self.processing_location
    }

    pub fn set_processing_location(&mut self, location: ProcessingLocation) {
        self.processing_location = location;
    }

    pub fn file_layout(&self) -> Option<&FileLayout> {
        self.file_layout.as_ref()
    }

    pub(crate) fn set_dimensions(
        &mut self,
        rows: Vec<DimensionDescriptor>,
        columns: Vec<DimensionDescriptor>,
        bands: Vec<DimensionDescriptor>,
    ) {
        self.rows = rows;
        self.columns = columns;
        self.bands = bands;
    }

    pub(crate) fn clear_file_layout(&mut self) {
        self.file_layout = None;
    }

    /// Interline padding of the backing store.
    pub fn interline_bytes(&self) -> usize {
        self.file_layout.as_ref().map_or(0, |l| l.interline_bytes)
    }

    /// Size of the cube in bytes without header or padding.
    pub fn cube_size_bytes(&self) -> usize {
        self.row_count() * self.column_count() * self.band_count() * self.bytes_per_element()
    }

    /// Number of padded lines in the native interleave. A BIL line holds
    /// every band of one row.
    pub fn physical_line_count(&self) -> usize {
        match self.interleave {
            InterleaveFormat::Bip | InterleaveFormat::Bil => self.row_count(),
            InterleaveFormat::Bsq => self.row_count() * self.band_count(),
        }
    }

    /// Bytes in one line, excluding padding.
    pub fn physical_line_bytes(&self) -> usize {
        let elem = self.bytes_per_element();
        match self.interleave {
            InterleaveFormat::Bip | InterleaveFormat::Bil => self.column_count() * self.band_count() * elem,
            InterleaveFormat::Bsq => self.column_count() * elem,
        }
    }

    /// Bytes of a backing store with `interline` padding after every line.
    pub fn padded_size_bytes(&self, interline: usize) -> usize {
        self.physical_line_count() * (self.physical_line_bytes() + interline)
    }

    /// Byte offset of `(row, column, band)` in the native interleave with
    /// `interline` padding after every line.
    pub fn line_offset(&self, row: usize, column: usize, band: usize, interline: usize) -> usize {
        let elem = self.bytes_per_element();
        let (rows, cols, bands) = (self.row_count(), self.column_count(), self.band_count());
        let stride = self.physical_line_bytes() + interline;
        match self.interleave {
            InterleaveFormat::Bip => row * stride + (column * bands + band) * elem,
            InterleaveFormat::Bil => row * stride + (band * cols + column) * elem,
            InterleaveFormat::Bsq => (band * rows + row) * stride + column * elem,
        }
    }

    /// Compact byte offset of `(row, column, band)` in the native interleave.
    pub fn element_offset(&self, row: usize, column: usize, band: usize) -> usize {
        self.line_offset(row, column, band, 0)
    }

    /// Human-readable extent used in error messages.
    pub fn extent_string(&self) -> String {
        format!(
            "{} rows x {} columns x {} bands",
            self.row_count(),
            self.column_count(),
            self.band_count()
        )
    }
}
