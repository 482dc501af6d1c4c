//! Chips: new elements holding a subset of another element's rows, columns
//! and bands.
//!
//! Data is copied in the chip's interleave with the widest copy the
//! selection allows:
//!
//! ```text
//! BIP  whole row      all bands, contiguous columns
//!      whole pixel    all bands, sparse columns
//!      element        otherwise
//! BIL  whole row      all columns, contiguous bands
//!      band segment   contiguous columns
//!      element        otherwise
//! BSQ  band row       contiguous columns
//!      element        otherwise
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::RasterElement;
use crate::accessor::DataAccessor;
use crate::dimension::{renumber_active, DimensionDescriptor};
use crate::error::{RasterError, Result};
use crate::request::DataRequest;
use crate::types::{InterleaveFormat, ProcessingLocation};

/// Active numbers of the selected source rows, columns and bands.
struct Selection {
    rows: Vec<usize>,
    columns: Vec<usize>,
    bands: Vec<usize>,
}

fn resolve_axis(name: &str, selected: &[DimensionDescriptor], count: usize) -> Result<Vec<usize>> {
    if selected.is_empty() {
        return Ok((0..count).collect());
    }

    let mut indices = Vec::with_capacity(selected.len());
    for dim in selected {
        let index = dim
            .active_number()
            .filter(|&index| index < count)
            .ok_or_else(|| RasterError::invalid_request(format!("{} {:?} is not an active {}", name, dim, name)))?;
        if indices.last().is_some_and(|&last| index <= last) {
            return Err(RasterError::invalid_request(format!(
                "selected {}s must be strictly increasing",
                name
            )));
        }
        indices.push(index);
    }
    Ok(indices)
}

fn is_run(indices: &[usize]) -> bool {
    indices.windows(2).all(|pair| pair[1] == pair[0] + 1)
}

/// Insert `suffix` before the extension of the last path component.
pub(crate) fn append_to_basename(name: &str, suffix: &str) -> String {
    let basename_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match name[basename_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = basename_start + dot;
            format!("{}{}{}", &name[..split], suffix, &name[split..])
        }
        _ => format!("{}{}", name, suffix),
    }
}

fn check_abort(abort: Option<&AtomicBool>) -> Result<()> {
    if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
        return Err(RasterError::Aborted);
    }
    Ok(())
}

fn slice_of<'a>(bytes: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| RasterError::invalid_request("source page shorter than chip selection"))
}

impl RasterElement {
    /// Create a chip of the selected dimensions and copy its data.
    ///
    /// Empty selections mean the whole axis. The chip is named after this
    /// element with `suffix` inserted before the extension. `abort` is
    /// polled once per row.
    pub fn create_chip(
        &self,
        suffix: &str,
        rows: &[DimensionDescriptor],
        columns: &[DimensionDescriptor],
        bands: &[DimensionDescriptor],
        abort: Option<&AtomicBool>,
    ) -> Result<RasterElement> {
        let selection = self.selection(rows, columns, bands)?;
        let name = append_to_basename(self.name(), suffix);
        self.build_chip(name, &selection, true, abort)
    }

    /// Create a chip of the selected dimensions without copying data.
    pub fn create_chip_empty(
        &self,
        suffix: &str,
        rows: &[DimensionDescriptor],
        columns: &[DimensionDescriptor],
        bands: &[DimensionDescriptor],
    ) -> Result<RasterElement> {
        let selection = self.selection(rows, columns, bands)?;
        let name = append_to_basename(self.name(), suffix);
        self.build_chip(name, &selection, false, None)
    }

    /// Copy the whole element under a new name.
    pub fn copy(&self, name: impl Into<String>) -> Result<RasterElement> {
        let selection = self.selection(&[], &[], &[])?;
        self.build_chip(name.into(), &selection, true, None)
    }

    fn selection(
        &self,
        rows: &[DimensionDescriptor],
        columns: &[DimensionDescriptor],
        bands: &[DimensionDescriptor],
    ) -> Result<Selection> {
        let descriptor = self.descriptor();
        Ok(Selection {
            rows: resolve_axis("row", rows, descriptor.row_count())?,
            columns: resolve_axis("column", columns, descriptor.column_count())?,
            bands: resolve_axis("band", bands, descriptor.band_count())?,
        })
    }

    fn build_chip(
        &self,
        name: String,
        selection: &Selection,
        copy_data: bool,
        abort: Option<&AtomicBool>,
    ) -> Result<RasterElement> {
        let source = self.descriptor();
        let pick = |dims: &[DimensionDescriptor], indices: &[usize]| -> Vec<DimensionDescriptor> {
            let mut picked: Vec<DimensionDescriptor> = indices.iter().map(|&i| dims[i]).collect();
            renumber_active(&mut picked);
            picked
        };

        let mut descriptor = source.clone();
        descriptor.set_dimensions(
            pick(source.rows(), &selection.rows),
            pick(source.columns(), &selection.columns),
            pick(source.bands(), &selection.bands),
        );
        descriptor.clear_file_layout();
        if descriptor.processing_location() == ProcessingLocation::OnDiskReadOnly {
            descriptor.set_processing_location(ProcessingLocation::OnDisk);
        }

        info!(
            source = %self.name(),
            chip = %name,
            extent = %descriptor.extent_string(),
            "creating chip"
        );

        let mut chip = RasterElement::new(name, descriptor, self.config().clone())?;
        if copy_data {
            match source.interleave() {
                InterleaveFormat::Bip => self.copy_bip(&mut chip, selection, abort)?,
                InterleaveFormat::Bil => self.copy_bil(&mut chip, selection, abort)?,
                InterleaveFormat::Bsq => self.copy_bsq(&mut chip, selection, abort)?,
            }
        }
        Ok(chip)
    }

    /// Native accessor over the bounding box of the selection.
    fn chip_source(&self, selection: &Selection, band_range: (usize, usize)) -> Result<DataAccessor> {
        let descriptor = self.descriptor();
        let dim = |d: Option<DimensionDescriptor>| d.ok_or_else(|| RasterError::invalid_request("empty chip selection"));

        let request = DataRequest::new()
            .with_rows(
                dim(selection.rows.first().and_then(|&r| descriptor.active_row(r)))?,
                dim(selection.rows.last().and_then(|&r| descriptor.active_row(r)))?,
                0,
            )
            .with_columns(
                dim(selection.columns.first().and_then(|&c| descriptor.active_column(c)))?,
                dim(selection.columns.last().and_then(|&c| descriptor.active_column(c)))?,
                0,
            )
            .with_bands(
                dim(descriptor.active_band(band_range.0))?,
                dim(descriptor.active_band(band_range.1))?,
                0,
            );
        self.get_data_accessor(request)
    }

    fn copy_bip(&self, chip: &mut RasterElement, selection: &Selection, abort: Option<&AtomicBool>) -> Result<()> {
        let elem = self.descriptor().bytes_per_element();
        let (first_band, last_band) = band_bounds(selection)?;
        let all_bands = selection.bands.len() == self.descriptor().band_count();
        let contiguous_columns = is_run(&selection.columns);
        let (columns, bands) = (selection.columns.len(), selection.bands.len());

        debug!(all_bands, contiguous_columns, "copying BIP chip");

        let source = self.chip_source(selection, (first_band, last_band))?;
        let dest = chip.get_data_accessor_mut(DataRequest::new().with_writable(true))?;

        for &row in &selection.rows {
            check_abort(abort)?;
            let mut out = dest.row_mut().ok_or(RasterError::ReadOnlyPage)?;

            if all_bands && contiguous_columns {
                source.to_pixel(row, selection.columns[0]);
                let len = columns * bands * elem;
                let src = source.column().ok_or_else(|| page_unavailable(row))?;
                out[..len].copy_from_slice(slice_of(&src, 0, len)?);
            } else if all_bands {
                let pixel = bands * elem;
                for (j, &column) in selection.columns.iter().enumerate() {
                    source.to_pixel(row, column);
                    let src = source.column().ok_or_else(|| page_unavailable(row))?;
                    out[j * pixel..(j + 1) * pixel].copy_from_slice(slice_of(&src, 0, pixel)?);
                }
            } else {
                for (j, &column) in selection.columns.iter().enumerate() {
                    source.to_pixel(row, column);
                    for (k, &band) in selection.bands.iter().enumerate() {
                        let dst = (j * bands + k) * elem;
                        let src = source.element(band - first_band).ok_or_else(|| page_unavailable(row))?;
                        out[dst..dst + elem].copy_from_slice(&src);
                    }
                }
            }

            drop(out);
            dest.next_row();
        }
        Ok(())
    }

    fn copy_bil(&self, chip: &mut RasterElement, selection: &Selection, abort: Option<&AtomicBool>) -> Result<()> {
        let elem = self.descriptor().bytes_per_element();
        let (first_band, last_band) = band_bounds(selection)?;
        let all_columns = selection.columns.len() == self.descriptor().column_count();
        let contiguous_columns = is_run(&selection.columns);
        let contiguous_bands = is_run(&selection.bands);
        let (columns, bands) = (selection.columns.len(), selection.bands.len());

        debug!(all_columns, contiguous_columns, contiguous_bands, "copying BIL chip");

        let source = self.chip_source(selection, (first_band, last_band))?;
        let band_size = source.band_size();
        let dest = chip.get_data_accessor_mut(DataRequest::new().with_writable(true))?;

        for &row in &selection.rows {
            check_abort(abort)?;
            let mut out = dest.row_mut().ok_or(RasterError::ReadOnlyPage)?;

            if all_columns && contiguous_bands {
                source.to_pixel(row, selection.columns[0]);
                let len = columns * bands * elem;
                let src = source.column().ok_or_else(|| page_unavailable(row))?;
                out[..len].copy_from_slice(slice_of(&src, 0, len)?);
            } else if contiguous_columns {
                source.to_pixel(row, selection.columns[0]);
                let segment = columns * elem;
                let src = source.column().ok_or_else(|| page_unavailable(row))?;
                for (k, &band) in selection.bands.iter().enumerate() {
                    let offset = (band - first_band) * band_size;
                    out[k * segment..(k + 1) * segment].copy_from_slice(slice_of(&src, offset, segment)?);
                }
            } else {
                for (j, &column) in selection.columns.iter().enumerate() {
                    source.to_pixel(row, column);
                    for (k, &band) in selection.bands.iter().enumerate() {
                        let dst = (k * columns + j) * elem;
                        let src = source.element(band - first_band).ok_or_else(|| page_unavailable(row))?;
                        out[dst..dst + elem].copy_from_slice(&src);
                    }
                }
            }

            drop(out);
            dest.next_row();
        }
        Ok(())
    }

    fn copy_bsq(&self, chip: &mut RasterElement, selection: &Selection, abort: Option<&AtomicBool>) -> Result<()> {
        let elem = self.descriptor().bytes_per_element();
        let contiguous_columns = is_run(&selection.columns);
        let columns = selection.columns.len();

        debug!(contiguous_columns, "copying BSQ chip");

        for (k, &band) in selection.bands.iter().enumerate() {
            let source = self.chip_source(selection, (band, band))?;
            let chip_band = chip.descriptor().active_band(k);
            let mut request = DataRequest::new().with_writable(true);
            request.set_bands(chip_band, chip_band, 1);
            let dest = chip.get_data_accessor_mut(request)?;

            for &row in &selection.rows {
                check_abort(abort)?;
                let mut out = dest.row_mut().ok_or(RasterError::ReadOnlyPage)?;

                if contiguous_columns {
                    source.to_pixel(row, selection.columns[0]);
                    let len = columns * elem;
                    let src = source.column().ok_or_else(|| page_unavailable(row))?;
                    out[..len].copy_from_slice(slice_of(&src, 0, len)?);
                } else {
                    for (j, &column) in selection.columns.iter().enumerate() {
                        source.to_pixel(row, column);
                        let src = source.element(0).ok_or_else(|| page_unavailable(row))?;
                        out[j * elem..(j + 1) * elem].copy_from_slice(&src);
                    }
                }

                drop(out);
                dest.next_row();
            }
        }
        Ok(())
    }
}

fn band_bounds(selection: &Selection) -> Result<(usize, usize)> {
    match (selection.bands.first(), selection.bands.last()) {
        (Some(&first), Some(&last)) => Ok((first, last)),
        _ => Err(RasterError::invalid_request("empty band selection")),
    }
}

fn page_unavailable(row: usize) -> RasterError {
    RasterError::PageUnavailable {
        row,
        column: 0,
        band: 0,
    }
}
