//! Declarative description of an access window.
//!
//! A [`DataRequest`] names the row, column and band ranges a caller wants to
//! iterate, how many of each should be resident at once, the interleave the
//! caller wants to see and whether it intends to write. Unset fields are
//! filled in by [`DataRequest::polish`] from the cube's descriptor; the
//! result is then checked by [`DataRequest::validate`].

use serde::{Deserialize, Serialize};

use crate::descriptor::RasterDataDescriptor;
use crate::dimension::DimensionDescriptor;
use crate::error::{RasterError, Result};
use crate::types::InterleaveFormat;

/// Request version for pagers that only serve whole rows.
pub const REQUEST_VERSION_FULL_ROWS: u32 = 1;

/// Request version for pagers that can window columns and bands.
pub const REQUEST_VERSION_WINDOWED: u32 = 2;

/// An access window over a cube.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    start_row: Option<DimensionDescriptor>,
    stop_row: Option<DimensionDescriptor>,
    concurrent_rows: Option<usize>,
    start_column: Option<DimensionDescriptor>,
    stop_column: Option<DimensionDescriptor>,
    concurrent_columns: Option<usize>,
    start_band: Option<DimensionDescriptor>,
    stop_band: Option<DimensionDescriptor>,
    concurrent_bands: Option<usize>,
    interleave: Option<InterleaveFormat>,
    writable: bool,
}

/// A polished request reduced to active numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestWindow {
    pub start_row: usize,
    pub stop_row: usize,
    pub concurrent_rows: usize,
    pub start_column: usize,
    pub stop_column: usize,
    pub concurrent_columns: usize,
    pub start_band: usize,
    pub stop_band: usize,
    pub concurrent_bands: usize,
    pub interleave: InterleaveFormat,
    pub writable: bool,
}

impl RequestWindow {
    pub fn row_span(&self) -> usize {
        self.stop_row - self.start_row + 1
    }

    pub fn column_span(&self) -> usize {
        self.stop_column - self.start_column + 1
    }

    pub fn band_span(&self) -> usize {
        self.stop_band - self.start_band + 1
    }
}

fn zero_as_unset(count: usize) -> Option<usize> {
    (count > 0).then_some(count)
}

impl DataRequest {
    /// An empty request; every field defaults on polish.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the row range. A concurrency of 0 leaves it to polish.
    pub fn with_rows(mut self, start: DimensionDescriptor, stop: DimensionDescriptor, concurrent: usize) -> Self {
        self.set_rows(Some(start), Some(stop), concurrent);
        self
    }

    /// Set the column range. A concurrency of 0 leaves it to polish.
    pub fn with_columns(mut self, start: DimensionDescriptor, stop: DimensionDescriptor, concurrent: usize) -> Self {
        self.set_columns(Some(start), Some(stop), concurrent);
        self
    }

    /// Set the band range. A concurrency of 0 leaves it to polish.
    pub fn with_bands(mut self, start: DimensionDescriptor, stop: DimensionDescriptor, concurrent: usize) -> Self {
        self.set_bands(Some(start), Some(stop), concurrent);
        self
    }

    pub fn with_interleave(mut self, interleave: InterleaveFormat) -> Self {
        self.interleave = Some(interleave);
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn set_rows(&mut self, start: Option<DimensionDescriptor>, stop: Option<DimensionDescriptor>, concurrent: usize) {
        self.start_row = start;
        self.stop_row = stop;
        self.concurrent_rows = zero_as_unset(concurrent);
    }

    pub fn set_columns(
        &mut self,
        start: Option<DimensionDescriptor>,
        stop: Option<DimensionDescriptor>,
        concurrent: usize,
    ) {
        self.start_column = start;
        self.stop_column = stop;
        self.concurrent_columns = zero_as_unset(concurrent);
    }

    pub fn set_bands(&mut self, start: Option<DimensionDescriptor>, stop: Option<DimensionDescriptor>, concurrent: usize) {
        self.start_band = start;
        self.stop_band = stop;
        self.concurrent_bands = zero_as_unset(concurrent);
    }

    pub fn set_interleave(&mut self, interleave: Option<InterleaveFormat>) {
        self.interleave = interleave;
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    pub fn start_row(&self) -> Option<DimensionDescriptor> {
        self.start_row
    }

    pub fn stop_row(&self) -> Option<DimensionDescriptor> {
        self.stop_row
    }

    pub fn concurrent_rows(&self) -> Option<usize> {
        self.concurrent_rows
    }

    pub fn start_column(&self) -> Option<DimensionDescriptor> {
        self.start_column
    }

    pub fn stop_column(&self) -> Option<DimensionDescriptor> {
        self.stop_column
    }

    pub fn concurrent_columns(&self) -> Option<usize> {
        self.concurrent_columns
    }

    pub fn start_band(&self) -> Option<DimensionDescriptor> {
        self.start_band
    }

    pub fn stop_band(&self) -> Option<DimensionDescriptor> {
        self.stop_band
    }

    pub fn concurrent_bands(&self) -> Option<usize> {
        self.concurrent_bands
    }

    pub fn interleave(&self) -> Option<InterleaveFormat> {
        self.interleave
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Fill every unset field from `descriptor`.
    ///
    /// Starts default to the first active dimension and stops to the last.
    /// For BSQ requests the stop band defaults to the start band and only one
    /// band is concurrent.
    pub fn polish(&mut self, descriptor: &RasterDataDescriptor) -> Result<()> {
        let interleave = *self.interleave.get_or_insert(descriptor.interleave());

        let first_row = descriptor.rows().first().copied();
        let last_row = descriptor.rows().last().copied();
        let first_column = descriptor.columns().first().copied();
        let last_column = descriptor.columns().last().copied();
        let first_band = descriptor.bands().first().copied();
        let last_band = descriptor.bands().last().copied();

        if first_row.is_none() || first_column.is_none() || first_band.is_none() {
            return Err(RasterError::invalid_request(format!(
                "cannot polish against an empty cube ({})",
                descriptor.extent_string()
            )));
        }

        self.start_row = self.start_row.or(first_row);
        self.stop_row = self.stop_row.or(last_row);
        self.start_column = self.start_column.or(first_column);
        self.stop_column = self.stop_column.or(last_column);
        self.start_band = self.start_band.or(first_band);
        self.stop_band = match interleave {
            InterleaveFormat::Bsq => self.stop_band.or(self.start_band),
            InterleaveFormat::Bip | InterleaveFormat::Bil => self.stop_band.or(last_band),
        };

        if self.concurrent_rows.is_none() {
            self.concurrent_rows = Some(1);
        }

        if self.concurrent_columns.is_none() {
            self.concurrent_columns = span(self.start_column, self.stop_column);
        }

        if self.concurrent_bands.is_none() {
            self.concurrent_bands = match interleave {
                InterleaveFormat::Bsq => Some(1),
                InterleaveFormat::Bip | InterleaveFormat::Bil => span(self.start_band, self.stop_band),
            };
        }

        Ok(())
    }

    /// Check a polished request against `descriptor`.
    pub fn validate(&self, descriptor: &RasterDataDescriptor) -> Result<()> {
        let window = self.window().ok_or_else(|| {
            RasterError::invalid_request("request has unset or inactive dimensions")
        })?;

        let cube = descriptor.extent_string();
        let check_axis = |name: &str, start: usize, stop: usize, concurrent: usize, count: usize| -> Result<()> {
            if stop >= count {
                return Err(RasterError::out_of_bounds(format!("{} {}..={}", name, start, stop), cube.clone()));
            }
            if start > stop {
                return Err(RasterError::invalid_request(format!(
                    "{} start {} is after stop {}",
                    name, start, stop
                )));
            }
            if concurrent == 0 || concurrent > stop - start + 1 {
                return Err(RasterError::invalid_request(format!(
                    "{} concurrency {} outside 1..={}",
                    name,
                    concurrent,
                    stop - start + 1
                )));
            }
            Ok(())
        };

        check_axis("row", window.start_row, window.stop_row, window.concurrent_rows, descriptor.row_count())?;
        check_axis(
            "column",
            window.start_column,
            window.stop_column,
            window.concurrent_columns,
            descriptor.column_count(),
        )?;
        check_axis(
            "band",
            window.start_band,
            window.stop_band,
            window.concurrent_bands,
            descriptor.band_count(),
        )?;

        if window.interleave == InterleaveFormat::Bsq
            && (window.concurrent_bands != 1 || window.start_band != window.stop_band)
        {
            return Err(RasterError::invalid_request(
                "BSQ requests must cover exactly one band",
            ));
        }

        Ok(())
    }

    /// Pager capability the request needs: full rows are version 1, column
    /// or band windows are version 2.
    pub fn request_version(&self, descriptor: &RasterDataDescriptor) -> u32 {
        let Some(window) = self.window() else {
            return REQUEST_VERSION_WINDOWED;
        };

        let full_columns = window.start_column == 0 && window.stop_column + 1 == descriptor.column_count();
        let full_bands = window.start_band == 0 && window.stop_band + 1 == descriptor.band_count();

        let full_rows = match window.interleave {
            InterleaveFormat::Bsq => full_columns,
            InterleaveFormat::Bip | InterleaveFormat::Bil => full_columns && full_bands,
        };

        if full_rows {
            REQUEST_VERSION_FULL_ROWS
        } else {
            REQUEST_VERSION_WINDOWED
        }
    }

    /// The request as active numbers, if every field is set.
    pub fn window(&self) -> Option<RequestWindow> {
        Some(RequestWindow {
            start_row: self.start_row?.active_number()?,
            stop_row: self.stop_row?.active_number()?,
            concurrent_rows: self.concurrent_rows?,
            start_column: self.start_column?.active_number()?,
            stop_column: self.stop_column?.active_number()?,
            concurrent_columns: self.concurrent_columns?,
            start_band: self.start_band?.active_number()?,
            stop_band: self.stop_band?.active_number()?,
            concurrent_bands: self.concurrent_bands?,
            interleave: self.interleave?,
            writable: self.writable,
        })
    }
}

fn span(start: Option<DimensionDescriptor>, stop: Option<DimensionDescriptor>) -> Option<usize> {
    let start = start?.active_number()?;
    let stop = stop?.active_number()?;
    Some(stop.saturating_sub(start) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncodingType;

    fn descriptor(interleave: InterleaveFormat) -> RasterDataDescriptor {
        RasterDataDescriptor::new(10, 8, 3, EncodingType::Int1UByte, interleave)
    }

    #[test]
    fn test_polish_defaults_bip() {
        let desc = descriptor(InterleaveFormat::Bip);
        let mut request = DataRequest::new();
        request.polish(&desc).unwrap();
        request.validate(&desc).unwrap();

        let window = request.window().unwrap();
        assert_eq!(window.start_row, 0);
        assert_eq!(window.stop_row, 9);
        assert_eq!(window.concurrent_rows, 1);
        assert_eq!(window.concurrent_columns, 8);
        assert_eq!(window.stop_band, 2);
        assert_eq!(window.concurrent_bands, 3);
        assert_eq!(window.interleave, InterleaveFormat::Bip);
        assert_eq!(request.request_version(&desc), REQUEST_VERSION_FULL_ROWS);
    }

    #[test]
    fn test_polish_defaults_bsq_single_band() {
        let desc = descriptor(InterleaveFormat::Bip);
        let mut request = DataRequest::new().with_interleave(InterleaveFormat::Bsq);
        request.set_bands(desc.active_band(1), None, 0);
        request.polish(&desc).unwrap();
        request.validate(&desc).unwrap();

        let window = request.window().unwrap();
        assert_eq!(window.start_band, 1);
        assert_eq!(window.stop_band, 1);
        assert_eq!(window.concurrent_bands, 1);
        assert_eq!(request.request_version(&desc), REQUEST_VERSION_FULL_ROWS);
    }

    #[test]
    fn test_validate_rejects_multi_band_bsq() {
        let desc = descriptor(InterleaveFormat::Bsq);
        let mut request = DataRequest::new()
            .with_bands(DimensionDescriptor::new(0), DimensionDescriptor::new(2), 1)
            .with_interleave(InterleaveFormat::Bsq);
        request.polish(&desc).unwrap();
        assert!(matches!(request.validate(&desc), Err(RasterError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_bounds_and_order() {
        let desc = descriptor(InterleaveFormat::Bip);

        let mut request = DataRequest::new().with_rows(DimensionDescriptor::new(3), DimensionDescriptor::new(12), 1);
        request.polish(&desc).unwrap();
        assert!(matches!(request.validate(&desc), Err(RasterError::OutOfBounds { .. })));

        let mut request = DataRequest::new().with_rows(DimensionDescriptor::new(5), DimensionDescriptor::new(2), 1);
        request.polish(&desc).unwrap();
        assert!(matches!(request.validate(&desc), Err(RasterError::InvalidRequest(_))));

        let mut request = DataRequest::new().with_rows(DimensionDescriptor::new(0), DimensionDescriptor::new(1), 3);
        request.polish(&desc).unwrap();
        assert!(request.validate(&desc).is_err());
    }

    #[test]
    fn test_validate_rejects_inactive_dimension() {
        let desc = descriptor(InterleaveFormat::Bip);
        let mut inactive = DimensionDescriptor::new(1);
        inactive.set_active_number(None);
        let mut request = DataRequest::new();
        request.set_columns(Some(inactive), None, 0);
        request.polish(&desc).unwrap();
        assert!(request.validate(&desc).is_err());
    }

    #[test]
    fn test_request_version_windowed() {
        let desc = descriptor(InterleaveFormat::Bil);
        let mut request = DataRequest::new().with_columns(DimensionDescriptor::new(2), DimensionDescriptor::new(5), 0);
        request.polish(&desc).unwrap();
        assert_eq!(request.window().unwrap().concurrent_columns, 4);
        assert_eq!(request.request_version(&desc), REQUEST_VERSION_WINDOWED);

        let mut request = DataRequest::new().with_bands(DimensionDescriptor::new(1), DimensionDescriptor::new(2), 0);
        request.polish(&desc).unwrap();
        assert_eq!(request.request_version(&desc), REQUEST_VERSION_WINDOWED);
    }
}
