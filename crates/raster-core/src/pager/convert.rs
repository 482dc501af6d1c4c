//! Pagers that synthesize BIP or BSQ pages from another layout.
//!
//! Both read the primary pager through ordinary accessors, one sub-request at
//! a time, and copy into a compact owned buffer. Nothing is cached: every
//! `get_page` recomputes. Output pages are never writable.

use std::sync::Arc;
use tracing::debug;

use super::{LeaseTracker, RasterPage, RasterPager};
use crate::accessor::{open_accessor, DataAccessor};
use crate::descriptor::RasterDataDescriptor;
use crate::dimension::DimensionDescriptor;
use crate::request::{DataRequest, RequestWindow, REQUEST_VERSION_WINDOWED};
use crate::types::InterleaveFormat;

/// Window a conversion page covers.
struct Block {
    row: usize,
    rows: usize,
    start_column: DimensionDescriptor,
    stop_column: DimensionDescriptor,
    columns: usize,
}

fn conversion_block(
    descriptor: &RasterDataDescriptor,
    request: &DataRequest,
    output: InterleaveFormat,
    start_row: DimensionDescriptor,
    start_column: DimensionDescriptor,
) -> Option<(RequestWindow, Block)> {
    let window = request.window()?;
    if window.interleave != output {
        debug!(requested = %window.interleave, %output, "conversion pager asked for another interleave");
        return None;
    }
    if window.writable {
        debug!("conversion pages cannot be written");
        return None;
    }

    let row = start_row.active_number()?;
    let first_column = start_column.active_number()?;
    if row >= descriptor.row_count() || first_column > window.stop_column {
        return None;
    }

    let block = Block {
        row,
        rows: window.concurrent_rows.min(descriptor.row_count() - row),
        start_column,
        stop_column: request.stop_column()?,
        columns: window.stop_column - first_column + 1,
    };
    Some((window, block))
}

fn open_sub_request(
    descriptor: &Arc<RasterDataDescriptor>,
    primary: &Arc<dyn RasterPager>,
    mut request: DataRequest,
) -> Option<DataAccessor> {
    if let Err(e) = request.polish(descriptor).and_then(|_| request.validate(descriptor)) {
        debug!(error = %e, "conversion sub-request rejected");
        return None;
    }
    match open_accessor(Arc::clone(descriptor), Arc::clone(primary), request) {
        Ok(accessor) => Some(accessor),
        Err(e) => {
            debug!(error = %e, "conversion sub-request failed");
            None
        }
    }
}

/// Produces BIP pages from a BSQ or BIL primary pager.
pub(crate) struct ConvertToBipPager {
    descriptor: Arc<RasterDataDescriptor>,
    primary: Arc<dyn RasterPager>,
    leases: LeaseTracker,
}

impl ConvertToBipPager {
    pub(crate) fn new(descriptor: Arc<RasterDataDescriptor>, primary: Arc<dyn RasterPager>) -> Self {
        Self {
            descriptor,
            primary,
            leases: LeaseTracker::new(),
        }
    }
}

impl RasterPager for ConvertToBipPager {
    fn get_page(
        &self,
        request: &DataRequest,
        start_row: DimensionDescriptor,
        start_column: DimensionDescriptor,
        start_band: DimensionDescriptor,
    ) -> Option<RasterPage> {
        let (window, block) =
            conversion_block(&self.descriptor, request, InterleaveFormat::Bip, start_row, start_column)?;
        let first_band = start_band.active_number()?;
        if first_band > window.stop_band {
            return None;
        }
        let bands = window.stop_band - first_band + 1;
        let elem = self.descriptor.bytes_per_element();
        let mut data = vec![0u8; block.rows * block.columns * bands * elem];

        for band_index in 0..bands {
            let band = self.descriptor.active_band(first_band + band_index)?;
            let sub = DataRequest::new()
                .with_rows(
                    self.descriptor.active_row(block.row)?,
                    self.descriptor.active_row(block.row + block.rows - 1)?,
                    block.rows,
                )
                .with_columns(block.start_column, block.stop_column, block.columns)
                .with_bands(band, band, 1)
                .with_interleave(self.descriptor.interleave());
            let accessor = open_sub_request(&self.descriptor, &self.primary, sub)?;

            for row in 0..block.rows {
                for column in 0..block.columns {
                    let dst = ((row * block.columns + column) * bands + band_index) * elem;
                    data[dst..dst + elem].copy_from_slice(&accessor.element(0)?);
                    accessor.next_column();
                }
                accessor.next_row();
            }
        }

        let id = self.leases.lease(false)?;
        Some(RasterPage::from_vec(data, block.rows, block.columns, bands).with_id(id))
    }

    fn release_page(&self, page: RasterPage) {
        self.leases.release(page.id());
    }

    fn supported_request_version(&self) -> u32 {
        self.primary.supported_request_version().min(REQUEST_VERSION_WINDOWED)
    }
}

/// Produces BSQ pages from a BIP or BIL primary pager.
pub(crate) struct ConvertToBsqPager {
    descriptor: Arc<RasterDataDescriptor>,
    primary: Arc<dyn RasterPager>,
    leases: LeaseTracker,
}

impl ConvertToBsqPager {
    pub(crate) fn new(descriptor: Arc<RasterDataDescriptor>, primary: Arc<dyn RasterPager>) -> Self {
        Self {
            descriptor,
            primary,
            leases: LeaseTracker::new(),
        }
    }
}

impl RasterPager for ConvertToBsqPager {
    fn get_page(
        &self,
        request: &DataRequest,
        start_row: DimensionDescriptor,
        start_column: DimensionDescriptor,
        start_band: DimensionDescriptor,
    ) -> Option<RasterPage> {
        let (_, block) =
            conversion_block(&self.descriptor, request, InterleaveFormat::Bsq, start_row, start_column)?;
        let band = self.descriptor.active_band(start_band.active_number()?)?;
        let elem = self.descriptor.bytes_per_element();
        let mut data = vec![0u8; block.rows * block.columns * elem];

        for row in 0..block.rows {
            let cube_row = self.descriptor.active_row(block.row + row)?;
            let sub = DataRequest::new()
                .with_rows(cube_row, cube_row, 1)
                .with_columns(block.start_column, block.stop_column, block.columns)
                .with_bands(band, band, 1)
                .with_interleave(self.descriptor.interleave());
            let accessor = open_sub_request(&self.descriptor, &self.primary, sub)?;

            for column in 0..block.columns {
                let dst = (row * block.columns + column) * elem;
                data[dst..dst + elem].copy_from_slice(&accessor.element(0)?);
                accessor.next_column();
            }
        }

        let id = self.leases.lease(false)?;
        Some(RasterPage::from_vec(data, block.rows, block.columns, 1).with_id(id))
    }

    fn release_page(&self, page: RasterPage) {
        self.leases.release(page.id());
    }

    fn supported_request_version(&self) -> u32 {
        self.primary.supported_request_version().min(REQUEST_VERSION_WINDOWED)
    }
}
