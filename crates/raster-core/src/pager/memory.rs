//! Pager over one contiguous heap block holding the whole cube.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{LeaseTracker, PageBlock, RasterPage, RasterPager};
use crate::descriptor::RasterDataDescriptor;
use crate::dimension::DimensionDescriptor;
use crate::request::{DataRequest, REQUEST_VERSION_WINDOWED};

/// Holds the cube in memory in the descriptor's interleave.
pub struct InMemoryPager {
    descriptor: Arc<RasterDataDescriptor>,
    block: Arc<PageBlock>,
    leases: LeaseTracker,
}

impl InMemoryPager {
    /// Allocate a zero-filled cube for `descriptor`.
    pub fn new(descriptor: Arc<RasterDataDescriptor>) -> Self {
        let block = Arc::new(PageBlock::zeroed(descriptor.cube_size_bytes()));
        Self {
            descriptor,
            block,
            leases: LeaseTracker::new(),
        }
    }

    /// Wrap existing cube bytes laid out in the descriptor's interleave.
    ///
    /// Returns `None` when `data` does not match the cube size.
    pub fn from_vec(descriptor: Arc<RasterDataDescriptor>, data: Vec<u8>) -> Option<Self> {
        if data.len() != descriptor.cube_size_bytes() {
            return None;
        }
        Some(Self {
            descriptor,
            block: Arc::new(PageBlock::from_vec(data)),
            leases: LeaseTracker::new(),
        })
    }

    /// Pages handed out and not yet released.
    pub fn leased_pages(&self) -> usize {
        self.leases.outstanding()
    }
}

impl RasterPager for InMemoryPager {
    fn get_page(
        &self,
        request: &DataRequest,
        start_row: DimensionDescriptor,
        start_column: DimensionDescriptor,
        start_band: DimensionDescriptor,
    ) -> Option<RasterPage> {
        let page = primary_page(&self.descriptor, &self.block, 0, 0, request, start_row, start_column, start_band)?;
        let id = self.leases.lease(page.is_writable())?;
        Some(page.with_id(id))
    }

    fn release_page(&self, page: RasterPage) {
        if !self.leases.release(page.id()) {
            warn!(page_id = page.id(), "released a page this pager did not lease");
        }
    }

    fn supported_request_version(&self) -> u32 {
        REQUEST_VERSION_WINDOWED
    }
}

/// Build a zero-copy page into `block` for a native-interleave request.
///
/// The page starts at `(start_row, start_column, start_band)` and covers
/// `min(concurrent rows, rows left in the cube)` rows with the full cube
/// extent.
#[allow(clippy::too_many_arguments)]
pub(crate) fn primary_page(
    descriptor: &RasterDataDescriptor,
    block: &Arc<PageBlock>,
    header_bytes: usize,
    interline_bytes: usize,
    request: &DataRequest,
    start_row: DimensionDescriptor,
    start_column: DimensionDescriptor,
    start_band: DimensionDescriptor,
) -> Option<RasterPage> {
    let window = request.window()?;
    if window.interleave != descriptor.interleave() {
        debug!(
            requested = %window.interleave,
            native = %descriptor.interleave(),
            "primary pager cannot serve a converted interleave"
        );
        return None;
    }
    if window.writable && !block.is_writable() {
        debug!("writable page requested from a read-only block");
        return None;
    }

    let row = start_row.active_number()?;
    let column = start_column.active_number()?;
    let band = start_band.active_number()?;
    if row >= descriptor.row_count() {
        return None;
    }

    let rows = window.concurrent_rows.min(descriptor.row_count() - row);
    let offset = header_bytes + descriptor.line_offset(row, column, band, interline_bytes);
    if offset >= block.len() {
        debug!(offset, len = block.len(), "page offset past end of block");
        return None;
    }

    Some(
        RasterPage::from_block(Arc::clone(block), offset, rows, 0, 0)
            .with_interline_bytes(interline_bytes)
            .with_writable(window.writable),
    )
}
