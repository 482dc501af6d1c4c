//! Shared cursor over the pages of one request.
//!
//! A [`DataAccessor`] walks a request row by row and column by column. It
//! owns the request it was created from, the page currently bound and the
//! stride geometry derived from that page. Handle clones share one cursor;
//! the cursor releases its page when the last handle is dropped.
//!
//! Row, column and band strides per interleave:
//!
//! ```text
//! BIP  column = elem * bands          row = column * cols + interline
//! BIL  column = elem   band = elem * cols   row = elem * cols * bands + interline
//! BSQ  column = elem                  row = elem * cols + interline
//! ```
//!
//! When the cursor steps past the last row of its page, the owning element
//! releases the page and binds the next one for the same request.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use crate::descriptor::RasterDataDescriptor;
use crate::element::increment_data_accessor;
use crate::encoding::{value_reader, ValueReader};
use crate::error::{RasterError, Result};
use crate::pager::{PageBlock, RasterPage, RasterPager};
use crate::request::{DataRequest, RequestWindow};
use crate::types::{ComplexComponent, InterleaveFormat};

/// Cursor state behind a [`DataAccessor`] handle.
pub(crate) struct AccessorImpl {
    pub(crate) descriptor: Arc<RasterDataDescriptor>,
    pub(crate) pager: Arc<dyn RasterPager>,
    pub(crate) request: DataRequest,
    pub(crate) window: RequestWindow,
    page: Option<RasterPage>,
    reader: ValueReader,
    element_size: usize,
    /// Cube row of the first row in the current page.
    pub(crate) accessor_row: usize,
    /// Row within the current page.
    pub(crate) current_row: usize,
    /// Column relative to the request's start column.
    current_column: usize,
    row_offset: usize,
    column_offset: usize,
    row_size: usize,
    column_size: usize,
    band_size: usize,
    interline: usize,
    concurrent_rows: usize,
    valid: bool,
}

impl AccessorImpl {
    fn new(
        descriptor: Arc<RasterDataDescriptor>,
        pager: Arc<dyn RasterPager>,
        request: DataRequest,
        window: RequestWindow,
    ) -> Self {
        let element_size = descriptor.bytes_per_element();
        assert!(element_size > 0, "encoding has zero element size");
        let reader = value_reader(descriptor.encoding());

        Self {
            descriptor,
            pager,
            request,
            window,
            page: None,
            reader,
            element_size,
            accessor_row: window.start_row,
            current_row: 0,
            current_column: 0,
            row_offset: 0,
            column_offset: 0,
            row_size: 0,
            column_size: 0,
            band_size: 0,
            interline: 0,
            concurrent_rows: 0,
            valid: false,
        }
    }

    /// Bind `page` as the current page whose first row is `base_row`.
    pub(crate) fn attach_page(&mut self, page: RasterPage, base_row: usize) {
        assert!(page.rows() > 0, "pager returned a page with no rows");

        let columns = match page.columns() {
            0 => self.descriptor.column_count(),
            n => n,
        };
        let bands = match page.bands() {
            0 => self.descriptor.band_count(),
            n => n,
        };
        let elem = self.element_size;
        let interline = page.interline_bytes();

        let (column_size, band_size, row_bytes) = match self.window.interleave {
            InterleaveFormat::Bip => (elem * bands, elem, elem * bands * columns),
            InterleaveFormat::Bil => (elem, elem * columns, elem * columns * bands),
            InterleaveFormat::Bsq => (elem, 0, elem * columns),
        };

        self.column_size = column_size;
        self.band_size = band_size;
        self.row_size = row_bytes
            .checked_add(interline)
            .unwrap_or_else(|| panic!("row size overflows for {} columns", columns));
        self.interline = interline;
        self.concurrent_rows = page.rows();
        self.accessor_row = base_row;
        self.current_row = 0;
        self.current_column = 0;
        self.row_offset = 0;
        self.column_offset = 0;
        self.page = Some(page);
        self.valid = true;
    }

    /// Return the current page to its pager, if one is bound.
    pub(crate) fn release_page(&mut self) {
        if let Some(page) = self.page.take() {
            self.pager.release_page(page);
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    fn row_range(&self, len: usize) -> Option<(usize, usize)> {
        if !self.valid || self.row_offset >= len {
            return None;
        }
        let end = (self.row_offset + self.row_size - self.interline).min(len);
        Some((self.row_offset, end))
    }

    fn row_bytes(&self) -> Option<&[u8]> {
        let data = self.page.as_ref()?.data();
        let (start, end) = self.row_range(data.len())?;
        Some(&data[start..end])
    }

    fn row_bytes_mut(&mut self) -> Option<&mut [u8]> {
        if !self.window.writable {
            return None;
        }
        let len = self.page.as_ref()?.data().len();
        let (start, end) = self.row_range(len)?;
        let data = self.page.as_mut()?.data_mut()?;
        Some(&mut data[start..end])
    }

    fn column_start(&self, len: usize) -> Option<usize> {
        let start = self.row_offset + self.column_offset;
        (self.valid && start < len).then_some(start)
    }

    fn column_bytes(&self) -> Option<&[u8]> {
        let data = self.page.as_ref()?.data();
        let start = self.column_start(data.len())?;
        Some(&data[start..])
    }

    fn column_bytes_mut(&mut self) -> Option<&mut [u8]> {
        if !self.window.writable {
            return None;
        }
        let len = self.page.as_ref()?.data().len();
        let start = self.column_start(len)?;
        let data = self.page.as_mut()?.data_mut()?;
        Some(&mut data[start..])
    }

    fn element_bytes(&self, band_index: usize) -> Option<&[u8]> {
        if band_index >= self.window.concurrent_bands {
            return None;
        }
        let offset = band_index * self.band_size;
        let elem = self.element_size;
        self.column_bytes()
            .and_then(|column| column.get(offset..offset + elem))
    }

    fn value(&self, band_index: usize, component: ComplexComponent) -> Option<f64> {
        let bytes = self.element_bytes(band_index)?;
        Some((self.reader)(bytes, 0, component))
    }

    fn advance_rows(&mut self, count: usize) {
        if !self.valid {
            return;
        }
        self.current_row += count;
        self.row_offset = self.current_row * self.row_size;
        self.current_column = 0;
        self.column_offset = 0;
        if self.current_row >= self.concurrent_rows {
            increment_data_accessor(self, None);
        }
    }

    fn advance_columns(&mut self, count: usize) {
        self.current_column += count;
        self.column_offset = self.current_column * self.column_size;
    }

    fn seek(&mut self, row: usize, column: usize) {
        if column < self.window.start_column || column > self.window.stop_column {
            debug!(column, "seek outside requested columns");
            self.valid = false;
            return;
        }

        let in_page = self.page.is_some()
            && row >= self.accessor_row
            && row < self.accessor_row + self.concurrent_rows;
        if in_page {
            self.current_row = row - self.accessor_row;
            self.row_offset = self.current_row * self.row_size;
            self.valid = true;
        } else {
            increment_data_accessor(self, Some(row));
            if !self.valid {
                return;
            }
        }

        self.current_column = column - self.window.start_column;
        self.column_offset = self.current_column * self.column_size;
    }
}

impl Drop for AccessorImpl {
    fn drop(&mut self) {
        self.release_page();
    }
}

/// Shared handle to a cursor over one request.
///
/// Clones share the cursor: moving one moves all of them. Handles are not
/// `Send`; open one accessor per thread.
#[derive(Clone)]
pub struct DataAccessor(Rc<RefCell<AccessorImpl>>);

impl DataAccessor {
    /// True while the cursor is bound to a page.
    pub fn is_valid(&self) -> bool {
        self.0.borrow().valid
    }

    /// Bytes of the current row, starting at the request's first column.
    pub fn row(&self) -> Option<Ref<'_, [u8]>> {
        Ref::filter_map(self.0.borrow(), |imp| imp.row_bytes()).ok()
    }

    /// Mutable bytes of the current row. `None` unless the request is writable.
    pub fn row_mut(&self) -> Option<RefMut<'_, [u8]>> {
        RefMut::filter_map(self.0.borrow_mut(), |imp| imp.row_bytes_mut()).ok()
    }

    /// Bytes from the current column to the end of the page.
    pub fn column(&self) -> Option<Ref<'_, [u8]>> {
        Ref::filter_map(self.0.borrow(), |imp| imp.column_bytes()).ok()
    }

    /// Mutable bytes from the current column. `None` unless the request is writable.
    pub fn column_mut(&self) -> Option<RefMut<'_, [u8]>> {
        RefMut::filter_map(self.0.borrow_mut(), |imp| imp.column_bytes_mut()).ok()
    }

    /// Bytes of one element at the current column, `band_index` bands past
    /// the request's start band.
    pub fn element(&self, band_index: usize) -> Option<Ref<'_, [u8]>> {
        Ref::filter_map(self.0.borrow(), |imp| imp.element_bytes(band_index)).ok()
    }

    /// Value at the current column, `band_index` bands past the start band.
    pub fn column_as_f64(&self, band_index: usize, component: ComplexComponent) -> Option<f64> {
        self.0.borrow().value(band_index, component)
    }

    /// Value at the current column rounded to an integer.
    pub fn column_as_i64(&self, band_index: usize, component: ComplexComponent) -> Option<i64> {
        self.column_as_f64(band_index, component).map(|v| v.round() as i64)
    }

    pub fn next_row(&self) {
        self.0.borrow_mut().advance_rows(1);
    }

    pub fn next_rows(&self, count: usize) {
        self.0.borrow_mut().advance_rows(count);
    }

    pub fn next_column(&self) {
        self.0.borrow_mut().advance_columns(1);
    }

    pub fn next_columns(&self, count: usize) {
        self.0.borrow_mut().advance_columns(count);
    }

    /// Move back to the request's first column on the current row.
    pub fn reset_column(&self) {
        let mut imp = self.0.borrow_mut();
        imp.current_column = 0;
        imp.column_offset = 0;
    }

    /// Move to an absolute cube row and column, re-paging when the row is
    /// outside the current page.
    pub fn to_pixel(&self, row: usize, column: usize) {
        self.0.borrow_mut().seek(row, column);
    }

    /// Cube row under the cursor.
    pub fn current_row(&self) -> usize {
        let imp = self.0.borrow();
        imp.accessor_row + imp.current_row
    }

    /// Cube column under the cursor.
    pub fn current_column(&self) -> usize {
        let imp = self.0.borrow();
        imp.window.start_column + imp.current_column
    }

    /// Byte stride between rows, including padding.
    pub fn row_size(&self) -> usize {
        self.0.borrow().row_size
    }

    /// Byte stride between columns.
    pub fn column_size(&self) -> usize {
        self.0.borrow().column_size
    }

    /// Byte stride between bands of one column; 0 for BSQ.
    pub fn band_size(&self) -> usize {
        self.0.borrow().band_size
    }

    /// Rows held by the current page.
    pub fn concurrent_rows(&self) -> usize {
        self.0.borrow().concurrent_rows
    }

    /// Padding bytes after each row of the current page.
    pub fn interline_bytes(&self) -> usize {
        self.0.borrow().interline
    }

    /// Shared block behind the current page and the page's offset into it.
    pub(crate) fn page_block(&self) -> Option<(Arc<PageBlock>, usize)> {
        let imp = self.0.borrow();
        let (block, offset) = imp.page.as_ref()?.shared_block()?;
        Some((Arc::clone(block), offset))
    }

    pub fn concurrent_columns(&self) -> usize {
        self.0.borrow().window.concurrent_columns
    }

    pub fn concurrent_bands(&self) -> usize {
        self.0.borrow().window.concurrent_bands
    }

    pub fn interleave(&self) -> InterleaveFormat {
        self.0.borrow().window.interleave
    }

    pub fn is_writable(&self) -> bool {
        self.0.borrow().window.writable
    }

    /// The request this accessor consumed.
    pub fn window(&self) -> RequestWindow {
        self.0.borrow().window
    }

    /// Number of handles sharing this cursor.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl std::fmt::Debug for DataAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let imp = self.0.borrow();
        f.debug_struct("DataAccessor")
            .field("valid", &imp.valid)
            .field("row", &(imp.accessor_row + imp.current_row))
            .field("column", &(imp.window.start_column + imp.current_column))
            .field("interleave", &imp.window.interleave)
            .finish()
    }
}

/// Open an accessor for a polished, validated request served by `pager`.
pub(crate) fn open_accessor(
    descriptor: Arc<RasterDataDescriptor>,
    pager: Arc<dyn RasterPager>,
    request: DataRequest,
) -> Result<DataAccessor> {
    let window = request
        .window()
        .ok_or_else(|| RasterError::invalid_request("request was not polished"))?;

    let required = request.request_version(&descriptor);
    let supported = pager.supported_request_version();
    if supported < required {
        debug!(supported, required, "pager too old for request");
        return Err(RasterError::UnsupportedRequestVersion { supported, required });
    }

    let (Some(row), Some(column), Some(band)) = (
        descriptor.active_row(window.start_row),
        request.start_column(),
        request.start_band(),
    ) else {
        return Err(RasterError::invalid_request("request has inactive start dimensions"));
    };

    let page = pager
        .get_page(&request, row, column, band)
        .ok_or(RasterError::PageUnavailable {
            row: window.start_row,
            column: window.start_column,
            band: window.start_band,
        })?;

    if window.writable && !page.is_writable() {
        pager.release_page(page);
        return Err(RasterError::ReadOnlyPage);
    }

    let mut imp = AccessorImpl::new(descriptor, pager, request, window);
    imp.attach_page(page, window.start_row);
    Ok(DataAccessor(Rc::new(RefCell::new(imp))))
}
