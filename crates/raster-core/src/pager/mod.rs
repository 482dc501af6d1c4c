//! Page supply contract and built-in pagers.
//!
//! A pager hands out [`RasterPage`]s: a run of bytes starting at the first
//! requested element plus the geometry needed to walk it. The consumer gives
//! every page back through [`RasterPager::release_page`], which takes the page
//! by value so it can only be returned once.
//!
//! ```text
//! DataRequest ──► RasterPager::get_page(request, row, column, band)
//!                      │
//!                      ├─► InMemoryPager      (heap block, zero copy)
//!                      ├─► MemoryMappedPager  (temp or raw file, zero copy)
//!                      ├─► ConvertToBip/Bsq   (copied, crate-internal)
//!                      └─► external pagers    (any RasterPager impl)
//! ```

pub(crate) mod block;
pub(crate) mod convert;
pub mod mapped;
pub mod memory;

pub(crate) use block::PageBlock;
pub use mapped::MemoryMappedPager;
pub use memory::InMemoryPager;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::dimension::DimensionDescriptor;
use crate::request::DataRequest;

/// Supplies pages of cube data.
///
/// Implementations that are shared across threads must be internally
/// synchronized; callers add no locking around `get_page`.
pub trait RasterPager: Send + Sync {
    /// Page covering `request` starting at the given row, column and band.
    ///
    /// The page may hold fewer rows than the request's concurrency.
    fn get_page(
        &self,
        request: &DataRequest,
        start_row: DimensionDescriptor,
        start_column: DimensionDescriptor,
        start_band: DimensionDescriptor,
    ) -> Option<RasterPage>;

    /// Return a page obtained from `get_page`.
    fn release_page(&self, page: RasterPage);

    /// Highest request version this pager understands.
    fn supported_request_version(&self) -> u32;
}

enum PageData {
    Shared { block: Arc<PageBlock>, offset: usize },
    Owned(Vec<u8>),
}

/// A run of cube bytes handed out by a pager.
///
/// `columns` or `bands` of 0 mean the full extent of the cube.
pub struct RasterPage {
    data: PageData,
    rows: usize,
    columns: usize,
    bands: usize,
    interline_bytes: usize,
    writable: bool,
    id: u64,
}

impl RasterPage {
    /// Page over an owned buffer. Writes go to the buffer and are visible to
    /// the pager when the page is released.
    pub fn from_vec(data: Vec<u8>, rows: usize, columns: usize, bands: usize) -> Self {
        Self {
            data: PageData::Owned(data),
            rows,
            columns,
            bands,
            interline_bytes: 0,
            writable: false,
            id: 0,
        }
    }

    /// Page pointing into a shared block at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the block.
    pub(crate) fn from_block(block: Arc<PageBlock>, offset: usize, rows: usize, columns: usize, bands: usize) -> Self {
        assert!(offset <= block.len(), "page offset {} past block length {}", offset, block.len());
        Self {
            data: PageData::Shared { block, offset },
            rows,
            columns,
            bands,
            interline_bytes: 0,
            writable: false,
            id: 0,
        }
    }

    pub fn with_interline_bytes(mut self, interline_bytes: usize) -> Self {
        self.interline_bytes = interline_bytes;
        self
    }

    /// Mark the page writable. Shared pages are only writable when their
    /// block is.
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = match &self.data {
            PageData::Shared { block, .. } => writable && block.is_writable(),
            PageData::Owned(_) => writable,
        };
        self
    }

    /// Tag the page with a pager-chosen identifier.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn interline_bytes(&self) -> usize {
        self.interline_bytes
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bytes from the first requested element to the end of the backing.
    pub fn data(&self) -> &[u8] {
        match &self.data {
            PageData::Shared { block, offset } => &block.as_slice()[*offset..],
            PageData::Owned(data) => data,
        }
    }

    /// Mutable bytes, if the page is writable.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        if !self.writable {
            return None;
        }
        match &mut self.data {
            // SAFETY: shared pages come from a pager whose LeaseTracker
            // grants a writable lease only while no other page over the
            // block is out, so these bytes are not aliased.
            PageData::Shared { block, offset } => Some(unsafe {
                std::slice::from_raw_parts_mut(block.as_mut_ptr().add(*offset), block.len() - *offset)
            }),
            PageData::Owned(data) => Some(data.as_mut_slice()),
        }
    }

    /// The shared block and offset backing this page, if any.
    pub(crate) fn shared_block(&self) -> Option<(&Arc<PageBlock>, usize)> {
        match &self.data {
            PageData::Shared { block, offset } => Some((block, *offset)),
            PageData::Owned(_) => None,
        }
    }

    /// Consume the page and return its owned buffer, if it has one.
    pub fn into_vec(self) -> Option<Vec<u8>> {
        match self.data {
            PageData::Owned(data) => Some(data),
            PageData::Shared { .. } => None,
        }
    }
}

impl std::fmt::Debug for RasterPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterPage")
            .field("id", &self.id)
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("bands", &self.bands)
            .field("interline_bytes", &self.interline_bytes)
            .field("writable", &self.writable)
            .field("len", &self.data().len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Leases {
    readers: HashSet<u64>,
    writer: Option<u64>,
}

/// Bookkeeping of pages a pager has handed out and not yet received back.
///
/// Leases over one block are exclusive: a writable lease is granted only
/// while nothing else is out, and read leases are refused while a writable
/// one is.
#[derive(Debug, Default)]
pub struct LeaseTracker {
    next_id: AtomicU64,
    leased: Mutex<Leases>,
}

impl LeaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new lease and return its id, or `None` when it would
    /// overlap a writable lease.
    pub fn lease(&self, writable: bool) -> Option<u64> {
        let mut leases = self.leased.lock().ok()?;
        if leases.writer.is_some() || (writable && !leases.readers.is_empty()) {
            debug!(writable, readers = leases.readers.len(), "lease refused");
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if writable {
            leases.writer = Some(id);
        } else {
            leases.readers.insert(id);
        }
        Some(id)
    }

    /// Forget a lease. Returns false when `id` was not leased.
    pub fn release(&self, id: u64) -> bool {
        let Ok(mut leases) = self.leased.lock() else {
            return false;
        };
        if leases.writer == Some(id) {
            leases.writer = None;
            return true;
        }
        leases.readers.remove(&id)
    }

    /// Number of pages currently out.
    pub fn outstanding(&self) -> usize {
        self.leased
            .lock()
            .map(|leases| leases.readers.len() + usize::from(leases.writer.is_some()))
            .unwrap_or(0)
    }
}
