//! Pager over a memory-mapped file.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::memory::primary_page;
use super::{LeaseTracker, PageBlock, RasterPage, RasterPager};
use crate::descriptor::RasterDataDescriptor;
use crate::dimension::DimensionDescriptor;
use crate::error::{RasterError, Result};
use crate::request::{DataRequest, REQUEST_VERSION_WINDOWED};

/// Serves pages straight out of a file mapping.
///
/// The file is either a temporary backing file sized to the cube or an
/// existing raw file with header bytes and per-line padding.
pub struct MemoryMappedPager {
    descriptor: Arc<RasterDataDescriptor>,
    block: Arc<PageBlock>,
    header_bytes: usize,
    interline_bytes: usize,
    leases: LeaseTracker,
}

impl MemoryMappedPager {
    /// Size `file` to the cube and map it writable.
    pub fn from_temp_file(descriptor: Arc<RasterDataDescriptor>, file: &File) -> Result<Self> {
        let size = descriptor.cube_size_bytes();
        if size == 0 {
            return Err(RasterError::invalid_descriptor("cannot back an empty cube with a file"));
        }
        file.set_len(size as u64)?;
        let block = PageBlock::map_file(file, true)?;

        info!(bytes = size, "mapped temporary backing file");

        Ok(Self {
            descriptor,
            block: Arc::new(block),
            header_bytes: 0,
            interline_bytes: 0,
            leases: LeaseTracker::new(),
        })
    }

    /// Map an existing raw file laid out per the descriptor's file layout.
    pub fn open(descriptor: Arc<RasterDataDescriptor>, writable: bool) -> Result<Self> {
        let layout = descriptor
            .file_layout()
            .cloned()
            .ok_or_else(|| RasterError::invalid_descriptor("descriptor has no file layout"))?;

        let file = open_file(&layout.filename, writable)?;
        let required = layout.header_bytes
            + descriptor
                .padded_size_bytes(layout.interline_bytes)
                .saturating_sub(layout.interline_bytes);
        let actual = file.metadata()?.len() as usize;
        if actual < required {
            warn!(
                file = %layout.filename.display(),
                actual,
                required,
                "raw file is shorter than its layout"
            );
            return Err(RasterError::storage_error(format!(
                "{} holds {} bytes, layout needs {}",
                layout.filename.display(),
                actual,
                required
            )));
        }

        let block = PageBlock::map_file(&file, writable)?;
        info!(
            file = %layout.filename.display(),
            header = layout.header_bytes,
            interline = layout.interline_bytes,
            writable,
            "mapped raw file"
        );

        Ok(Self {
            descriptor,
            block: Arc::new(block),
            header_bytes: layout.header_bytes,
            interline_bytes: layout.interline_bytes,
            leases: LeaseTracker::new(),
        })
    }

    pub fn is_writable(&self) -> bool {
        self.block.is_writable()
    }

    /// Pages handed out and not yet released.
    pub fn leased_pages(&self) -> usize {
        self.leases.outstanding()
    }

    /// Flush writable mappings to disk.
    pub fn flush(&self) -> Result<()> {
        self.block.flush()
    }
}

fn open_file(path: &Path, writable: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(writable)
        .open(path)
        .map_err(|e| RasterError::storage_error(format!("cannot open {}: {}", path.display(), e)))
}

impl RasterPager for MemoryMappedPager {
    fn get_page(
        &self,
        request: &DataRequest,
        start_row: DimensionDescriptor,
        start_column: DimensionDescriptor,
        start_band: DimensionDescriptor,
    ) -> Option<RasterPage> {
        if request.is_writable() && !self.block.is_writable() {
            debug!("read-only mapping refused a writable request");
            return None;
        }
        let page = primary_page(
            &self.descriptor,
            &self.block,
            self.header_bytes,
            self.interline_bytes,
            request,
            start_row,
            start_column,
            start_band,
        )?;
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
