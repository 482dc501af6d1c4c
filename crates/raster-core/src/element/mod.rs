//! Raster elements: a descriptor plus the pagers that serve its data.
//!
//! The element resolves requests into accessors:
//!
//! ```text
//! DataRequest
//!      │
//!      ▼
//! RasterElement::get_data_accessor(request)
//!      │
//!      ├─► reject writes through a shared borrow
//!      ├─► polish + validate against the descriptor
//!      ├─► ensure a default pager (in memory / temp file / external)
//!      ├─► pick primary or conversion pager by interleave
//!      ├─► check the pager's request version
//!      │
//!      └─► get_page ──► DataAccessor
//! ```
//!
//! When an accessor runs off the end of its page it comes back through
//! [`increment_data_accessor`] for the next one.

mod chip;
mod raw;

pub use raw::{RawData, RawDataMut};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::accessor::{open_accessor, AccessorImpl, DataAccessor};
use crate::config::RasterConfig;
use crate::descriptor::RasterDataDescriptor;
use crate::dimension::DimensionDescriptor;
use crate::error::{RasterError, Result};
use crate::pager::convert::{ConvertToBipPager, ConvertToBsqPager};
use crate::pager::{InMemoryPager, MemoryMappedPager, RasterPager};
use crate::request::DataRequest;
use crate::statistics::Statistics;
use crate::types::{ComplexComponent, InterleaveFormat, ProcessingLocation};

#[derive(Default)]
struct PagerSet {
    primary: Option<Arc<dyn RasterPager>>,
    bip: Option<Arc<dyn RasterPager>>,
    bsq: Option<Arc<dyn RasterPager>>,
    temp_file: Option<NamedTempFile>,
}

/// State shared between an element and the statistics it hands out.
pub(crate) struct ElementInner {
    name: String,
    descriptor: Arc<RasterDataDescriptor>,
    config: RasterConfig,
    pagers: Mutex<PagerSet>,
    statistics: Mutex<BTreeMap<usize, Arc<Statistics>>>,
    modified: AtomicBool,
}

impl ElementInner {
    pub(crate) fn descriptor(&self) -> &Arc<RasterDataDescriptor> {
        &self.descriptor
    }

    pub(crate) fn config(&self) -> &RasterConfig {
        &self.config
    }

    fn lock_pagers(&self) -> Result<MutexGuard<'_, PagerSet>> {
        self.pagers
            .lock()
            .map_err(|_| RasterError::no_pager("pager lock poisoned"))
    }

    pub(crate) fn get_data_accessor(&self, mut request: DataRequest, allow_writable: bool) -> Result<DataAccessor> {
        if request.is_writable() && !allow_writable {
            debug!(element = %self.name, "writable request on a read-only element");
            return Err(RasterError::ReadOnlyElement);
        }

        if let Err(e) = request
            .polish(&self.descriptor)
            .and_then(|_| request.validate(&self.descriptor))
        {
            debug!(element = %self.name, error = %e, "request rejected");
            return Err(e);
        }

        let interleave = request
            .interleave()
            .unwrap_or_else(|| self.descriptor.interleave());
        let pager = self.resolve_pager(interleave)?;

        open_accessor(Arc::clone(&self.descriptor), pager, request)
    }

    fn resolve_pager(&self, interleave: InterleaveFormat) -> Result<Arc<dyn RasterPager>> {
        let mut pagers = self.lock_pagers()?;

        let primary = match pagers.primary.clone() {
            Some(primary) => primary,
            None => self.create_default_pager(&mut pagers)?,
        };

        let native = self.descriptor.interleave();
        if interleave == native {
            return Ok(primary);
        }

        let descriptor = Arc::clone(&self.descriptor);
        match interleave {
            InterleaveFormat::Bip => Ok(Arc::clone(pagers.bip.get_or_insert_with(|| {
                info!(element = %self.name, %native, "creating BIP conversion pager");
                let pager: Arc<dyn RasterPager> = Arc::new(ConvertToBipPager::new(descriptor, primary));
                pager
            }))),
            InterleaveFormat::Bsq => Ok(Arc::clone(pagers.bsq.get_or_insert_with(|| {
                info!(element = %self.name, %native, "creating BSQ conversion pager");
                let pager: Arc<dyn RasterPager> = Arc::new(ConvertToBsqPager::new(descriptor, primary));
                pager
            }))),
            InterleaveFormat::Bil => Err(RasterError::UnsupportedConversion {
                native,
                requested: interleave,
            }),
        }
    }

    fn create_default_pager(&self, pagers: &mut PagerSet) -> Result<Arc<dyn RasterPager>> {
        let pager: Arc<dyn RasterPager> = match self.descriptor.processing_location() {
            ProcessingLocation::InMemory => {
                info!(
                    element = %self.name,
                    bytes = self.descriptor.cube_size_bytes(),
                    "allocating in-memory cube"
                );
                Arc::new(InMemoryPager::new(Arc::clone(&self.descriptor)))
            }
            ProcessingLocation::OnDisk => {
                let builder = {
                    let mut builder = tempfile::Builder::new();
                    builder.prefix("raster-").suffix(".raw");
                    builder
                };
                let file = match &self.config.temp_dir {
                    Some(dir) => builder.tempfile_in(dir)?,
                    None => builder.tempfile()?,
                };
                let pager = MemoryMappedPager::from_temp_file(Arc::clone(&self.descriptor), file.as_file())?;
                info!(element = %self.name, path = %file.path().display(), "created temporary backing file");
                pagers.temp_file = Some(file);
                Arc::new(pager)
            }
            ProcessingLocation::OnDiskReadOnly => {
                return Err(RasterError::no_pager(format!(
                    "read-only element {} needs an external pager",
                    self.name
                )));
            }
        };

        pagers.primary = Some(Arc::clone(&pager));
        Ok(pager)
    }

    fn reset_statistics(&self) {
        if let Ok(statistics) = self.statistics.lock() {
            for stats in statistics.values() {
                stats.reset_all();
            }
        }
    }
}

/// Release the accessor's page and bind the next one for the same request.
///
/// Without `seek_row` the cursor continues at the row it advanced to;
/// with it the cursor jumps to that cube row. Rows past the cube, or a
/// pager that returns nothing, leave the accessor invalid. The request's
/// stop row does not end iteration.
pub(crate) fn increment_data_accessor(accessor: &mut AccessorImpl, seek_row: Option<usize>) {
    let next_row = seek_row.unwrap_or(accessor.accessor_row + accessor.current_row);
    accessor.release_page();

    let window = accessor.window;
    let descriptor = &accessor.descriptor;
    if next_row >= descriptor.row_count()
        || window.start_column >= descriptor.column_count()
        || window.start_band >= descriptor.band_count()
    {
        accessor.invalidate();
        return;
    }

    let (Some(row), Some(column), Some(band)) = (
        accessor.descriptor.active_row(next_row),
        accessor.request.start_column(),
        accessor.request.start_band(),
    ) else {
        accessor.invalidate();
        return;
    };

    match accessor.pager.get_page(&accessor.request, row, column, band) {
        Some(page) if window.writable && !page.is_writable() => {
            debug!(row = next_row, "pager returned a read-only page for a writable accessor");
            accessor.pager.release_page(page);
            accessor.invalidate();
        }
        Some(page) => accessor.attach_page(page, next_row),
        None => {
            debug!(row = next_row, "pager returned no page while advancing");
            accessor.invalidate();
        }
    }
}

/// A raster cube and the pagers that serve it.
///
/// Shared borrows hand out read-only accessors; writable accessors need
/// `&mut self`.
pub struct RasterElement {
    inner: Arc<ElementInner>,
}

impl RasterElement {
    /// Create an element. Its default pager is created on first access.
    pub fn new(name: impl Into<String>, descriptor: RasterDataDescriptor, config: RasterConfig) -> Result<Self> {
        config.validate().map_err(RasterError::ConfigError)?;
        let name = name.into();

        debug!(
            element = %name,
            extent = %descriptor.extent_string(),
            interleave = %descriptor.interleave(),
            location = ?descriptor.processing_location(),
            "creating raster element"
        );

        Ok(Self {
            inner: Arc::new(ElementInner {
                name,
                descriptor: Arc::new(descriptor),
                config,
                pagers: Mutex::new(PagerSet::default()),
                statistics: Mutex::new(BTreeMap::new()),
                modified: AtomicBool::new(false),
            }),
        })
    }

    /// Create an in-memory element over existing cube bytes in the
    /// descriptor's interleave.
    pub fn from_vec(
        name: impl Into<String>,
        descriptor: RasterDataDescriptor,
        data: Vec<u8>,
        config: RasterConfig,
    ) -> Result<Self> {
        let expected = descriptor.cube_size_bytes();
        let actual = data.len();
        let mut element = Self::new(name, descriptor, config)?;
        let pager = InMemoryPager::from_vec(Arc::clone(&element.inner.descriptor), data).ok_or_else(|| {
            RasterError::invalid_descriptor(format!("cube needs {} bytes, got {}", expected, actual))
        })?;
        element.set_pager(Arc::new(pager));
        Ok(element)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn descriptor(&self) -> &RasterDataDescriptor {
        &self.inner.descriptor
    }

    pub fn config(&self) -> &RasterConfig {
        &self.inner.config
    }

    /// Read-only accessor for `request`.
    pub fn get_data_accessor(&self, request: DataRequest) -> Result<DataAccessor> {
        self.inner.get_data_accessor(request, false)
    }

    /// Accessor that may write when `request` is writable.
    pub fn get_data_accessor_mut(&mut self, request: DataRequest) -> Result<DataAccessor> {
        self.inner.get_data_accessor(request, true)
    }

    /// Install an external primary pager, dropping any conversion pagers
    /// built on the previous one.
    pub fn set_pager(&mut self, pager: Arc<dyn RasterPager>) {
        let mut pagers = self
            .inner
            .pagers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pagers.primary = Some(pager);
        pagers.bip = None;
        pagers.bsq = None;
        drop(pagers);

        info!(element = %self.inner.name, "installed primary pager");
    }

    /// The primary pager, if one exists yet.
    pub fn pager(&self) -> Option<Arc<dyn RasterPager>> {
        self.inner.lock_pagers().ok()?.primary.clone()
    }

    /// Value at one pixel, or 0.0 when it cannot be read.
    pub fn pixel_value(
        &self,
        column: DimensionDescriptor,
        row: DimensionDescriptor,
        band: DimensionDescriptor,
        component: ComplexComponent,
    ) -> f64 {
        let request = DataRequest::new()
            .with_rows(row, row, 1)
            .with_columns(column, column, 1)
            .with_bands(band, band, 1);

        self.get_data_accessor(request)
            .ok()
            .and_then(|accessor| accessor.column_as_f64(0, component))
            .unwrap_or(0.0)
    }

    /// Mark the data changed and drop every cached statistic.
    pub fn update_data(&self) {
        self.inner.modified.store(true, Ordering::Release);
        self.inner.reset_statistics();
    }

    pub fn is_modified(&self) -> bool {
        self.inner.modified.load(Ordering::Acquire)
    }

    /// Statistics for `band`, created on first use.
    pub fn statistics(&self, band: DimensionDescriptor) -> Option<Arc<Statistics>> {
        let index = band.active_number()?;
        let band = self.inner.descriptor.active_band(index)?;
        let mut statistics = self.inner.statistics.lock().ok()?;
        let stats = statistics.entry(index).or_insert_with(|| {
            Arc::new(Statistics::new(
                Arc::downgrade(&self.inner),
                band,
                self.inner.descriptor.bad_values().to_vec(),
            ))
        });
        Some(Arc::clone(stats))
    }

    /// Path of the temporary backing file of an on-disk element.
    pub fn temporary_filename(&self) -> Option<PathBuf> {
        let pagers = self.inner.lock_pagers().ok()?;
        pagers.temp_file.as_ref().map(|file| file.path().to_path_buf())
    }
}

impl std::fmt::Debug for RasterElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterElement")
            .field("name", &self.inner.name)
            .field("extent", &self.inner.descriptor.extent_string())
            .field("interleave", &self.inner.descriptor.interleave())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncodingType;

    fn element(interleave: InterleaveFormat) -> RasterElement {
        let descriptor = RasterDataDescriptor::new(4, 3, 2, EncodingType::Int1UByte, interleave);
        let mut data = vec![0u8; descriptor.cube_size_bytes()];
        for row in 0..4 {
            for col in 0..3 {
                for band in 0..2 {
                    data[descriptor.element_offset(row, col, band)] = (band * 100 + row * 10 + col) as u8;
                }
            }
        }
        RasterElement::from_vec("cube", descriptor, data, RasterConfig::default()).unwrap()
    }

    #[test]
    fn test_read_only_borrow_rejects_writes() {
        let element = element(InterleaveFormat::Bip);
        let result = element.get_data_accessor(DataRequest::new().with_writable(true));
        assert!(matches!(result, Err(RasterError::ReadOnlyElement)));
    }

    #[test]
    fn test_bil_output_rejected() {
        let element = element(InterleaveFormat::Bip);
        let result = element.get_data_accessor(DataRequest::new().with_interleave(InterleaveFormat::Bil));
        assert!(matches!(result, Err(RasterError::UnsupportedConversion { .. })));
    }

    #[test]
    fn test_writable_conversion_rejected() {
        let mut element = element(InterleaveFormat::Bsq);
        let result = element.get_data_accessor_mut(
            DataRequest::new()
                .with_interleave(InterleaveFormat::Bip)
                .with_writable(true),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_writable_accessor_is_exclusive() {
        let mut element = element(InterleaveFormat::Bsq);
        let reader = element.get_data_accessor(DataRequest::new()).unwrap();
        let refused = element.get_data_accessor_mut(DataRequest::new().with_writable(true));
        assert!(matches!(refused, Err(RasterError::PageUnavailable { .. })));
        drop(reader);

        let writer = element
            .get_data_accessor_mut(DataRequest::new().with_writable(true))
            .unwrap();
        writer.row_mut().unwrap()[0] = 42;
        assert!(matches!(
            element.get_data_accessor(DataRequest::new()),
            Err(RasterError::PageUnavailable { .. })
        ));
        assert!(element
            .get_data_accessor(DataRequest::new().with_interleave(InterleaveFormat::Bip))
            .is_err());
        drop(writer);

        let reader = element.get_data_accessor(DataRequest::new()).unwrap();
        assert_eq!(reader.column_as_f64(0, ComplexComponent::Magnitude), Some(42.0));
    }

    #[test]
    fn test_iteration_continues_past_stop_row() {
        let descriptor = RasterDataDescriptor::new(10, 1, 1, EncodingType::Int1UByte, InterleaveFormat::Bip);
        let element = RasterElement::from_vec("tall", descriptor, (0..10).collect(), RasterConfig::default()).unwrap();

        let accessor = element
            .get_data_accessor(DataRequest::new().with_rows(DimensionDescriptor::new(2), DimensionDescriptor::new(3), 1))
            .unwrap();
        assert_eq!(accessor.column_as_f64(0, ComplexComponent::Magnitude), Some(2.0));
        accessor.next_row();
        accessor.next_row();
        assert!(accessor.is_valid());
        assert_eq!(accessor.current_row(), 4);
        assert_eq!(accessor.column_as_f64(0, ComplexComponent::Magnitude), Some(4.0));

        accessor.to_pixel(9, 0);
        assert_eq!(accessor.column_as_f64(0, ComplexComponent::Magnitude), Some(9.0));
        accessor.next_row();
        assert!(!accessor.is_valid());
    }

    #[test]
    fn test_pixel_value() {
        let element = element(InterleaveFormat::Bil);
        let value = element.pixel_value(
            DimensionDescriptor::new(2),
            DimensionDescriptor::new(3),
            DimensionDescriptor::new(1),
            ComplexComponent::Magnitude,
        );
        assert_eq!(value, 132.0);

        let missing = element.pixel_value(
            DimensionDescriptor::new(9),
            DimensionDescriptor::new(0),
            DimensionDescriptor::new(0),
            ComplexComponent::Magnitude,
        );
        assert_eq!(missing, 0.0);
    }

    #[test]
    fn test_read_only_location_needs_pager() {
        let descriptor = RasterDataDescriptor::new(2, 2, 1, EncodingType::Int1UByte, InterleaveFormat::Bip)
            .with_processing_location(ProcessingLocation::OnDiskReadOnly);
        let element = RasterElement::new("ro", descriptor, RasterConfig::default()).unwrap();
        assert!(matches!(
            element.get_data_accessor(DataRequest::new()),
            Err(RasterError::NoPager(_))
        ));
    }

    #[test]
    fn test_on_disk_element_uses_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = RasterDataDescriptor::new(3, 2, 1, EncodingType::Int2SBytes, InterleaveFormat::Bip)
            .with_processing_location(ProcessingLocation::OnDisk);
        let config = RasterConfig::default().with_temp_dir(dir.path());
        let mut element = RasterElement::new("disk", descriptor, config).unwrap();
        assert!(element.temporary_filename().is_none());

        let accessor = element
            .get_data_accessor_mut(DataRequest::new().with_writable(true))
            .unwrap();
        accessor.row_mut().unwrap()[0..2].copy_from_slice(&(-12i16).to_ne_bytes());
        drop(accessor);

        let path = element.temporary_filename().unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(
            element.pixel_value(
                DimensionDescriptor::new(0),
                DimensionDescriptor::new(0),
                DimensionDescriptor::new(0),
                ComplexComponent::Magnitude
            ),
            -12.0
        );

        drop(element);
        assert!(!path.exists());
    }

    #[test]
    fn test_set_pager_replaces_conversions() {
        let mut element = element(InterleaveFormat::Bsq);
        let accessor = element
            .get_data_accessor(DataRequest::new().with_interleave(InterleaveFormat::Bip))
            .unwrap();
        assert!(accessor.is_valid());
        drop(accessor);

        let descriptor = Arc::new(element.descriptor().clone());
        let replacement = Arc::new(InMemoryPager::new(descriptor));
        element.set_pager(replacement);

        let accessor = element
            .get_data_accessor(DataRequest::new().with_interleave(InterleaveFormat::Bip))
            .unwrap();
        assert_eq!(accessor.column_as_f64(1, ComplexComponent::Magnitude), Some(0.0));
    }
}
