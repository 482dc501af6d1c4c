//! Windowed access to raster cubes larger than memory.
//!
//! A cube is rows × columns × bands of one encoding, stored band
//! interleaved by pixel (BIP), by line (BIL) or band sequential (BSQ). This
//! crate provides:
//!
//! - **Uniform cursors**: a [`DataAccessor`] walks rows and columns the same
//!   way whatever the physical layout
//! - **Pluggable paging**: [`RasterPager`] implementations supply pages from
//!   memory, memory-mapped files or any external source
//! - **Layout conversion**: BIP and BSQ views of any cube, synthesized on
//!   demand without caching
//! - **Parallel statistics**: per-band extremes, moments, percentiles and
//!   histograms that do not depend on the worker count
//!
//! # Architecture
//!
//! ```text
//! DataRequest
//!      │
//!      ▼
//! RasterElement::get_data_accessor(request)
//!      │
//!      ├─► polish + validate against RasterDataDescriptor
//!      │
//!      ├─► pick pager by interleave
//!      │         │
//!      │         ├─► native: primary pager (memory / mmap / external)
//!      │         │
//!      │         └─► other: ConvertToBip / ConvertToBsq over the primary
//!      │
//!      └─► get_page ──► DataAccessor ──► next_row / to_pixel ──► re-page
//!                            │
//!                            ▼
//!                  Statistics (one accessor per worker)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use raster_core::{
//!     ComplexComponent, DataRequest, DimensionDescriptor, EncodingType, InterleaveFormat,
//!     RasterConfig, RasterDataDescriptor, RasterElement,
//! };
//!
//! let descriptor = RasterDataDescriptor::new(512, 512, 4, EncodingType::Int2UBytes, InterleaveFormat::Bsq);
//! let element = RasterElement::new("scene.raw", descriptor, RasterConfig::from_env())?;
//!
//! // Walk band 2 pixel by pixel as BIP
//! let accessor = element.get_data_accessor(DataRequest::new().with_interleave(InterleaveFormat::Bip))?;
//! while accessor.is_valid() {
//!     for _ in 0..512 {
//!         let value = accessor.column_as_f64(2, ComplexComponent::Magnitude);
//!         // ...
//!         accessor.next_column();
//!     }
//!     accessor.next_row();
//! }
//!
//! let stats = element.statistics(DimensionDescriptor::new(2)).unwrap();
//! println!("mean = {}", stats.average(ComplexComponent::Magnitude));
//! ```

pub mod accessor;
pub mod config;
pub mod descriptor;
pub mod dimension;
pub mod element;
pub mod encoding;
pub mod error;
pub mod pager;
pub mod request;
pub mod statistics;
pub mod types;

// Re-export commonly used types at crate root
pub use accessor::DataAccessor;
pub use config::{RasterConfig, DEFAULT_HISTOGRAM_BINS};
pub use descriptor::{FileLayout, RasterDataDescriptor};
pub use dimension::DimensionDescriptor;
pub use element::{RasterElement, RawData, RawDataMut};
pub use error::{RasterError, Result};
pub use pager::{InMemoryPager, LeaseTracker, MemoryMappedPager, RasterPage, RasterPager};
pub use request::{DataRequest, RequestWindow, REQUEST_VERSION_FULL_ROWS, REQUEST_VERSION_WINDOWED};
pub use statistics::{percentile_to_raw, raw_to_percentile, Statistics, HISTOGRAM_BINS, NOT_COMPUTED, PERCENTILE_COUNT};
pub use types::{ComplexComponent, EncodingType, InterleaveFormat, ProcessingLocation};
