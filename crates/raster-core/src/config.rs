//! Configuration for raster elements and the statistics engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of fine bins used by the first histogram pass.
pub const DEFAULT_HISTOGRAM_BINS: usize = 65536;

/// Configuration shared by an element, its pagers and its statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Worker threads used by the statistics engine.
    pub statistics_threads: usize,

    /// Directory for temporary backing files. `None` uses the system default.
    pub temp_dir: Option<PathBuf>,

    /// Fine bins used while building histograms and percentiles.
    pub histogram_bins: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            statistics_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            temp_dir: None,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

impl RasterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RASTER_STATISTICS_THREADS") {
            if let Ok(threads) = val.parse() {
                config.statistics_threads = threads;
            }
        }

        if let Ok(val) = std::env::var("RASTER_TEMP_DIR") {
            if !val.is_empty() {
                config.temp_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("RASTER_HISTOGRAM_BINS") {
            if let Ok(bins) = val.parse() {
                config.histogram_bins = bins;
            }
        }

        config
    }

    /// Builder-style override of the statistics thread count.
    pub fn with_statistics_threads(mut self, threads: usize) -> Self {
        self.statistics_threads = threads;
        self
    }

    /// Builder-style override of the temporary directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.statistics_threads == 0 {
            return Err("statistics_threads must be > 0".to_string());
        }

        if self.histogram_bins < 256 {
            return Err("histogram_bins must be >= 256".to_string());
        }

        if let Some(dir) = &self.temp_dir {
            if !dir.is_dir() {
                return Err(format!("temp_dir {} is not a directory", dir.display()));
            }
        }

        Ok(())
    }
}
