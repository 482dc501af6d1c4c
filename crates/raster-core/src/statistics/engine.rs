//! Two-phase parallel scan of one band.
//!
//! ```text
//! rows ──► contiguous ranges, one per worker (each opens its own accessor)
//!
//! phase 1: per-row Moments ──► folded in row order ──► min / max / mean / stddev
//!                                    │
//!                                 barrier
//!                                    ▼
//! phase 2: fine bin counts per worker ──► summed ──► histogram + percentiles
//! ```
//!
//! Row partials are folded in row order, so the floating point results do
//! not depend on the worker count.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use super::histogram::{bin_centers, downsample, fine_bin, percentiles, to_bin_factor};
use crate::accessor::DataAccessor;
use crate::dimension::DimensionDescriptor;
use crate::element::ElementInner;
use crate::encoding::round_to_i32;
use crate::error::{RasterError, Result};
use crate::request::DataRequest;
use crate::types::{ComplexComponent, InterleaveFormat};

/// Running count, extremes and power sums of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Moments {
    pub count: u64,
    pub minimum: f64,
    pub maximum: f64,
    pub sum: f64,
    pub sum_squared: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            count: 0,
            minimum: f64::MAX,
            maximum: f64::MIN,
            sum: 0.0,
            sum_squared: 0.0,
        }
    }
}

impl Moments {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
        self.sum += value;
        self.sum_squared += value * value;
    }

    pub fn merge(&mut self, other: &Moments) {
        if other.count == 0 {
            return;
        }
        self.count += other.count;
        self.minimum = self.minimum.min(other.minimum);
        self.maximum = self.maximum.max(other.maximum);
        self.sum += other.sum;
        self.sum_squared += other.sum_squared;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Sample standard deviation; 0 for a single sample.
    pub fn standard_deviation(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => {
                let n = n as f64;
                let numerator = (n * self.sum_squared - self.sum * self.sum).max(0.0);
                Some((numerator / n / (n - 1.0)).sqrt())
            }
        }
    }
}

/// Everything a scan needs, borrowed from the statistics and its element.
pub(crate) struct ScanParameters<'a> {
    pub element: &'a ElementInner,
    pub band: usize,
    pub component: ComplexComponent,
    pub resolution: usize,
    pub bad_values: &'a [i32],
    pub threads: usize,
    pub fine_bins: usize,
    pub abort: Option<&'a AtomicBool>,
}

/// Results of a completed scan.
#[derive(Debug, Clone)]
pub(crate) struct ScanResult {
    pub minimum: f64,
    pub maximum: f64,
    pub average: f64,
    pub standard_deviation: f64,
    pub percentiles: Vec<f64>,
    pub bin_centers: Vec<f64>,
    pub bin_counts: Vec<u32>,
    pub samples: u64,
}

impl ScanParameters<'_> {
    fn is_bad(&self, value: f64) -> bool {
        !self.bad_values.is_empty() && self.bad_values.binary_search(&round_to_i32(value)).is_ok()
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(RasterError::Aborted);
        }
        Ok(())
    }

    fn worker_ranges(&self, rows: usize) -> Vec<Range<usize>> {
        let workers = self.threads.clamp(1, rows.max(1));
        let base = rows / workers;
        let extra = rows % workers;

        let mut start = 0;
        (0..workers)
            .map(|worker| {
                let len = base + usize::from(worker < extra);
                let range = start..start + len;
                start += len;
                range
            })
            .collect()
    }

    /// Accessor over `rows` of the band: native for BIP, BSQ otherwise.
    fn open(&self, rows: &Range<usize>) -> Result<(DataAccessor, usize)> {
        let descriptor = self.element.descriptor();
        let dim = |d: Option<DimensionDescriptor>| d.ok_or_else(|| RasterError::statistics_error("band geometry changed"));
        let first_row = dim(descriptor.active_row(rows.start))?;
        let last_row = dim(descriptor.active_row(rows.end - 1))?;

        let request = DataRequest::new().with_rows(first_row, last_row, 0);
        let (request, band_index) = if descriptor.interleave() == InterleaveFormat::Bip {
            let first_band = dim(descriptor.active_band(0))?;
            let last_band = dim(descriptor.active_band(descriptor.band_count() - 1))?;
            (
                request.with_bands(first_band, last_band, descriptor.band_count()),
                self.band,
            )
        } else {
            let band = dim(descriptor.active_band(self.band))?;
            (
                request.with_bands(band, band, 1).with_interleave(InterleaveFormat::Bsq),
                0,
            )
        };

        let accessor = self.element.get_data_accessor(request, false)?;
        Ok((accessor, band_index))
    }

    /// Visit every sampled, non-bad value of `rows` in row-major order.
    fn scan_rows(&self, rows: Range<usize>, mut visit: impl FnMut(usize, f64)) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let columns = self.element.descriptor().column_count();
        let (accessor, band_index) = self.open(&rows)?;

        for row in rows {
            self.check_abort()?;

            let offset = (row * columns) % self.resolution;
            let mut column = (self.resolution - offset) % self.resolution;
            if column >= columns {
                continue;
            }

            accessor.to_pixel(row, column);
            while column < columns {
                let value = accessor
                    .column_as_f64(band_index, self.component)
                    .ok_or(RasterError::PageUnavailable {
                        row,
                        column,
                        band: self.band,
                    })?;
                if !self.is_bad(value) {
                    visit(row, value);
                }
                column += self.resolution;
                accessor.next_columns(self.resolution);
            }
        }
        Ok(())
    }

    fn run_workers<T, F>(&self, ranges: Vec<Range<usize>>, work: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(Range<usize>) -> Result<T> + Send + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ranges.len())
            .thread_name(|i| format!("raster-stats-{}", i))
            .build()
            .map_err(|e| RasterError::statistics_error(e.to_string()))?;
        pool.install(|| ranges.into_par_iter().map(work).collect())
    }

    /// Phase 1: fold per-row moments in row order.
    fn moments(&self) -> Result<Moments> {
        let rows = self.element.descriptor().row_count();
        let partials = self.run_workers(self.worker_ranges(rows), |range| {
            let first = range.start;
            let mut per_row = vec![Moments::default(); range.len()];
            self.scan_rows(range, |row, value| per_row[row - first].add(value))?;
            Ok(per_row)
        })?;

        let mut total = Moments::default();
        for row in partials.iter().flatten() {
            total.merge(row);
        }
        Ok(total)
    }

    /// Phase 2: fine bin counts summed over workers.
    fn fine_histogram(&self, minimum: f64, maximum: f64) -> Result<Vec<u64>> {
        let rows = self.element.descriptor().row_count();
        let to_bin = to_bin_factor(minimum, maximum, self.fine_bins);
        let partials = self.run_workers(self.worker_ranges(rows), |range| {
            let mut bins = vec![0u64; self.fine_bins];
            self.scan_rows(range, |_, value| bins[fine_bin(value, minimum, to_bin, self.fine_bins)] += 1)?;
            Ok(bins)
        })?;

        let mut total = vec![0u64; self.fine_bins];
        for bins in &partials {
            for (sum, count) in total.iter_mut().zip(bins) {
                *sum += count;
            }
        }
        Ok(total)
    }

    /// Run both phases. Fails when nothing survives the bad value filter.
    pub fn run(&self) -> Result<ScanResult> {
        let start = Instant::now();

        let moments = self.moments()?;
        let (Some(average), Some(standard_deviation)) = (moments.mean(), moments.standard_deviation()) else {
            debug!(band = self.band, "no samples survived the bad value filter");
            return Err(RasterError::statistics_error("no valid samples"));
        };
        let phase1_ms = start.elapsed().as_millis();

        let (minimum, maximum) = (moments.minimum, moments.maximum);
        let fine = self.fine_histogram(minimum, maximum)?;

        let integral = self.element.descriptor().encoding().is_integral(self.component);
        let centers = bin_centers(minimum, maximum, integral);
        let counts = downsample(&fine, minimum, maximum, &centers, integral);
        let table = percentiles(&fine, minimum, maximum);

        info!(
            band = self.band,
            component = ?self.component,
            samples = moments.count,
            resolution = self.resolution,
            threads = self.threads,
            phase1_ms = phase1_ms as u64,
            total_ms = start.elapsed().as_millis() as u64,
            "statistics computed"
        );

        Ok(ScanResult {
            minimum,
            maximum,
            average,
            standard_deviation,
            percentiles: table,
            bin_centers: centers,
            bin_counts: counts,
            samples: moments.count,
        })
    }
}
