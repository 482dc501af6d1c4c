//! Per-band statistics: extremes, moments, percentiles and histogram.
//!
//! Values are cached per complex component and computed on first read by
//! the parallel engine in [`engine`]. Changing the bad values or the
//! sampling resolution, or updating the element's data, drops every cached
//! value.

mod engine;
pub mod histogram;

pub use histogram::{percentile_to_raw, raw_to_percentile, HISTOGRAM_BINS, PERCENTILE_COUNT};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard, Weak};
use tracing::debug;

use crate::dimension::DimensionDescriptor;
use crate::element::ElementInner;
use crate::error::{RasterError, Result};
use crate::types::ComplexComponent;
use engine::ScanParameters;

/// Value reported for anything not computed.
pub const NOT_COMPUTED: f64 = -99999.9;

/// Rows or columns per sample along the shorter axis when no resolution is set.
const DEFAULT_SAMPLES_PER_AXIS: usize = 500;

#[derive(Debug, Clone, Default)]
struct ComponentValues {
    minimum: Option<f64>,
    maximum: Option<f64>,
    average: Option<f64>,
    standard_deviation: Option<f64>,
    percentiles: Option<Vec<f64>>,
    histogram: Option<(Vec<f64>, Vec<u32>)>,
}

impl ComponentValues {
    fn is_complete(&self) -> bool {
        self.minimum.is_some()
            && self.maximum.is_some()
            && self.average.is_some()
            && self.standard_deviation.is_some()
            && self.percentiles.is_some()
            && self.histogram.is_some()
    }
}

#[derive(Debug, Default)]
struct StatisticsState {
    components: BTreeMap<ComplexComponent, ComponentValues>,
    /// Components whose last computation failed; not retried until reset.
    failed: BTreeSet<ComplexComponent>,
    /// 0 until set or first derived from the cube extent.
    resolution: usize,
    bad_values: Vec<i32>,
    generation: u64,
}

impl StatisticsState {
    fn clear(&mut self) {
        self.components.clear();
        self.failed.clear();
        self.generation += 1;
    }
}

fn known(value: f64) -> Option<f64> {
    (value != NOT_COMPUTED).then_some(value)
}

/// Statistics for one band of a raster element.
///
/// Obtained from [`RasterElement::statistics`](crate::RasterElement::statistics).
/// Getters compute on demand and return [`NOT_COMPUTED`] (or `None`) when
/// the band has no usable samples, the computation was aborted, or the
/// element is gone.
pub struct Statistics {
    element: Weak<ElementInner>,
    band: DimensionDescriptor,
    state: Mutex<StatisticsState>,
}

impl Statistics {
    pub(crate) fn new(element: Weak<ElementInner>, band: DimensionDescriptor, mut bad_values: Vec<i32>) -> Self {
        bad_values.sort_unstable();
        bad_values.dedup();
        Self {
            element,
            band,
            state: Mutex::new(StatisticsState {
                bad_values,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatisticsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn band(&self) -> DimensionDescriptor {
        self.band
    }

    /// Drop every cached value for every component.
    pub fn reset_all(&self) {
        self.lock().clear();
    }

    /// Drop the cached values of one component.
    pub fn reset(&self, component: ComplexComponent) {
        let mut state = self.lock();
        state.components.remove(&component);
        state.failed.remove(&component);
        state.generation += 1;
    }

    /// True when every value of `component` is cached.
    pub fn are_statistics_calculated(&self, component: ComplexComponent) -> bool {
        self.lock()
            .components
            .get(&component)
            .is_some_and(ComponentValues::is_complete)
    }

    /// Sampling stride; 0 means derived from the cube extent on the next
    /// computation.
    pub fn statistics_resolution(&self) -> usize {
        self.lock().resolution
    }

    /// Sample every `resolution`th pixel. Changing it drops cached values.
    pub fn set_statistics_resolution(&self, resolution: usize) {
        let mut state = self.lock();
        if state.resolution != resolution {
            state.resolution = resolution;
            state.clear();
        }
    }

    pub fn bad_values(&self) -> Vec<i32> {
        self.lock().bad_values.clone()
    }

    /// Exclude `bad_values` from every statistic. Changing them drops
    /// cached values.
    pub fn set_bad_values(&self, mut bad_values: Vec<i32>) {
        bad_values.sort_unstable();
        bad_values.dedup();
        let mut state = self.lock();
        if state.bad_values != bad_values {
            state.bad_values = bad_values;
            state.clear();
        }
    }

    fn cached<T>(&self, component: ComplexComponent, pick: impl Fn(&ComponentValues) -> Option<T>) -> Option<T> {
        if let Some(value) = self.lock().components.get(&component).and_then(&pick) {
            return Some(value);
        }
        let computable = !self.lock().failed.contains(&component);
        if computable && self.calculate(component, None).is_ok() {
            return self.lock().components.get(&component).and_then(&pick);
        }
        None
    }

    pub fn min(&self, component: ComplexComponent) -> f64 {
        self.cached(component, |values| values.minimum).unwrap_or(NOT_COMPUTED)
    }

    pub fn max(&self, component: ComplexComponent) -> f64 {
        self.cached(component, |values| values.maximum).unwrap_or(NOT_COMPUTED)
    }

    pub fn average(&self, component: ComplexComponent) -> f64 {
        self.cached(component, |values| values.average).unwrap_or(NOT_COMPUTED)
    }

    pub fn standard_deviation(&self, component: ComplexComponent) -> f64 {
        self.cached(component, |values| values.standard_deviation)
            .unwrap_or(NOT_COMPUTED)
    }

    /// The [`PERCENTILE_COUNT`]-entry percentile table.
    pub fn percentiles(&self, component: ComplexComponent) -> Option<Vec<f64>> {
        self.cached(component, |values| values.percentiles.clone())
    }

    /// Bin centers and counts of the [`HISTOGRAM_BINS`]-bin histogram.
    pub fn histogram(&self, component: ComplexComponent) -> Option<(Vec<f64>, Vec<u32>)> {
        self.cached(component, |values| values.histogram.clone())
    }

    fn set_value(&self, component: ComplexComponent, value: f64, slot: fn(&mut ComponentValues) -> &mut Option<f64>) {
        let mut state = self.lock();
        let values = state.components.entry(component).or_default();
        *slot(values) = known(value);
    }

    /// Set the minimum; [`NOT_COMPUTED`] clears it.
    pub fn set_min(&self, value: f64, component: ComplexComponent) {
        self.set_value(component, value, |values| &mut values.minimum);
    }

    /// Set the maximum; [`NOT_COMPUTED`] clears it.
    pub fn set_max(&self, value: f64, component: ComplexComponent) {
        self.set_value(component, value, |values| &mut values.maximum);
    }

    /// Set the average; [`NOT_COMPUTED`] clears it.
    pub fn set_average(&self, value: f64, component: ComplexComponent) {
        self.set_value(component, value, |values| &mut values.average);
    }

    /// Set the standard deviation; [`NOT_COMPUTED`] clears it.
    pub fn set_standard_deviation(&self, value: f64, component: ComplexComponent) {
        self.set_value(component, value, |values| &mut values.standard_deviation);
    }

    /// Set or clear the percentile table.
    pub fn set_percentiles(&self, percentiles: Option<Vec<f64>>, component: ComplexComponent) -> Result<()> {
        if let Some(table) = &percentiles {
            if table.len() != PERCENTILE_COUNT {
                return Err(RasterError::statistics_error(format!(
                    "percentile table needs {} entries, got {}",
                    PERCENTILE_COUNT,
                    table.len()
                )));
            }
        }
        self.lock().components.entry(component).or_default().percentiles = percentiles;
        Ok(())
    }

    /// Set or clear the histogram.
    pub fn set_histogram(&self, histogram: Option<(Vec<f64>, Vec<u32>)>, component: ComplexComponent) -> Result<()> {
        if let Some((centers, counts)) = &histogram {
            if centers.len() != HISTOGRAM_BINS || counts.len() != HISTOGRAM_BINS {
                return Err(RasterError::statistics_error(format!(
                    "histogram needs {} bins, got {} centers and {} counts",
                    HISTOGRAM_BINS,
                    centers.len(),
                    counts.len()
                )));
            }
        }
        self.lock().components.entry(component).or_default().histogram = histogram;
        Ok(())
    }

    /// Compute every value of `component`, replacing what is cached.
    ///
    /// `abort` is polled once per row by each worker. On any failure the
    /// component is left uncalculated.
    pub fn calculate(&self, component: ComplexComponent, abort: Option<&AtomicBool>) -> Result<()> {
        let element = self
            .element
            .upgrade()
            .ok_or_else(|| RasterError::statistics_error("raster element dropped"))?;
        let band = self
            .band
            .active_number()
            .ok_or_else(|| RasterError::statistics_error("band is not active"))?;

        let (generation, resolution, bad_values) = {
            let mut state = self.lock();
            state.components.remove(&component);
            state.failed.remove(&component);
            if state.resolution == 0 {
                let descriptor = element.descriptor();
                let shorter = descriptor.row_count().min(descriptor.column_count());
                state.resolution = (shorter / DEFAULT_SAMPLES_PER_AXIS).max(1);
            }
            (state.generation, state.resolution, state.bad_values.clone())
        };

        let config = element.config();
        let parameters = ScanParameters {
            element: &element,
            band,
            component,
            resolution,
            bad_values: &bad_values,
            threads: config.statistics_threads,
            fine_bins: config.histogram_bins,
            abort,
        };

        let result = parameters.run();
        let mut state = self.lock();
        if state.generation != generation {
            debug!(band, "statistics reset during computation, discarding result");
            return Err(RasterError::statistics_error("statistics reset during computation"));
        }

        match result {
            Ok(scan) => {
                state.components.insert(
                    component,
                    ComponentValues {
                        minimum: Some(scan.minimum),
                        maximum: Some(scan.maximum),
                        average: Some(scan.average),
                        standard_deviation: Some(scan.standard_deviation),
                        percentiles: Some(scan.percentiles),
                        histogram: Some((scan.bin_centers, scan.bin_counts)),
                    },
                );
                debug!(band, samples = scan.samples, "statistics cached");
                Ok(())
            }
            Err(e) => {
                debug!(band, component = ?component, error = %e, "statistics left uncalculated");
                state.failed.insert(component);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Statistics")
            .field("band", &self.band)
            .field("resolution", &state.resolution)
            .field("bad_values", &state.bad_values)
            .field("components", &state.components.keys().collect::<Vec<_>>())
            .finish()
    }
}
