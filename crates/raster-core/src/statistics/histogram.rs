//! Histogram downsampling and percentile tables.
//!
//! The engine bins samples into a configurable number of fine bins; this
//! module turns those counts into the 256-bin public histogram and the
//! 1001-entry percentile table, and maps values between raw and percentile
//! space.

/// Bins in the public histogram.
pub const HISTOGRAM_BINS: usize = 256;

/// Entries in a percentile table: 0.0%, 0.1%, ..., 100.0%.
pub const PERCENTILE_COUNT: usize = 1001;

/// Fine bin of `value` given the phase 1 range.
pub(crate) fn fine_bin(value: f64, minimum: f64, to_bin: f64, fine_bins: usize) -> usize {
    // Float to integer casts saturate, so values below the minimum land in 0.
    (((value - minimum) * to_bin) as usize).min(fine_bins - 1)
}

/// Scale from value offset to fine bin index.
pub(crate) fn to_bin_factor(minimum: f64, maximum: f64, fine_bins: usize) -> f64 {
    if maximum != minimum {
        0.999999999 * fine_bins as f64 / (maximum - minimum)
    } else {
        0.0
    }
}

/// Centers of the public bins.
///
/// Integral data gets whole-number bin widths centered between integers.
pub(crate) fn bin_centers(minimum: f64, maximum: f64, integral: bool) -> Vec<f64> {
    let mut range = maximum - minimum;
    let one_bin = range == 0.0;
    if one_bin {
        range = 1.0;
    }

    let width = if integral {
        ((range + 0.5) / HISTOGRAM_BINS as f64).ceil()
    } else {
        range / HISTOGRAM_BINS as f64
    };

    (0..HISTOGRAM_BINS)
        .map(|bin| {
            let start = minimum + bin as f64 * width;
            if integral {
                start + (width - 1.0) / 2.0
            } else if one_bin {
                start
            } else {
                start + width / 2.0
            }
        })
        .collect()
}

/// Fold fine bin counts into the public bins described by `centers`.
pub(crate) fn downsample(fine: &[u64], minimum: f64, maximum: f64, centers: &[f64], integral: bool) -> Vec<u32> {
    let mut counts = vec![0u32; HISTOGRAM_BINS];
    if fine.is_empty() || centers.len() != HISTOGRAM_BINS {
        return counts;
    }

    let overall_range = maximum - minimum;
    let mut result_range = centers[HISTOGRAM_BINS - 1] - centers[0];
    if !integral {
        result_range += overall_range / HISTOGRAM_BINS as f64;
    }

    let conversion = if result_range > 0.0 {
        (HISTOGRAM_BINS as f64 / result_range) * (overall_range / fine.len() as f64)
    } else {
        0.0
    };

    for (source, &count) in fine.iter().enumerate() {
        let dest = ((source as f64 * conversion) as usize).min(HISTOGRAM_BINS - 1);
        let total = u64::from(counts[dest]) + count;
        counts[dest] = u32::try_from(total).unwrap_or(u32::MAX);
    }
    counts
}

/// Percentile table from fine bin counts.
///
/// Entry `i` is the value at or below which `i / 10` percent of the samples
/// fall. Percentiles that share a bin are interpolated between the nearest
/// populated neighbours. The ends are pinned to `minimum` and `maximum`.
pub(crate) fn percentiles(fine: &[u64], minimum: f64, maximum: f64) -> Vec<f64> {
    let mut table = vec![minimum; PERCENTILE_COUNT];
    let total: u64 = fine.iter().sum();
    if fine.is_empty() {
        table[PERCENTILE_COUNT - 1] = maximum;
        return table;
    }

    let range = maximum - minimum;
    let bins = fine.len();
    let mut count = 0u64;
    let mut bin: isize = -1;
    let mut previous = 0usize;

    for percentile in 1..PERCENTILE_COUNT {
        let cutoff = (0.001 * percentile as f64 * total as f64) as u64;
        let mut hit = false;
        while count < cutoff && bin < bins as isize - 1 {
            bin += 1;
            count += fine[bin as usize];
            hit = true;
        }

        table[percentile] = range * bin as f64 / bins as f64 + minimum;
        if hit {
            interpolate(&mut table, previous, percentile);
            previous = percentile;
        }
    }

    table[PERCENTILE_COUNT - 1] = maximum;
    if previous < PERCENTILE_COUNT - 1 {
        interpolate(&mut table, previous, PERCENTILE_COUNT - 1);
    }
    table
}

fn interpolate(table: &mut [f64], from: usize, to: usize) {
    let (low, high) = (table[from], table[to]);
    for j in from + 1..to {
        table[j] = low + (high - low) * (j - from) as f64 / (to - from) as f64;
    }
}

/// Raw value at `percent` (0 to 100) of a percentile table.
///
/// Percents outside [0, 100] extrapolate linearly from the table's ends.
/// Returns `None` unless `table` has [`PERCENTILE_COUNT`] entries.
pub fn percentile_to_raw(percent: f64, table: &[f64]) -> Option<f64> {
    if table.len() != PERCENTILE_COUNT {
        return None;
    }
    let (first, last) = (table[0], table[PERCENTILE_COUNT - 1]);

    if !(0.0..=100.0).contains(&percent) {
        return Some(first + percent * (last - first) / 100.0);
    }

    let lower = (10.0 * percent) as usize;
    if lower >= PERCENTILE_COUNT - 1 {
        return Some(last);
    }
    Some(table[lower] + (table[lower + 1] - table[lower]) * (10.0 * percent - lower as f64))
}

/// Percent (0 to 100) at which `raw` falls in a percentile table.
///
/// Values outside the table's range extrapolate linearly. Returns `None`
/// unless `table` has [`PERCENTILE_COUNT`] entries.
pub fn raw_to_percentile(raw: f64, table: &[f64]) -> Option<f64> {
    if table.len() != PERCENTILE_COUNT {
        return None;
    }
    let (first, last) = (table[0], table[PERCENTILE_COUNT - 1]);

    if raw < first || raw > last {
        if last == first {
            return Some(if raw < first { 0.0 } else { 100.0 });
        }
        return Some(100.0 * (raw - first) / (last - first));
    }

    let upper = table[..PERCENTILE_COUNT - 1]
        .iter()
        .position(|&p| p >= raw)
        .unwrap_or(PERCENTILE_COUNT - 1);
    if upper == 0 {
        return Some(0.0);
    }

    let lower = upper - 1;
    let span = table[upper] - table[lower];
    if span <= 0.0 {
        return Some(lower as f64 / 10.0);
    }
    Some((lower as f64 + (raw - table[lower]) / span) / 10.0)
}
