//! Integration tests for band statistics over every interleave.

use std::sync::atomic::AtomicBool;

use raster_core::{
    percentile_to_raw, raw_to_percentile, ComplexComponent, DimensionDescriptor, EncodingType, InterleaveFormat,
    RasterConfig, RasterDataDescriptor, RasterElement, RasterError, HISTOGRAM_BINS, NOT_COMPUTED, PERCENTILE_COUNT,
};
use test_utils::{assert_approx_eq, create_noise_cube, cube, init_tracing, interleave_cube, to_bytes, CubeLayout};

const MAG: ComplexComponent = ComplexComponent::Magnitude;

fn interleave_of(layout: CubeLayout) -> InterleaveFormat {
    match layout {
        CubeLayout::Bip => InterleaveFormat::Bip,
        CubeLayout::Bil => InterleaveFormat::Bil,
        CubeLayout::Bsq => InterleaveFormat::Bsq,
    }
}

fn noise_element(layout: CubeLayout, threads: usize) -> RasterElement {
    let extent = cube::STATISTICS;
    let values = create_noise_cube(extent.rows, extent.columns, extent.bands, 1000.0, 7);
    let data = to_bytes(&interleave_cube(&values, extent.rows, extent.columns, extent.bands, layout));
    let descriptor = RasterDataDescriptor::new(
        extent.rows,
        extent.columns,
        extent.bands,
        EncodingType::Flt4Bytes,
        interleave_of(layout),
    );
    let config = RasterConfig::default().with_statistics_threads(threads);
    RasterElement::from_vec("noise.raw", descriptor, data, config).unwrap()
}

fn single_row(values: &[u8]) -> RasterElement {
    let descriptor = RasterDataDescriptor::new(1, values.len(), 1, EncodingType::Int1UByte, InterleaveFormat::Bsq);
    RasterElement::from_vec("row.raw", descriptor, values.to_vec(), RasterConfig::default()).unwrap()
}

#[test]
fn test_bad_value_excluded_from_mean() {
    init_tracing();
    let element = single_row(&[1, 5, 9]);
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();
    stats.set_bad_values(vec![5]);

    assert_eq!(stats.average(MAG), 5.0);
    assert_eq!(stats.min(MAG), 1.0);
    assert_eq!(stats.max(MAG), 9.0);

    let (_, counts) = stats.histogram(MAG).unwrap();
    assert_eq!(counts.iter().sum::<u32>(), 2);
}

#[test]
fn test_all_bad_values_leave_band_uncalculated() {
    let element = single_row(&[5, 5, 5]);
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();
    stats.set_bad_values(vec![5]);

    assert_eq!(stats.min(MAG), NOT_COMPUTED);
    assert_eq!(stats.standard_deviation(MAG), NOT_COMPUTED);
    assert!(stats.percentiles(MAG).is_none());
    assert!(!stats.are_statistics_calculated(MAG));

    stats.set_bad_values(Vec::new());
    assert_eq!(stats.average(MAG), 5.0);
    assert_eq!(stats.standard_deviation(MAG), 0.0);
}

#[test]
fn test_descriptor_bad_values_seed_statistics() {
    let descriptor = RasterDataDescriptor::new(1, 4, 1, EncodingType::Int1UByte, InterleaveFormat::Bip)
        .with_bad_values(vec![0]);
    let element = RasterElement::from_vec("seeded.raw", descriptor, vec![0, 2, 4, 0], RasterConfig::default()).unwrap();
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();

    assert_eq!(stats.bad_values(), vec![0]);
    assert_eq!(stats.average(MAG), 3.0);
}

#[test]
fn test_percentile_round_trip_on_computed_table() {
    let element = noise_element(CubeLayout::Bsq, 2);
    let stats = element.statistics(DimensionDescriptor::new(1)).unwrap();
    let table = stats.percentiles(MAG).unwrap();

    let raw = percentile_to_raw(50.0, &table).unwrap();
    assert!(raw > stats.min(MAG) && raw < stats.max(MAG));
    let linear: Vec<f64> = (0..PERCENTILE_COUNT).map(|i| i as f64).collect();
    let raw = percentile_to_raw(50.0, &linear).unwrap();
    assert_approx_eq!(raw_to_percentile(raw, &linear).unwrap(), 50.0, 1e-9);
}

#[test]
fn test_statistics_independent_of_thread_count() {
    init_tracing();
    for layout in CubeLayout::ALL {
        let single = noise_element(layout, 1);
        let parallel = noise_element(layout, 5);

        for band in 0..cube::STATISTICS.bands {
            let a = single.statistics(DimensionDescriptor::new(band)).unwrap();
            let b = parallel.statistics(DimensionDescriptor::new(band)).unwrap();

            assert_eq!(a.min(MAG).to_bits(), b.min(MAG).to_bits());
            assert_eq!(a.max(MAG).to_bits(), b.max(MAG).to_bits());
            assert_eq!(a.average(MAG).to_bits(), b.average(MAG).to_bits(), "{:?} band {}", layout, band);
            assert_eq!(a.standard_deviation(MAG).to_bits(), b.standard_deviation(MAG).to_bits());
            assert_eq!(a.percentiles(MAG), b.percentiles(MAG));
            assert_eq!(a.histogram(MAG), b.histogram(MAG));
        }
    }
}

#[test]
fn test_statistics_agree_across_interleaves() {
    let bip = noise_element(CubeLayout::Bip, 3);
    let bil = noise_element(CubeLayout::Bil, 3);
    let bsq = noise_element(CubeLayout::Bsq, 3);

    let band = DimensionDescriptor::new(1);
    let reference = bsq.statistics(band).unwrap();
    for element in [&bip, &bil] {
        let stats = element.statistics(band).unwrap();
        assert_eq!(stats.average(MAG).to_bits(), reference.average(MAG).to_bits());
        assert_eq!(stats.histogram(MAG), reference.histogram(MAG));
    }
}

#[test]
fn test_percentile_ends_match_extremes() {
    let element = noise_element(CubeLayout::Bip, 4);
    for band in 0..cube::STATISTICS.bands {
        let stats = element.statistics(DimensionDescriptor::new(band)).unwrap();
        let table = stats.percentiles(MAG).unwrap();

        assert_eq!(table.len(), PERCENTILE_COUNT);
        assert_eq!(table[0], stats.min(MAG));
        assert_eq!(table[PERCENTILE_COUNT - 1], stats.max(MAG));
        assert!(table.windows(2).all(|pair| pair[1] >= pair[0]));
    }
}

#[test]
fn test_histogram_counts_every_sample() {
    let extent = cube::STATISTICS;
    let element = noise_element(CubeLayout::Bil, 2);
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();

    let (centers, counts) = stats.histogram(MAG).unwrap();
    assert_eq!(centers.len(), HISTOGRAM_BINS);
    assert_eq!(counts.iter().map(|&c| c as usize).sum::<usize>(), extent.rows * extent.columns);
    assert!(centers.windows(2).all(|pair| pair[1] > pair[0]));
}

#[test]
fn test_resolution_samples_linear_index() {
    let extent = cube::STATISTICS;
    let element = noise_element(CubeLayout::Bsq, 3);
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();
    stats.set_statistics_resolution(5);

    let (_, counts) = stats.histogram(MAG).unwrap();
    let expected = (extent.rows * extent.columns).div_ceil(5);
    assert_eq!(counts.iter().map(|&c| c as usize).sum::<usize>(), expected);
}

#[test]
fn test_resolution_steps_across_bip_columns() {
    // 3 x 4 x 2 BIP cube; band 1 holds the linear pixel index, band 0 is offset by 100
    let mut data = Vec::new();
    for index in 0..12u8 {
        data.extend_from_slice(&[100 + index, index]);
    }
    let descriptor = RasterDataDescriptor::new(3, 4, 2, EncodingType::Int1UByte, InterleaveFormat::Bip);
    let element = RasterElement::from_vec("steps.raw", descriptor, data, RasterConfig::default()).unwrap();
    let stats = element.statistics(DimensionDescriptor::new(1)).unwrap();
    stats.set_statistics_resolution(3);

    // samples linear indices 0, 3, 6 and 9
    assert_eq!(stats.min(MAG), 0.0);
    assert_eq!(stats.max(MAG), 9.0);
    assert_eq!(stats.average(MAG), 4.5);
    let (_, counts) = stats.histogram(MAG).unwrap();
    assert_eq!(counts.iter().sum::<u32>(), 4);
}

#[test]
fn test_integral_histogram_centers() {
    let values: Vec<u8> = (0..=200).collect();
    let element = single_row(&values);
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();

    let (centers, counts) = stats.histogram(MAG).unwrap();
    assert_eq!(centers[0], 0.0);
    assert_eq!(centers[1], 1.0);
    assert_eq!(counts[0], 1);
    assert_eq!(counts.iter().sum::<u32>(), 201);
}

#[test]
fn test_abort_leaves_band_uncalculated() {
    let element = noise_element(CubeLayout::Bip, 2);
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();
    let abort = AtomicBool::new(true);

    let result = stats.calculate(MAG, Some(&abort));
    assert!(matches!(result, Err(RasterError::Aborted)));
    assert_eq!(stats.average(MAG), NOT_COMPUTED);

    stats.reset(MAG);
    assert_ne!(stats.average(MAG), NOT_COMPUTED);
}

#[test]
fn test_complex_components() {
    // Int4SComplex (real, imaginary) pairs: (3, 4) and (0, -2)
    let values: Vec<i16> = vec![3, 4, 0, -2];
    let descriptor = RasterDataDescriptor::new(1, 2, 1, EncodingType::Int4SComplex, InterleaveFormat::Bip);
    let element = RasterElement::from_vec("complex.raw", descriptor, to_bytes(&values), RasterConfig::default()).unwrap();
    let stats = element.statistics(DimensionDescriptor::new(0)).unwrap();

    assert_eq!(stats.max(ComplexComponent::Magnitude), 5.0);
    assert_eq!(stats.min(ComplexComponent::Magnitude), 2.0);
    assert_eq!(stats.min(ComplexComponent::Quadrature), -2.0);
    assert_eq!(stats.max(ComplexComponent::InPhase), 3.0);
    assert!(stats.are_statistics_calculated(ComplexComponent::Magnitude));
    assert!(!stats.are_statistics_calculated(ComplexComponent::Phase));
}
