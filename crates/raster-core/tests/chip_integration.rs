//! Integration tests for chips and element copies.

use std::sync::atomic::AtomicBool;

use raster_core::{
    ComplexComponent, DimensionDescriptor, EncodingType, InterleaveFormat, ProcessingLocation, RasterConfig,
    RasterDataDescriptor, RasterElement, RasterError,
};
use test_utils::{create_gradient_cube, cube, interleave_cube, to_bytes, CubeLayout};

fn dims(indices: &[usize]) -> Vec<DimensionDescriptor> {
    indices.iter().map(|&i| DimensionDescriptor::new(i)).collect()
}

fn interleave_of(layout: CubeLayout) -> InterleaveFormat {
    match layout {
        CubeLayout::Bip => InterleaveFormat::Bip,
        CubeLayout::Bil => InterleaveFormat::Bil,
        CubeLayout::Bsq => InterleaveFormat::Bsq,
    }
}

fn gradient_element(layout: CubeLayout) -> RasterElement {
    let extent = cube::ODD;
    let values = create_gradient_cube(extent.rows, extent.columns, extent.bands);
    let data = to_bytes(&interleave_cube(&values, extent.rows, extent.columns, extent.bands, layout));
    let descriptor = RasterDataDescriptor::new(
        extent.rows,
        extent.columns,
        extent.bands,
        EncodingType::Flt4Bytes,
        interleave_of(layout),
    )
    .with_bad_values(vec![-1]);
    RasterElement::from_vec("scene.raw", descriptor, data, RasterConfig::default()).unwrap()
}

/// Every chip value, in row, column, band order.
fn chip_values(chip: &RasterElement) -> Vec<f64> {
    let descriptor = chip.descriptor();
    let mut values = Vec::new();
    for row in 0..descriptor.row_count() {
        for col in 0..descriptor.column_count() {
            for band in 0..descriptor.band_count() {
                values.push(chip.pixel_value(
                    DimensionDescriptor::new(col),
                    DimensionDescriptor::new(row),
                    DimensionDescriptor::new(band),
                    ComplexComponent::Magnitude,
                ));
            }
        }
    }
    values
}

fn expected_values(rows: &[usize], cols: &[usize], bands: &[usize]) -> Vec<f64> {
    let mut values = Vec::new();
    for &row in rows {
        for &col in cols {
            for &band in bands {
                values.push((band * 10000 + row * 100 + col) as f64);
            }
        }
    }
    values
}

/// Selections that force each copy tier in every interleave.
fn selections() -> Vec<(Vec<usize>, Vec<usize>, Vec<usize>)> {
    vec![
        // whole rows
        (vec![1, 2, 4], vec![0, 1, 2, 3, 4], vec![0, 1, 2]),
        // contiguous columns, all bands
        (vec![0, 6], vec![1, 2, 3], vec![0, 1, 2]),
        // sparse columns, all bands
        (vec![3], vec![0, 2, 4], vec![0, 1, 2]),
        // all columns, sparse bands
        (vec![2, 5], vec![0, 1, 2, 3, 4], vec![0, 2]),
        // contiguous columns, sparse bands
        (vec![0, 1], vec![2, 3], vec![0, 2]),
        // nothing contiguous
        (vec![1, 3, 6], vec![0, 3], vec![2]),
    ]
}

#[test]
fn test_chip_tiers_match_across_interleaves() {
    for (rows, cols, bands) in selections() {
        let expected = expected_values(&rows, &cols, &bands);
        for layout in CubeLayout::ALL {
            let element = gradient_element(layout);
            let chip = element
                .create_chip("_chip", &dims(&rows), &dims(&cols), &dims(&bands), None)
                .unwrap();

            assert_eq!(chip.descriptor().row_count(), rows.len());
            assert_eq!(chip.descriptor().interleave(), interleave_of(layout));
            assert_eq!(
                chip_values(&chip),
                expected,
                "{:?} chip of rows {:?} cols {:?} bands {:?}",
                layout,
                rows,
                cols,
                bands
            );
        }
    }
}

#[test]
fn test_chip_descriptor_numbering() {
    let element = gradient_element(CubeLayout::Bip);
    let chip = element
        .create_chip_empty("_sub", &dims(&[2, 4]), &[], &dims(&[1]))
        .unwrap();

    assert_eq!(chip.name(), "scene_sub.raw");
    let descriptor = chip.descriptor();
    assert_eq!(descriptor.row_count(), 2);
    assert_eq!(descriptor.column_count(), cube::ODD.columns);
    assert_eq!(descriptor.bad_values(), &[-1]);

    let second_row = descriptor.rows()[1];
    assert_eq!(second_row.active_number(), Some(1));
    assert_eq!(second_row.original_number(), Some(4));
    assert_eq!(descriptor.bands()[0].original_number(), Some(1));
    assert_eq!(descriptor.active_band(0).and_then(|b| b.on_disk_number()), Some(1));

    assert_eq!(
        chip.pixel_value(
            DimensionDescriptor::new(0),
            DimensionDescriptor::new(0),
            DimensionDescriptor::new(0),
            ComplexComponent::Magnitude
        ),
        0.0
    );
}

#[test]
fn test_chip_rejects_bad_selections() {
    let element = gradient_element(CubeLayout::Bsq);

    let out_of_range = element.create_chip("_x", &dims(&[7]), &[], &[], None);
    assert!(matches!(out_of_range, Err(RasterError::InvalidRequest(_))));

    let unordered = element.create_chip("_x", &[], &dims(&[3, 1]), &[], None);
    assert!(matches!(unordered, Err(RasterError::InvalidRequest(_))));
}

#[test]
fn test_chip_abort() {
    let element = gradient_element(CubeLayout::Bil);
    let abort = AtomicBool::new(true);
    let result = element.create_chip("_x", &[], &[], &[], Some(&abort));
    assert!(matches!(result, Err(RasterError::Aborted)));
}

#[test]
fn test_copy_whole_element() {
    let extent = cube::ODD;
    for layout in CubeLayout::ALL {
        let element = gradient_element(layout);
        let copy = element.copy("copy.raw").unwrap();

        assert_eq!(copy.name(), "copy.raw");
        let all_rows: Vec<usize> = (0..extent.rows).collect();
        let all_cols: Vec<usize> = (0..extent.columns).collect();
        let all_bands: Vec<usize> = (0..extent.bands).collect();
        assert_eq!(chip_values(&copy), expected_values(&all_rows, &all_cols, &all_bands));
        assert_eq!(copy.raw_data().as_deref(), element.raw_data().as_deref());
    }
}

#[test]
fn test_chip_of_on_disk_element() {
    let dir = tempfile::tempdir().unwrap();
    let extent = cube::ODD;
    let values = create_gradient_cube(extent.rows, extent.columns, extent.bands);
    let descriptor = RasterDataDescriptor::new(extent.rows, extent.columns, extent.bands, EncodingType::Flt4Bytes, InterleaveFormat::Bsq)
        .with_processing_location(ProcessingLocation::OnDisk);
    let mut element = RasterElement::new("disk.raw", descriptor, RasterConfig::default().with_temp_dir(dir.path())).unwrap();
    element
        .write_raw_data(&to_bytes(&values), InterleaveFormat::Bsq, 0, extent.rows, 0, extent.columns, 0, extent.bands)
        .unwrap();

    let chip = element
        .create_chip("_chip", &dims(&[0, 5]), &dims(&[1, 4]), &dims(&[1, 2]), None)
        .unwrap();
    assert_eq!(chip.descriptor().processing_location(), ProcessingLocation::OnDisk);
    assert_eq!(chip_values(&chip), expected_values(&[0, 5], &[1, 4], &[1, 2]));
    assert!(chip.temporary_filename().is_some());
}
