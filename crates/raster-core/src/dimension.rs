//! Row, column and band identities.

use serde::{Deserialize, Serialize};

/// One row, column or band of a cube.
///
/// Carries three independent numbers: the original (file-relative) number,
/// the on-disk number after any subsetting, and the active number used for
/// in-memory access. Each may be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionDescriptor {
    original_number: Option<usize>,
    on_disk_number: Option<usize>,
    active_number: Option<usize>,
}

impl DimensionDescriptor {
    /// A descriptor with all three numbers set to `number`.
    pub fn new(number: usize) -> Self {
        Self {
            original_number: Some(number),
            on_disk_number: Some(number),
            active_number: Some(number),
        }
    }

    pub fn original_number(&self) -> Option<usize> {
        self.original_number
    }

    pub fn on_disk_number(&self) -> Option<usize> {
        self.on_disk_number
    }

    pub fn active_number(&self) -> Option<usize> {
        self.active_number
    }

    pub fn set_original_number(&mut self, number: Option<usize>) {
        self.original_number = number;
    }

    pub fn set_on_disk_number(&mut self, number: Option<usize>) {
        self.on_disk_number = number;
    }

    pub fn set_active_number(&mut self, number: Option<usize>) {
        self.active_number = number;
    }

    pub fn is_original_number_valid(&self) -> bool {
        self.original_number.is_some()
    }

    pub fn is_on_disk_number_valid(&self) -> bool {
        self.on_disk_number.is_some()
    }

    pub fn is_active_number_valid(&self) -> bool {
        self.active_number.is_some()
    }

    /// True when any of the three numbers is set.
    pub fn is_valid(&self) -> bool {
        self.original_number.is_some() || self.on_disk_number.is_some() || self.active_number.is_some()
    }
}

/// Build `count` descriptors numbered `0..count` in all three spaces.
pub fn generate_dimensions(count: usize) -> Vec<DimensionDescriptor> {
    (0..count).map(DimensionDescriptor::new).collect()
}

/// Renumber the active numbers of `dims` to `0..len` in order.
///
/// Descriptors are expected in original order.
pub fn renumber_active(dims: &mut [DimensionDescriptor]) {
    for (index, dim) in dims.iter_mut().enumerate() {
        dim.set_active_number(Some(index));
    }
}
