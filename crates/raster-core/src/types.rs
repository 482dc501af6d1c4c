//! Core enumerations shared by descriptors, requests and pagers.

use serde::{Deserialize, Serialize};

/// Physical layout of a cube in memory or on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterleaveFormat {
    /// Band interleaved by pixel: row, column, band.
    Bip,
    /// Band interleaved by line: row, band, column.
    Bil,
    /// Band sequential: band, row, column.
    Bsq,
}

impl InterleaveFormat {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bip" => Some(Self::Bip),
            "bil" => Some(Self::Bil),
            "bsq" => Some(Self::Bsq),
            _ => None,
        }
    }

    /// Get the format name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bip => "BIP",
            Self::Bil => "BIL",
            Self::Bsq => "BSQ",
        }
    }
}

impl std::fmt::Display for InterleaveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data type of a single cube element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingType {
    Int1SByte,
    Int1UByte,
    Int2SBytes,
    Int2UBytes,
    Int4SBytes,
    Int4UBytes,
    Flt4Bytes,
    Flt8Bytes,
    /// Complex value stored as two signed 16-bit integers (real, imaginary).
    Int4SComplex,
    /// Complex value stored as two 32-bit floats (real, imaginary).
    Flt8Complex,
}

impl EncodingType {
    /// Size of one element in bytes.
    pub fn bytes_per_element(&self) -> usize {
        match self {
            Self::Int1SByte | Self::Int1UByte => 1,
            Self::Int2SBytes | Self::Int2UBytes => 2,
            Self::Int4SBytes | Self::Int4UBytes | Self::Flt4Bytes | Self::Int4SComplex => 4,
            Self::Flt8Bytes | Self::Flt8Complex => 8,
        }
    }

    /// Whether the encoding stores floating point values.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Flt4Bytes | Self::Flt8Bytes | Self::Flt8Complex)
    }

    /// Whether values read with `component` are always integral.
    ///
    /// Magnitude and phase of integer complex data are not.
    pub fn is_integral(&self, component: ComplexComponent) -> bool {
        match self {
            Self::Flt4Bytes | Self::Flt8Bytes | Self::Flt8Complex => false,
            Self::Int4SComplex => matches!(
                component,
                ComplexComponent::InPhase | ComplexComponent::Quadrature
            ),
            _ => true,
        }
    }
}

/// Component extracted from complex data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ComplexComponent {
    #[default]
    Magnitude,
    Phase,
    InPhase,
    Quadrature,
}

/// Where an element keeps its data when no pager has been supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingLocation {
    /// One contiguous heap block for the whole cube.
    #[default]
    InMemory,
    /// A temporary backing file, memory mapped.
    OnDisk,
    /// An existing file accessed through an externally supplied pager.
    OnDiskReadOnly,
}
