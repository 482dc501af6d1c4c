//! Native-endian value conversion for every encoding.
//!
//! Readers are plain function pointers selected once per encoding so hot
//! loops never branch on the encoding type.

use bytemuck::pod_read_unaligned;

use crate::types::{ComplexComponent, EncodingType};

/// Reads element `index` of `data` as `f64`.
pub type ValueReader = fn(data: &[u8], index: usize, component: ComplexComponent) -> f64;

macro_rules! real_reader {
    ($read:ident, $ty:ty) => {
        fn $read(data: &[u8], index: usize, _component: ComplexComponent) -> f64 {
            const SIZE: usize = std::mem::size_of::<$ty>();
            let start = index * SIZE;
            pod_read_unaligned::<$ty>(&data[start..start + SIZE]) as f64
        }
    };
}

real_reader!(read_i8, i8);
real_reader!(read_u8, u8);
real_reader!(read_i16, i16);
real_reader!(read_u16, u16);
real_reader!(read_i32, i32);
real_reader!(read_u32, u32);
real_reader!(read_f32, f32);
real_reader!(read_f64, f64);

fn complex_component(real: f64, imaginary: f64, component: ComplexComponent) -> f64 {
    match component {
        ComplexComponent::Magnitude => real.hypot(imaginary),
        ComplexComponent::Phase => imaginary.atan2(real),
        ComplexComponent::InPhase => real,
        ComplexComponent::Quadrature => imaginary,
    }
}

fn read_complex_i16(data: &[u8], index: usize, component: ComplexComponent) -> f64 {
    let start = index * 4;
    let real = pod_read_unaligned::<i16>(&data[start..start + 2]) as f64;
    let imaginary = pod_read_unaligned::<i16>(&data[start + 2..start + 4]) as f64;
    complex_component(real, imaginary, component)
}

fn read_complex_f32(data: &[u8], index: usize, component: ComplexComponent) -> f64 {
    let start = index * 8;
    let real = pod_read_unaligned::<f32>(&data[start..start + 4]) as f64;
    let imaginary = pod_read_unaligned::<f32>(&data[start + 4..start + 8]) as f64;
    complex_component(real, imaginary, component)
}

/// Reader for `encoding`.
pub fn value_reader(encoding: EncodingType) -> ValueReader {
    match encoding {
        EncodingType::Int1SByte => read_i8,
        EncodingType::Int1UByte => read_u8,
        EncodingType::Int2SBytes => read_i16,
        EncodingType::Int2UBytes => read_u16,
        EncodingType::Int4SBytes => read_i32,
        EncodingType::Int4UBytes => read_u32,
        EncodingType::Flt4Bytes => read_f32,
        EncodingType::Flt8Bytes => read_f64,
        EncodingType::Int4SComplex => read_complex_i16,
        EncodingType::Flt8Complex => read_complex_f32,
    }
}

/// Round half away from zero to the nearest `i32`, saturating.
pub fn round_to_i32(value: f64) -> i32 {
    value.round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAG: ComplexComponent = ComplexComponent::Magnitude;

    #[test]
    fn test_read_integer_encodings() {
        let bytes = (-3i16).to_ne_bytes();
        assert_eq!(value_reader(EncodingType::Int2SBytes)(&bytes, 0, MAG), -3.0);

        let data: Vec<u8> = [7u32, 4_000_000_000u32].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(value_reader(EncodingType::Int4UBytes)(&data, 1, MAG), 4_000_000_000.0);

        let bytes = [0xFFu8];
        assert_eq!(value_reader(EncodingType::Int1SByte)(&bytes, 0, MAG), -1.0);
        assert_eq!(value_reader(EncodingType::Int1UByte)(&bytes, 0, MAG), 255.0);
    }

    #[test]
    fn test_read_unaligned_float() {
        let mut data = vec![0u8; 9];
        data[1..9].copy_from_slice(&2.5f64.to_ne_bytes());
        assert_eq!(value_reader(EncodingType::Flt8Bytes)(&data[1..], 0, MAG), 2.5);

        let data: Vec<u8> = [1.5f32, -7.25].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(value_reader(EncodingType::Flt4Bytes)(&data, 1, MAG), -7.25);
    }

    #[test]
    fn test_complex_components() {
        let mut data = Vec::new();
        data.extend_from_slice(&3i16.to_ne_bytes());
        data.extend_from_slice(&4i16.to_ne_bytes());

        let read = value_reader(EncodingType::Int4SComplex);
        assert_eq!(read(&data, 0, ComplexComponent::Magnitude), 5.0);
        assert_eq!(read(&data, 0, ComplexComponent::InPhase), 3.0);
        assert_eq!(read(&data, 0, ComplexComponent::Quadrature), 4.0);
        assert!((read(&data, 0, ComplexComponent::Phase) - 4f64.atan2(3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_round_to_i32() {
        assert_eq!(round_to_i32(4.5), 5);
        assert_eq!(round_to_i32(-4.5), -5);
        assert_eq!(round_to_i32(4.49), 4);
    }
}
