//! Element types stored in tiles
//!
//! `DType` is the runtime tag of a tile's scalar type; [`Element`] connects
//! Rust types to it at compile time. Only the four BLAS precisions are
//! supported: single and double, real and complex.

pub mod complex;
mod element;

pub use complex::{Complex64, Complex128};
pub use element::{Element, RealElement};

use std::fmt;

/// Scalar types supported by tiles
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point
    F32 = 1,
    /// Complex with f32 components
    Complex64 = 40,
    /// Complex with f64 components
    Complex128 = 41,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    /// Whether this is a complex type
    #[inline]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Real counterpart (F32 for Complex64, F64 for Complex128)
    #[inline]
    pub const fn real(self) -> Self {
        match self {
            Self::F32 | Self::Complex64 => Self::F32,
            Self::F64 | Self::Complex128 => Self::F64,
        }
    }

    /// Short name, BLAS precision letter style
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F32 => "s",
            Self::F64 => "d",
            Self::Complex64 => "c",
            Self::Complex128 => "z",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::Complex128.size_in_bytes(), 16);
        assert_eq!(DType::Complex64.real(), DType::F32);
        assert!(DType::Complex64.is_complex());
        assert!(!DType::F64.is_complex());
    }
}
