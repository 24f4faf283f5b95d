//! Element traits mapping Rust scalar types to DType

use super::DType;
use super::complex::{Complex64, Complex128};
use bytemuck::{Pod, Zeroable};
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Trait for types that can be stored in a tile
///
/// Implemented for `f32`, `f64`, [`Complex64`] and [`Complex128`]. The
/// associated [`Element::Real`] type is the scalar type of norms and of
/// the diagonal of symmetric/Hermitian tiles.
///
/// # Bounds
/// - `Pod + Zeroable` - tile storage can be zero-initialized and viewed as raw scalars
/// - `Add + Sub + Mul + Div + Neg` - field arithmetic (Output = Self)
pub trait Element:
    Copy
    + Clone
    + Send
    + Sync
    + Pod
    + Zeroable
    + Debug
    + PartialEq
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
{
    /// Real scalar type underlying this element
    type Real: RealElement;

    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Whether the element type is complex
    const IS_COMPLEX: bool;

    /// Additive identity
    const ZERO: Self;

    /// Multiplicative identity
    const ONE: Self;

    /// Complex conjugate (identity for real types)
    fn conj(self) -> Self;

    /// Real part
    fn re(self) -> Self::Real;

    /// Absolute value |x| (modulus for complex types)
    fn magnitude(self) -> Self::Real;

    /// Embed a real scalar
    fn from_real(r: Self::Real) -> Self;

    /// Convert from f64 (imaginary part zero for complex types)
    fn from_f64(v: f64) -> Self;

    /// True if any component is NaN
    fn has_nan(self) -> bool;
}

/// Real floating-point element (`f32`, `f64`)
pub trait RealElement: Element<Real = Self> + num_traits::Float + Display {
    /// Widen to f64 for reference computations
    fn as_f64(self) -> f64;
}

macro_rules! impl_real_element {
    ($float:ty, $dtype:expr) => {
        impl Element for $float {
            type Real = $float;
            const DTYPE: DType = $dtype;
            const IS_COMPLEX: bool = false;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn conj(self) -> Self {
                self
            }

            #[inline]
            fn re(self) -> Self {
                self
            }

            #[inline]
            fn magnitude(self) -> Self {
                self.abs()
            }

            #[inline]
            fn from_real(r: Self) -> Self {
                r
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $float
            }

            #[inline]
            fn has_nan(self) -> bool {
                self.is_nan()
            }
        }

        impl RealElement for $float {
            #[inline]
            fn as_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_real_element!(f64, DType::F64);
impl_real_element!(f32, DType::F32);

macro_rules! impl_complex_element {
    ($name:ident, $float:ty, $dtype:expr) => {
        impl Element for $name {
            type Real = $float;
            const DTYPE: DType = $dtype;
            const IS_COMPLEX: bool = true;
            const ZERO: Self = $name::ZERO;
            const ONE: Self = $name::ONE;

            #[inline]
            fn conj(self) -> Self {
                $name::conj(self)
            }

            #[inline]
            fn re(self) -> $float {
                self.re
            }

            #[inline]
            fn magnitude(self) -> $float {
                $name::magnitude(self)
            }

            #[inline]
            fn from_real(r: $float) -> Self {
                $name::new(r, 0.0)
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                $name::new(v as $float, 0.0)
            }

            #[inline]
            fn has_nan(self) -> bool {
                self.is_nan()
            }
        }
    };
}

impl_complex_element!(Complex64, f32, DType::Complex64);
impl_complex_element!(Complex128, f64, DType::Complex128);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_mapping() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(f64::DTYPE, DType::F64);
        assert_eq!(Complex64::DTYPE, DType::Complex64);
        assert_eq!(Complex128::DTYPE, DType::Complex128);
        assert!(Complex128::IS_COMPLEX);
        assert!(!f64::IS_COMPLEX);
    }

    #[test]
    fn test_complex_element_ops() {
        let z = Complex128::new(3.0, -4.0);
        assert_eq!(Element::magnitude(z), 5.0);
        assert_eq!(z.re(), 3.0);
        assert_eq!(Element::conj(z), Complex128::new(3.0, 4.0));
        assert!(Complex128::new(f64::NAN, 0.0).has_nan());
    }
}
