//! Common scalar trait for the dense and block low-rank kernels.
//!
//! The trait keeps all magnitudes and tolerances in `f64` regardless of the
//! working precision, so options records and stopping criteria do not need a
//! second generic parameter.

use bytemuck::Pod;
use num_complex::{Complex32, Complex64};
use num_traits::{Float, One, Zero};

/// Scalar type of a matrix: real or complex, single or double precision.
///
/// The `Pod` bound lets scalar buffers cross the communicator as raw bytes
/// without a per-type serialization layer.
pub trait Scalar:
    Copy
    + Clone
    + Default
    + PartialEq
    + Zero
    + One
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::ops::Neg<Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + std::fmt::Debug
    + std::fmt::Display
    + Pod
    + Send
    + Sync
    + 'static
{
    /// True for `Complex32`/`Complex64`.
    const IS_COMPLEX: bool;

    /// Complex conjugate of the value.
    fn conj(self) -> Self;

    /// Square of the absolute value (for complex numbers, |z|^2).
    fn abs_sq(self) -> f64;

    /// Absolute value as f64.
    fn abs_val(self) -> f64 {
        self.abs_sq().sqrt()
    }

    /// Create from an f64 value (imaginary part zero for complex types).
    fn from_f64(val: f64) -> Self;

    /// Create from real and imaginary parts; the imaginary part is ignored
    /// for real types.
    fn from_re_im(re: f64, im: f64) -> Self;

    /// Real part as f64.
    fn re(self) -> f64;

    /// Imaginary part as f64 (zero for real types).
    fn im(self) -> f64;

    /// Multiply by a real factor.
    fn mul_real(self, val: f64) -> Self;

    /// Check if any component is NaN.
    fn is_nan(self) -> bool;

    /// Check if all components are finite.
    fn is_finite(self) -> bool;

    /// Machine epsilon of the underlying real representation.
    fn epsilon() -> f64;
}

impl Scalar for f32 {
    const IS_COMPLEX: bool = false;

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs_sq(self) -> f64 {
        let v = self as f64;
        v * v
    }

    #[inline]
    fn abs_val(self) -> f64 {
        Float::abs(self) as f64
    }

    #[inline]
    fn from_f64(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn from_re_im(re: f64, _im: f64) -> Self {
        re as f32
    }

    #[inline]
    fn re(self) -> f64 {
        self as f64
    }

    #[inline]
    fn im(self) -> f64 {
        0.0
    }

    #[inline]
    fn mul_real(self, val: f64) -> Self {
        self * val as f32
    }

    #[inline]
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }

    #[inline]
    fn epsilon() -> f64 {
        f32::EPSILON as f64
    }
}

impl Scalar for f64 {
    const IS_COMPLEX: bool = false;

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs_sq(self) -> f64 {
        self * self
    }

    #[inline]
    fn abs_val(self) -> f64 {
        Float::abs(self)
    }

    #[inline]
    fn from_f64(val: f64) -> Self {
        val
    }

    #[inline]
    fn from_re_im(re: f64, _im: f64) -> Self {
        re
    }

    #[inline]
    fn re(self) -> f64 {
        self
    }

    #[inline]
    fn im(self) -> f64 {
        0.0
    }

    #[inline]
    fn mul_real(self, val: f64) -> Self {
        self * val
    }

    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    #[inline]
    fn epsilon() -> f64 {
        f64::EPSILON
    }
}

impl Scalar for Complex32 {
    const IS_COMPLEX: bool = true;

    #[inline]
    fn conj(self) -> Self {
        Complex32::conj(&self)
    }

    #[inline]
    fn abs_sq(self) -> f64 {
        (self.re as f64) * (self.re as f64) + (self.im as f64) * (self.im as f64)
    }

    #[inline]
    fn from_f64(val: f64) -> Self {
        Complex32::new(val as f32, 0.0)
    }

    #[inline]
    fn from_re_im(re: f64, im: f64) -> Self {
        Complex32::new(re as f32, im as f32)
    }

    #[inline]
    fn re(self) -> f64 {
        self.re as f64
    }

    #[inline]
    fn im(self) -> f64 {
        self.im as f64
    }

    #[inline]
    fn mul_real(self, val: f64) -> Self {
        Complex32::new(self.re * val as f32, self.im * val as f32)
    }

    #[inline]
    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    #[inline]
    fn epsilon() -> f64 {
        f32::EPSILON as f64
    }
}

impl Scalar for Complex64 {
    const IS_COMPLEX: bool = true;

    #[inline]
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }

    #[inline]
    fn abs_sq(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn from_f64(val: f64) -> Self {
        Complex64::new(val, 0.0)
    }

    #[inline]
    fn from_re_im(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    #[inline]
    fn re(self) -> f64 {
        self.re
    }

    #[inline]
    fn im(self) -> f64 {
        self.im
    }

    #[inline]
    fn mul_real(self, val: f64) -> Self {
        Complex64::new(self.re * val, self.im * val)
    }

    #[inline]
    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    #[inline]
    fn epsilon() -> f64 {
        f64::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_scalar() {
        let x = -3.0f64;
        assert_eq!(x.conj(), -3.0);
        assert!((x.abs_sq() - 9.0).abs() < 1e-15);
        assert!((x.abs_val() - 3.0).abs() < 1e-15);
        assert!(!x.is_nan());
        assert!(x.is_finite());
    }

    #[test]
    fn test_complex_scalar() {
        let z = Complex64::new(3.0, -4.0);
        assert_eq!(z.conj(), Complex64::new(3.0, 4.0));
        assert!((z.abs_sq() - 25.0).abs() < 1e-15);
        assert!((z.abs_val() - 5.0).abs() < 1e-15);
        assert_eq!(z.mul_real(2.0), Complex64::new(6.0, -8.0));
        assert!(Complex64::IS_COMPLEX);
        assert!(!f32::IS_COMPLEX);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(f32::from_f64(1.5), 1.5f32);
        assert_eq!(Complex32::from_f64(2.0), Complex32::new(2.0, 0.0));
        assert_eq!(Complex64::from_re_im(1.0, -1.0), Complex64::new(1.0, -1.0));
    }
}
