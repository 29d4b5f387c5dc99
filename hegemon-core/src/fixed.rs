//! Fixed-point arithmetic for deterministic simulation.
//!
//! All authoritative values use this type to ensure identical results across
//! platforms. Floats (f32/f64) are banned in sim logic due to x87/SSE/FMA
//! differences; they may only appear at the display/parse boundary.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use thiserror::Error;

/// Arithmetic failures surfaced by the checked operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("fixed-point overflow")]
    Overflow,
    #[error("square root of negative value")]
    NegativeSqrt,
}

/// Signed 64-bit fixed-point value with 32 fractional bits (32.32).
///
/// Integer range is ±2^31 with ~9 decimal digits of fraction, enough for
/// treasuries, opinions and per-tick rates alike. All arithmetic stays in
/// the integer domain; mul/div widen through i128.
///
/// Addition and subtraction saturate. Multiplication and division have
/// checked variants returning [`MathError`]; the operator forms saturate on
/// overflow and return [`Fixed::ZERO`] as the division-by-zero sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Fixed(pub i64);

impl Fixed {
    /// Number of fractional bits.
    pub const FRAC_BITS: u32 = 32;

    /// Scale factor: 2^32 = 1.0
    pub const SCALE: i64 = 1 << Self::FRAC_BITS;

    /// Common constants
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(Self::SCALE);
    pub const TWO: Fixed = Fixed(2 * Self::SCALE);
    pub const HALF: Fixed = Fixed(Self::SCALE / 2);
    pub const MAX: Fixed = Fixed(i64::MAX);
    pub const MIN: Fixed = Fixed(i64::MIN);

    /// Create from raw scaled value
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Fixed(raw)
    }

    /// Create from integer (e.g., 5 → 5 × 2^32). Saturates out of range.
    #[inline]
    pub const fn from_int(v: i64) -> Self {
        let wide = (v as i128) << Self::FRAC_BITS;
        if wide > i64::MAX as i128 {
            Fixed(i64::MAX)
        } else if wide < i64::MIN as i128 {
            Fixed(i64::MIN)
        } else {
            Fixed(wide as i64)
        }
    }

    /// Create the exact fraction `num / den`. `den == 0` yields ZERO.
    ///
    /// This is how configured rates (speeds, percentages) enter the sim
    /// without ever passing through a float literal.
    #[inline]
    pub const fn from_ratio(num: i64, den: i64) -> Self {
        if den == 0 {
            return Fixed::ZERO;
        }
        Fixed(((num as i128) * (Self::SCALE as i128) / (den as i128)) as i64)
    }

    /// Convert from f32 (parse/display boundary only, never in sim logic).
    ///
    /// Uses `.round()` for cross-platform determinism. Guards against
    /// NaN/Inf/overflow.
    #[inline]
    pub fn from_f32(v: f32) -> Self {
        if !v.is_finite() {
            return Fixed::ZERO;
        }

        let scaled = v as f64 * Self::SCALE as f64;

        if scaled > i64::MAX as f64 {
            return Fixed(i64::MAX);
        }
        if scaled < i64::MIN as f64 {
            return Fixed(i64::MIN);
        }

        Fixed(scaled.round() as i64)
    }

    /// Convert to f32 (display only, not in sim logic)
    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::SCALE as f32
    }

    /// Convert to f64 (display only, higher precision)
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Raw integer value
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Truncate to integer (rounds toward zero)
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 / Self::SCALE
    }

    /// Largest integer value ≤ self, as Fixed.
    #[inline]
    pub const fn floor(self) -> Fixed {
        // Arithmetic shift keeps this exact for negative values.
        Fixed((self.0 >> Self::FRAC_BITS) << Self::FRAC_BITS)
    }

    /// Smallest integer value ≥ self, as Fixed.
    #[inline]
    pub const fn ceil(self) -> Fixed {
        let frac = self.0 & (Self::SCALE - 1);
        if frac == 0 {
            self
        } else {
            Fixed(self.floor().0.saturating_add(Self::SCALE))
        }
    }

    /// Nearest integer value, ties rounding away from zero.
    #[inline]
    pub const fn round(self) -> Fixed {
        if self.0 >= 0 {
            Fixed(self.0.saturating_add(Self::SCALE / 2)).floor()
        } else if self.0 == i64::MIN {
            self.floor()
        } else {
            // Mirror the positive case through negation so ties move away
            // from zero.
            let magnitude = Fixed((-self.0).saturating_add(Self::SCALE / 2)).floor();
            Fixed(-magnitude.0)
        }
    }

    /// Absolute value (saturates on i64::MIN).
    #[inline]
    pub const fn abs(self) -> Fixed {
        if self.0 == i64::MIN {
            Fixed(i64::MAX)
        } else if self.0 < 0 {
            Fixed(-self.0)
        } else {
            self
        }
    }

    /// Returns the smaller of two Fixed values (deterministic)
    #[inline]
    pub fn min(self, other: Fixed) -> Fixed {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Returns the larger of two Fixed values (deterministic)
    #[inline]
    pub fn max(self, other: Fixed) -> Fixed {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Clamp into `[lo, hi]`.
    #[inline]
    pub fn clamp(self, lo: Fixed, hi: Fixed) -> Fixed {
        self.max(lo).min(hi)
    }

    /// Saturating add (clamps at i64::MAX/MIN)
    #[inline]
    pub fn saturating_add(self, other: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(other.0))
    }

    /// Saturating subtract
    #[inline]
    pub fn saturating_sub(self, other: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(other.0))
    }

    /// Checked multiply: `(a × b) >> 32` with overflow detection.
    #[inline]
    pub fn checked_mul(self, other: Fixed) -> Result<Fixed, MathError> {
        let wide = (self.0 as i128 * other.0 as i128) >> Self::FRAC_BITS;
        if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
            Err(MathError::Overflow)
        } else {
            Ok(Fixed(wide as i64))
        }
    }

    /// Checked divide: `(a << 32) / b` with zero and overflow detection.
    #[inline]
    pub fn checked_div(self, other: Fixed) -> Result<Fixed, MathError> {
        if other.0 == 0 {
            return Err(MathError::DivisionByZero);
        }
        let wide = ((self.0 as i128) << Self::FRAC_BITS) / other.0 as i128;
        if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
            Err(MathError::Overflow)
        } else {
            Ok(Fixed(wide as i64))
        }
    }

    /// Checked square root. Negative input is an error.
    pub fn checked_sqrt(self) -> Result<Fixed, MathError> {
        if self.0 < 0 {
            return Err(MathError::NegativeSqrt);
        }
        // sqrt(v) in 32.32 = isqrt(raw << 32): the shift restores the scale
        // lost by the square root.
        let wide = (self.0 as u128) << Self::FRAC_BITS;
        Ok(Fixed(isqrt_u128(wide) as i64))
    }

    /// Square root; ZERO sentinel for negative input.
    #[inline]
    pub fn sqrt(self) -> Fixed {
        self.checked_sqrt().unwrap_or(Fixed::ZERO)
    }

    /// Integer power by squaring. `powi(0) == ONE`.
    pub fn powi(self, mut exp: u32) -> Fixed {
        let mut base = self;
        let mut acc = Fixed::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc * base;
            }
            exp >>= 1;
            if exp > 0 {
                base = base * base;
            }
        }
        acc
    }

    /// Linear interpolation: `self + (other - self) × t`.
    ///
    /// `t` outside [0, 1] extrapolates.
    #[inline]
    pub fn lerp(self, other: Fixed, t: Fixed) -> Fixed {
        self.saturating_add((other.saturating_sub(self)) * t)
    }

    /// Remap from `[in_lo, in_hi]` to `[out_lo, out_hi]`.
    ///
    /// A degenerate input range yields `out_lo`.
    pub fn remap(self, in_lo: Fixed, in_hi: Fixed, out_lo: Fixed, out_hi: Fixed) -> Fixed {
        let in_range = in_hi.saturating_sub(in_lo);
        if in_range == Fixed::ZERO {
            return out_lo;
        }
        let t = self.saturating_sub(in_lo) / in_range;
        out_lo.lerp(out_hi, t)
    }
}

/// Integer square root by the classic bit-by-bit method. No float anywhere.
const fn isqrt_u128(v: u128) -> u128 {
    if v == 0 {
        return 0;
    }
    let mut x = v;
    let mut result = 0u128;
    // Highest power of four <= v
    let mut bit = 1u128 << ((127 - v.leading_zeros()) & !1);
    while bit != 0 {
        if x >= result + bit {
            x -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result
}

impl Add for Fixed {
    type Output = Fixed;
    #[inline]
    fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, other: Fixed) {
        *self = *self + other;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    #[inline]
    fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Fixed {
    #[inline]
    fn sub_assign(&mut self, other: Fixed) {
        *self = *self - other;
    }
}

impl Mul for Fixed {
    type Output = Fixed;
    #[inline]
    fn mul(self, other: Fixed) -> Fixed {
        match self.checked_mul(other) {
            Ok(v) => v,
            Err(_) => {
                if (self.0 < 0) ^ (other.0 < 0) {
                    Fixed::MIN
                } else {
                    Fixed::MAX
                }
            }
        }
    }
}

impl MulAssign for Fixed {
    #[inline]
    fn mul_assign(&mut self, other: Fixed) {
        *self = *self * other;
    }
}

impl Div for Fixed {
    type Output = Fixed;
    #[inline]
    fn div(self, other: Fixed) -> Fixed {
        match self.checked_div(other) {
            Ok(v) => v,
            // ZERO is the documented division-by-zero sentinel.
            Err(MathError::DivisionByZero) => Fixed::ZERO,
            Err(_) => {
                if (self.0 < 0) ^ (other.0 < 0) {
                    Fixed::MIN
                } else {
                    Fixed::MAX
                }
            }
        }
    }
}

impl DivAssign for Fixed {
    #[inline]
    fn div_assign(&mut self, other: Fixed) {
        *self = *self / other;
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    #[inline]
    fn neg(self) -> Fixed {
        Fixed(0i64.saturating_sub(self.0))
    }
}

impl std::iter::Sum for Fixed {
    fn sum<I: Iterator<Item = Fixed>>(iter: I) -> Fixed {
        iter.fold(Fixed::ZERO, |a, b| a + b)
    }
}

impl std::fmt::Debug for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fixed({} = {})", self.0, self.to_f64())
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.to_f64())
    }
}
