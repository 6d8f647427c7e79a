use std::fmt::Debug;
use std::hash::Hasher;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_complex::Complex;
use num_traits::{Float, NumCast};

use crate::error::{AdError, Result};

/// Comparison operators used by compare and conditional-expression opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl CompareOp {
    pub(crate) const ALL: [CompareOp; 6] = [
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Eq,
        CompareOp::Ge,
        CompareOp::Gt,
        CompareOp::Ne,
    ];

    /// Evaluate the comparison on partially ordered values.
    #[inline]
    pub fn holds<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ge => left >= right,
            CompareOp::Gt => left > right,
            CompareOp::Ne => left != right,
        }
    }

    #[inline]
    pub(crate) fn code(self) -> u32 {
        self as u32
    }

    #[inline]
    pub(crate) fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Numeric element type a tape records over.
///
/// Implemented for `f32`, `f64`, `Complex<T>` and for [`Tracked<B>`](crate::Tracked)
/// itself, which is what makes derivatives of derivatives work: a tape over
/// `Tracked<f64>` replays its sweeps in `Tracked<f64>` arithmetic, and those
/// replays are in turn recorded on the inner `f64` tape.
///
/// Besides arithmetic, a base type supplies the elementary functions of the
/// operation catalog, `epsilon`/`nan`/`infinity`, and a bit-level hash used
/// to pool identical constants.
pub trait Base:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn zero() -> Self;
    fn one() -> Self;
    fn from_f64(value: f64) -> Self;
    fn nan() -> Self;
    fn infinity() -> Self;
    fn epsilon() -> Self;

    fn is_finite(&self) -> bool;

    /// True only for a value that is zero no matter what is recorded later.
    fn is_identical_zero(&self) -> bool;
    /// True only for a value that is one no matter what is recorded later.
    fn is_identical_one(&self) -> bool;

    /// Evaluate `left op right`. Fails with [`AdError::Unordered`] when the
    /// values have no order (for example `<` on complex numbers).
    fn compare(op: CompareOp, left: Self, right: Self) -> Result<bool>;

    /// `if left op right { if_true } else { if_false }`.
    fn cond_exp(op: CompareOp, left: Self, right: Self, if_true: Self, if_false: Self) -> Result<Self> {
        Self::compare(op, left, right).map(|c| if c { if_true } else { if_false })
    }

    /// Feed the exact bit pattern of `self` to `state`.
    fn hash_bits<H: Hasher>(&self, state: &mut H);
    /// Bit-for-bit equality, consistent with [`Base::hash_bits`].
    fn identical(&self, other: &Self) -> bool;

    /// Integer part used by indexed loads and stores.
    fn to_index(&self) -> Option<usize>;

    /// Absolute-zero multiply: zero whenever `self` is identically zero,
    /// even if `other` is infinite or NaN.
    fn azmul(self, other: Self) -> Self {
        if self.is_identical_zero() {
            Self::zero()
        } else {
            self * other
        }
    }

    fn abs(self) -> Self;
    /// Sign with `signum(0) == 0`.
    fn signum(self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn exp_m1(self) -> Self;
    fn ln(self) -> Self;
    fn ln_1p(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn asin(self) -> Self;
    fn acos(self) -> Self;
    fn atan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn powf(self, exponent: Self) -> Self;
}

macro_rules! impl_base_for_float {
    ($($t:ty),*) => {$(
        impl Base for $t {
            #[inline] fn zero() -> Self { 0.0 }
            #[inline] fn one() -> Self { 1.0 }
            #[inline] fn from_f64(value: f64) -> Self { value as $t }
            #[inline] fn nan() -> Self { <$t>::NAN }
            #[inline] fn infinity() -> Self { <$t>::INFINITY }
            #[inline] fn epsilon() -> Self { <$t>::EPSILON }
            #[inline] fn is_finite(&self) -> bool { <$t>::is_finite(*self) }
            #[inline] fn is_identical_zero(&self) -> bool { *self == 0.0 }
            #[inline] fn is_identical_one(&self) -> bool { *self == 1.0 }

            #[inline]
            fn compare(op: CompareOp, left: Self, right: Self) -> Result<bool> {
                Ok(op.holds(&left, &right))
            }

            #[inline]
            fn hash_bits<H: Hasher>(&self, state: &mut H) {
                state.write_u64(self.to_bits() as u64);
            }

            #[inline]
            fn identical(&self, other: &Self) -> bool {
                self.to_bits() == other.to_bits()
            }

            fn to_index(&self) -> Option<usize> {
                if <$t>::is_finite(*self) && *self >= 0.0 {
                    Some(<$t>::floor(*self) as usize)
                } else {
                    None
                }
            }

            #[inline] fn abs(self) -> Self { <$t>::abs(self) }

            #[inline]
            fn signum(self) -> Self {
                if self > 0.0 {
                    1.0
                } else if self < 0.0 {
                    -1.0
                } else {
                    // keeps NaN as NaN, maps both zeros to +0
                    self * 0.0
                }
            }

            #[inline] fn sqrt(self) -> Self { <$t>::sqrt(self) }
            #[inline] fn exp(self) -> Self { <$t>::exp(self) }
            #[inline] fn exp_m1(self) -> Self { <$t>::exp_m1(self) }
            #[inline] fn ln(self) -> Self { <$t>::ln(self) }
            #[inline] fn ln_1p(self) -> Self { <$t>::ln_1p(self) }
            #[inline] fn sin(self) -> Self { <$t>::sin(self) }
            #[inline] fn cos(self) -> Self { <$t>::cos(self) }
            #[inline] fn tan(self) -> Self { <$t>::tan(self) }
            #[inline] fn asin(self) -> Self { <$t>::asin(self) }
            #[inline] fn acos(self) -> Self { <$t>::acos(self) }
            #[inline] fn atan(self) -> Self { <$t>::atan(self) }
            #[inline] fn sinh(self) -> Self { <$t>::sinh(self) }
            #[inline] fn cosh(self) -> Self { <$t>::cosh(self) }
            #[inline] fn tanh(self) -> Self { <$t>::tanh(self) }
            #[inline] fn powf(self, exponent: Self) -> Self { <$t>::powf(self, exponent) }
        }
    )*};
}

impl_base_for_float!(f32, f64);

fn hash_float<T: Float, H: Hasher>(value: T, state: &mut H) {
    let (mantissa, exponent, sign) = value.integer_decode();
    state.write_u64(mantissa);
    state.write_i16(exponent);
    state.write_i8(sign);
}

/// Complex numbers only support equality comparisons; ordered comparisons
/// are reported as unordered. `abs` and `signum` use the modulus, which is
/// not holomorphic, so their recorded derivatives are only meaningful along
/// the real axis.
impl<T> Base for Complex<T>
where
    T: Float + Debug + Send + Sync + 'static,
{
    fn zero() -> Self {
        Complex::new(T::zero(), T::zero())
    }

    fn one() -> Self {
        Complex::new(T::one(), T::zero())
    }

    fn from_f64(value: f64) -> Self {
        Complex::new(<T as NumCast>::from(value).unwrap_or_else(T::nan), T::zero())
    }

    fn nan() -> Self {
        Complex::new(T::nan(), T::nan())
    }

    fn infinity() -> Self {
        Complex::new(T::infinity(), T::zero())
    }

    fn epsilon() -> Self {
        Complex::new(T::epsilon(), T::zero())
    }

    fn is_finite(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn is_identical_zero(&self) -> bool {
        self.re == T::zero() && self.im == T::zero()
    }

    fn is_identical_one(&self) -> bool {
        self.re == T::one() && self.im == T::zero()
    }

    fn compare(op: CompareOp, left: Self, right: Self) -> Result<bool> {
        match op {
            CompareOp::Eq => Ok(left == right),
            CompareOp::Ne => Ok(left != right),
            _ => Err(AdError::Unordered { op }),
        }
    }

    fn hash_bits<H: Hasher>(&self, state: &mut H) {
        hash_float(self.re, state);
        hash_float(self.im, state);
    }

    fn identical(&self, other: &Self) -> bool {
        self.re.integer_decode() == other.re.integer_decode()
            && self.im.integer_decode() == other.im.integer_decode()
    }

    fn to_index(&self) -> Option<usize> {
        if self.re.is_finite() && self.re >= T::zero() {
            self.re.floor().to_usize()
        } else {
            None
        }
    }

    fn abs(self) -> Self {
        Complex::new(self.norm(), T::zero())
    }

    fn signum(self) -> Self {
        let norm = self.norm();
        if norm == T::zero() {
            Self::zero()
        } else {
            self.unscale(norm)
        }
    }

    fn sqrt(self) -> Self {
        Complex::sqrt(self)
    }

    fn exp(self) -> Self {
        Complex::exp(self)
    }

    fn exp_m1(self) -> Self {
        Complex::exp(self) - Self::one()
    }

    fn ln(self) -> Self {
        Complex::ln(self)
    }

    fn ln_1p(self) -> Self {
        Complex::ln(self + Self::one())
    }

    fn sin(self) -> Self {
        Complex::sin(self)
    }

    fn cos(self) -> Self {
        Complex::cos(self)
    }

    fn tan(self) -> Self {
        Complex::tan(self)
    }

    fn asin(self) -> Self {
        Complex::asin(self)
    }

    fn acos(self) -> Self {
        Complex::acos(self)
    }

    fn atan(self) -> Self {
        Complex::atan(self)
    }

    fn sinh(self) -> Self {
        Complex::sinh(self)
    }

    fn cosh(self) -> Self {
        Complex::cosh(self)
    }

    fn tanh(self) -> Self {
        Complex::tanh(self)
    }

    fn powf(self, exponent: Self) -> Self {
        self.powc(exponent)
    }
}

/// `B::from_f64(n as f64)` for small integer factors in the Taylor rules.
#[inline]
pub(crate) fn real<B: Base>(n: usize) -> B {
    B::from_f64(n as f64)
}
