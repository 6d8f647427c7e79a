//! [`Base`] for [`Tracked<B>`]: tapes over tracked values.
//!
//! A sweep of a `RecordedFunction<Tracked<B>>` runs in `Tracked<B>`
//! arithmetic, so it is itself recorded on the `B` tape active on this thread.

use std::hash::{Hash, Hasher};

use crate::base::{Base, CompareOp};
use crate::error::Result;
use crate::tracked::{or_panic, try_cond_exp, Binding, Tracked};

impl<B: Base> Base for Tracked<B> {
    #[inline]
    fn zero() -> Self {
        Tracked::constant(B::zero())
    }

    #[inline]
    fn one() -> Self {
        Tracked::constant(B::one())
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        Tracked::constant(B::from_f64(value))
    }

    fn nan() -> Self {
        Tracked::constant(B::nan())
    }

    fn infinity() -> Self {
        Tracked::constant(B::infinity())
    }

    fn epsilon() -> Self {
        Tracked::constant(B::epsilon())
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    #[inline]
    fn is_identical_zero(&self) -> bool {
        self.binding == Binding::Unbound && self.value.is_identical_zero()
    }

    #[inline]
    fn is_identical_one(&self) -> bool {
        self.binding == Binding::Unbound && self.value.is_identical_one()
    }

    /// Records on the active tape; cross-tape operands fail instead of
    /// panicking, so a sweep of a nested function reports them.
    fn compare(op: CompareOp, left: Self, right: Self) -> Result<bool> {
        left.try_compare(op, right)
    }

    fn cond_exp(op: CompareOp, left: Self, right: Self, if_true: Self, if_false: Self) -> Result<Self> {
        try_cond_exp(op, left, right, if_true, if_false)
    }

    /// Bound values hash by binding too, so two variables that happen to
    /// share a value are never pooled together.
    fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.value.hash_bits(state);
        self.binding.hash(state);
    }

    fn identical(&self, other: &Self) -> bool {
        self.binding == other.binding && self.value.identical(&other.value)
    }

    #[inline]
    fn to_index(&self) -> Option<usize> {
        self.value.to_index()
    }

    #[inline]
    fn azmul(self, other: Self) -> Self {
        or_panic(self.try_azmul(other))
    }

    fn abs(self) -> Self {
        Tracked::abs(self)
    }
    fn signum(self) -> Self {
        Tracked::signum(self)
    }
    fn sqrt(self) -> Self {
        Tracked::sqrt(self)
    }
    fn exp(self) -> Self {
        Tracked::exp(self)
    }
    fn exp_m1(self) -> Self {
        Tracked::exp_m1(self)
    }
    fn ln(self) -> Self {
        Tracked::ln(self)
    }
    fn ln_1p(self) -> Self {
        Tracked::ln_1p(self)
    }
    fn sin(self) -> Self {
        Tracked::sin(self)
    }
    fn cos(self) -> Self {
        Tracked::cos(self)
    }
    fn tan(self) -> Self {
        Tracked::tan(self)
    }
    fn asin(self) -> Self {
        Tracked::asin(self)
    }
    fn acos(self) -> Self {
        Tracked::acos(self)
    }
    fn atan(self) -> Self {
        Tracked::atan(self)
    }
    fn sinh(self) -> Self {
        Tracked::sinh(self)
    }
    fn cosh(self) -> Self {
        Tracked::cosh(self)
    }
    fn tanh(self) -> Self {
        Tracked::tanh(self)
    }
    fn powf(self, exponent: Self) -> Self {
        Tracked::powf(self, exponent)
    }
}
