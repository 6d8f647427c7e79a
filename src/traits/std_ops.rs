//! `std::ops` and comparison implementations for [`Tracked<B>`].
//!
//! Each operator records to the tape active on this thread when an operand
//! is bound to it, and panics where the corresponding `try_*` method would
//! return an error.

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::base::{Base, CompareOp};
use crate::tracked::{or_panic, Tracked};

// ──────────────────────────────────────────────
//  Tracked<B> ↔ Tracked<B> operators
// ──────────────────────────────────────────────

impl<B: Base> Add for Tracked<B> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        or_panic(self.try_add(rhs))
    }
}

impl<B: Base> Sub for Tracked<B> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        or_panic(self.try_sub(rhs))
    }
}

impl<B: Base> Mul for Tracked<B> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        or_panic(self.try_mul(rhs))
    }
}

impl<B: Base> Div for Tracked<B> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        or_panic(self.try_div(rhs))
    }
}

impl<B: Base> Neg for Tracked<B> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        or_panic(self.try_neg())
    }
}

impl<B: Base> AddAssign for Tracked<B> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<B: Base> SubAssign for Tracked<B> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<B: Base> MulAssign for Tracked<B> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<B: Base> DivAssign for Tracked<B> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

// ──────────────────────────────────────────────
//  Comparisons
// ──────────────────────────────────────────────

/// `==` and `!=` record a compare operation when an operand is bound.
impl<B: Base> PartialEq for Tracked<B> {
    fn eq(&self, other: &Self) -> bool {
        or_panic(self.try_compare(CompareOp::Eq, *other))
    }

    #[allow(clippy::partialeq_ne_impl)]
    fn ne(&self, other: &Self) -> bool {
        or_panic(self.try_compare(CompareOp::Ne, *other))
    }
}

/// `<`, `<=`, `>`, `>=` record a compare operation when an operand is bound.
/// `partial_cmp` only looks at the values.
impl<B: Base> PartialOrd for Tracked<B> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (a, b) = (self.value, other.value);
        if B::compare(CompareOp::Lt, a, b).ok()? {
            Some(Ordering::Less)
        } else if B::compare(CompareOp::Gt, a, b).ok()? {
            Some(Ordering::Greater)
        } else if B::compare(CompareOp::Eq, a, b).ok()? {
            Some(Ordering::Equal)
        } else {
            None
        }
    }

    fn lt(&self, other: &Self) -> bool {
        or_panic(self.try_compare(CompareOp::Lt, *other))
    }

    fn le(&self, other: &Self) -> bool {
        or_panic(self.try_compare(CompareOp::Le, *other))
    }

    fn gt(&self, other: &Self) -> bool {
        or_panic(self.try_compare(CompareOp::Gt, *other))
    }

    fn ge(&self, other: &Self) -> bool {
        or_panic(self.try_compare(CompareOp::Ge, *other))
    }
}

// ──────────────────────────────────────────────
//  Mixed ops: Tracked<F> with primitive floats
// ──────────────────────────────────────────────

// The scalar is lifted to an unbound constant and pooled only if the other
// operand is bound.
macro_rules! impl_tracked_scalar_ops {
    ($f:ty) => {
        impl Add<$f> for Tracked<$f> {
            type Output = Tracked<$f>;
            #[inline]
            fn add(self, rhs: $f) -> Tracked<$f> {
                self + Tracked::constant(rhs)
            }
        }

        impl Add<Tracked<$f>> for $f {
            type Output = Tracked<$f>;
            #[inline]
            fn add(self, rhs: Tracked<$f>) -> Tracked<$f> {
                Tracked::constant(self) + rhs
            }
        }

        impl Sub<$f> for Tracked<$f> {
            type Output = Tracked<$f>;
            #[inline]
            fn sub(self, rhs: $f) -> Tracked<$f> {
                self - Tracked::constant(rhs)
            }
        }

        impl Sub<Tracked<$f>> for $f {
            type Output = Tracked<$f>;
            #[inline]
            fn sub(self, rhs: Tracked<$f>) -> Tracked<$f> {
                Tracked::constant(self) - rhs
            }
        }

        impl Mul<$f> for Tracked<$f> {
            type Output = Tracked<$f>;
            #[inline]
            fn mul(self, rhs: $f) -> Tracked<$f> {
                self * Tracked::constant(rhs)
            }
        }

        impl Mul<Tracked<$f>> for $f {
            type Output = Tracked<$f>;
            #[inline]
            fn mul(self, rhs: Tracked<$f>) -> Tracked<$f> {
                Tracked::constant(self) * rhs
            }
        }

        impl Div<$f> for Tracked<$f> {
            type Output = Tracked<$f>;
            #[inline]
            fn div(self, rhs: $f) -> Tracked<$f> {
                self / Tracked::constant(rhs)
            }
        }

        impl Div<Tracked<$f>> for $f {
            type Output = Tracked<$f>;
            #[inline]
            fn div(self, rhs: Tracked<$f>) -> Tracked<$f> {
                Tracked::constant(self) / rhs
            }
        }

        impl AddAssign<$f> for Tracked<$f> {
            #[inline]
            fn add_assign(&mut self, rhs: $f) {
                *self = *self + rhs;
            }
        }

        impl SubAssign<$f> for Tracked<$f> {
            #[inline]
            fn sub_assign(&mut self, rhs: $f) {
                *self = *self - rhs;
            }
        }

        impl MulAssign<$f> for Tracked<$f> {
            #[inline]
            fn mul_assign(&mut self, rhs: $f) {
                *self = *self * rhs;
            }
        }

        impl DivAssign<$f> for Tracked<$f> {
            #[inline]
            fn div_assign(&mut self, rhs: $f) {
                *self = *self / rhs;
            }
        }

        impl PartialEq<$f> for Tracked<$f> {
            #[inline]
            fn eq(&self, other: &$f) -> bool {
                *self == Tracked::constant(*other)
            }
        }

        impl PartialOrd<$f> for Tracked<$f> {
            #[inline]
            fn partial_cmp(&self, other: &$f) -> Option<Ordering> {
                self.partial_cmp(&Tracked::constant(*other))
            }

            #[inline]
            fn lt(&self, other: &$f) -> bool {
                *self < Tracked::constant(*other)
            }

            #[inline]
            fn le(&self, other: &$f) -> bool {
                *self <= Tracked::constant(*other)
            }

            #[inline]
            fn gt(&self, other: &$f) -> bool {
                *self > Tracked::constant(*other)
            }

            #[inline]
            fn ge(&self, other: &$f) -> bool {
                *self >= Tracked::constant(*other)
            }
        }
    };
}

impl_tracked_scalar_ops!(f32);
impl_tracked_scalar_ops!(f64);
