//! `num_traits` and iterator impls for [`Tracked<B>`].

use std::iter::{Product, Sum};

use num_traits::{One, Zero};

use crate::base::Base;
use crate::tracked::Tracked;

impl<B: Base> Zero for Tracked<B> {
    #[inline]
    fn zero() -> Self {
        Tracked::constant(<B as Base>::zero())
    }

    /// True for an unbound zero; bound values are never treated as zero.
    #[inline]
    fn is_zero(&self) -> bool {
        <Self as Base>::is_identical_zero(self)
    }
}

impl<B: Base> One for Tracked<B> {
    #[inline]
    fn one() -> Self {
        Tracked::constant(<B as Base>::one())
    }
}

impl<B: Base> Sum for Tracked<B> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(<Self as Zero>::zero(), |acc, x| acc + x)
    }
}

impl<B: Base> Product for Tracked<B> {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(<Self as One>::one(), |acc, x| acc * x)
    }
}
