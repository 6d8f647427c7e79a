use rayon::prelude::*;

use crate::base::Base;
use crate::error::Result;

use super::{OpSequence, RecordedFunction, TaylorCache};

impl<B: Base> OpSequence<B> {
    /// Zero-order values at many points, one cache per worker.
    pub fn forward_batch(&self, points: &[Vec<B>]) -> Result<Vec<Vec<B>>> {
        self.forward_batch_from(&TaylorCache::new(self), points)
    }

    /// Gradients of `w · f` at many points.
    pub fn gradient_batch(&self, points: &[Vec<B>], w: &[B]) -> Result<Vec<Vec<B>>> {
        self.gradient_batch_from(&TaylorCache::new(self), points, w)
    }

    /// Jacobian at `x`, one reverse sweep per dependent run in parallel.
    ///
    /// Returns `J[i][j] = ∂f_i/∂x_j`.
    pub fn jacobian_par(&self, x: &[B]) -> Result<Vec<Vec<B>>> {
        self.jacobian_par_from(TaylorCache::new(self), x)
    }

    fn forward_batch_from(&self, template: &TaylorCache<B>, points: &[Vec<B>]) -> Result<Vec<Vec<B>>> {
        points
            .par_iter()
            .map_init(
                || template.clone(),
                |cache, x| self.forward_with(cache, 0, x),
            )
            .collect()
    }

    fn gradient_batch_from(
        &self,
        template: &TaylorCache<B>,
        points: &[Vec<B>],
        w: &[B],
    ) -> Result<Vec<Vec<B>>> {
        points
            .par_iter()
            .map_init(
                || template.clone(),
                |cache, x| {
                    self.forward_with(cache, 0, x)?;
                    self.reverse_with(cache, 1, w)
                },
            )
            .collect()
    }

    fn jacobian_par_from(&self, mut base: TaylorCache<B>, x: &[B]) -> Result<Vec<Vec<B>>> {
        self.forward_with(&mut base, 0, x)?;
        let m = self.range_size();
        (0..m)
            .into_par_iter()
            .map_init(
                || base.clone(),
                |cache, i| {
                    let mut w = vec![B::zero(); m];
                    w[i] = B::one();
                    self.reverse_with(cache, 1, &w)
                },
            )
            .collect()
    }
}

impl<B: Base> RecordedFunction<B> {
    /// [`OpSequence::forward_batch`] under this function's current dynamic
    /// parameters. The function's own cache is left untouched.
    pub fn forward_batch(&self, points: &[Vec<B>]) -> Result<Vec<Vec<B>>> {
        self.body.forward_batch_from(&self.blank_cache(), points)
    }

    /// [`OpSequence::gradient_batch`] under the current dynamic parameters.
    pub fn gradient_batch(&self, points: &[Vec<B>], w: &[B]) -> Result<Vec<Vec<B>>> {
        self.body.gradient_batch_from(&self.blank_cache(), points, w)
    }

    /// [`OpSequence::jacobian_par`] under the current dynamic parameters.
    pub fn jacobian_par(&self, x: &[B]) -> Result<Vec<Vec<B>>> {
        self.body.jacobian_par_from(self.blank_cache(), x)
    }
}
