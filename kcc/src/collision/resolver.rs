//! Combines several per-collider penetration corrections into one displacement.
//!
//! Each correction is a unit direction `n_i` and a depth `d_i`. A displacement
//! `x` satisfies correction `i` when `dot(n_i, x) >= d_i`. Three strategies are
//! provided, trading accuracy for cost:
//!
//! - `min_max`: per-axis extremes. Cheap, can overshoot on diagonals.
//! - `binary`: exact for two corrections, bisecting between their normals.
//! - `gradient_descent`: iterative projection onto the constraint set, any count.

use crate::{
    constants::{CACHE_SIZE, DIST_EPS, RESOLVER_BINARY_ITERATIONS},
    math::{Vec3, lerp_vec, normalize_or_zero},
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Correction {
    pub direction: Vec3,
    pub distance: f32,
}

impl Correction {
    #[inline]
    pub fn amount(&self) -> Vec3 {
        self.direction * self.distance
    }
}

/// Accumulates corrections for one depenetration pass.
#[derive(Clone, Debug)]
pub struct CorrectionResolver {
    corrections: Vec<Correction>,
}

impl Default for CorrectionResolver {
    fn default() -> Self {
        Self {
            corrections: Vec::with_capacity(CACHE_SIZE),
        }
    }
}

impl CorrectionResolver {
    #[inline]
    pub fn reset(&mut self) {
        self.corrections.clear();
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.corrections.len()
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    /// Zero-length directions and non-positive depths are dropped.
    pub fn add_correction(&mut self, direction: Vec3, distance: f32) {
        let direction = normalize_or_zero(direction);
        if direction == Vec3::zeros() || distance <= 0.0 || !distance.is_finite() {
            return;
        }
        if self.corrections.len() >= CACHE_SIZE {
            return;
        }
        self.corrections.push(Correction {
            direction,
            distance,
        });
    }

    /// Dot product of the first two correction directions. 1 when fewer exist.
    pub fn dot(&self) -> f32 {
        match self.corrections.as_slice() {
            [a, b, ..] => a.direction.dot(&b.direction),
            _ => 1.0,
        }
    }

    /// Picks a strategy by correction count.
    pub fn resolve(&self, max_iterations: usize, max_error: f32) -> Vec3 {
        match self.corrections.as_slice() {
            [] => Vec3::zeros(),
            [single] => single.amount(),
            [_, _] if self.dot() >= 0.0 => self.min_max(),
            [_, _] => self.binary(),
            _ => self.gradient_descent(max_iterations, max_error),
        }
    }

    /// Sum of the per-axis minimum and maximum correction components.
    pub fn min_max(&self) -> Vec3 {
        let mut min = Vec3::zeros();
        let mut max = Vec3::zeros();
        for correction in &self.corrections {
            let amount = correction.amount();
            min = min.inf(&amount);
            max = max.sup(&amount);
        }
        min + max
    }

    /// Exact resolution for two corrections; falls back to `min_max` otherwise.
    pub fn binary(&self) -> Vec3 {
        let [c0, c1] = self.corrections.as_slice() else {
            return self.min_max();
        };

        let a0 = c0.amount();
        let a1 = c1.amount();

        // one correction already clears the other
        if c1.direction.dot(&a0) >= c1.distance - DIST_EPS {
            return a0;
        }
        if c0.direction.dot(&a1) >= c0.distance - DIST_EPS {
            return a1;
        }

        // antiparallel: no single direction satisfies both
        if (c0.direction + c1.direction).norm() < 1.0e-4 {
            return a0 + a1;
        }

        let reach = |n: Vec3, d: f32, dir: Vec3| {
            let cos = n.dot(&dir);
            if cos > DIST_EPS { d / cos } else { f32::INFINITY }
        };

        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        let mut best_dir = normalize_or_zero(lerp_vec(c0.direction, c1.direction, 0.5));
        for _ in 0..RESOLVER_BINARY_ITERATIONS {
            let w = (lo + hi) * 0.5;
            let dir = normalize_or_zero(lerp_vec(c0.direction, c1.direction, w));
            if dir == Vec3::zeros() {
                break;
            }
            best_dir = dir;
            let r0 = reach(c0.direction, c0.distance, dir);
            let r1 = reach(c1.direction, c1.distance, dir);
            // move towards the normal whose constraint needs the longer reach
            if r0 > r1 {
                hi = w;
            } else {
                lo = w;
            }
        }

        let r0 = reach(c0.direction, c0.distance, best_dir);
        let r1 = reach(c1.direction, c1.distance, best_dir);
        let r = r0.max(r1);
        if r.is_finite() { best_dir * r } else { a0 + a1 }
    }

    /// Minimum-norm displacement satisfying every correction, found by
    /// coordinate ascent on the dual (non-negative multipliers per correction).
    pub fn gradient_descent(&self, max_iterations: usize, max_error: f32) -> Vec3 {
        if self.corrections.is_empty() {
            return Vec3::zeros();
        }

        let mut lambdas = vec![0.0f32; self.corrections.len()];
        let mut x = Vec3::zeros();

        for _ in 0..max_iterations.max(1) {
            let mut max_change = 0.0f32;
            for (lambda, correction) in lambdas.iter_mut().zip(&self.corrections) {
                let delta = correction.distance - correction.direction.dot(&x);
                let next = (*lambda + delta).max(0.0);
                let change = next - *lambda;
                if change != 0.0 {
                    x += correction.direction * change;
                    *lambda = next;
                }
                max_change = max_change.max(change.abs());
            }
            if max_change <= max_error {
                break;
            }
        }

        x
    }
}
