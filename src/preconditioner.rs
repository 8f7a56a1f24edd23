//! Definition of the `Preconditioner` trait as well as the smoothers that
//! implement it. The multilevel structure in [`crate::multilevel`] is itself
//! a `Preconditioner`, built out of one smoother per level.

use sprs::CsMatView;

use crate::Vector;

pub trait Preconditioner {
    /// Replace `r` with the action of the approximate inverse on `r`.
    fn apply(&mut self, r: &mut Vector);
}

/// A preconditioner that can be constructed directly from a level's
/// operator, which is how the hierarchy installs one smoother per level.
pub trait Smoother: Preconditioner + Sized {
    fn from_operator(a: CsMatView<f64>) -> Self;
}

/// L1 smoother: diagonal scaling by the inverse absolute row sums.
/// Symmetric and unconditionally convergent for s.p.d. operators, which
/// keeps the whole V-cycle symmetric for use inside PCG.
pub struct L1 {
    l1_inverse: Vector,
}

impl Preconditioner for L1 {
    fn apply(&mut self, r: &mut Vector) {
        *r *= &self.l1_inverse;
    }
}

impl Smoother for L1 {
    fn from_operator(a: CsMatView<f64>) -> Self {
        let mut row_sums = vec![0.0_f64; a.rows()];
        for (&val, (i, _)) in a.iter() {
            row_sums[i] += val.abs();
        }
        let l1_inverse: Vec<f64> = row_sums
            .into_iter()
            .map(|sum| if sum == 0.0 { 0.0 } else { 1.0 / sum })
            .collect();
        Self {
            l1_inverse: Vector::from(l1_inverse),
        }
    }
}

/// Damped Jacobi smoother, `x += omega * D^{-1} r` with a fixed `omega`
/// of 2/3. Rows without a diagonal entry are left untouched.
pub struct DiagonalSmoother {
    scaled_diag_inverse: Vector,
}

impl Preconditioner for DiagonalSmoother {
    fn apply(&mut self, r: &mut Vector) {
        *r *= &self.scaled_diag_inverse;
    }
}

impl Smoother for DiagonalSmoother {
    fn from_operator(a: CsMatView<f64>) -> Self {
        const OMEGA: f64 = 2.0 / 3.0;
        let mut diag = vec![0.0_f64; a.rows()];
        for (&val, (i, j)) in a.iter() {
            if i == j {
                diag[i] = val;
            }
        }
        let scaled: Vec<f64> = diag
            .into_iter()
            .map(|d| if d == 0.0 { 0.0 } else { OMEGA / d })
            .collect();
        Self {
            scaled_diag_inverse: Vector::from(scaled),
        }
    }
}
