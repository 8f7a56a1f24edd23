//! Construction of the grid transfer operators: candidate fitting
//! (tentative prolongator), prolongator smoothing, restriction, and the
//! Galerkin coarse product. Together with strength and aggregation these
//! form the pluggable chain one coarsening step runs through.

use sprs::CsMatView;

use crate::utils::spectral_radius;
use crate::{CooMatrix, CsrMatrix, Error, Result, Vector};

/// Build the tentative prolongator from the aggregate map and the current
/// near-null candidate, and produce the coarse-level candidate.
pub trait FitCandidates: Send + Sync {
    fn fit(
        &self,
        aggregates: &[usize],
        num_aggregates: usize,
        near_null: &Vector,
    ) -> Result<(CsrMatrix, Vector)>;
}

/// Improve the tentative prolongator, typically by damped Jacobi sweeps.
/// Returns the smoothed prolongator and the spectral scale factor used to
/// damp it (kept on the level record for reuse).
pub trait ProlongatorSmoothing: Send + Sync {
    fn smooth(&self, a: CsMatView<f64>, tentative: &CsrMatrix) -> Result<(CsrMatrix, f64)>;
}

/// Derive the restriction operator from the prolongator.
pub trait FormRestriction: Send + Sync {
    fn restriction(&self, p: &CsrMatrix) -> Result<CsrMatrix>;
}

/// Form the coarse operator from `R`, `A` and `P`.
pub trait CoarseProduct: Send + Sync {
    fn coarse(&self, r: &CsrMatrix, a: CsMatView<f64>, p: &CsrMatrix) -> Result<CsrMatrix>;
}

/// Piecewise-constant candidate fit: column `k` of the tentative
/// prolongator is the near-null candidate restricted to aggregate `k` and
/// normalized, and the coarse candidate entry is that restriction's norm.
/// This makes `T * b_coarse == b` exactly.
#[derive(Clone, Copy, Debug, Default)]
pub struct AggregateCandidates;

impl FitCandidates for AggregateCandidates {
    fn fit(
        &self,
        aggregates: &[usize],
        num_aggregates: usize,
        near_null: &Vector,
    ) -> Result<(CsrMatrix, Vector)> {
        let n = aggregates.len();
        if near_null.len() != n {
            return Err(Error::CandidateLength {
                expected: n,
                got: near_null.len(),
            });
        }

        let mut norms = vec![0.0_f64; num_aggregates];
        for (i, &agg) in aggregates.iter().enumerate() {
            norms[agg] += near_null[i] * near_null[i];
        }
        for norm in norms.iter_mut() {
            *norm = norm.sqrt();
        }

        let mut tentative = CooMatrix::new((n, num_aggregates));
        for (i, &agg) in aggregates.iter().enumerate() {
            let scale = if norms[agg] > 0.0 {
                near_null[i] / norms[agg]
            } else {
                0.0
            };
            tentative.add_triplet(i, agg, scale);
        }

        Ok((tentative.to_csr(), Vector::from(norms)))
    }
}

/// Damped Jacobi prolongator smoothing,
/// `P = (I - (omega / rho(D^{-1} A)) D^{-1} A)^sweeps * T`.
#[derive(Clone, Copy, Debug)]
pub struct JacobiSmoothing {
    pub omega: f64,
    pub sweeps: usize,
    /// Power iteration count for the spectral radius estimate.
    pub rho_iterations: usize,
}

impl Default for JacobiSmoothing {
    fn default() -> Self {
        Self {
            omega: 4.0 / 3.0,
            sweeps: 1,
            rho_iterations: 20,
        }
    }
}

impl ProlongatorSmoothing for JacobiSmoothing {
    fn smooth(&self, a: CsMatView<f64>, tentative: &CsrMatrix) -> Result<(CsrMatrix, f64)> {
        let n = a.rows();
        let mut diag = vec![0.0_f64; n];
        for (&val, (i, j)) in a.iter() {
            if i == j {
                diag[i] = val;
            }
        }

        let mut dinv = CooMatrix::new((n, n));
        for (i, &d) in diag.iter().enumerate() {
            if d == 0.0 {
                return Err(Error::ZeroDiagonal { row: i });
            }
            dinv.add_triplet(i, i, 1.0 / d);
        }
        let dinv: CsrMatrix = dinv.to_csr();
        let dinv_a: CsrMatrix = &dinv * &a;

        let rho = spectral_radius(dinv_a.view(), self.rho_iterations);
        if rho <= 0.0 {
            return Err(Error::ZeroDiagonal { row: 0 });
        }

        let damped = dinv_a.map(|v| v * self.omega / rho);
        let mut p = tentative.clone();
        for _ in 0..self.sweeps {
            p = &p - &(&damped * &p);
        }

        Ok((p, rho))
    }
}

/// Restriction as the transpose of the prolongator, the right choice for
/// symmetric problems. Non-symmetric problems substitute their own
/// [`FormRestriction`] here.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransposeRestriction;

impl FormRestriction for TransposeRestriction {
    fn restriction(&self, p: &CsrMatrix) -> Result<CsrMatrix> {
        Ok(p.transpose_view().to_csr())
    }
}

/// Standard Galerkin triple product `R * (A * P)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GalerkinProduct;

impl CoarseProduct for GalerkinProduct {
    fn coarse(&self, r: &CsrMatrix, a: CsMatView<f64>, p: &CsrMatrix) -> Result<CsrMatrix> {
        let ap: CsrMatrix = &a * p;
        Ok(r * &ap)
    }
}
