//! Strength-of-connection filters. The aggregation step groups unknowns by
//! walking the graph of *strong* couplings only, so the filter decides what
//! the coarsening is allowed to see.

use sprs::CsMatView;

use crate::{CooMatrix, CsrMatrix, Error, Result};

/// First stage of the coarsening chain: mark which off-diagonal entries of
/// the operator are strong connections.
pub trait StrengthOfConnection: Send + Sync {
    fn strength(&self, a: CsMatView<f64>) -> Result<CsrMatrix>;
}

/// Symmetric strength measure: `a_ij` is strong when
/// `|a_ij| >= theta * sqrt(|a_ii| * |a_jj|)`.
///
/// Diagonal entries are always kept so the strength graph never loses a
/// vertex. With `theta = 0` every entry is strong and the filter degenerates
/// to a copy of the operator's pattern.
#[derive(Clone, Copy, Debug)]
pub struct SymmetricStrength {
    pub theta: f64,
}

impl Default for SymmetricStrength {
    fn default() -> Self {
        Self { theta: 0.0 }
    }
}

impl SymmetricStrength {
    pub fn new(theta: f64) -> Self {
        Self { theta }
    }
}

impl StrengthOfConnection for SymmetricStrength {
    fn strength(&self, a: CsMatView<f64>) -> Result<CsrMatrix> {
        let n = a.rows();
        if n == 0 {
            return Err(Error::EmptyOperator);
        }

        let mut diag = vec![0.0; n];
        for (&val, (i, j)) in a.iter() {
            if i == j {
                diag[i] = val.abs();
            }
        }

        let mut strong = CooMatrix::new((n, a.cols()));
        for (&val, (i, j)) in a.iter() {
            if i == j || val.abs() * val.abs() >= self.theta * self.theta * diag[i] * diag[j] {
                strong.add_triplet(i, j, val);
            }
        }

        Ok(strong.to_csr())
    }
}
