//! Parallel implementations of the basic sparse linear algebra kernels the
//! setup and solve phases lean on. These need to be fast.

use rayon::prelude::*;
use sprs::CsMatView;

use crate::Vector;

/// Sparse matrix-vector product `a * b`.
///
/// Rows are processed in parallel when `a` is row-major; a column-major
/// operator falls back to the sequential kernel in `sprs`.
pub fn spmv(a: CsMatView<f64>, b: &Vector) -> Vector {
    assert_eq!(a.cols(), b.len());
    if !a.is_csr() {
        return &a * b;
    }
    let c: Vec<f64> = (0..a.rows())
        .into_par_iter()
        .map(|i| {
            let row = a.outer_view(i).unwrap();
            row.iter().map(|(j, val)| b[j] * val).sum::<f64>()
        })
        .collect();
    Vector::from(c)
}

/// Residual `r = b - a * x`, the kernel at the heart of every smoothing and
/// restriction step of the V-cycle.
pub fn residual(a: CsMatView<f64>, b: &Vector, x: &Vector) -> Vector {
    b - &spmv(a, x)
}
