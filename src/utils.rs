//! General utilities that don't have a specific home: random vectors, norm
//! helpers, a spectral radius estimate, and a model problem generator used
//! by the tests and the demo binary.

use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sprs::CsMatView;

use crate::parallel_ops::spmv;
use crate::{CooMatrix, CsrMatrix, Vector};

pub fn random_vec(size: usize) -> Vector {
    Vector::random(size, Uniform::new(-2.0_f64, 2.0_f64))
}

pub fn norm(vec: &Vector) -> f64 {
    vec.dot(vec).sqrt()
}

/// Estimate of the spectral radius of `mat` by power iteration.
///
/// Smoothed aggregation only needs `rho(D^{-1} A)` to a few digits to scale
/// the Jacobi weight, so a fixed iteration count is plenty. The starting
/// vector is random to avoid landing in an eigenvector's complement, but
/// drawn from a fixed seed so that rebuilding a hierarchy from the same
/// input reproduces it exactly.
pub fn spectral_radius(mat: CsMatView<f64>, iterations: usize) -> f64 {
    let n = mat.rows();
    if n == 0 {
        return 0.0;
    }
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut v = Vector::random_using(n, Uniform::new(-1.0_f64, 1.0_f64), &mut rng);
    let scale = norm(&v);
    if scale == 0.0 {
        return 0.0;
    }
    v /= scale;

    let mut lambda = 0.0;
    for _ in 0..iterations {
        let w = spmv(mat.view(), &v);
        lambda = norm(&w);
        if lambda == 0.0 {
            return 0.0;
        }
        v = w / lambda;
    }
    lambda
}

/// Five-point finite difference Laplacian on an `nx` by `ny` grid with
/// homogeneous Dirichlet boundary, the standard s.p.d. model problem. The
/// result is pentadiagonal for `nx, ny > 2`.
pub fn grid_laplacian(nx: usize, ny: usize) -> CsrMatrix {
    let n = nx * ny;
    let mut mat = CooMatrix::new((n, n));
    let idx = |i: usize, j: usize| i * ny + j;

    for i in 0..nx {
        for j in 0..ny {
            let row = idx(i, j);
            mat.add_triplet(row, row, 4.0);
            if i > 0 {
                mat.add_triplet(row, idx(i - 1, j), -1.0);
            }
            if i + 1 < nx {
                mat.add_triplet(row, idx(i + 1, j), -1.0);
            }
            if j > 0 {
                mat.add_triplet(row, idx(i, j - 1), -1.0);
            }
            if j + 1 < ny {
                mat.add_triplet(row, idx(i, j + 1), -1.0);
            }
        }
    }

    mat.to_csr()
}
