use crate::parallel_ops::spmv;
use crate::preconditioner::Preconditioner;
use crate::{CsrMatrix, Vector};

/// Stationary iterative method based on the preconditioner. Solves the
/// system Ax = b for x where 'mat' is A and 'rhs' is b. Common
/// preconditioners include the L1 smoother, damped Jacobi, and multilevel
/// methods.
pub fn stationary<P>(
    mat: &CsrMatrix,
    rhs: &Vector,
    initial_iterate: &Vector,
    max_iter: usize,
    epsilon: f64,
    preconditioner: &mut P,
) -> (Vector, bool)
where
    P: Preconditioner,
{
    let mut x = initial_iterate.clone();
    let mut r = rhs - &spmv(mat.view(), &x);
    let r0_norm = r.t().dot(&r);
    let epsilon_squared = epsilon * epsilon;

    for iter in 0..max_iter {
        r = rhs - &spmv(mat.view(), &x);
        let r_norm = r.t().dot(&r);

        if iter % 50 == 0 {
            trace!("squared norm iter {iter}: {r_norm}");
        }

        if r_norm < epsilon_squared * r0_norm {
            info!("converged in {iter} iterations\n");
            return (x, true);
        }

        preconditioner.apply(&mut r);
        x += &r;
    }

    (x, false)
}

/// Preconditioned conjugate gradient. Solves the system Ax = b for x where
/// 'mat' is A and 'rhs' is b. The preconditioner replaces a residual with
/// the action of the approximate inverse on that residual.
pub fn pcg<P>(
    mat: &CsrMatrix,
    rhs: &Vector,
    initial_iterate: &Vector,
    max_iter: usize,
    epsilon: f64,
    preconditioner: &mut P,
) -> (Vector, bool)
where
    P: Preconditioner,
{
    let mut x = initial_iterate.clone();
    let mut r = rhs - &spmv(mat.view(), &x);
    let mut r_bar = r.clone();
    preconditioner.apply(&mut r_bar);
    let d0 = r.t().dot(&r_bar);
    let mut d = d0;
    let mut p = r_bar.clone();

    for i in 0..max_iter {
        let mut g = spmv(mat.view(), &p);
        let alpha = d / p.t().dot(&g);
        g *= alpha;
        x += &(alpha * &p);
        r -= &g;
        r_bar = r.clone();
        preconditioner.apply(&mut r_bar);
        let d_old = d;
        d = r.t().dot(&r_bar);

        if i % 50 == 0 {
            trace!("squared norm iter {i}: {d}");
        }

        if d < epsilon * epsilon * d0 {
            info!("converged in {i} iterations\n");
            return (x, true);
        }

        let beta = d / d_old;
        p *= beta;
        p += &r_bar;
    }

    (x, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel_ops::residual;
    use crate::preconditioner::{Smoother, L1};
    use crate::utils::{grid_laplacian, norm, random_vec};

    #[test]
    fn pcg_with_l1_solves_the_model_problem() {
        let a = grid_laplacian(8, 8);
        let rhs = random_vec(a.rows());
        let zeros = Vector::from_elem(a.rows(), 0.0);
        let mut smoother = L1::from_operator(a.view());

        let (x, converged) = pcg(&a, &rhs, &zeros, 200, 1e-10, &mut smoother);
        assert!(converged);
        let r = residual(a.view(), &rhs, &x);
        assert!(norm(&r) < 1e-8 * norm(&rhs).max(1.0));
    }

    #[test]
    fn stationary_with_l1_reduces_the_residual() {
        let a = grid_laplacian(6, 6);
        let rhs = random_vec(a.rows());
        let zeros = Vector::from_elem(a.rows(), 0.0);
        let mut smoother = L1::from_operator(a.view());

        let (x, _) = stationary(&a, &rhs, &zeros, 100, 1e-12, &mut smoother);
        let r = residual(a.view(), &rhs, &x);
        assert!(norm(&r) < norm(&rhs));
    }
}
