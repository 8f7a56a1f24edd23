//! Solver-facing side of the hierarchy: the long-lived levels used during
//! solves, the coarse direct solver, and the V-cycle application.

use core::fmt;

use sprs::{CsMatView, FillInReduction, SymmetryCheck};
use sprs_ldl::Ldl;

use crate::hierarchy::{Hierarchy, SaOptions, SolveFormat};
use crate::parallel_ops::{residual, spmv};
use crate::preconditioner::{Preconditioner, Smoother};
use crate::{Cholesky, CsrMatrix, Error, Result, Vector};

/// One long-lived level of the multilevel solver.
///
/// Unlike the setup-time level records, these survive for the lifetime of
/// the preconditioner and carry the solve workspaces: a residual buffer and
/// solution/right-hand-side buffers sized to the level's unknown count.
/// `r` and `p` transfer between this level and the next coarser one, so the
/// coarsest level leaves them empty. The smoother is optional: a level that
/// is small enough for the direct solver never gets one.
pub struct Level<S> {
    pub a: CsrMatrix,
    pub r: CsrMatrix,
    pub p: CsrMatrix,
    pub residual: Vector,
    pub x: Vector,
    pub b: Vector,
    pub smoother: Option<S>,
}

impl<S> Level<S> {
    fn empty() -> Self {
        Self {
            a: CsrMatrix::zero((0, 0)),
            r: CsrMatrix::zero((0, 0)),
            p: CsrMatrix::zero((0, 0)),
            residual: Vector::from_elem(0, 0.0),
            x: Vector::from_elem(0, 0.0),
            b: Vector::from_elem(0, 0.0),
            smoother: None,
        }
    }
}

/// Move a setup operator into the solve phase.
///
/// The format-identical path is a plain move: the setup buffers are reused
/// untouched, no element is copied or converted. Only a differing target
/// format re-derives the matrix by storage conversion; both paths produce
/// numerically identical operators.
fn setup_level_matrix(format: SolveFormat, src: CsrMatrix) -> CsrMatrix {
    match format {
        SolveFormat::Csr => src,
        SolveFormat::Csc => src.to_other_storage(),
    }
}

fn convert_storage(format: SolveFormat, src: &CsrMatrix) -> CsrMatrix {
    match format {
        SolveFormat::Csr => src.to_csr(),
        SolveFormat::Csc => src.to_csc(),
    }
}

/// LDL^T factorization of the coarsest operator.
pub struct DirectSolver {
    factor: Cholesky,
}

impl DirectSolver {
    pub fn factor(a: CsMatView<f64>) -> Result<Self> {
        let factor = Ldl::new()
            .check_symmetry(SymmetryCheck::DontCheckSymmetry)
            .fill_in_reduction(FillInReduction::ReverseCuthillMcKee)
            .numeric(a)
            .map_err(|e| Error::CoarseFactorization(e.to_string()))?;
        Ok(Self { factor })
    }

    pub fn solve(&self, rhs: &Vector) -> Vector {
        let slice = rhs.as_slice().expect("right-hand side is contiguous");
        Vector::from(self.factor.solve(slice))
    }
}

/// Multilevel smoothed aggregation preconditioner.
///
/// Construction coarsens the input operator into a hierarchy of levels,
/// installs a smoother on every level large enough to need one, and factors
/// the coarsest operator directly. Each [`Preconditioner::apply`] then runs
/// one V-cycle: pre-smooth, restrict, recurse, coarse direct solve,
/// prolongate, post-smooth.
pub struct Multilevel<S> {
    levels: Vec<Level<S>>,
    coarse_solver: Option<DirectSolver>,
    options: SaOptions,
}

impl<S: Smoother> Multilevel<S> {
    /// Build the hierarchy with the all-ones near-null candidate.
    pub fn new(a: &CsrMatrix, options: SaOptions) -> Result<Self> {
        let mut multilevel = Self {
            levels: Vec::new(),
            coarse_solver: None,
            options,
        };
        multilevel.rebuild(a, None)?;
        Ok(multilevel)
    }

    /// Build the hierarchy guided by a caller-supplied near-null candidate
    /// of length `a.rows()`.
    pub fn with_candidate(a: &CsrMatrix, near_null: &Vector, options: SaOptions) -> Result<Self> {
        let mut multilevel = Self {
            levels: Vec::new(),
            coarse_solver: None,
            options,
        };
        multilevel.rebuild(a, Some(near_null))?;
        Ok(multilevel)
    }

    /// Construct the hierarchy anew from a different operator, discarding
    /// every previously built level first. The result is identical to a
    /// fresh construction from the same input; no state leaks between
    /// builds. On failure the preconditioner is left unusable and must be
    /// rebuilt before use.
    pub fn rebuild(&mut self, a: &CsrMatrix, near_null: Option<&Vector>) -> Result<()> {
        self.levels.clear();
        self.coarse_solver = None;

        // The strategy chain runs on row-major storage: borrow a view when
        // the input already is, convert once otherwise.
        let converted;
        let a_view = if a.is_csr() {
            a.view()
        } else {
            converted = a.to_csr();
            converted.view()
        };

        let hierarchy = Hierarchy::build(a_view.view(), near_null, &self.options)?;
        let num_levels = hierarchy.num_levels();

        // Reserve for the worst case up front. Appending past capacity
        // would reallocate and deep-copy every operator stored so far.
        self.levels
            .reserve(self.options.max_levels.max(num_levels));

        let format = self.options.solve_format;
        let (records, restrictions, prolongations) = hierarchy.into_parts();
        let mut restrictions = restrictions.into_iter();
        let mut prolongations = prolongations.into_iter();

        for record in records {
            let mut level = Level::empty();
            if let Some(operator) = record.operator {
                level.a = setup_level_matrix(format, operator);
                level.smoother = Some(S::from_operator(level.a.view()));
            }
            if let (Some(r), Some(p)) = (restrictions.next(), prolongations.next()) {
                level.r = setup_level_matrix(format, r);
                level.p = setup_level_matrix(format, p);
            }
            let rows = level.a.rows();
            level.residual = Vector::from_elem(rows, 0.0);
            level.x = Vector::from_elem(rows, 0.0);
            level.b = Vector::from_elem(rows, 0.0);
            self.levels.push(level);
        }
        debug_assert_eq!(self.levels.len(), num_levels);

        // An operator small enough for the direct solver gets no smoother,
        // so a level 0 that never coarsened has none installed at all.
        if a_view.rows() > self.options.min_level_size {
            self.levels[0].smoother = Some(S::from_operator(a_view.view()));
        }

        // Re-establish level 0's operator with the caller's exact
        // dimensions and nonzero count.
        self.levels[0].a = setup_level_matrix(format, a_view.to_owned());
        let rows = a_view.rows();
        self.levels[0].residual = Vector::from_elem(rows, 0.0);
        self.levels[0].x = Vector::from_elem(rows, 0.0);
        self.levels[0].b = Vector::from_elem(rows, 0.0);

        let coarse_view = self
            .levels
            .last()
            .expect("hierarchy always has at least one level")
            .a
            .view();
        self.coarse_solver = Some(DirectSolver::factor(coarse_view)?);
        Ok(())
    }

    /// Deep-copy the hierarchy into a different smoother type and storage
    /// format without recoarsening: operators are converted level by level,
    /// smoothers are rebuilt from the converted operators, and the coarsest
    /// operator is refactored.
    pub fn rebind<S2: Smoother>(&self, format: SolveFormat) -> Result<Multilevel<S2>> {
        let mut levels = Vec::with_capacity(self.options.max_levels.max(self.levels.len()));
        for level in &self.levels {
            let a = convert_storage(format, &level.a);
            let smoother = level
                .smoother
                .as_ref()
                .map(|_| S2::from_operator(a.view()));
            levels.push(Level {
                r: convert_storage(format, &level.r),
                p: convert_storage(format, &level.p),
                residual: level.residual.clone(),
                x: level.x.clone(),
                b: level.b.clone(),
                a,
                smoother,
            });
        }

        let coarse_view = levels
            .last()
            .expect("hierarchy always has at least one level")
            .a
            .view();
        let coarse_solver = Some(DirectSolver::factor(coarse_view)?);

        let mut options = self.options.clone();
        options.solve_format = format;
        Ok(Multilevel {
            levels,
            coarse_solver,
            options,
        })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[Level<S>] {
        &self.levels
    }

    pub fn options(&self) -> &SaOptions {
        &self.options
    }

    /// Total nnz over all levels / finest level nnz.
    pub fn op_complexity(&self) -> f64 {
        let fine_nnz = self.levels[0].a.nnz();
        let total: usize = self.levels.iter().map(|lvl| lvl.a.nnz()).sum();
        total as f64 / fine_nnz as f64
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.levels.iter().map(|lvl| lvl.a.rows()).collect()
    }
}

impl<S> fmt::Debug for Multilevel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<usize> = self.levels.iter().map(|lvl| lvl.a.rows()).collect();
        let nnzs: Vec<usize> = self.levels.iter().map(|lvl| lvl.a.nnz()).collect();
        let coarsening_factors: Vec<f32> = sizes
            .iter()
            .zip(sizes.iter().skip(1))
            .map(|(a, b)| (*a as f32) / (*b as f32))
            .collect();
        let fine_nnz = nnzs.first().copied().unwrap_or(0).max(1);
        let complexity = nnzs.iter().sum::<usize>() as f32 / fine_nnz as f32;

        f.debug_struct("Multilevel")
            .field("levels", &self.levels.len())
            .field("sizes", &sizes)
            .field("coarsening_factors", &coarsening_factors)
            .field("nnz", &nnzs)
            .field("op_complexity", &complexity)
            .finish()
    }
}

impl<S: Smoother> Preconditioner for Multilevel<S> {
    fn apply(&mut self, r: &mut Vector) {
        let coarsest = self.levels.len() - 1;

        // reset the workspaces
        for level in self.levels.iter_mut() {
            level.x.fill(0.0);
            level.b.fill(0.0);
            level.residual.fill(0.0);
        }
        self.levels[0].b.assign(r);

        for level_idx in 0..coarsest {
            let (fine_half, coarse_half) = self.levels.split_at_mut(level_idx + 1);
            let fine = &mut fine_half[level_idx];
            let next = &mut coarse_half[0];

            // pre-smooth; x is zero here so the first residual is b itself
            if let Some(smoother) = fine.smoother.as_mut() {
                fine.residual.assign(&fine.b);
                smoother.apply(&mut fine.residual);
                fine.x += &fine.residual;
            }

            // restrict the remaining residual to the next level
            let res = residual(fine.a.view(), &fine.b, &fine.x);
            next.b.assign(&spmv(fine.r.view(), &res));
            fine.residual.assign(&res);
        }

        // solve the coarsest problem exactly
        let solver = self
            .coarse_solver
            .as_ref()
            .expect("apply called on a built hierarchy");
        let coarse_x = solver.solve(&self.levels[coarsest].b);
        self.levels[coarsest].x.assign(&coarse_x);

        for level_idx in (0..coarsest).rev() {
            let (fine_half, coarse_half) = self.levels.split_at_mut(level_idx + 1);
            let fine = &mut fine_half[level_idx];
            let next = &coarse_half[0];

            // prolongate the coarse correction
            fine.x += &spmv(fine.p.view(), &next.x);

            // post-smooth
            if let Some(smoother) = fine.smoother.as_mut() {
                let mut res = residual(fine.a.view(), &fine.b, &fine.x);
                smoother.apply(&mut res);
                fine.x += &res;
            }
        }

        r.assign(&self.levels[0].x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::{DiagonalSmoother, L1};
    use crate::solver::pcg;
    use crate::utils::{grid_laplacian, norm, random_vec};
    use approx::assert_abs_diff_eq;

    fn test_options(min_level_size: usize, max_levels: usize) -> SaOptions {
        SaOptions {
            min_level_size,
            max_levels,
            ..SaOptions::default()
        }
    }

    #[test]
    fn pentadiagonal_end_to_end() {
        // 100x100 s.p.d. pentadiagonal operator, the standard model problem
        let a = grid_laplacian(10, 10);
        let options = test_options(10, 10);
        let ml = Multilevel::<L1>::new(&a, options).unwrap();

        assert!(ml.num_levels() <= 10);
        let sizes = ml.sizes();
        for pair in sizes.windows(2) {
            assert!(pair[1] < pair[0], "sizes not strictly decreasing: {sizes:?}");
        }
        assert!(*sizes.last().unwrap() <= 10);
        assert_eq!(sizes[0], 100);
        assert_eq!(ml.levels()[0].a.nnz(), a.nnz());
    }

    #[test]
    fn preconditioned_cg_converges_fast() {
        let a = grid_laplacian(10, 10);
        let mut ml = Multilevel::<L1>::new(&a, test_options(10, 10)).unwrap();

        let rhs = random_vec(a.rows());
        let zeros = Vector::from_elem(a.rows(), 0.0);
        let (x, converged) = pcg(&a, &rhs, &zeros, 60, 1e-8, &mut ml);
        assert!(converged);
        let r = residual(a.view(), &rhs, &x);
        assert!(norm(&r) < 1e-6 * norm(&rhs).max(1.0));
    }

    #[test]
    fn buffers_are_sized_per_level() {
        let a = grid_laplacian(10, 10);
        let ml = Multilevel::<L1>::new(&a, test_options(10, 10)).unwrap();

        let num_levels = ml.num_levels();
        for (k, level) in ml.levels().iter().enumerate() {
            let rows = level.a.rows();
            assert_eq!(level.residual.len(), rows);
            assert_eq!(level.x.len(), rows);
            assert_eq!(level.b.len(), rows);
            assert!(level.smoother.is_some());
            if k + 1 < num_levels {
                assert_eq!(level.r.rows(), ml.levels()[k + 1].a.rows());
                assert_eq!(level.r.cols(), rows);
                assert_eq!(level.p.rows(), rows);
                assert_eq!(level.p.cols(), ml.levels()[k + 1].a.rows());
            } else {
                assert_eq!(level.r.nnz(), 0);
                assert_eq!(level.p.nnz(), 0);
            }
        }
    }

    #[test]
    fn level_storage_reserves_the_worst_case() {
        let a = grid_laplacian(10, 10);
        let options = test_options(10, 10);
        let max_levels = options.max_levels;
        let ml = Multilevel::<L1>::new(&a, options).unwrap();
        assert!(ml.levels.capacity() >= max_levels);
        assert!(ml.levels.len() <= max_levels);
    }

    #[test]
    fn rebuild_matches_fresh_construction() {
        let first = grid_laplacian(8, 8);
        let second = grid_laplacian(10, 10);
        let options = test_options(10, 10);

        let mut rebuilt = Multilevel::<L1>::new(&first, options.clone()).unwrap();
        rebuilt.rebuild(&second, None).unwrap();
        let fresh = Multilevel::<L1>::new(&second, options).unwrap();

        assert_eq!(rebuilt.num_levels(), fresh.num_levels());
        assert_eq!(rebuilt.sizes(), fresh.sizes());
        for (a, b) in rebuilt.levels().iter().zip(fresh.levels().iter()) {
            let left = a.a.to_dense();
            let right = b.a.to_dense();
            for (x, y) in left.iter().zip(right.iter()) {
                assert_abs_diff_eq!(x, y, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn matching_format_transfer_moves_the_buffers() {
        let a = grid_laplacian(6, 6);
        let data_ptr = a.data().as_ptr();
        let moved = setup_level_matrix(SolveFormat::Csr, a);
        assert_eq!(moved.data().as_ptr(), data_ptr);
        assert!(moved.is_csr());
    }

    #[test]
    fn cross_format_transfer_is_numerically_identical() {
        let a = grid_laplacian(10, 10);
        let csr = Multilevel::<L1>::new(&a, test_options(10, 10)).unwrap();
        let mut options = test_options(10, 10);
        options.solve_format = SolveFormat::Csc;
        let csc = Multilevel::<L1>::new(&a, options).unwrap();

        assert_eq!(csr.num_levels(), csc.num_levels());
        for (lhs, rhs) in csr.levels().iter().zip(csc.levels().iter()) {
            assert!(lhs.a.is_csr());
            assert!(rhs.a.is_csc());
            let left = lhs.a.to_dense();
            let right = rhs.a.to_dense();
            for (x, y) in left.iter().zip(right.iter()) {
                assert_abs_diff_eq!(x, y, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn rebind_preserves_the_hierarchy() {
        let a = grid_laplacian(10, 10);
        let ml = Multilevel::<L1>::new(&a, test_options(10, 10)).unwrap();
        let rebound: Multilevel<DiagonalSmoother> = ml.rebind(SolveFormat::Csc).unwrap();

        assert_eq!(ml.num_levels(), rebound.num_levels());
        assert_eq!(ml.sizes(), rebound.sizes());
        assert!(rebound.levels()[0].a.is_csc());

        // the rebound hierarchy still works as a preconditioner
        let mut rebound = rebound;
        let rhs = random_vec(a.rows());
        let zeros = Vector::from_elem(a.rows(), 0.0);
        let (_, converged) = pcg(&a, &rhs, &zeros, 80, 1e-8, &mut rebound);
        assert!(converged);
    }

    #[test]
    fn uncoarsened_level_zero_has_no_smoother_and_solves_directly() {
        // min_level_size larger than the operator: one level, no smoother
        let a = grid_laplacian(5, 5);
        let mut ml = Multilevel::<L1>::new(&a, test_options(100, 10)).unwrap();

        assert_eq!(ml.num_levels(), 1);
        assert!(ml.levels()[0].smoother.is_none());

        // the V-cycle degenerates to the exact coarse solve
        let rhs = random_vec(a.rows());
        let mut x = rhs.clone();
        ml.apply(&mut x);
        let r = residual(a.view(), &rhs, &x);
        assert!(norm(&r) < 1e-8 * norm(&rhs).max(1.0));
    }
}
