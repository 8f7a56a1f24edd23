use core::fmt;

use std::sync::Arc;

use sprs::CsMatView;

use crate::aggregation::{Aggregation, GreedyAggregation};
use crate::interpolation::{
    AggregateCandidates, CoarseProduct, FitCandidates, FormRestriction, GalerkinProduct,
    JacobiSmoothing, ProlongatorSmoothing, TransposeRestriction,
};
use crate::strength::{StrengthOfConnection, SymmetricStrength};
use crate::{CsrMatrix, Error, Result, Vector};

/// Storage layout the solver-facing levels are kept in.
///
/// Setup always runs in row-major storage. When the solve format matches,
/// operators are moved into the solve phase without touching their buffers;
/// otherwise each operator is converted once while the levels are
/// populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveFormat {
    Csr,
    Csc,
}

/// Options bundle read (never mutated) by hierarchy construction.
///
/// The six strategy slots are independently substitutable; the defaults
/// give classical smoothed aggregation. `min_level_size` stops coarsening
/// once an operator is at or below that many unknowns, and `max_levels` is
/// a hard cap on the number of levels regardless of how large the coarsest
/// operator still is.
#[derive(Clone)]
pub struct SaOptions {
    pub min_level_size: usize,
    pub max_levels: usize,
    pub solve_format: SolveFormat,
    pub strength: Arc<dyn StrengthOfConnection>,
    pub aggregation: Arc<dyn Aggregation>,
    pub fit_candidates: Arc<dyn FitCandidates>,
    pub prolongator_smoothing: Arc<dyn ProlongatorSmoothing>,
    pub restriction: Arc<dyn FormRestriction>,
    pub coarse_product: Arc<dyn CoarseProduct>,
}

impl Default for SaOptions {
    fn default() -> Self {
        Self {
            min_level_size: 100,
            max_levels: 10,
            solve_format: SolveFormat::Csr,
            strength: Arc::new(SymmetricStrength::default()),
            aggregation: Arc::new(GreedyAggregation),
            fit_candidates: Arc::new(AggregateCandidates),
            prolongator_smoothing: Arc::new(JacobiSmoothing::default()),
            restriction: Arc::new(TransposeRestriction),
            coarse_product: Arc::new(GalerkinProduct),
        }
    }
}

impl fmt::Debug for SaOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaOptions")
            .field("min_level_size", &self.min_level_size)
            .field("max_levels", &self.max_levels)
            .field("solve_format", &self.solve_format)
            .finish()
    }
}

/// Per-level bundle of coarsening state needed only during setup.
///
/// Level 0 never stores an operator (the caller's matrix plays that role),
/// and the final record is the sentinel for the coarsest level reached: it
/// carries the coarsest operator and candidate but no aggregates and no
/// smoothing scale, because no coarsening step ran on it.
pub struct SaLevel {
    /// Galerkin product that defines this level, owned until the
    /// solver-facing adapter takes it.
    pub operator: Option<CsrMatrix>,
    /// Fine unknown -> aggregate index map from the *previous* level's
    /// coarsening step, so its length equals the previous level's size.
    pub aggregates: Vec<usize>,
    /// Near-null-space candidate for this level.
    pub near_null: Vector,
    /// Spectral scale `rho(D^{-1} A)` recorded while smoothing the
    /// tentative prolongator of this level.
    pub smoothing_scale: f64,
}

impl SaLevel {
    fn first(near_null: Vector) -> Self {
        Self {
            operator: None,
            aggregates: Vec::new(),
            near_null,
            smoothing_scale: 0.0,
        }
    }
}

/// Everything one coarsening step produces.
struct CoarseningStep {
    aggregates: Vec<usize>,
    smoothing_scale: f64,
    restriction: CsrMatrix,
    prolongation: CsrMatrix,
    coarse_operator: CsrMatrix,
    coarse_near_null: Vector,
}

/// Run the strategy chain once on the operator of one level.
fn coarsen_step(
    a: CsMatView<f64>,
    near_null: &Vector,
    options: &SaOptions,
) -> Result<CoarseningStep> {
    let strong = options.strength.strength(a.view())?;

    // Zero-filled before the strategy runs: slots it leaves untouched
    // collapse into aggregate 0 by documented policy.
    let mut aggregates = vec![0usize; strong.rows()];
    let num_aggregates = options.aggregation.aggregate(&strong, &mut aggregates)?;

    let (tentative, coarse_near_null) =
        options
            .fit_candidates
            .fit(&aggregates, num_aggregates, near_null)?;

    // TODO: recompute the scale from the strength matrix when it differs
    // from the coarsening operator.
    let (prolongation, smoothing_scale) =
        options.prolongator_smoothing.smooth(a.view(), &tentative)?;

    let restriction = options.restriction.restriction(&prolongation)?;
    let coarse_operator = options
        .coarse_product
        .coarse(&restriction, a.view(), &prolongation)?;

    trace!(
        "coarsened {} -> {} unknowns, coarse nnz {}",
        a.rows(),
        coarse_operator.rows(),
        coarse_operator.nnz()
    );

    Ok(CoarseningStep {
        aggregates,
        smoothing_scale,
        restriction,
        prolongation,
        coarse_operator,
        coarse_near_null,
    })
}

/// Setup-time hierarchy: the sequence of level records plus the grid
/// transfer operators captured while coarsening. Exists only between the
/// coarsening loop and the solver-facing adapter that consumes it.
pub struct Hierarchy {
    levels: Vec<SaLevel>,
    restrictions: Vec<CsrMatrix>,
    prolongations: Vec<CsrMatrix>,
}

impl Hierarchy {
    /// Drive the coarsening loop on `a`, starting from `near_null` (the
    /// constant vector of ones when the caller supplies no candidate).
    ///
    /// One coarsening step runs up front iff the input is larger than
    /// `min_level_size`; afterwards the loop extends the hierarchy one
    /// level at a time until the newest operator is small enough or the
    /// level cap is reached. The cap is hard: the final operator is handed
    /// to the coarse solver as-is even if it is still large.
    pub fn build(
        a: CsMatView<f64>,
        near_null: Option<&Vector>,
        options: &SaOptions,
    ) -> Result<Self> {
        if a.rows() == 0 {
            return Err(Error::EmptyOperator);
        }
        if a.rows() != a.cols() {
            return Err(Error::NonSquareOperator {
                rows: a.rows(),
                cols: a.cols(),
            });
        }
        let near_null = match near_null {
            Some(b) => {
                if b.len() != a.rows() {
                    return Err(Error::CandidateLength {
                        expected: a.rows(),
                        got: b.len(),
                    });
                }
                b.clone()
            }
            None => Vector::from_elem(a.rows(), 1.0),
        };

        let mut hierarchy = Self {
            levels: vec![SaLevel::first(near_null)],
            restrictions: Vec::new(),
            prolongations: Vec::new(),
        };

        if a.rows() > options.min_level_size {
            let step = coarsen_step(a.view(), &hierarchy.levels[0].near_null, options)?;
            hierarchy.push_step(step);
        }

        while hierarchy.coarsest_rows() > options.min_level_size
            && hierarchy.num_levels() < options.max_levels
        {
            let step = {
                let last = last_level(&hierarchy.levels);
                let a_k = last
                    .operator
                    .as_ref()
                    .expect("coarse levels always own their operator");
                coarsen_step(a_k.view(), &last.near_null, options)?
            };
            hierarchy.push_step(step);
        }

        info!(
            "built {}-level hierarchy, sizes {:?}",
            hierarchy.num_levels(),
            hierarchy.sizes(a.rows())
        );
        Ok(hierarchy)
    }

    /// Append the products of one coarsening step: the aggregate map and
    /// smoothing scale land retroactively on the level that was coarsened,
    /// the Galerkin product and coarse candidate open the next level.
    fn push_step(&mut self, step: CoarseningStep) {
        let fine = last_level_mut(&mut self.levels);
        fine.aggregates = step.aggregates;
        fine.smoothing_scale = step.smoothing_scale;

        self.restrictions.push(step.restriction);
        self.prolongations.push(step.prolongation);

        self.levels.push(SaLevel {
            operator: Some(step.coarse_operator),
            aggregates: Vec::new(),
            near_null: step.coarse_near_null,
            smoothing_scale: 0.0,
        });
    }

    fn coarsest_rows(&self) -> usize {
        match &last_level(&self.levels).operator {
            Some(m) => m.rows(),
            // single-level hierarchy: the caller's operator was already
            // small enough, nothing to extend
            None => 0,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[SaLevel] {
        &self.levels
    }

    pub fn restrictions(&self) -> &[CsrMatrix] {
        &self.restrictions
    }

    pub fn prolongations(&self) -> &[CsrMatrix] {
        &self.prolongations
    }

    /// Row counts of every level, finest first. The fine size is passed in
    /// because level 0 does not store the caller's operator.
    pub fn sizes(&self, fine_rows: usize) -> Vec<usize> {
        let mut sizes = vec![fine_rows];
        sizes.extend(
            self.levels
                .iter()
                .filter_map(|lvl| lvl.operator.as_ref())
                .map(|m| m.rows()),
        );
        sizes
    }

    /// Tear the hierarchy apart for the solver-facing adapter.
    pub fn into_parts(self) -> (Vec<SaLevel>, Vec<CsrMatrix>, Vec<CsrMatrix>) {
        (self.levels, self.restrictions, self.prolongations)
    }
}

fn last_level(levels: &[SaLevel]) -> &SaLevel {
    levels.last().expect("hierarchy always has at least one level")
}

fn last_level_mut(levels: &mut [SaLevel]) -> &mut SaLevel {
    levels
        .last_mut()
        .expect("hierarchy always has at least one level")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::grid_laplacian;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_options(min_level_size: usize, max_levels: usize) -> SaOptions {
        SaOptions {
            min_level_size,
            max_levels,
            ..SaOptions::default()
        }
    }

    struct CountingStrength {
        calls: Arc<AtomicUsize>,
        inner: SymmetricStrength,
    }

    impl StrengthOfConnection for CountingStrength {
        fn strength(&self, a: CsMatView<f64>) -> Result<CsrMatrix> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.strength(a)
        }
    }

    #[test]
    fn dimension_chain_holds_on_every_level() {
        let a = grid_laplacian(10, 10);
        let options = small_options(10, 10);
        let h = Hierarchy::build(a.view(), None, &options).unwrap();

        let sizes = h.sizes(a.rows());
        assert_eq!(sizes.len(), h.num_levels());

        for k in 0..h.num_levels() - 1 {
            let r = &h.restrictions()[k];
            let p = &h.prolongations()[k];
            assert_eq!(r.rows(), p.cols());
            assert_eq!(r.rows(), sizes[k + 1]);
            assert_eq!(r.cols(), p.rows());
            assert_eq!(r.cols(), sizes[k]);
            assert_eq!(h.levels()[k].aggregates.len(), sizes[k]);
            assert_eq!(h.levels()[k].near_null.len(), sizes[k]);
            assert!(h.levels()[k].smoothing_scale > 0.0);
        }

        // coarsest record is the sentinel: operator and candidate only
        let last = h.levels().last().unwrap();
        assert!(last.aggregates.is_empty());
        assert_eq!(last.smoothing_scale, 0.0);
        assert_eq!(last.near_null.len(), *sizes.last().unwrap());
    }

    #[test]
    fn termination_respects_floor_and_cap() {
        let a = grid_laplacian(10, 10);
        let options = small_options(10, 10);
        let h = Hierarchy::build(a.view(), None, &options).unwrap();

        assert!(h.num_levels() <= options.max_levels);
        let sizes = h.sizes(a.rows());
        let coarsest = *sizes.last().unwrap();
        assert!(coarsest <= options.min_level_size || h.num_levels() == options.max_levels);

        // coarsening strictly reduces size until the floor
        for pair in sizes.windows(2) {
            assert!(pair[1] < pair[0], "sizes not strictly decreasing: {sizes:?}");
        }
    }

    #[test]
    fn level_cap_is_hard() {
        let a = grid_laplacian(10, 10);
        let options = small_options(1, 2);
        let h = Hierarchy::build(a.view(), None, &options).unwrap();
        assert_eq!(h.num_levels(), 2);
        // the coarsest operator may still be large, that is allowed
        assert!(h.sizes(a.rows())[1] > 1);
    }

    #[test]
    fn degenerate_input_invokes_no_strategy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut options = small_options(100, 10);
        options.strength = Arc::new(CountingStrength {
            calls: calls.clone(),
            inner: SymmetricStrength::default(),
        });

        let a = grid_laplacian(5, 5); // 25 <= min_level_size
        let h = Hierarchy::build(a.view(), None, &options).unwrap();

        assert_eq!(h.num_levels(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(h.restrictions().is_empty());
        assert!(h.prolongations().is_empty());
    }

    #[test]
    fn omitted_candidate_equals_all_ones() {
        let a = grid_laplacian(10, 10);
        let options = small_options(10, 10);
        let ones = Vector::from_elem(a.rows(), 1.0);

        let h_default = Hierarchy::build(a.view(), None, &options).unwrap();
        let h_ones = Hierarchy::build(a.view(), Some(&ones), &options).unwrap();

        assert_eq!(h_default.num_levels(), h_ones.num_levels());
        let coarse_a = h_default.levels().last().unwrap().operator.as_ref().unwrap();
        let coarse_b = h_ones.levels().last().unwrap().operator.as_ref().unwrap();
        let dense_a = coarse_a.to_dense();
        let dense_b = coarse_b.to_dense();
        for (x, y) in dense_a.iter().zip(dense_b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let options = SaOptions::default();

        let empty: CsrMatrix = crate::CooMatrix::new((0, 0)).to_csr();
        assert!(matches!(
            Hierarchy::build(empty.view(), None, &options),
            Err(Error::EmptyOperator)
        ));

        let mut rect = crate::CooMatrix::new((3, 2));
        rect.add_triplet(0, 0, 1.0);
        let rect: CsrMatrix = rect.to_csr();
        assert!(matches!(
            Hierarchy::build(rect.view(), None, &options),
            Err(Error::NonSquareOperator { .. })
        ));

        let a = grid_laplacian(4, 4);
        let short = Vector::from_elem(3, 1.0);
        assert!(matches!(
            Hierarchy::build(a.view(), Some(&short), &options),
            Err(Error::CandidateLength { .. })
        ));
    }
}
