//! Aggregation: partition the unknowns of one level into disjoint groups
//! that become the unknowns of the next coarser level.

use crate::{CsrMatrix, Error, Result};

/// Second stage of the coarsening chain.
///
/// `aggregates` has one slot per row of the strength matrix `c` and arrives
/// zero-filled from the builder. Implementations overwrite each slot with
/// the index of the aggregate its unknown joins; any slot an implementation
/// leaves untouched therefore collapses into aggregate 0. That fallback is
/// deliberate policy, not an error. Returns the number of aggregates.
pub trait Aggregation: Send + Sync {
    fn aggregate(&self, c: &CsrMatrix, aggregates: &mut [usize]) -> Result<usize>;
}

/// Standard greedy aggregation over the strength graph, in three passes:
///
/// 1. every unknown whose strong neighborhood is untouched seeds a new
///    aggregate containing itself and its strong neighbors;
/// 2. remaining unknowns adopt the aggregate of a strongly connected,
///    already-aggregated neighbor;
/// 3. anything still left (isolated vertices, islands of weak couplings)
///    seeds a final round of aggregates.
///
/// Pass 2 reads only pass-1 membership so adoption never chains across an
/// unbounded distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyAggregation;

impl Aggregation for GreedyAggregation {
    fn aggregate(&self, c: &CsrMatrix, aggregates: &mut [usize]) -> Result<usize> {
        let n = c.rows();
        assert_eq!(n, aggregates.len());

        const UNASSIGNED: isize = -1;
        let mut membership = vec![UNASSIGNED; n];
        let mut num_aggregates: usize = 0;

        // pass 1: seed aggregates from untouched neighborhoods
        for i in 0..n {
            if membership[i] != UNASSIGNED {
                continue;
            }
            let row = c.outer_view(i).unwrap();
            let free = row
                .iter()
                .all(|(j, _)| j == i || membership[j] == UNASSIGNED);
            if !free {
                continue;
            }
            membership[i] = num_aggregates as isize;
            for (j, _) in row.iter() {
                membership[j] = num_aggregates as isize;
            }
            num_aggregates += 1;
        }

        // pass 2: attach leftovers to a neighboring aggregate
        let seeded = membership.clone();
        for i in 0..n {
            if membership[i] != UNASSIGNED {
                continue;
            }
            let row = c.outer_view(i).unwrap();
            if let Some((_, agg)) = row
                .iter()
                .filter(|(j, _)| *j != i && seeded[*j] != UNASSIGNED)
                .map(|(j, _)| (j, seeded[j]))
                .next()
            {
                membership[i] = agg;
            }
        }

        // pass 3: whatever remains seeds new aggregates
        for i in 0..n {
            if membership[i] != UNASSIGNED {
                continue;
            }
            membership[i] = num_aggregates as isize;
            let row = c.outer_view(i).unwrap();
            for (j, _) in row.iter() {
                if membership[j] == UNASSIGNED {
                    membership[j] = num_aggregates as isize;
                }
            }
            num_aggregates += 1;
        }

        if num_aggregates == 0 && n > 0 {
            return Err(Error::EmptyAggregation { rows: n });
        }

        for (slot, agg) in aggregates.iter_mut().zip(membership) {
            *slot = agg as usize;
        }
        Ok(num_aggregates)
    }
}
