//! Smoothed aggregation algebraic multigrid.
//!
//! This library builds multilevel preconditioners for symmetric positive
//! definite sparse systems, the kind that arise from discretizations of
//! elliptic operators in diffusion-type partial differential equations.
//! For such systems multigrid methods are the optimal preconditioners, and
//! when the mesh or material structure is too irregular for geometric
//! multigrid, algebraic multigrid (AMG) constructs the coarse problems from
//! the matrix alone.
//!
//! The variant implemented here is smoothed aggregation: fine unknowns are
//! partitioned into aggregates guided by a strength-of-connection filter,
//! a near-null-space candidate vector is fit over the aggregates to form a
//! tentative prolongator, one or more Jacobi sweeps smooth that prolongator,
//! and the coarse operator is the Galerkin triple product `R * A * P`.
//! Repeating the process yields a hierarchy of ever-smaller operators, the
//! last of which is factored directly.
//!
//! Every stage of the coarsening chain (strength, aggregation, candidate
//! fitting, prolongator smoothing, restriction, coarse product) is a
//! pluggable strategy slot in [`hierarchy::SaOptions`], so any stage can be
//! swapped without touching the setup loop. The constructed
//! [`multilevel::Multilevel`] applies one V-cycle per invocation and plugs
//! into the iterative solvers in [`solver`] as a preconditioner.

use ndarray::{Array1, Array2};
use sprs::{CsMatBase, TriMatBase};
use sprs_ldl::LdlNumeric;

#[macro_use]
extern crate log;

pub mod aggregation;
pub mod error;
pub mod hierarchy;
pub mod interpolation;
pub mod multilevel;
pub mod parallel_ops;
pub mod preconditioner;
pub mod solver;
pub mod strength;
pub mod utils;

pub type CsrMatrix = CsMatBase<f64, usize, Vec<usize>, Vec<usize>, Vec<f64>, usize>;
pub type CooMatrix = TriMatBase<Vec<usize>, Vec<f64>>;
pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;
pub type Cholesky = LdlNumeric<f64, usize>;

pub use error::{Error, Result};
