//! Build a smoothed aggregation hierarchy for the 2-D Poisson model
//! problem and solve a random right-hand side with preconditioned CG.

use sa_amg::hierarchy::SaOptions;
use sa_amg::multilevel::Multilevel;
use sa_amg::parallel_ops::residual;
use sa_amg::preconditioner::L1;
use sa_amg::solver::pcg;
use sa_amg::utils::{grid_laplacian, norm, random_vec};
use sa_amg::Vector;
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "poisson",
    about = "Solve the 2-D Poisson model problem with SA-AMG preconditioned CG"
)]
struct Opt {
    /// Grid points per side
    #[structopt(default_value = "64")]
    n: usize,

    /// Maximum number of PCG iterations
    #[structopt(default_value = "100")]
    max_iter: usize,

    /// Relative residual tolerance
    #[structopt(default_value = "1e-8")]
    tolerance: f64,

    /// Stop coarsening at or below this many unknowns
    #[structopt(long, default_value = "100")]
    min_level_size: usize,

    /// Hard cap on the number of levels
    #[structopt(long, default_value = "10")]
    max_levels: usize,
}

fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let mat = grid_laplacian(opt.n, opt.n);
    info!(
        "assembled {}x{} operator with {} nonzeros",
        mat.rows(),
        mat.cols(),
        mat.nnz()
    );

    let options = SaOptions {
        min_level_size: opt.min_level_size,
        max_levels: opt.max_levels,
        ..SaOptions::default()
    };

    let mut preconditioner = match Multilevel::<L1>::new(&mat, options) {
        Ok(multilevel) => multilevel,
        Err(err) => {
            error!("hierarchy construction failed: {err}");
            std::process::exit(1);
        }
    };
    info!("{:?}", preconditioner);

    let rhs = random_vec(mat.rows());
    let zeros = Vector::from_elem(mat.rows(), 0.0);
    let (x, converged) = pcg(
        &mat,
        &rhs,
        &zeros,
        opt.max_iter,
        opt.tolerance,
        &mut preconditioner,
    );

    let r = residual(mat.view(), &rhs, &x);
    info!(
        "converged: {converged}, relative residual {:.3e}",
        norm(&r) / norm(&rhs)
    );
    if !converged {
        std::process::exit(1);
    }
}
