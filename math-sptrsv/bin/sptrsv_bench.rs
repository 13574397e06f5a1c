//! Benchmark harness for the synchronization-free triangular solve
//!
//! Generates a random triangular system, runs a number of warmup solves that
//! are discarded, then times a number of repeated solves.
//!
//! Run with:
//!   cargo run --release -p math-audio-sptrsv --bin sptrsv_bench -- --n 200000 --rhs 4
//!
//! Set `RUST_LOG=debug` to see the work assignment of every solve.

use clap::{Parser, ValueEnum};
use math_audio_sptrsv::config::{BENCH_REPEAT, BENCH_WARMUP, WARP_SIZE};
use math_audio_sptrsv::testdata::{random_lower, random_rhs};
use math_audio_sptrsv::{Scalar, SolveDirection, SolverConfig, TriangularSolver, WarpStrategy};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "sptrsv_bench",
    about = "Time the synchronization-free sparse triangular solve on a random system"
)]
struct Args {
    /// Matrix dimension
    #[arg(long, default_value_t = 100_000)]
    n: usize,

    /// Average off-diagonal entries per row
    #[arg(long, default_value_t = 8)]
    avg_nnz: usize,

    /// Number of right-hand-side columns
    #[arg(long, default_value_t = 1)]
    rhs: usize,

    /// Substitution direction
    #[arg(long, value_enum, default_value_t = CliDirection::Forward)]
    direction: CliDirection,

    /// Warp assignment strategy
    #[arg(long, value_enum, default_value_t = CliStrategy::Auto)]
    strategy: CliStrategy,

    /// Floating point precision
    #[arg(long, value_enum, default_value_t = CliPrecision::Double)]
    precision: CliPrecision,

    /// Right-hand-side lanes per work item
    #[arg(long, default_value_t = WARP_SIZE)]
    group_size: usize,

    /// Execution groups per compute unit
    #[arg(long, default_value_t = 1)]
    groups_per_unit: usize,

    /// Compute units (default: all hardware threads)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Solves run before timing starts
    #[arg(long, default_value_t = BENCH_WARMUP)]
    warmup: usize,

    /// Timed solves
    #[arg(long, default_value_t = BENCH_REPEAT)]
    repeat: usize,

    /// Random seed for the matrix and right-hand side
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log a summary of every solve
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    Nnz,
    Rhs,
    Auto,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPrecision {
    Single,
    Double,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    if args.repeat == 0 {
        return Err("--repeat must be at least 1".into());
    }

    match args.precision {
        CliPrecision::Single => run::<f32>(&args),
        CliPrecision::Double => run::<f64>(&args),
    }
}

fn run<T: Scalar>(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let direction = match args.direction {
        CliDirection::Forward => SolveDirection::Forward,
        CliDirection::Backward => SolveDirection::Backward,
    };
    let strategy = match args.strategy {
        CliStrategy::Nnz => WarpStrategy::Nnz,
        CliStrategy::Rhs => WarpStrategy::Rhs,
        CliStrategy::Auto => WarpStrategy::Auto,
    };
    let config = SolverConfig {
        strategy,
        group_size: args.group_size,
        groups_per_unit: args.groups_per_unit,
        compute_units: args.threads,
        verbose: args.verbose,
        ..SolverConfig::default()
    };

    let lower = random_lower::<T>(args.n, args.avg_nnz, args.seed);
    let matrix = match direction {
        SolveDirection::Forward => lower,
        SolveDirection::Backward => lower.transpose(),
    };
    let rhs = random_rhs::<T>(args.n, args.rhs, args.seed.wrapping_add(1));

    println!(
        "System: n = {}, nnz = {}, k = {}, {:?}, {} precision",
        matrix.n(),
        matrix.nnz(),
        args.rhs,
        direction,
        T::PRECISION
    );

    let mut solver = TriangularSolver::new(&matrix, direction, &config)?;
    let mut x = rhs.clone();

    for _ in 0..args.warmup {
        x.assign(&rhs);
        solver.solve_in_place(&mut x)?;
    }

    let mut total = Duration::ZERO;
    let mut last = None;
    for _ in 0..args.repeat {
        x.assign(&rhs);
        let stats = solver.solve_in_place(&mut x)?;
        total += stats.elapsed;
        last = Some(stats);
    }

    let mean = total.as_secs_f64() / args.repeat as f64;
    let flops = 2.0 * matrix.nnz() as f64 * args.rhs as f64;
    let residual = matrix.residual_norm(&x, &rhs).to_f64().unwrap_or(f64::NAN);

    if let Some(stats) = last {
        println!(
            "Strategy: {:?}, {} groups, {} work items",
            stats.strategy, stats.groups, stats.work_items
        );
    }
    println!(
        "Solve: {:.4} ms mean over {} runs ({} warmup), {:.3} GFLOP/s",
        mean * 1000.0,
        args.repeat,
        args.warmup,
        flops / mean / 1e9
    );
    println!("Residual max |LX - B| = {:.3e}", residual);

    Ok(())
}
