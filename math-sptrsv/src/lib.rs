//! Synchronization-free sparse triangular solve
//!
//! This crate solves `L X = B` (forward substitution) or `U X = B` (backward
//! substitution) for a sparse triangular matrix and one or more right-hand
//! sides, without building a level schedule. Rows are dealt to execution
//! groups running concurrently; each group spins on an atomic dependency
//! counter until the rows it reads are solved.
//!
//! # Features
//!
//! - **Triangular matrices**: CSC or CSR storage, lower or upper, explicit or unit diagonal
//! - **Readiness tracking**: per-row atomic counters with write-then-signal ordering
//! - **Work assignment**: non-zero balanced, right-hand-side split, or automatic
//! - **Generic scalar types**: works with f64 and f32
//!
//! # Example
//!
//! ```
//! use math_audio_sptrsv::{
//!     DiagonalKind, SolveDirection, SolverConfig, Triangle, TriangularMatrix, sptrsv,
//! };
//! use ndarray::array;
//!
//! let l = TriangularMatrix::from_triplets(
//!     2,
//!     Triangle::Lower,
//!     DiagonalKind::Explicit,
//!     &[(0, 0, 2.0), (1, 0, 1.0), (1, 1, 4.0)],
//! )?;
//! let mut b = array![[2.0], [9.0]];
//! sptrsv(&l, SolveDirection::Forward, &mut b, &SolverConfig::default())?;
//! assert_eq!(b, array![[1.0], [2.0]]);
//! # Ok::<(), math_audio_sptrsv::SolveError>(())
//! ```

pub mod config;
pub mod direction;
pub mod error;
mod kernel;
pub mod parallel;
pub mod solver;
pub mod sparse;
pub mod strategy;
pub mod testdata;
pub mod tracker;
pub mod traits;

// Re-export main types
pub use config::SolverConfig;
pub use direction::SolveDirection;
pub use error::{MatrixDefect, Result, SolveError};
pub use solver::{SolveStats, TriangularSolver, sptrsv};
pub use sparse::{DiagonalKind, StorageOrder, Triangle, TriangularMatrix, TriangularView};
pub use strategy::{Assignment, MatrixStats, PartitionParams, WarpStrategy, WorkItem};
pub use tracker::ReadinessTracker;
pub use traits::{Precision, Scalar};
