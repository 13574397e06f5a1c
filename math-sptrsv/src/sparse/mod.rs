//! Sparse triangular matrix structures
//!
//! This module provides the compressed triangular matrix a solve consumes and
//! the dependency view the solver derives from it.

mod triangular;
mod view;

pub use triangular::{DiagonalKind, StorageOrder, Triangle, TriangularMatrix};
pub use view::TriangularView;
