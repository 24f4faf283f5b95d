//! Distributed matrices
//!
//! A matrix is a view onto tile storage laid out block-cyclically over a
//! [`ProcessGrid`]. Only tiles owned by this process (and copies received
//! from other processes) are present; each lives in a
//! [`TileRegistry`](crate::registry::TileRegistry) that tracks its copies
//! across memory spaces.
//!
//! ```text
//! BaseMatrix (tile range + op tag, shared storage)
//! ├── Matrix           general
//! └── SymmetricMatrix  one stored triangle
//! ```

mod base;
mod general;
mod grid;
mod symmetric;

pub use base::BaseMatrix;
pub use general::Matrix;
pub use grid::{Distribution, Origin, ProcessGrid};
pub use symmetric::SymmetricMatrix;
