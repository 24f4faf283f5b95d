//! # tilr
//!
//! **Tile execution for distributed dense linear algebra, on host cores and accelerator devices.**
//!
//! tilr stores matrices as grids of tiles and runs tile-level kernels under a
//! selectable execution target, with the same results whichever target runs.
//!
//! ## Features
//!
//! - **Tile registry**: per-tile copies across host and device memory, with
//!   validity tracking, layout conversion, consumer counts, and eviction
//! - **Target dispatch**: host task per tile, host nested loop, host batched
//!   calls, or batched device launches
//! - **Batch assembly**: tile products grouped by shape into batched calls
//! - **Device reductions**: max, one, and Frobenius norms of symmetric tiles
//! - **Drivers**: symmetric rank-2k update and symmetric matrix norms
//!
//! ## Quick Start
//!
//! ```
//! use tilr::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let engine = Engine::new(EngineConfig::new().with_num_devices(1))?;
//! let a = Matrix::from_fn(&engine, Distribution::new(6, 2, 3, 2)?, |i, j| (i * 2 + j) as f64)?;
//! let c = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Lower, Distribution::new(6, 6, 3, 3)?)?;
//!
//! tilr::ops::syr2k(0.5, &a, &a, 0.0, &c, &Options::new(Target::Devices))?;
//! let fro = tilr::ops::norm(Norm::Fro, &c, &Options::default())?;
//! assert!(fro > 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `host-batch` (default): host batched back-end used by [`Target::HostBatch`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod batch;
pub mod config;
pub mod device;
pub mod dtype;
pub mod error;
pub mod internal;
pub mod kernels;
pub mod matrix;
pub mod ops;
pub mod registry;
pub mod runtime;
pub mod tile;

pub use config::{EngineConfig, Options};
pub use error::{Error, Result};
pub use internal::Target;
pub use runtime::Engine;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, Options};
    pub use crate::dtype::{Complex64, Complex128, DType, Element, RealElement};
    pub use crate::error::{Error, Result};
    pub use crate::internal::Target;
    pub use crate::kernels::Norm;
    pub use crate::matrix::{Distribution, Matrix, Origin, ProcessGrid, SymmetricMatrix};
    pub use crate::registry::Access;
    pub use crate::runtime::{Device, Engine};
    pub use crate::tile::{MemorySpace, Op, Tile, TileLayout, Uplo};
}
