//! Single-tile arithmetic and the host batched back-end
//!
//! The tile-level routines here execute synchronously on the calling unit of
//! work. [`gemm`] and [`syr2k`] work on op-tagged views; the `_raw` variants
//! take plain data plus explicit transpose tags, strides, and layout and are
//! what batched host and device calls run per entry.

mod blas;
mod norm;

#[cfg(feature = "host-batch")]
pub mod batched;

pub use blas::{gemm, gemm_raw, syr2k, syr2k_raw};
pub use norm::{
    Norm, add_sumsq, combine_sumsq, genorm_tile, henorm_tile, max_nan, max_nan_reduce,
    sumsq_to_norm,
};
