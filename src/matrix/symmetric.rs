//! Symmetric distributed matrix storing one triangle

use super::base::BaseMatrix;
use super::grid::Distribution;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::Engine;
use crate::tile::{Op, Uplo};
use std::ops::Deref;

/// Symmetric matrix of which only the tiles of one triangle are stored
///
/// Diagonal tiles are stored whole, but only their triangle is meaningful.
#[derive(Clone, Debug)]
pub struct SymmetricMatrix<T: Element> {
    base: BaseMatrix<T>,
    uplo: Uplo,
}

impl<T: Element> Deref for SymmetricMatrix<T> {
    type Target = BaseMatrix<T>;

    fn deref(&self) -> &BaseMatrix<T> {
        &self.base
    }
}

impl<T: Element> SymmetricMatrix<T> {
    /// Symmetric matrix storing triangle `uplo` of `f(row, col)`
    pub fn from_fn(
        engine: &Engine,
        uplo: Uplo,
        dist: Distribution,
        f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self> {
        if uplo == Uplo::General {
            return Err(Error::invalid_argument("uplo", "symmetric storage needs Lower or Upper"));
        }
        if dist.m() != dist.n() || dist.mb() != dist.nb() {
            return Err(Error::invalid_argument(
                "dist",
                format!(
                    "symmetric matrix must be square in square tiles, got {}x{} in {}x{}",
                    dist.m(),
                    dist.n(),
                    dist.mb(),
                    dist.nb()
                ),
            ));
        }
        let base = BaseMatrix::create(engine, dist, |(i, j)| uplo.contains(i, j), f)?;
        Ok(Self { base, uplo })
    }

    /// Zero symmetric matrix
    pub fn zeros(engine: &Engine, uplo: Uplo, dist: Distribution) -> Result<Self> {
        Self::from_fn(engine, uplo, dist, |_, _| T::ZERO)
    }

    /// Triangle seen through the transpose tag
    pub fn uplo(&self) -> Uplo {
        if self.op() == Op::NoTrans {
            self.uplo
        } else {
            self.uplo.flip()
        }
    }

    /// Triangle the tiles are stored in
    pub fn uplo_physical(&self) -> Uplo {
        self.uplo
    }

    /// Transposed view; the stored data reads as the other triangle
    pub fn transpose(&self) -> Result<Self> {
        Ok(Self {
            base: self.base.with_outer_op(Op::Trans)?,
            uplo: self.uplo,
        })
    }

    /// Conjugate-transposed view
    pub fn conj_transpose(&self) -> Result<Self> {
        Ok(Self {
            base: self.base.with_outer_op(Op::ConjTrans)?,
            uplo: self.uplo,
        })
    }

    /// Whether logical tile `(i, j)` is stored
    pub fn tile_in_triangle(&self, i: usize, j: usize) -> bool {
        self.uplo().contains(i, j)
    }

    /// Column-major `n × n` copy with the stored triangle mirrored into the
    /// other one
    pub fn to_dense(&self) -> Result<Vec<T>> {
        let n = self.m();
        let uplo = self.uplo();
        let mut out = vec![T::ZERO; n * n];
        self.gather(
            |r, c, v| {
                if uplo.contains(r, c) {
                    out[r + c * n] = v;
                    out[c + r * n] = v;
                }
            },
            |i, j| uplo.contains(i, j),
        )?;
        Ok(out)
    }
}
