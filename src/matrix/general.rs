//! General (rectangular) distributed matrix

use super::base::BaseMatrix;
use super::grid::Distribution;
use crate::dtype::Element;
use crate::error::Result;
use crate::runtime::Engine;
use crate::tile::Op;
use std::ops::{Deref, Range};

/// General matrix distributed in tiles
///
/// ```
/// use tilr::prelude::*;
///
/// let engine = Engine::host_only()?;
/// let a = Matrix::from_fn(&engine, Distribution::new(5, 3, 2, 2)?, |r, c| (r + c) as f64)?;
/// let at = a.transpose()?;
/// assert_eq!((at.m(), at.n()), (3, 5));
/// # Ok::<(), tilr::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Matrix<T: Element> {
    base: BaseMatrix<T>,
}

impl<T: Element> Deref for Matrix<T> {
    type Target = BaseMatrix<T>;

    fn deref(&self) -> &BaseMatrix<T> {
        &self.base
    }
}

impl<T: Element> Matrix<T> {
    /// Matrix whose element `(row, col)` is `f(row, col)`; only tiles owned
    /// by this process are created
    pub fn from_fn(
        engine: &Engine,
        dist: Distribution,
        f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self> {
        Ok(Self {
            base: BaseMatrix::create(engine, dist, |_| true, f)?,
        })
    }

    /// Zero matrix
    pub fn zeros(engine: &Engine, dist: Distribution) -> Result<Self> {
        Self::from_fn(engine, dist, |_, _| T::ZERO)
    }

    /// Transposed view
    pub fn transpose(&self) -> Result<Self> {
        Ok(Self {
            base: self.base.with_outer_op(Op::Trans)?,
        })
    }

    /// Conjugate-transposed view
    pub fn conj_transpose(&self) -> Result<Self> {
        Ok(Self {
            base: self.base.with_outer_op(Op::ConjTrans)?,
        })
    }

    /// View of tile rows `rows` and tile columns `cols`
    pub fn sub(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Self> {
        Ok(Self {
            base: self.base.sub_view(rows, cols)?,
        })
    }

    /// Column-major copy of the tiles present on this process; absent tiles
    /// read as zero
    pub fn to_dense(&self) -> Result<Vec<T>> {
        let m = self.m();
        let mut out = vec![T::ZERO; m * self.n()];
        self.gather(|r, c, v| out[r + c * m] = v, |_, _| true)?;
        Ok(out)
    }
}
