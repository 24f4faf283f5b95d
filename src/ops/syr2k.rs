use crate::config::Options;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::internal;
use crate::matrix::{Matrix, SymmetricMatrix};
use crate::tile::Uplo;

/// Symmetric rank-2k update `C = alpha A Bᵀ + alpha B Aᵀ + beta C`.
///
/// `A` and `B` are `n × k` with any number of block columns. A logically
/// upper `C` is updated through its transpose, which holds the same
/// values. Each block column of `A` and `B` is one internal update; `beta`
/// scales `C` in the first one only. With `k == 0`, `C` is left as is.
///
/// # Example
///
/// ```
/// # use tilr::prelude::*;
/// # fn main() -> tilr::Result<()> {
/// let engine = Engine::host_only()?;
/// let a = Matrix::from_fn(&engine, Distribution::new(4, 3, 2, 2)?, |i, j| (i + j) as f64)?;
/// let c = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Lower, Distribution::new(4, 4, 2, 2)?)?;
/// tilr::ops::syr2k(1.0, &a, &a, 0.0, &c, &Options::default())?;
/// let dense = c.to_dense()?;
/// // C(1, 0) = 2 * (row 1 of A) . (row 0 of A) = 2 * (0*1 + 1*2 + 2*3)
/// assert_eq!(dense[1], 16.0);
/// # Ok(())
/// # }
/// ```
pub fn syr2k<T: Element>(
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &SymmetricMatrix<T>,
    opts: &Options,
) -> Result<()> {
    if a.m() != c.m() || b.m() != c.m() {
        return Err(Error::shape_mismatch("a", (c.m(), a.n()), (a.m(), a.n())));
    }
    if (b.m(), b.n()) != (a.m(), a.n()) || b.nt() != a.nt() {
        return Err(Error::shape_mismatch("b", (a.m(), a.n()), (b.m(), b.n())));
    }

    let lower;
    let c = if c.uplo() == Uplo::Upper {
        lower = c.transpose()?;
        &lower
    } else {
        c
    };

    log::debug!(
        "syr2k n={} k={} in {} block columns on {}",
        c.m(),
        a.n(),
        a.nt(),
        opts.target
    );
    let mt = a.mt();
    for k in 0..a.nt() {
        let ak = a.sub(0..mt, k..k + 1)?;
        let bk = b.sub(0..mt, k..k + 1)?;
        let beta_k = if k == 0 { beta } else { T::ONE };
        internal::syr2k(
            opts.target,
            alpha,
            &ak,
            &bk,
            beta_k,
            c,
            opts.priority,
            opts.queue_index,
            opts.layout,
        )?;
    }
    Ok(())
}
