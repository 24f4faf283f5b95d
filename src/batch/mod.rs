//! Batch assembly
//!
//! Groups tile arguments into shape-homogeneous [`GemmBatch`] and
//! [`Syr2kBatch`] descriptors so a whole group runs as one batched call.
//! Every entry handed to an assembler lands in exactly one group and no
//! group is ever empty; groups keep the order in which their shape first
//! appeared.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tile::{Op, TileLayout, TilePtr, TilePtrMut, Uplo};

// ============================================================================
// Operator normalization
// ============================================================================

/// Transpose tags a batched product runs with, after folding in the
/// operator of the output matrix.
///
/// Entries are described in logical terms (`a` from the left operand, `b`
/// from the right one, extents `m × n`). When the output is itself a
/// transposed view, the stored tile receives the transposed product, so
/// the operand roles and the extents swap; [`OpPlan::gemm_entry`] applies
/// that swap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpPlan {
    /// Tag applied to the first operand array
    pub op_a: Op,
    /// Tag applied to the second operand array
    pub op_b: Op,
    /// Whether operand roles and `m`/`n` are swapped
    pub swapped: bool,
}

impl OpPlan {
    /// Normalize `op(A)` against `op(C)`.
    ///
    /// Fails when the output is conjugate-transposed and `A` is
    /// transposed without conjugation (or the other way around) on a
    /// complex matrix.
    pub fn normalize(a_op: Op, c_op: Op, is_real: bool) -> Result<Self> {
        let mut op_a = a_op;
        if c_op != Op::NoTrans {
            op_a = if a_op == Op::NoTrans {
                c_op
            } else if a_op == c_op || is_real {
                Op::NoTrans
            } else {
                return Err(Error::invalid_argument(
                    "op",
                    format!(
                        "operand op {} cannot be combined with output op {}",
                        a_op.as_char(),
                        c_op.as_char()
                    ),
                ));
            };
        }
        let op_b = if op_a == Op::NoTrans { Op::Trans } else { Op::NoTrans };
        if c_op != Op::NoTrans {
            Ok(Self {
                op_a: op_b,
                op_b: op_a,
                swapped: true,
            })
        } else {
            Ok(Self {
                op_a,
                op_b,
                swapped: false,
            })
        }
    }

    /// Build an entry for the logical product `a · bᵀ` written into `c`
    /// of logical extent `m × n`
    #[allow(clippy::too_many_arguments)]
    pub fn gemm_entry<'a, T>(
        &self,
        m: usize,
        n: usize,
        k: usize,
        a: TilePtr<'a, T>,
        lda: usize,
        b: TilePtr<'a, T>,
        ldb: usize,
        c: TilePtrMut<'a, T>,
        ldc: usize,
    ) -> GemmEntry<'a, T> {
        if self.swapped {
            GemmEntry {
                m: n,
                n: m,
                k,
                a: b,
                lda: ldb,
                b: a,
                ldb: lda,
                c,
                ldc,
            }
        } else {
            GemmEntry {
                m,
                n,
                k,
                a,
                lda,
                b,
                ldb,
                c,
                ldc,
            }
        }
    }

    /// Operands of the logical product `a · bᵀ`, swapped like
    /// [`gemm_entry`](Self::gemm_entry)
    pub fn operands<'a, T>(
        &self,
        a: TilePtr<'a, T>,
        lda: usize,
        b: TilePtr<'a, T>,
        ldb: usize,
    ) -> OperandPair<'a, T> {
        if self.swapped {
            OperandPair {
                a: b,
                lda: ldb,
                b: a,
                ldb: lda,
            }
        } else {
            OperandPair { a, lda, b, ldb }
        }
    }
}

// ============================================================================
// gemm
// ============================================================================

/// Arguments shared by every entry of a gemm batch
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GemmParams<T> {
    /// Storage layout of every tile
    pub layout: TileLayout,
    /// Tag on the `a` operands
    pub op_a: Op,
    /// Tag on the `b` operands
    pub op_b: Op,
    /// Product scale
    pub alpha: T,
    /// Output scale
    pub beta: T,
}

/// One `c ← α·op(a)·op(b) + β·c` product
#[derive(Debug)]
pub struct GemmEntry<'a, T> {
    /// Rows of `c`
    pub m: usize,
    /// Columns of `c`
    pub n: usize,
    /// Inner dimension
    pub k: usize,
    /// Left operand
    pub a: TilePtr<'a, T>,
    /// Leading stride of `a`
    pub lda: usize,
    /// Right operand
    pub b: TilePtr<'a, T>,
    /// Leading stride of `b`
    pub ldb: usize,
    /// Output
    pub c: TilePtrMut<'a, T>,
    /// Leading stride of `c`
    pub ldc: usize,
}

/// Operands of one product, without the output
#[derive(Copy, Clone, Debug)]
pub struct OperandPair<'a, T> {
    /// Left operand
    pub a: TilePtr<'a, T>,
    /// Leading stride of `a`
    pub lda: usize,
    /// Right operand
    pub b: TilePtr<'a, T>,
    /// Leading stride of `b`
    pub ldb: usize,
}

/// Operand arrays for a further product over the outputs of a [`GemmBatch`]
#[derive(Debug)]
pub struct GemmOperands<'a, T> {
    /// Shared arguments of the further product
    pub params: GemmParams<T>,
    /// Left operands
    pub a: Vec<TilePtr<'a, T>>,
    /// Left operand strides
    pub lda: Vec<usize>,
    /// Right operands
    pub b: Vec<TilePtr<'a, T>>,
    /// Right operand strides
    pub ldb: Vec<usize>,
}

impl<'a, T: Element> GemmOperands<'a, T> {
    fn new(params: GemmParams<T>) -> Self {
        Self {
            params,
            a: Vec::new(),
            lda: Vec::new(),
            b: Vec::new(),
            ldb: Vec::new(),
        }
    }

    fn push(&mut self, pair: OperandPair<'a, T>) {
        self.a.push(pair.a);
        self.lda.push(pair.lda);
        self.b.push(pair.b);
        self.ldb.push(pair.ldb);
    }

    /// Number of operand pairs
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// Whether there are no operand pairs
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// Shape-homogeneous group of gemm entries in parallel arrays
#[derive(Debug)]
pub struct GemmBatch<'a, T> {
    /// Shared arguments
    pub params: GemmParams<T>,
    /// Rows of every output
    pub m: usize,
    /// Columns of every output
    pub n: usize,
    /// Inner dimension of every product
    pub k: usize,
    /// Left operands
    pub a: Vec<TilePtr<'a, T>>,
    /// Left operand strides
    pub lda: Vec<usize>,
    /// Right operands
    pub b: Vec<TilePtr<'a, T>>,
    /// Right operand strides
    pub ldb: Vec<usize>,
    /// Outputs
    pub c: Vec<TilePtrMut<'a, T>>,
    /// Output strides
    pub ldc: Vec<usize>,
}

impl<'a, T: Element> GemmBatch<'a, T> {
    fn new(params: GemmParams<T>, m: usize, n: usize, k: usize) -> Self {
        Self {
            params,
            m,
            n,
            k,
            a: Vec::new(),
            lda: Vec::new(),
            b: Vec::new(),
            ldb: Vec::new(),
            c: Vec::new(),
            ldc: Vec::new(),
        }
    }

    fn push(&mut self, entry: GemmEntry<'a, T>) {
        self.a.push(entry.a);
        self.lda.push(entry.lda);
        self.b.push(entry.b);
        self.ldb.push(entry.ldb);
        self.c.push(entry.c);
        self.ldc.push(entry.ldc);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.c.len()
    }

    /// Whether the batch has no entries
    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }

    /// Swap in the operands and scalars of `next`, keeping the outputs.
    /// Returns the operands that were replaced.
    pub fn replace_operands(&mut self, next: GemmOperands<'a, T>) -> Result<GemmOperands<'a, T>> {
        if next.len() != self.len() || next.lda.len() != next.len() || next.b.len() != next.len() {
            return Err(Error::invalid_argument(
                "operands",
                format!("{} operand pairs for a batch of {}", next.len(), self.len()),
            ));
        }
        let prev = GemmOperands {
            params: self.params,
            a: std::mem::replace(&mut self.a, next.a),
            lda: std::mem::replace(&mut self.lda, next.lda),
            b: std::mem::replace(&mut self.b, next.b),
            ldb: std::mem::replace(&mut self.ldb, next.ldb),
        };
        self.params = next.params;
        Ok(prev)
    }
}

/// Group gemm entries by `(m, n, k)`
pub fn assemble_gemm<'a, T: Element>(
    params: GemmParams<T>,
    entries: impl IntoIterator<Item = GemmEntry<'a, T>>,
) -> Vec<GemmBatch<'a, T>> {
    let mut groups: Vec<GemmBatch<'a, T>> = Vec::new();
    for entry in entries {
        let key = (entry.m, entry.n, entry.k);
        match groups.iter_mut().find(|g| (g.m, g.n, g.k) == key) {
            Some(group) => group.push(entry),
            None => {
                let mut group = GemmBatch::new(params, key.0, key.1, key.2);
                group.push(entry);
                groups.push(group);
            }
        }
    }
    groups
}

/// Group entries by `(m, n, k)` along with the operands of a second
/// product accumulated into the same outputs.
///
/// Group `g` of the result pairs `batches[g]` with `operands[g]`, entry for
/// entry.
pub fn assemble_gemm_pair<'a, T: Element>(
    first: GemmParams<T>,
    second: GemmParams<T>,
    entries: impl IntoIterator<Item = (GemmEntry<'a, T>, OperandPair<'a, T>)>,
) -> Vec<(GemmBatch<'a, T>, GemmOperands<'a, T>)> {
    let mut groups: Vec<(GemmBatch<'a, T>, GemmOperands<'a, T>)> = Vec::new();
    for (entry, pair) in entries {
        let key = (entry.m, entry.n, entry.k);
        let pos = match groups.iter().position(|(g, _)| (g.m, g.n, g.k) == key) {
            Some(pos) => pos,
            None => {
                groups.push((
                    GemmBatch::new(first, key.0, key.1, key.2),
                    GemmOperands::new(second),
                ));
                groups.len() - 1
            }
        };
        let (batch, operands) = &mut groups[pos];
        batch.push(entry);
        operands.push(pair);
    }
    groups
}

// ============================================================================
// syr2k
// ============================================================================

/// Arguments shared by every entry of a syr2k batch
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Syr2kParams<T> {
    /// Storage layout of every tile
    pub layout: TileLayout,
    /// Stored triangle of every output
    pub uplo: Uplo,
    /// `NoTrans`: `a·bᵀ + b·aᵀ`; `Trans`: `aᵀ·b + bᵀ·a`
    pub op: Op,
    /// Product scale
    pub alpha: T,
    /// Output scale
    pub beta: T,
}

/// One symmetric rank-2k update of an `n × n` tile
#[derive(Debug)]
pub struct Syr2kEntry<'a, T> {
    /// Order of `c`
    pub n: usize,
    /// Rank of the update
    pub k: usize,
    /// First operand
    pub a: TilePtr<'a, T>,
    /// Leading stride of `a`
    pub lda: usize,
    /// Second operand
    pub b: TilePtr<'a, T>,
    /// Leading stride of `b`
    pub ldb: usize,
    /// Output
    pub c: TilePtrMut<'a, T>,
    /// Leading stride of `c`
    pub ldc: usize,
}

/// Shape-homogeneous group of syr2k entries in parallel arrays
#[derive(Debug)]
pub struct Syr2kBatch<'a, T> {
    /// Shared arguments
    pub params: Syr2kParams<T>,
    /// Order of every output
    pub n: usize,
    /// Rank of every update
    pub k: usize,
    /// First operands
    pub a: Vec<TilePtr<'a, T>>,
    /// First operand strides
    pub lda: Vec<usize>,
    /// Second operands
    pub b: Vec<TilePtr<'a, T>>,
    /// Second operand strides
    pub ldb: Vec<usize>,
    /// Outputs
    pub c: Vec<TilePtrMut<'a, T>>,
    /// Output strides
    pub ldc: Vec<usize>,
}

impl<'a, T: Element> Syr2kBatch<'a, T> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.c.len()
    }

    /// Whether the batch has no entries
    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }
}

/// Group syr2k entries by `(n, k)`
pub fn assemble_syr2k<'a, T: Element>(
    params: Syr2kParams<T>,
    entries: impl IntoIterator<Item = Syr2kEntry<'a, T>>,
) -> Vec<Syr2kBatch<'a, T>> {
    let mut groups: Vec<Syr2kBatch<'a, T>> = Vec::new();
    for entry in entries {
        let pos = match groups.iter().position(|g| (g.n, g.k) == (entry.n, entry.k)) {
            Some(pos) => pos,
            None => {
                groups.push(Syr2kBatch {
                    params,
                    n: entry.n,
                    k: entry.k,
                    a: Vec::new(),
                    lda: Vec::new(),
                    b: Vec::new(),
                    ldb: Vec::new(),
                    c: Vec::new(),
                    ldc: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[pos];
        group.a.push(entry.a);
        group.lda.push(entry.lda);
        group.b.push(entry.b);
        group.ldb.push(entry.ldb);
        group.c.push(entry.c);
        group.ldc.push(entry.ldc);
    }
    groups
}
