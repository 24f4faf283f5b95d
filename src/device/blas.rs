//! Batched BLAS launches on device queues

use super::DeviceFault;
use crate::batch::{GemmBatch, GemmOperands, Syr2kBatch, Syr2kEntry, Syr2kParams};
use crate::dtype::Element;
use crate::kernels::{gemm_raw, syr2k_raw};
use crate::runtime::DeviceQueue;
use rayon::prelude::*;
use std::sync::mpsc;

/// Enqueue one launch covering every entry of `batch`
pub fn gemm_batch<'a, T: Element>(batch: GemmBatch<'a, T>, queue: &mut DeviceQueue<'a>) {
    if batch.is_empty() {
        return;
    }
    trace_gemm(&batch, queue);
    let mut batch = batch;
    queue.launch("gemm_batch", move || run_gemm(&mut batch));
}

/// Enqueue `batch`, then a second launch applying `next` to the same outputs.
///
/// The outputs pass from the first launch to the second when the first one
/// has run, so both stay on this queue, in order.
pub fn gemm_batch_pair<'a, T: Element>(
    batch: GemmBatch<'a, T>,
    next: GemmOperands<'a, T>,
    queue: &mut DeviceQueue<'a>,
) {
    if batch.is_empty() {
        return;
    }
    trace_gemm(&batch, queue);
    let (tx, rx) = mpsc::channel::<GemmBatch<'a, T>>();
    let mut batch = batch;
    queue.launch("gemm_batch", move || {
        run_gemm(&mut batch)?;
        // the receiver is dropped only if the queue discards its pending work
        let _ = tx.send(batch);
        Ok(())
    });
    queue.launch("gemm_batch", move || {
        let mut batch = rx
            .recv()
            .map_err(|_| DeviceFault::new("gemm_batch", "outputs of the preceding launch are gone"))?;
        batch
            .replace_operands(next)
            .map_err(|err| DeviceFault::new("gemm_batch", err.to_string()))?;
        run_gemm(&mut batch)
    });
}

fn trace_gemm<T: Element>(batch: &GemmBatch<'_, T>, queue: &DeviceQueue<'_>) {
    log::trace!(
        "device {}: gemm_batch {}x{}x{} count={}",
        queue.device_id(),
        batch.m,
        batch.n,
        batch.k,
        batch.len()
    );
}

fn run_gemm<T: Element>(batch: &mut GemmBatch<'_, T>) -> Result<(), DeviceFault> {
    let params = batch.params;
    let (m, n, k) = (batch.m, batch.n, batch.k);
    let (a, lda, b, ldb, ldc) = (&batch.a, &batch.lda, &batch.b, &batch.ldb, &batch.ldc);
    batch.c.par_iter_mut().enumerate().try_for_each(|(e, c)| {
        gemm_raw(
            params.layout,
            params.op_a,
            params.op_b,
            m,
            n,
            k,
            params.alpha,
            a[e].as_slice(),
            lda[e],
            b[e].as_slice(),
            ldb[e],
            params.beta,
            c.as_mut_slice(),
            ldc[e],
        )
        .map_err(|err| DeviceFault::new("gemm_batch", format!("entry {}: {}", e, err)))
    })
}

/// Enqueue one launch covering every entry of `batch`
pub fn syr2k_batch<'a, T: Element>(batch: Syr2kBatch<'a, T>, queue: &mut DeviceQueue<'a>) {
    if batch.is_empty() {
        return;
    }
    log::trace!(
        "device {}: syr2k_batch n={} k={} count={}",
        queue.device_id(),
        batch.n,
        batch.k,
        batch.len()
    );
    queue.launch("syr2k_batch", move || {
        let Syr2kBatch {
            params,
            n,
            k,
            a,
            lda,
            b,
            ldb,
            mut c,
            ldc,
        } = batch;
        c.par_iter_mut().enumerate().try_for_each(|(e, c)| {
            syr2k_raw(
                params.layout,
                params.uplo,
                params.op,
                n,
                k,
                params.alpha,
                a[e].as_slice(),
                lda[e],
                b[e].as_slice(),
                ldb[e],
                params.beta,
                c.as_mut_slice(),
                ldc[e],
            )
            .map_err(|err| DeviceFault::new("syr2k_batch", format!("entry {}: {}", e, err)))
        })
    });
}

/// Enqueue a single, unbatched syr2k
pub fn syr2k<'a, T: Element>(params: Syr2kParams<T>, entry: Syr2kEntry<'a, T>, queue: &mut DeviceQueue<'a>) {
    queue.launch("syr2k", move || {
        let Syr2kEntry {
            n,
            k,
            a,
            lda,
            b,
            ldb,
            mut c,
            ldc,
        } = entry;
        syr2k_raw(
            params.layout,
            params.uplo,
            params.op,
            n,
            k,
            params.alpha,
            a.as_slice(),
            lda,
            b.as_slice(),
            ldb,
            params.beta,
            c.as_mut_slice(),
            ldc,
        )
        .map_err(|err| DeviceFault::new("syr2k", err.to_string()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{GemmEntry, GemmParams, OpPlan, assemble_gemm, assemble_gemm_pair};
    use crate::runtime::AccelClient;
    use crate::tile::{Op, TileLayout, TilePtr, TilePtrMut, Uplo};

    #[test]
    fn test_gemm_batch_single_launch() {
        let client = AccelClient::new(1, Some(2), 1, None, 64).unwrap();
        let a = vec![1.0f64, 2.0];
        let b = vec![3.0f64, 4.0];
        let mut c = vec![vec![1.0f64; 4]; 3];
        {
            let mut queue = client.queue(0);
            let params = GemmParams {
                layout: TileLayout::ColMajor,
                op_a: Op::NoTrans,
                op_b: Op::Trans,
                alpha: 1.0,
                beta: 0.0,
            };
            let entries = c.iter_mut().map(|c| GemmEntry {
                m: 2,
                n: 2,
                k: 1,
                a: TilePtr::new(&a),
                lda: 2,
                b: TilePtr::new(&b),
                ldb: 2,
                c: TilePtrMut::new(c),
                ldc: 2,
            });
            for batch in assemble_gemm(params, entries) {
                gemm_batch(batch, &mut queue);
            }
            assert_eq!(queue.launch_count(), 1);
        }
        for c in &c {
            assert_eq!(c, &vec![3.0, 6.0, 4.0, 8.0]);
        }
    }

    #[test]
    fn test_pair_accumulates_in_order() {
        let client = AccelClient::new(0, Some(2), 1, None, 64).unwrap();
        let a = vec![1.0f64, 1.0];
        let b = vec![2.0f64, 2.0];
        let mut c = vec![vec![5.0f64; 4]; 2];
        {
            let mut queue = client.queue(0);
            let first = GemmParams {
                layout: TileLayout::ColMajor,
                op_a: Op::NoTrans,
                op_b: Op::Trans,
                alpha: 1.0,
                beta: 0.0,
            };
            let second = GemmParams { beta: 1.0, ..first };
            let plan = OpPlan::normalize(Op::NoTrans, Op::NoTrans, true).unwrap();
            let entries = c.iter_mut().map(|c| {
                (
                    plan.gemm_entry(2, 2, 1, TilePtr::new(&a), 2, TilePtr::new(&b), 2, TilePtrMut::new(c), 2),
                    plan.operands(TilePtr::new(&b), 2, TilePtr::new(&b), 2),
                )
            });
            for (batch, next) in assemble_gemm_pair(first, second, entries) {
                gemm_batch_pair(batch, next, &mut queue);
            }
            assert_eq!(queue.launch_count(), 2);
        }
        // a·bᵀ = 2, then + b·bᵀ = 4
        for c in &c {
            assert_eq!(c, &vec![6.0; 4]);
        }
    }

    #[test]
    #[should_panic(expected = "fault in syr2k")]
    fn test_bad_stride_faults() {
        let client = AccelClient::new(0, Some(1), 1, None, 64).unwrap();
        let a = vec![1.0f64; 4];
        let mut c = vec![0.0f64; 4];
        let params = Syr2kParams {
            layout: TileLayout::ColMajor,
            uplo: Uplo::Lower,
            op: Op::NoTrans,
            alpha: 1.0,
            beta: 0.0,
        };
        let entry = Syr2kEntry {
            n: 2,
            k: 2,
            a: TilePtr::new(&a),
            lda: 1,
            b: TilePtr::new(&a),
            ldb: 2,
            c: TilePtrMut::new(&mut c),
            ldc: 2,
        };
        let mut queue = client.queue(0);
        syr2k(params, entry, &mut queue);
        queue.sync();
    }
}
