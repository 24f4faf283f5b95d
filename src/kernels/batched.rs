//! Host batched back-end
//!
//! One call executes every entry of a [`GemmBatch`] on the host pool and
//! reports a per-entry status array (`0` = success).

use super::blas::gemm_raw;
use crate::batch::GemmBatch;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::CpuClient;
use rayon::prelude::*;

/// Status value of an entry whose arguments were rejected
pub const INFO_ILLEGAL_ARGUMENT: i64 = -1;

/// Run every entry of `batch`; returns one status per entry
pub fn gemm_batch<T: Element>(batch: &mut GemmBatch<'_, T>, client: &CpuClient) -> Vec<i64> {
    let params = batch.params;
    let (m, n, k) = (batch.m, batch.n, batch.k);
    let (a, lda, b, ldb, ldc) = (&batch.a, &batch.lda, &batch.b, &batch.ldb, &batch.ldc);
    let c = &mut batch.c;
    client.install_parallelism(|| {
        c.par_iter_mut()
            .with_min_len(client.rayon_min_len())
            .enumerate()
            .map(|(e, c)| {
                let status = gemm_raw(
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
                );
                to_info(status)
            })
            .collect()
    })
}

fn to_info(status: Result<()>) -> i64 {
    match status {
        Ok(()) => 0,
        Err(err) => {
            log::trace!("batched entry rejected: {}", err);
            INFO_ILLEGAL_ARGUMENT
        }
    }
}

/// Turn a status array into an error naming the first failed entry
pub fn check_info(info: &[i64], routine: &str) -> Result<()> {
    match info.iter().position(|&s| s != 0) {
        None => Ok(()),
        Some(entry) => Err(Error::Backend(format!(
            "{}: entry {} of {} failed with status {}",
            routine,
            entry,
            info.len(),
            info[entry]
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{GemmEntry, GemmParams, assemble_gemm};
    use crate::tile::{Op, TileLayout, TilePtr, TilePtrMut};

    #[test]
    fn test_gemm_batch_runs_every_entry() {
        let client = CpuClient::new(Some(2), None).unwrap();
        let a = vec![1.0f64, 2.0, 3.0, 4.0];
        let b = vec![1.0f64, 0.0, 0.0, 1.0];
        let mut c0 = vec![1.0f64; 4];
        let mut c1 = vec![0.0f64; 4];
        let params = GemmParams {
            layout: TileLayout::ColMajor,
            op_a: Op::NoTrans,
            op_b: Op::Trans,
            alpha: 2.0,
            beta: 1.0,
        };
        let entries = [&mut c0, &mut c1].into_iter().map(|c| GemmEntry {
            m: 2,
            n: 2,
            k: 2,
            a: TilePtr::new(&a),
            lda: 2,
            b: TilePtr::new(&b),
            ldb: 2,
            c: TilePtrMut::new(c),
            ldc: 2,
        });
        let mut groups = assemble_gemm(params, entries);
        assert_eq!(groups.len(), 1);
        let info = gemm_batch(&mut groups[0], &client);
        assert!(check_info(&info, "gemm_batch").is_ok());
        drop(groups);
        assert_eq!(c0, vec![3.0, 5.0, 7.0, 9.0]);
        assert_eq!(c1, vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_check_info_reports_first_failure() {
        let err = check_info(&[0, 0, -1, -1], "gemm_batch").unwrap_err();
        assert!(err.to_string().contains("entry 2 of 4"));
    }
}
