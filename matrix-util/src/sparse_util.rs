//! Products against a CSR matrix that only visit stored entries.
//!
//! Every reduction over rows is split into a fixed number of row
//! chunks and the partial results are combined in chunk order, so the
//! floating point result does not depend on the size of the thread
//! pool.

use crate::dmatrix_util::safe_ln;
use crate::mtx_io::Triplet;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

/// Upper bound on the number of partial sums in a row reduction
pub const MAX_REDUCTION_CHUNKS: usize = 16;

/// Fixed row ranges for a deterministic parallel reduction
pub fn reduction_chunks(nrows: usize) -> Vec<std::ops::Range<usize>> {
    if nrows == 0 {
        return vec![];
    }
    let nchunk = nrows.min(MAX_REDUCTION_CHUNKS);
    let size = nrows.div_ceil(nchunk);
    (0..nrows)
        .step_by(size)
        .map(|lb| lb..(lb + size).min(nrows))
        .collect()
}

/// Build a CSR matrix from 0-based triplets; duplicates are summed
pub fn csr_from_triplets(
    nrow: usize,
    ncol: usize,
    triplets: &[Triplet],
) -> anyhow::Result<CsrMatrix<f64>> {
    let rows = triplets.iter().map(|t| t.0).collect();
    let cols = triplets.iter().map(|t| t.1).collect();
    let vals = triplets.iter().map(|t| t.2).collect();
    let coo = CooMatrix::try_from_triplets(nrow, ncol, rows, cols, vals)
        .map_err(|e| anyhow::anyhow!("invalid triplets: {}", e))?;
    Ok(CsrMatrix::from(&coo))
}

/// Keep the non-zero entries of a dense matrix
pub fn csr_from_dense(xx: &DMatrix<f64>) -> anyhow::Result<CsrMatrix<f64>> {
    let mut triplets = vec![];
    for i in 0..xx.nrows() {
        for j in 0..xx.ncols() {
            let x = xx[(i, j)];
            if x != 0.0 {
                triplets.push((i, j, x));
            }
        }
    }
    csr_from_triplets(xx.nrows(), xx.ncols(), &triplets)
}

pub fn csr_to_dense(xx: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut ret = DMatrix::zeros(xx.nrows(), xx.ncols());
    for (i, j, &x) in xx.triplet_iter() {
        ret[(i, j)] += x;
    }
    ret
}

pub fn row_sums(xx: &CsrMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(
        xx.nrows(),
        (0..xx.nrows()).map(|i| xx.row(i).values().iter().sum::<f64>()),
    )
}

/// Stack the rows of `bot` under the rows of `top`
pub fn vstack_csr(top: &CsrMatrix<f64>, bot: &CsrMatrix<f64>) -> anyhow::Result<CsrMatrix<f64>> {
    if top.ncols() != bot.ncols() {
        return Err(anyhow::anyhow!(
            "column mismatch: {} vs {}",
            top.ncols(),
            bot.ncols()
        ));
    }
    let offset = top.nnz();
    let mut row_offsets = top.row_offsets().to_vec();
    row_offsets.extend(bot.row_offsets()[1..].iter().map(|x| x + offset));
    let mut col_indices = top.col_indices().to_vec();
    col_indices.extend_from_slice(bot.col_indices());
    let mut values = top.values().to_vec();
    values.extend_from_slice(bot.values());

    CsrMatrix::try_from_csr_data(
        top.nrows() + bot.nrows(),
        top.ncols(),
        row_offsets,
        col_indices,
        values,
    )
    .map_err(|e| anyhow::anyhow!("vstack: {}", e))
}

/// Subset of rows in the given order
pub fn select_rows(xx: &CsrMatrix<f64>, rows: &[usize]) -> anyhow::Result<CsrMatrix<f64>> {
    let mut row_offsets = Vec::with_capacity(rows.len() + 1);
    let mut col_indices = vec![];
    let mut values = vec![];
    row_offsets.push(0);
    for &i in rows {
        if i >= xx.nrows() {
            return Err(anyhow::anyhow!("row {} out of {}", i, xx.nrows()));
        }
        let row = xx.row(i);
        col_indices.extend_from_slice(row.col_indices());
        values.extend_from_slice(row.values());
        row_offsets.push(values.len());
    }
    CsrMatrix::try_from_csr_data(rows.len(), xx.ncols(), row_offsets, col_indices, values)
        .map_err(|e| anyhow::anyhow!("select rows: {}", e))
}

/// Same sparsity as `xx`, one new value per stored entry
fn map_stored_entries<F>(xx: &CsrMatrix<f64>, f: F) -> CsrMatrix<f64>
where
    F: Fn(usize, &[usize], &[f64]) -> Vec<f64> + Sync,
{
    let rows: Vec<Vec<f64>> = (0..xx.nrows())
        .into_par_iter()
        .map(|i| {
            let row = xx.row(i);
            f(i, row.col_indices(), row.values())
        })
        .collect();

    let mut ret = xx.clone();
    for (dst, src) in ret.values_mut().iter_mut().zip(rows.into_iter().flatten()) {
        *dst = src;
    }
    ret
}

/// `a[i,] * b[,j]`
#[inline]
fn row_dot_column(aa: &DMatrix<f64>, i: usize, bb: &DMatrix<f64>, j: usize) -> f64 {
    aa.row(i).iter().zip(bb.column(j).iter()).map(|(a, b)| a * b).sum()
}

///
/// `X[i,j] / (A[i,] * B[,j])` at the stored entries of `X`
///
/// * `xx` - `n x m` sparse
/// * `aa` - `n x k` dense
/// * `bb` - `k x m` dense
///
pub fn sparse_scalar_quotient_of_dot(
    xx: &CsrMatrix<f64>,
    aa: &DMatrix<f64>,
    bb: &DMatrix<f64>,
) -> CsrMatrix<f64> {
    debug_assert_eq!(xx.nrows(), aa.nrows());
    debug_assert_eq!(xx.ncols(), bb.ncols());
    debug_assert_eq!(aa.ncols(), bb.nrows());

    map_stored_entries(xx, |i, cols, vals| {
        cols.iter()
            .zip(vals.iter())
            .map(|(&j, &x)| x / row_dot_column(aa, i, bb, j).max(f64::MIN_POSITIVE))
            .collect()
    })
}

///
/// `X[i,j] * ln(A[i,] * B[,j])` at the stored entries of `X`
///
pub fn sparse_scalar_product_of_safe_ln_dot(
    xx: &CsrMatrix<f64>,
    aa: &DMatrix<f64>,
    bb: &DMatrix<f64>,
) -> CsrMatrix<f64> {
    debug_assert_eq!(xx.nrows(), aa.nrows());
    debug_assert_eq!(xx.ncols(), bb.ncols());

    map_stored_entries(xx, |i, cols, vals| {
        cols.iter()
            .zip(vals.iter())
            .map(|(&j, &x)| x * safe_ln(row_dot_column(aa, i, bb, j)))
            .collect()
    })
}

///
/// `sum_ij X[i,j] * ln(A[i,] * B[,j])` over the stored entries,
/// reduced in fixed row chunks
///
pub fn sum_of_sparse_scalar_product_of_safe_ln_dot(
    xx: &CsrMatrix<f64>,
    aa: &DMatrix<f64>,
    bb: &DMatrix<f64>,
) -> f64 {
    let partial: Vec<f64> = reduction_chunks(xx.nrows())
        .into_par_iter()
        .map(|rows| {
            let mut tot = 0.0;
            for i in rows {
                let row = xx.row(i);
                for (&j, &x) in row.col_indices().iter().zip(row.values().iter()) {
                    tot += x * safe_ln(row_dot_column(aa, i, bb, j));
                }
            }
            tot
        })
        .collect();
    partial.into_iter().sum()
}

///
/// `X' * M`, where `X` is `n x m` sparse and `M` is `n x k` dense
///
pub fn sparse_transpose_dot(xx: &CsrMatrix<f64>, mm: &DMatrix<f64>) -> DMatrix<f64> {
    debug_assert_eq!(xx.nrows(), mm.nrows());
    let (m, k) = (xx.ncols(), mm.ncols());

    let partial: Vec<DMatrix<f64>> = reduction_chunks(xx.nrows())
        .into_par_iter()
        .map(|rows| {
            let mut acc = DMatrix::<f64>::zeros(m, k);
            for i in rows {
                let row = xx.row(i);
                for (&j, &x) in row.col_indices().iter().zip(row.values().iter()) {
                    for c in 0..k {
                        acc[(j, c)] += x * mm[(i, c)];
                    }
                }
            }
            acc
        })
        .collect();

    partial
        .into_iter()
        .fold(DMatrix::zeros(m, k), |acc, part| acc + part)
}

///
/// `X * B'`, where `X` is `n x m` sparse and `B` is `k x m` dense
///
pub fn sparse_dot_transpose(xx: &CsrMatrix<f64>, bb: &DMatrix<f64>) -> DMatrix<f64> {
    debug_assert_eq!(xx.ncols(), bb.ncols());
    let k = bb.nrows();

    let rows: Vec<Vec<f64>> = (0..xx.nrows())
        .into_par_iter()
        .map(|i| {
            let mut out = vec![0.0; k];
            let row = xx.row(i);
            for (&j, &x) in row.col_indices().iter().zip(row.values().iter()) {
                for (o, b) in out.iter_mut().zip(bb.column(j).iter()) {
                    *o += x * b;
                }
            }
            out
        })
        .collect();

    DMatrix::from_row_iterator(xx.nrows(), k, rows.into_iter().flatten())
}

///
/// `X * M`, where `X` is `n x m` sparse and `M` is `m x k` dense
///
pub fn sparse_dot_dense(xx: &CsrMatrix<f64>, mm: &DMatrix<f64>) -> DMatrix<f64> {
    debug_assert_eq!(xx.ncols(), mm.nrows());
    let k = mm.ncols();

    let rows: Vec<Vec<f64>> = (0..xx.nrows())
        .into_par_iter()
        .map(|i| {
            let mut out = vec![0.0; k];
            let row = xx.row(i);
            for (&j, &x) in row.col_indices().iter().zip(row.values().iter()) {
                for (c, o) in out.iter_mut().enumerate() {
                    *o += x * mm[(j, c)];
                }
            }
            out
        })
        .collect();

    DMatrix::from_row_iterator(xx.nrows(), k, rows.into_iter().flatten())
}

/// `X' * X` as a dense `m x m` matrix
pub fn sparse_gram(xx: &CsrMatrix<f64>) -> DMatrix<f64> {
    let m = xx.ncols();
    let partial: Vec<DMatrix<f64>> = reduction_chunks(xx.nrows())
        .into_par_iter()
        .map(|rows| {
            let mut acc = DMatrix::<f64>::zeros(m, m);
            for i in rows {
                let row = xx.row(i);
                let (cols, vals) = (row.col_indices(), row.values());
                for (&a, &xa) in cols.iter().zip(vals.iter()) {
                    for (&b, &xb) in cols.iter().zip(vals.iter()) {
                        acc[(a, b)] += xa * xb;
                    }
                }
            }
            acc
        })
        .collect();

    partial
        .into_iter()
        .fold(DMatrix::zeros(m, m), |acc, part| acc + part)
}
