use approx::assert_abs_diff_eq;
use matrix_util::sparse_util::*;
use matrix_util::traits::{RowOps, SampleOps};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_sparse(n: usize, m: usize, rng: &mut StdRng) -> DMatrix<f64> {
    DMatrix::from_fn(n, m, |_, _| {
        if rng.random::<f64>() < 0.3 {
            rng.random_range(1..5) as f64
        } else {
            0.0
        }
    })
}

#[test]
fn sparse_products_match_dense() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let dense = random_sparse(37, 13, &mut rng);
    let xx = csr_from_dense(&dense)?;
    assert_abs_diff_eq!(csr_to_dense(&xx), dense.clone());

    let mm = DMatrix::<f64>::runif(37, 4, &mut rng);
    assert_abs_diff_eq!(
        sparse_transpose_dot(&xx, &mm),
        dense.transpose() * &mm,
        epsilon = 1e-10
    );

    let bb = DMatrix::<f64>::runif(4, 13, &mut rng);
    assert_abs_diff_eq!(
        sparse_dot_transpose(&xx, &bb),
        &dense * bb.transpose(),
        epsilon = 1e-10
    );

    let cc = DMatrix::<f64>::runif(13, 4, &mut rng);
    assert_abs_diff_eq!(sparse_dot_dense(&xx, &cc), &dense * &cc, epsilon = 1e-10);
    assert_abs_diff_eq!(sparse_gram(&xx), dense.transpose() * &dense, epsilon = 1e-10);
    assert_abs_diff_eq!(row_sums(&xx), dense.sum_each_row(), epsilon = 1e-12);
    Ok(())
}

#[test]
fn quotient_and_log_only_at_stored_entries() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let dense = random_sparse(20, 9, &mut rng);
    let xx = csr_from_dense(&dense)?;
    let aa = DMatrix::<f64>::runif(20, 3, &mut rng);
    let bb = DMatrix::<f64>::runif(3, 9, &mut rng);
    let ab = &aa * &bb;

    let quot = csr_to_dense(&sparse_scalar_quotient_of_dot(&xx, &aa, &bb));
    let lnp = sparse_scalar_product_of_safe_ln_dot(&xx, &aa, &bb);
    let mut tot = 0.0;
    for i in 0..20 {
        for j in 0..9 {
            if dense[(i, j)] == 0.0 {
                assert_eq!(quot[(i, j)], 0.0);
            } else {
                assert_abs_diff_eq!(quot[(i, j)], dense[(i, j)] / ab[(i, j)], epsilon = 1e-10);
                tot += dense[(i, j)] * ab[(i, j)].ln();
            }
        }
    }
    assert_eq!(lnp.nnz(), xx.nnz());
    assert_abs_diff_eq!(
        sum_of_sparse_scalar_product_of_safe_ln_dot(&xx, &aa, &bb),
        tot,
        epsilon = 1e-9
    );
    Ok(())
}

#[test]
fn stack_and_select_rows() -> anyhow::Result<()> {
    let top = csr_from_triplets(2, 3, &[(0, 1, 1.0), (1, 2, 2.0)])?;
    let bot = csr_from_triplets(1, 3, &[(0, 0, 3.0)])?;
    let both = vstack_csr(&top, &bot)?;
    assert_eq!(both.nrows(), 3);
    assert_eq!(csr_to_dense(&both)[(2, 0)], 3.0);

    let sel = select_rows(&both, &[2, 0])?;
    assert_eq!(csr_to_dense(&sel)[(0, 0)], 3.0);
    assert_eq!(csr_to_dense(&sel)[(1, 1)], 1.0);

    let wide = csr_from_triplets(1, 4, &[])?;
    assert!(vstack_csr(&top, &wide).is_err());
    Ok(())
}

#[test]
fn chunks_cover_all_rows() {
    for n in [0, 1, 15, 16, 17, 1000] {
        let chunks = reduction_chunks(n);
        assert!(chunks.len() <= MAX_REDUCTION_CHUNKS);
        assert_eq!(chunks.iter().map(|r| r.len()).sum::<usize>(), n);
    }
}

#[test]
fn softmax_rows_sum_to_one() {
    let mut rng = StdRng::seed_from_u64(2);
    let xx = DMatrix::<f64>::rnorm(10, 6, &mut rng) * 300.0;
    let pp = xx.row_softmax();
    for s in pp.sum_each_row().iter() {
        assert_abs_diff_eq!(*s, 1.0, epsilon = 1e-12);
    }
}
