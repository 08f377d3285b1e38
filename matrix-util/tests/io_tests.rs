use matrix_util::common_io::create_temp_dir_file;
use matrix_util::mtx_io::{read_mtx_triplets, write_mtx_triplets};
use matrix_util::traits::{IoOps, SampleOps};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn dmatrix_io_test() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let xx = nalgebra::DMatrix::<f64>::runif(50, 20, &mut rng);

    let (_dir, tsv_file) = create_temp_dir_file(".tsv.gz")?;
    xx.to_tsv(&tsv_file)?;

    let yy = nalgebra::DMatrix::<f64>::read_file_delim(&tsv_file, "\t", None)?;

    approx::assert_abs_diff_eq!(xx, yy);
    Ok(())
}

#[test]
fn ragged_rows_are_rejected() -> anyhow::Result<()> {
    let (_dir, file) = create_temp_dir_file(".tsv")?;
    std::fs::write(&file, "1\t2\t3\n4\t5\n")?;
    assert!(nalgebra::DMatrix::<f64>::from_tsv(&file, None).is_err());
    Ok(())
}

#[test]
fn mtx_io_test() -> anyhow::Result<()> {
    let triplets = vec![(2, 1, 3.0), (0, 0, 1.0), (0, 4, 2.5)];
    let (_dir, mtx_file) = create_temp_dir_file(".mtx.gz")?;
    write_mtx_triplets(&triplets, 3, 5, &mtx_file)?;

    let (read, shape) = read_mtx_triplets(&mtx_file)?;
    assert_eq!(shape, (3, 5, 3));
    assert_eq!(read, vec![(0, 0, 1.0), (0, 4, 2.5), (2, 1, 3.0)]);
    Ok(())
}

#[test]
fn mtx_out_of_range_entry() -> anyhow::Result<()> {
    let (_dir, mtx_file) = create_temp_dir_file(".mtx")?;
    std::fs::write(
        &mtx_file,
        "%%MatrixMarket matrix coordinate real general\n2 2 1\n3 1 1.0\n",
    )?;
    assert!(read_mtx_triplets(&mtx_file).is_err());
    Ok(())
}
