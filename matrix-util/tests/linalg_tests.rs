use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_linalg::*;
use matrix_util::traits::SampleOps;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn random_spd(k: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let xx = DMatrix::<f64>::rnorm(3 * k, k, rng);
    xx.transpose() * &xx / (3 * k) as f64 + DMatrix::identity(k, k) * 0.1
}

#[test]
fn inverse_and_log_det() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(7);
    let aa = random_spd(6, &mut rng);

    let inv = spd_inverse(&aa)?;
    assert_abs_diff_eq!(&aa * &inv, DMatrix::identity(6, 6), epsilon = 1e-9);

    let log_det = spd_log_det(&aa)?;
    assert_abs_diff_eq!(log_det, aa.determinant().ln(), epsilon = 1e-9);

    let bb = DVector::from_fn(6, |i, _| i as f64);
    let xx = spd_solve(&aa, &bb)?;
    assert_abs_diff_eq!(&aa * xx, bb, epsilon = 1e-9);
    Ok(())
}

#[test]
fn singular_needs_ridge() {
    let aa = DMatrix::from_element(3, 3, 1.0);
    assert_eq!(spd_inverse(&aa).unwrap_err(), LinalgError::Singular);

    let reg = ridge_spd_inverse(&aa).unwrap();
    assert!(reg.ridge > 0.0);
    assert!(reg.value.iter().all(|x| x.is_finite()));

    let rect = DMatrix::<f64>::zeros(2, 3);
    assert_eq!(spd_inverse(&rect).unwrap_err(), LinalgError::NotSquare(2, 3));
}

#[test]
fn covariance_estimators() {
    let mut rng = StdRng::seed_from_u64(3);
    let xx = DMatrix::<f64>::rnorm(40, 5, &mut rng);

    let emp = sample_covariance(&xx);
    assert_abs_diff_eq!(emp.clone(), emp.transpose(), epsilon = 1e-12);

    let (shrunk, rho) = oas_covariance(&xx);
    assert!((0.0..=1.0).contains(&rho));
    assert_abs_diff_eq!(shrunk.trace(), emp.trace(), epsilon = 1e-9);
    assert!(spd_inverse(&shrunk).is_ok());
}

#[test]
fn multi_gamma_reduces_to_gamma() {
    use special::Gamma;
    assert_abs_diff_eq!(ln_multi_gamma(1, 3.5), 3.5_f64.ln_gamma().0, epsilon = 1e-12);
}
