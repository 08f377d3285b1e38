use nalgebra::{DMatrix, DVector};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("expected a square matrix, got {0} x {1}")]
    NotSquare(usize, usize),
    #[error("matrix is not positive definite")]
    Singular,
    #[error("matrix has non-finite entries")]
    NonFinite,
}

/// Result of an operation that may have needed a ridge on the
/// diagonal to succeed
#[derive(Debug, Clone)]
pub struct Regularized<T> {
    pub value: T,
    /// ridge added to the diagonal; zero if none was needed
    pub ridge: f64,
}

const RIDGE_START: f64 = 1e-8;
const RIDGE_MAX_TRIALS: usize = 12;

fn check_spd_input(aa: &DMatrix<f64>) -> Result<(), LinalgError> {
    if aa.nrows() != aa.ncols() {
        return Err(LinalgError::NotSquare(aa.nrows(), aa.ncols()));
    }
    if aa.iter().any(|x| !x.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(())
}

fn cholesky(aa: &DMatrix<f64>) -> Result<nalgebra::Cholesky<f64, nalgebra::Dyn>, LinalgError> {
    check_spd_input(aa)?;
    aa.clone().cholesky().ok_or(LinalgError::Singular)
}

/// Inverse of a symmetric positive definite matrix
pub fn spd_inverse(aa: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    Ok(cholesky(aa)?.inverse())
}

/// `ln|A|` from the diagonal of the Cholesky factor
pub fn spd_log_det(aa: &DMatrix<f64>) -> Result<f64, LinalgError> {
    let chol = cholesky(aa)?;
    Ok(2.0 * chol.l_dirty().diagonal().iter().map(|x| x.ln()).sum::<f64>())
}

/// Solve `A x = b` for symmetric positive definite `A`
pub fn spd_solve(aa: &DMatrix<f64>, bb: &DVector<f64>) -> Result<DVector<f64>, LinalgError> {
    Ok(cholesky(aa)?.solve(bb))
}

/// Retry `f(A + ridge * I)` with a growing ridge while `A` is
/// numerically singular; the ridge scales with the mean diagonal
fn with_ridge<T>(
    aa: &DMatrix<f64>,
    f: impl Fn(&DMatrix<f64>) -> Result<T, LinalgError>,
) -> Result<Regularized<T>, LinalgError> {
    match f(aa) {
        Ok(value) => return Ok(Regularized { value, ridge: 0.0 }),
        Err(LinalgError::Singular) => {}
        Err(e) => return Err(e),
    }

    let n = aa.nrows().max(1) as f64;
    let scale = (aa.trace().abs() / n).max(1.0);
    let mut ridge = RIDGE_START * scale;
    for _ in 0..RIDGE_MAX_TRIALS {
        let mut aa_ridge = aa.clone();
        for i in 0..aa_ridge.nrows() {
            aa_ridge[(i, i)] += ridge;
        }
        if let Ok(value) = f(&aa_ridge) {
            log::debug!("added ridge {:.3e} to a singular matrix", ridge);
            return Ok(Regularized { value, ridge });
        }
        ridge *= 10.0;
    }
    Err(LinalgError::Singular)
}

/// [`spd_inverse`] with a diagonal ridge fallback
pub fn ridge_spd_inverse(aa: &DMatrix<f64>) -> Result<Regularized<DMatrix<f64>>, LinalgError> {
    with_ridge(aa, spd_inverse)
}

/// [`spd_solve`] with a diagonal ridge fallback
pub fn ridge_spd_solve(
    aa: &DMatrix<f64>,
    bb: &DVector<f64>,
) -> Result<Regularized<DVector<f64>>, LinalgError> {
    with_ridge(aa, |a| spd_solve(a, bb))
}

/// Column means of `X` (observations in rows)
pub fn column_means(xx: &DMatrix<f64>) -> DVector<f64> {
    let n = xx.nrows().max(1) as f64;
    DVector::from_iterator(xx.ncols(), xx.column_iter().map(|c| c.sum() / n))
}

/// `sum_i (x_i - mu)(x_i - mu)'` around the given centre
pub fn scatter(xx: &DMatrix<f64>, mu: &DVector<f64>) -> DMatrix<f64> {
    let mut centred = xx.clone();
    for mut row in centred.row_iter_mut() {
        for (x, m) in row.iter_mut().zip(mu.iter()) {
            *x -= m;
        }
    }
    centred.transpose() * centred
}

/// Maximum likelihood covariance (divided by `n`) of the rows of `X`
pub fn sample_covariance(xx: &DMatrix<f64>) -> DMatrix<f64> {
    let n = xx.nrows().max(1) as f64;
    scatter(xx, &column_means(xx)) / n
}

///
/// Oracle approximating shrinkage of the sample covariance towards a
/// scaled identity (Chen, Wiesel, Eldar & Hero, 2010)
///
/// Returns the shrunk covariance and the shrinkage intensity in `[0,1]`
///
pub fn oas_covariance(xx: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let n = xx.nrows() as f64;
    let p = xx.ncols();
    let emp = sample_covariance(xx);
    if p == 0 {
        return (emp, 0.0);
    }
    let pf = p as f64;

    let mu = emp.trace() / pf;
    let alpha = emp.iter().map(|x| x * x).sum::<f64>() / (pf * pf);
    let num = alpha + mu * mu;
    let den = (n + 1.0) * (alpha - mu * mu / pf);
    let shrinkage = if den == 0.0 { 1.0 } else { (num / den).min(1.0) };

    let mut shrunk = emp * (1.0 - shrinkage);
    for i in 0..p {
        shrunk[(i, i)] += shrinkage * mu;
    }
    (shrunk, shrinkage)
}

/// Multivariate log gamma `ln Γ_p(a)`
pub fn ln_multi_gamma(p: usize, a: f64) -> f64 {
    use special::Gamma;
    let pf = p as f64;
    let mut ret = pf * (pf - 1.0) / 4.0 * std::f64::consts::PI.ln();
    for j in 1..=p {
        ret += (a + (1.0 - j as f64) / 2.0).ln_gamma().0;
    }
    ret
}
