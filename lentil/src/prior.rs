//! M-step updates of the per-document prior: topic mean, topic
//! covariance and, with side information, the loadings `A` and their
//! low-rank factors; plus the log densities of these global priors.

use crate::config::{CovEstimator, NiwPrior};
use crate::dataset::Dataset;
use crate::diagnostics::{verify_step, BoundTracker};
use crate::error::{Result, TopicModelError};
use crate::model_state::{ModelState, SideParams};
use crate::query_state::QueryState;
use log::debug;
use matrix_util::dmatrix_linalg::*;
use matrix_util::sparse_util::{sparse_dot_dense, sparse_gram, sparse_transpose_dot};
use matrix_util::traits::FiniteOps;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::f64::consts::PI;

/// What happened while re-estimating the prior
#[derive(Debug, Default)]
pub(crate) struct PriorUpdate {
    /// largest ridge added to any system on the way
    pub ridge: f64,
    /// `(matrix, nan, inf)` of updates that came out non-finite and
    /// were discarded in favour of the previous value
    pub discarded: Vec<(&'static str, usize, usize)>,
}

///
/// Re-estimate the prior of the document means: side loadings, topic
/// mean, topic covariance and side factors, in that order
///
/// * `diagonal` - keep only the diagonal of the topic covariance
/// * `tracker` - when set, the bound is checked after each sub-step
///
pub(crate) fn update_topic_prior(
    data: &Dataset,
    model: &mut ModelState,
    query: &QueryState,
    diagonal: bool,
    iteration: usize,
    mut tracker: Option<&mut BoundTracker>,
) -> Result<PriorUpdate> {
    let mut ret = PriorUpdate::default();
    let k = model.num_topics();
    let ndocs = query.num_docs() as f64;

    // residuals after the side-information regression
    let targets = match model.side().map(|s| s.config.source) {
        Some(source) => {
            let xx = data.side_matrix(source).ok_or_else(|| {
                TopicModelError::InvalidInput("corpus lost its side matrix".into())
            })?;
            let centred = centre_rows(query.means(), model.topic_mean());
            let sig_t = model.sig_t().clone();
            update_side(model, "side loadings", &mut ret, |side| {
                update_loadings(side, xx, &centred, &sig_t)
            })?;
            verify_step(&mut tracker, "side loadings", iteration, data, model, query);

            match model.side() {
                Some(side) => query.means() - sparse_dot_dense(xx, &side.a),
                None => query.means().clone(),
            }
        }
        None => query.means().clone(),
    };

    let topic_mean = match model.prior().niw {
        Some(NiwPrior { kappa, .. }) => targets.row_sum_tr() / (ndocs + kappa),
        None => column_means(&targets),
    };
    let (nan, inf) = topic_mean.count_non_finite();
    if nan + inf > 0 {
        ret.discarded.push(("topic_mean", nan, inf));
    } else {
        model.set_topic_mean(topic_mean);
    }
    verify_step(&mut tracker, "topic mean", iteration, data, model, query);

    let varcs_tot = query.varcs().row_sum_tr();
    let topic_mean = model.topic_mean();

    let sig_t = match model.prior().niw {
        Some(NiwPrior { kappa, nu, psi }) => {
            let mut sig_t = scatter(&targets, topic_mean)
                + DMatrix::from_diagonal(&varcs_tot)
                + topic_mean * topic_mean.transpose() * kappa;
            for i in 0..k {
                sig_t[(i, i)] += psi;
            }
            sig_t / (ndocs + nu + k as f64 + 2.0)
        }
        None => {
            let sig_t = match model.prior().covariance {
                CovEstimator::Sample => scatter(&targets, topic_mean) / ndocs,
                CovEstimator::Oas => {
                    let (sig_t, shrinkage) = oas_covariance(&targets);
                    debug!("OAS shrinkage {:.4}", shrinkage);
                    sig_t
                }
            };
            sig_t + DMatrix::from_diagonal(&(varcs_tot / ndocs))
        }
    };

    let (nan, inf) = sig_t.count_non_finite();
    if nan + inf > 0 {
        ret.discarded.push(("sig_t", nan, inf));
    } else {
        ret.ridge = ret.ridge.max(model.set_covariance(sig_t, diagonal)?);
    }
    verify_step(&mut tracker, "topic covariance", iteration, data, model, query);

    if model.side().is_some() {
        update_side(model, "side factors", &mut ret, update_factors)?;
        verify_step(&mut tracker, "side factors", iteration, data, model, query);
    }

    Ok(ret)
}

///
/// Run `update` on a copy of the side parameters and keep the result
/// only if it is finite; a non-finite system counts as a discarded
/// update, any other solver failure is an error
///
fn update_side(
    model: &mut ModelState,
    name: &'static str,
    ret: &mut PriorUpdate,
    update: impl FnOnce(&mut SideParams) -> std::result::Result<f64, LinalgError>,
) -> Result<()> {
    let Some(mut side) = model.side().cloned() else {
        return Ok(());
    };
    match update(&mut side) {
        Ok(ridge) => {
            let (nan, inf) = side.count_non_finite();
            if nan + inf > 0 {
                ret.discarded.push((name, nan, inf));
            } else {
                ret.ridge = ret.ridge.max(ridge);
                model.set_side(side);
            }
        }
        Err(LinalgError::NonFinite) => {
            let (nan, inf) = side.count_non_finite();
            ret.discarded.push((name, nan, inf));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// `X[i,] - mu'`
fn centre_rows(xx: &DMatrix<f64>, mu: &DVector<f64>) -> DMatrix<f64> {
    let mut ret = xx.clone();
    for mut row in ret.row_iter_mut() {
        row -= mu.transpose();
    }
    ret
}

///
/// Ridge regression of the centred means on the side matrix, shrunk
/// towards `U Y V'`
///
/// Rotating into the eigenbasis of `sig_t` decouples the topics, so
/// each rotated column of `A` solves its own F x F system
/// `(X'X + lambda_k / feat_var I) a_k = X'y_k + lambda_k / feat_var b_k`.
///
fn update_loadings(
    side: &mut SideParams,
    xx: &CsrMatrix<f64>,
    centred: &DMatrix<f64>,
    sig_t: &DMatrix<f64>,
) -> std::result::Result<f64, LinalgError> {
    let eig = sig_t.clone().symmetric_eigen();
    let rot = &eig.eigenvectors;
    let nside = side.num_side();

    let xtx = sparse_gram(xx);
    let xty = sparse_transpose_dot(xx, &(centred * rot));
    let target = side.low_rank() * rot;

    let mut ridge = 0.0_f64;
    let mut a_rot = DMatrix::<f64>::zeros(nside, rot.ncols());
    for (k, &lambda) in eig.eigenvalues.iter().enumerate() {
        let c = lambda.max(f64::EPSILON) / side.config.feat_var;
        let mut gg = xtx.clone();
        for i in 0..nside {
            gg[(i, i)] += c;
        }
        let rhs = xty.column(k) + target.column(k) * c;
        let sol = ridge_spd_solve(&gg, &rhs)?;
        ridge = ridge.max(sol.ridge);
        a_rot.set_column(k, &sol.value);
    }

    side.a = a_rot * rot.transpose();
    Ok(ridge)
}

/// Ridge least squares for `U`, `V` and then `Y` in `A ~ U Y V'`
fn update_factors(side: &mut SideParams) -> std::result::Result<f64, LinalgError> {
    let cfg = &side.config;
    let (p, q) = (cfg.latent_features, cfg.latent_topics);
    let fv = cfg.feat_var;
    let mut ridge = 0.0_f64;

    let with_diag = |mut xx: DMatrix<f64>, c: f64| {
        for i in 0..xx.nrows() {
            xx[(i, i)] += c;
        }
        xx
    };

    // U = A G' inv(G G' + fv/lfv I), G = Y V'
    let gg = &side.y * side.v.transpose();
    let inv = ridge_spd_inverse(&with_diag(&gg * gg.transpose(), fv / cfg.lat_feat_var))?;
    ridge = ridge.max(inv.ridge);
    side.u = &side.a * gg.transpose() * inv.value;

    // V = A' H inv(H'H + fv/tv I), H = U Y
    let hh = &side.u * &side.y;
    let inv = ridge_spd_inverse(&with_diag(hh.transpose() * &hh, fv / cfg.topic_var))?;
    ridge = ridge.max(inv.ridge);
    side.v = side.a.transpose() * &hh * inv.value;

    // (V'V kron U'U + fv/ltv I) vec(Y) = vec(U' A V)
    let kk = (side.v.transpose() * &side.v).kronecker(&(side.u.transpose() * &side.u));
    let rhs = side.u.transpose() * &side.a * &side.v;
    let sol = ridge_spd_solve(
        &with_diag(kk, fv / cfg.lat_topic_var),
        &DVector::from_column_slice(rhs.as_slice()),
    )?;
    ridge = ridge.max(sol.ridge);
    side.y = DMatrix::from_column_slice(p, q, sol.value.as_slice());

    Ok(ridge)
}

/// `ln N(vec(X) | vec(M), var I)`
fn gaussian_log_prior(xx: &DMatrix<f64>, mean: Option<&DMatrix<f64>>, var: f64) -> f64 {
    let n = xx.len() as f64;
    let sq = match mean {
        Some(mm) => (xx - mm).norm_squared(),
        None => xx.norm_squared(),
    };
    -0.5 * n * (2.0 * PI * var).ln() - 0.5 * sq / var
}

/// Log prior of `A`, `U`, `Y`, `V`
pub(crate) fn side_log_prior(side: &SideParams) -> f64 {
    let cfg = &side.config;
    gaussian_log_prior(&side.a, Some(&side.low_rank()), cfg.feat_var)
        + gaussian_log_prior(&side.u, None, cfg.lat_feat_var)
        + gaussian_log_prior(&side.y, None, cfg.lat_topic_var)
        + gaussian_log_prior(&side.v, None, cfg.topic_var)
}

///
/// `ln IW(sig_t | psi I, nu) + ln N(topic_mean | 0, sig_t / kappa)`
///
pub(crate) fn niw_log_prior(niw: &NiwPrior, model: &ModelState) -> f64 {
    let k = model.num_topics() as f64;
    let NiwPrior { kappa, nu, psi } = *niw;
    let log_det = model.log_det_sig_t();
    let isig_t = model.isig_t();
    let mu = model.topic_mean();

    let inv_wishart = 0.5 * nu * k * psi.ln()
        - 0.5 * nu * k * 2.0_f64.ln()
        - ln_multi_gamma(model.num_topics(), 0.5 * nu)
        - 0.5 * (nu + k + 1.0) * log_det
        - 0.5 * psi * isig_t.trace();

    let quad = (mu.transpose() * isig_t * mu)[(0, 0)];
    let normal =
        -0.5 * k * (2.0 * PI).ln() + 0.5 * k * kappa.ln() - 0.5 * log_det - 0.5 * kappa * quad;

    inv_wishart + normal
}
