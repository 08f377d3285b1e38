use super::*;
use matrix_util::dmatrix_util::{log_sum_exp, softmax};

/// Bohning's quadratic bound, expanded around the previous means `psi`
///
/// ```text
/// ln sum_k exp(x_k) <= lse(psi) + g(psi)'(x - psi) + (x - psi)' A (x - psi) / 2
/// A = (I - 1 1' / (K + 1)) / 2
/// ```
///
/// The curvature `A` is shared by every document, so nothing is
/// stored per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct BohningBound;

/// diagonal entry of the curvature matrix
fn curvature_diag(k: usize) -> f64 {
    0.5 * (1.0 - 1.0 / (k as f64 + 1.0))
}

/// off-diagonal entry of the curvature matrix
fn curvature_off(k: usize) -> f64 {
    -0.5 / (k as f64 + 1.0)
}

impl SoftmaxBound for BohningBound {
    fn aux_width(&self, _k: usize) -> usize {
        0
    }

    fn compute_bound_auxiliaries(&self, local: &mut LocalState) {
        local.lxi.clear();
    }

    fn update_varcs(&self, doc: &LocalDoc, ctx: &LocalContext, local: &mut LocalState) {
        let k = local.means.len();
        let a_kk = curvature_diag(k);
        local.varcs = (0..k)
            .map(|i| 1.0 / (ctx.isig_t[(i, i)] + doc.doc_len * a_kk))
            .collect();
    }

    fn update_means(
        &self,
        doc: &LocalDoc,
        ctx: &LocalContext,
        local: &mut LocalState,
    ) -> SolveOutcome {
        let k = local.means.len();
        let n = doc.doc_len;
        let a_kk = curvature_diag(k);
        let a_kl = curvature_off(k);

        let psi = &local.means;
        let grad = softmax(psi);
        let psi_sum: f64 = psi.iter().sum();

        // n (A psi - g(psi)) + S + inv(sig_t) mu
        let rhs: Vec<f64> = (0..k)
            .map(|i| {
                let a_psi = 0.5 * psi[i] + a_kl * psi_sum;
                doc.expected_counts[i] + n * (a_psi - grad[i]) + doc.prior_precision_mean[i]
            })
            .collect();

        if ctx.diagonal {
            // diag(isig_t) + n A is a diagonal minus a rank one term
            let lambda: Vec<f64> = (0..k).map(|i| ctx.isig_t[(i, i)] + 0.5 * n).collect();
            let c = -n * a_kl;
            let inv_lambda_rhs: Vec<f64> = rhs.iter().zip(lambda.iter()).map(|(r, l)| r / l).collect();
            let denom = 1.0 - c * lambda.iter().map(|l| 1.0 / l).sum::<f64>();
            let proj = c * inv_lambda_rhs.iter().sum::<f64>() / denom;
            local.means = inv_lambda_rhs
                .iter()
                .zip(lambda.iter())
                .map(|(x, l)| x + proj / l)
                .collect();
            return SolveOutcome::Exact;
        }

        let mut pp = ctx.isig_t.clone();
        for i in 0..k {
            for j in 0..k {
                pp[(i, j)] += n * if i == j { a_kk } else { a_kl };
            }
        }
        let (means, outcome) = solve_or_diagonal(pp, rhs);
        local.means = means;
        outcome
    }

    fn expected_log_normalizer(&self, means: &[f64], varcs: &[f64], _s: f64) -> f64 {
        let a_kk = curvature_diag(means.len());
        log_sum_exp(means) + 0.5 * a_kk * varcs.iter().sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rank_one_update_matches_full_solve() {
        let isig_t = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.5, 0.7, 2.0, 1.0]));
        let doc = LocalDoc {
            doc_len: 30.0,
            expected_counts: &[10.0, 5.0, 12.0, 3.0],
            prior_precision_mean: &[0.2, 0.0, -0.1, 0.3],
        };
        let init = LocalState {
            means: vec![0.4, -0.3, 0.8, 0.0],
            varcs: vec![1.0; 4],
            lxi: vec![],
            s: 0.0,
        };

        let mut full = init.clone();
        let outcome = BohningBound.solve_local_update(
            &doc,
            &LocalContext {
                isig_t: &isig_t,
                diagonal: false,
            },
            &mut full,
        );
        assert_eq!(outcome, SolveOutcome::Exact);

        let mut fast = init;
        BohningBound.solve_local_update(
            &doc,
            &LocalContext {
                isig_t: &isig_t,
                diagonal: true,
            },
            &mut fast,
        );

        for k in 0..4 {
            assert_abs_diff_eq!(full.means[k], fast.means[k], epsilon = 1e-9);
            assert_abs_diff_eq!(full.varcs[k], fast.varcs[k]);
        }
    }

    #[test]
    fn curvature_dominates_softmax_hessian() {
        // A - (diag(p) - p p') is positive semi-definite for any p
        let k = 3;
        let p = softmax(&[2.0, -1.0, 0.5]);
        let mut hh = DMatrix::<f64>::zeros(k, k);
        for i in 0..k {
            for j in 0..k {
                let a = if i == j { curvature_diag(k) } else { curvature_off(k) };
                let h = if i == j { p[i] - p[i] * p[i] } else { -p[i] * p[j] };
                hh[(i, j)] = a - h;
            }
        }
        let eig = hh.symmetric_eigen();
        assert!(eig.eigenvalues.iter().all(|&x| x > -1e-12));
    }
}
