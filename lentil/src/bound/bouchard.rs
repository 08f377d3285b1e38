use super::*;
use matrix_util::dmatrix_util::{ln_one_plus_exp, sigmoid};

/// Bouchard's product-of-sigmoids bound
///
/// ```text
/// ln sum_k exp(x_k) <= s + sum_k ln(1 + exp(x_k - s))
/// ln(1 + exp(y)) <= (y - xi)/2 + lambda(xi) (y^2 - xi^2) + ln(1 + exp(xi))
/// ```
///
/// with `lambda(xi) = neg_jakkola(xi)` and the stored auxiliary
/// `lxi = 2 lambda(xi)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BouchardBound {
    /// re-estimate the offset `s`; otherwise it stays where it is
    pub update_offset: bool,
}

/// `0.5 / x * (sigmoid(x) - 0.5)`, `1/8` at zero
#[inline]
pub fn neg_jakkola(x: f64) -> f64 {
    if x.abs() < 1e-8 {
        0.125
    } else {
        0.5 / x * (sigmoid(x) - 0.5)
    }
}

/// optimal slack `xi = sqrt((m - s)^2 + v)`
#[inline]
fn derived_xi(m: f64, v: f64, s: f64) -> f64 {
    ((m - s) * (m - s) + v).sqrt()
}

impl BouchardBound {
    fn set_lxi(local: &mut LocalState) {
        let s = local.s;
        local.lxi = local
            .means
            .iter()
            .zip(local.varcs.iter())
            .map(|(&m, &v)| 2.0 * neg_jakkola(derived_xi(m, v, s)))
            .collect();
    }
}

impl SoftmaxBound for BouchardBound {
    fn aux_width(&self, k: usize) -> usize {
        k
    }

    fn compute_bound_auxiliaries(&self, local: &mut LocalState) {
        Self::set_lxi(local);

        if self.update_offset {
            let k = local.means.len() as f64;
            let lxi_sum: f64 = local.lxi.iter().sum();
            let lxi_m: f64 = local
                .lxi
                .iter()
                .zip(local.means.iter())
                .map(|(l, m)| l * m)
                .sum();
            local.s = (lxi_m + 0.5 * k - 1.0) / lxi_sum;
            // slack at the new offset
            Self::set_lxi(local);
        }
    }

    fn update_varcs(&self, doc: &LocalDoc, ctx: &LocalContext, local: &mut LocalState) {
        let n = doc.doc_len;
        local.varcs = (0..local.means.len())
            .map(|i| 1.0 / (n * local.lxi[i] + ctx.isig_t[(i, i)]))
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
        let s = local.s;

        let rhs: Vec<f64> = (0..k)
            .map(|i| {
                (s * local.lxi[i] - 0.5) * n + doc.expected_counts[i] + doc.prior_precision_mean[i]
            })
            .collect();

        if ctx.diagonal {
            local.means = rhs
                .iter()
                .enumerate()
                .map(|(i, r)| r / (n * local.lxi[i] + ctx.isig_t[(i, i)]))
                .collect();
            return SolveOutcome::Exact;
        }

        let mut pp = ctx.isig_t.clone();
        for i in 0..k {
            pp[(i, i)] += n * local.lxi[i];
        }
        let (means, outcome) = solve_or_diagonal(pp, rhs);
        local.means = means;
        outcome
    }

    fn expected_log_normalizer(&self, means: &[f64], varcs: &[f64], s: f64) -> f64 {
        let mut ret = s;
        for (&m, &v) in means.iter().zip(varcs.iter()) {
            let xi = derived_xi(m, v, s);
            let lambda = neg_jakkola(xi);
            ret += 0.5 * (m - s - xi)
                + lambda * ((m - s) * (m - s) + v - xi * xi)
                + ln_one_plus_exp(xi);
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_util::dmatrix_util::log_sum_exp;

    #[test]
    fn neg_jakkola_limit() {
        assert_abs_diff_eq!(neg_jakkola(0.0), 0.125);
        assert_abs_diff_eq!(neg_jakkola(1e-5), 0.125, epsilon = 1e-9);
        assert_abs_diff_eq!(neg_jakkola(2.0), neg_jakkola(-2.0), epsilon = 1e-15);
        assert!(neg_jakkola(5.0) < 0.125);
    }

    #[test]
    fn bounds_log_sum_exp_from_above() {
        let bound = BouchardBound::default();
        let means = [0.3, -1.2, 2.0, 0.0];
        let tiny = [1e-12; 4];
        for s in [-1.0, 0.0, 0.7] {
            let lse = log_sum_exp(&means);
            assert!(bound.expected_log_normalizer(&means, &tiny, s) >= lse - 1e-9);
        }
    }

    #[test]
    fn offset_update_tightens() {
        let means = vec![0.5, 1.5, -0.5];
        let varcs = vec![0.2, 0.1, 0.3];
        let mut local = LocalState {
            means: means.clone(),
            varcs: varcs.clone(),
            lxi: vec![],
            s: 0.0,
        };
        let fixed = BouchardBound::default();
        let before = fixed.expected_log_normalizer(&means, &varcs, local.s);

        BouchardBound {
            update_offset: true,
        }
        .compute_bound_auxiliaries(&mut local);
        let after = fixed.expected_log_normalizer(&means, &varcs, local.s);
        assert!(after <= before + 1e-12);
        assert_eq!(local.lxi.len(), 3);
    }

    #[test]
    fn full_and_diagonal_agree_for_diagonal_prior() {
        let isig_t = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![2.0, 0.5, 1.0]));
        let doc = LocalDoc {
            doc_len: 12.0,
            expected_counts: &[5.0, 4.0, 3.0],
            prior_precision_mean: &[0.1, -0.2, 0.0],
        };
        let init = LocalState {
            means: vec![0.1, 0.2, 0.3],
            varcs: vec![1.0; 3],
            lxi: vec![0.2, 0.1, 0.15],
            s: 0.0,
        };
        let bound = BouchardBound::default();

        let mut full = init.clone();
        let outcome = bound.solve_local_update(
            &doc,
            &LocalContext {
                isig_t: &isig_t,
                diagonal: false,
            },
            &mut full,
        );
        assert_eq!(outcome, SolveOutcome::Exact);

        let mut diag = init;
        bound.solve_local_update(
            &doc,
            &LocalContext {
                isig_t: &isig_t,
                diagonal: true,
            },
            &mut diag,
        );

        for k in 0..3 {
            assert_abs_diff_eq!(full.means[k], diag.means[k], epsilon = 1e-10);
            assert!(full.varcs[k] > 0.0);
        }
    }
}
