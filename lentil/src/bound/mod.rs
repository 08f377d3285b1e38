//! Upper bounds on the log-normaliser `ln sum_k exp(eta_k)` of the
//! logistic-normal topic proportions, and the per-document E-step
//! they induce.
//!
//! Each document's update is a pure function of its own row of the
//! local state, its expected topic counts and read-only model
//! statistics, so the engine can run documents in parallel.

mod bohning;
mod bouchard;

pub use bohning::BohningBound;
pub use bouchard::{neg_jakkola, BouchardBound};

use nalgebra::DMatrix;

/// One document's local variational parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LocalState {
    pub means: Vec<f64>,
    pub varcs: Vec<f64>,
    /// bound auxiliaries; empty when the bound needs none
    pub lxi: Vec<f64>,
    pub s: f64,
}

/// Per-document inputs fixed during one E-step
pub struct LocalDoc<'a> {
    pub doc_len: f64,
    /// `S[d,]`, expected number of words assigned to each topic
    pub expected_counts: &'a [f64],
    /// `inv(sig_t) * mu_d` for the document's prior mean `mu_d`
    pub prior_precision_mean: &'a [f64],
}

/// Model statistics shared by all documents in one E-step
pub struct LocalContext<'a> {
    pub isig_t: &'a DMatrix<f64>,
    /// element-wise updates using only the diagonal of `isig_t`
    pub diagonal: bool,
}

/// How the mean update's linear system was solved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    Exact,
    /// needed this ridge on the diagonal
    Ridge(f64),
    /// the system stayed singular; fell back to the element-wise update
    Diagonal,
}

pub trait SoftmaxBound: Send + Sync {
    /// number of auxiliaries per document for `k` topics
    fn aux_width(&self, k: usize) -> usize;

    /// Tighten the bound at the current means and variances
    fn compute_bound_auxiliaries(&self, local: &mut LocalState);

    /// Maximise over the variances, holding means and auxiliaries fixed
    fn update_varcs(&self, doc: &LocalDoc, ctx: &LocalContext, local: &mut LocalState);

    /// Maximise over the means, holding variances and auxiliaries fixed
    fn update_means(&self, doc: &LocalDoc, ctx: &LocalContext, local: &mut LocalState)
        -> SolveOutcome;

    /// Update variances, then means
    fn solve_local_update(
        &self,
        doc: &LocalDoc,
        ctx: &LocalContext,
        local: &mut LocalState,
    ) -> SolveOutcome {
        self.update_varcs(doc, ctx, local);
        self.update_means(doc, ctx, local)
    }

    /// Upper bound on `E[ln sum_k exp(eta_k)]` under
    /// `eta ~ N(means, diag(varcs))`, at the tightest auxiliaries
    fn expected_log_normalizer(&self, means: &[f64], varcs: &[f64], s: f64) -> f64;
}

/// Solve `P m = rhs`, falling back to `m = rhs / diag(P)`
pub(crate) fn solve_or_diagonal(pp: DMatrix<f64>, rhs: Vec<f64>) -> (Vec<f64>, SolveOutcome) {
    use matrix_util::dmatrix_linalg::ridge_spd_solve;
    let k = rhs.len();
    let bb = nalgebra::DVector::from_vec(rhs);
    match ridge_spd_solve(&pp, &bb) {
        Ok(reg) if reg.ridge > 0.0 => (reg.value.as_slice().to_vec(), SolveOutcome::Ridge(reg.ridge)),
        Ok(reg) => (reg.value.as_slice().to_vec(), SolveOutcome::Exact),
        Err(_) => (
            (0..k).map(|i| bb[i] / pp[(i, i)]).collect(),
            SolveOutcome::Diagonal,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn singular_system_gets_a_ridge() {
        let pp = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let (m, outcome) = solve_or_diagonal(pp, vec![1.0, 1.0]);
        match outcome {
            SolveOutcome::Ridge(r) => assert!(r > 0.0),
            other => panic!("expected a ridge, got {:?}", other),
        }
        assert!(m.iter().all(|x| x.is_finite()));
        // symmetric system, symmetric answer
        assert_abs_diff_eq!(m[0], m[1], epsilon = 1e-8);
    }

    #[test]
    fn non_finite_system_falls_back_to_diagonal() {
        let pp = DMatrix::from_row_slice(2, 2, &[2.0, f64::NAN, f64::NAN, 4.0]);
        let (m, outcome) = solve_or_diagonal(pp, vec![1.0, 2.0]);
        assert_eq!(outcome, SolveOutcome::Diagonal);
        assert_abs_diff_eq!(m[0], 0.5);
        assert_abs_diff_eq!(m[1], 0.5);
    }

    #[test]
    fn split_updates_match_fused_update() {
        let isig_t = DMatrix::from_row_slice(3, 3, &[2.0, 0.3, 0.0, 0.3, 1.0, 0.1, 0.0, 0.1, 1.5]);
        let doc = LocalDoc {
            doc_len: 20.0,
            expected_counts: &[8.0, 7.0, 5.0],
            prior_precision_mean: &[0.0, 0.1, -0.1],
        };
        let ctx = LocalContext {
            isig_t: &isig_t,
            diagonal: false,
        };
        let init = LocalState {
            means: vec![0.2, -0.1, 0.4],
            varcs: vec![1.0; 3],
            lxi: vec![0.2, 0.15, 0.1],
            s: 0.0,
        };
        let bound = BouchardBound::default();

        let mut fused = init.clone();
        bound.solve_local_update(&doc, &ctx, &mut fused);

        let mut split = init;
        bound.update_varcs(&doc, &ctx, &mut split);
        bound.update_means(&doc, &ctx, &mut split);

        assert_eq!(fused, split);
    }
}
