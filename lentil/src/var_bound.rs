//! Variational lower bound on the marginal log-likelihood and the
//! plug-in log-likelihood of the observed words.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::model_state::ModelState;
use crate::prior::{niw_log_prior, side_log_prior};
use crate::query_state::QueryState;
use matrix_util::dmatrix_util::safe_ln;
use matrix_util::sparse_util::sum_of_sparse_scalar_product_of_safe_ln_dot;
use matrix_util::traits::RowOps;
use rayon::prelude::*;
use std::f64::consts::PI;

/// The bound, term by term, so that a non-finite total can be traced
/// back to its source
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundTerms {
    /// `E[ln N(eta_d | mu_d, sig_t)]` summed over documents
    pub topic_prior: f64,
    /// entropy of `N(means_d, diag(varcs_d))`
    pub entropy: f64,
    /// `-n_d E[ln sum_k exp(eta_dk)]`, linearised by the bound
    pub normalizer: f64,
    /// `sum_dt w_dt ln sum_k exp(means_dk) vocab_kt`
    pub words: f64,
    /// Dirichlet pseudo-counts on the vocabulary
    pub vocab_prior: f64,
    /// Normal-Inverse-Wishart prior on `(topic_mean, sig_t)`
    pub niw_prior: f64,
    /// Gaussian priors of the side-information parameters
    pub side_prior: f64,
}

impl BoundTerms {
    pub fn total(&self) -> f64 {
        self.topic_prior
            + self.entropy
            + self.normalizer
            + self.words
            + self.vocab_prior
            + self.niw_prior
            + self.side_prior
    }

    /// name of the first non-finite term
    pub fn first_non_finite(&self) -> Option<&'static str> {
        [
            ("topic_prior", self.topic_prior),
            ("entropy", self.entropy),
            ("normalizer", self.normalizer),
            ("words", self.words),
            ("vocab_prior", self.vocab_prior),
            ("niw_prior", self.niw_prior),
            ("side_prior", self.side_prior),
        ]
        .into_iter()
        .find(|(_, x)| !x.is_finite())
        .map(|(name, _)| name)
    }
}

///
/// Evaluate every term of the bound; the states are only read
///
pub fn bound_terms(data: &Dataset, model: &ModelState, query: &QueryState) -> Result<BoundTerms> {
    query.check(data, model)?;

    let k = model.num_topics() as f64;
    let means = query.means();
    let varcs = query.varcs();
    let isig_t = model.isig_t();
    let doc_lens = query.doc_lens();

    // topic prior, quadratic form of the residual plus the variance trace
    let resid = means - model.prior_means(data)?;
    let quad = (&resid * isig_t).component_mul(&resid).sum();
    let trace: f64 = varcs
        .row_iter()
        .map(|v| v.iter().enumerate().map(|(i, x)| isig_t[(i, i)] * x).sum::<f64>())
        .sum();
    let ndocs = query.num_docs() as f64;
    let topic_prior = -0.5 * ndocs * (k * (2.0 * PI).ln() + model.log_det_sig_t())
        - 0.5 * quad
        - 0.5 * trace;

    let entropy =
        0.5 * ndocs * k * (1.0 + (2.0 * PI).ln()) + 0.5 * varcs.iter().map(|v| v.ln()).sum::<f64>();

    let strategy = model.bound_kind().strategy();
    let per_doc: Vec<f64> = (0..query.num_docs())
        .into_par_iter()
        .map(|d| {
            let m: Vec<f64> = means.row(d).iter().copied().collect();
            let v: Vec<f64> = varcs.row(d).iter().copied().collect();
            doc_lens[d] * strategy.expected_log_normalizer(&m, &v, query.offsets()[d])
        })
        .collect();
    let normalizer = -per_doc.iter().sum::<f64>();

    // shift each row by its max before exponentiating
    let row_max = means.max_each_row();
    let words = sum_of_sparse_scalar_product_of_safe_ln_dot(
        data.words(),
        &means.exp_shifted_rows(),
        model.vocab(),
    ) + doc_lens.dot(&row_max);

    let vocab_prior = model.vocab_prior() * model.vocab().iter().map(|&x| safe_ln(x)).sum::<f64>();

    let niw_prior = match &model.prior().niw {
        Some(niw) => niw_log_prior(niw, model),
        None => 0.0,
    };

    let side_prior = model.side().map(side_log_prior).unwrap_or(0.0);

    Ok(BoundTerms {
        topic_prior,
        entropy,
        normalizer,
        words,
        vocab_prior,
        niw_prior,
        side_prior,
    })
}

/// Variational lower bound on the marginal log-likelihood
pub fn var_bound(data: &Dataset, model: &ModelState, query: &QueryState) -> Result<f64> {
    Ok(bound_terms(data, model, query)?.total())
}

///
/// `sum_dt w_dt ln(softmax(means_d) . vocab[,t])` over the stored
/// entries of `words`
///
pub fn log_likelihood(data: &Dataset, model: &ModelState, query: &QueryState) -> Result<f64> {
    query.check(data, model)?;
    Ok(sum_of_sparse_scalar_product_of_safe_ln_dot(
        data.words(),
        &query.topic_dists(),
        model.vocab(),
    ))
}

/// `exp(-log_likelihood / word_count)`
pub fn perplexity(data: &Dataset, model: &ModelState, query: &QueryState) -> Result<f64> {
    Ok(perplexity_of(log_likelihood(data, model, query)?, data))
}

pub(crate) fn perplexity_of(log_likelihood: f64, data: &Dataset) -> f64 {
    (-log_likelihood / data.word_count()).exp()
}
