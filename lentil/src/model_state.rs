use crate::config::*;
use crate::dataset::Dataset;
use crate::error::{check_dim, Result, TopicModelError};
use log::info;
use matrix_util::dmatrix_linalg::{ridge_spd_inverse, spd_log_det, LinalgError};
use matrix_util::sparse_util::sparse_dot_dense;
use matrix_util::traits::{FiniteOps, RowOps, SampleOps};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

/// Low-rank side-information parameters: `A` (F x K) with prior
/// mean `U Y V'`, `U` (F x P), `Y` (P x Q), `V` (K x Q)
#[derive(Debug, Clone)]
pub struct SideParams {
    pub config: SideInfoConfig,
    pub a: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub y: DMatrix<f64>,
    pub v: DMatrix<f64>,
}

impl SideParams {
    fn new_at_random<R: Rng + ?Sized>(
        config: &SideInfoConfig,
        num_side: usize,
        num_topics: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let (p, q) = (config.latent_features, config.latent_topics);
        if p == 0 || q == 0 {
            return Err(TopicModelError::InvalidInput(format!(
                "latent ranks must be positive, got P={} Q={}",
                p, q
            )));
        }
        let vars = [
            config.topic_var,
            config.feat_var,
            config.lat_topic_var,
            config.lat_feat_var,
        ];
        if vars.iter().any(|&x| !(x > 0.0 && x.is_finite())) {
            return Err(TopicModelError::InvalidInput(format!(
                "side-information variances must be positive: {:?}",
                vars
            )));
        }

        Ok(SideParams {
            config: config.clone(),
            a: DMatrix::zeros(num_side, num_topics),
            u: DMatrix::<f64>::rnorm(num_side, p, rng) * 0.1,
            y: DMatrix::<f64>::rnorm(p, q, rng) * 0.1,
            v: DMatrix::<f64>::rnorm(num_topics, q, rng) * 0.1,
        })
    }

    pub fn num_side(&self) -> usize {
        self.a.nrows()
    }

    /// `U Y V'`
    pub fn low_rank(&self) -> DMatrix<f64> {
        &self.u * &self.y * self.v.transpose()
    }

    /// NaN and Inf counts over `A`, `U`, `Y` and `V`
    pub fn count_non_finite(&self) -> (usize, usize) {
        [&self.a, &self.u, &self.y, &self.v]
            .iter()
            .map(|m| m.count_non_finite())
            .fold((0, 0), |(nan, inf), (n, i)| (nan + n, inf + i))
    }
}

/// Corpus-level parameters
///
/// `sig_t` stays symmetric positive definite with its inverse and log
/// determinant cached; `vocab` rows sum to one and are strictly
/// positive.
#[derive(Debug, Clone)]
pub struct ModelState {
    k: usize,
    topic_mean: DVector<f64>,
    sig_t: DMatrix<f64>,
    isig_t: DMatrix<f64>,
    log_det_sig_t: f64,
    diagonal: bool,
    vocab: DMatrix<f64>,
    vocab_prior: f64,
    bound: BoundKind,
    prior: PriorConfig,
    side: Option<SideParams>,
}

impl ModelState {
    ///
    /// Initialise a model from a corpus
    ///
    /// Each topic's word counts start at one and absorb randomly
    /// drawn documents until at least `seed_words` tokens are in;
    /// topic 0 is the corpus term frequency if `background_topic`.
    ///
    pub fn new_at_random<R: Rng + ?Sized>(
        data: &Dataset,
        config: &ModelConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.num_topics;
        let nterms = data.term_count();

        if k < 2 {
            return Err(TopicModelError::InvalidInput(format!(
                "need at least 2 topics, got {}",
                k
            )));
        }

        if !(config.vocab_prior > 0.0 && config.vocab_prior.is_finite()) {
            return Err(TopicModelError::InvalidInput(format!(
                "vocab prior must be positive, got {}",
                config.vocab_prior
            )));
        }

        if config.side_info.is_some() && config.prior.recenter_means {
            return Err(TopicModelError::InvalidInput(
                "re-centring means is not identifiable with a side-information prior".into(),
            ));
        }

        let side = match &config.side_info {
            Some(side_config) => {
                let xx = data.side_matrix(side_config.source).ok_or_else(|| {
                    TopicModelError::InvalidInput(format!(
                        "side information from {:?} but the corpus has none",
                        side_config.source
                    ))
                })?;
                Some(SideParams::new_at_random(side_config, xx.ncols(), k, rng)?)
            }
            None => None,
        };

        let words = data.words();
        let mut vocab = DMatrix::<f64>::from_element(k, nterms, 1.0);
        let first = if config.background_topic {
            for (t, &x) in data.term_totals().iter().enumerate() {
                vocab[(0, t)] += x;
            }
            1
        } else {
            0
        };

        let seed_words = config.seed_words as f64;
        for topic in first..k {
            let mut added = 0.0;
            while added < seed_words {
                let d = rng.random_range(0..data.doc_count());
                let row = words.row(d);
                for (&t, &x) in row.col_indices().iter().zip(row.values().iter()) {
                    vocab[(topic, t)] += x;
                }
                added += data.doc_lens()[d];
            }
        }
        vocab.normalize_rows_inplace();

        let mut topic_mean = DVector::from_fn(k, |_, _| rng.random::<f64>());
        topic_mean /= topic_mean.sum();

        info!(
            "initialised {} topics over {} terms ({:?})",
            k, nterms, config.bound
        );

        Ok(ModelState {
            k,
            topic_mean,
            sig_t: DMatrix::identity(k, k),
            isig_t: DMatrix::identity(k, k),
            log_det_sig_t: 0.0,
            diagonal: false,
            vocab,
            vocab_prior: config.vocab_prior,
            bound: config.bound,
            prior: config.prior.clone(),
            side,
        })
    }

    pub fn num_topics(&self) -> usize {
        self.k
    }

    pub fn num_terms(&self) -> usize {
        self.vocab.ncols()
    }

    pub fn topic_mean(&self) -> &DVector<f64> {
        &self.topic_mean
    }

    pub fn sig_t(&self) -> &DMatrix<f64> {
        &self.sig_t
    }

    pub fn isig_t(&self) -> &DMatrix<f64> {
        &self.isig_t
    }

    pub fn log_det_sig_t(&self) -> f64 {
        self.log_det_sig_t
    }

    /// whether `sig_t` was last set in diagonal-only mode
    pub fn is_diagonal(&self) -> bool {
        self.diagonal
    }

    /// K x T, rows sum to one
    pub fn vocab(&self) -> &DMatrix<f64> {
        &self.vocab
    }

    pub fn vocab_prior(&self) -> f64 {
        self.vocab_prior
    }

    pub fn bound_kind(&self) -> BoundKind {
        self.bound
    }

    pub fn prior(&self) -> &PriorConfig {
        &self.prior
    }

    pub fn side(&self) -> Option<&SideParams> {
        self.side.as_ref()
    }

    pub(crate) fn set_side(&mut self, side: SideParams) {
        debug_assert_eq!(side.a.ncols(), self.k);
        self.side = Some(side);
    }

    pub(crate) fn set_topic_mean(&mut self, topic_mean: DVector<f64>) {
        debug_assert_eq!(topic_mean.len(), self.k);
        self.topic_mean = topic_mean;
    }

    /// Replace the word distributions; rows are normalised here
    pub(crate) fn set_vocab(&mut self, mut vocab: DMatrix<f64>) {
        debug_assert_eq!(vocab.shape(), self.vocab.shape());
        vocab.normalize_rows_inplace();
        self.vocab = vocab;
    }

    ///
    /// Replace the topic covariance and refresh its cached inverse
    /// and log determinant
    ///
    /// * `diagonal` - keep only the diagonal; the inverse is then the
    ///   element-wise reciprocal
    ///
    /// Returns the ridge that had to be added to the diagonal. The
    /// state is untouched on error.
    ///
    pub(crate) fn set_covariance(
        &mut self,
        sig_t: DMatrix<f64>,
        diagonal: bool,
    ) -> std::result::Result<f64, LinalgError> {
        let k = self.k;
        if sig_t.shape() != (k, k) {
            return Err(LinalgError::NotSquare(sig_t.nrows(), sig_t.ncols()));
        }
        if sig_t.iter().any(|x| !x.is_finite()) {
            return Err(LinalgError::NonFinite);
        }

        if diagonal {
            let mut ridge = 0.0;
            let mut dd = sig_t.diagonal();
            let smallest = dd.iter().copied().fold(f64::INFINITY, f64::min);
            if smallest <= 0.0 {
                ridge = 1e-8 - smallest;
                dd.add_scalar_mut(ridge);
            }
            self.sig_t = DMatrix::from_diagonal(&dd);
            self.isig_t = DMatrix::from_diagonal(&dd.map(|x| 1.0 / x));
            self.log_det_sig_t = dd.iter().map(|x| x.ln()).sum();
            self.diagonal = true;
            return Ok(ridge);
        }

        let mut sig_t = (&sig_t + sig_t.transpose()) * 0.5;
        let inv = ridge_spd_inverse(&sig_t)?;
        for i in 0..k {
            sig_t[(i, i)] += inv.ridge;
        }
        let log_det = spd_log_det(&sig_t)?;

        self.sig_t = sig_t;
        self.isig_t = (&inv.value + inv.value.transpose()) * 0.5;
        self.log_det_sig_t = log_det;
        self.diagonal = false;
        Ok(inv.ridge)
    }

    /// Fail unless the corpus has this model's vocabulary and side
    /// matrix widths
    pub fn check_dataset(&self, data: &Dataset) -> Result<()> {
        check_dim("terms", self.num_terms(), data.term_count())?;
        if let Some(side) = &self.side {
            let xx = data.side_matrix(side.config.source).ok_or_else(|| {
                TopicModelError::InvalidInput(format!(
                    "model uses side information from {:?} but the corpus has none",
                    side.config.source
                ))
            })?;
            check_dim("side information", side.num_side(), xx.ncols())?;
        }
        Ok(())
    }

    /// Per-document prior means, D x K: `topic_mean' + X A`
    pub fn prior_means(&self, data: &Dataset) -> Result<DMatrix<f64>> {
        self.check_dataset(data)?;
        let ndocs = data.doc_count();
        let mut ret = match &self.side {
            Some(side) => match data.side_matrix(side.config.source) {
                Some(xx) => sparse_dot_dense(xx, &side.a),
                None => DMatrix::zeros(ndocs, self.k),
            },
            None => DMatrix::zeros(ndocs, self.k),
        };
        for mut row in ret.row_iter_mut() {
            row += self.topic_mean.transpose();
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_corpus() -> Dataset {
        let words = DMatrix::from_row_slice(
            3,
            4,
            &[3.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 5.0, 1.0, 1.0, 1.0, 1.0],
        );
        Dataset::from_dense(&words).unwrap()
    }

    #[test]
    fn random_model_invariants() -> Result<()> {
        let data = toy_corpus();
        let mut rng = StdRng::seed_from_u64(1);
        let config = ModelConfig {
            background_topic: true,
            seed_words: 10,
            ..ModelConfig::new(3)
        };
        let model = ModelState::new_at_random(&data, &config, &mut rng)?;

        assert_eq!(model.vocab().shape(), (3, 4));
        for row in model.vocab().row_iter() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|&x| x > 0.0));
        }
        assert_abs_diff_eq!(model.topic_mean().sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.log_det_sig_t(), 0.0);
        Ok(())
    }

    #[test]
    fn too_few_topics() {
        let data = toy_corpus();
        let mut rng = StdRng::seed_from_u64(1);
        let ret = ModelState::new_at_random(&data, &ModelConfig::new(1), &mut rng);
        assert!(matches!(ret, Err(TopicModelError::InvalidInput(_))));
    }

    #[test]
    fn side_info_needs_side_matrix() {
        let data = toy_corpus();
        let mut rng = StdRng::seed_from_u64(1);
        let config = ModelConfig {
            side_info: Some(SideInfoConfig::new(SideSource::Features, 2, 2)),
            ..ModelConfig::new(3)
        };
        assert!(ModelState::new_at_random(&data, &config, &mut rng).is_err());
    }

    #[test]
    fn covariance_cache() -> Result<()> {
        let data = toy_corpus();
        let mut rng = StdRng::seed_from_u64(2);
        let mut model = ModelState::new_at_random(&data, &ModelConfig::new(2), &mut rng)?;

        let sig = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let ridge = model.set_covariance(sig.clone(), false)?;
        assert_eq!(ridge, 0.0);
        assert_abs_diff_eq!(model.sig_t() * model.isig_t(), DMatrix::identity(2, 2), epsilon = 1e-12);
        assert_abs_diff_eq!(model.log_det_sig_t(), 1.75_f64.ln(), epsilon = 1e-12);

        model.set_covariance(sig, true)?;
        assert!(model.is_diagonal());
        assert_eq!(model.isig_t()[(0, 1)], 0.0);
        assert_abs_diff_eq!(model.isig_t()[(0, 0)], 0.5);

        let singular = DMatrix::from_element(2, 2, 1.0);
        assert!(model.set_covariance(singular, false)? > 0.0);

        let before = model.sig_t().clone();
        let nan = DMatrix::from_element(2, 2, f64::NAN);
        assert!(model.set_covariance(nan, false).is_err());
        assert_eq!(model.sig_t(), &before);
        Ok(())
    }
}
