use crate::bound::{BohningBound, BouchardBound, SoftmaxBound};

/// Which upper bound on `ln sum_k exp(eta_k)` the E-step linearises
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundKind {
    /// product of sigmoids with per-document slack `lxi` and offset
    /// `s`; `update_offset = false` keeps `s` at zero
    Bouchard { update_offset: bool },
    /// fixed-curvature quadratic bound, no per-document auxiliaries
    Bohning,
}

impl Default for BoundKind {
    fn default() -> Self {
        BoundKind::Bouchard {
            update_offset: false,
        }
    }
}

impl BoundKind {
    pub fn strategy(&self) -> Box<dyn SoftmaxBound> {
        match *self {
            BoundKind::Bouchard { update_offset } => Box::new(BouchardBound { update_offset }),
            BoundKind::Bohning => Box::new(BohningBound),
        }
    }
}

/// Estimator of the topic covariance from the document means
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CovEstimator {
    /// maximum likelihood scatter / D
    #[default]
    Sample,
    /// Oracle Approximating Shrinkage towards a scaled identity,
    /// positive definite even when D < K
    Oas,
}

/// Normal-Inverse-Wishart prior on `(topic_mean, sig_t)` with prior
/// mean zero and scale `psi * I`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiwPrior {
    pub kappa: f64,
    pub nu: f64,
    pub psi: f64,
}

impl NiwPrior {
    /// `kappa = nu = K + 2`, `psi = 0.1`
    pub fn for_topics(num_topics: usize) -> Self {
        NiwPrior {
            kappa: num_topics as f64 + 2.0,
            nu: num_topics as f64 + 2.0,
            psi: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriorConfig {
    pub covariance: CovEstimator,
    pub niw: Option<NiwPrior>,
    /// subtract the first topic's mean from every document after
    /// each mean update
    pub recenter_means: bool,
}

/// Side matrix that informs the per-document prior mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SideSource {
    Features,
    Links,
}

/// Low-rank side-information prior: `mu_d = topic_mean + A' x_d`
/// with `A` shrunk towards `U Y V'`
#[derive(Debug, Clone, PartialEq)]
pub struct SideInfoConfig {
    pub source: SideSource,
    /// columns of `U` (P)
    pub latent_features: usize,
    /// columns of `V` (Q)
    pub latent_topics: usize,
    /// prior variance of `V`
    pub topic_var: f64,
    /// prior variance of `A` around `U Y V'`
    pub feat_var: f64,
    /// prior variance of `Y`
    pub lat_topic_var: f64,
    /// prior variance of `U`
    pub lat_feat_var: f64,
}

impl SideInfoConfig {
    pub fn new(source: SideSource, latent_features: usize, latent_topics: usize) -> Self {
        SideInfoConfig {
            source,
            latent_features,
            latent_topics,
            topic_var: 1.0,
            feat_var: 1.0,
            lat_topic_var: 1.0,
            lat_feat_var: 1.0,
        }
    }
}

/// Everything needed to build a model at random
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub num_topics: usize,
    pub bound: BoundKind,
    /// Dirichlet pseudo-count added to every topic-term count
    pub vocab_prior: f64,
    pub prior: PriorConfig,
    pub side_info: Option<SideInfoConfig>,
    /// topic 0 starts at the corpus term frequencies
    pub background_topic: bool,
    /// minimum number of tokens drawn into each topic's initial counts
    pub seed_words: usize,
}

impl ModelConfig {
    pub fn new(num_topics: usize) -> Self {
        ModelConfig {
            num_topics,
            ..Default::default()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            num_topics: 10,
            bound: BoundKind::default(),
            vocab_prior: 1.1,
            prior: PriorConfig::default(),
            side_info: None,
            background_topic: false,
            seed_words: 1000,
        }
    }
}
