//! Correlated topic models fitted by variational coordinate ascent.
//!
//! Document topic weights follow a logistic-normal prior with a
//! learned mean and covariance, optionally tied to document features
//! or links through a low-rank regression. The intractable
//! `ln sum_k exp(eta_k)` is replaced by either Bouchard's
//! product-of-sigmoids bound or Bohning's quadratic bound.
//!
//! ```ignore
//! let mut rng = StdRng::seed_from_u64(1);
//! let model = ModelState::new_at_random(&data, &ModelConfig::new(10), &mut rng)?;
//! let state = QueryState::new(&data, &model, &mut rng)?;
//! let fit = train(&data, model, state, &TrainPlan::default())?;
//! ```

/// Softmax bounds and the per-document E-step they induce
pub mod bound;

/// Model construction options
pub mod config;

/// Sparse document-term corpus with optional side matrices
pub mod dataset;

pub mod error;

/// Training loop
pub mod inference;

/// Corpus-level parameters
pub mod model_state;

/// Training and query configuration
pub mod plan;

/// Held-out inference with a fixed model
pub mod query;

/// Per-document parameters
pub mod query_state;

/// Synthetic corpora from a known model
pub mod simulate;

/// Checkpoint history and anomalies
pub mod trace;

/// Variational bound, log-likelihood and perplexity
pub mod var_bound;

mod diagnostics;
mod prior;


pub use config::*;
pub use dataset::Dataset;
pub use error::TopicModelError;
pub use inference::{train, TrainOutput};
pub use model_state::ModelState;
pub use plan::{AnomalyPolicy, QueryPlan, TrainPlan};
pub use query::{query, QueryOutput};
pub use query_state::QueryState;
pub use trace::{Anomaly, BoundTrace, StopReason};
pub use var_bound::{bound_terms, log_likelihood, perplexity, var_bound, BoundTerms};
