//! Coordinate ascent: an M-step on the corpus-level parameters
//! followed by an E-step on every document's local parameters.

use crate::bound::{LocalContext, LocalDoc, SolveOutcome};
use crate::dataset::Dataset;
use crate::diagnostics::{report_non_finite, verify_step, BoundTracker};
use crate::error::{Result, TopicModelError};
use crate::model_state::ModelState;
use crate::plan::{is_checkpoint, AnomalyPolicy, TrainPlan};
use crate::prior::update_topic_prior;
use crate::query_state::QueryState;
use crate::trace::{Anomaly, BoundTrace, StopReason};
use crate::var_bound::{bound_terms, log_likelihood, perplexity_of};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{info, warn};
use matrix_util::sparse_util::*;
use matrix_util::traits::RowOps;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;

/// Trained states and the checkpoint history
#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub model: ModelState,
    pub query: QueryState,
    pub trace: BoundTrace,
}

///
/// `S = E ⊙ (R V')` with `R = W ⊘ (E V)` at the stored entries of
/// `W`, where `E` holds the row-shifted `exp(means)`
///
pub(crate) fn expected_topic_counts(
    words: &CsrMatrix<f64>,
    exp_means: &DMatrix<f64>,
    vocab: &DMatrix<f64>,
) -> DMatrix<f64> {
    let rr = sparse_scalar_quotient_of_dot(words, exp_means, vocab);
    exp_means.component_mul(&sparse_dot_transpose(&rr, vocab))
}

///
/// Multiplicative update of the topic-word distributions followed by
/// the expected topic counts under the new vocabulary
///
fn update_vocab(data: &Dataset, model: &mut ModelState, query: &QueryState) -> DMatrix<f64> {
    let words = data.words();
    let exp_means = query.means().exp_shifted_rows();

    let rr = sparse_scalar_quotient_of_dot(words, &exp_means, model.vocab());
    let mut vocab = model.vocab().component_mul(&sparse_transpose_dot(&rr, &exp_means).transpose());
    vocab.add_scalar_mut(model.vocab_prior());
    model.set_vocab(vocab);

    expected_topic_counts(words, &exp_means, model.vocab())
}

/// Tally of per-document solves that needed help
#[derive(Debug, Default)]
pub(crate) struct EStepReport {
    pub ridged: usize,
    pub max_ridge: f64,
    pub diagonal_fallbacks: usize,
}

impl EStepReport {
    fn merge(&mut self, other: EStepReport) {
        self.ridged += other.ridged;
        self.max_ridge = self.max_ridge.max(other.max_ridge);
        self.diagonal_fallbacks += other.diagonal_fallbacks;
    }

    pub(crate) fn record(&self, iteration: usize, trace: &mut BoundTrace) {
        if self.ridged > 0 {
            warn!(
                "[{}] {} document solves were singular, max ridge {:.3e}",
                iteration, self.ridged, self.max_ridge
            );
            trace.anomalies.push(Anomaly::RidgeFallback {
                iteration,
                site: "document means",
                ridge: self.max_ridge,
                count: self.ridged,
            });
        }
        if self.diagonal_fallbacks > 0 {
            warn!(
                "[{}] {} document solves fell back to element-wise updates",
                iteration, self.diagonal_fallbacks
            );
            trace.anomalies.push(Anomaly::DiagonalFallback {
                iteration,
                site: "document means",
                count: self.diagonal_fallbacks,
            });
        }
    }
}

/// Which part of the per-document update a pass runs
#[derive(Debug, Clone, Copy, PartialEq)]
enum LocalStep {
    Variances,
    /// means, then re-centring if enabled
    Means,
    Auxiliaries,
    All,
}

/// One pass of `step` over every document, in parallel
fn local_pass(
    data: &Dataset,
    model: &ModelState,
    query: &mut QueryState,
    expected: &DMatrix<f64>,
    diagonal: bool,
    step: LocalStep,
) -> Result<EStepReport> {
    let strategy = model.bound_kind().strategy();
    let recenter = model.prior().recenter_means;
    let isig_t = model.isig_t();

    // inv(sig_t) mu_d for every document
    let prior_pm = model.prior_means(data)? * isig_t;

    let ctx = LocalContext { isig_t, diagonal };
    let doc_lens = data.doc_lens();
    let current: &QueryState = query;

    let updated: Vec<_> = (0..current.num_docs())
        .into_par_iter()
        .map(|d| {
            let counts: Vec<f64> = expected.row(d).iter().copied().collect();
            let pm: Vec<f64> = prior_pm.row(d).iter().copied().collect();
            let doc = LocalDoc {
                doc_len: doc_lens[d],
                expected_counts: &counts,
                prior_precision_mean: &pm,
            };

            let mut local = current.local_state(d);
            let mut outcome = SolveOutcome::Exact;
            if matches!(step, LocalStep::Variances | LocalStep::All) {
                strategy.update_varcs(&doc, &ctx, &mut local);
            }
            if matches!(step, LocalStep::Means | LocalStep::All) {
                outcome = strategy.update_means(&doc, &ctx, &mut local);
                if recenter {
                    let m0 = local.means[0];
                    local.means.iter_mut().for_each(|m| *m -= m0);
                }
            }
            if matches!(step, LocalStep::Auxiliaries | LocalStep::All) {
                strategy.compute_bound_auxiliaries(&mut local);
            }
            (local, outcome)
        })
        .collect();

    let mut report = EStepReport::default();
    for (d, (local, outcome)) in updated.iter().enumerate() {
        query.set_local_state(d, local);
        match *outcome {
            SolveOutcome::Exact => {}
            SolveOutcome::Ridge(r) => {
                report.ridged += 1;
                report.max_ridge = report.max_ridge.max(r);
            }
            SolveOutcome::Diagonal => report.diagonal_fallbacks += 1,
        }
    }
    Ok(report)
}

///
/// Update every document's variances, means and bound auxiliaries
///
/// * `expected` - D x K expected topic counts `S`
/// * `diagonal` - element-wise updates with the diagonal of `isig_t`
/// * `tracker` - when set, each of the three updates runs as its own
///   pass over the corpus and the bound is checked after each
///
pub(crate) fn e_step(
    data: &Dataset,
    model: &ModelState,
    query: &mut QueryState,
    expected: &DMatrix<f64>,
    diagonal: bool,
    iteration: usize,
    mut tracker: Option<&mut BoundTracker>,
) -> Result<EStepReport> {
    if tracker.is_none() {
        return local_pass(data, model, query, expected, diagonal, LocalStep::All);
    }

    let mut report = EStepReport::default();
    for (step, name) in [
        (LocalStep::Variances, "variances"),
        (LocalStep::Means, "means"),
        (LocalStep::Auxiliaries, "bound auxiliaries"),
    ] {
        report.merge(local_pass(data, model, query, expected, diagonal, step)?);
        verify_step(&mut tracker, name, iteration, data, model, query);
    }
    Ok(report)
}

/// Bound, log-likelihood and perplexity at a checkpoint
pub(crate) struct Checkpoint {
    pub bound: f64,
    pub likelihood: f64,
    pub perplexity: f64,
}

impl Checkpoint {
    pub(crate) fn evaluate(data: &Dataset, model: &ModelState, query: &QueryState) -> Result<Self> {
        let terms = bound_terms(data, model, query)?;
        if let Some(term) = terms.first_non_finite() {
            warn!("bound term `{}` is not finite", term);
        }
        let bound = terms.total();
        let likelihood = log_likelihood(data, model, query)?;
        Ok(Checkpoint {
            bound,
            likelihood,
            perplexity: perplexity_of(likelihood, data),
        })
    }
}

/// Stopping rule shared by training and querying: returns why to
/// stop, if at all
pub(crate) fn should_stop(
    trace: &BoundTrace,
    iteration: usize,
    min_iterations: usize,
    perplexity_tolerance: f64,
    epsilon: f64,
) -> Option<StopReason> {
    let n = trace.len();
    if n < 2 || iteration + 1 < min_iterations {
        return None;
    }
    let (prev_ppl, curr_ppl) = (trace.perplexities[n - 2], trace.perplexities[n - 1]);
    if prev_ppl - curr_ppl < perplexity_tolerance {
        return Some(StopReason::PerplexityConverged);
    }
    let (prev, curr) = (trace.bounds[n - 2], trace.bounds[n - 1]);
    if ((curr - prev) / prev.abs().max(f64::MIN_POSITIVE)).abs() < epsilon {
        return Some(StopReason::BoundConverged);
    }
    None
}

/// Append a checkpoint to the trace, warning if the bound fell
pub(crate) fn record_checkpoint(iteration: usize, cp: &Checkpoint, trace: &mut BoundTrace) {
    if let Some(&previous) = trace.bounds.last() {
        if cp.bound < previous - 1e-9 * previous.abs() {
            warn!(
                "[{}] bound decreased: {:.6} -> {:.6}",
                iteration, previous, cp.bound
            );
            trace.anomalies.push(Anomaly::BoundDecrease {
                iteration,
                previous,
                current: cp.bound,
            });
        }
    }
    trace.push(iteration, cp.bound, cp.likelihood, cp.perplexity);
}

pub(crate) fn progress_bar(len: usize, show_progress: bool, verbose: bool) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if !show_progress || verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb
}

/// Consecutive non-finite checkpoints under [`AnomalyPolicy::Abort`],
/// with a snapshot of the last clean one
pub(crate) struct DivergenceGuard {
    patience: usize,
    bad_checkpoints: usize,
    last_good: Option<Box<TrainOutput>>,
}

impl DivergenceGuard {
    pub(crate) fn new(policy: AnomalyPolicy) -> Option<Self> {
        match policy {
            AnomalyPolicy::Log => None,
            AnomalyPolicy::Abort { patience } => Some(DivergenceGuard {
                patience: patience.max(1),
                bad_checkpoints: 0,
                last_good: None,
            }),
        }
    }

    ///
    /// Count a checkpoint; fails once `patience` non-finite ones ran
    /// in a row, otherwise a clean checkpoint replaces the snapshot
    ///
    pub(crate) fn check(
        &mut self,
        iteration: usize,
        non_finite: bool,
        snapshot: impl FnOnce() -> TrainOutput,
    ) -> Result<()> {
        if !non_finite {
            self.bad_checkpoints = 0;
            self.last_good = Some(Box::new(snapshot()));
            return Ok(());
        }
        self.bad_checkpoints += 1;
        if self.bad_checkpoints >= self.patience {
            return Err(TopicModelError::NumericalDivergence {
                iteration,
                last_good: self.last_good.take(),
            });
        }
        Ok(())
    }
}

///
/// Fit the model by alternating M-steps and E-steps
///
/// * `data` - training corpus, must match the model's vocabulary
/// * `model` - initial corpus-level parameters
/// * `query` - initial local parameters for every document of `data`
/// * `plan` - iteration budget, checkpoints and stopping rule
///
/// Numerical anomalies are logged and recorded in the returned trace;
/// with [`AnomalyPolicy::Abort`] persistent NaN/Inf instead fail with
/// [`TopicModelError::NumericalDivergence`].
///
pub fn train(
    data: &Dataset,
    model: ModelState,
    query: QueryState,
    plan: &TrainPlan,
) -> Result<TrainOutput> {
    if plan.iterations < 1 {
        return Err(TopicModelError::InvalidInput(
            "need at least one iteration".into(),
        ));
    }
    query.check(data, &model)?;
    if model.side().is_some() && model.prior().recenter_means {
        return Err(TopicModelError::InvalidInput(
            "re-centring means is not identifiable with a side-information prior".into(),
        ));
    }

    let (mut model, mut query) = (model, query);
    let mut trace = BoundTrace::default();
    let mut tracker = BoundTracker::default();
    let diagonal = plan.fast_but_inaccurate;
    let mut guard = DivergenceGuard::new(plan.anomaly_policy);

    info!(
        "training {} topics on {} documents x {} terms",
        model.num_topics(),
        data.doc_count(),
        data.term_count()
    );

    let pb = progress_bar(plan.iterations, plan.show_progress, plan.verbose);

    for itr in 0..plan.iterations {
        // M-step
        let prior_update = update_topic_prior(
            data,
            &mut model,
            &query,
            diagonal,
            itr,
            plan.debug.then_some(&mut tracker),
        )?;
        for &(matrix, nan, inf) in prior_update.discarded.iter() {
            warn!(
                "[{}] new {} has {} NaN and {} Inf entries; kept the previous one",
                itr, matrix, nan, inf
            );
            trace.anomalies.push(Anomaly::NonFinite {
                iteration: itr,
                matrix,
                nan,
                inf,
            });
        }
        if prior_update.ridge > 0.0 {
            warn!("[{}] added ridge {:.3e} to the topic prior", itr, prior_update.ridge);
            trace.anomalies.push(Anomaly::RidgeFallback {
                iteration: itr,
                site: "topic prior",
                ridge: prior_update.ridge,
                count: 1,
            });
        }

        let expected = update_vocab(data, &mut model, &query);
        if plan.debug {
            tracker.verify("vocab", itr, data, &model, &query);
        }

        // E-step
        let report = e_step(
            data,
            &model,
            &mut query,
            &expected,
            diagonal,
            itr,
            plan.debug.then_some(&mut tracker),
        )?;
        report.record(itr, &mut trace);
        tracker.drain_into(&mut trace);
        let scanned = plan
            .debug
            .then(|| report_non_finite(itr, Some(&model), &query, &mut trace));

        pb.inc(1);

        if !is_checkpoint(itr, plan.log_frequency, plan.iterations) {
            continue;
        }

        let cp = Checkpoint::evaluate(data, &model, &query)?;
        info!(
            "[{}] perplexity {:.4}, bound {:.4}, log-likelihood {:.4}",
            itr + 1,
            cp.perplexity,
            cp.bound,
            cp.likelihood
        );
        record_checkpoint(itr, &cp, &mut trace);

        let found = match scanned {
            Some(found) => found,
            None => report_non_finite(itr, Some(&model), &query, &mut trace),
        };
        let non_finite = found || !cp.bound.is_finite() || !prior_update.discarded.is_empty();

        if let Some(guard) = guard.as_mut() {
            if let Err(e) = guard.check(itr, non_finite, || TrainOutput {
                model: model.clone(),
                query: query.clone(),
                trace: trace.clone(),
            }) {
                pb.finish_and_clear();
                return Err(e);
            }
        }

        if let Some(reason) = should_stop(
            &trace,
            itr,
            plan.min_iterations,
            plan.perplexity_tolerance,
            plan.epsilon,
        ) {
            info!("[{}] stopping: {:?}", itr + 1, reason);
            trace.stop_reason = reason;
            break;
        }
    }
    pb.finish_and_clear();

    Ok(TrainOutput {
        model,
        query,
        trace,
    })
}
