use crate::dataset::Dataset;
use crate::model_state::ModelState;
use crate::query_state::QueryState;
use crate::trace::{Anomaly, BoundTrace};
use crate::var_bound::var_bound;
use log::{debug, warn};
use matrix_util::traits::FiniteOps;

/// NaN/Inf counts per state matrix, only those with any
pub(crate) fn scan_non_finite(
    model: Option<&ModelState>,
    query: &QueryState,
) -> Vec<(&'static str, usize, usize)> {
    let mut mats = vec![
        ("means", query.means().count_non_finite()),
        ("varcs", query.varcs().count_non_finite()),
    ];
    if let Some(model) = model {
        mats.push(("sig_t", model.sig_t().count_non_finite()));
        mats.push(("vocab", model.vocab().count_non_finite()));
        mats.push(("topic_mean", model.topic_mean().count_non_finite()));
    }
    mats.into_iter()
        .filter(|(_, (nan, inf))| nan + inf > 0)
        .map(|(name, (nan, inf))| (name, nan, inf))
        .collect()
}

/// Scan, log and record; returns whether anything was found
pub(crate) fn report_non_finite(
    iteration: usize,
    model: Option<&ModelState>,
    query: &QueryState,
    trace: &mut BoundTrace,
) -> bool {
    let found = scan_non_finite(model, query);
    for &(matrix, nan, inf) in found.iter() {
        warn!(
            "[{}] {} has {} NaN and {} Inf entries",
            iteration, matrix, nan, inf
        );
        trace.anomalies.push(Anomaly::NonFinite {
            iteration,
            matrix,
            nan,
            inf,
        });
    }
    !found.is_empty()
}

/// Bound after every verified sub-step, for debug mode
#[derive(Debug, Default)]
pub(crate) struct BoundTracker {
    last: Option<f64>,
    /// `(sub-step, bound after it)` in the order they ran
    pub history: Vec<(&'static str, f64)>,
    pending: Vec<Anomaly>,
}

impl BoundTracker {
    ///
    /// Evaluate the bound after `step` and compare with the value
    /// after the previous step
    ///
    pub(crate) fn verify(
        &mut self,
        step: &'static str,
        iteration: usize,
        data: &Dataset,
        model: &ModelState,
        query: &QueryState,
    ) {
        let bound = match var_bound(data, model, query) {
            Ok(bound) => bound,
            Err(e) => {
                warn!("[{}] bound after {} failed: {}", iteration, step, e);
                return;
            }
        };

        if let Some(last) = self.last {
            let delta = bound - last;
            if delta < -1e-6 * last.abs().max(1.0) {
                warn!(
                    "[{}] bound fell by {:.6e} after {} ({:.6} -> {:.6})",
                    iteration, -delta, step, last, bound
                );
                self.pending.push(Anomaly::StepDecrease {
                    iteration,
                    step,
                    delta,
                });
            } else {
                debug!("[{}] bound {:+.6e} after {}", iteration, delta, step);
            }
        }
        self.history.push((step, bound));
        self.last = Some(bound);
    }

    /// Move the anomalies found so far into the trace
    pub(crate) fn drain_into(&mut self, trace: &mut BoundTrace) {
        trace.anomalies.append(&mut self.pending);
    }
}

/// [`BoundTracker::verify`] when a tracker is attached
pub(crate) fn verify_step(
    tracker: &mut Option<&mut BoundTracker>,
    step: &'static str,
    iteration: usize,
    data: &Dataset,
    model: &ModelState,
    query: &QueryState,
) {
    if let Some(tracker) = tracker.as_deref_mut() {
        tracker.verify(step, iteration, data, model, query);
    }
}
