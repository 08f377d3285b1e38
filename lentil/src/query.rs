use crate::dataset::Dataset;
use crate::diagnostics::{report_non_finite, BoundTracker};
use crate::error::{Result, TopicModelError};
use crate::inference::*;
use crate::model_state::ModelState;
use crate::plan::{is_checkpoint, QueryPlan};
use crate::query_state::QueryState;
use crate::trace::BoundTrace;
use log::info;
use matrix_util::traits::RowOps;

/// Local states inferred for new documents
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub query: QueryState,
    pub trace: BoundTrace,
}

///
/// Infer topic weights of (possibly unseen) documents with the model
/// held fixed: only E-steps are run
///
/// * `data` - documents to query; any number of them
/// * `model` - trained corpus-level parameters, never modified
/// * `query` - initial local state for the documents of `data`
///
pub fn query(
    data: &Dataset,
    model: &ModelState,
    query: QueryState,
    plan: &QueryPlan,
) -> Result<QueryOutput> {
    if plan.iterations < 1 {
        return Err(TopicModelError::InvalidInput(
            "need at least one iteration".into(),
        ));
    }
    query.check(data, model)?;

    let mut query = query;
    let mut trace = BoundTrace::default();
    let mut tracker = BoundTracker::default();
    let diagonal = plan.fast_but_inaccurate || model.is_diagonal();

    let pb = progress_bar(plan.iterations, plan.show_progress, plan.verbose);

    for itr in 0..plan.iterations {
        let expected =
            expected_topic_counts(data.words(), &query.means().exp_shifted_rows(), model.vocab());
        let report = e_step(
            data,
            model,
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
            .then(|| report_non_finite(itr, None, &query, &mut trace));

        pb.inc(1);

        if !is_checkpoint(itr, plan.log_frequency, plan.iterations) {
            continue;
        }

        let cp = Checkpoint::evaluate(data, model, &query)?;
        info!(
            "[query {}] perplexity {:.4}, bound {:.4}",
            itr + 1,
            cp.perplexity,
            cp.bound
        );
        record_checkpoint(itr, &cp, &mut trace);
        if scanned.is_none() {
            report_non_finite(itr, None, &query, &mut trace);
        }

        if let Some(reason) = should_stop(
            &trace,
            itr,
            plan.min_iterations,
            plan.perplexity_tolerance,
            plan.epsilon,
        ) {
            trace.stop_reason = reason;
            break;
        }
    }
    pb.finish_and_clear();

    Ok(QueryOutput { query, trace })
}
