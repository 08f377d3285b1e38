/// Advisory events recorded while iterating; none of them stop the
/// loop under the default policy
#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// NaN or Inf entries in a state matrix
    NonFinite {
        iteration: usize,
        matrix: &'static str,
        nan: usize,
        inf: usize,
    },
    /// the bound fell between two checkpoints
    BoundDecrease {
        iteration: usize,
        previous: f64,
        current: f64,
    },
    /// the bound fell across a single sub-step (debug mode)
    StepDecrease {
        iteration: usize,
        step: &'static str,
        delta: f64,
    },
    /// a singular system was solved with a ridge on its diagonal
    RidgeFallback {
        iteration: usize,
        site: &'static str,
        ridge: f64,
        count: usize,
    },
    /// a system stayed singular or non-finite and the element-wise
    /// update was used instead
    DiagonalFallback {
        iteration: usize,
        site: &'static str,
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StopReason {
    #[default]
    IterationBudget,
    PerplexityConverged,
    BoundConverged,
}

/// Checkpoint history of one run: parallel sequences of iteration,
/// bound, log-likelihood and perplexity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundTrace {
    pub iterations: Vec<usize>,
    pub bounds: Vec<f64>,
    pub likelihoods: Vec<f64>,
    pub perplexities: Vec<f64>,
    pub anomalies: Vec<Anomaly>,
    pub stop_reason: StopReason,
}

impl BoundTrace {
    pub(crate) fn push(&mut self, iteration: usize, bound: f64, likelihood: f64, perplexity: f64) {
        self.iterations.push(iteration);
        self.bounds.push(bound);
        self.likelihoods.push(likelihood);
        self.perplexities.push(perplexity);
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn last_perplexity(&self) -> Option<f64> {
        self.perplexities.last().copied()
    }

    /// number of checkpoints at which the bound fell
    pub fn num_bound_decreases(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| matches!(a, Anomaly::BoundDecrease { .. }))
            .count()
    }

    pub fn has_non_finite(&self) -> bool {
        self.anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::NonFinite { .. }))
    }
}
