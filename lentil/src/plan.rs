/// What to do when NaN/Inf show up at checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AnomalyPolicy {
    /// log and record in the trace, keep iterating
    #[default]
    Log,
    /// fail with `NumericalDivergence` once non-finite values persist
    /// for `patience` consecutive checkpoints
    Abort { patience: usize },
}

/// Training loop configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrainPlan {
    /// Maximum number of M-step/E-step rounds. Default: 100
    pub iterations: usize,
    /// Stop when the relative bound change falls below this. Default: 1e-6
    pub epsilon: f64,
    /// Checkpoint every this many iterations; 0 disables. Default: 5
    pub log_frequency: usize,
    /// Diagonal topic covariance and element-wise mean updates. Default: false
    pub fast_but_inaccurate: bool,
    /// Verify the bound after every sub-step and scan for NaN/Inf
    /// every iteration. Default: false
    pub debug: bool,
    /// No early stopping before this many iterations. Default: 30
    pub min_iterations: usize,
    /// Stop when perplexity improves by less than this between
    /// checkpoints. Default: 1.0
    pub perplexity_tolerance: f64,
    pub anomaly_policy: AnomalyPolicy,
    pub show_progress: bool,
    pub verbose: bool,
}

impl Default for TrainPlan {
    fn default() -> Self {
        TrainPlan {
            iterations: 100,
            epsilon: 1e-6,
            log_frequency: 5,
            fast_but_inaccurate: false,
            debug: false,
            min_iterations: 30,
            perplexity_tolerance: 1.0,
            anomaly_policy: AnomalyPolicy::Log,
            show_progress: false,
            verbose: false,
        }
    }
}

/// Configuration of held-out inference; same meaning as the
/// [`TrainPlan`] fields of the same name
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub iterations: usize,
    pub epsilon: f64,
    pub log_frequency: usize,
    pub fast_but_inaccurate: bool,
    pub debug: bool,
    pub min_iterations: usize,
    pub perplexity_tolerance: f64,
    pub show_progress: bool,
    pub verbose: bool,
}

impl Default for QueryPlan {
    fn default() -> Self {
        QueryPlan::from(&TrainPlan::default())
    }
}

impl From<&TrainPlan> for QueryPlan {
    fn from(plan: &TrainPlan) -> Self {
        QueryPlan {
            iterations: plan.iterations,
            epsilon: plan.epsilon,
            log_frequency: plan.log_frequency,
            fast_but_inaccurate: plan.fast_but_inaccurate,
            debug: plan.debug,
            min_iterations: plan.min_iterations,
            perplexity_tolerance: plan.perplexity_tolerance,
            show_progress: plan.show_progress,
            verbose: plan.verbose,
        }
    }
}

/// Checkpoint schedule shared by training and querying
pub(crate) fn is_checkpoint(itr: usize, log_frequency: usize, iterations: usize) -> bool {
    log_frequency > 0 && ((itr + 1) % log_frequency == 0 || itr + 1 == iterations)
}
