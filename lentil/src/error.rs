use crate::inference::TrainOutput;
use matrix_util::dmatrix_linalg::LinalgError;

/// Failures surfaced to the caller of the topic model
#[derive(Debug, thiserror::Error)]
pub enum TopicModelError {
    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("singular matrix: {0}")]
    SingularMatrix(#[from] LinalgError),

    /// Non-finite values persisted across checkpoints; carries the
    /// state of the last clean checkpoint, if there was one
    #[error("numerical divergence at iteration {iteration}")]
    NumericalDivergence {
        iteration: usize,
        last_good: Option<Box<TrainOutput>>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, TopicModelError>;

pub(crate) fn check_dim(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(TopicModelError::DimensionMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}
