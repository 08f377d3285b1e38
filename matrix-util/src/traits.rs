use crate::common_io::Delimiter;
use rand::Rng;

/// Operations to sample random matrices from a caller-owned
/// generator, so that seeded runs are reproducible
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;

    /// Sample a matrix from a gamma distribution with `param` is
    /// `(shape α, scale θ)`
    ///
    /// $$f(x|\alpha,\theta) = \frac{\theta^{-\alpha}}{\Gamma(\alpha)} x^{\alpha - 1} e^{-x/\theta}$$
    fn rgamma<R: Rng + ?Sized>(
        dd: usize,
        nn: usize,
        param: (Self::Scalar, Self::Scalar),
        rng: &mut R,
    ) -> anyhow::Result<Self::Mat>;
}

/// Row-wise operations; a row is one document (or one topic)
pub trait RowOps {
    type Mat;
    type DVec;

    /// maximum of each row
    fn max_each_row(&self) -> Self::DVec;

    /// sum of each row
    fn sum_each_row(&self) -> Self::DVec;

    /// `X[i,] / sum(X[i,])`
    fn normalize_rows_inplace(&mut self);

    /// `exp(X[i,] - max(X[i,]))`, never overflows
    fn exp_shifted_rows(&self) -> Self::Mat;

    /// `exp(X[i,] - max(X[i,])) / sum(...)`
    fn row_softmax(&self) -> Self::Mat;
}

/// Scan for values that would poison an iterative update
pub trait FiniteOps {
    /// number of NaN and number of infinite entries
    fn count_non_finite(&self) -> (usize, usize);

    fn all_finite(&self) -> bool {
        self.count_non_finite() == (0, 0)
    }
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    fn to_csv(&self, csv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(csv_file, ",")
    }
}
