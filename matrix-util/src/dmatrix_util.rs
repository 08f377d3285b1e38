use crate::traits::*;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Gamma, StandardNormal};

impl SampleOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn runif<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::from_fn(dd, nn, |_, _| rng.random::<f64>())
    }

    fn rnorm<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::from_fn(dd, nn, |_, _| rng.sample::<f64, _>(StandardNormal))
    }

    fn rgamma<R: Rng + ?Sized>(
        dd: usize,
        nn: usize,
        param: (f64, f64),
        rng: &mut R,
    ) -> anyhow::Result<Self::Mat> {
        let (shape, scale) = param;
        let pdf = Gamma::new(shape, scale)
            .map_err(|e| anyhow::anyhow!("invalid gamma ({}, {}): {}", shape, scale, e))?;
        Ok(DMatrix::from_fn(dd, nn, |_, _| pdf.sample(rng)))
    }
}

impl RowOps for DMatrix<f64> {
    type Mat = Self;
    type DVec = DVector<f64>;

    fn max_each_row(&self) -> Self::DVec {
        DVector::from_iterator(
            self.nrows(),
            self.row_iter()
                .map(|r| r.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        )
    }

    fn sum_each_row(&self) -> Self::DVec {
        DVector::from_iterator(self.nrows(), self.row_iter().map(|r| r.sum()))
    }

    fn normalize_rows_inplace(&mut self) {
        for mut row in self.row_iter_mut() {
            let denom = row.sum();
            if denom > 0.0 {
                row /= denom;
            }
        }
    }

    fn exp_shifted_rows(&self) -> Self::Mat {
        let mut ret = self.clone();
        for mut row in ret.row_iter_mut() {
            let mx = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.apply(|x| *x = (*x - mx).exp());
        }
        ret
    }

    fn row_softmax(&self) -> Self::Mat {
        let mut ret = self.exp_shifted_rows();
        ret.normalize_rows_inplace();
        ret
    }
}

impl FiniteOps for DMatrix<f64> {
    fn count_non_finite(&self) -> (usize, usize) {
        count_non_finite_slice(self.as_slice())
    }
}

impl FiniteOps for DVector<f64> {
    fn count_non_finite(&self) -> (usize, usize) {
        count_non_finite_slice(self.as_slice())
    }
}

fn count_non_finite_slice(xx: &[f64]) -> (usize, usize) {
    xx.iter().fold((0, 0), |(nan, inf), x| {
        (nan + x.is_nan() as usize, inf + x.is_infinite() as usize)
    })
}

/// `ln(x)` clamped away from `-inf` at zero
#[inline]
pub fn safe_ln(x: f64) -> f64 {
    x.max(f64::MIN_POSITIVE).ln()
}

/// `ln(1 + exp(x))` without overflow
#[inline]
pub fn ln_one_plus_exp(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// `1 / (1 + exp(-x))`
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1.0 + ex)
    }
}

/// `ln sum_k exp(x_k)` of a slice
pub fn log_sum_exp(xx: &[f64]) -> f64 {
    let mx = xx.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !mx.is_finite() {
        return mx;
    }
    mx + xx.iter().map(|x| (x - mx).exp()).sum::<f64>().ln()
}

/// softmax of a slice
pub fn softmax(xx: &[f64]) -> Vec<f64> {
    let mx = xx.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let ex: Vec<f64> = xx.iter().map(|x| (x - mx).exp()).collect();
    let tot: f64 = ex.iter().sum();
    ex.into_iter().map(|x| x / tot).collect()
}

/// rows of `top` followed by rows of `bot`
pub fn vstack_dense(top: &DMatrix<f64>, bot: &DMatrix<f64>) -> DMatrix<f64> {
    debug_assert_eq!(top.ncols(), bot.ncols());
    let n_top = top.nrows();
    DMatrix::from_fn(n_top + bot.nrows(), top.ncols(), |i, j| {
        if i < n_top {
            top[(i, j)]
        } else {
            bot[(i - n_top, j)]
        }
    })
}
