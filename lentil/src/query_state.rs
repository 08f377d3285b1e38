use crate::bound::LocalState;
use crate::dataset::Dataset;
use crate::error::{check_dim, Result};
use crate::model_state::ModelState;
use matrix_util::dmatrix_util::vstack_dense;
use matrix_util::traits::{RowOps, SampleOps};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

/// Per-document variational parameters for one batch of documents
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    means: DMatrix<f64>,
    varcs: DMatrix<f64>,
    lxi: DMatrix<f64>,
    s: DVector<f64>,
    doc_lens: DVector<f64>,
}

impl QueryState {
    /// Fresh local state for every document in `data`
    pub fn new<R: Rng + ?Sized>(data: &Dataset, model: &ModelState, rng: &mut R) -> Result<Self> {
        model.check_dataset(data)?;

        let ndocs = data.doc_count();
        let k = model.num_topics();

        let mut means = DMatrix::<f64>::runif(ndocs, k, rng);
        means.normalize_rows_inplace();

        let strategy = model.bound_kind().strategy();
        let mut lxi = DMatrix::<f64>::zeros(ndocs, strategy.aux_width(k));
        for d in 0..ndocs {
            let mut local = LocalState {
                means: means.row(d).iter().copied().collect(),
                varcs: vec![1.0; k],
                lxi: vec![],
                s: 0.0,
            };
            strategy.compute_bound_auxiliaries(&mut local);
            for (j, &x) in local.lxi.iter().enumerate() {
                lxi[(d, j)] = x;
            }
        }

        Ok(QueryState {
            means,
            varcs: DMatrix::from_element(ndocs, k, 1.0),
            lxi,
            s: DVector::zeros(ndocs),
            doc_lens: data.doc_lens().clone(),
        })
    }

    /// Append fresh local states for the documents of another batch
    pub fn append<R: Rng + ?Sized>(
        &mut self,
        data: &Dataset,
        model: &ModelState,
        rng: &mut R,
    ) -> Result<()> {
        check_dim("topics", self.num_topics(), model.num_topics())?;
        let other = QueryState::new(data, model, rng)?;
        check_dim("bound auxiliaries", self.lxi.ncols(), other.lxi.ncols())?;

        self.means = vstack_dense(&self.means, &other.means);
        self.varcs = vstack_dense(&self.varcs, &other.varcs);
        self.lxi = vstack_dense(&self.lxi, &other.lxi);
        self.s = DVector::from_iterator(
            self.s.len() + other.s.len(),
            self.s.iter().chain(other.s.iter()).copied(),
        );
        self.doc_lens = DVector::from_iterator(
            self.doc_lens.len() + other.doc_lens.len(),
            self.doc_lens.iter().chain(other.doc_lens.iter()).copied(),
        );
        Ok(())
    }

    pub fn num_docs(&self) -> usize {
        self.means.nrows()
    }

    pub fn num_topics(&self) -> usize {
        self.means.ncols()
    }

    /// D x K posterior means of the unnormalised topic weights
    pub fn means(&self) -> &DMatrix<f64> {
        &self.means
    }

    /// D x K posterior variances, strictly positive
    pub fn varcs(&self) -> &DMatrix<f64> {
        &self.varcs
    }

    /// D x K (Bouchard) or D x 0 (Bohning)
    pub fn lxi(&self) -> &DMatrix<f64> {
        &self.lxi
    }

    /// Bouchard offsets, one per document
    pub fn offsets(&self) -> &DVector<f64> {
        &self.s
    }

    pub fn doc_lens(&self) -> &DVector<f64> {
        &self.doc_lens
    }

    /// D x K topic proportions, `softmax(means[d,])`
    pub fn topic_dists(&self) -> DMatrix<f64> {
        self.means.row_softmax()
    }

    /// Make sure this state belongs to `data` and `model`
    pub(crate) fn check(&self, data: &Dataset, model: &ModelState) -> Result<()> {
        model.check_dataset(data)?;
        check_dim("documents", data.doc_count(), self.num_docs())?;
        check_dim("topics", model.num_topics(), self.num_topics())?;
        let width = model.bound_kind().strategy().aux_width(model.num_topics());
        check_dim("bound auxiliaries", width, self.lxi.ncols())?;
        Ok(())
    }

    pub(crate) fn local_state(&self, d: usize) -> LocalState {
        LocalState {
            means: self.means.row(d).iter().copied().collect(),
            varcs: self.varcs.row(d).iter().copied().collect(),
            lxi: self.lxi.row(d).iter().copied().collect(),
            s: self.s[d],
        }
    }

    pub(crate) fn set_local_state(&mut self, d: usize, local: &LocalState) {
        for (k, (&m, &v)) in local.means.iter().zip(local.varcs.iter()).enumerate() {
            self.means[(d, k)] = m;
            self.varcs[(d, k)] = v;
        }
        for (k, &x) in local.lxi.iter().enumerate() {
            self.lxi[(d, k)] = x;
        }
        self.s[d] = local.s;
    }
}
