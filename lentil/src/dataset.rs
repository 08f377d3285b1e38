use crate::config::SideSource;
use crate::error::{check_dim, Result, TopicModelError};
use matrix_util::mtx_io::{read_mtx_triplets, Triplet};
use matrix_util::sparse_util::*;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use rand::seq::SliceRandom;
use rand::Rng;

/// An immutable corpus: document-term counts (rows are documents)
/// with optional document features and document-document links
#[derive(Debug, Clone)]
pub struct Dataset {
    words: CsrMatrix<f64>,
    feats: Option<CsrMatrix<f64>>,
    links: Option<CsrMatrix<f64>>,
    doc_lens: DVector<f64>,
    word_count: f64,
}

fn check_counts(what: &str, xx: &CsrMatrix<f64>) -> Result<()> {
    if let Some(x) = xx.values().iter().find(|x| !x.is_finite() || **x < 0.0) {
        return Err(TopicModelError::InvalidInput(format!(
            "{} must be finite and non-negative, found {}",
            what, x
        )));
    }
    Ok(())
}

impl Dataset {
    /// Validate a document-term matrix; every document needs at
    /// least one word
    pub fn new(words: CsrMatrix<f64>) -> Result<Self> {
        check_counts("word counts", &words)?;

        if words.nrows() == 0 || words.ncols() == 0 {
            return Err(TopicModelError::InvalidInput(format!(
                "empty corpus: {} x {}",
                words.nrows(),
                words.ncols()
            )));
        }

        let doc_lens = row_sums(&words);
        if let Some(d) = doc_lens.iter().position(|&n| n <= 0.0) {
            return Err(TopicModelError::InvalidInput(format!(
                "document {} has no words",
                d
            )));
        }

        let word_count = doc_lens.sum();
        Ok(Dataset {
            words,
            feats: None,
            links: None,
            doc_lens,
            word_count,
        })
    }

    pub fn from_triplets(num_docs: usize, num_terms: usize, triplets: &[Triplet]) -> Result<Self> {
        let words = csr_from_triplets(num_docs, num_terms, triplets)
            .map_err(|e| TopicModelError::InvalidInput(e.to_string()))?;
        Self::new(words)
    }

    pub fn from_dense(words: &DMatrix<f64>) -> Result<Self> {
        let words = csr_from_dense(words).map_err(|e| TopicModelError::InvalidInput(e.to_string()))?;
        Self::new(words)
    }

    ///
    /// Read a MatrixMarket file
    ///
    /// * `mtx_file` - document x term counts, or term x document if
    ///   `transpose` is set
    ///
    pub fn from_mtx(mtx_file: &str, transpose: bool) -> Result<Self> {
        let (triplets, (nrow, ncol, _)) =
            read_mtx_triplets(mtx_file).map_err(|e| TopicModelError::Format(e.to_string()))?;

        if transpose {
            let triplets: Vec<Triplet> = triplets.into_iter().map(|(i, j, x)| (j, i, x)).collect();
            Self::from_triplets(ncol, nrow, &triplets)
        } else {
            Self::from_triplets(nrow, ncol, &triplets)
        }
    }

    /// Attach a document x feature matrix
    pub fn with_feats(mut self, feats: CsrMatrix<f64>) -> Result<Self> {
        check_dim("feature rows", self.doc_count(), feats.nrows())?;
        check_counts("features", &feats)?;
        self.feats = Some(feats);
        Ok(self)
    }

    /// Attach a document x document link matrix
    pub fn with_links(mut self, links: CsrMatrix<f64>) -> Result<Self> {
        check_dim("link rows", self.doc_count(), links.nrows())?;
        check_counts("links", &links)?;
        self.links = Some(links);
        Ok(self)
    }

    pub fn words(&self) -> &CsrMatrix<f64> {
        &self.words
    }

    pub fn feats(&self) -> Option<&CsrMatrix<f64>> {
        self.feats.as_ref()
    }

    pub fn links(&self) -> Option<&CsrMatrix<f64>> {
        self.links.as_ref()
    }

    pub fn side_matrix(&self, source: SideSource) -> Option<&CsrMatrix<f64>> {
        match source {
            SideSource::Features => self.feats(),
            SideSource::Links => self.links(),
        }
    }

    pub fn doc_count(&self) -> usize {
        self.words.nrows()
    }

    pub fn term_count(&self) -> usize {
        self.words.ncols()
    }

    /// total number of tokens
    pub fn word_count(&self) -> f64 {
        self.word_count
    }

    pub fn doc_lens(&self) -> &DVector<f64> {
        &self.doc_lens
    }

    /// corpus term frequencies
    pub fn term_totals(&self) -> DVector<f64> {
        let mut ret = DVector::zeros(self.term_count());
        for (_, j, &x) in self.words.triplet_iter() {
            ret[j] += x;
        }
        ret
    }

    /// Subset of documents, in the given order
    pub fn select_docs(&self, docs: &[usize]) -> Result<Self> {
        let pick = |xx: &CsrMatrix<f64>| {
            select_rows(xx, docs).map_err(|e| TopicModelError::InvalidInput(e.to_string()))
        };
        let mut ret = Self::new(pick(&self.words)?)?;
        if let Some(feats) = &self.feats {
            ret.feats = Some(pick(feats)?);
        }
        if let Some(links) = &self.links {
            ret.links = Some(pick(links)?);
        }
        Ok(ret)
    }

    /// Append the documents of `other`; both must carry the same kind
    /// of side matrices
    pub fn vstack(&self, other: &Dataset) -> Result<Self> {
        check_dim("terms", self.term_count(), other.term_count())?;

        let stack = |a: &CsrMatrix<f64>, b: &CsrMatrix<f64>, what: &'static str| {
            check_dim(what, a.ncols(), b.ncols())?;
            vstack_csr(a, b).map_err(|e| TopicModelError::InvalidInput(e.to_string()))
        };

        let mut ret = Self::new(stack(&self.words, &other.words, "terms")?)?;
        ret.feats = match (&self.feats, &other.feats) {
            (Some(a), Some(b)) => Some(stack(a, b, "features")?),
            (None, None) => None,
            _ => {
                return Err(TopicModelError::InvalidInput(
                    "only one corpus has features".into(),
                ))
            }
        };
        ret.links = match (&self.links, &other.links) {
            (Some(a), Some(b)) => Some(stack(a, b, "links")?),
            (None, None) => None,
            _ => {
                return Err(TopicModelError::InvalidInput(
                    "only one corpus has links".into(),
                ))
            }
        };
        Ok(ret)
    }

    ///
    /// Randomly split documents into a training and a held-out corpus
    ///
    /// * `holdout_frac` - fraction of documents held out, in (0, 1)
    ///
    pub fn split_holdout<R: Rng + ?Sized>(
        &self,
        holdout_frac: f64,
        rng: &mut R,
    ) -> Result<(Dataset, Dataset)> {
        let ndocs = self.doc_count();
        let nheld = (ndocs as f64 * holdout_frac).round() as usize;
        if !(holdout_frac > 0.0 && holdout_frac < 1.0) || nheld == 0 || nheld >= ndocs {
            return Err(TopicModelError::InvalidInput(format!(
                "cannot hold out {} of {} documents",
                holdout_frac, ndocs
            )));
        }

        let mut docs: Vec<usize> = (0..ndocs).collect();
        docs.shuffle(rng);
        let (held, train) = docs.split_at(nheld);
        let mut held = held.to_vec();
        let mut train = train.to_vec();
        held.sort_unstable();
        train.sort_unstable();

        Ok((self.select_docs(&train)?, self.select_docs(&held)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rejects_empty_documents() {
        let words = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            Dataset::from_dense(&words),
            Err(TopicModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_negative_counts() {
        let words = DMatrix::from_row_slice(1, 2, &[3.0, -1.0]);
        assert!(Dataset::from_dense(&words).is_err());
    }

    #[test]
    fn lengths_and_totals() -> Result<()> {
        let data = Dataset::from_triplets(2, 3, &[(0, 0, 2.0), (0, 2, 1.0), (1, 2, 4.0)])?;
        assert_eq!(data.doc_lens().as_slice(), &[3.0, 4.0]);
        assert_eq!(data.word_count(), 7.0);
        assert_eq!(data.term_totals().as_slice(), &[2.0, 0.0, 5.0]);
        Ok(())
    }

    #[test]
    fn side_matrix_rows_must_match() -> Result<()> {
        let data = Dataset::from_triplets(2, 3, &[(0, 0, 2.0), (1, 2, 4.0)])?;
        let feats = csr_from_triplets(3, 2, &[(0, 0, 1.0)]).map_err(|e| TopicModelError::Format(e.to_string()))?;
        assert!(matches!(
            data.with_feats(feats),
            Err(TopicModelError::DimensionMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn holdout_partitions_documents() -> Result<()> {
        let triplets: Vec<Triplet> = (0..20).map(|d| (d, d % 4, 1.0 + d as f64)).collect();
        let data = Dataset::from_triplets(20, 4, &triplets)?;
        let mut rng = StdRng::seed_from_u64(9);
        let (train, held) = data.split_holdout(0.25, &mut rng)?;
        assert_eq!(train.doc_count(), 15);
        assert_eq!(held.doc_count(), 5);
        assert_eq!(train.word_count() + held.word_count(), data.word_count());

        let both = train.vstack(&held)?;
        assert_eq!(both.doc_count(), 20);
        assert!(data.split_holdout(1.0, &mut rng).is_err());
        Ok(())
    }
}
