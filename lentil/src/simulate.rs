use crate::dataset::Dataset;
use crate::error::{Result, TopicModelError};
use log::info;
use matrix_util::mtx_io::Triplet;
use matrix_util::traits::{RowOps, SampleOps};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

pub struct SimArgs {
    pub docs: usize,
    pub terms: usize,
    pub topics: usize,
    /// average document length
    pub doc_len: f64,
    /// symmetric Dirichlet concentration of each topic's word distribution
    pub vocab_conc: f64,
    /// standard deviation of the logistic-normal topic weights
    pub topic_scale: f64,
    pub rseed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        SimArgs {
            docs: 200,
            terms: 100,
            topics: 10,
            doc_len: 500.0,
            vocab_conc: 0.1,
            topic_scale: 2.0,
            rseed: 42,
        }
    }
}

pub struct SimOut {
    pub data: Dataset,
    /// true topic x term distributions
    pub vocab: DMatrix<f64>,
    /// true document x topic proportions
    pub topic_dists: DMatrix<f64>,
    pub triplets: Vec<Triplet>,
}

///
/// Sample a corpus from a known correlated topic model
///
/// ```text
/// vocab[k,] ~ Dirichlet(vocab_conc)
/// theta[d,] = softmax(N(0, topic_scale^2 I))
/// n[d] ~ Poisson(doc_len)
/// W[d,t] = round(n[d] * sum_k theta[d,k] vocab[k,t])
/// ```
///
pub fn simulate_corpus(args: &SimArgs) -> Result<SimOut> {
    let (ndocs, nterms, k) = (args.docs, args.terms, args.topics);
    if ndocs == 0 || nterms == 0 || k == 0 || args.doc_len <= 0.0 {
        return Err(TopicModelError::InvalidInput(
            "simulation needs positive dimensions and length".into(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(args.rseed);
    let invalid = |e: anyhow::Error| TopicModelError::InvalidInput(e.to_string());

    // Dirichlet rows by normalised Gamma draws
    let mut vocab = DMatrix::<f64>::rgamma(k, nterms, (args.vocab_conc, 1.0), &mut rng)
        .map_err(invalid)?;
    vocab.apply(|x| *x = x.max(f64::MIN_POSITIVE));
    vocab.normalize_rows_inplace();

    let topic_dists = (DMatrix::<f64>::rnorm(ndocs, k, &mut rng) * args.topic_scale).row_softmax();

    let lengths = Poisson::new(args.doc_len)
        .map_err(|e| TopicModelError::InvalidInput(e.to_string()))?;

    let rates = &topic_dists * &vocab;
    let mut triplets = vec![];
    for d in 0..ndocs {
        let n = lengths.sample(&mut rng).max(1.0);
        let nnz_before = triplets.len();
        for t in 0..nterms {
            let w = (n * rates[(d, t)]).round();
            if w > 0.0 {
                triplets.push((d, t, w));
            }
        }
        if triplets.len() == nnz_before {
            // keep every document non-empty
            let (t, _) = rates
                .row(d)
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (t, &r)| {
                    if r > best.1 {
                        (t, r)
                    } else {
                        best
                    }
                });
            triplets.push((d, t, 1.0));
        }
    }

    let data = Dataset::from_triplets(ndocs, nterms, &triplets)?;
    info!(
        "simulated {} documents, {} terms, {} topics, {} tokens",
        ndocs,
        nterms,
        k,
        data.word_count()
    );

    Ok(SimOut {
        data,
        vocab,
        topic_dists,
        triplets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_corpus_shape() -> Result<()> {
        let sim = simulate_corpus(&SimArgs {
            docs: 30,
            terms: 20,
            topics: 3,
            doc_len: 50.0,
            ..Default::default()
        })?;
        assert_eq!(sim.data.doc_count(), 30);
        assert_eq!(sim.data.term_count(), 20);
        assert!(sim.data.doc_lens().iter().all(|&n| n > 0.0));
        assert_eq!(sim.vocab.shape(), (3, 20));
        assert_eq!(sim.triplets.len(), sim.data.words().nnz());
        Ok(())
    }

    #[test]
    fn same_seed_same_corpus() -> Result<()> {
        let args = SimArgs {
            docs: 10,
            terms: 8,
            topics: 2,
            doc_len: 20.0,
            ..Default::default()
        };
        let a = simulate_corpus(&args)?;
        let b = simulate_corpus(&args)?;
        assert_eq!(a.triplets, b.triplets);
        Ok(())
    }
}
