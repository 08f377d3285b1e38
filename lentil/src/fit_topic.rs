use clap::{Args, ValueEnum};
use lentil::*;
use log::info;
use matrix_util::common_io::write_lines;
use matrix_util::mtx_io::read_mtx_triplets;
use matrix_util::sparse_util::csr_from_triplets;
use matrix_util::traits::IoOps;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::ThreadPoolBuilder;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum BoundArg {
    Bouchard,
    Bohning,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum CovArg {
    Sample,
    Oas,
    Niw,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum SideArg {
    Features,
    Links,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        required = true,
        help = "Corpus file",
        long_help = "MatrixMarket file of word counts (.mtx or .mtx.gz).\n\
		     Rows are documents and columns are terms, unless `--transpose`."
    )]
    data_file: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results:\n\
		     - {out}.vocab.tsv.gz (topic x term)\n\
		     - {out}.topic_mean.tsv.gz (topic)\n\
		     - {out}.sigma.tsv.gz (topic x topic)\n\
		     - {out}.theta.tsv.gz (document x topic)\n\
		     - {out}.trace.tsv.gz (checkpoints)\n\
		     - {out}.heldout_theta.tsv.gz (held-out document x topic)\n"
    )]
    out: Box<str>,

    #[arg(long, short = 'k', default_value_t = 10, help = "Number of topics")]
    num_topics: usize,

    #[arg(
        long,
        help = "Corpus is term x document",
        long_help = "Read the corpus (and held-out corpus) as term x document\n\
		     and transpose it on the way in."
    )]
    transpose: bool,

    #[arg(
        long,
        short = 'i',
        default_value_t = 100,
        help = "Maximum number of iterations"
    )]
    iterations: usize,

    #[arg(
        long,
        default_value_t = 5,
        help = "Checkpoint frequency",
        long_help = "Evaluate the bound and perplexity every this many iterations.\n\
		     Early stopping is only considered at checkpoints."
    )]
    log_frequency: usize,

    #[arg(long, default_value_t = 30, help = "No early stopping before this iteration")]
    min_iterations: usize,

    #[arg(
        long,
        default_value_t = 1.0,
        help = "Perplexity tolerance",
        long_help = "Stop once perplexity improves by less than this\n\
		     between two checkpoints."
    )]
    perplexity_tolerance: f64,

    #[arg(long, default_value_t = 1e-6, help = "Relative bound tolerance")]
    epsilon: f64,

    #[arg(
        long,
        value_enum,
        default_value = "bouchard",
        help = "Bound on the softmax normaliser"
    )]
    bound: BoundArg,

    #[arg(
        long,
        help = "Update the Bouchard offset",
        long_help = "Optimise the per-document offset of the Bouchard bound\n\
		     instead of keeping it at zero."
    )]
    update_offset: bool,

    #[arg(
        long,
        value_enum,
        default_value = "sample",
        help = "Topic covariance estimator",
        long_help = "Topic covariance estimator:\n\
		     - sample: maximum likelihood\n\
		     - oas: oracle approximating shrinkage\n\
		     - niw: MAP under a Normal-Inverse-Wishart prior\n"
    )]
    covariance: CovArg,

    #[arg(
        long,
        help = "Diagonal covariance",
        long_help = "Keep only the diagonal of the topic covariance and\n\
		     update document means element-wise. Faster, less accurate."
    )]
    fast: bool,

    #[arg(long, help = "Re-centre document means on the first topic")]
    recenter: bool,

    #[arg(long, help = "Start topic 0 at the corpus term frequencies")]
    background_topic: bool,

    #[arg(long, default_value_t = 1.1, help = "Dirichlet pseudo-count of the vocabulary")]
    vocab_prior: f64,

    #[arg(
        long,
        help = "Side-information file",
        long_help = "MatrixMarket file of document features (document x feature)\n\
		     or document links (document x document) informing\n\
		     each document's prior mean."
    )]
    side_file: Option<Box<str>>,

    #[arg(long, value_enum, default_value = "features", help = "Kind of side information")]
    side_kind: SideArg,

    #[arg(long, default_value_t = 5, help = "Latent rank of the side features")]
    latent_features: usize,

    #[arg(long, default_value_t = 5, help = "Latent rank of the side topics")]
    latent_topics: usize,

    #[arg(
        long,
        help = "Held-out corpus file",
        long_help = "MatrixMarket file of held-out documents; topic weights\n\
		     are inferred with the trained model held fixed."
    )]
    heldout_file: Option<Box<str>>,

    #[arg(long, help = "Side-information file of the held-out corpus")]
    heldout_side_file: Option<Box<str>>,

    #[arg(
        long,
        help = "Fraction of documents to hold out",
        long_help = "Randomly hold out this fraction of the corpus instead\n\
		     of reading a separate held-out file."
    )]
    heldout_frac: Option<f64>,

    #[arg(
        long,
        help = "Abort after persistent NaN/Inf",
        long_help = "Fail once NaN/Inf persist for this many consecutive\n\
		     checkpoints, instead of logging and carrying on."
    )]
    abort_patience: Option<usize>,

    #[arg(long, help = "Verify the bound after every update")]
    debug: bool,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    rseed: u64,

    #[arg(
        long,
        default_value_t = 16,
        help = "Maximum number of threads",
        long_help = "Maximum number of threads to use for parallel processing. \n\
		     Choose the right number in HPC environments."
    )]
    max_threads: usize,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

fn read_csr(file: &str) -> anyhow::Result<CsrMatrix<f64>> {
    let (triplets, (nrow, ncol, _)) = read_mtx_triplets(file)?;
    csr_from_triplets(nrow, ncol, &triplets)
}

fn read_corpus(
    file: &str,
    transpose: bool,
    side: Option<(&str, SideSource)>,
) -> anyhow::Result<Dataset> {
    let data = Dataset::from_mtx(file, transpose)?;
    info!(
        "{}: {} documents x {} terms, {} tokens",
        file,
        data.doc_count(),
        data.term_count(),
        data.word_count()
    );
    Ok(match side {
        Some((side_file, SideSource::Features)) => data.with_feats(read_csr(side_file)?)?,
        Some((side_file, SideSource::Links)) => data.with_links(read_csr(side_file)?)?,
        None => data,
    })
}

fn model_config(args: &TrainArgs, side: Option<SideSource>) -> ModelConfig {
    let bound = match args.bound {
        BoundArg::Bouchard => BoundKind::Bouchard {
            update_offset: args.update_offset,
        },
        BoundArg::Bohning => BoundKind::Bohning,
    };

    let prior = PriorConfig {
        covariance: match args.covariance {
            CovArg::Oas => CovEstimator::Oas,
            _ => CovEstimator::Sample,
        },
        niw: (args.covariance == CovArg::Niw).then(|| NiwPrior::for_topics(args.num_topics)),
        recenter_means: args.recenter,
    };

    ModelConfig {
        num_topics: args.num_topics,
        bound,
        vocab_prior: args.vocab_prior,
        prior,
        side_info: side
            .map(|source| SideInfoConfig::new(source, args.latent_features, args.latent_topics)),
        background_topic: args.background_topic,
        ..Default::default()
    }
}

fn write_trace(trace: &BoundTrace, file: &str) -> anyhow::Result<()> {
    let mut lines: Vec<Box<str>> = vec!["iteration\tbound\tlog_likelihood\tperplexity".into()];
    for i in 0..trace.len() {
        lines.push(
            format!(
                "{}\t{}\t{}\t{}",
                trace.iterations[i] + 1,
                trace.bounds[i],
                trace.likelihoods[i],
                trace.perplexities[i]
            )
            .into_boxed_str(),
        );
    }
    write_lines(&lines, file)
}

pub fn fit_topic_model(args: &TrainArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let max_threads = num_cpus::get().min(args.max_threads).max(1);
    ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build_global()?;
    info!("will use {} threads", rayon::current_num_threads());

    if args.heldout_file.is_some() && args.heldout_frac.is_some() {
        return Err(anyhow::anyhow!(
            "use either a held-out file or a held-out fraction, not both"
        ));
    }

    let side_kind = match args.side_kind {
        SideArg::Features => SideSource::Features,
        SideArg::Links => SideSource::Links,
    };
    let side = args.side_file.as_deref().map(|f| (f, side_kind));

    let mut rng = StdRng::seed_from_u64(args.rseed);

    // 1. Read the training and held-out corpora
    let corpus = read_corpus(&args.data_file, args.transpose, side)?;

    let (data, heldout) = match (&args.heldout_file, args.heldout_frac) {
        (Some(file), _) => {
            let held_side = match (args.heldout_side_file.as_deref(), side) {
                (Some(f), Some(_)) => Some((f, side_kind)),
                (None, Some(_)) => {
                    return Err(anyhow::anyhow!(
                        "held-out documents need their own side-information file"
                    ))
                }
                _ => None,
            };
            let held = read_corpus(file, args.transpose, held_side)?;
            (corpus, Some(held))
        }
        (None, Some(frac)) => {
            let (train, held) = corpus.split_holdout(frac, &mut rng)?;
            info!(
                "held out {} of {} documents",
                held.doc_count(),
                held.doc_count() + train.doc_count()
            );
            (train, Some(held))
        }
        (None, None) => (corpus, None),
    };

    // 2. Train
    let config = model_config(args, side.map(|(_, s)| s));
    let model = ModelState::new_at_random(&data, &config, &mut rng)?;
    let state = QueryState::new(&data, &model, &mut rng)?;

    let plan = TrainPlan {
        iterations: args.iterations,
        epsilon: args.epsilon,
        log_frequency: args.log_frequency,
        fast_but_inaccurate: args.fast,
        debug: args.debug,
        min_iterations: args.min_iterations,
        perplexity_tolerance: args.perplexity_tolerance,
        anomaly_policy: match args.abort_patience {
            Some(patience) => AnomalyPolicy::Abort { patience },
            None => AnomalyPolicy::Log,
        },
        show_progress: true,
        verbose: args.verbose,
    };

    let TrainOutput {
        model,
        query: state,
        trace,
    } = train(&data, model, state, &plan)?;

    info!(
        "stopped after {} checkpoints ({:?}), {} anomalies",
        trace.len(),
        trace.stop_reason,
        trace.anomalies.len()
    );

    // 3. Write out the model and the topic weights
    let k = model.num_topics();
    model.vocab().to_tsv(&format!("{}.vocab.tsv.gz", args.out))?;
    DMatrix::from_column_slice(k, 1, model.topic_mean().as_slice())
        .to_tsv(&format!("{}.topic_mean.tsv.gz", args.out))?;
    model.sig_t().to_tsv(&format!("{}.sigma.tsv.gz", args.out))?;
    state.topic_dists().to_tsv(&format!("{}.theta.tsv.gz", args.out))?;
    write_trace(&trace, &format!("{}.trace.tsv.gz", args.out))?;

    // 4. Held-out documents
    if let Some(held) = heldout {
        let fresh = QueryState::new(&held, &model, &mut rng)?;
        let out = query(&held, &model, fresh, &QueryPlan::from(&plan))?;
        info!(
            "held-out perplexity {:.4}",
            perplexity(&held, &model, &out.query)?
        );
        out.query
            .topic_dists()
            .to_tsv(&format!("{}.heldout_theta.tsv.gz", args.out))?;
    }

    info!("wrote results to {}.*", args.out);
    Ok(())
}
