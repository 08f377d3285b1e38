use clap::Args;
use lentil::simulate::*;
use log::info;
use matrix_util::mtx_io::write_mtx_triplets;
use matrix_util::traits::IoOps;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results:\n\
		     - {out}.mtx.gz (document x term counts)\n\
		     - {out}.vocab.tsv.gz (true topic x term distributions)\n\
		     - {out}.theta.tsv.gz (true document x topic proportions)\n"
    )]
    out: Box<str>,

    #[arg(long, default_value_t = 200, help = "Number of documents")]
    docs: usize,

    #[arg(long, default_value_t = 100, help = "Number of terms")]
    terms: usize,

    #[arg(long, short = 'k', default_value_t = 10, help = "Number of topics")]
    topics: usize,

    #[arg(
        long,
        default_value_t = 500.0,
        help = "Average document length",
        long_help = "Average document length.\n\
		     Each document's length is drawn from a Poisson with this mean."
    )]
    doc_len: f64,

    #[arg(
        long,
        default_value_t = 0.1,
        help = "Dirichlet concentration of topics",
        long_help = "Symmetric Dirichlet concentration of each topic's word distribution.\n\
		     Smaller values give sparser, more distinct topics."
    )]
    vocab_conc: f64,

    #[arg(
        long,
        default_value_t = 2.0,
        help = "Scale of the topic weights",
        long_help = "Standard deviation of the normal topic weights before the softmax.\n\
		     Larger values concentrate each document on fewer topics."
    )]
    topic_scale: f64,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    rseed: u64,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let sim = simulate_corpus(&SimArgs {
        docs: args.docs,
        terms: args.terms,
        topics: args.topics,
        doc_len: args.doc_len,
        vocab_conc: args.vocab_conc,
        topic_scale: args.topic_scale,
        rseed: args.rseed,
    })?;

    let mtx_file = format!("{}.mtx.gz", args.out);
    let vocab_file = format!("{}.vocab.tsv.gz", args.out);
    let theta_file = format!("{}.theta.tsv.gz", args.out);

    write_mtx_triplets(&sim.triplets, args.docs, args.terms, &mtx_file)?;
    sim.vocab.to_tsv(&vocab_file)?;
    sim.topic_dists.to_tsv(&theta_file)?;

    info!(
        "wrote simulated data:\n{:?},\n{:?},\n{:?}",
        mtx_file, vocab_file, theta_file
    );
    Ok(())
}
