mod fit_topic;
mod sim_corpus;

use clap::{Parser, Subcommand};
use fit_topic::*;
use log::info;
use sim_corpus::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Logistic-normal topic models by variational inference\n\
		  Correlated topic models with optional side-information priors.\n\
		  Corpus files are MatrixMarket (`.mtx` or `.mtx.gz`), one row per document."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Simulate a corpus from a known correlated topic model",
        long_about = "Sample topic-word distributions and logistic-normal\n\
		      topic weights, then draw documents from them.\n\
		      Writes the corpus and the true parameters."
    )]
    Simulate(SimulateArgs),

    #[command(
        about = "Train a correlated topic model",
        long_about = "Fit a correlated topic model in two stages: \n\
		      (1) Alternate M-steps and E-steps on the training corpus\n\
		      (2) Infer topic weights of held-out documents, if any.\n"
    )]
    Train(TrainArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
        Commands::Train(args) => {
            fit_topic_model(args)?;
        }
    }

    info!("Done");
    Ok(())
}
