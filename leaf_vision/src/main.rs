use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use leaf_vision::{BatchConfig, BatchPipeline, ParallelPipeline, ledger, logging};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Leaf Vision - diagnostic filter composites for a leaf photo corpus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    corpus: CorpusArgs,

    /// Log level filter, e.g. `info` or `leaf_vision=debug`. RUST_LOG overrides it.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Args, Debug, Default)]
struct CorpusArgs {
    /// Input corpus root, laid out as <class_label>/<image>
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Output root for the composites
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker count; 1 runs serially, 0 uses every CPU
    #[arg(short, long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a composite for every image in the corpus (default)
    Process,
    /// Write a dataset ledger CSV listing every image and its composite path
    Index {
        /// Ledger file to (re)write
        #[arg(long, default_value = "leaves.csv")]
        ledger: PathBuf,
    },
}

impl CorpusArgs {
    fn resolve(&self) -> anyhow::Result<BatchConfig> {
        let mut config = match &self.config {
            Some(path) => BatchConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BatchConfig::default(),
        };
        if let Some(input) = &self.input {
            config.input_root = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.corpus.resolve()?;

    match cli.command.unwrap_or(Command::Process) {
        Command::Process => {
            let workers = config.worker_count();
            let summary = if workers > 1 {
                info!("Processing with {} workers", workers);
                ParallelPipeline::new(config).run().await?
            } else {
                BatchPipeline::new(config).run()?
            };
            for failure in &summary.failures {
                info!("  failed ({:?}): {}", failure.kind, failure.path.display());
            }
        }
        Command::Index { ledger: path } => {
            let rows = ledger::build_ledger(&config.input_root, &config.output_root)?;
            ledger::write_ledger_csv(&rows, &path)?;
            info!("Ledger written to {} with {} image entries.", path.display(), rows.len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logger = match logging::setup_logging(&cli.log_level) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Logger initialization failed with {e}");
            None
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if logger.is_some() {
                error!("{e:#}");
            } else {
                eprintln!("{e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
