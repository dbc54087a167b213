//! cogbench CLI: evaluate generated questions and summarize the results.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cogbench",
    version,
    about = "Deterministic Bloom's-taxonomy constraint benchmark"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a generation batch against the constraint registry
    Evaluate {
        /// Generation batch JSON file
        #[arg(long)]
        generations: PathBuf,

        /// Passage JSON file or directory
        #[arg(long)]
        passages: PathBuf,

        /// Output directory (default: `output_dir` from the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Questions evaluated concurrently
        #[arg(long)]
        parallelism: Option<usize>,

        /// Reuse records from an interrupted run's checkpoint
        #[arg(long)]
        resume: bool,
    },

    /// Compute metrics over evaluation batches
    Metrics {
        /// Evaluation batch files or directories of `*_eval.json`
        #[arg(long, required = true, num_args = 1..)]
        evaluations: Vec<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the constraints applied per level and mode
    Constraints {
        /// Level number (1-6) or name
        #[arg(long)]
        level: Option<String>,

        /// standard or adversarial
        #[arg(long)]
        mode: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check passages, generations and configuration without evaluating
    Validate {
        /// Passage JSON file or directory
        #[arg(long)]
        passages: PathBuf,

        /// Generation batch JSON file
        #[arg(long)]
        generations: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cogbench=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            generations,
            passages,
            output,
            config,
            parallelism,
            resume,
        } => {
            commands::evaluate::execute(generations, passages, output, config, parallelism, resume)
                .await
        }
        Commands::Metrics {
            evaluations,
            format,
            output,
            config,
        } => commands::metrics::execute(evaluations, format, output, config),
        Commands::Constraints {
            level,
            mode,
            config,
        } => commands::constraints::execute(level, mode, config),
        Commands::Validate {
            passages,
            generations,
            config,
        } => commands::validate::execute(passages, generations, config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
