mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "Codegrade CLI - Validate, run and grade guest programs", long_about = None)]
struct Cli {
    /// Service configuration file (sandbox defaults)
    #[arg(long, global = true, default_value = "config/codegrade.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the static validator only
    Check {
        /// Guest program file
        #[arg(short, long)]
        code: PathBuf,
    },

    /// Run a program against one sample input
    Run {
        /// Guest program file
        #[arg(short, long)]
        code: PathBuf,

        /// File fed to the program as standard input
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// File holding the expected output
        #[arg(short, long)]
        expected: Option<PathBuf>,

        /// Wall-clock limit in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Grade a program against a JSON array of test cases
    Grade {
        /// Guest program file
        #[arg(short, long)]
        code: PathBuf,

        /// JSON file with the test cases
        #[arg(short = 'T', long)]
        tests: PathBuf,

        /// Points awarded when every case passes
        #[arg(short, long)]
        max_points: f64,

        /// Attempt identifier
        #[arg(short, long, default_value = "local")]
        attempt: String,

        /// Question identifier
        #[arg(short, long, default_value = "local")]
        question: String,
    },
}

fn init_tracing() {
    // Logs go to stderr so JSON on stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { code } => {
            commands::check(&cli.config, &code)?;
        }
        Commands::Run {
            code,
            input,
            expected,
            timeout_ms,
        } => {
            commands::run(
                &cli.config,
                &code,
                input.as_deref(),
                expected.as_deref(),
                timeout_ms,
            )
            .await?;
        }
        Commands::Grade {
            code,
            tests,
            max_points,
            attempt,
            question,
        } => {
            commands::grade(&cli.config, &code, &tests, max_points, &attempt, &question).await?;
        }
    }

    Ok(())
}
