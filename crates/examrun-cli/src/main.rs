//! examrun CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "examrun", version, about = "Timed multiple-choice exam runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take an exam: start a session, answer, submit, and review
    Take {
        /// Path to the exam .toml file
        #[arg(long)]
        exam: PathBuf,

        /// Participant identifier (defaults to participant_id from config)
        #[arg(long)]
        participant: Option<String>,

        /// Selections as question=option pairs (e.g. "1=11,2=21")
        #[arg(long)]
        answers: Option<String>,

        /// Do not submit; let the countdown run out and auto-submit
        #[arg(long)]
        wait_for_expiry: bool,

        /// Retry once if the submission fails transiently
        #[arg(long)]
        retry: bool,

        /// Output directory (defaults to output_dir from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Review a saved result against the exam's answer key
    Review {
        /// Path to the exam .toml file
        #[arg(long)]
        exam: PathBuf,

        /// Submission result JSON written by `take`
        #[arg(long)]
        result: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Validate exam TOML files
    Validate {
        /// Path to exam file or directory
        #[arg(long)]
        exam: PathBuf,
    },

    /// Create starter config and example exam
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examrun=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            exam,
            participant,
            answers,
            wait_for_expiry,
            retry,
            output,
            config,
        } => {
            commands::take::execute(
                exam,
                participant,
                answers,
                wait_for_expiry,
                retry,
                output,
                config,
            )
            .await
        }
        Commands::Review {
            exam,
            result,
            format,
        } => commands::review::execute(exam, result, format),
        Commands::Validate { exam } => commands::validate::execute(exam),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
