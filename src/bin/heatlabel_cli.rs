//! HeatLabel CLI - render one label per invocation
//!
//! Commands: check, print
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 1 on configuration failure, 2 on job failure
//! Under the preserve policy the job's leftover files are listed as `artifacts`

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use heatlabel_core::{CleanupPolicy, Job, Pipeline, PipelineConfig, PrintManifest};

#[derive(Parser)]
#[command(name = "heatlabel-cli")]
#[command(about = "HeatLabel CLI - spreadsheet template to print-ready PNG")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the resolved settings
    Check,

    /// Render one label
    Print {
        /// Job number printed in the number placeholder
        #[arg(long)]
        id: i64,

        /// Heat (melt) value printed in the heat placeholder
        #[arg(long)]
        heat: f64,

        /// Template label, e.g. `1` for `1.xlsx`
        #[arg(short, long)]
        label: String,

        /// Override the configured cleanup policy (preserve | aggressive)
        #[arg(long)]
        cleanup: Option<CleanupPolicy>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let config = match PipelineConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            let output = serde_json::json!({ "valid": false, "error": e.to_string() });
            println!("{}", output);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Check => {
            let output = serde_json::json!({ "valid": true, "config": config });
            match serde_json::to_string_pretty(&output) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("failed to render configuration: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }

        Commands::Print {
            id,
            heat,
            label,
            cleanup,
        } => {
            let config = match cleanup {
                Some(policy) => config.with_cleanup(policy),
                None => config,
            };
            let pipeline = Pipeline::new(config.into_shared());
            let job = Job::new(id, heat, label);

            let outcome = match pipeline.run(job.clone()) {
                Ok(outcome) => outcome,
                Err(failure) => {
                    let output = serde_json::json!({
                        "success": false,
                        "error": failure.to_string(),
                        "artifacts": failure.artifacts(),
                    });
                    println!("{}", output);
                    return ExitCode::from(2);
                }
            };

            match PrintManifest::for_image(&job, outcome.image()) {
                Ok(manifest) => {
                    let output = serde_json::json!({
                        "success": true,
                        "manifest": manifest,
                        "artifacts": outcome.artifacts(),
                    });
                    println!("{}", output);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    let output = serde_json::json!({
                        "success": false,
                        "error": format!("rendered image unreadable: {}", e),
                        "artifacts": outcome.artifacts(),
                    });
                    println!("{}", output);
                    ExitCode::from(2)
                }
            }
        }
    }
}
