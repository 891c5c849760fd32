use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "siphon",
    version,
    about = "Scraping job orchestration and multi-strategy extraction engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format; overrides the config file when given
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// TOML config file (defaults to environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// CLI flag when given, otherwise the configured format
fn resolve_log_format(flag: Option<LogFormat>, configured: &str) -> &str {
    flag.map_or(configured, |format| format.as_str())
}

#[derive(Subcommand)]
enum Commands {
    /// Run the jobs in a JSON file and print their final records
    Run {
        /// JSON file with one job spec or an array of them
        #[arg(short, long)]
        jobs: PathBuf,

        /// JSON file with credentials used by auth jobs
        #[arg(long)]
        credentials: Option<PathBuf>,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print every job event to stderr as a JSON line
        #[arg(long, default_value = "false")]
        events: bool,

        /// Print Prometheus metrics after the run
        #[arg(long, default_value = "false")]
        print_metrics: bool,
    },

    /// Show which strategy `auto` would pick for a URL
    Probe {
        /// Target URL
        url: String,
    },

    /// Validate a jobs file without running it
    Validate {
        /// JSON file with one job spec or an array of them
        #[arg(short, long)]
        jobs: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let format = resolve_log_format(cli.log_format, &config.logging.format);
    setup_tracing(format, level)?;

    match cli.command {
        Commands::Run {
            jobs,
            credentials,
            output,
            events,
            print_metrics,
        } => {
            tracing::info!(
                jobs = %jobs.display(),
                workers = config.engine.workers,
                "Starting run command"
            );
            commands::run(config, jobs, credentials, output, events, print_metrics).await?;
        }

        Commands::Probe { url } => {
            tracing::info!(url = %url, "Starting probe command");
            commands::probe(config, url).await?;
        }

        Commands::Validate { jobs } => {
            commands::validate(jobs)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("siphon={level},warn")));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
