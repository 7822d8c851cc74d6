#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use prove_worker::{info_cmd, prove_cmd};

#[derive(Parser, Debug)]
#[command(name = "prove-worker")]
#[command(about = "Run multi-threaded proofs on a background worker", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set PROVE_WORKER_LOG)
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate proofs, one per --threads value, on a single worker
    Prove {
        /// Thread pool size; repeat to run several proofs in sequence (default: hardware concurrency)
        #[arg(long = "threads", value_name = "N")]
        threads: Vec<String>,
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<std::path::PathBuf>,
        /// Circuit degree (2^degree leaves)
        #[arg(long)]
        degree: Option<u32>,
        /// Hash rounds per leaf
        #[arg(long)]
        rounds: Option<u32>,
        /// Timeout seconds (0 = none); a timed-out proof is abandoned, not cancelled
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print detected system information
    Info,
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("PROVE_WORKER_LOG").unwrap_or_else(|_| {
        if verbose { "prove_worker=debug".to_string() } else { "prove_worker=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Prove { threads, config, degree, rounds, timeout } => {
            prove_cmd::run(prove_cmd::ProveOptions {
                threads,
                config,
                degree,
                rounds,
                timeout_secs: timeout,
            })
        }
        Commands::Info => info_cmd::run(),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
