mod config;
mod router;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use v8worker::{PrintTarget, Worker, WorkerError};

use crate::config::FlagOverrides;
use crate::router::ConsoleRouter;

/// Exit status for scripts that fail to compile.
const EXIT_COMPILE_ERROR: u8 = 65;

/// Run scripts in an isolated V8 worker
#[derive(Parser, Debug)]
#[command(name = "v8worker")]
#[command(about = "Run scripts in an isolated V8 worker", long_about = None)]
struct Args {
    /// Scripts to load, in order, into one worker
    #[arg(required = true)]
    scripts: Vec<PathBuf>,

    /// Config file (defaults to ./v8worker.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print outbound messages as JSON lines
    #[arg(long)]
    json: bool,

    /// After loading, deliver each stdin line to the script's $recv handler
    #[arg(long)]
    stdin: bool,

    /// Per-command execution deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// V8 heap limit in megabytes
    #[arg(long)]
    max_heap_mb: Option<usize>,

    /// Send $print output to the log instead of stdout
    #[arg(long)]
    print_to_log: bool,
}

impl Args {
    fn overrides(&self) -> FlagOverrides {
        FlagOverrides {
            max_heap_size: self.max_heap_mb.map(|mb| mb * 1024 * 1024),
            execution_timeout_ms: self.timeout_ms,
            print: self.print_to_log.then_some(PrintTarget::Log),
        }
    }
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries script output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("v8worker=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    // Initialize V8 on the main thread before any worker exists.
    v8worker::init_platform();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let config = config::load(args.config.as_deref(), &args.overrides())?;
    info!("Starting v8worker (V8 {})", v8worker::version());

    let router = ConsoleRouter::new(config.worker.name.clone(), args.json, config.replies);
    let worker = Worker::with_config(config.worker, router)?;

    for path in &args.scripts {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        if let Err(e) = worker.load(&path.display().to_string(), &source) {
            eprint!("{}", with_newline(worker.last_exception()));
            return Ok(match e {
                WorkerError::Compile(_) => ExitCode::from(EXIT_COMPILE_ERROR),
                _ => ExitCode::FAILURE,
            });
        }
    }

    if args.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("failed to read stdin")?;
            if let Err(e) = worker.send(&line) {
                warn!("Delivery failed: {}", e.diagnostic().trim_end());
            }
        }
    }

    worker.dispose()?;
    Ok(ExitCode::SUCCESS)
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
