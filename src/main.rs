//! neonctl CLI Entry Point
//!
//! Parses arguments, installs logging, runs the command, and is the single
//! top-level error handler: errors go to stderr (plain text, or an error
//! envelope with `--output json`) and the process exits non-zero.
//!
//! Logs go to stderr; stdout carries only command output.

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use neonctl::cli::{run, Cli};
use neonctl::output::{ErrorEnvelope, OutputFormat};
use neonctl::CtlError;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_else(|_| "neonctl=info".into()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .init();
}

fn report(err: &CtlError, command: &str, format: OutputFormat) {
    if format == OutputFormat::Json {
        let envelope = ErrorEnvelope::from_error(command, err);
        match serde_json::to_string_pretty(&envelope) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("ERROR: {}", err.message()),
        }
    } else {
        eprintln!("ERROR: {}", err.message());
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let command = cli.command.name();
    let format = cli.global.output;

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report(&err, command, format);
            1
        }
    };
    std::process::exit(code);
}
