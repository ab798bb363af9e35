//! Visor CLI binary.
//!
//! Entry point for the `visor` command-line tool. It parses arguments with
//! `clap`, initializes logging via `tracing`, and dispatches to the command
//! handlers. Formula failures exit with their own status codes.

mod cli;
mod commands;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use visor_formula::InstallError;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match commands::dispatch(args).await {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            let code = report
                .downcast_ref::<InstallError>()
                .map_or(1, InstallError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
