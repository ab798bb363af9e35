//! Command dispatch and handler modules.

mod app;
mod endpoint;
mod formula;
mod init;
mod instance;
mod proc_;
mod revision;
mod runner;
mod scale;
mod service;
mod watch;

use std::process::ExitCode;

use miette::Result;
use visor_core::{verify_schema_version, GlobalConfig, Store, SCHEMA_VERSION};

use crate::cli::{Cli, Command, CoordinatorArgs};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let coord = cli.coordinator;
    match cli.command {
        Command::Init => init::exec(&coord)?,
        Command::App { action } => app::exec(&coord, action)?,
        Command::Revision { action } => return revision::exec(&coord, action),
        Command::Proc { action } => proc_::exec(&coord, action)?,
        Command::Instance { action } => instance::exec(&coord, action)?,
        Command::Scale {
            app,
            rev,
            proc,
            factor,
            env,
        } => scale::exec(&coord, &app, &rev, &proc, factor, &env)?,
        Command::Service { action } => service::exec(&coord, action)?,
        Command::Endpoint { action } => endpoint::exec(&coord, action)?,
        Command::Runner { action } => runner::exec(&coord, action)?,
        Command::Watch {
            raw,
            since,
            timeout,
        } => watch::exec(&coord, raw, since, timeout).await?,
        Command::Formula { file, action } => formula::exec(file.as_deref(), action)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Resolve `--uri`/`--root`, falling back to the global config.
pub(crate) fn coordinator(args: &CoordinatorArgs) -> Result<(String, String)> {
    let config = GlobalConfig::load()?.coordinator;
    Ok((
        args.uri.clone().unwrap_or(config.uri),
        args.root.clone().unwrap_or(config.root),
    ))
}

/// Dial the registry and make sure it speaks our schema version.
pub(crate) fn connect(args: &CoordinatorArgs) -> Result<Store> {
    let (uri, root) = coordinator(args)?;
    tracing::debug!(%uri, %root, "dialing coordinator");
    let store = Store::dial(&uri, &root)?;
    verify_schema_version(store.snapshot(), SCHEMA_VERSION)?;
    Ok(store)
}

/// `-` for an empty value.
pub(crate) fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
