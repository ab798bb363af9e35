//! CLI argument definitions for visor.
//!
//! Uses `clap` derive macros for the whole command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "visor",
    version,
    about = "Coordination registry for a process supervision platform",
    long_about = "visor keeps the shared state of a process supervision platform: apps, \
                  revisions, procs, environments, instances, services and runners. It also \
                  carries the package formula that builds and installs it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub coordinator: CoordinatorArgs,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Where the registry lives. Unset values come from `~/.visor/config.toml`.
#[derive(Args, Debug, Clone, Default)]
pub struct CoordinatorArgs {
    /// Coordinator URI (`file:<path>` or `mem:`)
    #[arg(long, env = "VISOR_URI", global = true)]
    pub uri: Option<String>,

    /// Registry root inside the coordinator
    #[arg(long, env = "VISOR_ROOT", global = true)]
    pub root: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the registry
    Init,

    /// Manage applications
    App {
        #[command(subcommand)]
        action: AppAction,
    },

    /// Manage revisions of an application
    #[command(alias = "rev")]
    Revision {
        #[command(subcommand)]
        action: RevisionAction,
    },

    /// Manage proc types of an application
    Proc {
        #[command(subcommand)]
        action: ProcAction,
    },

    /// Inspect and stop instances
    #[command(alias = "ins")]
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },

    /// Set the number of instances of a proc at a revision
    Scale {
        app: String,
        rev: String,
        proc: String,
        /// Target number of instances
        #[arg(allow_negative_numbers = true)]
        factor: i64,
        /// Environment the new instances run with
        #[arg(long, default_value = "default")]
        env: String,
    },

    /// Manage services
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Manage service endpoints
    Endpoint {
        #[command(subcommand)]
        action: EndpointAction,
    },

    /// Inspect registered runners
    Runner {
        #[command(subcommand)]
        action: RunnerAction,
    },

    /// Print registry events as they happen
    Watch {
        /// Also print changes that map to no known event
        #[arg(long)]
        raw: bool,
        /// Start after this revision instead of the current one
        #[arg(long)]
        since: Option<i64>,
        /// Stop after this many seconds without a change
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Build, install and check visor from its formula
    Formula {
        /// Formula file (default: the nearest `Formula.toml`, else the built-in formula)
        #[arg(long, global = true)]
        file: Option<PathBuf>,

        #[command(subcommand)]
        action: FormulaAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum AppAction {
    /// List registered apps
    List,
    /// Register a new app
    Register {
        name: String,
        /// Source repository URL
        #[arg(long)]
        repo: String,
        /// Runtime stack
        #[arg(long)]
        stack: String,
        /// Deploy type (default: lxc)
        #[arg(long)]
        deploy_type: Option<String>,
    },
    /// Show an app's attributes, procs and revisions
    Describe { name: String },
    /// Remove an app and everything below it
    Unregister { name: String },
    /// Print an app's environment variables
    Env { name: String },
    /// Print one environment variable
    Getenv { name: String, key: String },
    /// Set an environment variable
    Setenv {
        name: String,
        key: String,
        value: String,
    },
    /// Delete an environment variable
    Delenv { name: String, key: String },
    /// Print the head revision, or set it when REV is given
    Head { name: String, rev: Option<String> },
    /// List an app's revisions
    Revisions { name: String },
    /// List an app's instances
    Instances { name: String },
}

#[derive(Subcommand, Debug)]
pub enum RevisionAction {
    /// Register a revision
    Register {
        app: String,
        rev: String,
        /// Where the build archive for this revision lives
        #[arg(long)]
        archive_url: String,
    },
    /// Show a revision
    Describe { app: String, rev: String },
    /// Exit with status 0 when the revision is registered, 1 otherwise
    Exists { app: String, rev: String },
    /// Remove a revision
    Unregister { app: String, rev: String },
    /// List the instances running a revision
    Instances { app: String, rev: String },
}

#[derive(Subcommand, Debug)]
pub enum ProcAction {
    /// Register a proc type and give it a port
    Register {
        app: String,
        name: String,
        /// Memory limit per instance, in MB
        #[arg(long)]
        memory_limit_mb: Option<i64>,
    },
    /// Remove a proc type
    Unregister { app: String, name: String },
    /// Show a proc type
    Describe { app: String, name: String },
    /// List a proc's live, failed and lost instances
    Instances { app: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum InstanceAction {
    /// Show an instance
    Describe { id: i64 },
    /// Request an instance to stop
    Stop { id: i64 },
    /// List the hosts that claimed an instance
    Claims { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Register a service
    Register { name: String },
    /// Remove a service and its endpoints
    Unregister { name: String },
    /// List registered services
    List,
    /// Show a service and its endpoints
    Describe { name: String },
}

#[derive(Subcommand, Debug)]
pub enum EndpointAction {
    /// Register an endpoint for a service
    Register {
        service: String,
        addr: String,
        port: u16,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        #[arg(long, default_value_t = 0)]
        weight: i64,
    },
    /// Remove an endpoint from a service
    Unregister {
        service: String,
        addr: String,
        port: u16,
    },
}

#[derive(Subcommand, Debug)]
pub enum RunnerAction {
    /// List runners, optionally only those on one host
    List {
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FormulaAction {
    /// Build from unpacked sources and install
    Install {
        /// Directory holding the unpacked sources
        #[arg(long, default_value = ".")]
        buildpath: PathBuf,
        /// Install prefix; binaries go to `<prefix>/bin`
        #[arg(long)]
        prefix: PathBuf,
    },
    /// Run the installed binary's smoke test
    Test {
        #[arg(long)]
        prefix: PathBuf,
    },
    /// Print the formula as a Ruby recipe
    Render,
    /// Check a downloaded archive against the formula's sha256
    Verify { archive: PathBuf },
}

pub fn parse() -> Cli {
    Cli::parse()
}
