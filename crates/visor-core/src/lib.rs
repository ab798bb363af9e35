//! The visor registry.
//!
//! Applications, their revisions, procs and environments, the instances
//! that run them, and the services, endpoints and runners around them, all
//! stored in a revisioned coordinator tree. Start from [`Store`].

pub mod app;
pub mod config;
pub mod endpoint;
pub mod env;
pub mod error;
pub mod event;
pub mod instance;
pub mod proc;
pub mod revision;
pub mod runner;
pub mod scale;
pub mod schema;
pub mod service;
pub mod store;
pub mod time;

pub use app::App;
pub use config::GlobalConfig;
pub use endpoint::Endpoint;
pub use env::Env;
pub use error::{RegistryError, RegistryResult};
pub use event::{enrich_event, Event, EventKind, EventPath, EventSource, EventWatcher};
pub use instance::{InsStatus, Instance, InstanceWatch};
pub use proc::{Proc, ProcAttrs, ResourceLimits};
pub use revision::Revision;
pub use runner::{
    Network, Runner, RunnerClient, RunnerEvent, RunnerStatus, RunnerWatch, TcpNetwork,
};
pub use scale::ScaleChange;
pub use schema::{
    get_schema_version, set_schema_version, verify_schema_version, watch_schema, SchemaWatch,
    SCHEMA_VERSION,
};
pub use service::Service;
pub use store::Store;
