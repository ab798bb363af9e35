//! Package formula for visor.
//!
//! A [`Formula`] describes where the sources live, what the build needs and
//! how to check the result. [`Installer`] runs the guarded build and the
//! post-install smoke test.

pub mod error;
pub mod formula;
pub mod install;
pub mod verify;

pub use error::{FormulaError, InstallError};
pub use formula::{Formula, VcsRemediation};
pub use install::{install, parse_host_version, smoke_test, Installer};
pub use verify::verify_archive;
