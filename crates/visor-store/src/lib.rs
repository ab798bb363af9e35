//! Revisioned coordinator tree backing the visor registry.
//!
//! The tree is hierarchical, every mutation bumps a global revision, and any
//! path can be read as of an earlier revision. Two coordinators are provided:
//! [`MemCoordinator`] for a single process and [`DiskCoordinator`] which
//! shares state through a JSON document.

pub mod codec;
pub mod conn;
pub mod coordinator;
pub mod dir;
pub mod disk;
pub mod error;
pub mod file;
pub mod mem;
pub mod path;
pub mod snapshot;
pub mod tree;

pub use codec::{ByteCodec, Codec, IntCodec, JsonCodec, ListCodec, StringCodec};
pub use conn::{Conn, DEFAULT_ROOT};
pub use coordinator::{dial, Coordinator};
pub use dir::{get_snapshotables, Dir};
pub use disk::DiskCoordinator;
pub use error::{StoreError, StoreResult};
pub use file::File;
pub use mem::MemCoordinator;
pub use snapshot::Snapshot;
pub use tree::{RawEvent, RawEventKind};

/// Guard revision that overwrites unconditionally.
pub const CLOBBER: i64 = -1;
/// Revision reported for missing files.
pub const MISSING: i64 = 0;
/// Revision reported by `stat` for directories.
pub const DIR_REV: i64 = -2;
