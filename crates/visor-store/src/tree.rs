//! The versioned tree shared by every coordinator implementation.
//!
//! Each path keeps its full history as a list of versions in ascending
//! revision order, so any read can be answered as of an earlier revision.
//! A deletion is recorded as a version without a body. Every mutation is
//! also appended to an event log which backs `wait`.

use std::collections::{BTreeMap, BTreeSet};

use globset::GlobMatcher;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::path::validate_path;
use crate::{CLOBBER, DIR_REV, MISSING};

/// Event log length that triggers compaction.
pub const MAX_LOG: usize = 10_000;
/// Revisions kept readable after compaction.
pub const KEEP_REVS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawEventKind {
    Set,
    Del,
}

/// A single mutation of the tree, as observed by `wait`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub rev: i64,
    pub path: String,
    #[serde(with = "body")]
    pub body: Vec<u8>,
    pub kind: RawEventKind,
}

impl RawEvent {
    pub fn is_set(&self) -> bool {
        self.kind == RawEventKind::Set
    }

    pub fn is_del(&self) -> bool {
        self.kind == RawEventKind::Del
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Version {
    rev: i64,
    #[serde(with = "opt_body")]
    body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    rev: i64,
    #[serde(default)]
    floor: i64,
    #[serde(default)]
    files: BTreeMap<String, Vec<Version>>,
    #[serde(default)]
    log: Vec<RawEvent>,
}

impl Tree {
    pub fn rev(&self) -> i64 {
        self.rev
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Oldest revision still readable.
    pub fn floor(&self) -> i64 {
        self.floor
    }

    fn check_floor(&self, at: Option<i64>) -> StoreResult<()> {
        match at {
            Some(rev) if rev < self.floor => Err(StoreError::RevTooOld {
                rev,
                floor: self.floor,
            }),
            _ => Ok(()),
        }
    }

    fn version_at(&self, path: &str, at: Option<i64>) -> Option<&Version> {
        let history = self.files.get(path)?;
        match at {
            None => history.last(),
            Some(rev) => history.iter().rev().find(|v| v.rev <= rev),
        }
    }

    fn live_at(&self, path: &str, at: Option<i64>) -> Option<(&[u8], i64)> {
        let version = self.version_at(path, at)?;
        version.body.as_deref().map(|b| (b, version.rev))
    }

    fn file_rev(&self, path: &str) -> i64 {
        self.live_at(path, None).map(|(_, r)| r).unwrap_or(MISSING)
    }

    fn dir_prefix(path: &str) -> String {
        if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        }
    }

    /// Names of the direct children of `path` that are live at `at`.
    fn children(&self, path: &str, at: Option<i64>) -> BTreeSet<String> {
        let prefix = Self::dir_prefix(path);
        self.files
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| self.live_at(p, at).is_some())
            .filter_map(|(p, _)| p[prefix.len()..].split('/').next().map(str::to_string))
            .collect()
    }

    pub fn get(&self, path: &str, at: Option<i64>) -> StoreResult<(Option<Vec<u8>>, i64)> {
        validate_path(path)?;
        self.check_floor(at)?;
        Ok(match self.live_at(path, at) {
            Some((body, rev)) => (Some(body.to_vec()), rev),
            None => (None, MISSING),
        })
    }

    pub fn set(&mut self, path: &str, guard: i64, body: &[u8]) -> StoreResult<i64> {
        validate_path(path)?;
        if !self.children(path, None).is_empty() {
            return Err(StoreError::IsDir(path.to_string()));
        }
        self.check_guard(path, guard)?;
        self.rev += 1;
        let rev = self.rev;
        self.files.entry(path.to_string()).or_default().push(Version {
            rev,
            body: Some(body.to_vec()),
        });
        self.log.push(RawEvent {
            rev,
            path: path.to_string(),
            body: body.to_vec(),
            kind: RawEventKind::Set,
        });
        Ok(rev)
    }

    pub fn del(&mut self, path: &str, guard: i64) -> StoreResult<i64> {
        validate_path(path)?;
        if self.file_rev(path) == MISSING {
            return Err(StoreError::NoEnt {
                path: path.to_string(),
                at: None,
            });
        }
        self.check_guard(path, guard)?;
        self.rev += 1;
        let rev = self.rev;
        self.files
            .entry(path.to_string())
            .or_default()
            .push(Version { rev, body: None });
        self.log.push(RawEvent {
            rev,
            path: path.to_string(),
            body: Vec::new(),
            kind: RawEventKind::Del,
        });
        Ok(rev)
    }

    fn check_guard(&self, path: &str, guard: i64) -> StoreResult<()> {
        if guard == CLOBBER {
            return Ok(());
        }
        let current = self.file_rev(path);
        if current > guard {
            return Err(StoreError::RevMismatch {
                path: path.to_string(),
                current,
                guard,
            });
        }
        Ok(())
    }

    pub fn stat(&self, path: &str, at: Option<i64>) -> StoreResult<(usize, i64)> {
        validate_path(path)?;
        self.check_floor(at)?;
        if let Some((body, rev)) = self.live_at(path, at) {
            return Ok((body.len(), rev));
        }
        let children = self.children(path, at);
        if children.is_empty() {
            Ok((0, MISSING))
        } else {
            Ok((children.len(), DIR_REV))
        }
    }

    pub fn getdir(&self, path: &str, at: Option<i64>) -> StoreResult<Vec<String>> {
        validate_path(path)?;
        self.check_floor(at)?;
        let children = self.children(path, at);
        if children.is_empty() {
            return Err(StoreError::NoEnt {
                path: path.to_string(),
                at,
            });
        }
        Ok(children.into_iter().collect())
    }

    /// First logged event at or after `from_rev` whose path matches.
    pub fn first_event(&self, matcher: &GlobMatcher, from_rev: i64) -> Option<RawEvent> {
        let start = self.log.partition_point(|e| e.rev < from_rev);
        self.log[start..]
            .iter()
            .find(|e| matcher.is_match(&e.path))
            .cloned()
    }

    /// Drop history older than `horizon`.
    ///
    /// The latest version below the horizon is kept for every path so reads
    /// at or after the horizon are unaffected. Reads below it fail with
    /// `RevTooOld`.
    pub fn compact(&mut self, horizon: i64) {
        if horizon <= self.floor {
            return;
        }
        self.log.retain(|e| e.rev >= horizon);
        self.files.retain(|_, history| {
            let keep_from = history
                .iter()
                .rposition(|v| v.rev < horizon)
                .unwrap_or(0);
            history.drain(..keep_from);
            !(history.len() == 1 && history[0].body.is_none() && history[0].rev < horizon)
        });
        self.floor = horizon;
    }

    /// Compact down to the last [`KEEP_REVS`] revisions once the event log
    /// grows past [`MAX_LOG`]. Returns whether anything was dropped.
    pub fn trim_history(&mut self) -> bool {
        if self.log.len() <= MAX_LOG {
            return false;
        }
        self.compact(self.rev - KEEP_REVS);
        true
    }
}

/// Bodies are stored as strings when they are valid UTF-8, which keeps the
/// on-disk registry readable, and as byte arrays otherwise.
mod body {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    pub(super) enum Repr {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub(super) fn to_repr(bytes: &[u8]) -> Repr {
        match std::str::from_utf8(bytes) {
            Ok(s) => Repr::Text(s.to_string()),
            Err(_) => Repr::Bytes(bytes.to_vec()),
        }
    }

    pub(super) fn from_repr(repr: Repr) -> Vec<u8> {
        match repr {
            Repr::Text(s) => s.into_bytes(),
            Repr::Bytes(b) => b,
        }
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        to_repr(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Repr::deserialize(d).map(from_repr)
    }
}

mod opt_body {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::body::{from_repr, to_repr, Repr};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        bytes.as_deref().map(to_repr).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<Repr>::deserialize(d).map(|r| r.map(from_repr))
    }
}
