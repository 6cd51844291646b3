//! Store type definitions
//!
//! The persisted index shape and the records handed back to callers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::fingerprint::{DataShape, Fingerprint, Signature};

/// Current index schema version; older versions are migrated on load
pub const SCHEMA_VERSION: u32 = 3;

/// Label used when a caller supplies no usable label
pub const ANONYMOUS_LABEL: &str = "_anonymous_";

// =========================================================================
// Artifacts
// =========================================================================

/// A generated widget plus the metadata it was produced from
///
/// Artifacts are immutable once saved; an edit produces a new artifact whose
/// `revision_parent` points at the fingerprint it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    pub fingerprint: Fingerprint,
    pub description: String,
    #[serde(default)]
    pub data_shape: Option<DataShape>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub exports_signature: Signature,
    #[serde(default)]
    pub imports_signature: Signature,
    #[serde(default)]
    pub theme_signature: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_path: Option<String>,
    /// Named sub-components parsed out of the code (informational only)
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub revision_parent: Option<Fingerprint>,
    /// Position of this artifact in its label's history, starting at 1
    #[serde(default = "default_version")]
    pub version: u32,
    /// Validation issues the generation loop could not repair
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl Artifact {
    /// Whether the code passed validation when it was generated
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// An artifact together with where it lives in the index
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedArtifact {
    pub label: String,
    /// Index within the label's newest-first list (0 = most recent)
    pub position: usize,
    pub artifact: Artifact,
}

impl std::ops::Deref for LocatedArtifact {
    type Target = Artifact;

    fn deref(&self) -> &Artifact {
        &self.artifact
    }
}

// =========================================================================
// Index
// =========================================================================

/// Where a fingerprint lives: `label/position`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLocation {
    pub label: String,
    pub position: usize,
}

impl fmt::Display for IndexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.label, self.position)
    }
}

impl FromStr for IndexLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, position) = s
            .rsplit_once('/')
            .ok_or_else(|| format!("invalid index location '{}'", s))?;
        let position = position
            .parse()
            .map_err(|_| format!("invalid position in index location '{}'", s))?;
        Ok(Self {
            label: label.to_string(),
            position,
        })
    }
}

impl Serialize for IndexLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IndexLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Rollup metadata, recomputed from the label lists on every save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub total_count: usize,
    pub oldest_created: Option<DateTime<Utc>>,
    pub newest_created: Option<DateTime<Utc>>,
    /// Sorted list of labels that hold at least one artifact
    pub labels: Vec<String>,
}

/// The persistent store-wide index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub schema_version: u32,
    #[serde(default)]
    pub metadata: IndexMetadata,
    /// label -> artifacts, newest first
    #[serde(default)]
    pub artifacts: BTreeMap<String, Vec<Artifact>>,
    /// fingerprint -> location, derived from `artifacts`
    #[serde(default)]
    pub cache_index: BTreeMap<Fingerprint, IndexLocation>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            metadata: IndexMetadata::default(),
            artifacts: BTreeMap::new(),
            cache_index: BTreeMap::new(),
        }
    }
}

impl CacheIndex {
    /// Recompute the flat map and rollups from the per-label lists
    ///
    /// Derived structures are always rebuilt whole, never patched. Empty label
    /// groups are dropped. When a fingerprint appears more than once, the
    /// newest occurrence wins.
    pub fn rebuild(&mut self) {
        self.artifacts.retain(|_, list| !list.is_empty());

        let mut entries: Vec<(&Fingerprint, DateTime<Utc>, IndexLocation)> = Vec::new();
        for (label, list) in &self.artifacts {
            for (position, artifact) in list.iter().enumerate() {
                if artifact.fingerprint.is_empty() {
                    continue;
                }
                entries.push((
                    &artifact.fingerprint,
                    artifact.created_at,
                    IndexLocation {
                        label: label.clone(),
                        position,
                    },
                ));
            }
        }
        // Oldest first so later inserts (newer artifacts) overwrite
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        let mut cache_index = BTreeMap::new();
        for (fingerprint, _, location) in entries {
            cache_index.insert(fingerprint.clone(), location);
        }
        self.cache_index = cache_index;

        let all = self.artifacts.values().flatten();
        self.metadata = IndexMetadata {
            total_count: self.artifacts.values().map(Vec::len).sum(),
            oldest_created: all.clone().map(|a| a.created_at).min(),
            newest_created: all.map(|a| a.created_at).max(),
            labels: self.artifacts.keys().cloned().collect(),
        };
        self.schema_version = SCHEMA_VERSION;
    }

    /// Resolve a fingerprint through the flat map
    pub fn locate(&self, fingerprint: &Fingerprint) -> Option<LocatedArtifact> {
        let location = self.cache_index.get(fingerprint)?;
        let artifact = self.artifacts.get(&location.label)?.get(location.position)?;
        if &artifact.fingerprint != fingerprint {
            return None;
        }
        Some(LocatedArtifact {
            label: location.label.clone(),
            position: location.position,
            artifact: artifact.clone(),
        })
    }

    /// Every artifact with its location, in no particular order
    pub fn iter_located(&self) -> impl Iterator<Item = LocatedArtifact> + '_ {
        self.artifacts.iter().flat_map(|(label, list)| {
            list.iter().enumerate().map(move |(position, artifact)| LocatedArtifact {
                label: label.clone(),
                position,
                artifact: artifact.clone(),
            })
        })
    }
}

// =========================================================================
// Operations
// =========================================================================

/// What a `clear` call removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Every artifact, its code file, and the index contents
    AllArtifacts,
    /// Every stored audit report
    AllAudits,
    /// Every artifact under one label
    Label(String),
    /// A single artifact
    Fingerprint(Fingerprint),
}

/// Store statistics for status displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_count: usize,
    pub label_count: usize,
    pub oldest_created: Option<DateTime<Utc>>,
    pub newest_created: Option<DateTime<Utc>>,
}

/// A part of the request that differs from the nearest cached artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Nothing is cached under the label at all
    NoCandidate,
    Description,
    DataShape,
    Exports,
    Imports,
    Theme,
    /// The fingerprint matched but the code file is gone
    MissingFile,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::NoCandidate => "no cached artifact for label",
            MissReason::Description => "description changed",
            MissReason::DataShape => "data shape changed",
            MissReason::Exports => "exports changed",
            MissReason::Imports => "imports changed",
            MissReason::Theme => "theme changed",
            MissReason::MissingFile => "code file missing on disk",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
