//! Content-addressable artifact store
//!
//! Generated widget code lives in `.widgetsmith/widgets/` as one file per
//! artifact; a JSON index groups artifacts by label (newest first) and keeps a
//! flat fingerprint -> `label/position` map for O(1) lookups.
//!
//! Every mutation is a read-modify-write of the whole index: the current file
//! is re-read, the change applied, derived structures rebuilt from scratch,
//! and the result written to a temp file that is renamed over the index. A
//! crash mid-write leaves the previous consistent index in place.
//!
//! Integrity problems never surface as errors: a corrupt index loads as an
//! empty one, and a fingerprint whose code file vanished is a cache miss.

mod components;
mod label;
mod migrate;
mod types;

pub use components::extract_components;
pub use label::{resolve_label, sanitize_label};
pub use types::*;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::audit::AuditStore;
use crate::core::fingerprint::{content_hash, normalize_whitespace, Fingerprint, RequestSpec};
use crate::core::project::Project;

/// File extension of stored widget code
const CODE_EXTENSION: &str = "js";

/// Errors that can occur while mutating the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to atomically replace {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no artifact at {label}/{position}")]
    NotFound { label: String, position: usize },
}

/// Storage metadata recorded alongside an artifact; none of it is fingerprinted
#[derive(Debug, Clone, Default)]
pub struct ArtifactMeta {
    /// Grouping label hint; sanitized, anonymous when absent
    pub label: Option<String>,
    pub model: String,
    pub theme_name: Option<String>,
    pub notebook_path: Option<String>,
    /// Fingerprint of the artifact this one was edited from
    pub revision_parent: Option<Fingerprint>,
    /// Issues left in the code when generation gave up
    pub issues: Vec<String>,
}

impl ArtifactMeta {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_parent(mut self, parent: Fingerprint) -> Self {
        self.revision_parent = Some(parent);
        self
    }

    pub fn with_notebook(mut self, path: impl Into<String>) -> Self {
        self.notebook_path = Some(path.into());
        self
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }
}

/// The artifact store for one project
pub struct ArtifactStore {
    project: Project,
    index: CacheIndex,
}

impl ArtifactStore {
    /// Open (creating directories as needed) the store of a project
    pub fn open(project: &Project) -> Result<Self, StoreError> {
        fs::create_dir_all(project.widgets_dir())?;
        fs::create_dir_all(project.index_dir())?;

        let mut store = Self {
            project: project.clone(),
            index: CacheIndex::default(),
        };
        store.reload();
        Ok(store)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// The in-memory index as of the last load or mutation
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Re-read the index from disk, picking up writes by other processes
    pub fn reload(&mut self) {
        let path = self.project.index_file();
        let (index, migrated) = read_index(&path);
        self.index = index;

        if migrated {
            // One-time upgrade: write the current shape back immediately
            if let Err(e) = self.persist() {
                warn!(error = %e, "could not persist migrated index");
            }
        }
    }

    // =====================================================================
    // Lookups
    // =====================================================================

    /// Find a cached artifact for a request
    ///
    /// A hit whose code file no longer exists is reported as a miss.
    pub fn lookup(&self, spec: &RequestSpec, label_hint: Option<&str>) -> Option<LocatedArtifact> {
        let fingerprint = spec.fingerprint();
        let located = self.index.locate(&fingerprint)?;

        if !self.code_path(&located).exists() {
            debug!(
                fingerprint = fingerprint.short(),
                file = %located.file_name,
                "index entry points at a missing file, treating as miss"
            );
            return None;
        }

        debug!(
            fingerprint = fingerprint.short(),
            label = %located.label,
            hint = label_hint.unwrap_or(""),
            "cache hit"
        );
        Some(located)
    }

    /// Explain why a request would miss, part by part
    ///
    /// Compares against the newest artifact under the label hint. Returns an
    /// empty list when the request would hit.
    pub fn explain_miss(&self, spec: &RequestSpec, label_hint: Option<&str>) -> Vec<MissReason> {
        let breakdown = spec.breakdown();
        if let Some(located) = self.index.locate(&breakdown.fingerprint) {
            if self.code_path(&located).exists() {
                return Vec::new();
            }
            return vec![MissReason::MissingFile];
        }

        let label = resolve_label(label_hint);
        let Some(newest) = self.index.artifacts.get(&label).and_then(|list| list.first()) else {
            return vec![MissReason::NoCandidate];
        };

        let mut reasons = Vec::new();
        if normalize_whitespace(&newest.description) != breakdown.description {
            reasons.push(MissReason::Description);
        }
        if newest.data_shape != breakdown.data_shape {
            reasons.push(MissReason::DataShape);
        }
        if newest.exports_signature != breakdown.exports_signature {
            reasons.push(MissReason::Exports);
        }
        if newest.imports_signature != breakdown.imports_signature {
            reasons.push(MissReason::Imports);
        }
        if newest.theme_signature != breakdown.theme_signature {
            reasons.push(MissReason::Theme);
        }
        reasons
    }

    /// Artifact metadata by fingerprint, without touching the code file
    pub fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<LocatedArtifact> {
        self.index.locate(fingerprint)
    }

    /// Find an artifact by a unique fingerprint prefix
    pub fn by_fingerprint_prefix(&self, prefix: &str) -> Option<LocatedArtifact> {
        let mut matches = self
            .index
            .cache_index
            .keys()
            .filter(|fp| fp.as_str().starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        self.index.locate(first)
    }

    /// Path of an artifact's code file
    pub fn code_path(&self, artifact: &Artifact) -> PathBuf {
        self.project.widgets_dir().join(&artifact.file_name)
    }

    /// Read an artifact's code; absent when the file is gone
    pub fn load_code(&self, artifact: &Artifact) -> Option<String> {
        fs::read_to_string(self.code_path(artifact)).ok()
    }

    /// Artifact and code by fingerprint
    pub fn load_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<(LocatedArtifact, String)> {
        let located = self.index.locate(fingerprint)?;
        let code = self.load_code(&located)?;
        Some((located, code))
    }

    /// Artifact and code by label and position (0 = most recent)
    pub fn load_by_label(&self, label: &str, position: usize) -> Option<(LocatedArtifact, String)> {
        let artifact = self.index.artifacts.get(label)?.get(position)?.clone();
        let located = LocatedArtifact {
            label: label.to_string(),
            position,
            artifact,
        };
        let code = self.load_code(&located)?;
        Some((located, code))
    }

    /// Wrap an arbitrary widget file in a minimal, unindexed artifact record
    pub fn load_from_file(&self, path: &Path) -> Option<(LocatedArtifact, String)> {
        let code = fs::read_to_string(path).ok()?;
        let label = path
            .file_stem()
            .map(|s| sanitize_label(&s.to_string_lossy()))
            .unwrap_or_else(|| ANONYMOUS_LABEL.to_string());

        let artifact = Artifact {
            created_at: Utc::now(),
            file_name: path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            fingerprint: Fingerprint::new(content_hash(&code)),
            description: format!("Loaded from {}", path.display()),
            data_shape: None,
            model: String::new(),
            exports_signature: Default::default(),
            imports_signature: Default::default(),
            theme_signature: Default::default(),
            theme_name: None,
            theme_description: None,
            notebook_path: None,
            components: extract_components(&code),
            revision_parent: None,
            version: 1,
            issues: Vec::new(),
        };
        Some((
            LocatedArtifact {
                label,
                position: 0,
                artifact,
            },
            code,
        ))
    }

    // =====================================================================
    // Lineage and listings
    // =====================================================================

    /// All artifacts of a label, oldest first (reverse of storage order)
    pub fn revision_chain(&self, label: &str) -> Vec<LocatedArtifact> {
        let mut chain = self.artifacts_for_label(label);
        chain.reverse();
        chain
    }

    /// Follow `revision_parent` pointers from an artifact back to its root
    ///
    /// Returns the artifact itself first. Stops at the first parent that is
    /// no longer indexed, and on cycles.
    pub fn lineage(&self, fingerprint: &Fingerprint) -> Vec<LocatedArtifact> {
        let mut chain: Vec<LocatedArtifact> = Vec::new();
        let mut next = Some(fingerprint.clone());

        while let Some(fp) = next {
            if chain.iter().any(|a| a.fingerprint == fp) {
                warn!(fingerprint = fp.short(), "revision lineage contains a cycle");
                break;
            }
            let Some(located) = self.index.locate(&fp) else { break };
            next = located.revision_parent.clone();
            chain.push(located);
        }
        chain
    }

    /// Artifacts of a label, newest first
    pub fn artifacts_for_label(&self, label: &str) -> Vec<LocatedArtifact> {
        self.index
            .artifacts
            .get(label)
            .map(|list| {
                list.iter()
                    .enumerate()
                    .map(|(position, artifact)| LocatedArtifact {
                        label: label.to_string(),
                        position,
                        artifact: artifact.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recently created artifacts across all labels
    pub fn recent(&self, limit: usize) -> Vec<LocatedArtifact> {
        let mut all: Vec<LocatedArtifact> = self.index.iter_located().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }

    /// Artifacts created from a given notebook, newest first
    pub fn artifacts_for_notebook(&self, notebook_path: &str) -> Vec<LocatedArtifact> {
        let mut found: Vec<LocatedArtifact> = self
            .index
            .iter_located()
            .filter(|a| a.notebook_path.as_deref() == Some(notebook_path))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    /// Sorted list of labels with at least one artifact
    pub fn labels(&self) -> &[String] {
        &self.index.metadata.labels
    }

    /// Sorted list of notebooks that produced artifacts
    pub fn notebooks(&self) -> Vec<String> {
        let mut notebooks: Vec<String> = self
            .index
            .artifacts
            .values()
            .flatten()
            .filter_map(|a| a.notebook_path.clone())
            .collect();
        notebooks.sort();
        notebooks.dedup();
        notebooks
    }

    pub fn stats(&self) -> StoreStats {
        let meta = &self.index.metadata;
        StoreStats {
            total_count: meta.total_count,
            label_count: meta.labels.len(),
            oldest_created: meta.oldest_created,
            newest_created: meta.newest_created,
        }
    }

    // =====================================================================
    // Mutations
    // =====================================================================

    /// Persist newly generated code as the most recent artifact of its label
    pub fn save(
        &mut self,
        code: &str,
        spec: &RequestSpec,
        meta: ArtifactMeta,
    ) -> Result<LocatedArtifact, StoreError> {
        self.reload();

        let breakdown = spec.breakdown();
        let label = resolve_label(meta.label.as_deref());
        let now = Utc::now();

        let version = self
            .index
            .artifacts
            .get(&label)
            .and_then(|list| list.iter().map(|a| a.version).max())
            .map_or(1, |v| v + 1);

        let file_name = self.unique_file_name(&label, &now.format("%Y%m%d_%H%M%S").to_string(), version);
        let code_path = self.project.widgets_dir().join(&file_name);
        write_atomic(&code_path, code.as_bytes())?;

        let artifact = Artifact {
            created_at: now,
            file_name,
            fingerprint: breakdown.fingerprint,
            description: spec.description.clone(),
            data_shape: spec.data_shape,
            model: meta.model,
            exports_signature: breakdown.exports_signature,
            imports_signature: breakdown.imports_signature,
            theme_signature: breakdown.theme_signature,
            theme_name: meta.theme_name,
            theme_description: spec.theme_description.clone(),
            notebook_path: meta.notebook_path,
            components: extract_components(code),
            revision_parent: meta.revision_parent,
            version,
            issues: meta.issues,
        };

        self.index
            .artifacts
            .entry(label.clone())
            .or_default()
            .insert(0, artifact.clone());
        if let Err(e) = self.persist() {
            // Nothing indexes the new file; drop it and the in-memory entry
            if let Err(cleanup) = fs::remove_file(&code_path) {
                warn!(file = %code_path.display(), error = %cleanup, "could not remove unindexed code file");
            }
            self.reload();
            return Err(e);
        }

        info!(
            label = %label,
            fingerprint = artifact.fingerprint.short(),
            file = %artifact.file_name,
            version,
            complete = artifact.is_complete(),
            "saved artifact"
        );

        Ok(LocatedArtifact {
            label,
            position: 0,
            artifact,
        })
    }

    /// Link an existing artifact to its parent after the fact
    pub fn set_revision_parent(
        &mut self,
        label: &str,
        position: usize,
        parent: Fingerprint,
    ) -> Result<(), StoreError> {
        self.reload();

        let artifact = self
            .index
            .artifacts
            .get_mut(label)
            .and_then(|list| list.get_mut(position))
            .ok_or_else(|| StoreError::NotFound {
                label: label.to_string(),
                position,
            })?;
        artifact.revision_parent = Some(parent);
        self.persist()
    }

    /// Remove artifacts or audits; returns the number of files removed
    pub fn clear(&mut self, scope: &ClearScope) -> Result<usize, StoreError> {
        if let ClearScope::AllAudits = scope {
            return Ok(AuditStore::new(&self.project).clear()?);
        }

        self.reload();

        let removed_artifacts: Vec<Artifact> = match scope {
            ClearScope::AllArtifacts => {
                let all = std::mem::take(&mut self.index.artifacts);
                all.into_values().flatten().collect()
            }
            ClearScope::Label(raw) => {
                let label = if self.index.artifacts.contains_key(raw) {
                    raw.clone()
                } else {
                    sanitize_label(raw)
                };
                self.index.artifacts.remove(&label).unwrap_or_default()
            }
            ClearScope::Fingerprint(fingerprint) => match self.index.locate(fingerprint) {
                Some(located) => {
                    let list = self.index.artifacts.entry(located.label.clone()).or_default();
                    vec![list.remove(located.position)]
                }
                None => Vec::new(),
            },
            ClearScope::AllAudits => Vec::new(),
        };

        let mut removed_files = 0;
        for artifact in &removed_artifacts {
            let path = self.code_path(artifact);
            if path.exists() {
                fs::remove_file(&path)?;
                removed_files += 1;
            }
        }

        if !removed_artifacts.is_empty() || matches!(scope, ClearScope::AllArtifacts) {
            self.persist()?;
        }

        info!(
            artifacts = removed_artifacts.len(),
            files = removed_files,
            scope = ?scope,
            "cleared cache"
        );
        Ok(removed_files)
    }

    fn unique_file_name(&self, label: &str, timestamp: &str, version: u32) -> String {
        let widgets_dir = self.project.widgets_dir();
        let base = format!("{}_{}", label, timestamp);

        let candidate = format!("{}.{}", base, CODE_EXTENSION);
        if !widgets_dir.join(&candidate).exists() {
            return candidate;
        }

        let mut n = version.max(2);
        loop {
            let candidate = format!("{}_v{}.{}", base, n, CODE_EXTENSION);
            if !widgets_dir.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.index.rebuild();
        let json = serde_json::to_string_pretty(&self.index)?;
        write_atomic(&self.project.index_file(), json.as_bytes())
    }
}

/// Read an index file, degrading to an empty index on any problem
///
/// Returns whether a legacy document was migrated.
fn read_index(path: &Path) -> (CacheIndex, bool) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return (CacheIndex::default(), false),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read index, starting empty");
            return (CacheIndex::default(), false);
        }
    };

    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt index, starting empty");
            return (CacheIndex::default(), false);
        }
    };

    if migrate::schema_version(&raw) < SCHEMA_VERSION {
        return (migrate::migrate_legacy(&raw), true);
    }

    match serde_json::from_value::<CacheIndex>(raw) {
        Ok(mut index) => {
            // Never trust the stored flat map
            index.rebuild();
            (index, false)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable index schema, starting empty");
            (CacheIndex::default(), false)
        }
    }
}

/// Write a file by renaming a fully written temp file over it
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
