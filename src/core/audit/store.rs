//! Audit report persistence
//!
//! One JSON file per (fingerprint, level) holds the report plus the hashes it
//! was computed against; a YAML rendering of the report sits next to it for
//! humans. Only the JSON file is ever read back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{AuditLevel, Concern, StoredAudit, AUDIT_SCHEMA_VERSION};
use super::AuditError;
use crate::core::fingerprint::Fingerprint;
use crate::core::project::Project;
use crate::core::store::write_atomic;

/// Stored audits of one project
pub struct AuditStore {
    dir: PathBuf,
}

/// Human-readable view written as YAML
#[derive(Serialize)]
struct ReportView<'a> {
    fingerprint: &'a Fingerprint,
    level: AuditLevel,
    created_at: DateTime<Utc>,
    concerns: &'a [Concern],
    open_questions: &'a [String],
}

impl AuditStore {
    pub fn new(project: &Project) -> Self {
        Self {
            dir: project.audits_dir(),
        }
    }

    /// Path of the JSON file for a (fingerprint, level) pair
    pub fn path_for(&self, fingerprint: &Fingerprint, level: AuditLevel) -> PathBuf {
        self.dir.join(format!("{}_{}.json", fingerprint, level))
    }

    pub fn save(&self, audit: &StoredAudit) -> Result<PathBuf, AuditError> {
        let path = self.path_for(&audit.fingerprint, audit.level);
        let json = serde_json::to_string_pretty(audit)?;
        write_atomic(&path, json.as_bytes())?;

        let view = ReportView {
            fingerprint: &audit.fingerprint,
            level: audit.level,
            created_at: audit.created_at,
            concerns: &audit.report.concerns,
            open_questions: &audit.report.open_questions,
        };
        let yaml = serde_yml::to_string(&view)?;
        write_atomic(&path.with_extension("yaml"), yaml.as_bytes())?;

        debug!(
            fingerprint = audit.fingerprint.short(),
            level = %audit.level,
            concerns = audit.report.concerns.len(),
            "saved audit"
        );
        Ok(path)
    }

    /// Load a stored audit; anything missing or unreadable is "no report"
    pub fn load(&self, fingerprint: &Fingerprint, level: AuditLevel) -> Option<StoredAudit> {
        read_audit(&self.path_for(fingerprint, level))
    }

    /// Every readable stored audit, newest first
    pub fn list(&self) -> Vec<StoredAudit> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut audits: Vec<StoredAudit> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| read_audit(&path))
            .collect();
        audits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        audits
    }

    /// Remove every stored audit file; returns the number of files removed
    pub fn clear(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            let is_audit_file = path
                .extension()
                .is_some_and(|ext| ext == "json" || ext == "yaml");
            if path.is_file() && is_audit_file {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn read_audit(path: &Path) -> Option<StoredAudit> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read stored audit");
            return None;
        }
    };

    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed stored audit, ignoring");
            return None;
        }
    };

    let version = raw.get("schema_version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(AUDIT_SCHEMA_VERSION)) {
        warn!(path = %path.display(), ?version, "unsupported audit schema, ignoring");
        return None;
    }

    match serde_json::from_value(raw) {
        Ok(audit) => Some(audit),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed stored audit, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::lines::LineHashMap;
    use crate::core::audit::types::{AuditReport, Impact, Location};
    use tempfile::tempdir;

    fn sample(fp: &str, level: AuditLevel) -> StoredAudit {
        StoredAudit {
            schema_version: AUDIT_SCHEMA_VERSION,
            fingerprint: Fingerprint::new(fp),
            level,
            code_hash: "abc".into(),
            line_hashes: LineHashMap::from_code("a\nb"),
            report: AuditReport::new(level).with_concern(Concern::new(
                "C1",
                Location::lines([2]),
                Impact::High,
                "b is risky",
            )),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_load_and_yaml_rendering() {
        let tmp = tempdir().unwrap();
        let store = AuditStore::new(&Project::at(tmp.path()));
        let audit = sample("f00d", AuditLevel::Full);

        let path = store.save(&audit).unwrap();
        assert!(path.ends_with("f00d_full.json"));
        let yaml = fs::read_to_string(path.with_extension("yaml")).unwrap();
        assert!(yaml.contains("b is risky"));

        assert_eq!(store.load(&audit.fingerprint, AuditLevel::Full), Some(audit.clone()));
        assert!(store.load(&audit.fingerprint, AuditLevel::Fast).is_none());
    }

    #[test]
    fn test_bad_schema_is_treated_as_absent() {
        let tmp = tempdir().unwrap();
        let project = Project::at(tmp.path());
        let store = AuditStore::new(&project);
        fs::create_dir_all(project.audits_dir()).unwrap();

        let fp = Fingerprint::new("beef");
        fs::write(store.path_for(&fp, AuditLevel::Fast), "{\"schema_version\": 99}").unwrap();
        assert!(store.load(&fp, AuditLevel::Fast).is_none());

        fs::write(store.path_for(&fp, AuditLevel::Fast), "garbage").unwrap();
        assert!(store.load(&fp, AuditLevel::Fast).is_none());
    }

    #[test]
    fn test_list_and_clear() {
        let tmp = tempdir().unwrap();
        let store = AuditStore::new(&Project::at(tmp.path()));
        assert_eq!(store.clear().unwrap(), 0);

        store.save(&sample("one", AuditLevel::Fast)).unwrap();
        store.save(&sample("two", AuditLevel::Full)).unwrap();
        assert_eq!(store.list().len(), 2);

        // JSON + YAML for each
        assert_eq!(store.clear().unwrap(), 4);
        assert!(store.list().is_empty());
    }
}
