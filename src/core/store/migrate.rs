//! One-time migration of legacy (pre-v3) indexes
//!
//! v1/v2 indexes kept a flat list of widget records keyed by content hash,
//! with the grouping name stored per record (`data_var_name` or `slug`).
//! Migration regroups those records by sanitized label and rebuilds every
//! derived structure. Fields that cannot be recovered get defaults.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::label::sanitize_label;
use super::types::{Artifact, CacheIndex, ANONYMOUS_LABEL};
use crate::core::fingerprint::{content_hash, DataShape, Fingerprint, Signature};

/// Read the schema version of a raw index document (absent = 1)
pub fn schema_version(raw: &Value) -> u32 {
    raw.get("schema_version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1)
}

/// Rebuild a current-version index from a legacy document
pub fn migrate_legacy(raw: &Value) -> CacheIndex {
    let mut index = CacheIndex::default();
    let mut skipped = 0usize;

    // Flat list (v1/v2) or a label-keyed object without a version marker
    let groups: Vec<(Option<&str>, &Value)> = match raw.get("widgets").or_else(|| raw.get("artifacts")) {
        Some(Value::Array(list)) => list.iter().map(|entry| (None, entry)).collect(),
        Some(Value::Object(map)) => map
            .iter()
            .flat_map(|(label, list)| {
                list.as_array()
                    .into_iter()
                    .flatten()
                    .map(move |entry| (Some(label.as_str()), entry))
            })
            .collect(),
        _ => Vec::new(),
    };

    for (group_label, entry) in groups {
        let Some(fields) = entry.as_object() else {
            skipped += 1;
            continue;
        };
        let Some(artifact) = artifact_from_legacy(fields) else {
            skipped += 1;
            continue;
        };

        let label = first_str(fields, &["data_var_name", "var_name", "slug", "label"])
            .or(group_label)
            .map(sanitize_label)
            .unwrap_or_else(|| ANONYMOUS_LABEL.to_string());

        index.artifacts.entry(label).or_default().push(artifact);
    }

    for list in index.artifacts.values_mut() {
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    index.rebuild();

    if skipped > 0 {
        warn!(skipped, "dropped unreadable records while migrating legacy index");
    }
    debug!(
        from_version = schema_version(raw),
        artifacts = index.metadata.total_count,
        "migrated legacy index"
    );
    index
}

fn artifact_from_legacy(fields: &Map<String, Value>) -> Option<Artifact> {
    let file_name = first_str(fields, &["file_name"])?.to_string();

    let fingerprint = match first_str(fields, &["cache_key", "hash", "fingerprint", "id"]) {
        Some(hex) if !hex.is_empty() => Fingerprint::new(hex),
        // Unrecoverable key: keep the record listable but unmatchable
        _ => Fingerprint::new(format!("legacy-{}", &content_hash(&file_name)[..16])),
    };

    let data_shape = fields
        .get("data_shape")
        .and_then(Value::as_array)
        .and_then(|pair| match pair.as_slice() {
            [rows, cols] => Some(DataShape::new(rows.as_u64()?, cols.as_u64()?)),
            _ => None,
        });

    let components = fields
        .get("components")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(Artifact {
        created_at: first_str(fields, &["created_at"])
            .map(parse_timestamp)
            .unwrap_or_default(),
        file_name,
        fingerprint,
        description: owned(fields, &["description"]).unwrap_or_default(),
        data_shape,
        model: owned(fields, &["model"]).unwrap_or_default(),
        exports_signature: signature(fields, "exports_signature"),
        imports_signature: signature(fields, "imports_signature"),
        theme_signature: signature(fields, "theme_signature"),
        theme_name: owned(fields, &["theme_name"]),
        theme_description: owned(fields, &["theme_description"]),
        notebook_path: owned(fields, &["notebook_path"]),
        components,
        revision_parent: owned(fields, &["revision_parent", "base_widget_id"])
            .filter(|s| !s.is_empty())
            .map(Fingerprint::new),
        version: fields
            .get("version")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(1),
        issues: Vec::new(),
    })
}

/// Parse RFC 3339 or naive ISO-8601 timestamps; unreadable values become the epoch
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

fn first_str<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

fn owned(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_str(fields, keys).map(str::to_string)
}

fn signature(fields: &Map<String, Value>, key: &str) -> Signature {
    fields
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
