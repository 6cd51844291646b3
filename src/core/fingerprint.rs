//! Fingerprint engine - deterministic cache keys for generation requests
//!
//! A fingerprint identifies "the same request": the whitespace-normalized
//! description, the shape of the primary data input, and the signatures of the
//! declared exports, imports and theme. Model names, labels, notebook paths and
//! other storage metadata never take part in it, so upgrading the model does
//! not invalidate cached widgets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Declared trait definitions (name -> description), kept sorted by name
pub type TraitMap = BTreeMap<String, String>;

/// Number of hex characters kept for a per-part signature
const SIGNATURE_LEN: usize = 16;

/// Number of characters shown for a fingerprint in listings
const SHORT_LEN: usize = 12;

/// Number of hex characters kept for a line hash
const LINE_HASH_LEN: usize = 16;

/// Identifies a semantically equivalent request
///
/// Freshly computed fingerprints are full SHA-256 hex digests. Fingerprints
/// read back from legacy indexes or typed by a user may be any string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing fingerprint string (e.g. read back from the index)
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for display
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short digest of one part of a request (exports, imports or theme)
///
/// An absent or empty part always hashes to the empty signature so two
/// widgets that both lack exports still collide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Shape of the primary data input, serialized as `[rows, columns]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct DataShape {
    pub rows: u64,
    pub columns: u64,
}

impl DataShape {
    pub fn new(rows: u64, columns: u64) -> Self {
        Self { rows, columns }
    }
}

impl From<(u64, u64)> for DataShape {
    fn from((rows, columns): (u64, u64)) -> Self {
        Self { rows, columns }
    }
}

impl From<DataShape> for (u64, u64) {
    fn from(shape: DataShape) -> Self {
        (shape.rows, shape.columns)
    }
}

impl fmt::Display for DataShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}

/// The semantic inputs of a generation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    pub description: String,
    pub data_shape: Option<DataShape>,
    pub exports: TraitMap,
    pub imports: TraitMap,
    pub theme_description: Option<String>,
}

impl RequestSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_data_shape(mut self, shape: DataShape) -> Self {
        self.data_shape = Some(shape);
        self
    }

    pub fn with_export(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.exports.insert(name.into(), description.into());
        self
    }

    pub fn with_import(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.imports.insert(name.into(), description.into());
        self
    }

    pub fn with_theme(mut self, theme_description: impl Into<String>) -> Self {
        self.theme_description = Some(theme_description.into());
        self
    }

    /// Compute every per-part signature plus the combined fingerprint
    pub fn breakdown(&self) -> FingerprintBreakdown {
        let exports_signature = signature(&self.exports);
        let imports_signature = signature(&self.imports);
        let theme_signature = theme_signature(self.theme_description.as_deref());
        let fingerprint = combine(
            &normalize_whitespace(&self.description),
            self.data_shape,
            &exports_signature,
            &imports_signature,
            &theme_signature,
        );
        FingerprintBreakdown {
            fingerprint,
            description: normalize_whitespace(&self.description),
            data_shape: self.data_shape,
            exports_signature,
            imports_signature,
            theme_signature,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.breakdown().fingerprint
    }
}

/// A fingerprint together with the parts it was derived from
///
/// Kept so a cache miss can be explained part by part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintBreakdown {
    pub fingerprint: Fingerprint,
    pub description: String,
    pub data_shape: Option<DataShape>,
    pub exports_signature: Signature,
    pub imports_signature: Signature,
    pub theme_signature: Signature,
}

/// Compute the fingerprint of a request from its raw parts
pub fn fingerprint(
    description: &str,
    data_shape: Option<DataShape>,
    exports: &TraitMap,
    imports: &TraitMap,
    theme_description: Option<&str>,
) -> Fingerprint {
    combine(
        &normalize_whitespace(description),
        data_shape,
        &signature(exports),
        &signature(imports),
        &theme_signature(theme_description),
    )
}

/// Signature of a trait mapping; empty mappings produce the empty signature
pub fn signature(mapping: &TraitMap) -> Signature {
    if mapping.is_empty() {
        return Signature::empty();
    }
    // BTreeMap iterates in key order, so the serialized form is stable
    let items: Vec<(&String, &String)> = mapping.iter().collect();
    let json = serde_json::to_string(&items).unwrap_or_default();
    Signature(truncated_digest(&json, SIGNATURE_LEN))
}

/// Signature of a theme description, whitespace-normalized first
pub fn theme_signature(theme_description: Option<&str>) -> Signature {
    match theme_description.map(normalize_whitespace) {
        Some(normalized) if !normalized.is_empty() => {
            Signature(truncated_digest(&normalized, SIGNATURE_LEN))
        }
        _ => Signature::empty(),
    }
}

/// Collapse runs of whitespace into single spaces and trim both ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of arbitrary content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash of a single source line, used by the audit engine
pub fn line_hash(line: &str) -> String {
    truncated_digest(line, LINE_HASH_LEN)
}

fn truncated_digest(content: &str, len: usize) -> String {
    let mut digest = content_hash(content);
    digest.truncate(len);
    digest
}

fn combine(
    normalized_description: &str,
    data_shape: Option<DataShape>,
    exports_signature: &Signature,
    imports_signature: &Signature,
    theme_signature: &Signature,
) -> Fingerprint {
    // serde_json::Value objects keep keys sorted, so the encoding is canonical
    let input = serde_json::json!({
        "description": normalized_description,
        "data_shape": data_shape.map(|s| [s.rows, s.columns]),
        "exports_signature": exports_signature.as_str(),
        "imports_signature": imports_signature.as_str(),
        "theme_signature": theme_signature.as_str(),
    });
    Fingerprint(content_hash(&input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bar_chart(shape: Option<DataShape>) -> RequestSpec {
        let mut spec = RequestSpec::new("bar chart");
        spec.data_shape = shape;
        spec
    }

    #[test]
    fn test_whitespace_does_not_change_fingerprint() {
        let a = bar_chart(Some(DataShape::new(5, 2))).fingerprint();
        let mut edited = bar_chart(Some(DataShape::new(5, 2)));
        edited.description = "bar chart ".to_string();
        assert_eq!(a, edited.fingerprint());

        edited.description = "  bar \n\t chart".to_string();
        assert_eq!(a, edited.fingerprint());
    }

    #[test]
    fn test_data_shape_changes_fingerprint() {
        let f1 = bar_chart(Some(DataShape::new(5, 2))).fingerprint();
        let f2 = bar_chart(Some(DataShape::new(6, 2))).fingerprint();
        assert_ne!(f1, f2);
    }

    #[test]
    fn test_absent_shape_differs_from_zero_shape() {
        let none = bar_chart(None).fingerprint();
        let zero = bar_chart(Some(DataShape::new(0, 0))).fingerprint();
        assert_ne!(none, zero);
    }

    #[test]
    fn test_empty_mapping_has_empty_signature() {
        assert!(signature(&TraitMap::new()).is_empty());
        assert!(theme_signature(None).is_empty());
        assert!(theme_signature(Some("   ")).is_empty());
    }

    #[test]
    fn test_signature_ignores_insertion_order() {
        let mut a = TraitMap::new();
        a.insert("selected".into(), "selected ids".into());
        a.insert("brush".into(), "brush extent".into());
        let mut b = TraitMap::new();
        b.insert("brush".into(), "brush extent".into());
        b.insert("selected".into(), "selected ids".into());
        assert_eq!(signature(&a), signature(&b));
        assert_eq!(signature(&a).as_str().len(), SIGNATURE_LEN);
    }

    #[test]
    fn test_exports_and_theme_change_fingerprint() {
        let base = RequestSpec::new("scatter plot");
        let with_export = base.clone().with_export("selection", "selected points");
        let with_theme = base.clone().with_theme("dark editorial");
        assert_ne!(base.fingerprint(), with_export.fingerprint());
        assert_ne!(base.fingerprint(), with_theme.fingerprint());
        assert_ne!(with_export.fingerprint(), with_theme.fingerprint());
    }

    #[test]
    fn test_free_function_matches_spec() {
        let spec = RequestSpec::new("map")
            .with_data_shape(DataShape::new(10, 3))
            .with_import("region", "selected region")
            .with_theme("muted");
        let direct = fingerprint(
            "map",
            Some(DataShape::new(10, 3)),
            &spec.exports,
            &spec.imports,
            Some("muted"),
        );
        assert_eq!(spec.fingerprint(), direct);
        assert_eq!(direct.as_str().len(), 64);
    }

    #[test]
    fn test_short_respects_char_boundaries() {
        let digest = RequestSpec::new("map").fingerprint();
        assert_eq!(digest.short(), &digest.as_str()[..12]);

        // Legacy indexes may carry arbitrary non-ASCII hashes
        let legacy = Fingerprint::new("abcdefghijkéé");
        assert_eq!(legacy.short(), "abcdefghijké");
        assert_eq!(Fingerprint::new("abc").short(), "abc");
        assert_eq!(Fingerprint::new("").short(), "");
    }

    #[test]
    fn test_data_shape_serializes_as_pair() {
        let json = serde_json::to_string(&DataShape::new(100, 5)).unwrap();
        assert_eq!(json, "[100,5]");
        let back: DataShape = serde_json::from_str("[7,2]").unwrap();
        assert_eq!(back, DataShape::new(7, 2));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_deterministic(desc in ".{0,64}", rows in 0u64..1000, cols in 0u64..50) {
            let spec = RequestSpec::new(desc).with_data_shape(DataShape::new(rows, cols));
            prop_assert_eq!(spec.fingerprint(), spec.clone().fingerprint());
        }

        #[test]
        fn prop_padding_whitespace_is_ignored(desc in "[a-z ]{1,40}", pad in "[ \t\n]{0,5}") {
            let plain = RequestSpec::new(desc.clone()).fingerprint();
            let padded = RequestSpec::new(format!("{pad}{desc}{pad}")).fingerprint();
            prop_assert_eq!(plain, padded);
        }
    }
}
