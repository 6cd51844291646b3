//! Audit report types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lines::LineHashMap;
use crate::core::fingerprint::Fingerprint;

/// Schema version of stored audit files; anything else is ignored on load
pub const AUDIT_SCHEMA_VERSION: u32 = 1;

/// Depth of an audit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    #[default]
    Fast,
    Full,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Fast => "fast",
            AuditLevel::Full => "full",
        }
    }
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(AuditLevel::Fast),
            "full" => Ok(AuditLevel::Full),
            _ => Err(format!("Unknown audit level: {}", s)),
        }
    }
}

/// How serious a concern is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            _ => Err(format!("Unknown impact: {}", s)),
        }
    }
}

/// Where a concern applies
///
/// Serialized as the string `"global"` or as a list of 1-based line numbers.
/// Line lists are kept sorted and free of duplicates; line 0 is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLocation", into = "RawLocation")]
pub enum Location {
    Global,
    Lines(Vec<usize>),
}

impl Location {
    pub fn lines(lines: impl IntoIterator<Item = usize>) -> Self {
        let mut lines: Vec<usize> = lines.into_iter().filter(|&l| l > 0).collect();
        lines.sort_unstable();
        lines.dedup();
        Location::Lines(lines)
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Location::Global)
    }

    /// Referenced lines; empty for global concerns
    pub fn line_numbers(&self) -> &[usize] {
        match self {
            Location::Global => &[],
            Location::Lines(lines) => lines,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Global => write!(f, "global"),
            Location::Lines(lines) => {
                let parts: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLocation {
    Text(String),
    Line(usize),
    Lines(Vec<usize>),
}

impl TryFrom<RawLocation> for Location {
    type Error = String;

    fn try_from(raw: RawLocation) -> Result<Self, Self::Error> {
        match raw {
            RawLocation::Text(text) if text.eq_ignore_ascii_case("global") => Ok(Location::Global),
            RawLocation::Text(text) => Err(format!("invalid location '{}'", text)),
            RawLocation::Line(line) => Ok(Location::lines([line])),
            RawLocation::Lines(lines) => Ok(Location::lines(lines)),
        }
    }
}

impl From<Location> for RawLocation {
    fn from(location: Location) -> Self {
        match location {
            Location::Global => RawLocation::Text("global".to_string()),
            Location::Lines(lines) => RawLocation::Lines(lines),
        }
    }
}

/// A single audit finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concern {
    /// Stable identifier, used for de-duplication when merging
    pub id: String,
    pub location: Location,
    #[serde(default)]
    pub impact: Impact,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Alternative approaches (full audits only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    /// Why the alternatives are preferable (full audits only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Content hash of each referenced line when the concern was produced
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub line_hashes: BTreeMap<usize, String>,
}

impl Concern {
    pub fn new(
        id: impl Into<String>,
        location: Location,
        impact: Impact,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            location,
            impact,
            summary: summary.into(),
            technical_summary: None,
            details: None,
            alternatives: Vec::new(),
            rationale: None,
            line_hashes: BTreeMap::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Record the current hash of every referenced line
    pub fn annotate(&mut self, current: &LineHashMap) {
        self.line_hashes = self
            .location
            .line_numbers()
            .iter()
            .filter_map(|&line| current.get(line).map(|hash| (line, hash.to_string())))
            .collect();
    }
}

/// Findings of one audit run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    #[serde(default)]
    pub level: AuditLevel,
    #[serde(default)]
    pub concerns: Vec<Concern>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

impl AuditReport {
    pub fn new(level: AuditLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_concern(mut self, concern: Concern) -> Self {
        self.concerns.push(concern);
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.open_questions.push(question.into());
        self
    }

    /// Force the report to a level; fast reports carry no alternatives or rationale
    pub fn normalize(&mut self, level: AuditLevel) {
        self.level = level;
        if level == AuditLevel::Fast {
            for concern in &mut self.concerns {
                concern.alternatives.clear();
                concern.rationale = None;
            }
        }
    }

    pub fn concern(&self, id: &str) -> Option<&Concern> {
        self.concerns.iter().find(|c| c.id == id)
    }
}

/// A report as persisted, with the hashes it was computed against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAudit {
    pub schema_version: u32,
    pub fingerprint: Fingerprint,
    pub level: AuditLevel,
    /// SHA-256 of the whole audited code
    pub code_hash: String,
    pub line_hashes: LineHashMap,
    pub report: AuditReport,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_serializes_as_global_or_lines() {
        assert_eq!(serde_json::to_string(&Location::Global).unwrap(), "\"global\"");
        assert_eq!(
            serde_json::to_string(&Location::lines([11, 10, 10])).unwrap(),
            "[10,11]"
        );

        let parsed: Location = serde_json::from_str("\"GLOBAL\"").unwrap();
        assert!(parsed.is_global());
        let parsed: Location = serde_json::from_str("[3, 0, 1]").unwrap();
        assert_eq!(parsed.line_numbers(), &[1, 3]);
        let parsed: Location = serde_json::from_str("7").unwrap();
        assert_eq!(parsed.line_numbers(), &[7]);
        assert!(serde_json::from_str::<Location>("\"somewhere\"").is_err());
    }

    #[test]
    fn test_concern_parses_minimal_json() {
        let json = r#"{"id": "C1", "location": [10, 11], "impact": "high", "summary": "leaks listener"}"#;
        let concern: Concern = serde_json::from_str(json).unwrap();
        assert_eq!(concern.impact, Impact::High);
        assert_eq!(concern.location, Location::Lines(vec![10, 11]));
        assert!(concern.line_hashes.is_empty());
    }

    #[test]
    fn test_fast_normalization_strips_full_fields() {
        let mut report = AuditReport::new(AuditLevel::Full).with_concern(
            Concern::new("C1", Location::Global, Impact::Low, "naming")
                .with_alternative("rename")
                .with_rationale("clarity"),
        );
        report.normalize(AuditLevel::Fast);
        assert_eq!(report.level, AuditLevel::Fast);
        assert!(report.concerns[0].alternatives.is_empty());
        assert!(report.concerns[0].rationale.is_none());
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("FULL".parse::<AuditLevel>().unwrap(), AuditLevel::Full);
        assert!("deep".parse::<AuditLevel>().is_err());
        assert_eq!(AuditLevel::Fast.to_string(), "fast");
    }

    #[test]
    fn test_level_and_impact_defaults() {
        assert_eq!(AuditLevel::default(), AuditLevel::Fast);
        assert_eq!(Impact::default(), Impact::Medium);
    }
}
