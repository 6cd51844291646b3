//! Collaborator contracts for the generation loop
//!
//! The orchestrator owns control flow only. Code generation, validation,
//! runtime testing and error diagnosis are supplied by the caller through the
//! traits below.

use serde::Serialize;
use thiserror::Error;

use crate::core::fingerprint::{DataShape, RequestSpec, TraitMap};

/// Failure of a provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider transport failure: {0}")]
    Transport(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("provider returned no code")]
    EmptyResponse,
}

/// Context about the data a widget is generated for
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataInfo {
    pub data_shape: Option<DataShape>,
    pub columns: Vec<String>,
    /// A few sample rows, as JSON records
    pub sample: Vec<serde_json::Value>,
    pub exports: TraitMap,
    pub imports: TraitMap,
    pub theme_description: Option<String>,
}

impl DataInfo {
    /// Data context carrying the request's shape, traits and theme
    pub fn from_spec(spec: &RequestSpec) -> Self {
        Self {
            data_shape: spec.data_shape,
            exports: spec.exports.clone(),
            imports: spec.imports.clone(),
            theme_description: spec.theme_description.clone(),
            ..Default::default()
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sample(mut self, sample: Vec<serde_json::Value>) -> Self {
        self.sample = sample;
        self
    }

    pub fn export_names(&self) -> Vec<String> {
        self.exports.keys().cloned().collect()
    }

    pub fn import_names(&self) -> Vec<String> {
        self.imports.keys().cloned().collect()
    }
}

/// Result of a structural or runtime check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub ok: bool,
    /// Problems that must be repaired
    pub issues: Vec<String>,
    /// Advisory findings; never trigger a repair
    pub warnings: Vec<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn from_findings(issues: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            ok: issues.is_empty(),
            issues,
            warnings,
        }
    }
}

/// Root-cause guess for a runtime error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnosis {
    pub root_cause: String,
    pub affected_lines: Vec<usize>,
}

/// Turns prompts into candidate code
pub trait GenerationProvider {
    fn generate(&self, description: &str, data: &DataInfo) -> Result<String, ProviderError>;

    fn revise(&self, code: &str, instruction: &str, data: &DataInfo) -> Result<String, ProviderError>;

    fn fix_error(&self, code: &str, error_message: &str, data: &DataInfo) -> Result<String, ProviderError>;

    /// Repair code given every outstanding issue
    fn repair(
        &self,
        code: &str,
        issues: &[String],
        diagnosis: Option<&Diagnosis>,
        data: &DataInfo,
    ) -> Result<String, ProviderError>;
}

/// Static checks on candidate code
pub trait Validator {
    fn validate(&self, code: &str, expected_exports: &[String], expected_imports: &[String]) -> CheckOutcome;
}

/// Executes candidate code in some sandbox
pub trait RuntimeTester {
    fn runtime_test(&self, code: &str) -> CheckOutcome;
}

pub trait Diagnoser {
    fn diagnose(&self, error_message: &str, code: &str) -> Diagnosis;
}

/// Deterministic, idempotent text fixer applied to every candidate
pub trait Sanitizer {
    fn sanitize(&self, code: &str) -> String;

    /// Whether an issue reported by a check is one this sanitizer fixes
    fn addresses(&self, issue: &str) -> bool;
}

/// Kind of a progress notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Step,
    /// Streamed provider output; providers may emit these themselves
    Chunk,
    Complete,
    Error,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Step => "step",
            ProgressKind::Chunk => "chunk",
            ProgressKind::Complete => "complete",
            ProgressKind::Error => "error",
        }
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-way progress channel
pub trait ProgressSink {
    fn emit(&self, kind: ProgressKind, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressKind, &str),
{
    fn emit(&self, kind: ProgressKind, message: &str) {
        self(kind, message)
    }
}
