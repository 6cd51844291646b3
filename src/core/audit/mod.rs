//! Incremental audit engine
//!
//! An audit of a code artifact is a list of concerns, each located either
//! globally or on specific lines. When code is re-audited, concerns whose
//! referenced lines still hash the same are carried over; only the changed
//! region needs fresh analysis.
//!
//! New concerns that land entirely on unchanged lines are dropped on the
//! assumption that they restate a carried-over concern. That is a heuristic:
//! an analyzer that finds something new in untouched code on a re-run will
//! not have it reported until those lines change or reuse is disabled.

mod lines;
mod store;
mod types;

pub use lines::LineHashMap;
pub use store::AuditStore;
pub use types::*;

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::fingerprint::{content_hash, Fingerprint};
use crate::core::store::StoreError;

/// Errors reported by an analysis backend
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analysis backend unavailable: {0}")]
    Transport(String),

    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}

/// Errors that can occur while running or persisting an audit
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("fresh analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize audit: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to render audit as YAML: {0}")]
    Render(#[from] serde_yml::Error),
}

/// What the analysis backend is asked to look at
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub code: &'a str,
    pub level: AuditLevel,
    /// Lines that changed since the previous audit; `None` means audit everything
    pub changed_lines: Option<&'a BTreeSet<usize>>,
}

/// Produces fresh audit findings for a piece of code
pub trait AuditAnalyzer {
    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<AuditReport, AnalyzerError>;
}

/// Result of one audit run
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub audit: StoredAudit,
    /// Concerns carried over from the previous audit
    pub reused_count: usize,
    /// Concerns contributed by fresh analysis
    pub updated_count: usize,
    /// Ids of previous concerns invalidated by the edit
    pub stale_ids: Vec<String>,
    /// Whether the analyzer was called
    pub fresh_analysis: bool,
}

/// Runs audits against an analysis backend, reusing prior findings
pub struct AuditEngine<'a> {
    analyzer: &'a dyn AuditAnalyzer,
}

impl<'a> AuditEngine<'a> {
    pub fn new(analyzer: &'a dyn AuditAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Audit `code`, carrying over still-valid concerns from `previous`
    ///
    /// A previous audit at a different level, or any previous audit when
    /// `reuse` is off, is ignored and the code is analyzed in full.
    pub fn run(
        &self,
        fingerprint: &Fingerprint,
        code: &str,
        level: AuditLevel,
        previous: Option<&StoredAudit>,
        reuse: bool,
    ) -> Result<AuditOutcome, AuditError> {
        let current_lines = LineHashMap::from_code(code);
        let code_hash = content_hash(code);

        let previous = previous.filter(|prev| {
            let usable = reuse && prev.level == level;
            if !usable {
                debug!(
                    reuse,
                    previous_level = %prev.level,
                    "previous audit not usable, analyzing in full"
                );
            }
            usable
        });

        let Some(prev) = previous else {
            let report = self.fresh(code, level, None)?;
            let concerns = filter_new(report.concerns, &current_lines, None);
            let updated_count = concerns.len();
            let audit = stored(fingerprint, level, code_hash, current_lines, concerns, report.open_questions);
            info!(fingerprint = fingerprint.short(), %level, concerns = updated_count, "full audit");
            return Ok(AuditOutcome {
                audit,
                reused_count: 0,
                updated_count,
                stale_ids: Vec::new(),
                fresh_analysis: true,
            });
        };

        let code_unchanged = prev.code_hash == code_hash;
        let (reused, stale): (Vec<&Concern>, Vec<&Concern>) = prev
            .report
            .concerns
            .iter()
            .partition(|c| still_valid(c, prev, code_unchanged, &current_lines));
        let stale_ids: Vec<String> = stale.iter().map(|c| c.id.clone()).collect();

        if stale_ids.is_empty() && code_unchanged {
            debug!(fingerprint = fingerprint.short(), "code unchanged, reusing audit verbatim");
            let mut audit = prev.clone();
            audit.fingerprint = fingerprint.clone();
            return Ok(AuditOutcome {
                reused_count: audit.report.concerns.len(),
                audit,
                updated_count: 0,
                stale_ids,
                fresh_analysis: false,
            });
        }

        let changed = prev.line_hashes.changed_lines(&current_lines);
        let report = self.fresh(code, level, Some(&changed))?;
        let filter = NewConcernFilter {
            changed: &changed,
            code_changed: !code_unchanged,
        };
        let fresh = filter_new(report.concerns, &current_lines, Some(filter));

        let reused_count = reused.len();
        let mut seen: HashSet<String> = HashSet::new();
        let mut concerns: Vec<Concern> = Vec::new();
        for concern in reused.into_iter().cloned() {
            if seen.insert(concern.id.clone()) {
                concerns.push(concern);
            }
        }
        let mut updated_count = 0;
        for concern in fresh {
            if seen.insert(concern.id.clone()) {
                concerns.push(concern);
                updated_count += 1;
            }
        }

        let open_questions = union_questions(&prev.report.open_questions, report.open_questions);
        let audit = stored(fingerprint, level, code_hash, current_lines, concerns, open_questions);

        info!(
            fingerprint = fingerprint.short(),
            %level,
            reused = reused_count,
            updated = updated_count,
            stale = stale_ids.len(),
            changed_lines = changed.len(),
            "incremental audit"
        );
        Ok(AuditOutcome {
            audit,
            reused_count,
            updated_count,
            stale_ids,
            fresh_analysis: true,
        })
    }

    fn fresh(
        &self,
        code: &str,
        level: AuditLevel,
        changed_lines: Option<&BTreeSet<usize>>,
    ) -> Result<AuditReport, AuditError> {
        let request = AnalysisRequest {
            code,
            level,
            changed_lines,
        };
        let mut report = self.analyzer.analyze(&request)?;
        report.normalize(level);
        Ok(report)
    }
}

/// Whether a previous concern still applies to the current code
///
/// Global concerns survive only an unchanged file. Line concerns survive when
/// every referenced line still exists with the hash recorded for it.
fn still_valid(
    concern: &Concern,
    prev: &StoredAudit,
    code_unchanged: bool,
    current: &LineHashMap,
) -> bool {
    match &concern.location {
        Location::Global => code_unchanged,
        Location::Lines(lines) if lines.is_empty() => false,
        Location::Lines(lines) => lines.iter().all(|&line| {
            let recorded = concern
                .line_hashes
                .get(&line)
                .map(String::as_str)
                .or_else(|| prev.line_hashes.get(line));
            match (recorded, current.get(line)) {
                (Some(old), Some(new)) => old == new,
                _ => false,
            }
        }),
    }
}

struct NewConcernFilter<'a> {
    changed: &'a BTreeSet<usize>,
    code_changed: bool,
}

/// Clamp new concerns to the current file, drop the ones outside the changed
/// region, and record line hashes on the survivors
fn filter_new(
    concerns: Vec<Concern>,
    current: &LineHashMap,
    incremental: Option<NewConcernFilter<'_>>,
) -> Vec<Concern> {
    concerns
        .into_iter()
        .filter_map(|mut concern| {
            if let Location::Lines(lines) = &concern.location {
                let in_range: Vec<usize> = lines
                    .iter()
                    .copied()
                    .filter(|&line| line <= current.len())
                    .collect();
                if in_range.is_empty() {
                    debug!(id = %concern.id, "dropping concern with no lines in the current file");
                    return None;
                }
                concern.location = Location::lines(in_range);
            }

            if let Some(filter) = &incremental {
                let keep = match &concern.location {
                    Location::Global => filter.code_changed,
                    Location::Lines(lines) => lines.iter().any(|line| filter.changed.contains(line)),
                };
                if !keep {
                    debug!(id = %concern.id, "dropping new concern outside the changed region");
                    return None;
                }
            }

            concern.annotate(current);
            Some(concern)
        })
        .collect()
}

fn union_questions(previous: &[String], fresh: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    previous
        .iter()
        .cloned()
        .chain(fresh)
        .filter(|q| seen.insert(q.clone()))
        .collect()
}

fn stored(
    fingerprint: &Fingerprint,
    level: AuditLevel,
    code_hash: String,
    line_hashes: LineHashMap,
    concerns: Vec<Concern>,
    open_questions: Vec<String>,
) -> StoredAudit {
    StoredAudit {
        schema_version: AUDIT_SCHEMA_VERSION,
        fingerprint: fingerprint.clone(),
        level,
        code_hash,
        line_hashes,
        report: AuditReport {
            level,
            concerns,
            open_questions,
        },
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests;
