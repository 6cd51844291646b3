//! Generation-repair loop
//!
//! ```text
//! GENERATE -> SANITIZE -> CHECK -> (issues? -> REPAIR -> SANITIZE -> CHECK)* -> DONE
//! ```
//!
//! CHECK runs the validator and the runtime tester and unions their issues.
//! The loop is bounded by `max_repair_attempts`; when attempts run out the
//! caller still gets the best code seen together with its surviving issues.
//! Only a failure of the very first provider call is an error.

mod contracts;
mod sanitize;
mod validate;

pub use contracts::*;
pub use sanitize::{strip_fences, HtmSanitizer};
pub use validate::HeuristicValidator;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::Config;

/// Repair rounds after the initial generation unless configured otherwise
pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u32 = 3;

static DEFAULT_SANITIZER: HtmSanitizer = HtmSanitizer;

static RUNTIME_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b[A-Z][A-Za-z]*(?:Error|Exception)\b|\bError:|(?i:uncaught|is not defined|is not a function|cannot read propert)",
    )
    .expect("runtime error regex is valid")
});

/// Errors that abort a generation before any code exists
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("initial provider call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// A request for new or revised code
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub description: String,
    pub data: DataInfo,
    /// Existing code to revise instead of generating from scratch
    pub base_code: Option<String>,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>, data: DataInfo) -> Self {
        Self {
            description: description.into(),
            data,
            base_code: None,
        }
    }

    pub fn with_base_code(mut self, code: impl Into<String>) -> Self {
        self.base_code = Some(code.into());
        self
    }
}

/// Terminal state of a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Done,
    /// Attempts exhausted with issues remaining
    Failed,
}

/// How one repair attempt was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    /// Deterministic sanitizer pass, no provider call
    Sanitize,
    /// Single runtime error sent to the provider's fix entry point
    FixError,
    /// Every issue sent to the provider's general repair entry point
    Repair,
}

impl std::fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairStrategy::Sanitize => write!(f, "sanitize"),
            RepairStrategy::FixError => write!(f, "fix-error"),
            RepairStrategy::Repair => write!(f, "repair"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    pub strategy: RepairStrategy,
    pub issues_before: usize,
    pub issues_after: usize,
    /// Set when the provider call failed; the attempt still counts
    pub provider_error: Option<String>,
}

/// Final code of a generation plus how it got there
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub code: String,
    /// Issues remaining in `code`; empty when `status` is `Done`
    pub issues: Vec<String>,
    pub status: OutcomeStatus,
    pub attempts: Vec<AttemptRecord>,
    /// Total generate/revise/fix/repair calls made
    pub provider_calls: u32,
}

impl GenerationOutcome {
    pub fn is_done(&self) -> bool {
        self.status == OutcomeStatus::Done
    }
}

/// Drives generation and bounded repair against caller-supplied collaborators
pub struct Orchestrator<'a> {
    provider: &'a dyn GenerationProvider,
    validator: &'a dyn Validator,
    runtime: &'a dyn RuntimeTester,
    diagnoser: Option<&'a dyn Diagnoser>,
    sanitizer: &'a dyn Sanitizer,
    progress: Option<&'a dyn ProgressSink>,
    max_repair_attempts: u32,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        provider: &'a dyn GenerationProvider,
        validator: &'a dyn Validator,
        runtime: &'a dyn RuntimeTester,
    ) -> Self {
        Self {
            provider,
            validator,
            runtime,
            diagnoser: None,
            sanitizer: &DEFAULT_SANITIZER,
            progress: None,
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
        }
    }

    pub fn with_diagnoser(mut self, diagnoser: &'a dyn Diagnoser) -> Self {
        self.diagnoser = Some(diagnoser);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: &'a dyn Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    /// Apply the configured repair bound
    pub fn with_config(self, config: &Config) -> Self {
        self.with_max_repair_attempts(config.max_repair_attempts())
    }

    pub fn max_repair_attempts(&self) -> u32 {
        self.max_repair_attempts
    }

    /// Generate code for a request, revising `base_code` when one is given
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome, OrchestratorError> {
        if let Some(base) = &request.base_code {
            return self.revise(base, &request.description, &request.data);
        }

        self.emit(ProgressKind::Step, "Generating widget code...");
        let code = self
            .provider
            .generate(&request.description, &request.data)
            .map_err(|e| self.initial_failure(e))?;
        Ok(self.converge(code, &request.data, 1))
    }

    /// Revise existing code according to an instruction
    pub fn revise(
        &self,
        code: &str,
        instruction: &str,
        data: &DataInfo,
    ) -> Result<GenerationOutcome, OrchestratorError> {
        self.emit(ProgressKind::Step, "Revising widget code...");
        let revised = self
            .provider
            .revise(code, instruction, data)
            .map_err(|e| self.initial_failure(e))?;
        Ok(self.converge(revised, data, 1))
    }

    /// Fix a known error reported against existing code
    pub fn fix_error(
        &self,
        code: &str,
        error_message: &str,
        data: &DataInfo,
    ) -> Result<GenerationOutcome, OrchestratorError> {
        let message = self.diagnosed_message(error_message, code);
        self.emit(ProgressKind::Step, "Repairing code...");
        let fixed = self
            .provider
            .fix_error(code, &message, data)
            .map_err(|e| self.initial_failure(e))?;
        Ok(self.converge(fixed, data, 1))
    }

    fn converge(&self, raw: String, data: &DataInfo, mut provider_calls: u32) -> GenerationOutcome {
        let exports = data.export_names();
        let imports = data.import_names();

        let mut code = self.sanitizer.sanitize(&strip_fences(&raw));
        self.emit(ProgressKind::Step, "Validating code...");
        let mut issues = self.check(&code, &exports, &imports);

        let mut best_code = code.clone();
        let mut best_issues = issues.clone();
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        let mut attempt = 0;
        while !issues.is_empty() && attempt < self.max_repair_attempts {
            attempt += 1;
            let issues_before = issues.len();
            self.emit(
                ProgressKind::Step,
                &format!("Repairing code (attempt {})...", attempt),
            );

            let (strategy, candidate) = self.repair_once(&code, &issues, data, &mut provider_calls);
            let provider_error = match candidate {
                Ok(candidate) => {
                    code = self.sanitizer.sanitize(&strip_fences(&candidate));
                    issues = self.check(&code, &exports, &imports);
                    None
                }
                Err(e) => {
                    warn!(attempt, %strategy, error = %e, "repair attempt failed");
                    self.emit(ProgressKind::Error, &e.to_string());
                    Some(e.to_string())
                }
            };

            debug!(
                attempt,
                %strategy,
                before = issues_before,
                after = issues.len(),
                "repair attempt finished"
            );
            attempts.push(AttemptRecord {
                attempt,
                strategy,
                issues_before,
                issues_after: issues.len(),
                provider_error,
            });

            if issues.len() <= best_issues.len() {
                best_code = code.clone();
                best_issues = issues.clone();
            }
        }

        let status = if best_issues.is_empty() {
            self.emit(ProgressKind::Complete, "Widget generation complete");
            OutcomeStatus::Done
        } else {
            self.emit(
                ProgressKind::Error,
                &format!("{} issue(s) remain after {} repair attempt(s)", best_issues.len(), attempt),
            );
            OutcomeStatus::Failed
        };

        info!(
            status = ?status,
            attempts = attempts.len(),
            provider_calls,
            issues = best_issues.len(),
            "generation finished"
        );

        GenerationOutcome {
            code: best_code,
            issues: best_issues,
            status,
            attempts,
            provider_calls,
        }
    }

    /// Pick a strategy for the outstanding issues and run it
    fn repair_once(
        &self,
        code: &str,
        issues: &[String],
        data: &DataInfo,
        provider_calls: &mut u32,
    ) -> (RepairStrategy, Result<String, ProviderError>) {
        if issues.iter().all(|issue| self.sanitizer.addresses(issue)) {
            let sanitized = self.sanitizer.sanitize(code);
            if sanitized != code {
                return (RepairStrategy::Sanitize, Ok(sanitized));
            }
            debug!("sanitizer cannot resolve the remaining issues, asking the provider");
        }

        *provider_calls += 1;
        if let [only] = issues {
            if RUNTIME_ERROR.is_match(only) {
                let message = self.diagnosed_message(only, code);
                return (RepairStrategy::FixError, self.provider.fix_error(code, &message, data));
            }
        }

        let diagnosis = self
            .diagnoser
            .and_then(|d| issues.iter().find(|i| RUNTIME_ERROR.is_match(i)).map(|i| d.diagnose(i, code)));
        (
            RepairStrategy::Repair,
            self.provider.repair(code, issues, diagnosis.as_ref(), data),
        )
    }

    /// Validator and runtime issues, both checks always run
    fn check(&self, code: &str, exports: &[String], imports: &[String]) -> Vec<String> {
        let validation = self.validator.validate(code, exports, imports);
        let runtime = self.runtime.runtime_test(code);

        for warning in validation.warnings.iter().chain(&runtime.warnings) {
            debug!(%warning, "check warning");
        }

        let mut issues = validation.issues;
        issues.extend(runtime.issues);
        issues
    }

    /// Append the diagnoser's root-cause guess to an error message
    fn diagnosed_message(&self, error_message: &str, code: &str) -> String {
        let Some(diagnoser) = self.diagnoser else {
            return error_message.to_string();
        };
        self.emit(ProgressKind::Step, "Diagnosing error...");
        let diagnosis = diagnoser.diagnose(error_message, code);
        if diagnosis.root_cause.is_empty() {
            return error_message.to_string();
        }

        let mut message = format!("{}\n\nLikely cause: {}", error_message, diagnosis.root_cause);
        if !diagnosis.affected_lines.is_empty() {
            let lines: Vec<String> = diagnosis.affected_lines.iter().map(|l| l.to_string()).collect();
            message.push_str(&format!("\nAffected lines: {}", lines.join(", ")));
        }
        message
    }

    fn initial_failure(&self, error: ProviderError) -> OrchestratorError {
        warn!(error = %error, "provider call failed before any code was produced");
        self.emit(ProgressKind::Error, &error.to_string());
        OrchestratorError::Provider(error)
    }

    fn emit(&self, kind: ProgressKind, message: &str) {
        debug!(kind = kind.as_str(), "{}", message);
        if let Some(progress) = self.progress {
            progress.emit(kind, message);
        }
    }
}
