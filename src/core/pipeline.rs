//! End-to-end artifact lifecycle
//!
//! Ties the store, the generation loop and the audit engine together:
//! probe the cache, generate on a miss, save with lineage, and audit against
//! the nearest prior report.

use thiserror::Error;
use tracing::{debug, info};

use crate::core::audit::{AuditAnalyzer, AuditEngine, AuditError, AuditLevel, AuditOutcome, AuditStore, StoredAudit};
use crate::core::config::Config;
use crate::core::fingerprint::{Fingerprint, RequestSpec};
use crate::core::orchestrator::{DataInfo, GenerationOutcome, GenerationRequest, Orchestrator, OrchestratorError};
use crate::core::project::Project;
use crate::core::store::{ArtifactMeta, ArtifactStore, LocatedArtifact, StoreError};

/// Errors surfaced by pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] OrchestratorError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("no stored artifact with fingerprint {0}")]
    UnknownArtifact(Fingerprint),
}

/// Result of a create or edit
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    /// The stored artifact; incomplete when generation gave up with issues left
    pub artifact: LocatedArtifact,
    pub code: String,
    pub from_cache: bool,
    /// Generation details; absent on a cache hit
    pub generation: Option<GenerationOutcome>,
}

impl ArtifactResult {
    /// Surviving issues of the returned code
    pub fn issues(&self) -> &[String] {
        &self.artifact.issues
    }
}

/// One project's artifact lifecycle
pub struct Pipeline<'a> {
    store: ArtifactStore,
    audits: AuditStore,
    orchestrator: Orchestrator<'a>,
    config: Config,
}

impl<'a> Pipeline<'a> {
    /// Use the orchestrator as given, with default audit settings
    pub fn new(project: &Project, orchestrator: Orchestrator<'a>) -> Result<Self, PipelineError> {
        Self::with_config(project, orchestrator, Config::default())
    }

    /// Load the project's layered config and apply it to the orchestrator
    pub fn from_project(project: &Project, orchestrator: Orchestrator<'a>) -> Result<Self, PipelineError> {
        let config = Config::load_for(Some(project));
        let orchestrator = orchestrator.with_config(&config);
        Self::with_config(project, orchestrator, config)
    }

    fn with_config(project: &Project, orchestrator: Orchestrator<'a>, config: Config) -> Result<Self, PipelineError> {
        Ok(Self {
            store: ArtifactStore::open(project)?,
            audits: AuditStore::new(project),
            orchestrator,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ArtifactStore {
        &mut self.store
    }

    pub fn audits(&self) -> &AuditStore {
        &self.audits
    }

    /// Return the cached artifact for a request, generating and saving it on a miss
    ///
    /// Generations that end with issues remaining are cached too, with the
    /// issues recorded on the artifact. Callers that want a clean widget can
    /// check [`ArtifactResult::issues`] and clear the entry to regenerate.
    pub fn create(
        &mut self,
        spec: &RequestSpec,
        data: &DataInfo,
        meta: ArtifactMeta,
    ) -> Result<ArtifactResult, PipelineError> {
        self.store.reload();
        if let Some(hit) = self.store.lookup(spec, meta.label.as_deref()) {
            if let Some(code) = self.store.load_code(&hit) {
                info!(
                    fingerprint = hit.fingerprint.short(),
                    label = %hit.label,
                    complete = hit.is_complete(),
                    "using cached artifact"
                );
                return Ok(ArtifactResult {
                    artifact: hit,
                    code,
                    from_cache: true,
                    generation: None,
                });
            }
        }

        for reason in self.store.explain_miss(spec, meta.label.as_deref()) {
            debug!(%reason, "cache miss");
        }

        let request = GenerationRequest::new(spec.description.clone(), data.clone());
        let outcome = self.orchestrator.generate(&request)?;
        self.finish(spec, meta, outcome)
    }

    /// Revise a stored artifact into a new one linked to it
    ///
    /// `spec` describes the edited widget; the label defaults to the parent's.
    pub fn edit(
        &mut self,
        parent: &Fingerprint,
        instruction: &str,
        spec: &RequestSpec,
        data: &DataInfo,
        mut meta: ArtifactMeta,
    ) -> Result<ArtifactResult, PipelineError> {
        self.store.reload();
        let (parent_artifact, parent_code) = self
            .store
            .load_by_fingerprint(parent)
            .ok_or_else(|| PipelineError::UnknownArtifact(parent.clone()))?;

        if meta.label.is_none() {
            meta.label = Some(parent_artifact.label.clone());
        }
        meta.revision_parent = Some(parent.clone());

        let outcome = self.orchestrator.revise(&parent_code, instruction, data)?;
        self.finish(spec, meta, outcome)
    }

    fn finish(
        &mut self,
        spec: &RequestSpec,
        meta: ArtifactMeta,
        outcome: GenerationOutcome,
    ) -> Result<ArtifactResult, PipelineError> {
        if !outcome.is_done() {
            info!(issues = outcome.issues.len(), "generation did not converge, caching best effort");
        }
        let meta = meta.with_issues(outcome.issues.clone());
        let artifact = self.store.save(&outcome.code, spec, meta)?;

        Ok(ArtifactResult {
            artifact,
            code: outcome.code.clone(),
            from_cache: false,
            generation: Some(outcome),
        })
    }

    /// Audit at the configured default level and reuse setting
    pub fn audit_with_defaults(
        &self,
        fingerprint: &Fingerprint,
        analyzer: &dyn AuditAnalyzer,
    ) -> Result<AuditOutcome, PipelineError> {
        self.audit(
            fingerprint,
            self.config.default_audit_level(),
            self.config.audit_reuse(),
            analyzer,
        )
    }

    /// Audit a stored artifact, reusing the nearest prior report
    ///
    /// The prior report is the artifact's own audit at this level, otherwise
    /// the audit of the closest ancestor in its revision lineage.
    pub fn audit(
        &self,
        fingerprint: &Fingerprint,
        level: AuditLevel,
        reuse: bool,
        analyzer: &dyn AuditAnalyzer,
    ) -> Result<AuditOutcome, PipelineError> {
        let (_, code) = self
            .store
            .load_by_fingerprint(fingerprint)
            .ok_or_else(|| PipelineError::UnknownArtifact(fingerprint.clone()))?;

        let previous = if reuse { self.prior_audit(fingerprint, level) } else { None };
        let inherited = previous.as_ref().is_some_and(|p| &p.fingerprint != fingerprint);

        let outcome = AuditEngine::new(analyzer).run(fingerprint, &code, level, previous.as_ref(), reuse)?;
        if outcome.fresh_analysis || inherited {
            self.audits.save(&outcome.audit)?;
        }
        Ok(outcome)
    }

    fn prior_audit(&self, fingerprint: &Fingerprint, level: AuditLevel) -> Option<StoredAudit> {
        if let Some(own) = self.audits.load(fingerprint, level) {
            return Some(own);
        }
        self.store
            .lineage(fingerprint)
            .iter()
            .skip(1)
            .find_map(|ancestor| {
                let found = self.audits.load(&ancestor.fingerprint, level);
                if found.is_some() {
                    debug!(ancestor = ancestor.fingerprint.short(), "reusing audit of lineage parent");
                }
                found
            })
    }
}
