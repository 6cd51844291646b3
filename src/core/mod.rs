//! Core module - the artifact lifecycle engine

pub mod audit;
pub mod config;
pub mod fingerprint;
pub mod orchestrator;
pub mod pipeline;
pub mod project;
pub mod store;

pub use audit::{AuditEngine, AuditLevel, AuditReport, AuditStore, Concern, Location, StoredAudit};
pub use config::Config;
pub use fingerprint::{Fingerprint, RequestSpec};
pub use orchestrator::{GenerationOutcome, Orchestrator};
pub use pipeline::{ArtifactResult, Pipeline, PipelineError};
pub use project::{Project, ProjectError};
pub use store::{ArtifactStore, StoreError};
