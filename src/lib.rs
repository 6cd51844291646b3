//! widgetsmith: lifecycle engine for LLM-generated notebook widgets
//!
//! Generated widget code is cached under a deterministic fingerprint of the
//! request that produced it, repaired in a bounded generate/validate loop,
//! and audited incrementally so findings on unchanged lines carry over from
//! one revision to the next.

pub mod cli;
pub mod core;
