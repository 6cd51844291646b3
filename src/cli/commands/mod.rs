//! Command implementations

pub mod audit;
pub mod cache;
pub mod completions;
pub mod config;
pub mod fingerprint;
pub mod init;
pub mod validate;
