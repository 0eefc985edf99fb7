//! Controller-witness attestation service.
//!
//! A request names a prior attestation binding a `subject` DID to a
//! `controller`. The service checks the registry allow-lists, confirms the
//! prior attestation on the ledger, corroborates the binding off-chain, and
//! issues at most one witness attestation per subject/controller pair.

pub mod allowlist;
pub mod cache;
pub mod config;
pub mod error;
pub mod evidence;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod reader;
pub mod submitter;
pub mod validate;
