//! SlopStopper: watch-history ingestion and LLM content analysis.
//!
//! The pipeline has three phases, each independently runnable:
//! ingestion ([`ingest`]) turns raw history exports into canonical
//! records, orchestration ([`analyze`]) claims records and runs them
//! through the provider, and comparison ([`compare`]) A/B-tests two
//! models on one record with a judge. The record store ([`database`])
//! coordinates everything through conditional status updates.

pub mod analyze;
pub mod compare;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod pricing;
pub mod prompts;
pub mod provider;
pub mod schema;

pub use error::AppError;
