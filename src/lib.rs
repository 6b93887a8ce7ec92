//! Recipe-driven scoring engine for validated research measurements.
//!
//! A [`recipe::Recipe`] describes how raw survey or biometric item values
//! become derivative scores: item transforms, aggregation methods,
//! missing-data policy, and interpretation bands. The
//! [`scoring::ScoringEngine`] applies a loaded recipe to an in-memory
//! [`table::InputTable`] and produces a format-neutral
//! [`output::ScoredTable`] plus a [`scoring::RunReport`], which export
//! adapters turn into concrete artifacts.

pub mod codebook;
pub mod config;
pub mod error;
pub mod output;
pub mod recipe;
pub mod scoring;
pub mod table;
pub mod telemetry;

pub use error::EngineError;
