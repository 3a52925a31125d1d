//! # retro
//!
//! Rubric-based formative feedback for written submissions. A language
//! model scores each submission against the rubric and writes a narrative;
//! tutor-entered scores for criteria the model cannot judge are merged in
//! afterwards.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Engine tuning and provider settings
pub mod config;
/// Course and activity definitions
pub mod course;
/// Error types shared across the crate
pub mod error;
/// The grading pipeline
pub mod grade;
/// Rubric and prompt template loading
pub mod rubric;
/// Submission input
pub mod submission;
/// Batch reports and grade roll-ups
pub mod summary;

pub use config::{EngineConfig, ProviderEnv};
pub use error::{ConfigError, GradingError, Stage, StructuredOutputError};
pub use rubric::{Criterion, PromptTemplate, Rubric};
pub use submission::Submission;
