#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The grading pipeline: prompt assembly, the capability call, structured
//! output recovery and repair, reconciliation with tutor scores, and record
//! assembly.

/// Batch orchestration.
pub mod batch;
/// Capability transport and the input-size guard.
pub mod client;
/// Locating JSON in raw model output.
pub mod extract;
/// Tutor-entered scores.
pub mod manual;
/// Persisted record shape and sinks.
pub mod output;
/// Prompt assembly.
pub mod prompt;
/// Merging manual scores into model scores.
pub mod reconcile;
/// The single corrective retry.
pub mod repair;
/// Score types shared across the pipeline.
pub mod results;
/// Output schema checks.
pub mod validate;

pub use batch::{BatchGrader, FailedSubmission, SubmissionOutcome};
pub use client::{Capability, CapabilityClient, CompletionRequest, OpenAiCapability, SizeGuard};
pub use extract::{ExtractionStrategy, extract};
pub use manual::{AutoFullScore, Interactive, ManualSource, Prefilled, prompt_manual_scores};
pub use output::{
    DirectorySink, FeedbackRecord, FeedbackSink, RunInfo, activity_dir, output_path, sanitize,
};
pub use prompt::{GradingPrompts, PromptContext};
pub use reconcile::{ManualEvaluation, Reconciled, auto_full_scores, reconcile};
pub use repair::{generate_validated, parse_response};
pub use results::{AiFeedback, CriterionScore, Origin, ScoreSet, Totals};
pub use validate::validate;
