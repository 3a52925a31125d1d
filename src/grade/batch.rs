#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs the pipeline over a batch of submissions.
//!
//! The prefix is built once per batch. Each submission then goes through
//! manual evaluation (hybrid runs), suffix assembly, the repair loop,
//! reconciliation, record assembly and persistence. A failure anywhere in
//! that chain is captured as that submission's outcome and the batch moves
//! on.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bon::Builder;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};

use super::{
    client::{Capability, CapabilityClient},
    manual::ManualSource,
    output::{FeedbackRecord, FeedbackSink, RunInfo},
    prompt::PromptContext,
    reconcile::reconcile,
    repair::generate_validated,
};
use crate::{
    config::EngineConfig,
    error::{GradingError, Stage},
    submission::Submission,
};

/// Why a submission produced no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSubmission {
    /// Pipeline stage that failed.
    pub stage:   Stage,
    /// Human-readable error, including both messages for failed repairs.
    pub message: String,
}

impl From<GradingError> for FailedSubmission {
    fn from(err: GradingError) -> Self {
        Self {
            stage:   err.stage(),
            message: err.to_string(),
        }
    }
}

/// Result of one submission within a batch.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// Submission identifier.
    pub id:      String,
    /// Student display name.
    pub student: String,
    /// Original file name.
    pub file:    String,
    /// The record, or why there is none.
    pub result:  Result<FeedbackRecord, FailedSubmission>,
}

impl SubmissionOutcome {
    /// Pairs a result with the submission it belongs to.
    fn new(submission: &Submission, result: Result<FeedbackRecord, GradingError>) -> Self {
        Self {
            id:      submission.id.clone(),
            student: submission.display_name.clone(),
            file:    submission.original_filename.clone(),
            result:  result.map_err(FailedSubmission::from),
        }
    }

    /// Whether a record was produced.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The record, if one was produced.
    pub fn record(&self) -> Option<&FeedbackRecord> {
        self.result.as_ref().ok()
    }

    /// The failure, if there was one.
    pub fn failure(&self) -> Option<&FailedSubmission> {
        self.result.as_ref().err()
    }
}

/// Grades batches of submissions against one activity.
#[derive(Builder)]
pub struct BatchGrader<C> {
    /// Capability client, owned for the batch.
    client:  CapabilityClient<C>,
    /// Batch-constant prompt inputs.
    context: PromptContext,
    /// Metadata echoed into records.
    run:     RunInfo,
    /// Engine tuning.
    #[builder(default)]
    config:  EngineConfig,
    /// Where records are persisted, if anywhere.
    sink:    Option<Box<dyn FeedbackSink>>,
    /// Source of manual scores for hybrid runs.
    manual:  Option<Box<dyn ManualSource>>,
    /// Set to stop the batch after the submissions in flight.
    #[builder(default)]
    cancel:  Arc<AtomicBool>,
}

impl<C: Capability> BatchGrader<C> {
    /// Handle that stops the batch when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The capability client.
    pub fn client(&self) -> &CapabilityClient<C> {
        &self.client
    }

    /// Grades `submissions`, returning one outcome per input in input order.
    pub async fn run(&self, submissions: &[Submission]) -> Vec<SubmissionOutcome> {
        let prefix = self.context.cacheable_prefix();
        let total = submissions.len();
        let workers = self.config.effective_workers();
        tracing::info!(
            "Grading {total} submission(s) for {} unit {} activity {} ({workers} worker(s), prefix {} chars)",
            self.run.course,
            self.run.unit,
            self.run.activity,
            prefix.chars().count()
        );

        stream::iter(submissions.iter().enumerate())
            .map(|(index, submission)| self.grade_one(&prefix, index, total, submission))
            .buffered(workers)
            .collect()
            .await
    }

    /// Grades one submission, converting any failure into an outcome.
    async fn grade_one(
        &self,
        prefix: &str,
        index: usize,
        total: usize,
        submission: &Submission,
    ) -> SubmissionOutcome {
        if self.cancel.load(Ordering::SeqCst) {
            return SubmissionOutcome::new(submission, Err(GradingError::Interrupted));
        }

        tracing::info!("[{}/{total}] {}", index + 1, submission.display_name);
        let result = self.grade(prefix, submission).await;
        match &result {
            Ok(record) => tracing::info!(
                "[{}/{total}] {} graded: {}",
                index + 1,
                submission.display_name,
                record.totals()
            ),
            Err(e) => tracing::error!(
                "[{}/{total}] {} failed at {} stage: {e}",
                index + 1,
                submission.display_name,
                e.stage()
            ),
        }
        SubmissionOutcome::new(submission, result)
    }

    /// The per-submission pipeline.
    async fn grade(
        &self,
        prefix: &str,
        submission: &Submission,
    ) -> Result<FeedbackRecord, GradingError> {
        let rubric = self.context.rubric();

        let manual = self
            .manual
            .as_ref()
            .map(|source| source.evaluate(submission, rubric))
            .transpose()
            .map_err(GradingError::Manual)?;

        let suffix = self.context.item_suffix(submission, manual.as_ref());
        let feedback = generate_validated(
            &self.client,
            &self.context,
            prefix,
            &suffix,
            self.config.repair_preview_chars,
        )
        .await?;

        let mut record =
            FeedbackRecord::assemble(&self.run, submission, feedback, self.config.summary_max_chars);

        if let Some(manual) = &manual {
            let reconciled = reconcile(
                &record.feedback.scores,
                manual,
                rubric,
                self.config.default_manual_max,
            );
            record = record.with_manual(manual, reconciled);
        }

        let missing = record.feedback.scores.missing_from(rubric);
        if !missing.is_empty() {
            tracing::warn!(
                "{}: nobody scored {}; totals exclude it",
                submission.display_name,
                missing.join(", ")
            );
        }

        if let Some(sink) = &self.sink {
            sink.persist(&record).map_err(GradingError::Persistence)?;
        }
        Ok(record)
    }
}
