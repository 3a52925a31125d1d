#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that stop a batch before any submission is processed.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A required file (rubric, template, course definition) is missing.
    #[error("The {what} file `{}` could not be found.", path.display())]
    MissingFile {
        /// What kind of file was expected.
        what: &'static str,
        /// The path that was looked up.
        path: PathBuf,
    },
    /// A file exists but its contents could not be understood.
    #[error("The {what} file `{}` is invalid: {reason}", path.display())]
    Invalid {
        /// What kind of file was being read.
        what:   &'static str,
        /// The offending path.
        path:   PathBuf,
        /// Parser or validation message.
        reason: String,
    },
    /// Two rubric criteria share a display name.
    #[error("Criterion `{0}` appears more than once in the rubric.")]
    DuplicateCriterion(String),
    /// The rubric has no criteria at all.
    #[error("The rubric does not define any criteria.")]
    EmptyRubric,
    /// The requested activity is not defined for the unit.
    #[error("Activity `{activity}` was not found in unit {unit} of course `{course}`.")]
    UnknownActivity {
        /// Course code.
        course:   String,
        /// Unit number.
        unit:     u32,
        /// Activity identifier.
        activity: String,
    },
    /// A required environment variable is missing or empty.
    #[error("Environment variable `{0}` must be set.")]
    MissingEnv(&'static str),
}

/// Failures turning raw model output into a schema-conforming result.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StructuredOutputError {
    /// None of the extraction strategies produced a parseable object.
    #[error("Could not extract a JSON object from the response:\n{preview}")]
    Extraction {
        /// Leading portion of the raw response, kept for diagnostics.
        preview: String,
    },
    /// The object was parsed but does not match the output schema.
    #[error("Invalid field `{field}`: {message}")]
    Validation {
        /// Path of the offending field, e.g. `puntajes[2].maximo`.
        field:   String,
        /// What is wrong with it.
        message: String,
    },
}

impl StructuredOutputError {
    /// Shorthand for a validation failure on `field`.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field:   field.into(),
            message: message.into(),
        }
    }
}

/// The pipeline stage a submission failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Input-size guard before the capability call.
    SizeLimit,
    /// Network or credential failure talking to the capability.
    Transport,
    /// Extraction or validation of the model output.
    StructuredOutput,
    /// The corrective request also produced unusable output.
    Repair,
    /// Collecting the tutor's manual evaluation.
    Manual,
    /// Writing the finished record.
    Persistence,
    /// The batch was interrupted before this submission started.
    Interrupted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SizeLimit => "size limit",
            Stage::Transport => "transport",
            Stage::StructuredOutput => "structured output",
            Stage::Repair => "repair",
            Stage::Manual => "manual evaluation",
            Stage::Persistence => "persistence",
            Stage::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// Per-submission failures. These are captured as data by the batch
/// orchestrator and never cross submission boundaries.
#[derive(thiserror::Error, Debug)]
pub enum GradingError {
    /// The estimated input exceeds the configured ceiling.
    #[error(
        "Document too large ({estimated} estimated tokens, limit {limit}); requires manual review."
    )]
    DocumentTooLarge {
        /// Estimated input tokens.
        estimated: usize,
        /// Configured ceiling.
        limit:     usize,
    },
    /// Network, credential or provider failure, passed through unchanged.
    #[error("Capability call failed: {0:#}")]
    Transport(anyhow::Error),
    /// Output could not be extracted or validated.
    #[error(transparent)]
    StructuredOutput(#[from] StructuredOutputError),
    /// Both the primary and the corrective attempt failed.
    #[error("No valid structured output after one repair attempt. Original error: {original}. Retry error: {retry}")]
    RepairFailed {
        /// Error from the primary attempt.
        original: String,
        /// Error from the corrective attempt.
        retry:    String,
    },
    /// The manual evaluation could not be collected.
    #[error("Manual evaluation failed: {0:#}")]
    Manual(anyhow::Error),
    /// The finished record could not be written.
    #[error("Could not persist feedback: {0:#}")]
    Persistence(anyhow::Error),
    /// The batch was interrupted before this submission started.
    #[error("Batch interrupted before this submission was processed.")]
    Interrupted,
}

impl GradingError {
    /// Returns the stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            GradingError::DocumentTooLarge { .. } => Stage::SizeLimit,
            GradingError::Transport(_) => Stage::Transport,
            GradingError::StructuredOutput(_) => Stage::StructuredOutput,
            GradingError::RepairFailed { .. } => Stage::Repair,
            GradingError::Manual(_) => Stage::Manual,
            GradingError::Persistence(_) => Stage::Persistence,
            GradingError::Interrupted => Stage::Interrupted,
        }
    }
}
