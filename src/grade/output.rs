#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The persisted feedback record and where it is written.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::{
    reconcile::{ManualEvaluation, Reconciled},
    results::{AiFeedback, ScoreSet, Totals},
};
use crate::submission::Submission;

/// Batch-level facts echoed into every record.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct RunInfo {
    /// Course code.
    #[serde(rename = "curso")]
    pub course:       String,
    /// Unit number.
    #[serde(rename = "unidad")]
    pub unit:         u32,
    /// Activity identifier.
    #[serde(rename = "actividad")]
    pub activity:     String,
    /// Rubric file name or other reference.
    #[serde(rename = "rubrica_usada")]
    pub rubric:       String,
    /// Activity description from the course file.
    #[serde(rename = "descripcion_yaml", default)]
    #[builder(default)]
    pub description:  String,
    /// Instructions given to students.
    #[serde(rename = "activity_instructions", default)]
    #[builder(default)]
    pub instructions: String,
}

/// Who and what a record is about.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct RecordMetadata {
    /// Student display name.
    #[serde(rename = "estudiante")]
    pub student:       String,
    /// Original submission file name.
    #[serde(rename = "archivo_original")]
    pub original_file: String,
    /// When the record was produced.
    #[serde(rename = "fecha_procesamiento")]
    #[builder(default = Utc::now())]
    pub processed_at:  DateTime<Utc>,
    /// Course code.
    #[serde(rename = "curso")]
    pub course:        String,
    /// Unit number.
    #[serde(rename = "unidad")]
    pub unit:          u32,
    /// Activity identifier.
    #[serde(rename = "actividad")]
    pub activity:      String,
    /// Rubric reference.
    #[serde(rename = "rubrica_usada")]
    pub rubric:        String,
    /// Activity description.
    #[serde(rename = "descripcion_yaml", default)]
    #[builder(default)]
    pub description:   String,
    /// Activity instructions.
    #[serde(rename = "activity_instructions", default)]
    #[builder(default)]
    pub instructions:  String,
    /// The graded text, kept so the record can be regraded later.
    #[serde(rename = "student_text", default)]
    #[builder(default)]
    pub student_text:  String,
}

/// Scores and comments delivered to the student.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeedbackBody {
    /// Per-criterion scores; manual entries carry `"manual": true`.
    #[serde(rename = "puntajes")]
    pub scores:          ScoreSet,
    /// Formative narrative.
    #[serde(rename = "comentario_narrativo")]
    pub narrative:       String,
    /// Short summary for the LMS.
    #[serde(rename = "resumen_para_moodle")]
    pub summary:         String,
    /// Final totals, present for hybrid runs.
    #[serde(flatten)]
    pub totals:          Option<Totals>,
    /// Tutor scores as entered, present for hybrid runs.
    #[serde(rename = "puntajes_manuales", default, skip_serializing_if = "Option::is_none")]
    pub manual_scores:   Option<BTreeMap<String, f64>>,
    /// Tutor comments as entered, present for hybrid runs.
    #[serde(rename = "comentarios_manuales", default, skip_serializing_if = "Option::is_none")]
    pub manual_comments: Option<BTreeMap<String, String>>,
}

/// One persisted grading result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    /// Run and submission metadata.
    pub metadata: RecordMetadata,
    /// The feedback itself.
    #[serde(rename = "retroalimentacion")]
    pub feedback: FeedbackBody,
}

impl FeedbackRecord {
    /// Wraps a validated model result with run and submission metadata.
    /// The summary is cut to `summary_max_chars`.
    pub fn assemble(
        run: &RunInfo,
        submission: &Submission,
        feedback: AiFeedback,
        summary_max_chars: usize,
    ) -> Self {
        let metadata = RecordMetadata::builder()
            .student(submission.display_name.clone())
            .original_file(submission.original_filename.clone())
            .course(run.course.clone())
            .unit(run.unit)
            .activity(run.activity.clone())
            .rubric(run.rubric.clone())
            .description(run.description.clone())
            .instructions(run.instructions.clone())
            .student_text(submission.text.clone())
            .build();

        Self {
            metadata,
            feedback: FeedbackBody {
                scores:          feedback.scores,
                narrative:       feedback.narrative,
                summary:         bounded_summary(feedback.summary, summary_max_chars),
                totals:          None,
                manual_scores:   None,
                manual_comments: None,
            },
        }
    }

    /// Replaces the scores with a reconciled set and records the manual
    /// input and final totals.
    pub fn with_manual(mut self, manual: &ManualEvaluation, reconciled: Reconciled) -> Self {
        self.feedback.scores = reconciled.scores;
        self.feedback.totals = Some(reconciled.totals);
        self.feedback.manual_scores = Some(
            manual
                .scores()
                .map(|(criterion, score)| (criterion.to_string(), score))
                .collect(),
        );
        self.feedback.manual_comments = Some(
            manual
                .comments()
                .map(|(criterion, comment)| (criterion.to_string(), comment.to_string()))
                .collect(),
        );
        self
    }

    /// Final totals if recorded, otherwise the sum of the scores.
    pub fn totals(&self) -> Totals {
        self.feedback
            .totals
            .unwrap_or_else(|| self.feedback.scores.totals())
    }

    /// Reads a record back from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not read feedback record {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Could not parse feedback record {}", path.display()))
    }
}

/// Cuts `summary` to at most `max_chars` characters.
fn bounded_summary(summary: String, max_chars: usize) -> String {
    match summary.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            tracing::warn!(
                "Summary has {} characters; truncating to {max_chars}",
                summary.chars().count()
            );
            summary[..idx].trim_end().to_string()
        }
        None => summary,
    }
}

/// Makes `name` safe to use as a single path component.
///
/// Reserved characters become `_`, runs of whitespace become one `_`,
/// leading and trailing dots are dropped and an empty result becomes
/// `unnamed`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => out.push('_'),
            _ => out.push(c),
        }
    }

    let trimmed = out.trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<base>/<course>/unidad_<unit>/actividad_<activity>`.
pub fn activity_dir(base: &Path, course: &str, unit: u32, activity: &str) -> PathBuf {
    base.join(sanitize(course))
        .join(format!("unidad_{unit}"))
        .join(format!("actividad_{}", sanitize(activity)))
}

/// [`activity_dir`]`/<stem>.json`, where the stem is the original file name
/// without its extension.
pub fn output_path(base: &Path, record: &FeedbackRecord) -> PathBuf {
    let metadata = &record.metadata;
    let stem = Path::new(&metadata.original_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| sanitize(&metadata.student));

    activity_dir(base, &metadata.course, metadata.unit, &metadata.activity)
        .join(format!("{stem}.json"))
}

/// Where finished records go.
pub trait FeedbackSink: Send + Sync {
    /// Persists `record` and returns where it was written.
    fn persist(&self, record: &FeedbackRecord) -> Result<PathBuf>;
}

/// Writes pretty-printed JSON under a base directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    /// Root of the output tree.
    base: PathBuf,
}

impl DirectorySink {
    /// Creates a sink rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Root of the output tree.
    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl FeedbackSink for DirectorySink {
    fn persist(&self, record: &FeedbackRecord) -> Result<PathBuf> {
        let path = output_path(&self.base, record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(record).context("Could not serialize record")?;
        fs::write(&path, json).with_context(|| format!("Could not write {}", path.display()))?;
        tracing::debug!("Feedback written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_cut_on_char_boundary() {
        let summary = "é".repeat(10);
        assert_eq!(bounded_summary(summary.clone(), 4), "éééé");
        assert_eq!(bounded_summary(summary.clone(), 10), summary);
    }

    #[test]
    fn sanitize_collapses_whitespace_and_dots() {
        assert_eq!(sanitize("  ..Curso  A/B?.. "), "_..Curso_A_B_.._");
        assert_eq!(sanitize("...Curso A..."), "Curso_A");
        assert_eq!(sanitize("..."), "unnamed");
        assert_eq!(sanitize("a < b"), "a___b");
    }
}
