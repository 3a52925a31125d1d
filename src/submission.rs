#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Submissions as handed over by the document-extraction step.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::grade::{FeedbackRecord, ManualEvaluation};

/// One student's extracted submission. Consumed read-only by the engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct Submission {
    /// Identifier used in batch outcomes.
    pub id:                String,
    /// Extracted plain text.
    pub text:              String,
    /// Display name as it appears in the LMS or file name.
    #[serde(alias = "estudiante")]
    pub display_name:      String,
    /// Original upload file name.
    #[serde(alias = "archivo_original")]
    pub original_filename: String,
    /// Manual scores already collected for this submission, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_scores:     Option<ManualEvaluation>,
}

impl Submission {
    /// The name the feedback should address the student by.
    pub fn first_name(&self) -> String {
        first_name(&self.display_name)
    }
}

/// Derives a first name from an LMS-style display name.
///
/// * `"JUAN PEREZ_1234_assignsubmission_file_"` -> `"Juan"`
/// * `"perez_juan_actividad"` -> `"Juan"`
/// * `"juan"` -> `"Juan"`
pub fn first_name(display_name: &str) -> String {
    let parts: Vec<&str> = display_name.split('_').collect();
    let first_part = parts.first().map(|p| p.trim()).unwrap_or_default();

    let raw = if first_part.contains(char::is_whitespace) {
        first_part.split_whitespace().next().unwrap_or_default()
    } else if parts.len() >= 2 && !parts[1].trim().is_empty() {
        parts[1].trim()
    } else {
        first_part
    };

    capitalize(raw)
}

/// Uppercases the first character and lowercases the rest.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Loads submissions from a JSON array file.
pub fn load_manifest(path: &Path) -> Result<Vec<Submission>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read submissions manifest {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Could not parse submissions manifest {}", path.display()))
}

/// Loads every `*.txt` file in `dir` as a submission, sorted by file name.
/// The file stem doubles as the identifier and display name.
pub fn load_text_dir(dir: &Path) -> Result<Vec<Submission>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Could not read submissions directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "txt"))
        .collect::<Vec<_>>();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file_name = path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Submission::builder()
                .id(stem.clone())
                .text(text)
                .display_name(stem)
                .original_filename(file_name)
                .build())
        })
        .collect()
}

/// Rebuilds submissions from previously persisted feedback records so they
/// can be graded again. Tutor scores stored on a record travel with it;
/// records without student text are skipped.
pub fn from_records(dir: &Path) -> Result<Vec<Submission>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Could not read records directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| !stem.starts_with('_'))
        })
        .collect::<Vec<_>>();
    paths.sort();

    let mut submissions = Vec::with_capacity(paths.len());
    for path in paths {
        let record = FeedbackRecord::load(&path)?;
        let metadata = record.metadata;
        if metadata.student_text.trim().is_empty() {
            tracing::warn!("{} has no stored student text; skipping", path.display());
            continue;
        }

        let manual_scores = record.feedback.manual_scores.map(|scores| {
            let comments = record.feedback.manual_comments.unwrap_or_default();
            scores.into_iter().fold(ManualEvaluation::new(), |evaluation, (criterion, score)| {
                let comment = comments.get(&criterion).map(String::as_str);
                evaluation.with(&criterion, score, comment)
            })
        });

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        submissions.push(
            Submission::builder()
                .id(id)
                .text(metadata.student_text)
                .display_name(metadata.student)
                .original_filename(metadata.original_file)
                .maybe_manual_scores(manual_scores)
                .build(),
        );
    }
    Ok(submissions)
}

/// Loads submissions from either a manifest file or a directory of text
/// files.
pub fn load(path: &Path) -> Result<Vec<Submission>> {
    if path.is_dir() {
        load_text_dir(path)
    } else {
        load_manifest(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lms_style_name_uses_first_word() {
        assert_eq!(first_name("MARIA JOSE LOPEZ_4411_assignsubmission_file_"), "Maria");
    }

    #[test]
    fn underscore_style_name_uses_second_segment() {
        assert_eq!(first_name("lopez_maria_actividad1"), "Maria");
    }

    #[test]
    fn bare_name_is_capitalized() {
        assert_eq!(first_name("ana"), "Ana");
        assert_eq!(first_name(""), "");
    }
}
