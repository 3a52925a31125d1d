#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Schema checks for the model's structured output.
//!
//! The output object must carry a non-empty score list, a narrative and a
//! short summary. Anything else at the top level is tolerated and dropped.

use serde_json::{Map, Value};

use super::results::{AiFeedback, CriterionScore, ScoreSet};
use crate::error::StructuredOutputError;

/// Key of the score list.
pub const SCORES_KEY: &str = "puntajes";
/// Key of the narrative comment.
pub const NARRATIVE_KEY: &str = "comentario_narrativo";
/// Key of the short external summary.
pub const SUMMARY_KEY: &str = "resumen_para_moodle";

/// Keys every score entry must carry.
const ENTRY_KEYS: [&str; 4] = ["criterio", "puntaje", "maximo", "justificacion"];

/// Checks `value` against the output schema and converts it to a typed
/// result. Never mutates its input.
pub fn validate(value: &Value) -> Result<AiFeedback, StructuredOutputError> {
    let object = value
        .as_object()
        .ok_or_else(|| StructuredOutputError::invalid("$", "expected a JSON object"))?;

    let missing: Vec<&str> = [SCORES_KEY, NARRATIVE_KEY, SUMMARY_KEY]
        .into_iter()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        let present: Vec<&str> = object.keys().map(String::as_str).collect();
        return Err(StructuredOutputError::invalid(
            missing.join(", "),
            format!("required key missing (present keys: {})", present.join(", ")),
        ));
    }

    let narrative = text_field(object, NARRATIVE_KEY, NARRATIVE_KEY)?;
    let summary = text_field(object, SUMMARY_KEY, SUMMARY_KEY)?;

    let entries = object
        .get(SCORES_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| StructuredOutputError::invalid(SCORES_KEY, "must be a list"))?;
    if entries.is_empty() {
        return Err(StructuredOutputError::invalid(SCORES_KEY, "must not be empty"));
    }

    let scores = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| score_entry(i, entry))
        .collect::<Result<ScoreSet, _>>()?;

    Ok(AiFeedback {
        scores,
        narrative,
        summary,
    })
}

/// Validates one entry of the score list.
fn score_entry(index: usize, entry: &Value) -> Result<CriterionScore, StructuredOutputError> {
    let path = |key: &str| format!("{SCORES_KEY}[{index}].{key}");

    let object = entry.as_object().ok_or_else(|| {
        StructuredOutputError::invalid(format!("{SCORES_KEY}[{index}]"), "must be an object")
    })?;

    if let Some(key) = ENTRY_KEYS.iter().find(|key| !object.contains_key(**key)) {
        return Err(StructuredOutputError::invalid(path(*key), "required key missing"));
    }

    let criterion = text_field(object, "criterio", &path("criterio"))?;
    let justification = text_field(object, "justificacion", &path("justificacion"))?;
    let achieved = number_field(object, "puntaje", &path("puntaje"))?;
    let maximum = number_field(object, "maximo", &path("maximo"))?;

    if maximum < 0.0 {
        return Err(StructuredOutputError::invalid(path("maximo"), "must not be negative"));
    }
    if !(0.0..=maximum).contains(&achieved) {
        return Err(StructuredOutputError::invalid(
            path("puntaje"),
            format!("{achieved} is outside [0, {maximum}]"),
        ));
    }

    Ok(CriterionScore::ai(criterion, achieved, maximum, justification))
}

/// Reads a required string field.
fn text_field(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<String, StructuredOutputError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StructuredOutputError::invalid(path, "must be a string"))
}

/// Reads a required finite number. Numeric strings are rejected.
fn number_field(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<f64, StructuredOutputError> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .ok_or_else(|| StructuredOutputError::invalid(path, "must be a number"))
}
