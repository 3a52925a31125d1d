#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Rubric and prompt-template loading.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// One performance level of a criterion, shown to the tutor and the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Score awarded at this level.
    #[serde(alias = "puntaje", alias = "points")]
    pub score:       f64,
    /// What the level looks like.
    #[serde(default, rename = "descripcion", alias = "description")]
    pub description: String,
}

/// A single named scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Display name; unique within a rubric and used as the merge key.
    #[serde(rename = "nombre", alias = "name")]
    pub name:        String,
    /// Highest achievable score.
    #[serde(rename = "maximo", alias = "puntaje_maximo", alias = "maximum")]
    pub maximum:     f64,
    /// Optional free-text description.
    #[serde(
        default,
        rename = "descripcion",
        alias = "description",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    /// Optional performance levels.
    #[serde(
        default,
        rename = "niveles",
        alias = "levels",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub levels:      Vec<Level>,
    /// Any other fields, carried through to the prompt untouched.
    #[serde(flatten)]
    pub extra:       Map<String, Value>,
}

impl Criterion {
    /// Creates a criterion with just a name and maximum.
    pub fn new(name: impl Into<String>, maximum: f64) -> Self {
        Self {
            name: name.into(),
            maximum,
            description: None,
            levels: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// An ordered set of criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    /// Criteria in display order.
    #[serde(rename = "criterios", alias = "criteria")]
    criteria: Vec<Criterion>,
    /// Remaining top-level fields (title, notes, ...).
    #[serde(flatten)]
    extra:    Map<String, Value>,
}

impl Rubric {
    /// Builds a rubric from criteria, enforcing unique, non-empty names.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, ConfigError> {
        let rubric = Self {
            criteria,
            extra: Map::new(),
        };
        rubric.check()?;
        Ok(rubric)
    }

    /// Parses a rubric from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let rubric: Rubric =
            serde_json::from_str(text).map_err(|e| ConfigError::Invalid {
                what:   "rubric",
                path:   "<inline>".into(),
                reason: e.to_string(),
            })?;
        rubric.check()?;
        Ok(rubric)
    }

    /// Loads a rubric from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            what: "rubric",
            path: path.to_path_buf(),
        })?;
        let rubric: Rubric =
            serde_json::from_str(&text).map_err(|e| ConfigError::Invalid {
                what:   "rubric",
                path:   path.to_path_buf(),
                reason: e.to_string(),
            })?;
        rubric.check()?;
        tracing::debug!("Loaded rubric {} ({} criteria)", path.display(), rubric.criteria.len());
        Ok(rubric)
    }

    /// Ensures the rubric is usable as a source of merge keys.
    fn check(&self) -> Result<(), ConfigError> {
        if self.criteria.is_empty() {
            return Err(ConfigError::EmptyRubric);
        }
        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            if !seen.insert(criterion.name.as_str()) {
                return Err(ConfigError::DuplicateCriterion(criterion.name.clone()));
            }
        }
        Ok(())
    }

    /// Criteria in display order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Looks up a criterion by display name.
    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    /// Whether the rubric defines `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Maximum score for `name`, if the rubric defines it.
    pub fn maximum_of(&self, name: &str) -> Option<f64> {
        self.get(name).map(|c| c.maximum)
    }

    /// Sum of all criterion maxima.
    pub fn total_maximum(&self) -> f64 {
        self.criteria.iter().map(|c| c.maximum).sum()
    }

    /// Returns a copy without the named criteria. Used to hide manual
    /// criteria from the model.
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> Rubric {
        let criteria = self
            .criteria
            .iter()
            .filter(|c| !names.iter().any(|n| n.as_ref() == c.name))
            .cloned()
            .collect();
        Rubric {
            criteria,
            extra: self.extra.clone(),
        }
    }

    /// Pretty JSON rendering embedded in the prompt.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// The tutor-authored instruction text that opens every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// File stem, used only for reporting.
    name: String,
    /// Template body.
    text: String,
}

impl PromptTemplate {
    /// Wraps inline template text.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Loads a template from a text file; empty files are rejected.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            what: "prompt template",
            path: path.to_path_buf(),
        })?;
        if text.trim().is_empty() {
            return Err(ConfigError::Invalid {
                what:   "prompt template",
                path:   path.to_path_buf(),
                reason: "the template is empty".to_string(),
            });
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, text })
    }

    /// Template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template body.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_and_english_keys_both_parse() {
        let rubric = Rubric::from_json(
            r#"{"titulo":"Ensayo","criterios":[
                {"nombre":"Contenido","maximo":70,"niveles":[{"score":70,"descripcion":"Excelente"}]},
                {"name":"Grammar","maximum":30}
            ]}"#,
        )
        .expect("parse rubric");

        assert_eq!(rubric.criteria().len(), 2);
        assert_eq!(rubric.maximum_of("Grammar"), Some(30.0));
        assert_eq!(rubric.total_maximum(), 100.0);
        assert!(rubric.to_prompt_json().contains("\"titulo\""));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Rubric::new(vec![Criterion::new("A", 1.0), Criterion::new("A", 2.0)])
            .expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateCriterion(name) if name == "A"));
    }

    #[test]
    fn without_drops_only_named_criteria() {
        let rubric = Rubric::new(vec![
            Criterion::new("Content", 70.0),
            Criterion::new("Grammar", 30.0),
        ])
        .expect("rubric");
        let filtered = rubric.without(&["Grammar"]);
        assert_eq!(filtered.criteria().len(), 1);
        assert!(!filtered.to_prompt_json().contains("Grammar"));
        assert!(rubric.contains("Grammar"));
    }
}
