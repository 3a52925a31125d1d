#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Course definitions: units, their activities, and where each activity's
//! rubric and prompt live.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::ConfigError,
    rubric::{PromptTemplate, Rubric},
};

/// Accepts `id: 1.1` as well as `id: "1.1"`.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_yaml::Value::deserialize(d)?;
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number for the activity id, found {other:?}"
        ))),
    }
}

/// One gradable activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Identifier within the unit, e.g. `1.2`.
    #[serde(deserialize_with = "id_string")]
    pub id:                  String,
    /// Display title.
    #[serde(default, rename = "titulo")]
    pub title:               String,
    /// Activity kind (`escrito`, ...).
    #[serde(default = "default_kind", rename = "tipo")]
    pub kind:                String,
    /// Rubric JSON path, relative to the course file.
    #[serde(rename = "rubrica")]
    pub rubric:              PathBuf,
    /// Prompt template path, relative to the course file.
    pub prompt:              PathBuf,
    /// Instructions given to students.
    #[serde(default, rename = "instrucciones")]
    pub instructions:        String,
    /// Longer description used as extra context.
    #[serde(default, rename = "descripcion")]
    pub description:         String,
    /// Criteria the tutor scores by hand.
    #[serde(default, rename = "criterios_manuales")]
    pub manual_criteria:     Vec<String>,
    /// Criteria that always receive full credit.
    #[serde(default, rename = "criterios_puntaje_completo")]
    pub full_score_criteria: Vec<String>,
}

/// Default activity kind.
fn default_kind() -> String {
    "escrito".to_string()
}

impl ActivityConfig {
    /// Loads the activity's rubric.
    pub fn load_rubric(&self) -> Result<Rubric, ConfigError> {
        Rubric::load(&self.rubric)
    }

    /// Loads the activity's prompt template.
    pub fn load_template(&self) -> Result<PromptTemplate, ConfigError> {
        PromptTemplate::load(&self.prompt)
    }

    /// Rubric file name, recorded in every feedback record.
    pub fn rubric_reference(&self) -> String {
        self.rubric
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Every criterion kept away from the model: tutor-scored and
    /// full-credit ones.
    pub fn excluded_criteria(&self) -> Vec<String> {
        let mut names = self.manual_criteria.clone();
        for name in &self.full_score_criteria {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Criteria kept away from the model for a run. Tutor-scored criteria
    /// are only hidden when a tutor score source is attached; otherwise the
    /// model scores them like any other.
    pub fn hidden_criteria(&self, tutor_scores: bool) -> Vec<String> {
        if tutor_scores {
            self.excluded_criteria()
        } else {
            self.full_score_criteria.clone()
        }
    }
}

/// One unit and its activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Unit number.
    #[serde(rename = "unidad")]
    pub number:     u32,
    /// Optional unit title.
    #[serde(default, rename = "titulo")]
    pub title:      String,
    /// Activities in the unit.
    #[serde(default, rename = "actividades")]
    pub activities: Vec<ActivityConfig>,
}

/// A course definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    /// Course code.
    #[serde(default, rename = "codigo")]
    pub code:  String,
    /// Course name.
    #[serde(default, rename = "nombre")]
    pub name:  String,
    /// Units in order.
    #[serde(default, rename = "unidades")]
    pub units: Vec<UnitConfig>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    root:      PathBuf,
}

impl CourseConfig {
    /// Loads a course YAML file. An empty course code falls back to the
    /// file stem.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            what: "course",
            path: path.to_path_buf(),
        })?;
        let mut course = Self::from_yaml(&text).map_err(|e| ConfigError::Invalid {
            what:   "course",
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;

        course.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if course.code.trim().is_empty() {
            course.code = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(course)
    }

    /// Parses course YAML. Relative paths resolve against the current
    /// directory.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Finds an activity by unit number and id, with its rubric and prompt
    /// paths resolved.
    pub fn find_activity(&self, unit: u32, activity: &str) -> Result<ActivityConfig, ConfigError> {
        let found = self
            .units
            .iter()
            .filter(|u| u.number == unit)
            .flat_map(|u| u.activities.iter())
            .find(|a| a.id == activity)
            .ok_or_else(|| ConfigError::UnknownActivity {
                course: self.code.clone(),
                unit,
                activity: activity.to_string(),
            })?;

        let mut resolved = found.clone();
        resolved.rubric = self.resolve(&found.rubric);
        resolved.prompt = self.resolve(&found.prompt);
        Ok(resolved)
    }

    /// Joins relative paths onto the course directory.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
