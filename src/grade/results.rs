#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::rubric::Rubric;

/// Who produced a criterion score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Scored by the model.
    #[default]
    Ai,
    /// Entered by the tutor or an auto-fill rule.
    Manual,
}

impl Origin {
    /// Whether this is a model-produced score.
    pub fn is_ai(&self) -> bool {
        matches!(self, Origin::Ai)
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Ai => f.write_str("AI"),
            Origin::Manual => f.write_str("manual"),
        }
    }
}

/// Persists [`Origin`] as the `"manual": true` flag of the record format.
mod origin_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Origin;

    /// Writes `true` for manual scores.
    pub fn serialize<S: Serializer>(origin: &Origin, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bool(matches!(origin, Origin::Manual))
    }

    /// Reads the flag back.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Origin, D::Error> {
        Ok(if bool::deserialize(d)? {
            Origin::Manual
        } else {
            Origin::Ai
        })
    }
}

/// Score for a single criterion.
#[derive(Tabled, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    #[tabled(rename = "Criterion")]
    /// Criterion display name.
    #[serde(rename = "criterio")]
    pub criterion:     String,
    #[tabled(rename = "Score")]
    /// Achieved score.
    #[serde(rename = "puntaje")]
    pub achieved:      f64,
    #[tabled(rename = "Max")]
    /// Maximum achievable score.
    #[serde(rename = "maximo")]
    pub maximum:       f64,
    #[tabled(skip)]
    /// Why this score was given.
    #[serde(rename = "justificacion")]
    pub justification: String,
    #[tabled(rename = "Origin")]
    /// Whether the score came from the model or the tutor.
    #[serde(
        rename = "manual",
        with = "origin_flag",
        default,
        skip_serializing_if = "Origin::is_ai"
    )]
    pub origin:        Origin,
}

impl CriterionScore {
    /// Creates a model-produced score.
    pub fn ai(
        criterion: impl Into<String>,
        achieved: f64,
        maximum: f64,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            criterion: criterion.into(),
            achieved,
            maximum,
            justification: justification.into(),
            origin: Origin::Ai,
        }
    }

    /// Creates a tutor-produced score.
    pub fn manual(
        criterion: impl Into<String>,
        achieved: f64,
        maximum: f64,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            origin: Origin::Manual,
            ..Self::ai(criterion, achieved, maximum, justification)
        }
    }
}

/// Sums over a score set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Sum of achieved scores.
    #[serde(rename = "total_obtenido")]
    pub achieved: f64,
    /// Sum of maxima.
    #[serde(rename = "total_maximo")]
    pub maximum:  f64,
}

impl Totals {
    /// Achieved score as a percentage of the maximum; zero when the maximum
    /// is zero.
    pub fn percentage(&self) -> f64 {
        if self.maximum == 0.0 {
            0.0
        } else {
            self.achieved / self.maximum * 100.0
        }
    }
}

impl Display for Totals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.achieved, self.maximum)
    }
}

/// Ordered sequence of criterion scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSet(Vec<CriterionScore>);

impl ScoreSet {
    /// Wraps an ordered list of scores.
    pub fn new(scores: Vec<CriterionScore>) -> Self {
        Self(scores)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, CriterionScore> {
        self.0.iter()
    }

    /// Appends an entry.
    pub fn push(&mut self, score: CriterionScore) {
        self.0.push(score);
    }

    /// First entry for `criterion`.
    pub fn get(&self, criterion: &str) -> Option<&CriterionScore> {
        self.0.iter().find(|s| s.criterion == criterion)
    }

    /// Criterion names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.criterion.as_str())
    }

    /// Sum of achieved and maximum scores.
    pub fn totals(&self) -> Totals {
        self.0.iter().fold(Totals::default(), |acc, s| Totals {
            achieved: acc.achieved + s.achieved,
            maximum:  acc.maximum + s.maximum,
        })
    }

    /// Rubric criteria with no entry in this set.
    pub fn missing_from<'r>(&self, rubric: &'r Rubric) -> Vec<&'r str> {
        rubric
            .criteria()
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| self.get(name).is_none())
            .collect()
    }

    /// Consumes the set, returning the entries.
    pub fn into_inner(self) -> Vec<CriterionScore> {
        self.0
    }
}

impl FromIterator<CriterionScore> for ScoreSet {
    fn from_iter<I: IntoIterator<Item = CriterionScore>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ScoreSet {
    type IntoIter = std::slice::Iter<'a, CriterionScore>;
    type Item = &'a CriterionScore;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The validated model-produced portion of a result.
#[derive(Debug, Clone, PartialEq)]
pub struct AiFeedback {
    /// Per-criterion scores.
    pub scores:    ScoreSet,
    /// Formative narrative addressed to the student.
    pub narrative: String,
    /// Short summary for the LMS.
    pub summary:   String,
}
