#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Merging tutor-entered scores into the model's score set.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::results::{CriterionScore, Origin, ScoreSet, Totals};
use crate::rubric::Rubric;

/// Justification used for a manual score entered without a comment.
pub const DEFAULT_MANUAL_COMMENT: &str = "Cumple";

/// Scores and comments a tutor (or an auto-fill rule) assigned by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualEvaluation {
    /// Criterion name to achieved score.
    #[serde(default)]
    scores:   BTreeMap<String, f64>,
    /// Criterion name to tutor comment.
    #[serde(default)]
    comments: BTreeMap<String, String>,
}

impl ManualEvaluation {
    /// An empty evaluation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the score for `criterion`.
    pub fn set(&mut self, criterion: impl Into<String>, score: f64) -> &mut Self {
        self.scores.insert(criterion.into(), score);
        self
    }

    /// Sets the comment for `criterion`.
    pub fn set_comment(&mut self, criterion: impl Into<String>, comment: impl Into<String>) -> &mut Self {
        self.comments.insert(criterion.into(), comment.into());
        self
    }

    /// Builder-style score + comment.
    pub fn with(mut self, criterion: &str, score: f64, comment: Option<&str>) -> Self {
        self.set(criterion, score);
        if let Some(comment) = comment {
            self.set_comment(criterion, comment);
        }
        self
    }

    /// Scores in criterion-name order.
    pub fn scores(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Score for `criterion`, if entered.
    pub fn score(&self, criterion: &str) -> Option<f64> {
        self.scores.get(criterion).copied()
    }

    /// Comment for `criterion`, if entered.
    pub fn comment(&self, criterion: &str) -> Option<&str> {
        self.comments.get(criterion).map(String::as_str)
    }

    /// Comments in criterion-name order.
    pub fn comments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.comments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no scores were entered.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of scored criteria.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Overlays `other` on top of this evaluation; `other` wins on
    /// conflicts.
    pub fn extend(&mut self, other: ManualEvaluation) {
        self.scores.extend(other.scores);
        self.comments.extend(other.comments);
    }

    /// Entries as they are shown to the model before it writes the narrative:
    /// criterion, score, maximum (rubric or `default_max`) and comment.
    pub fn for_prompt(
        &self,
        rubric: &Rubric,
        default_max: f64,
    ) -> Vec<(&str, f64, f64, Option<&str>)> {
        self.scores()
            .map(|(criterion, score)| {
                let maximum = rubric.maximum_of(criterion).unwrap_or(default_max);
                let comment = self.comment(criterion).filter(|c| !c.is_empty());
                (criterion, score, maximum, comment)
            })
            .collect()
    }

    /// Justification text for `criterion`.
    fn justification(&self, criterion: &str) -> String {
        self.comment(criterion)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_MANUAL_COMMENT)
            .to_string()
    }
}

/// Full credit for every named criterion the rubric defines. Names the
/// rubric does not define are skipped.
pub fn auto_full_scores<S: AsRef<str>>(rubric: &Rubric, criteria: &[S]) -> ManualEvaluation {
    let mut evaluation = ManualEvaluation::new();
    for name in criteria {
        match rubric.get(name.as_ref()) {
            Some(criterion) => {
                evaluation.set(criterion.name.clone(), criterion.maximum);
                evaluation.set_comment(criterion.name.clone(), DEFAULT_MANUAL_COMMENT);
            }
            None => tracing::warn!(
                "Auto full-score criterion `{}` is not in the rubric; skipping",
                name.as_ref()
            ),
        }
    }
    evaluation
}

/// A merged score set and its totals.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// One entry per criterion named by either source.
    pub scores: ScoreSet,
    /// Sums over `scores`.
    pub totals: Totals,
}

/// Merges `manual` into `ai`.
///
/// Entries whose criterion the tutor scored take the manual score and
/// comment and are tagged [`Origin::Manual`]; other entries are kept as they
/// are. Manual criteria the model did not score are then appended, with the
/// rubric maximum or `default_max` if the rubric lacks them. Repeated AI
/// entries for the same criterion are dropped after the first.
pub fn reconcile(
    ai: &ScoreSet,
    manual: &ManualEvaluation,
    rubric: &Rubric,
    default_max: f64,
) -> Reconciled {
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut merged = ScoreSet::default();

    for entry in ai {
        if !emitted.insert(entry.criterion.as_str()) {
            tracing::warn!("Duplicate score for `{}` in model output; keeping the first", entry.criterion);
            continue;
        }
        match manual.score(&entry.criterion) {
            Some(score) => merged.push(CriterionScore {
                achieved: score,
                justification: manual.justification(&entry.criterion),
                origin: Origin::Manual,
                ..entry.clone()
            }),
            None => merged.push(entry.clone()),
        }
    }

    for (criterion, score) in manual.scores() {
        if emitted.contains(criterion) {
            continue;
        }
        let maximum = rubric.maximum_of(criterion).unwrap_or_else(|| {
            tracing::warn!(
                "Manual criterion `{criterion}` is not in the rubric; assuming a maximum of {default_max}"
            );
            default_max
        });
        merged.push(CriterionScore::manual(
            criterion,
            score,
            maximum,
            manual.justification(criterion),
        ));
    }

    let totals = merged.totals();
    Reconciled {
        scores: merged,
        totals,
    }
}
