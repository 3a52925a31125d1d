#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Sources of tutor-entered scores for hybrid runs.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::runtime::RuntimeFlavor;

use super::reconcile::{ManualEvaluation, auto_full_scores};
use crate::{rubric::Rubric, submission::Submission};

/// Produces the manual evaluation for one submission.
pub trait ManualSource: Send + Sync {
    /// Returns the scores and comments to merge into the model's result.
    fn evaluate(&self, submission: &Submission, rubric: &Rubric) -> Result<ManualEvaluation>;
}

/// Gives full credit on a fixed list of criteria.
#[derive(Debug, Clone, Default)]
pub struct AutoFullScore {
    /// Criteria that always receive their maximum.
    pub criteria: Vec<String>,
}

impl ManualSource for AutoFullScore {
    fn evaluate(&self, _submission: &Submission, rubric: &Rubric) -> Result<ManualEvaluation> {
        Ok(auto_full_scores(rubric, &self.criteria))
    }
}

/// Uses the scores stored on each submission, on top of any full-credit
/// criteria.
#[derive(Debug, Clone, Default)]
pub struct Prefilled {
    /// Criteria that receive their maximum unless the submission says
    /// otherwise.
    pub full_score: Vec<String>,
}

impl ManualSource for Prefilled {
    fn evaluate(&self, submission: &Submission, rubric: &Rubric) -> Result<ManualEvaluation> {
        let mut evaluation = auto_full_scores(rubric, &self.full_score);
        match &submission.manual_scores {
            Some(stored) => evaluation.extend(stored.clone()),
            None => tracing::warn!(
                "{} has no stored tutor scores; tutor-scored criteria stay unscored",
                submission.display_name
            ),
        }
        Ok(evaluation)
    }
}

/// Asks the tutor on the terminal.
#[derive(Debug, Clone, Default)]
pub struct Interactive {
    /// Criteria to ask about.
    pub criteria:   Vec<String>,
    /// Criteria that receive their maximum without asking.
    pub full_score: Vec<String>,
}

impl ManualSource for Interactive {
    /// Blocks on the terminal. Inside a multi-threaded runtime the wait runs
    /// under `block_in_place`.
    fn evaluate(&self, submission: &Submission, rubric: &Rubric) -> Result<ManualEvaluation> {
        let in_multi_thread_runtime = tokio::runtime::Handle::try_current()
            .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
        if in_multi_thread_runtime {
            tokio::task::block_in_place(|| self.ask(submission, rubric))
        } else {
            self.ask(submission, rubric)
        }
    }
}

impl Interactive {
    /// Prompts on stdin/stdout for one submission.
    fn ask(&self, submission: &Submission, rubric: &Rubric) -> Result<ManualEvaluation> {
        let mut stdout = io::stdout();
        writeln!(
            stdout,
            "\n{} {}",
            "Manual evaluation for".bold(),
            submission.display_name.bright_cyan()
        )?;

        let mut evaluation = auto_full_scores(rubric, &self.full_score);
        let prompted =
            prompt_manual_scores(rubric, &self.criteria, io::stdin().lock(), &mut stdout)?;
        evaluation.extend(prompted);
        Ok(evaluation)
    }
}

/// Result of reading one answer.
enum Answer {
    /// A line of input, trimmed.
    Line(String),
    /// End of input.
    Eof,
}

/// Reads one trimmed line from `input`.
fn read_answer(input: &mut impl BufRead) -> Result<Answer> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .context("Failed to read tutor input")?;
    Ok(if read == 0 {
        Answer::Eof
    } else {
        Answer::Line(line.trim().to_string())
    })
}

/// Asks for a score in `[0, max]` and an optional comment for each of
/// `criteria`.
///
/// An empty answer counts as 0; invalid or out-of-range answers are asked
/// again. End of input scores the current criterion 0 and skips its
/// comment. Criteria the rubric does not define are skipped.
pub fn prompt_manual_scores<S: AsRef<str>>(
    rubric: &Rubric,
    criteria: &[S],
    mut input: impl BufRead,
    mut output: impl Write,
) -> Result<ManualEvaluation> {
    let mut evaluation = ManualEvaluation::new();

    for name in criteria {
        let name = name.as_ref();
        let Some(criterion) = rubric.get(name) else {
            tracing::warn!("Manual criterion `{name}` is not in the rubric; skipping");
            continue;
        };
        let maximum = criterion.maximum;

        writeln!(output, "\n{}", format!("{name} (max {maximum})").bold())?;
        if let Some(description) = &criterion.description {
            writeln!(output, "  {description}")?;
        }
        for level in &criterion.levels {
            writeln!(output, "  [{}] {}", level.score, level.description)?;
        }

        let mut reached_eof = false;
        loop {
            write!(output, "Score for '{name}' (0-{maximum}): ")?;
            output.flush()?;

            let answer = match read_answer(&mut input)? {
                Answer::Eof => {
                    writeln!(output, "\n{}", "Input closed; using 0".yellow())?;
                    evaluation.set(name, 0.0);
                    reached_eof = true;
                    break;
                }
                Answer::Line(line) => line,
            };

            let score = if answer.is_empty() {
                Ok(0.0)
            } else {
                answer.replace(',', ".").parse::<f64>()
            };
            match score {
                Ok(score) if score.is_finite() && (0.0..=maximum).contains(&score) => {
                    evaluation.set(name, score);
                    break;
                }
                Ok(_) => writeln!(output, "{}", format!("  Score must be between 0 and {maximum}").yellow())?,
                Err(_) => writeln!(output, "{}", "  Enter a number".yellow())?,
            }
        }
        if reached_eof {
            continue;
        }

        write!(output, "Tutor comment (optional, Enter to skip): ")?;
        output.flush()?;
        if let Answer::Line(comment) = read_answer(&mut input)?
            && !comment.is_empty()
        {
            evaluation.set_comment(name, comment);
        }
    }

    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::Criterion;

    fn rubric() -> Rubric {
        Rubric::new(vec![Criterion::new("Formato", 10.0), Criterion::new("Citas", 5.0)])
            .expect("rubric")
    }

    #[test]
    fn reasks_until_score_is_in_range() {
        let input = "42\nabc\n7.5\nBien presentado\n\n\n".as_bytes();
        let evaluation =
            prompt_manual_scores(&rubric(), &["Formato", "Citas"], input, Vec::new())
                .expect("prompt");

        assert_eq!(evaluation.score("Formato"), Some(7.5));
        assert_eq!(evaluation.comment("Formato"), Some("Bien presentado"));
        assert_eq!(evaluation.score("Citas"), Some(0.0));
        assert_eq!(evaluation.comment("Citas"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interactive_source_runs_inside_the_runtime() {
        let source = Interactive {
            criteria:   Vec::new(),
            full_score: vec!["Citas".to_string()],
        };
        let submission = Submission::builder()
            .id("ana")
            .text("texto")
            .display_name("ANA PAZ_1")
            .original_filename("ana.pdf")
            .build();

        let evaluation = source.evaluate(&submission, &rubric()).expect("evaluate");

        assert_eq!(evaluation.score("Citas"), Some(5.0));
        assert_eq!(evaluation.len(), 1);
    }

    #[tokio::test]
    async fn interactive_source_works_on_a_current_thread_runtime() {
        let source = Interactive::default();
        let submission = Submission::builder()
            .id("ana")
            .text("texto")
            .display_name("ANA PAZ_1")
            .original_filename("ana.pdf")
            .build();

        let evaluation = source.evaluate(&submission, &rubric()).expect("evaluate");
        assert!(evaluation.is_empty());
    }

    #[test]
    fn end_of_input_scores_zero() {
        let evaluation =
            prompt_manual_scores(&rubric(), &["Citas", "Desconocido"], "".as_bytes(), Vec::new())
                .expect("prompt");

        assert_eq!(evaluation.score("Citas"), Some(0.0));
        assert_eq!(evaluation.len(), 1);
    }
}
