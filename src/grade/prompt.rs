#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Prompt assembly.
//!
//! A request is split in two: a prefix that is identical for every
//! submission in a batch (template, rubric, output contract) and a short
//! per-submission suffix. Providers that cache prompt prefixes can reuse the
//! first part; correctness never depends on it.

use bon::Builder;

use super::{extract::preview, reconcile::ManualEvaluation};
use crate::{
    config::DEFAULT_MANUAL_MAXIMUM,
    rubric::{PromptTemplate, Rubric},
    submission::Submission,
};

/// Output contract assets embedded in the binary.
#[derive(Debug, Clone)]
pub struct GradingPrompts {
    /// The output schema shown to the model.
    output_schema:  &'static str,
    /// Directive preceding the schema.
    output_header:  &'static str,
    /// Rules following the schema.
    output_rules:   &'static str,
    /// Heading for pre-filled tutor scores.
    manual_header:  &'static str,
}

impl Default for GradingPrompts {
    fn default() -> Self {
        Self {
            output_schema: include_str!("prompts/output_schema.json"),
            output_header: include_str!("prompts/output_rules.md"),
            output_rules:  include_str!("prompts/output_rules_tail.md"),
            manual_header: include_str!("prompts/manual_header.md"),
        }
    }
}

impl GradingPrompts {
    /// Returns the output schema.
    pub fn output_schema(&self) -> &str {
        self.output_schema
    }

    /// Returns the directive, schema and rules as one block.
    pub fn output_contract(&self) -> String {
        format!("{}\n{}\n{}", self.output_header, self.output_schema, self.output_rules)
    }
}

/// Everything about a batch that does not change between submissions.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct PromptContext {
    /// Tutor-authored instruction template.
    template:           PromptTemplate,
    /// Full rubric, manual criteria included.
    rubric:             Rubric,
    /// Activity instructions given to students.
    instructions:       Option<String>,
    /// Longer activity description from the course file.
    description:        Option<String>,
    /// Criteria scored outside the model.
    #[builder(default, with = |iter: impl IntoIterator<Item = impl Into<String>>| {
        iter.into_iter().map(Into::into).collect::<Vec<String>>()
    })]
    manual_criteria:    Vec<String>,
    /// Maximum assumed for a manual criterion the rubric lacks.
    #[builder(default = DEFAULT_MANUAL_MAXIMUM)]
    default_manual_max: f64,
    /// Embedded output contract.
    #[builder(default)]
    prompts:            GradingPrompts,
}

impl PromptContext {
    /// The full rubric.
    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// The template in use.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Activity instructions, if any.
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Activity description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Criteria excluded from model scoring.
    pub fn manual_criteria(&self) -> &[String] {
        &self.manual_criteria
    }

    /// The rubric as the model sees it: manual criteria removed.
    pub fn ai_rubric(&self) -> Rubric {
        self.rubric.without(&self.manual_criteria)
    }

    /// Builds the batch-constant part of the request.
    pub fn cacheable_prefix(&self) -> String {
        let mut parts = vec![self.template.text().to_string(), String::new()];

        if let Some(instructions) = self.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(format!("Instrucciones de la actividad:\n\"\"\"\n{instructions}\n\"\"\"\n"));
        }
        if let Some(description) = self.description.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(format!("Descripción de la actividad:\n\"\"\"\n{description}\n\"\"\"\n"));
        }

        parts.push(format!("Rúbrica (formato JSON):\n{}\n", self.ai_rubric().to_prompt_json()));
        parts.push(self.prompts.output_contract());

        parts.join("\n")
    }

    /// Builds the per-submission part of the request.
    pub fn item_suffix(&self, submission: &Submission, manual: Option<&ManualEvaluation>) -> String {
        let mut parts = vec![format!(
            include_str!("prompts/student_header.md"),
            name = submission.first_name()
        )];

        if let Some(manual) = manual.filter(|m| !m.is_empty()) {
            parts.push(self.prompts.manual_header.trim_end().to_string());
            for (criterion, score, maximum, comment) in
                manual.for_prompt(&self.rubric, self.default_manual_max)
            {
                parts.push(format!("  - {criterion}: {score}/{maximum}"));
                if let Some(comment) = comment {
                    parts.push(format!("    Observación del tutor: {comment}"));
                }
            }
            parts.push(String::new());
        }

        parts.push(format!("Texto del estudiante:\n\"\"\"\n{}\n\"\"\"", submission.text));
        parts.join("\n")
    }

    /// Builds the single corrective request sent after a failed parse.
    pub fn repair_request(&self, malformed: &str, error: &str, preview_chars: usize) -> String {
        format!(
            include_str!("prompts/repair.md"),
            malformed = preview(malformed, preview_chars),
            error = error,
            schema = self.prompts.output_schema,
        )
    }
}
