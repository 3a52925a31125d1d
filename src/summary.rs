#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Batch reports and grade roll-ups.

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use bon::Builder;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use uuid::Uuid;

use crate::{
    error::Stage,
    grade::{FeedbackRecord, RunInfo, SubmissionOutcome},
};

/// File name of the per-batch report.
pub const REPORT_FILE: &str = "_resumen_procesamiento.json";
/// Default file name of the grades roll-up.
pub const GRADES_FILE: &str = "grades_summary.csv";

/// One row of the batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRow {
    /// Student display name.
    #[serde(rename = "estudiante")]
    pub student: String,
    /// Original file name.
    #[serde(rename = "archivo")]
    pub file:    String,
    /// `achieved/maximum`, or `-` for failures.
    #[serde(rename = "puntaje")]
    pub score:   String,
    /// Failing stage, if any.
    #[serde(rename = "etapa_fallida", default, skip_serializing_if = "Option::is_none")]
    pub stage:   Option<Stage>,
    /// Whether a record was produced.
    #[serde(rename = "exito")]
    pub success: bool,
    /// Error message for failures.
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error:   Option<String>,
}

impl Tabled for OutcomeRow {
    const LENGTH: usize = 4;

    fn fields(&self) -> Vec<Cow<'_, str>> {
        let status = match &self.stage {
            Some(stage) => Cow::Owned(format!("failed ({stage})")),
            None => Cow::Borrowed("ok"),
        };
        vec![
            Cow::Borrowed(self.student.as_str()),
            Cow::Borrowed(self.file.as_str()),
            Cow::Borrowed(self.score.as_str()),
            status,
        ]
    }

    fn headers() -> Vec<Cow<'static, str>> {
        ["Student", "File", "Score", "Status"]
            .into_iter()
            .map(Cow::Borrowed)
            .collect()
    }
}

impl From<&SubmissionOutcome> for OutcomeRow {
    fn from(outcome: &SubmissionOutcome) -> Self {
        let (score, stage, error) = match &outcome.result {
            Ok(record) => (record.totals().to_string(), None, None),
            Err(failure) => ("-".to_string(), Some(failure.stage), Some(failure.message.clone())),
        };
        Self {
            student: outcome.student.clone(),
            file: outcome.file.clone(),
            score,
            stage,
            success: outcome.is_success(),
            error,
        }
    }
}

/// Traceability record written next to a batch's feedback files.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct BatchReport {
    /// Unique id of the run.
    #[serde(rename = "id_ejecucion")]
    #[builder(default = Uuid::new_v4())]
    pub run_id:     Uuid,
    /// When the report was produced.
    #[serde(rename = "fecha")]
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    /// Course, unit, activity and rubric of the run.
    #[serde(flatten)]
    pub run:        RunInfo,
    /// Prompt template used.
    #[serde(rename = "prompt_usado")]
    pub prompt:     String,
    /// Where submissions were read from.
    #[serde(rename = "directorio_origen")]
    pub source:     String,
    /// Whether tutor scores were merged in.
    #[serde(rename = "modo_hibrido")]
    pub hybrid:     bool,
    /// Number of submissions.
    pub total:      usize,
    /// Number of records produced.
    #[serde(rename = "exitosos")]
    pub succeeded:  usize,
    /// Number of failures.
    #[serde(rename = "fallidos")]
    pub failed:     usize,
    /// One row per submission, in input order.
    #[serde(rename = "resultados")]
    pub rows:       Vec<OutcomeRow>,
}

impl BatchReport {
    /// Summarises `outcomes` for the given run.
    pub fn from_outcomes(
        run: &RunInfo,
        prompt: &str,
        source: &str,
        hybrid: bool,
        outcomes: &[SubmissionOutcome],
    ) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self::builder()
            .run(run.clone())
            .prompt(prompt)
            .source(source)
            .hybrid(hybrid)
            .total(outcomes.len())
            .succeeded(succeeded)
            .failed(outcomes.len() - succeeded)
            .rows(outcomes.iter().map(OutcomeRow::from).collect())
            .build()
    }

    /// Writes the report as `_resumen_procesamiento.json` in `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))?;
        let path = dir.join(REPORT_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(path)
    }

    /// Terminal overview of the batch.
    pub fn table(&self) -> String {
        Table::new(&self.rows)
            .with(Panel::header(format!(
                "{} · unit {} · activity {}",
                self.run.course, self.run.unit, self.run.activity
            )))
            .with(Panel::footer(format!(
                "Succeeded: {}/{}  Failed: {}",
                self.succeeded, self.total, self.failed
            )))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(32).keep_words(true)))
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .with(Style::modern())
            .to_string()
    }
}

/// One student's line in the grades roll-up.
#[derive(Debug, Clone, PartialEq)]
struct GradeRow {
    /// Name before the first `_` of the display name.
    student:   String,
    /// Full display name.
    full_name: String,
    /// Original file name.
    file:      String,
    /// Achieved total.
    total:     f64,
    /// Maximum total.
    maximum:   f64,
    /// Achieved score per criterion.
    scores:    BTreeMap<String, f64>,
}

impl GradeRow {
    /// Builds the row for one record.
    fn from_record(record: &FeedbackRecord) -> Self {
        let totals = record.feedback.scores.totals();
        let full_name = record.metadata.student.clone();
        Self {
            student: full_name.split('_').next().unwrap_or_default().trim().to_string(),
            file: record.metadata.original_file.clone(),
            total: totals.achieved,
            maximum: totals.maximum,
            scores: record
                .feedback
                .scores
                .iter()
                .map(|s| (s.criterion.clone(), s.achieved))
                .collect(),
            full_name,
        }
    }

    /// Total as a percentage, one decimal.
    fn percentage(&self) -> f64 {
        if self.maximum > 0.0 {
            (self.total / self.maximum * 1000.0).round() / 10.0
        } else {
            0.0
        }
    }
}

/// Aggregate figures for a grades roll-up.
#[derive(Debug, Clone, PartialEq)]
pub struct GradesSummary {
    /// Where the CSV was written.
    pub path:     PathBuf,
    /// Number of students.
    pub students: usize,
    /// Mean total.
    pub average:  f64,
    /// Lowest total.
    pub min:      f64,
    /// Highest total.
    pub max:      f64,
    /// Maximum total of the first student, for display.
    pub out_of:   f64,
}

/// Quotes a CSV field when it needs quoting.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Reads every record in `dir` (skipping `_`-prefixed files) and writes one
/// CSV row per student, sorted by name, to `output` or
/// `<dir>/grades_summary.csv`.
pub fn grades_csv(dir: &Path, output: Option<&Path>) -> Result<GradesSummary> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Could not read directory {}", dir.display()))?;

    let files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| !stem.starts_with('_'))
        })
        .sorted()
        .collect();

    if files.is_empty() {
        bail!("No feedback records found in {}", dir.display());
    }

    let mut rows = Vec::with_capacity(files.len());
    for path in &files {
        match FeedbackRecord::load(path) {
            Ok(record) => rows.push(GradeRow::from_record(&record)),
            Err(e) => tracing::warn!("Skipping {}: {e:#}", path.display()),
        }
    }
    if rows.is_empty() {
        bail!("No readable feedback records in {}", dir.display());
    }
    rows.sort_by(|a, b| a.student.cmp(&b.student));

    let criteria: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.scores.keys().map(String::as_str))
        .collect();

    let header = ["estudiante", "total", "maximo", "porcentaje"]
        .into_iter()
        .map(str::to_string)
        .chain(criteria.iter().map(|c| format!("score_{c}")))
        .chain(["estudiante_completo".to_string(), "archivo".to_string()])
        .map(|h| csv_field(&h))
        .join(",");

    let mut csv = header;
    csv.push('\n');
    for row in &rows {
        let line = [
            row.student.clone(),
            row.total.to_string(),
            row.maximum.to_string(),
            format!("{:.1}", row.percentage()),
        ]
        .into_iter()
        .chain(criteria.iter().map(|c| {
            row.scores
                .get(*c)
                .map(|score| score.to_string())
                .unwrap_or_default()
        }))
        .chain([row.full_name.clone(), row.file.clone()])
        .map(|field| csv_field(&field))
        .join(",");
        csv.push_str(&line);
        csv.push('\n');
    }

    let path = output.map_or_else(|| dir.join(GRADES_FILE), Path::to_path_buf);
    fs::write(&path, csv).with_context(|| format!("Could not write {}", path.display()))?;

    let totals: Vec<f64> = rows.iter().map(|r| r.total).collect();
    Ok(GradesSummary {
        path,
        students: rows.len(),
        average: totals.iter().sum::<f64>() / totals.len() as f64,
        min: totals.iter().copied().fold(f64::INFINITY, f64::min),
        max: totals.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        out_of: rows[0].maximum,
    })
}
