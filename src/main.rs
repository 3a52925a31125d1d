#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # retro
//!
//! Command-line front end: grade a batch of submissions for one course
//! activity, regrade stored records, roll grades up into a CSV, or check a
//! saved model response.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::Ordering,
};

use anyhow::{Context, Result};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use retro::{
    ProviderEnv, Submission,
    course::CourseConfig,
    grade::{
        AutoFullScore, BatchGrader, CapabilityClient, DirectorySink, Interactive, ManualSource,
        OpenAiCapability, Prefilled, PromptContext, RunInfo, activity_dir, parse_response,
    },
    submission,
    summary::{BatchReport, grades_csv},
};
use tabled::{Table, settings::Style};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Which activity of which course to grade.
#[derive(Debug, Clone)]
struct ActivityRef {
    /// Course YAML file.
    course:   PathBuf,
    /// Unit number.
    unit:     u32,
    /// Activity id within the unit.
    activity: String,
}

/// Where tutor scores come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualMode {
    /// Model scores only.
    Off,
    /// Ask the tutor on the terminal.
    Interactive,
    /// Use scores stored with each submission.
    Prefilled,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a batch of submissions
    Grade {
        /// Activity to grade
        activity:    ActivityRef,
        /// Manifest file or directory of text files
        submissions: PathBuf,
        /// Output root
        out:         PathBuf,
        /// Manual score source
        manual:      ManualMode,
        /// Submissions in flight at once
        workers:     usize,
    },
    /// Regrade stored records
    Reprocess {
        /// Activity to grade
        activity: ActivityRef,
        /// Directory of stored records
        dir:      PathBuf,
        /// Output root
        out:      PathBuf,
        /// Submissions in flight at once
        workers:  usize,
    },
    /// Roll grades up into a CSV
    Summary {
        /// Directory of stored records
        dir:    PathBuf,
        /// CSV path
        output: Option<PathBuf>,
    },
    /// Extract and validate a saved model response
    Check(PathBuf),
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Opts {
    /// Debug-level logging
    verbose: bool,
    /// Command to run
    cmd:     Cmd,
}

/// Parse the command line arguments and return the options
fn options() -> Opts {
    /// parses the activity selector
    fn activity() -> impl Parser<ActivityRef> {
        let course = long("course")
            .short('c')
            .help("Course definition (YAML)")
            .argument::<PathBuf>("FILE");
        let unit = long("unit").short('u').help("Unit number").argument::<u32>("N");
        let activity = long("activity")
            .short('a')
            .help("Activity id within the unit, e.g. 1.2")
            .argument::<String>("ID");
        construct!(ActivityRef {
            course,
            unit,
            activity
        })
    }

    /// parses the output root
    fn out() -> impl Parser<PathBuf> {
        long("out")
            .short('o')
            .help("Root directory for feedback records")
            .argument::<PathBuf>("DIR")
            .fallback(PathBuf::from("outputs"))
    }

    /// parses the worker count
    fn workers() -> impl Parser<usize> {
        long("workers")
            .short('w')
            .help("Submissions graded at once")
            .argument::<usize>("N")
            .fallback(1)
    }

    let manual = {
        let interactive = long("hybrid")
            .help("Ask for tutor scores on the manual criteria of each submission")
            .req_flag(ManualMode::Interactive);
        let prefilled = long("prefilled")
            .help("Use tutor scores stored in the submissions manifest")
            .req_flag(ManualMode::Prefilled);
        construct!([interactive, prefilled]).fallback(ManualMode::Off)
    };

    let grade = {
        let activity = activity();
        let submissions = long("submissions")
            .short('s')
            .help("Submissions manifest (JSON) or directory of .txt files")
            .argument::<PathBuf>("PATH");
        let out = out();
        let workers = workers();
        construct!(Cmd::Grade {
            activity,
            submissions,
            out,
            manual,
            workers
        })
        .to_options()
        .command("grade")
        .help("Grade a batch of submissions")
    };

    let reprocess = {
        let activity = activity();
        let dir = long("dir")
            .short('d')
            .help("Directory of stored feedback records")
            .argument::<PathBuf>("DIR");
        let out = out();
        let workers = workers();
        construct!(Cmd::Reprocess {
            activity,
            dir,
            out,
            workers
        })
        .to_options()
        .command("reprocess")
        .help("Regrade stored records from their saved text")
    };

    let summary = {
        let dir = long("dir")
            .short('d')
            .help("Directory of stored feedback records")
            .argument::<PathBuf>("DIR");
        let output = long("output")
            .short('o')
            .help("CSV path (default: <DIR>/grades_summary.csv)")
            .argument::<PathBuf>("FILE")
            .optional();
        construct!(Cmd::Summary { dir, output })
            .to_options()
            .command("summary")
            .help("Write a CSV of grades")
    };

    let check = {
        let file = positional::<PathBuf>("FILE").help("Saved raw model response");
        construct!(Cmd::Check(file))
            .to_options()
            .command("check")
            .help("Extract and validate a saved model response")
    };

    let verbose = long("verbose")
        .short('v')
        .help("Show debug output")
        .switch();
    let cmd = construct!([grade, reprocess, summary, check]);

    construct!(Opts { verbose, cmd })
        .to_options()
        .descr("Rubric-based formative feedback")
        .run()
}

/// Grades `submissions` for `activity`, writes records and the batch report
/// under `out`, and returns whether every submission succeeded.
async fn grade(
    activity: &ActivityRef,
    submissions: Vec<Submission>,
    source: &Path,
    out: &Path,
    mode: ManualMode,
    workers: usize,
) -> Result<bool> {
    let course = CourseConfig::load(&activity.course)?;
    let config = course.find_activity(activity.unit, &activity.activity)?;
    let rubric = config.load_rubric()?;
    let template = config.load_template()?;
    let template_name = template.name().to_string();

    let workers = if mode == ManualMode::Interactive && workers > 1 {
        tracing::warn!("Interactive tutor scoring runs one submission at a time");
        1
    } else {
        workers
    };

    let env = ProviderEnv::from_env()?;
    let engine = env.engine_config(workers);

    let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
    let context = PromptContext::builder()
        .template(template)
        .rubric(rubric)
        .maybe_instructions(non_empty(&config.instructions))
        .maybe_description(non_empty(&config.description))
        .manual_criteria(config.hidden_criteria(mode != ManualMode::Off))
        .default_manual_max(engine.default_manual_max)
        .build();

    let run = RunInfo::builder()
        .course(course.code.clone())
        .unit(activity.unit)
        .activity(config.id.clone())
        .rubric(config.rubric_reference())
        .description(config.description.clone())
        .instructions(config.instructions.clone())
        .build();

    let full_score = config.full_score_criteria.clone();
    let manual: Option<Box<dyn ManualSource>> = match mode {
        ManualMode::Off if full_score.is_empty() => None,
        ManualMode::Off => Some(Box::new(AutoFullScore {
            criteria: full_score,
        })),
        ManualMode::Interactive => Some(Box::new(Interactive {
            criteria: config.manual_criteria.clone(),
            full_score,
        })),
        ManualMode::Prefilled => Some(Box::new(Prefilled { full_score })),
    };

    let transport = OpenAiCapability::new(&env, &engine)?;
    let grader = BatchGrader::builder()
        .client(CapabilityClient::new(transport, &engine))
        .context(context)
        .run(run.clone())
        .config(engine)
        .sink(Box::new(DirectorySink::new(out)))
        .maybe_manual(manual)
        .build();

    let cancel = grader.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing the submission in progress");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let outcomes = grader.run(&submissions).await;

    let report = BatchReport::from_outcomes(
        &run,
        &template_name,
        &source.display().to_string(),
        mode != ManualMode::Off,
        &outcomes,
    );
    let report_path = report.write(&activity_dir(out, &run.course, run.unit, &run.activity))?;

    eprintln!("{}", report.table());
    eprintln!("Report saved to {}", report_path.display());
    for outcome in &outcomes {
        if let Some(failure) = outcome.failure() {
            eprintln!(
                "{} {} ({}): {}",
                "✗".red(),
                outcome.student,
                failure.stage,
                failure.message
            );
        }
    }

    Ok(report.failed == 0)
}

/// Extracts and validates a saved response, printing the result.
fn check(path: &Path) -> Result<bool> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    match parse_response(&raw) {
        Ok(feedback) => {
            println!("{}", Table::new(feedback.scores.iter()).with(Style::modern()));
            println!("{} {}", "Total:".bold(), feedback.scores.totals());
            println!("\n{}\n{}", "Narrative:".bold(), feedback.narrative);
            println!("\n{}\n{}", "Summary:".bold(), feedback.summary);
            Ok(true)
        }
        Err(e) => {
            eprintln!("{} {e}", "Invalid:".red().bold());
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let level = if opts.verbose { Level::DEBUG } else { Level::INFO };
    let filter_layer = LevelFilter::from_level(level);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let ok = match opts.cmd {
        Cmd::Grade {
            activity,
            submissions,
            out,
            manual,
            workers,
        } => {
            let batch = submission::load(&submissions)?;
            grade(&activity, batch, &submissions, &out, manual, workers).await?
        }
        Cmd::Reprocess {
            activity,
            dir,
            out,
            workers,
        } => {
            let batch = submission::from_records(&dir)?;
            let mode = if batch.iter().any(|s| s.manual_scores.is_some()) {
                ManualMode::Prefilled
            } else {
                ManualMode::Off
            };
            grade(&activity, batch, &dir, &out, mode, workers).await?
        }
        Cmd::Summary { dir, output } => {
            let summary = grades_csv(&dir, output.as_deref())?;
            println!("Generated: {}", summary.path.display());
            println!("Students:  {}", summary.students);
            println!("Average:   {:.1} / {}", summary.average, summary.out_of);
            println!("Min:       {}", summary.min);
            println!("Max:       {}", summary.max);
            true
        }
        Cmd::Check(path) => check(&path)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
