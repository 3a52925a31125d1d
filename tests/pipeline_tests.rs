
use std::sync::atomic::Ordering;

use fake_capability::{FakeCapability, client, context, engine, submission, valid_response};
use retro::{
    EngineConfig, GradingError, Stage,
    course::CourseConfig,
    grade::{
        BatchGrader, CapabilityClient, DirectorySink, FeedbackRecord, ManualEvaluation, Origin,
        Prefilled, RunInfo, generate_validated, output_path,
    },
};

fn run_info() -> RunInfo {
    RunInfo::builder()
        .course("FI08")
        .unit(1)
        .activity("1.1")
        .rubric("rubrica_ensayo.json")
        .build()
}

#[tokio::test]
async fn oversized_input_fails_without_calling_the_transport() {
    let config = EngineConfig::builder()
        .model("test-model")
        .max_input_tokens(10)
        .chars_per_token(4)
        .build();
    let client = CapabilityClient::new(FakeCapability::unreachable(), &config);

    let err = client
        .send(Some("prefijo"), &"x".repeat(100))
        .await
        .expect_err("too large");

    assert!(matches!(err, GradingError::DocumentTooLarge { limit: 10, .. }));
    assert_eq!(err.stage(), Stage::SizeLimit);
    assert_eq!(client.transport().calls(), 0);
}

#[tokio::test]
async fn valid_first_response_makes_one_call() {
    let ctx = context(&["Grammar"]);
    let client = client(
        FakeCapability::scripted([Ok(valid_response(&[("Content", 60.0, 70.0)]))]),
        1,
    );

    let feedback = generate_validated(&client, &ctx, &ctx.cacheable_prefix(), "suffix", 2000)
        .await
        .expect("valid");

    assert_eq!(feedback.scores.len(), 1);
    assert_eq!(client.transport().calls(), 1);
}

#[tokio::test]
async fn malformed_then_valid_makes_exactly_two_calls() {
    let ctx = context(&["Grammar"]);
    let client = client(
        FakeCapability::scripted([
            Ok("Lo siento, no puedo producir JSON.".to_string()),
            Ok(valid_response(&[("Content", 60.0, 70.0)])),
        ]),
        1,
    );

    let feedback = generate_validated(&client, &ctx, &ctx.cacheable_prefix(), "suffix", 2000)
        .await
        .expect("repaired");
    assert_eq!(feedback.scores.totals().achieved, 60.0);

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].prefix.is_some());
    let repair = &requests[1];
    assert!(repair.prefix.is_none());
    assert!(repair.suffix.contains("Lo siento, no puedo producir JSON."));
    assert!(repair.suffix.contains("resumen_para_moodle"));
}

#[tokio::test]
async fn second_failure_keeps_both_messages() {
    let ctx = context(&["Grammar"]);
    let client = client(
        FakeCapability::scripted([
            Ok("sin json".to_string()),
            Ok(r#"{"puntajes": [], "comentario_narrativo": "", "resumen_para_moodle": ""}"#
                .to_string()),
        ]),
        1,
    );

    let err = generate_validated(&client, &ctx, &ctx.cacheable_prefix(), "suffix", 2000)
        .await
        .expect_err("both attempts fail");

    match &err {
        GradingError::RepairFailed { original, retry } => {
            assert!(original.contains("Could not extract"));
            assert!(retry.contains("puntajes"));
        }
        other => panic!("expected a repair failure, got {other:?}"),
    }
    assert_eq!(client.transport().calls(), 2);
}

#[tokio::test]
async fn transport_errors_are_not_repaired() {
    let ctx = context(&[]);
    let client = client(FakeCapability::scripted([Err("connection reset".to_string())]), 1);

    let err = generate_validated(&client, &ctx, &ctx.cacheable_prefix(), "suffix", 2000)
        .await
        .expect_err("transport");

    assert_eq!(err.stage(), Stage::Transport);
    assert_eq!(client.transport().calls(), 1);
}

#[test]
fn prefix_hides_manual_criteria_from_the_model() {
    let ctx = context(&["Grammar"]);
    let prefix = ctx.cacheable_prefix();

    assert!(prefix.contains("\"Content\""));
    assert!(!prefix.contains("Grammar"));
    assert!(prefix.contains("Escribe un ensayo de 500 palabras."));
    assert!(ctx.rubric().contains("Grammar"));
}

#[test]
fn suffix_carries_student_name_and_tutor_scores() {
    let ctx = context(&["Grammar"]);
    let manual = ManualEvaluation::new().with("Grammar", 25.0, Some("Minor typos"));

    let suffix = ctx.item_suffix(&submission("ana", "Mi ensayo."), Some(&manual));

    assert!(suffix.contains("NOMBRE DEL ESTUDIANTE: Ana"));
    assert!(suffix.contains("Grammar: 25/30"));
    assert!(suffix.contains("Minor typos"));
    assert!(suffix.ends_with("Mi ensayo.\n\"\"\""));
}

#[tokio::test]
async fn one_bad_submission_does_not_stop_the_batch() {
    let good = valid_response(&[("Content", 60.0, 70.0)]);
    let fake = FakeCapability::scripted([
        Ok(good.clone()),
        Ok("basura".to_string()),
        Ok("más basura".to_string()),
        Ok(good),
    ]);
    let grader = BatchGrader::builder()
        .client(client(fake, 1))
        .context(context(&["Grammar"]))
        .run(run_info())
        .config(engine(1))
        .build();

    let batch = [
        submission("ana", "uno"),
        submission("beto", "dos"),
        submission("carla", "tres"),
    ];
    let outcomes = grader.run(&batch).await;

    let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, ["ana", "beto", "carla"]);
    assert!(outcomes[0].is_success());
    assert!(outcomes[2].is_success());

    let failure = outcomes[1].failure().expect("second fails");
    assert_eq!(failure.stage, Stage::Repair);
    assert!(failure.message.contains("Original error"));
    assert!(failure.message.contains("Retry error"));
    assert_eq!(grader.client().transport().calls(), 4);
}

#[tokio::test]
async fn worker_pool_preserves_input_order() {
    let fake = FakeCapability::responding(|request| {
        if request.suffix.contains("FALLA") {
            Err("503 Service Unavailable".to_string())
        } else {
            Ok(valid_response(&[("Content", 50.0, 70.0)]))
        }
    });
    let grader = BatchGrader::builder()
        .client(client(fake, 3))
        .context(context(&["Grammar"]))
        .run(run_info())
        .config(engine(3))
        .build();

    let batch: Vec<_> = (0..7)
        .map(|i| {
            let text = if i % 3 == 1 { "FALLA" } else { "texto" };
            submission(&format!("s{i}"), text)
        })
        .collect();
    let outcomes = grader.run(&batch).await;

    assert_eq!(outcomes.len(), batch.len());
    for (i, (outcome, input)) in outcomes.iter().zip(&batch).enumerate() {
        assert_eq!(outcome.id, input.id);
        assert_eq!(outcome.is_success(), i % 3 != 1, "submission {i}");
    }
    let transport = outcomes[1].failure().expect("failure");
    assert_eq!(transport.stage, Stage::Transport);
}

#[tokio::test]
async fn interrupted_batch_reports_remaining_submissions() {
    let grader = BatchGrader::builder()
        .client(client(FakeCapability::unreachable(), 1))
        .context(context(&[]))
        .run(run_info())
        .config(engine(1))
        .build();
    grader.cancel_handle().store(true, Ordering::SeqCst);

    let batch = [submission("ana", "uno"), submission("beto", "dos")];
    let outcomes = grader.run(&batch).await;

    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|o| o.failure().map(|f| f.stage) == Some(Stage::Interrupted))
    );
    assert_eq!(grader.client().transport().calls(), 0);
}

#[tokio::test]
async fn hybrid_batch_merges_and_persists_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = FakeCapability::scripted([Ok(valid_response(&[("Content", 60.0, 70.0)]))]);
    let grader = BatchGrader::builder()
        .client(client(fake, 1))
        .context(context(&["Grammar"]))
        .run(run_info())
        .config(engine(1))
        .sink(Box::new(DirectorySink::new(dir.path())))
        .manual(Box::new(Prefilled::default()))
        .build();

    let mut ana = submission("ana", "Mi ensayo.");
    ana.manual_scores = Some(ManualEvaluation::new().with("Grammar", 25.0, Some("Minor typos")));
    let outcomes = grader.run(&[ana]).await;

    let record = outcomes[0].record().expect("graded");
    assert_eq!(record.totals().achieved, 85.0);
    assert_eq!(record.totals().maximum, 100.0);
    let grammar = record.feedback.scores.get("Grammar").expect("grammar");
    assert_eq!(grammar.origin, Origin::Manual);

    let path = output_path(dir.path(), record);
    assert!(path.ends_with("FI08/unidad_1/actividad_1.1/ana.json"));
    let stored = FeedbackRecord::load(&path).expect("stored record");
    assert_eq!(&stored, record);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(raw["retroalimentacion"]["total_obtenido"], 85.0);
    assert_eq!(raw["retroalimentacion"]["puntajes"][1]["manual"], true);
    assert_eq!(raw["metadata"]["estudiante"], "ANA PEREZ_ana_assignsubmission_file_");
    assert_eq!(raw["metadata"]["student_text"], "Mi ensayo.");
}

#[tokio::test]
async fn long_summary_is_cut_to_the_bound() {
    let long = serde_json::json!({
        "puntajes": [{"criterio": "Content", "puntaje": 60, "maximo": 70, "justificacion": "ok"}],
        "comentario_narrativo": "Bien.",
        "resumen_para_moodle": "a".repeat(800),
    })
    .to_string();
    let grader = BatchGrader::builder()
        .client(client(FakeCapability::scripted([Ok(long)]), 1))
        .context(context(&["Grammar"]))
        .run(run_info())
        .config(engine(1))
        .build();

    let outcomes = grader.run(&[submission("ana", "texto")]).await;

    let record = outcomes[0].record().expect("graded");
    assert_eq!(record.feedback.summary.chars().count(), 500);
}

#[tokio::test]
async fn without_tutor_scores_the_model_grades_tutor_criteria_too() {
    let course = CourseConfig::from_yaml(
        r#"
unidades:
  - unidad: 1
    actividades:
      - id: "1.1"
        rubrica: ensayo.json
        prompt: ensayo.txt
        criterios_manuales: [Grammar]
"#,
    )
    .expect("course");
    let activity = course.find_activity(1, "1.1").expect("activity");
    assert_eq!(activity.hidden_criteria(true), ["Grammar"]);

    let hidden = activity.hidden_criteria(false);
    let hidden: Vec<&str> = hidden.iter().map(String::as_str).collect();
    let ctx = context(&hidden);
    assert!(ctx.cacheable_prefix().contains("Grammar"));

    let fake = FakeCapability::scripted([Ok(valid_response(&[
        ("Content", 60.0, 70.0),
        ("Grammar", 25.0, 30.0),
    ]))]);
    let grader = BatchGrader::builder()
        .client(client(fake, 1))
        .context(ctx)
        .run(run_info())
        .config(engine(1))
        .build();

    let outcomes = grader.run(&[submission("ana", "texto")]).await;

    let record = outcomes[0].record().expect("graded");
    let grammar = record.feedback.scores.get("Grammar").expect("grammar scored");
    assert_eq!(grammar.origin, Origin::Ai);
    assert_eq!(record.totals().achieved, 85.0);
    assert_eq!(record.totals().maximum, 100.0);
}

#[tokio::test]
async fn transport_failure_on_the_corrective_call_keeps_the_original_error() {
    let ctx = context(&[]);
    let client = client(
        FakeCapability::scripted([
            Ok("sin json".to_string()),
            Err("connection reset".to_string()),
        ]),
        1,
    );

    let err = generate_validated(&client, &ctx, &ctx.cacheable_prefix(), "suffix", 2000)
        .await
        .expect_err("repair call fails");

    match &err {
        GradingError::RepairFailed { original, retry } => {
            assert!(original.contains("Could not extract"));
            assert!(retry.contains("connection reset"));
        }
        other => panic!("expected a repair failure, got {other:?}"),
    }
    assert_eq!(err.stage(), Stage::Repair);
    assert_eq!(client.transport().calls(), 2);
}
