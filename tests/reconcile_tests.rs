use retro::{
    Criterion, Rubric,
    grade::{
        CriterionScore, ManualEvaluation, Origin, ScoreSet, auto_full_scores,
        reconcile::DEFAULT_MANUAL_COMMENT, reconcile,
    },
};

fn rubric() -> Rubric {
    Rubric::new(vec![
        Criterion::new("Content", 70.0),
        Criterion::new("Grammar", 30.0),
        Criterion::new("Referencias", 10.0),
    ])
    .expect("rubric")
}

#[test]
fn content_by_model_and_grammar_by_tutor_total_85_of_100() {
    let rubric = Rubric::new(vec![
        Criterion::new("Content", 70.0),
        Criterion::new("Grammar", 30.0),
    ])
    .expect("rubric");
    let ai = ScoreSet::new(vec![CriterionScore::ai("Content", 60.0, 70.0, "Sólido")]);
    let manual = ManualEvaluation::new().with("Grammar", 25.0, Some("Minor typos"));

    let merged = reconcile(&ai, &manual, &rubric, 5.0);

    assert_eq!(merged.scores.len(), 2);
    let content = merged.scores.get("Content").expect("content");
    assert_eq!((content.achieved, content.maximum), (60.0, 70.0));
    assert_eq!(content.origin, Origin::Ai);

    let grammar = merged.scores.get("Grammar").expect("grammar");
    assert_eq!((grammar.achieved, grammar.maximum), (25.0, 30.0));
    assert_eq!(grammar.origin, Origin::Manual);
    assert_eq!(grammar.justification, "Minor typos");

    assert_eq!(merged.totals.achieved, 85.0);
    assert_eq!(merged.totals.maximum, 100.0);
}

#[test]
fn manual_score_overwrites_model_entry_in_place() {
    let ai = ScoreSet::new(vec![
        CriterionScore::ai("Content", 50.0, 70.0, "Bien"),
        CriterionScore::ai("Grammar", 10.0, 30.0, "Errores"),
        CriterionScore::ai("Referencias", 8.0, 10.0, "Completas"),
    ]);
    let manual = ManualEvaluation::new().with("Grammar", 28.0, None);

    let merged = reconcile(&ai, &manual, &rubric(), 5.0);

    let names: Vec<&str> = merged.scores.names().collect();
    assert_eq!(names, ["Content", "Grammar", "Referencias"]);
    let grammar = merged.scores.get("Grammar").expect("grammar");
    assert_eq!(grammar.achieved, 28.0);
    assert_eq!(grammar.maximum, 30.0);
    assert_eq!(grammar.justification, DEFAULT_MANUAL_COMMENT);
    assert_eq!(merged.totals.achieved, 86.0);
}

#[test]
fn merging_twice_gives_the_same_result() {
    let ai = ScoreSet::new(vec![CriterionScore::ai("Content", 60.0, 70.0, "Sólido")]);
    let manual = ManualEvaluation::new()
        .with("Grammar", 25.0, Some("Minor typos"))
        .with("Referencias", 7.0, None);

    let once = reconcile(&ai, &manual, &rubric(), 5.0);
    let twice = reconcile(&once.scores, &manual, &rubric(), 5.0);

    assert_eq!(once, twice);
}

#[test]
fn unknown_manual_criterion_uses_default_maximum() {
    let ai = ScoreSet::new(vec![CriterionScore::ai("Content", 60.0, 70.0, "Sólido")]);
    let manual = ManualEvaluation::new().with("Presentación", 4.0, None);

    let merged = reconcile(&ai, &manual, &rubric(), 5.0);

    let extra = merged.scores.get("Presentación").expect("appended");
    assert_eq!(extra.maximum, 5.0);
    assert_eq!(extra.origin, Origin::Manual);
    assert_eq!(merged.totals.maximum, 75.0);
}

#[test]
fn repeated_model_entries_keep_the_first() {
    let ai = ScoreSet::new(vec![
        CriterionScore::ai("Content", 60.0, 70.0, "primera"),
        CriterionScore::ai("Content", 10.0, 70.0, "segunda"),
    ]);

    let merged = reconcile(&ai, &ManualEvaluation::new(), &rubric(), 5.0);

    assert_eq!(merged.scores.len(), 1);
    assert_eq!(merged.scores.get("Content").expect("content").justification, "primera");
    assert_eq!(merged.totals.achieved, 60.0);
}

#[test]
fn full_score_rule_skips_names_outside_the_rubric() {
    let evaluation = auto_full_scores(&rubric(), &["Referencias", "Inexistente"]);

    assert_eq!(evaluation.len(), 1);
    assert_eq!(evaluation.score("Referencias"), Some(10.0));
    assert_eq!(evaluation.comment("Referencias"), Some(DEFAULT_MANUAL_COMMENT));
}

#[test]
fn manual_flag_round_trips_through_json() {
    let scores = ScoreSet::new(vec![
        CriterionScore::ai("Content", 60.0, 70.0, "ok"),
        CriterionScore::manual("Grammar", 25.0, 30.0, "Minor typos"),
    ]);

    let value = serde_json::to_value(&scores).expect("serialize");
    assert!(value[0].get("manual").is_none());
    assert_eq!(value[1]["manual"], true);
    assert_eq!(value[1]["criterio"], "Grammar");

    let back: ScoreSet = serde_json::from_value(value).expect("deserialize");
    assert_eq!(back, scores);
}
