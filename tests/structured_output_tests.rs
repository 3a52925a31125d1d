use retro::{
    StructuredOutputError,
    grade::{extract, parse_response, validate},
};
use serde_json::json;

fn sample() -> serde_json::Value {
    json!({
        "puntajes": [
            {"criterio": "Content", "puntaje": 60, "maximo": 70, "justificacion": "Sólido"}
        ],
        "comentario_narrativo": "Buen ensayo.",
        "resumen_para_moodle": "Buen ensayo."
    })
}

fn field_of(err: StructuredOutputError) -> String {
    match err {
        StructuredOutputError::Validation { field, .. } => field,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn fenced_block_inside_prose_is_recovered() {
    let raw = format!(
        "Claro, aquí tienes la evaluación:\n\n```json\n{}\n```\n\nQuedo atento.",
        serde_json::to_string_pretty(&sample()).expect("serialize")
    );

    assert_eq!(extract(&raw).expect("extract"), sample());
}

#[test]
fn object_surrounded_by_prose_is_recovered() {
    let raw = format!("Resultado: {} -- fin", sample());
    assert_eq!(extract(&raw).expect("extract"), sample());
}

#[test]
fn bare_json_parses_directly() {
    let feedback = parse_response(&sample().to_string()).expect("parse");
    assert_eq!(feedback.scores.len(), 1);
    assert_eq!(feedback.narrative, "Buen ensayo.");
}

#[test]
fn text_without_json_fails_with_preview() {
    let raw = "no hay json aquí ".repeat(100);
    match extract(&raw) {
        Err(StructuredOutputError::Extraction { preview }) => {
            assert!(preview.ends_with("..."));
            assert!(preview.chars().count() <= 503);
        }
        other => panic!("expected extraction failure, got {other:?}"),
    }
}

#[test]
fn missing_maximum_is_rejected() {
    let mut value = sample();
    value["puntajes"][0]
        .as_object_mut()
        .expect("entry")
        .remove("maximo");

    assert_eq!(field_of(validate(&value).expect_err("invalid")), "puntajes[0].maximo");
}

#[test]
fn numeric_string_score_is_rejected() {
    let mut value = sample();
    value["puntajes"][0]["puntaje"] = json!("60");

    assert_eq!(field_of(validate(&value).expect_err("invalid")), "puntajes[0].puntaje");
}

#[test]
fn empty_score_list_is_rejected() {
    let mut value = sample();
    value["puntajes"] = json!([]);

    assert_eq!(field_of(validate(&value).expect_err("invalid")), "puntajes");
}

#[test]
fn non_string_narrative_is_rejected() {
    let mut value = sample();
    value["comentario_narrativo"] = json!(["no", "es", "texto"]);

    assert_eq!(field_of(validate(&value).expect_err("invalid")), "comentario_narrativo");
}

#[test]
fn missing_top_level_key_lists_present_keys() {
    let mut value = sample();
    value.as_object_mut().expect("object").remove("resumen_para_moodle");

    let message = validate(&value).expect_err("invalid").to_string();
    assert!(message.contains("resumen_para_moodle"));
    assert!(message.contains("comentario_narrativo"));
}

#[test]
fn score_above_maximum_is_rejected() {
    let mut value = sample();
    value["puntajes"][0]["puntaje"] = json!(75);

    assert_eq!(field_of(validate(&value).expect_err("invalid")), "puntajes[0].puntaje");
}

#[test]
fn validation_does_not_touch_its_input() {
    let value = sample();
    let before = value.clone();
    validate(&value).expect("valid");
    assert_eq!(value, before);
}

#[test]
fn trailing_comma_reports_extraction_not_a_nested_entry() {
    let raw = r#"Aquí está: {"puntajes": [{"criterio": "A", "puntaje": 1, "maximo": 2, "justificacion": "ok"},], "comentario_narrativo": "n", "resumen_para_moodle": "r"}"#;

    assert!(matches!(extract(raw), Err(StructuredOutputError::Extraction { .. })));
    match parse_response(raw) {
        Err(StructuredOutputError::Extraction { preview }) => assert!(preview.contains("puntajes")),
        other => panic!("expected extraction failure, got {other:?}"),
    }
}

#[test]
fn scalar_json_is_not_accepted_as_output() {
    assert!(matches!(extract("42"), Err(StructuredOutputError::Extraction { .. })));
}
