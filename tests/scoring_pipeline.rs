use scoremill::codebook::{self, LocaleBundle};
use scoremill::config::RunConfig;
use scoremill::recipe::{RecipeLoader, SchemaRegistry};
use scoremill::scoring::ScoringEngine;
use scoremill::table::{CellValue, InputTable};
use std::io::Cursor;

fn run_config() -> RunConfig {
    RunConfig {
        workers: 1,
        ..RunConfig::default()
    }
}

fn phq9_recipe() -> &'static str {
    r#"{
        "RecipeVersion": "1",
        "Kind": "survey",
        "Name": "PHQ-9",
        "TaskName": "phq9",
        "Citation": "Kroenke et al., 2001",
        "Scores": [{
            "Name": "phq9_total",
            "Method": "sum",
            "Items": ["item_1", "item_2", "item_3", "item_4", "item_5",
                      "item_6", "item_7", "item_8", "item_9"],
            "Missing": "require_all",
            "Range": {"min": 0, "max": 27},
            "Interpretation": {
                "0-4": "minimal",
                "5-9": "mild",
                "10-14": "moderate",
                "15-19": "moderately severe",
                "20-27": "severe"
            },
            "Description": "Total depression severity"
        }]
    }"#
}

fn load_engine(document: &str) -> ScoringEngine {
    let registry = SchemaRegistry::builtin();
    let recipe = RecipeLoader::new(&registry)
        .load_str(document)
        .expect("recipe loads");
    ScoringEngine::new(recipe, run_config()).expect("engine builds")
}

#[test]
fn nine_item_sum_recipe_scores_and_labels_three_participants() {
    let engine = load_engine(phq9_recipe());

    let csv = "\
participant_id,session,item_1,item_2,item_3,item_4,item_5,item_6,item_7,item_8,item_9
p01,ses-1,1,1,1,1,1,0,0,0,0
p02,ses-1,3,3,3,3,3,2,1,1,0
p03,ses-1,1,0,0,0,0,0,0,0,0
";
    let table = InputTable::from_csv_reader(Cursor::new(csv)).expect("table parses");
    let outcome = engine.run(&table, None).expect("run succeeds");

    assert_eq!(outcome.report.rows_scored, 3);
    assert!(outcome.report.row_errors.is_empty());

    // All nine items answered in every row, so each total was built
    // from exactly nine contributions.
    let summary = outcome
        .report
        .contributing
        .get("phq9_total")
        .expect("contributing summary present");
    assert_eq!(summary.rows_with_value, 3);
    assert_eq!(summary.min_contributing, 9);
    assert_eq!(summary.max_contributing, 9);

    let expectations = [
        ("p01", 5.0, "mild", 2.0),
        ("p02", 19.0, "moderately severe", 4.0),
        ("p03", 1.0, "minimal", 1.0),
    ];
    for (index, (participant, total, _label, code)) in expectations.iter().enumerate() {
        let row = &outcome.table.rows[index];
        assert_eq!(&row.participant_id, participant);
        assert_eq!(
            outcome.table.cell(index, "phq9_total"),
            Some(CellValue::Number(*total))
        );
        assert_eq!(
            outcome.table.cell(index, "phq9_total_cat"),
            Some(CellValue::Number(*code))
        );
    }

    let category = outcome
        .table
        .variables
        .iter()
        .find(|variable| variable.name == "phq9_total_cat")
        .expect("category variable present");
    let labels = category
        .value_labels
        .as_ref()
        .expect("category variable carries value labels");
    assert_eq!(labels.len(), 5);
    assert_eq!(labels[1].code, 2);
    assert_eq!(labels[1].label, "mild");
}

#[test]
fn pipeline_combines_inversion_subscales_composite_and_formula() {
    let document = r#"{
        "RecipeVersion": "1.1",
        "Kind": "survey",
        "Name": "Wellbeing Battery",
        "TaskName": "wellbeing",
        "Citation": "Example et al., 2020",
        "Transforms": {
            "Invert": [{"Scale": {"min": 1, "max": 5}, "Items": ["neg_1", "neg_2"]}]
        },
        "Scores": [
            {"Name": "balance", "Method": "formula",
             "Formula": "(positive - negative) / total_items", "Missing": "ignore",
             "Description": "Normalized affect balance"},
            {"Name": "positive", "Method": "sum", "Items": ["pos_1", "pos_2"], "Missing": "ignore"},
            {"Name": "negative", "Method": "sum", "Items": ["neg_1", "neg_2"], "Missing": "ignore"},
            {"Name": "total_items", "Method": "formula", "Formula": "4", "Missing": "ignore"},
            {"Name": "overall", "Method": "composite", "Items": ["positive", "negative"],
             "Weights": {"negative": 0.5}, "Missing": "require_all"}
        ]
    }"#;
    let engine = load_engine(document);

    let csv = "\
participant_id,session,pos_1,pos_2,neg_1,neg_2
p01,ses-1,4,5,2,1
p02,ses-1,3,3,NA,2
";
    let table = InputTable::from_csv_reader(Cursor::new(csv)).expect("table parses");
    let outcome = engine.run(&table, None).expect("run succeeds");

    // p01: positive = 9; neg_1,neg_2 invert on 1-5 to 4,5 so negative = 9;
    // balance = 0; overall = 9 + 0.5 * 9.
    assert_eq!(outcome.table.cell(0, "positive"), Some(CellValue::Number(9.0)));
    assert_eq!(outcome.table.cell(0, "negative"), Some(CellValue::Number(9.0)));
    assert_eq!(outcome.table.cell(0, "balance"), Some(CellValue::Number(0.0)));
    assert_eq!(outcome.table.cell(0, "overall"), Some(CellValue::Number(13.5)));

    // p02: neg_1 is missing, so negative ignores it (inverted neg_2 = 4);
    // overall keeps require_all on its own components, both present.
    assert_eq!(outcome.table.cell(1, "negative"), Some(CellValue::Number(4.0)));
    assert_eq!(outcome.table.cell(1, "overall"), Some(CellValue::Number(8.0)));

    assert!(outcome.report.row_errors.is_empty());
}

#[test]
fn formula_failures_are_reported_per_row_without_blocking_the_batch() {
    let document = r#"{
        "RecipeVersion": "1",
        "Kind": "biometric",
        "Name": "Body Metrics",
        "TaskName": "anthro",
        "Scores": [
            {"Name": "bmi", "Method": "formula",
             "Formula": "weight / (height * height)", "Missing": "ignore"},
            {"Name": "weight_sum", "Method": "sum", "Items": ["weight"], "Missing": "ignore"}
        ]
    }"#;
    let engine = load_engine(document);

    let csv = "\
participant_id,session,weight,height
p01,ses-1,70,1.75
p02,ses-1,82,0
p03,ses-1,65,NA
";
    let table = InputTable::from_csv_reader(Cursor::new(csv)).expect("table parses");
    let outcome = engine.run(&table, None).expect("run succeeds");

    let bmi = outcome
        .table
        .cell(0, "bmi")
        .and_then(|cell| cell.as_number())
        .expect("p01 bmi computed");
    assert!((bmi - 22.857).abs() < 0.001);

    // Division by zero and a missing reference each fail only their row.
    assert_eq!(outcome.table.cell(1, "bmi"), Some(CellValue::Missing));
    assert_eq!(outcome.table.cell(2, "bmi"), Some(CellValue::Missing));
    assert_eq!(outcome.table.cell(1, "weight_sum"), Some(CellValue::Number(82.0)));
    assert_eq!(outcome.table.cell(2, "weight_sum"), Some(CellValue::Number(65.0)));

    assert_eq!(outcome.report.rows_scored, 3);
    assert_eq!(outcome.report.row_errors.len(), 2);
    let bmi_summary = outcome
        .report
        .contributing
        .get("bmi")
        .expect("bmi summary present");
    assert_eq!(bmi_summary.rows_with_value, 1);
    assert_eq!(bmi_summary.min_contributing, 0);
    assert_eq!(bmi_summary.max_contributing, 2);
    let reasons: Vec<&str> = outcome
        .report
        .row_errors
        .iter()
        .map(|error| error.reason.as_str())
        .collect();
    assert!(reasons.iter().any(|reason| reason.contains("division by zero")));
    assert!(reasons.iter().any(|reason| reason.contains("height")));
}

#[test]
fn cyclic_recipes_are_rejected_before_any_row_is_processed() {
    let document = r#"{
        "RecipeVersion": "1",
        "Kind": "survey",
        "Name": "Cycle Fixture",
        "Scores": [
            {"Name": "a_score", "Method": "formula", "Formula": "b_score + 1", "Missing": "ignore"},
            {"Name": "b_score", "Method": "formula", "Formula": "a_score + 1", "Missing": "ignore"}
        ]
    }"#;
    let registry = SchemaRegistry::builtin();
    let recipe = RecipeLoader::new(&registry)
        .load_str(document)
        .expect("recipe itself is schema-valid");
    let err = ScoringEngine::new(recipe, run_config()).expect_err("cycle rejected");
    assert!(err.to_string().contains("cyclic score dependency"));
}

#[test]
fn item_passthrough_keeps_raw_values_alongside_scores() {
    let document = r#"{
        "RecipeVersion": "1",
        "Kind": "survey",
        "Name": "Passthrough Fixture",
        "Transforms": {
            "Invert": [{"Scale": {"min": 0, "max": 4}, "Items": ["item_1"]}]
        },
        "Scores": [
            {"Name": "total", "Method": "sum", "Items": ["item_1", "item_2"], "Missing": "ignore"}
        ]
    }"#;
    let registry = SchemaRegistry::builtin();
    let recipe = RecipeLoader::new(&registry)
        .load_str(document)
        .expect("recipe loads");
    let config = RunConfig {
        include_items: true,
        workers: 1,
        ..RunConfig::default()
    };
    let engine = ScoringEngine::new(recipe, config).expect("engine builds");

    let csv = "participant_id,session,item_1,item_2\np01,ses-1,1,2\n";
    let table = InputTable::from_csv_reader(Cursor::new(csv)).expect("table parses");
    let outcome = engine.run(&table, None).expect("run succeeds");

    // Raw item_1 stays 1 in the output even though scoring used the
    // inverted value 3.
    assert_eq!(outcome.table.cell(0, "item_1"), Some(CellValue::Number(1.0)));
    assert_eq!(outcome.table.cell(0, "item_2"), Some(CellValue::Number(2.0)));
    assert_eq!(outcome.table.cell(0, "total"), Some(CellValue::Number(5.0)));
}

#[test]
fn codebook_and_methods_cover_the_scored_battery() {
    let registry = SchemaRegistry::builtin();
    let recipe = RecipeLoader::new(&registry)
        .load_str(phq9_recipe())
        .expect("recipe loads");
    let bundle = LocaleBundle::builtin();

    let entries = codebook::entries(&recipe, &bundle, "en", None, false);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "phq9_total");
    assert_eq!(entries[0].description, "Total depression severity");

    let methods = codebook::methods_text(&recipe, &bundle, "en");
    assert!(methods.contains("PHQ-9 (phq9)"));
    assert!(methods.contains("Kroenke et al., 2001"));
    assert!(methods.contains("phq9_total (sum)"));
}
