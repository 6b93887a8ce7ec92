//! Score Evaluator: computes every score for one participant row in
//! topological order, applying the per-method missing-data policy.

use super::formula::{FormulaEnv, FormulaExpr};
use super::{interpret, transform};
use crate::recipe::{MissingPolicy, Recipe, ScoreDefinition, ScoreMethod};
use crate::table::{CellValue, ParticipantRow};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// One computed score for one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub name: String,
    pub value: CellValue,
    /// Count of non-missing inputs that actually contributed.
    pub contributing: usize,
    pub label: Option<String>,
    pub code: Option<i64>,
}

/// Row-level computation failure; the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDiagnostic {
    pub participant_id: String,
    pub session: String,
    pub score: String,
    pub reason: String,
}

/// Per-row working state: raw values, transformed overlay, and the
/// scores computed so far. Built and discarded per row, never shared.
struct WorkingRow<'a> {
    raw: &'a ParticipantRow,
    transformed: BTreeMap<String, CellValue>,
    computed: BTreeMap<String, CellValue>,
}

impl WorkingRow<'_> {
    /// Transformed value wins over raw for items a transform lists.
    fn item(&self, name: &str) -> CellValue {
        match self.transformed.get(name) {
            Some(value) => *value,
            None => self.raw.value(name),
        }
    }

    /// Scores computed earlier in topological order shadow nothing:
    /// score/column name clashes are rejected at preflight.
    fn resolve(&self, name: &str) -> CellValue {
        match self.computed.get(name) {
            Some(value) => *value,
            None => self.item(name),
        }
    }
}

impl FormulaEnv for WorkingRow<'_> {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.resolve(name).as_number()
    }
}

pub(crate) struct RowEvaluation {
    /// Results in recipe declaration order.
    pub results: Vec<ScoreResult>,
    pub diagnostics: Vec<RowDiagnostic>,
    pub out_of_range: usize,
}

pub(crate) fn evaluate_row(
    recipe: &Recipe,
    order: &[usize],
    row: &ParticipantRow,
) -> RowEvaluation {
    let mut working = WorkingRow {
        raw: row,
        transformed: transform::transformed_values(recipe, row),
        computed: BTreeMap::new(),
    };

    let mut by_name: BTreeMap<&str, ScoreResult> = BTreeMap::new();
    let mut diagnostics = Vec::new();
    let mut out_of_range = 0usize;

    for &index in order {
        let definition = &recipe.scores[index];
        let (value, contributing) = match &definition.method {
            ScoreMethod::Sum => aggregate_sum(definition, &working),
            ScoreMethod::Mean => aggregate_mean(definition, &working),
            ScoreMethod::Composite => aggregate_composite(definition, &working),
            ScoreMethod::Formula(expr) => {
                evaluate_formula(definition, expr, &working, row, &mut diagnostics)
            }
        };

        if let CellValue::Number(number) = value {
            if let Some(range) = &definition.range {
                if number < range.min || number > range.max {
                    warn!(
                        participant = %row.participant_id,
                        session = %row.session,
                        score = %definition.name,
                        value = number,
                        "score outside advisory range"
                    );
                    out_of_range += 1;
                }
            }
        }

        let band = value
            .as_number()
            .and_then(|number| interpret::band_for(definition, number));

        working.computed.insert(definition.name.clone(), value);
        by_name.insert(
            definition.name.as_str(),
            ScoreResult {
                name: definition.name.clone(),
                value,
                contributing,
                label: band.map(|band| band.label.clone()),
                code: band.map(|band| band.code),
            },
        );
    }

    // Column order in the output follows recipe declaration order.
    let results = recipe
        .scores
        .iter()
        .filter_map(|definition| by_name.remove(definition.name.as_str()))
        .collect();

    RowEvaluation {
        results,
        diagnostics,
        out_of_range,
    }
}

/// Resolved component values for a score's references, in order.
fn components(definition: &ScoreDefinition, working: &WorkingRow<'_>) -> Vec<(String, CellValue)> {
    definition
        .items
        .iter()
        .map(|reference| (reference.clone(), working.resolve(reference)))
        .collect()
}

fn aggregate_sum(definition: &ScoreDefinition, working: &WorkingRow<'_>) -> (CellValue, usize) {
    let components = components(definition, working);
    let present: Vec<f64> = components
        .iter()
        .filter_map(|(_, value)| value.as_number())
        .collect();

    if should_be_missing(definition.missing, present.len(), components.len()) {
        return (CellValue::Missing, 0);
    }
    (CellValue::Number(present.iter().sum()), present.len())
}

fn aggregate_mean(definition: &ScoreDefinition, working: &WorkingRow<'_>) -> (CellValue, usize) {
    let components = components(definition, working);
    let present: Vec<f64> = components
        .iter()
        .filter_map(|(_, value)| value.as_number())
        .collect();

    if should_be_missing(definition.missing, present.len(), components.len()) {
        return (CellValue::Missing, 0);
    }
    let total: f64 = present.iter().sum();
    // Divide by the count of present items, never the declared count.
    (CellValue::Number(total / present.len() as f64), present.len())
}

fn aggregate_composite(
    definition: &ScoreDefinition,
    working: &WorkingRow<'_>,
) -> (CellValue, usize) {
    let components = components(definition, working);
    let present: Vec<(f64, f64)> = components
        .iter()
        .filter_map(|(reference, value)| {
            value
                .as_number()
                .map(|number| (definition.weight_for(reference), number))
        })
        .collect();

    if should_be_missing(definition.missing, present.len(), components.len()) {
        return (CellValue::Missing, 0);
    }
    let total = present
        .iter()
        .map(|(weight, value)| weight * value)
        .sum::<f64>();
    (CellValue::Number(total), present.len())
}

/// `require_all` demands every component; `ignore` only needs one.
fn should_be_missing(policy: MissingPolicy, present: usize, declared: usize) -> bool {
    match policy {
        MissingPolicy::RequireAll => present < declared,
        MissingPolicy::Ignore => present == 0,
    }
}

fn evaluate_formula(
    definition: &ScoreDefinition,
    expr: &FormulaExpr,
    working: &WorkingRow<'_>,
    row: &ParticipantRow,
    diagnostics: &mut Vec<RowDiagnostic>,
) -> (CellValue, usize) {
    match expr.evaluate(working) {
        Ok(value) => (CellValue::Number(value), definition.items.len()),
        Err(err) => {
            warn!(
                participant = %row.participant_id,
                session = %row.session,
                score = %definition.name,
                error = %err,
                "formula evaluation failed for row"
            );
            diagnostics.push(RowDiagnostic {
                participant_id: row.participant_id.clone(),
                session: row.session.clone(),
                score: definition.name.clone(),
                reason: err.to_string(),
            });
            (CellValue::Missing, 0)
        }
    }
}
