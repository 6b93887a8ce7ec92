//! Batch scoring pipeline: transform, dependency-ordered evaluation,
//! interpretation, and neutral-output assembly over independent rows.

mod evaluator;
pub mod formula;
mod graph;
mod interpret;
mod transform;

pub use evaluator::{RowDiagnostic, ScoreResult};
pub use graph::{GraphError, ScoreGraph};

use crate::codebook::{self, LocaleBundle};
use crate::config::RunConfig;
use crate::error::EngineError;
use crate::output::{ScoredRow, ScoredTable};
use crate::recipe::Recipe;
use crate::table::{CellValue, InputTable, SidecarMetadata};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Contributing-count audit for one score across the batch: how many
/// rows produced a value, and the spread of contributing counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionSummary {
    pub rows_with_value: usize,
    pub min_contributing: usize,
    pub max_contributing: usize,
}

/// Per-run error report delivered alongside the scored table. Row-level
/// failures never block the rows that succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub language: String,
    pub rows_scored: usize,
    pub out_of_range: usize,
    pub contributing: BTreeMap<String, ContributionSummary>,
    pub row_errors: Vec<RowDiagnostic>,
}

/// Scored table plus its run report.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub table: ScoredTable,
    pub report: RunReport,
}

/// One scoring run: owns the recipe, the topological plan, and the
/// locale bundle. All of it is immutable and shared read-only across the
/// row workers.
#[derive(Debug)]
pub struct ScoringEngine {
    recipe: Recipe,
    graph: ScoreGraph,
    bundle: LocaleBundle,
    config: RunConfig,
}

impl ScoringEngine {
    /// Builds the dependency graph up front; a cyclic recipe never gets
    /// to see data.
    pub fn new(recipe: Recipe, config: RunConfig) -> Result<Self, EngineError> {
        let graph = ScoreGraph::build(&recipe)?;
        info!(
            instrument = %recipe.instrument.name,
            scores = recipe.scores.len(),
            "scoring engine ready"
        );
        Ok(Self {
            recipe,
            graph,
            bundle: LocaleBundle::builtin(),
            config,
        })
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn run(
        &self,
        table: &InputTable,
        sidecar: Option<&SidecarMetadata>,
    ) -> Result<RunOutcome, EngineError> {
        let cancel = AtomicBool::new(false);
        self.run_with_cancel(table, sidecar, &cancel)
    }

    /// Runs the batch; if `cancel` is raised mid-run, no output is
    /// produced at all.
    pub fn run_with_cancel(
        &self,
        table: &InputTable,
        sidecar: Option<&SidecarMetadata>,
        cancel: &AtomicBool,
    ) -> Result<RunOutcome, EngineError> {
        self.preflight(table)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;

        let order = self.graph.evaluation_order();
        let evaluations: Vec<_> = pool.install(|| {
            table
                .rows()
                .par_iter()
                .map(|row| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    Some(evaluator::evaluate_row(&self.recipe, order, row))
                })
                .collect()
        });

        if cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }

        let variables = codebook::variables(
            &self.recipe,
            &self.bundle,
            &self.config.language,
            sidecar,
            self.config.include_items,
        );

        let mut rows = Vec::with_capacity(table.rows().len());
        let mut row_errors = Vec::new();
        let mut out_of_range = 0usize;
        let mut contributing: BTreeMap<String, ContributionSummary> = BTreeMap::new();

        for (raw, evaluation) in table.rows().iter().zip(evaluations) {
            // All rows evaluated: cancellation was checked above.
            let Some(evaluation) = evaluation else {
                return Err(EngineError::Cancelled);
            };

            let mut cells = Vec::with_capacity(variables.len());
            if self.config.include_items {
                for item in self.recipe.column_references() {
                    cells.push(raw.value(item));
                }
            }
            for result in &evaluation.results {
                cells.push(result.value);
                let summary = contributing
                    .entry(result.name.clone())
                    .or_insert(ContributionSummary {
                        rows_with_value: 0,
                        min_contributing: result.contributing,
                        max_contributing: result.contributing,
                    });
                if !result.value.is_missing() {
                    summary.rows_with_value += 1;
                }
                summary.min_contributing = summary.min_contributing.min(result.contributing);
                summary.max_contributing = summary.max_contributing.max(result.contributing);
                let definition = self
                    .recipe
                    .score(&result.name)
                    .ok_or_else(|| EngineError::UnknownScore(result.name.clone()))?;
                if definition.has_bands() {
                    cells.push(
                        result
                            .code
                            .map(|code| CellValue::Number(code as f64))
                            .unwrap_or(CellValue::Missing),
                    );
                }
            }

            rows.push(ScoredRow {
                participant_id: raw.participant_id.clone(),
                session: raw.session.clone(),
                cells,
            });
            row_errors.extend(evaluation.diagnostics);
            out_of_range += evaluation.out_of_range;
        }

        let report = RunReport {
            generated_at: Utc::now(),
            language: self
                .bundle
                .resolve_language(&self.config.language)
                .to_string(),
            rows_scored: rows.len(),
            out_of_range,
            contributing,
            row_errors,
        };

        info!(
            rows = report.rows_scored,
            row_errors = report.row_errors.len(),
            out_of_range = report.out_of_range,
            "scoring run complete"
        );

        Ok(RunOutcome {
            table: ScoredTable { variables, rows },
            report,
        })
    }

    /// Dataset-level checks, once per run: every column reference must
    /// exist, and no score may shadow an input column.
    fn preflight(&self, table: &InputTable) -> Result<(), EngineError> {
        for definition in &self.recipe.scores {
            if table.has_column(&definition.name) {
                return Err(EngineError::ScoreColumnClash {
                    name: definition.name.clone(),
                });
            }
        }

        let score_names = self.recipe.score_names();
        for transform in &self.recipe.transforms {
            for item in &transform.items {
                if !table.has_column(item) {
                    return Err(EngineError::MissingColumn {
                        referenced_by: "Transforms.Invert".to_string(),
                        reference: item.clone(),
                    });
                }
            }
        }
        for definition in &self.recipe.scores {
            for reference in &definition.items {
                if score_names.contains(reference.as_str()) {
                    continue;
                }
                if !table.has_column(reference) {
                    return Err(EngineError::MissingColumn {
                        referenced_by: definition.name.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
