//! Fatal error taxonomy for a scoring run. Row-level computation errors
//! are not here: they live in the run report and never abort a batch.

use crate::output::ExportError;
use crate::recipe::RecipeError;
use crate::scoring::GraphError;
use crate::table::TableError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or unsupported recipe; aborts before any row.
    #[error("recipe rejected: {0}")]
    Recipe(#[from] RecipeError),
    /// Composite/formula references form a cycle.
    #[error("score graph rejected: {0}")]
    Graph(#[from] GraphError),
    /// The input table could not be assembled.
    #[error("input table rejected: {0}")]
    Table(#[from] TableError),
    /// A recipe reference names a column the input table lacks.
    #[error("score '{referenced_by}' references '{reference}', which is not an input column")]
    MissingColumn {
        referenced_by: String,
        reference: String,
    },
    /// A score name shadows an input column, making references ambiguous.
    #[error("score '{name}' collides with an input column of the same name")]
    ScoreColumnClash { name: String },
    /// Internal consistency failure: an evaluated result has no matching
    /// definition.
    #[error("no definition for computed score '{0}'")]
    UnknownScore(String),
    /// The bounded worker pool could not be constructed.
    #[error("worker pool unavailable: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    /// Cooperative cancellation was requested; no output was produced.
    #[error("scoring run cancelled before completion")]
    Cancelled,
    /// Surfaced verbatim from an export adapter.
    #[error(transparent)]
    Export(#[from] ExportError),
}
