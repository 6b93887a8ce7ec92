//! Recipe loading: versioned document parsing, schema validation, and the
//! validated domain model consumed by the scoring pipeline.

mod document;
pub mod domain;
mod loader;
mod schema;

pub use domain::{
    InstrumentInfo, InterpretationBand, InvertTransform, MissingPolicy, Recipe, RecipeKind,
    ScaleBounds, ScoreDefinition, ScoreMethod,
};
pub use loader::{RecipeError, RecipeLoader};
pub use schema::SchemaRegistry;
