//! Validated recipe domain model. Immutable once loaded; a scoring run
//! takes exclusive ownership.

use crate::scoring::formula::FormulaExpr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Measurement family the recipe applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    Survey,
    Biometric,
}

impl RecipeKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecipeKind::Survey => "survey",
            RecipeKind::Biometric => "biometric",
        }
    }
}

/// Instrument-level metadata used for codebooks and methods text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub name: String,
    pub task_name: String,
    pub description: String,
    pub citation: String,
}

/// Inclusive numeric bounds for a response scale or advisory score range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBounds {
    pub min: f64,
    pub max: f64,
}

/// Scale-inversion transform applied to a set of items before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct InvertTransform {
    pub scale: ScaleBounds,
    pub items: BTreeSet<String>,
}

impl InvertTransform {
    /// `(min + max) - raw`; the caller keeps missing values missing.
    pub fn apply(&self, raw: f64) -> f64 {
        self.scale.min + self.scale.max - raw
    }
}

/// How missing item values are treated during aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Missing items are excluded from the aggregate, no substitution.
    Ignore,
    /// Any missing item makes the whole score missing.
    RequireAll,
}

/// Closed set of aggregation methods. `Formula` carries its expression
/// tree, parsed once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreMethod {
    Sum,
    Mean,
    Composite,
    Formula(FormulaExpr),
}

impl ScoreMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ScoreMethod::Sum => "sum",
            ScoreMethod::Mean => "mean",
            ScoreMethod::Composite => "composite",
            ScoreMethod::Formula(_) => "formula",
        }
    }

    /// Only composite and formula scores may reference other scores.
    pub fn may_reference_scores(&self) -> bool {
        matches!(self, ScoreMethod::Composite | ScoreMethod::Formula(_))
    }
}

/// Numeric range mapped to a categorical label. `code` is the stable
/// 1-based position of the band after ordering by lower bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationBand {
    pub lower: f64,
    pub upper: f64,
    pub label: String,
    pub code: i64,
}

impl InterpretationBand {
    /// Both bounds are inclusive; non-overlap is enforced at load time.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// One derived score: aggregation method, references, policy, bands.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDefinition {
    pub name: String,
    pub method: ScoreMethod,
    /// Item or score references. For formula scores these are extracted
    /// from the expression, in first-appearance order.
    pub items: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub missing: MissingPolicy,
    pub range: Option<ScaleBounds>,
    pub bands: Vec<InterpretationBand>,
    pub description: String,
    pub localized: BTreeMap<String, String>,
}

impl ScoreDefinition {
    pub fn weight_for(&self, reference: &str) -> f64 {
        self.weights.get(reference).copied().unwrap_or(1.0)
    }

    pub fn has_bands(&self) -> bool {
        !self.bands.is_empty()
    }
}

/// A loaded, schema-valid recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub version: String,
    pub kind: RecipeKind,
    pub instrument: InstrumentInfo,
    pub transforms: Vec<InvertTransform>,
    pub scores: Vec<ScoreDefinition>,
}

impl Recipe {
    pub fn score(&self, name: &str) -> Option<&ScoreDefinition> {
        self.scores.iter().find(|score| score.name == name)
    }

    pub fn score_names(&self) -> BTreeSet<&str> {
        self.scores.iter().map(|score| score.name.as_str()).collect()
    }

    /// References that must resolve to input columns: everything that is
    /// not the name of another score in this recipe.
    pub fn column_references(&self) -> BTreeSet<&str> {
        let score_names = self.score_names();
        let mut columns: BTreeSet<&str> = BTreeSet::new();
        for transform in &self.transforms {
            columns.extend(transform.items.iter().map(String::as_str));
        }
        for score in &self.scores {
            for reference in &score.items {
                if !score_names.contains(reference.as_str()) {
                    columns.insert(reference.as_str());
                }
            }
        }
        columns
    }
}
