//! Raw recipe document as it arrives on the wire. Field names follow the
//! external PascalCase contract; everything is optional here so the
//! loader can report precise field paths instead of opaque serde errors.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RecipeDocument {
    #[serde(rename = "RecipeVersion")]
    pub(crate) recipe_version: Option<String>,
    #[serde(rename = "Kind")]
    pub(crate) kind: Option<String>,
    #[serde(rename = "Name")]
    pub(crate) name: Option<String>,
    #[serde(rename = "TaskName")]
    pub(crate) task_name: Option<String>,
    #[serde(rename = "Description")]
    pub(crate) description: Option<String>,
    #[serde(rename = "Citation")]
    pub(crate) citation: Option<String>,
    #[serde(rename = "Transforms")]
    pub(crate) transforms: Option<TransformsDocument>,
    #[serde(rename = "Scores", default)]
    pub(crate) scores: Vec<ScoreDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TransformsDocument {
    #[serde(rename = "Invert", default)]
    pub(crate) invert: Vec<InvertDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct InvertDocument {
    #[serde(rename = "Scale")]
    pub(crate) scale: Option<ScaleDocument>,
    #[serde(rename = "Items", default)]
    pub(crate) items: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScaleDocument {
    pub(crate) min: Option<f64>,
    pub(crate) max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScoreDocument {
    #[serde(rename = "Name")]
    pub(crate) name: Option<String>,
    #[serde(rename = "Method")]
    pub(crate) method: Option<String>,
    #[serde(rename = "Items", default)]
    pub(crate) items: Vec<String>,
    #[serde(rename = "Weights", default)]
    pub(crate) weights: BTreeMap<String, f64>,
    #[serde(rename = "Missing")]
    pub(crate) missing: Option<String>,
    #[serde(rename = "Range")]
    pub(crate) range: Option<ScaleDocument>,
    #[serde(rename = "Interpretation", default)]
    pub(crate) interpretation: BTreeMap<String, String>,
    #[serde(rename = "Formula")]
    pub(crate) formula: Option<String>,
    #[serde(rename = "Description")]
    pub(crate) description: Option<String>,
    #[serde(rename = "Localized", default)]
    pub(crate) localized: BTreeMap<String, String>,
}
