//! Parses and schema-validates recipe documents. Validation failures are
//! fatal for the whole run and carry the offending field path.

use super::document::{RecipeDocument, ScaleDocument, ScoreDocument};
use super::domain::{
    InstrumentInfo, InterpretationBand, InvertTransform, MissingPolicy, Recipe, RecipeKind,
    ScaleBounds, ScoreDefinition, ScoreMethod,
};
use super::schema::SchemaRegistry;
use crate::scoring::formula;
use std::collections::BTreeSet;
use tracing::debug;

/// Fatal recipe-load error. No partial recipes are ever produced.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("recipe document is not well-formed JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{path}: {reason}")]
    SchemaValidation { path: String, reason: String },
    #[error("{path}: interpretation bands '{first}' and '{second}' overlap")]
    BandOverlap {
        path: String,
        first: String,
        second: String,
    },
}

fn invalid(path: impl Into<String>, reason: impl Into<String>) -> RecipeError {
    RecipeError::SchemaValidation {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Loads recipes against an explicit registry of supported schema
/// versions.
pub struct RecipeLoader<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> RecipeLoader<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn load_str(&self, document: &str) -> Result<Recipe, RecipeError> {
        let document: RecipeDocument = serde_json::from_str(document)?;
        self.validate(document)
    }

    fn validate(&self, document: RecipeDocument) -> Result<Recipe, RecipeError> {
        let version = document
            .recipe_version
            .ok_or_else(|| invalid("RecipeVersion", "field is required"))?;
        if !self.registry.supports(&version) {
            return Err(invalid(
                "RecipeVersion",
                format!(
                    "version '{}' is not supported (supported: {})",
                    version,
                    self.registry.supported().join(", ")
                ),
            ));
        }

        let kind = match document.kind.as_deref() {
            Some("survey") => RecipeKind::Survey,
            Some("biometric") => RecipeKind::Biometric,
            Some(other) => {
                return Err(invalid(
                    "Kind",
                    format!("'{other}' is not one of: survey, biometric"),
                ))
            }
            None => return Err(invalid("Kind", "field is required")),
        };

        let name = document
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| invalid("Name", "field is required"))?;

        let instrument = InstrumentInfo {
            name,
            task_name: document.task_name.unwrap_or_default(),
            description: document.description.unwrap_or_default(),
            citation: document.citation.unwrap_or_default(),
        };

        let mut transforms = Vec::new();
        if let Some(transform_doc) = document.transforms {
            for (index, invert) in transform_doc.invert.into_iter().enumerate() {
                let path = format!("Transforms.Invert[{index}]");
                let scale = validate_scale(
                    invert.scale,
                    &format!("{path}.Scale"),
                    ScaleRule::MinBelowMax,
                )?
                .ok_or_else(|| invalid(format!("{path}.Scale"), "field is required"))?;
                if invert.items.is_empty() {
                    return Err(invalid(format!("{path}.Items"), "at least one item is required"));
                }
                let mut items = BTreeSet::new();
                for (item_index, item) in invert.items.into_iter().enumerate() {
                    let item = canonical_identifier(
                        &item,
                        &format!("{path}.Items[{item_index}]"),
                    )?;
                    items.insert(item);
                }
                transforms.push(InvertTransform { scale, items });
            }
        }

        if document.scores.is_empty() {
            return Err(invalid("Scores", "at least one score is required"));
        }

        // Score names first, so later-declared scores are referencable
        // (evaluation order is topological, not textual) and collisions
        // are caught before per-score validation.
        let mut score_names: BTreeSet<String> = BTreeSet::new();
        for (index, score) in document.scores.iter().enumerate() {
            let path = format!("Scores[{index}].Name");
            let name = score
                .name
                .as_deref()
                .ok_or_else(|| invalid(&path, "field is required"))?;
            let name = canonical_identifier(name, &path)?;
            if !score_names.insert(name.clone()) {
                return Err(invalid(path, format!("duplicate score name '{name}'")));
            }
        }

        let mut scores = Vec::new();
        for (index, score) in document.scores.into_iter().enumerate() {
            scores.push(validate_score(score, index, &score_names)?);
        }

        debug!(
            version = %version,
            instrument = %instrument.name,
            scores = scores.len(),
            "recipe validated"
        );

        Ok(Recipe {
            version,
            kind,
            instrument,
            transforms,
            scores,
        })
    }
}

fn validate_score(
    score: ScoreDocument,
    index: usize,
    score_names: &BTreeSet<String>,
) -> Result<ScoreDefinition, RecipeError> {
    let path = format!("Scores[{index}]");
    let name = score
        .name
        .ok_or_else(|| invalid(format!("{path}.Name"), "field is required"))?;
    let name = name.trim().to_string();

    let missing = match score.missing.as_deref() {
        Some("ignore") => MissingPolicy::Ignore,
        Some("require_all") => MissingPolicy::RequireAll,
        Some(other) => {
            return Err(invalid(
                format!("{path}.Missing"),
                format!("'{other}' is not one of: ignore, require_all"),
            ))
        }
        None => return Err(invalid(format!("{path}.Missing"), "field is required")),
    };

    let (method, items) = match score.method.as_deref() {
        Some("formula") => {
            if !score.items.is_empty() {
                return Err(invalid(
                    format!("{path}.Items"),
                    "formula scores derive their references from the expression",
                ));
            }
            if !score.weights.is_empty() {
                return Err(invalid(
                    format!("{path}.Weights"),
                    "weights only apply to composite scores",
                ));
            }
            let source = score
                .formula
                .as_deref()
                .ok_or_else(|| invalid(format!("{path}.Formula"), "field is required"))?;
            let expr = formula::parse(source).map_err(|err| {
                invalid(format!("{path}.Formula"), err.to_string())
            })?;
            let references = expr.references();
            (ScoreMethod::Formula(expr), references)
        }
        Some(method @ ("sum" | "mean" | "composite")) => {
            if score.formula.is_some() {
                return Err(invalid(
                    format!("{path}.Formula"),
                    format!("'{method}' scores do not take a formula"),
                ));
            }
            if score.items.is_empty() {
                return Err(invalid(
                    format!("{path}.Items"),
                    "at least one reference is required",
                ));
            }
            let mut items = Vec::new();
            for (item_index, item) in score.items.iter().enumerate() {
                items.push(canonical_identifier(
                    item,
                    &format!("{path}.Items[{item_index}]"),
                )?);
            }
            let method = match method {
                "sum" => ScoreMethod::Sum,
                "mean" => ScoreMethod::Mean,
                _ => ScoreMethod::Composite,
            };
            if !method.may_reference_scores() {
                if let Some(reference) = items.iter().find(|item| score_names.contains(*item)) {
                    return Err(invalid(
                        format!("{path}.Items"),
                        format!(
                            "'{reference}' names another score; {} scores may only reference items",
                            method.label()
                        ),
                    ));
                }
                if !score.weights.is_empty() {
                    return Err(invalid(
                        format!("{path}.Weights"),
                        "weights only apply to composite scores",
                    ));
                }
            } else {
                for key in score.weights.keys() {
                    if !items.iter().any(|item| item == key) {
                        return Err(invalid(
                            format!("{path}.Weights.{key}"),
                            "weight does not match any entry in Items",
                        ));
                    }
                }
            }
            (method, items)
        }
        Some(other) => {
            return Err(invalid(
                format!("{path}.Method"),
                format!("'{other}' is not one of: sum, mean, composite, formula"),
            ))
        }
        None => return Err(invalid(format!("{path}.Method"), "field is required")),
    };

    let range = validate_scale(score.range, &format!("{path}.Range"), ScaleRule::MinAtMostMax)?;
    let bands = validate_bands(score.interpretation, &format!("{path}.Interpretation"))?;

    Ok(ScoreDefinition {
        name,
        method,
        items,
        weights: score.weights,
        missing,
        range,
        bands,
        description: score.description.unwrap_or_default(),
        localized: score.localized,
    })
}

enum ScaleRule {
    MinBelowMax,
    MinAtMostMax,
}

fn validate_scale(
    scale: Option<ScaleDocument>,
    path: &str,
    rule: ScaleRule,
) -> Result<Option<ScaleBounds>, RecipeError> {
    let Some(scale) = scale else {
        return Ok(None);
    };
    let min = scale
        .min
        .ok_or_else(|| invalid(format!("{path}.min"), "field is required"))?;
    let max = scale
        .max
        .ok_or_else(|| invalid(format!("{path}.max"), "field is required"))?;
    let ok = match rule {
        ScaleRule::MinBelowMax => min < max,
        ScaleRule::MinAtMostMax => min <= max,
    };
    if !ok {
        return Err(invalid(
            path,
            format!("min {min} must not exceed max {max}"),
        ));
    }
    Ok(Some(ScaleBounds { min, max }))
}

fn validate_bands(
    interpretation: std::collections::BTreeMap<String, String>,
    path: &str,
) -> Result<Vec<InterpretationBand>, RecipeError> {
    let mut bands = Vec::new();
    for (key, label) in interpretation {
        let band_path = format!("{path}.{key}");
        let (lower, upper) = parse_band_key(&key)
            .ok_or_else(|| invalid(&band_path, "expected a '<lower>-<upper>' range key"))?;
        if lower > upper {
            return Err(invalid(
                &band_path,
                format!("lower bound {lower} exceeds upper bound {upper}"),
            ));
        }
        if label.trim().is_empty() {
            return Err(invalid(&band_path, "band label must not be empty"));
        }
        bands.push(InterpretationBand {
            lower,
            upper,
            label,
            code: 0,
        });
    }

    bands.sort_by(|a, b| {
        a.lower
            .partial_cmp(&b.lower)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for pair in bands.windows(2) {
        // Upper bounds are inclusive, so the next lower bound must be
        // strictly greater.
        if pair[1].lower <= pair[0].upper {
            return Err(RecipeError::BandOverlap {
                path: path.to_string(),
                first: format!("{}-{}", pair[0].lower, pair[0].upper),
                second: format!("{}-{}", pair[1].lower, pair[1].upper),
            });
        }
    }

    for (position, band) in bands.iter_mut().enumerate() {
        band.code = position as i64 + 1;
    }

    Ok(bands)
}

/// `"<lower>-<upper>"`, where the separator is the first '-' that follows
/// a digit (so negative lower bounds parse).
fn parse_band_key(key: &str) -> Option<(f64, f64)> {
    let bytes = key.as_bytes();
    for index in 1..bytes.len() {
        if bytes[index] == b'-' {
            let previous = bytes[index - 1];
            if previous.is_ascii_digit() || previous == b'.' {
                let lower = key[..index].trim().parse().ok()?;
                let upper = key[index + 1..].trim().parse().ok()?;
                return Some((lower, upper));
            }
        }
    }
    None
}

/// Normalizes a reference to the canonical case-sensitive identifier
/// form shared with the formula grammar.
fn canonical_identifier(raw: &str, path: &str) -> Result<String, RecipeError> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(invalid(
            path,
            format!("'{raw}' is not a valid identifier ([A-Za-z_][A-Za-z0-9_]*)"),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(document: &str) -> Result<Recipe, RecipeError> {
        let registry = SchemaRegistry::builtin();
        RecipeLoader::new(&registry).load_str(document)
    }

    fn minimal_recipe(scores: &str) -> String {
        format!(
            r#"{{
                "RecipeVersion": "1",
                "Kind": "survey",
                "Name": "PHQ-9",
                "TaskName": "phq9",
                "Citation": "Kroenke et al., 2001",
                "Scores": {scores}
            }}"#
        )
    }

    #[test]
    fn loads_a_minimal_sum_recipe() {
        let document = minimal_recipe(
            r#"[{
                "Name": "total",
                "Method": "sum",
                "Items": ["item_1", "item_2"],
                "Missing": "ignore",
                "Description": "Total severity"
            }]"#,
        );
        let recipe = load(&document).expect("recipe loads");
        assert_eq!(recipe.version, "1");
        assert_eq!(recipe.kind, RecipeKind::Survey);
        assert_eq!(recipe.scores.len(), 1);
        assert_eq!(recipe.scores[0].method, ScoreMethod::Sum);
        assert_eq!(recipe.scores[0].missing, MissingPolicy::Ignore);
    }

    #[test]
    fn rejects_unknown_schema_versions() {
        let document = r#"{"RecipeVersion": "9", "Kind": "survey", "Name": "x", "Scores": []}"#;
        let err = load(document).expect_err("unsupported version");
        match err {
            RecipeError::SchemaValidation { path, reason } => {
                assert_eq!(path, "RecipeVersion");
                assert!(reason.contains("not supported"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_score_names() {
        let document = minimal_recipe(
            r#"[
                {"Name": "total", "Method": "sum", "Items": ["a"], "Missing": "ignore"},
                {"Name": "total", "Method": "mean", "Items": ["b"], "Missing": "ignore"}
            ]"#,
        );
        let err = load(&document).expect_err("duplicate names rejected");
        assert!(err.to_string().contains("duplicate score name 'total'"));
    }

    #[test]
    fn rejects_sum_scores_referencing_other_scores() {
        let document = minimal_recipe(
            r#"[
                {"Name": "total", "Method": "sum", "Items": ["a", "subscale"], "Missing": "ignore"},
                {"Name": "subscale", "Method": "sum", "Items": ["b"], "Missing": "ignore"}
            ]"#,
        );
        let err = load(&document).expect_err("score reference in sum rejected");
        assert!(err.to_string().contains("may only reference items"));
    }

    #[test]
    fn rejects_overlapping_interpretation_bands() {
        let document = minimal_recipe(
            r#"[{
                "Name": "total",
                "Method": "sum",
                "Items": ["a"],
                "Missing": "ignore",
                "Interpretation": {"0-4": "minimal", "4-9": "mild"}
            }]"#,
        );
        let err = load(&document).expect_err("overlap rejected");
        assert!(matches!(err, RecipeError::BandOverlap { .. }));
    }

    #[test]
    fn assigns_positional_band_codes_after_sorting() {
        let document = minimal_recipe(
            r#"[{
                "Name": "total",
                "Method": "sum",
                "Items": ["a"],
                "Missing": "ignore",
                "Interpretation": {"10-14": "moderate", "0-4": "minimal", "5-9": "mild"}
            }]"#,
        );
        let recipe = load(&document).expect("recipe loads");
        let bands = &recipe.scores[0].bands;
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0].label, "minimal");
        assert_eq!(bands[0].code, 1);
        assert_eq!(bands[1].label, "mild");
        assert_eq!(bands[1].code, 2);
        assert_eq!(bands[2].label, "moderate");
        assert_eq!(bands[2].code, 3);
    }

    #[test]
    fn formula_scores_extract_references_from_expression() {
        let document = minimal_recipe(
            r#"[
                {"Name": "ratio", "Method": "formula", "Formula": "(a + b) / b", "Missing": "ignore"}
            ]"#,
        );
        let recipe = load(&document).expect("recipe loads");
        assert_eq!(recipe.scores[0].items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn formula_syntax_errors_are_fatal_with_field_path() {
        let document = minimal_recipe(
            r#"[{"Name": "bad", "Method": "formula", "Formula": "a ** b", "Missing": "ignore"}]"#,
        );
        let err = load(&document).expect_err("syntax error is fatal");
        match err {
            RecipeError::SchemaValidation { path, .. } => {
                assert_eq!(path, "Scores[0].Formula");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_weights_that_match_no_reference() {
        let document = minimal_recipe(
            r#"[
                {"Name": "a_sum", "Method": "sum", "Items": ["a"], "Missing": "ignore"},
                {"Name": "combo", "Method": "composite", "Items": ["a_sum"],
                 "Weights": {"b_sum": 2.0}, "Missing": "ignore"}
            ]"#,
        );
        let err = load(&document).expect_err("stray weight rejected");
        assert!(err.to_string().contains("Weights.b_sum"));
    }

    #[test]
    fn parses_band_keys_with_negative_lower_bounds() {
        assert_eq!(parse_band_key("0-4"), Some((0.0, 4.0)));
        assert_eq!(parse_band_key("-2.5-0"), Some((-2.5, 0.0)));
        assert_eq!(parse_band_key("minimal"), None);
    }
}
