//! Codebook & methods generation: pure formatting over a loaded recipe
//! and already-computed structure. No numeric work happens here.

mod locale;

pub use locale::{LocaleBundle, DEFAULT_LANGUAGE};

use crate::output::VariableMetadata;
use crate::recipe::{Recipe, ScoreDefinition};
use crate::table::{SidecarMetadata, ValueLabel};
use serde::Serialize;

/// Variable-level metadata row of the human-readable codebook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodebookEntry {
    pub name: String,
    pub label: String,
    pub description: String,
    pub value_labels: Vec<ValueLabel>,
    pub language: String,
}

/// Name of the companion categorical column for a banded score.
pub fn category_column(score: &str) -> String {
    format!("{score}_cat")
}

fn localized_description<'a>(definition: &'a ScoreDefinition, language: &str) -> &'a str {
    definition
        .localized
        .get(language)
        .map(String::as_str)
        .unwrap_or(&definition.description)
}

/// Codebook entries for every output variable: optional raw item
/// passthrough columns (with sidecar `Levels` folded in), then one entry
/// per score plus a categorical companion for banded scores.
pub fn entries(
    recipe: &Recipe,
    bundle: &LocaleBundle,
    language: &str,
    sidecar: Option<&SidecarMetadata>,
    include_items: bool,
) -> Vec<CodebookEntry> {
    let language = bundle.resolve_language(language).to_string();
    let strings = bundle.strings(&language);
    let mut entries = Vec::new();

    if include_items {
        for item in recipe.column_references() {
            let levels = sidecar
                .and_then(|sidecar| sidecar.levels_for(item))
                .map(|labels| labels.to_vec())
                .unwrap_or_default();
            entries.push(CodebookEntry {
                name: item.to_string(),
                label: item.to_string(),
                description: String::new(),
                value_labels: levels,
                language: language.clone(),
            });
        }
    }

    for definition in &recipe.scores {
        entries.push(CodebookEntry {
            name: definition.name.clone(),
            label: format!("{} {}", recipe.instrument.name, definition.name),
            description: localized_description(definition, &language).to_string(),
            value_labels: Vec::new(),
            language: language.clone(),
        });

        if definition.has_bands() {
            entries.push(CodebookEntry {
                name: category_column(&definition.name),
                label: strings.category_label.replace("{score}", &definition.name),
                description: strings
                    .category_description
                    .replace("{score}", &definition.name),
                value_labels: definition
                    .bands
                    .iter()
                    .map(|band| ValueLabel {
                        code: band.code,
                        label: band.label.clone(),
                    })
                    .collect(),
                language: language.clone(),
            });
        }
    }

    entries
}

/// Variable metadata for the neutral output model; mirrors [`entries`].
pub fn variables(
    recipe: &Recipe,
    bundle: &LocaleBundle,
    language: &str,
    sidecar: Option<&SidecarMetadata>,
    include_items: bool,
) -> Vec<VariableMetadata> {
    entries(recipe, bundle, language, sidecar, include_items)
        .into_iter()
        .map(|entry| VariableMetadata {
            name: entry.name,
            label: entry.label,
            description: entry.description,
            value_labels: if entry.value_labels.is_empty() {
                None
            } else {
                Some(entry.value_labels)
            },
        })
        .collect()
}

/// Narrative methods text for the instrument, localized with fallback.
pub fn methods_text(recipe: &Recipe, bundle: &LocaleBundle, language: &str) -> String {
    let strings = bundle.strings(bundle.resolve_language(language));

    let score_list = recipe
        .scores
        .iter()
        .map(|definition| {
            format!(
                "{} ({})",
                definition.name,
                strings.method_name(definition.method.label())
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let template = if recipe.instrument.citation.trim().is_empty() {
        &strings.methods_without_citation
    } else {
        &strings.methods_with_citation
    };

    template
        .replace("{instrument}", &recipe.instrument.name)
        .replace("{task}", &recipe.instrument.task_name)
        .replace("{citation}", &recipe.instrument.citation)
        .replace("{scores}", &score_list)
}
