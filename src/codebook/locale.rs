//! Localized text resources for codebooks and methods narration.
//! Loaded once per run; unsupported languages fall back to the default.

use std::collections::BTreeMap;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Text resources for one language.
#[derive(Debug, Clone)]
pub struct LocaleStrings {
    /// Placeholders: `{instrument}`, `{task}`, `{citation}`, `{scores}`.
    pub methods_with_citation: String,
    pub methods_without_citation: String,
    pub category_label: String,
    pub category_description: String,
    method_names: BTreeMap<&'static str, String>,
}

impl LocaleStrings {
    pub fn method_name<'a>(&'a self, method_label: &'a str) -> &'a str {
        self.method_names
            .get(method_label)
            .map(String::as_str)
            .unwrap_or(method_label)
    }
}

/// Immutable per-run bundle of locale resources. The default language is
/// held separately so fallback can never fail.
#[derive(Debug, Clone)]
pub struct LocaleBundle {
    default_language: String,
    default_strings: LocaleStrings,
    locales: BTreeMap<String, LocaleStrings>,
}

impl LocaleBundle {
    pub fn builtin() -> Self {
        let english = LocaleStrings {
            methods_with_citation: "{instrument} ({task}) was scored following {citation}. \
                The following derivative scores were computed: {scores}."
                .to_string(),
            methods_without_citation: "{instrument} ({task}) was scored. The following \
                derivative scores were computed: {scores}."
                .to_string(),
            category_label: "{score} (category)".to_string(),
            category_description: "Categorical interpretation of {score}".to_string(),
            method_names: BTreeMap::from([
                ("sum", "sum".to_string()),
                ("mean", "mean".to_string()),
                ("composite", "weighted composite".to_string()),
                ("formula", "formula".to_string()),
            ]),
        };

        let mut locales = BTreeMap::new();
        locales.insert("en".to_string(), english.clone());
        locales.insert(
            "de".to_string(),
            LocaleStrings {
                methods_with_citation: "{instrument} ({task}) wurde gemäß {citation} \
                    ausgewertet. Folgende abgeleitete Werte wurden berechnet: {scores}."
                    .to_string(),
                methods_without_citation: "{instrument} ({task}) wurde ausgewertet. Folgende \
                    abgeleitete Werte wurden berechnet: {scores}."
                    .to_string(),
                category_label: "{score} (Kategorie)".to_string(),
                category_description: "Kategoriale Interpretation von {score}".to_string(),
                method_names: BTreeMap::from([
                    ("sum", "Summe".to_string()),
                    ("mean", "Mittelwert".to_string()),
                    ("composite", "gewichteter Kompositwert".to_string()),
                    ("formula", "Formel".to_string()),
                ]),
            },
        );

        Self {
            default_language: DEFAULT_LANGUAGE.to_string(),
            default_strings: english,
            locales,
        }
    }

    /// The language actually served for a requested code.
    pub fn resolve_language<'a>(&'a self, requested: &'a str) -> &'a str {
        if self.locales.contains_key(requested) {
            requested
        } else {
            &self.default_language
        }
    }

    pub fn strings(&self, requested: &str) -> &LocaleStrings {
        self.locales
            .get(requested)
            .unwrap_or(&self.default_strings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_languages_fall_back_to_default() {
        let bundle = LocaleBundle::builtin();
        assert_eq!(bundle.resolve_language("fr"), "en");
        assert_eq!(bundle.resolve_language("de"), "de");
    }

    #[test]
    fn method_names_are_localized() {
        let bundle = LocaleBundle::builtin();
        assert_eq!(bundle.strings("de").method_name("sum"), "Summe");
        assert_eq!(bundle.strings("en").method_name("sum"), "sum");
        // Unknown labels pass through untranslated.
        assert_eq!(bundle.strings("en").method_name("median"), "median");
    }
}
