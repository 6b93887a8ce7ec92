//! Interpretation Mapper: numeric score to ordered categorical band.

use crate::recipe::{InterpretationBand, ScoreDefinition};

/// First band containing the value, bounds inclusive. A value outside
/// every band is simply unlabeled; the numeric result still stands.
pub(crate) fn band_for(definition: &ScoreDefinition, value: f64) -> Option<&InterpretationBand> {
    definition.bands.iter().find(|band| band.contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{RecipeLoader, SchemaRegistry};

    fn banded_score() -> ScoreDefinition {
        let document = r#"{
            "RecipeVersion": "1",
            "Kind": "survey",
            "Name": "Band Fixture",
            "Scores": [{
                "Name": "total",
                "Method": "sum",
                "Items": ["a"],
                "Missing": "ignore",
                "Interpretation": {
                    "0-4": "minimal",
                    "5-9": "mild",
                    "10-14": "moderate",
                    "15-19": "moderately severe",
                    "20-27": "severe"
                }
            }]
        }"#;
        let registry = SchemaRegistry::builtin();
        let recipe = RecipeLoader::new(&registry)
            .load_str(document)
            .expect("fixture recipe loads");
        recipe.scores[0].clone()
    }

    #[test]
    fn upper_bounds_are_inclusive_and_deterministic() {
        let score = banded_score();
        let band = band_for(&score, 4.0).expect("band found");
        assert_eq!(band.label, "minimal");
        let band = band_for(&score, 5.0).expect("band found");
        assert_eq!(band.label, "mild");
    }

    #[test]
    fn values_outside_all_bands_have_no_label() {
        let score = banded_score();
        assert!(band_for(&score, -1.0).is_none());
        assert!(band_for(&score, 30.0).is_none());
    }

    #[test]
    fn codes_follow_band_positions() {
        let score = banded_score();
        assert_eq!(band_for(&score, 17.0).expect("band found").code, 4);
        assert_eq!(band_for(&score, 21.0).expect("band found").code, 5);
    }
}
