//! Transform Stage: item-level value transforms applied before any
//! aggregation. Pure over the raw row; raw values are never overwritten.

use crate::recipe::Recipe;
use crate::table::{CellValue, ParticipantRow};
use std::collections::BTreeMap;

/// Transformed item values for one row. Items not listed by any
/// transform are absent here and read from the raw row instead.
pub(crate) fn transformed_values(
    recipe: &Recipe,
    row: &ParticipantRow,
) -> BTreeMap<String, CellValue> {
    let mut transformed = BTreeMap::new();
    for transform in &recipe.transforms {
        for item in &transform.items {
            let value = match row.value(item) {
                CellValue::Number(raw) => CellValue::Number(transform.apply(raw)),
                CellValue::Missing => CellValue::Missing,
            };
            transformed.insert(item.clone(), value);
        }
    }
    transformed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{InvertTransform, ScaleBounds};
    use crate::recipe::{Recipe, RecipeKind};
    use std::collections::BTreeSet;

    fn fixture(transforms: Vec<InvertTransform>) -> Recipe {
        Recipe {
            version: "1".to_string(),
            kind: RecipeKind::Survey,
            instrument: crate::recipe::InstrumentInfo {
                name: "Fixture".to_string(),
                task_name: String::new(),
                description: String::new(),
                citation: String::new(),
            },
            transforms,
            scores: Vec::new(),
        }
    }

    fn row(values: &[(&str, CellValue)]) -> ParticipantRow {
        ParticipantRow {
            participant_id: "p01".to_string(),
            session: "ses-1".to_string(),
            values: values
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }
    }

    fn invert(min: f64, max: f64, items: &[&str]) -> InvertTransform {
        InvertTransform {
            scale: ScaleBounds { min, max },
            items: items.iter().map(|item| item.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn inverts_listed_items_on_their_scale() {
        let recipe = fixture(vec![invert(1.0, 5.0, &["item_2"])]);
        let raw = row(&[
            ("item_1", CellValue::Number(4.0)),
            ("item_2", CellValue::Number(2.0)),
        ]);
        let transformed = transformed_values(&recipe, &raw);

        assert_eq!(transformed.get("item_2"), Some(&CellValue::Number(4.0)));
        // Unlisted items pass through via the raw row.
        assert!(!transformed.contains_key("item_1"));
        assert_eq!(raw.value("item_2"), CellValue::Number(2.0));
    }

    #[test]
    fn missing_values_stay_missing() {
        let recipe = fixture(vec![invert(0.0, 3.0, &["item_1"])]);
        let raw = row(&[("item_1", CellValue::Missing)]);
        let transformed = transformed_values(&recipe, &raw);
        assert_eq!(transformed.get("item_1"), Some(&CellValue::Missing));
    }

    #[test]
    fn inversion_is_self_inverse_for_in_range_values() {
        let transform = invert(1.0, 7.0, &["item_1"]);
        for raw in [1.0, 2.0, 3.5, 6.0, 7.0] {
            assert_eq!(transform.apply(transform.apply(raw)), raw);
        }
    }
}
