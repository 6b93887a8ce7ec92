//! Format-neutral output model: variable metadata plus row data. This is
//! the whole contract with export adapters; the engine knows nothing of
//! their concrete formats.

use crate::table::{CellValue, ValueLabel};
use serde::Serialize;

/// Metadata for one output column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableMetadata {
    pub name: String,
    pub label: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_labels: Option<Vec<ValueLabel>>,
}

/// One scored output row. `cells` aligns with the table's variable list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub participant_id: String,
    pub session: String,
    pub cells: Vec<CellValue>,
}

/// The scored table handed to export adapters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTable {
    pub variables: Vec<VariableMetadata>,
    pub rows: Vec<ScoredRow>,
}

impl ScoredTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|variable| variable.name == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<CellValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.cells.get(index).copied()
    }
}

/// Error surfaced verbatim from an export adapter. The engine guarantees
/// no partial output was committed when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("export adapter failed: {0}")]
    Adapter(String),
}

/// Consumes the neutral model to produce one concrete artifact. Writes
/// must be all-or-nothing: stage the full artifact before committing.
pub trait ExportAdapter {
    fn export(&mut self, table: &ScoredTable) -> Result<(), ExportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_lookup_follows_variable_order() {
        let table = ScoredTable {
            variables: vec![
                VariableMetadata {
                    name: "total".to_string(),
                    label: "total".to_string(),
                    description: String::new(),
                    value_labels: None,
                },
                VariableMetadata {
                    name: "total_cat".to_string(),
                    label: "total (category)".to_string(),
                    description: String::new(),
                    value_labels: Some(vec![ValueLabel {
                        code: 1,
                        label: "minimal".to_string(),
                    }]),
                },
            ],
            rows: vec![ScoredRow {
                participant_id: "p01".to_string(),
                session: "ses-1".to_string(),
                cells: vec![CellValue::Number(3.0), CellValue::Number(1.0)],
            }],
        };

        assert_eq!(table.cell(0, "total"), Some(CellValue::Number(3.0)));
        assert_eq!(table.cell(0, "total_cat"), Some(CellValue::Number(1.0)));
        assert_eq!(table.cell(0, "absent"), None);
    }
}
