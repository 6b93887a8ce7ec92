//! Input table model: participant rows, the explicit missing-value
//! sentinel, and the sidecar metadata supplied by the validation
//! collaborator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

/// A single cell: a present numeric measurement or the missing sentinel.
///
/// Missing is an explicit state distinct from zero; arithmetic over cells
/// must decide how to treat it rather than silently substituting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Number(f64),
    Missing,
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            CellValue::Missing => None,
        }
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(number) => CellValue::Number(number),
            None => CellValue::Missing,
        }
    }
}

/// One participant/session's measured item values. Read-only to the
/// engine; the Transform Stage works on a separate overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub participant_id: String,
    pub session: String,
    pub values: BTreeMap<String, CellValue>,
}

impl ParticipantRow {
    pub fn value(&self, item: &str) -> CellValue {
        self.values.get(item).copied().unwrap_or(CellValue::Missing)
    }
}

/// Validated input table keyed by (participant_id, session).
#[derive(Debug, Clone, PartialEq)]
pub struct InputTable {
    columns: Vec<String>,
    rows: Vec<ParticipantRow>,
}

/// Error raised while assembling an input table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("input is missing the required key column '{0}'")]
    MissingKeyColumn(&'static str),
    #[error("duplicate column '{0}' in input header")]
    DuplicateColumn(String),
    #[error("row {line}, column '{column}': '{value}' is not numeric")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },
}

const PARTICIPANT_COLUMN: &str = "participant_id";
const SESSION_COLUMN: &str = "session";

impl InputTable {
    /// Build a table directly from already-structured rows. The column
    /// set is the union of item names across rows.
    pub fn from_rows(rows: Vec<ParticipantRow>) -> Self {
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for row in &rows {
            for name in row.values.keys() {
                if seen.insert(name.clone()) {
                    columns.push(name.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Read a delimited table. The header must contain `participant_id`
    /// and `session`; every other column is a numeric item. Empty cells
    /// and `NA` are the missing sentinel.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|header| header.to_string())
            .collect();

        let mut seen = BTreeSet::new();
        for header in &headers {
            if !seen.insert(header.clone()) {
                return Err(TableError::DuplicateColumn(header.clone()));
            }
        }

        let participant_idx = headers
            .iter()
            .position(|name| name == PARTICIPANT_COLUMN)
            .ok_or(TableError::MissingKeyColumn(PARTICIPANT_COLUMN))?;
        let session_idx = headers
            .iter()
            .position(|name| name == SESSION_COLUMN)
            .ok_or(TableError::MissingKeyColumn(SESSION_COLUMN))?;

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != participant_idx && *idx != session_idx)
            .map(|(_, name)| name.clone())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            let mut values = BTreeMap::new();
            for (idx, header) in headers.iter().enumerate() {
                if idx == participant_idx || idx == session_idx {
                    continue;
                }
                let cell = record.get(idx).unwrap_or("");
                values.insert(header.clone(), parse_cell(cell, line + 2, header)?);
            }
            rows.push(ParticipantRow {
                participant_id: record.get(participant_idx).unwrap_or("").to_string(),
                session: record.get(session_idx).unwrap_or("").to_string(),
                values,
            });
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    pub fn rows(&self) -> &[ParticipantRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_cell(cell: &str, line: usize, column: &str) -> Result<CellValue, TableError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") {
        return Ok(CellValue::Missing);
    }
    cell.parse::<f64>()
        .map(CellValue::Number)
        .map_err(|_| TableError::InvalidNumber {
            line,
            column: column.to_string(),
            value: cell.to_string(),
        })
}

/// Ordered code-to-text association for a categorical vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueLabel {
    pub code: i64,
    pub label: String,
}

/// Sidecar metadata from the validation collaborator: value-label
/// vocabularies (`Levels`) per raw item column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarMetadata {
    #[serde(rename = "Levels", default)]
    pub levels: BTreeMap<String, Vec<ValueLabel>>,
}

impl SidecarMetadata {
    pub fn levels_for(&self, item: &str) -> Option<&[ValueLabel]> {
        self.levels.get(item).map(|labels| labels.as_slice())
    }
}
