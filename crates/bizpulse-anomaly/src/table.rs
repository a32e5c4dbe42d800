//! Tabular input and the numeric matrix extracted from it.

use serde_json::{Map, Value};

use crate::error::AnomalyError;

/// A loosely typed table: named columns, rows of JSON cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build from rows of `(column, value)` objects. Columns are ordered by
    /// first appearance; missing cells are null.
    #[must_use]
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Build from a JSON array of objects. Non-object elements become empty rows.
    ///
    /// # Errors
    ///
    /// Returns [`AnomalyError::Validation`] if `value` is not an array.
    pub fn from_json(value: &Value) -> Result<Self, AnomalyError> {
        let items = value
            .as_array()
            .ok_or_else(|| AnomalyError::Validation("input must be a JSON array".to_string()))?;
        let records: Vec<Map<String, Value>> = items
            .iter()
            .map(|item| item.as_object().cloned().unwrap_or_default())
            .collect();
        Ok(Self::from_records(&records))
    }

    /// Build from explicit column names and numeric rows.
    #[must_use]
    pub fn from_numeric(columns: &[&str], rows: &[Vec<f64>]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| Value::from(*v)).collect())
                .collect(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Numeric view of the requested columns.
    ///
    /// Requested columns absent from the table are ignored. Rows with any
    /// null, non-numeric or non-finite cell in the kept columns are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AnomalyError::Validation`] if none of `requested` exists.
    pub fn numeric(&self, requested: &[String]) -> Result<Dataset, AnomalyError> {
        let positions: Vec<(String, usize)> = requested
            .iter()
            .filter_map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .map(|i| (name.clone(), i))
            })
            .fold(Vec::new(), |mut acc, (name, i)| {
                if !acc.iter().any(|(n, _)| *n == name) {
                    acc.push((name, i));
                }
                acc
            });

        if positions.is_empty() {
            return Err(AnomalyError::Validation(format!(
                "none of the requested columns exist: {}",
                requested.join(", ")
            )));
        }

        let mut index = Vec::new();
        let mut values = Vec::new();
        for (row_idx, row) in self.rows.iter().enumerate() {
            let parsed: Option<Vec<f64>> = positions
                .iter()
                .map(|(_, i)| row.get(*i).and_then(numeric_cell))
                .collect();
            if let Some(parsed) = parsed {
                index.push(row_idx);
                values.push(parsed);
            }
        }

        Ok(Dataset {
            columns: positions.into_iter().map(|(name, _)| name).collect(),
            index,
            values,
        })
    }
}

/// Coerce a JSON cell to a finite number.
#[must_use]
pub fn numeric_cell(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Clean numeric rows with their positions in the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    /// Source-table row index of each entry in `values`.
    pub index: Vec<usize>,
    /// Row-major values, one inner vector per row.
    pub values: Vec<Vec<f64>>,
}

impl Dataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values of column `col`, in row order.
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[col]).collect()
    }
}
