//! Organization-local tabular datasets.
//!
//! A [`LocalDataset`] never leaves the organization that owns it. This
//! module provides typed columns, explicit schema inspection and a CSV
//! loader that infers column kinds once, at load time.

use crate::error::DatasetError;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Cell values treated as missing when loading CSV files.
const MISSING_MARKERS: &[&str] = &["", "na", "nan", "null", "none"];

/// Kind of a column, decided once when the dataset is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Text => write!(f, "text"),
        }
    }
}

/// Name and kind of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

/// Values of a column; `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    /// Non-missing numeric values, or `None` for a text column.
    pub fn numeric_values(&self) -> Option<impl Iterator<Item = f64> + '_> {
        match &self.data {
            ColumnData::Numeric(values) => Some(values.iter().filter_map(|v| *v)),
            ColumnData::Text(_) => None,
        }
    }
}

/// Row-level data held by a single organization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalDataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl LocalDataset {
    /// Create an empty dataset with `row_count` rows and no columns.
    pub fn with_rows(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            row_count,
        }
    }

    /// Add a column. Its length must match the dataset's row count.
    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> Result<(), DatasetError> {
        let name = name.into();

        if self.columns.iter().any(|c| c.name == name) {
            return Err(DatasetError::DuplicateColumn(name));
        }
        if data.len() != self.row_count {
            return Err(DatasetError::RaggedColumn {
                column: name,
                got: data.len(),
                expected: self.row_count,
            });
        }

        self.columns.push(Column { name, data });
        Ok(())
    }

    /// Builder form of [`LocalDataset::push_column`] for numeric columns.
    #[allow(dead_code)] // Builder for in-memory datasets
    pub fn with_numeric(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, DatasetError> {
        self.push_column(name, ColumnData::Numeric(values))?;
        Ok(self)
    }

    /// Builder form of [`LocalDataset::push_column`] for text columns.
    #[allow(dead_code)] // Builder for in-memory datasets
    pub fn with_text(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<Self, DatasetError> {
        self.push_column(name, ColumnData::Text(values))?;
        Ok(self)
    }

    /// Load a headered CSV file.
    pub fn from_csv_path(path: &Path) -> Result<Self, DatasetError> {
        debug!("Loading dataset from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Load headered CSV from any reader.
    ///
    /// A column is numeric when every non-missing cell parses as a float;
    /// anything else makes it text. Parsed non-finite values are missing.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        if headers.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (idx, cell) in record.iter().enumerate() {
                let value = if is_missing(cell) {
                    None
                } else {
                    Some(cell.to_string())
                };
                cells[idx].push(value);
            }
        }

        let row_count = cells.first().map(Vec::len).unwrap_or(0);
        let mut dataset = Self::with_rows(row_count);

        for (name, raw) in headers.into_iter().zip(cells) {
            dataset.push_column(name, infer_column(raw))?;
        }

        debug!(
            "Loaded dataset with {} rows and {} columns",
            dataset.row_count,
            dataset.columns.len()
        );
        Ok(dataset)
    }

    /// Total number of records, independent of any column selection.
    pub fn record_count(&self) -> u64 {
        self.row_count as u64
    }

    /// Column names and kinds in header order.
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema {
                name: c.name.clone(),
                kind: c.data.kind(),
            })
            .collect()
    }

    /// Names of all numeric columns, in header order.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.schema()
            .into_iter()
            .filter(|c| c.kind == ColumnKind::Numeric)
            .map(|c| c.name)
            .collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.to_ascii_lowercase().as_str())
}

fn infer_column(raw: Vec<Option<String>>) -> ColumnData {
    let parsed: Option<Vec<Option<f64>>> = raw
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(text) => text
                .parse::<f64>()
                .ok()
                .map(|v| v.is_finite().then_some(v)),
        })
        .collect();

    match parsed {
        Some(values) => ColumnData::Numeric(values),
        None => ColumnData::Text(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
id,age,group,weight
1,34,a,70.5
2,NA,b,
3,51,a,82.1
4,28,b,NaN
";

    #[test]
    fn test_csv_schema_inference() {
        let dataset = LocalDataset::from_csv_reader(CSV.as_bytes()).unwrap();

        assert_eq!(dataset.record_count(), 4);
        assert_eq!(dataset.numeric_columns(), vec!["id", "age", "weight"]);

        let schema = dataset.schema();
        assert_eq!(schema[2].name, "group");
        assert_eq!(schema[2].kind, ColumnKind::Text);
    }

    #[test]
    fn test_missing_cells_are_skipped() {
        let dataset = LocalDataset::from_csv_reader(CSV.as_bytes()).unwrap();

        let age: Vec<f64> = dataset.column("age").unwrap().numeric_values().unwrap().collect();
        assert_eq!(age, vec![34.0, 51.0, 28.0]);

        let weight: Vec<f64> = dataset
            .column("weight")
            .unwrap()
            .numeric_values()
            .unwrap()
            .collect();
        assert_eq!(weight, vec![70.5, 82.1]);
    }

    #[test]
    fn test_text_column_has_no_numeric_values() {
        let dataset = LocalDataset::from_csv_reader(CSV.as_bytes()).unwrap();
        assert!(dataset.column("group").unwrap().numeric_values().is_none());
        assert!(dataset.column("height").is_none());
    }

    #[test]
    fn test_infinite_cells_are_missing() {
        let csv = "age,label\n30,a\n40,inf\ninf,b\n-Infinity,c\n50,d\n";
        let dataset = LocalDataset::from_csv_reader(csv.as_bytes()).unwrap();

        assert_eq!(dataset.numeric_columns(), vec!["age"]);
        let age: Vec<f64> = dataset.column("age").unwrap().numeric_values().unwrap().collect();
        assert_eq!(age, vec![30.0, 40.0, 50.0]);
        assert_eq!(dataset.record_count(), 5);
    }

    #[test]
    fn test_header_only_csv() {
        let dataset = LocalDataset::from_csv_reader("age,bmi\n".as_bytes()).unwrap();
        assert_eq!(dataset.record_count(), 0);
        assert_eq!(dataset.numeric_columns(), vec!["age", "bmi"]);
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let result = LocalDataset::from_csv_reader("a,b\n1,2\n3\n".as_bytes());
        assert!(matches!(result, Err(DatasetError::Csv(_))));
    }

    #[test]
    fn test_builder_rejects_bad_columns() {
        let dataset = LocalDataset::with_rows(2)
            .with_numeric("x", vec![Some(1.0), Some(2.0)])
            .unwrap();

        assert!(matches!(
            dataset.clone().with_numeric("x", vec![None, None]),
            Err(DatasetError::DuplicateColumn(_))
        ));
        assert!(matches!(
            dataset.with_text("y", vec![None]),
            Err(DatasetError::RaggedColumn { .. })
        ));
    }

    #[test]
    fn test_from_csv_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let dataset = LocalDataset::from_csv_path(file.path()).unwrap();
        assert_eq!(dataset.record_count(), 4);
    }
}
