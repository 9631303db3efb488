use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, SweeperError};

lazy_static! {
    static ref NUMBER_REGEX: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
    static ref MISSING_TOKENS: HashSet<&'static str> = [
        "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
        "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
    ]
    .into_iter()
    .collect();
}

/// Inferred type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// A column's values, tagged once at parse time. `None` marks a missing cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

/// Borrowed view of a single cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value<'a> {
    Missing,
    Number(f64),
    Text(&'a str),
}

impl Value<'_> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Whole numbers print without a fraction, everything else in Rust's
/// shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A raw cell as read from the source file, before the column type is known.
#[derive(Clone, Debug, PartialEq)]
pub enum RawCell {
    Missing,
    Number { value: f64, text: String },
    Text(String),
}

impl RawCell {
    /// Classify a text field: NA tokens are missing, decimal literals are
    /// numbers, anything else is text. Tokens match exactly, so a blank
    /// (whitespace-only) field is text.
    pub fn classify(field: &str) -> Self {
        if MISSING_TOKENS.contains(field) {
            return RawCell::Missing;
        }
        let trimmed = field.trim();
        if NUMBER_REGEX.is_match(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                if value.is_finite() {
                    return RawCell::Number {
                        value,
                        text: field.to_string(),
                    };
                }
            }
        }
        RawCell::Text(field.to_string())
    }
}

impl Column {
    /// Build a column from raw cells. Numeric when every present cell is a
    /// number (an all-missing column counts as numeric); text otherwise.
    /// An empty column is text.
    pub fn infer(cells: Vec<RawCell>) -> Self {
        if cells.is_empty() {
            return Column::Text(Vec::new());
        }
        let numeric = cells
            .iter()
            .all(|cell| !matches!(cell, RawCell::Text(_)));
        if numeric {
            Column::Numeric(
                cells
                    .into_iter()
                    .map(|cell| match cell {
                        RawCell::Number { value, .. } => Some(value),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            Column::Text(
                cells
                    .into_iter()
                    .map(|cell| match cell {
                        RawCell::Missing => None,
                        RawCell::Number { text, .. } => Some(text),
                        RawCell::Text(text) => Some(text),
                    })
                    .collect(),
            )
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Text(_) => ColumnKind::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind() == ColumnKind::Numeric
    }

    pub fn value(&self, row: usize) -> Value<'_> {
        match self {
            Column::Numeric(values) => match values.get(row) {
                Some(Some(n)) => Value::Number(*n),
                _ => Value::Missing,
            },
            Column::Text(values) => match values.get(row) {
                Some(Some(s)) => Value::Text(s),
                _ => Value::Missing,
            },
        }
    }

    pub fn missing_count(&self) -> usize {
        match self {
            Column::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            Column::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }

    /// Keep the rows whose flag is set, in order.
    pub(crate) fn retain_rows(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        match self {
            Column::Numeric(values) => values.retain(|_| *flags.next().unwrap_or(&true)),
            Column::Text(values) => values.retain(|_| *flags.next().unwrap_or(&true)),
        }
    }

    fn head(&self, n: usize) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(values.iter().take(n).cloned().collect()),
            Column::Text(values) => Column::Text(values.iter().take(n).cloned().collect()),
        }
    }
}

/// An ordered set of named, equal-length columns.
///
/// The row count is stored explicitly so a table keeps its rows even after
/// every column has been deselected.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table from named columns. All columns must have the same length.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let rows = columns.first().map_or(0, |(_, column)| column.len());
        Self::with_rows(rows, columns)
    }

    /// Build a table with an explicit row count, which every column must match.
    pub fn with_rows(rows: usize, columns: Vec<(String, Column)>) -> Result<Self> {
        let mut table = Table {
            names: Vec::with_capacity(columns.len()),
            columns: Vec::with_capacity(columns.len()),
            rows,
        };
        for (name, column) in columns {
            if column.len() != rows {
                return Err(SweeperError::parse(
                    &name,
                    format!("column has {} rows, expected {}", column.len(), rows),
                ));
            }
            table.names.push(name);
            table.columns.push(column);
        }
        Ok(table)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|index| &self.columns[index])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Iterate over `(name, column)` pairs in column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns.iter_mut()
    }

    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns()
            .filter(|(_, column)| column.is_numeric())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Values of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<Value<'_>> {
        self.columns.iter().map(|column| column.value(index)).collect()
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|column| column.head(n)).collect(),
            rows: self.rows.min(n),
        }
    }

    /// Keep the rows whose flag is set. `keep` has one flag per row.
    pub(crate) fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            column.retain_rows(keep);
        }
        self.rows = keep.iter().filter(|k| **k).count();
    }

    /// Replace the column set, keeping the row count.
    pub(crate) fn replace_columns(&mut self, columns: Vec<(String, Column)>) {
        let (names, columns): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        self.names = names;
        self.columns = columns;
    }

    pub(crate) fn take_columns(&mut self) -> Vec<(String, Column)> {
        let names = std::mem::take(&mut self.names);
        let columns = std::mem::take(&mut self.columns);
        names.into_iter().zip(columns).collect()
    }

    /// JSON-friendly head of the table.
    pub fn preview(&self, n: usize) -> TablePreview {
        let head = self.head(n);
        TablePreview {
            columns: head
                .columns()
                .map(|(name, column)| ColumnInfo {
                    name: name.to_string(),
                    kind: column.kind(),
                    missing: column.missing_count(),
                })
                .collect(),
            rows: (0..head.row_count())
                .map(|r| head.row(r).into_iter().map(value_to_json).collect())
                .collect(),
            total_rows: self.rows,
        }
    }
}

fn value_to_json(value: Value<'_>) -> serde_json::Value {
    match value {
        Value::Missing => serde_json::Value::Null,
        Value::Number(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.to_string()),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct TablePreview {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub total_rows: usize,
}

/// Plain-text grid, used by the CLI preview.
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = (0..self.rows)
            .map(|r| self.row(r).iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .names
            .iter()
            .enumerate()
            .map(|(c, name)| {
                cells
                    .iter()
                    .map(|row| row[c].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let index_width = self.rows.saturating_sub(1).to_string().len();
        write!(f, "{:index_width$}", "")?;
        for (name, width) in self.names.iter().zip(&widths) {
            write!(f, "  {:>width$}", name)?;
        }
        writeln!(f)?;
        for (r, row) in cells.iter().enumerate() {
            write!(f, "{:<index_width$}", r)?;
            for (cell, width) in row.iter().zip(&widths) {
                write!(f, "  {:>width$}", cell)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Make header names unique and non-blank: blanks become `Unnamed: <i>`,
/// repeats get `.1`, `.2`, ... suffixes.
pub fn normalize_headers<I, S>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::new();
    for (index, header) in headers.into_iter().enumerate() {
        let header = header.as_ref();
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            header.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}
