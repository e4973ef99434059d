use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell value or filter literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Reads a literal token: a quoted token is a string with the quotes
    /// stripped, otherwise an integer, then a float, then a bare string.
    ///
    /// Typographic quotes (`“…”`) count as quotes.
    pub fn parse_literal(token: &str) -> Self {
        let token = token.trim();
        if let Some(inner) = strip_quotes(token) {
            return Self::Text(inner.to_string());
        }
        if let Ok(i) = token.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(token.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    pub fn is_number(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

fn strip_quotes(token: &str) -> Option<&str> {
    let first = token.chars().next()?;
    let last = token.chars().next_back()?;
    if token.chars().count() < 2 {
        return None;
    }
    if matches!(first, '"' | '“') && matches!(last, '"' | '”') {
        Some(&token[first.len_utf8()..token.len() - last.len_utf8()])
    } else {
        None
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Integer identifying which row a destination document was built from.
pub type OrderKey = u32;

/// One spreadsheet record: column name to cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Scalar>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.values.get(column)
    }

    /// Cell rendered as text, `None` when the column is absent.
    pub fn text(&self, column: &str) -> Option<String> {
        self.values.get(column).map(Scalar::to_string)
    }

    /// Rewrites a cell in place. Only the pre-processing stage does this.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The row's order key, read from an integral, positive cell.
    pub fn order_key(&self, column: &str) -> Option<OrderKey> {
        match self.values.get(column)? {
            Scalar::Int(i) => OrderKey::try_from(*i).ok(),
            Scalar::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as OrderKey),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// A loaded spreadsheet: typed columns plus rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Sheet {
    /// Builds a sheet, inferring each column's type from its cells. A column
    /// is numeric when every non-empty cell is a number.
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Row>) -> Self {
        let columns = column_names
            .into_iter()
            .map(|name| {
                let mut cells = rows
                    .iter()
                    .filter_map(|r| r.get(&name))
                    .filter(|v| !v.is_empty())
                    .peekable();
                let ty = if cells.peek().is_some() && cells.all(Scalar::is_number) {
                    ColumnType::Number
                } else {
                    ColumnType::Text
                };
                Column { name, ty }
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.ty)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
