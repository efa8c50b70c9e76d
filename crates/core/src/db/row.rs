//! Untyped row records.
//!
//! Rows mirror a database row as a column-name → value map. Entities built on
//! top of them read through the lenient accessors below, since SQLite column
//! affinity means an integer column may come back as text and vice versa.

use std::collections::BTreeMap;

use tokio_rusqlite::rusqlite::types::Value as SqlValue;

/// One row as returned by `SELECT *`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, SqlValue>,
}

impl Row {
    /// Raw value for a column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Text value; `None` for NULL, missing, or non-text columns.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, accepting integer, real (truncated) or numeric text.
    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthiness of a flag column. Missing and NULL are false.
    pub fn flag(&self, column: &str) -> bool {
        match self.get(column) {
            Some(SqlValue::Integer(i)) => *i != 0,
            Some(SqlValue::Real(f)) => *f != 0.0,
            Some(SqlValue::Text(s)) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
            _ => false,
        }
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, SqlValue)>>(iter: T) -> Self {
        Self { columns: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        [
            ("id".to_string(), SqlValue::Integer(7)),
            ("name".to_string(), SqlValue::Text("general".into())),
            ("count".to_string(), SqlValue::Text(" 42 ".into())),
            ("flagText".to_string(), SqlValue::Text("true".into())),
            ("nothing".to_string(), SqlValue::Null),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_integer_accessor_is_lenient() {
        let row = row();
        assert_eq!(row.integer("id"), Some(7));
        assert_eq!(row.integer("count"), Some(42));
        assert_eq!(row.integer("name"), None);
        assert_eq!(row.integer("nothing"), None);
    }

    #[test]
    fn test_text_accessor() {
        let row = row();
        assert_eq!(row.text("name"), Some("general"));
        assert_eq!(row.text("id"), None);
        assert_eq!(row.text("missing"), None);
    }

    #[test]
    fn test_flag_accessor() {
        let row = row();
        assert!(row.flag("id"));
        assert!(row.flag("flagText"));
        assert!(!row.flag("nothing"));
        assert!(!row.flag("missing"));
    }
}
