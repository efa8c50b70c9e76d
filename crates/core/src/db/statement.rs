//! Fluent SQL statement builder.
//!
//! Every clause method appends a fragment to the text buffer and pushes its
//! bind values onto the parameter list in the same call, so the n-th `?` in
//! the text always binds the n-th parameter. Clause methods must therefore be
//! called in the order their fragments appear in the final SQL.
//!
//! A builder is a scratchpad for one statement at a time. Call [`clear`] before
//! reusing it, and never share one across concurrent build sequences.
//!
//! [`clear`]: StatementBuilder::clear

use tokio_rusqlite::rusqlite::types::Value as SqlValue;

use crate::Error;
use crate::Target;
use crate::config::{Backend, DatabaseConfig};

/// A built SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Whether the statement returns rows rather than an affected-row count.
    pub fn is_read(&self) -> bool {
        self.text
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"))
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.text, self.params)
    }
}

/// Join flavour for [`StatementBuilder::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

/// Sort direction for [`StatementBuilder::order_by`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Mutable, chainable SQL builder.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    backend: Backend,
    prefix: String,
    text: String,
    params: Vec<SqlValue>,
}

impl StatementBuilder {
    /// Create a builder for the configured backing store.
    ///
    /// The table prefix is resolved once here.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the provider is not supported.
    pub fn new(config: &DatabaseConfig) -> Result<Self, Error> {
        let backend = config.backend()?;
        let prefix = config.table_prefix()?.to_string();
        Ok(Self::with_backend(backend, prefix))
    }

    pub(crate) fn with_backend(backend: Backend, prefix: impl Into<String>) -> Self {
        Self { backend, prefix: prefix.into(), text: String::new(), params: Vec::new() }
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.text.push(' ');
    }

    fn table(&self, target: Target) -> String {
        format!("{}{}", self.prefix, target.table())
    }

    /// `SELECT columns`; an empty slice selects `*`.
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        let columns = if columns.is_empty() { "*".to_string() } else { columns.join(", ") };
        self.push(&format!("SELECT {columns}"));
        self
    }

    /// Turn the first `SELECT` into `SELECT DISTINCT`.
    pub fn distinct(&mut self) -> &mut Self {
        self.text = self.text.replacen("SELECT", "SELECT DISTINCT", 1);
        self
    }

    pub fn from(&mut self, target: Target) -> &mut Self {
        let table = self.table(target);
        self.push(&format!("FROM {table}"));
        self
    }

    pub fn join(&mut self, kind: JoinKind, target: Target, on: &str) -> &mut Self {
        let table = self.table(target);
        self.push(&format!("{} JOIN {table} ON {on}", kind.keyword()));
        self
    }

    /// `WHERE condition`, binding `values` in order.
    ///
    /// Intended once per statement; chain further predicates with
    /// [`and_where`](Self::and_where) and [`or_where`](Self::or_where).
    pub fn where_clause<I, V>(&mut self, condition: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push(&format!("WHERE {condition}"));
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn and_where(&mut self, condition: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.push(&format!("AND {condition}"));
        self.params.push(value.into());
        self
    }

    pub fn or_where(&mut self, condition: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.push(&format!("OR {condition}"));
        self.params.push(value.into());
        self
    }

    /// A bare `WHERE`, for predicates built by [`in_values`](Self::in_values)
    /// or [`between`](Self::between).
    pub fn only_where(&mut self) -> &mut Self {
        self.push("WHERE");
        self
    }

    /// `column IN (?, ...)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if `values` is empty.
    pub fn in_values<I, V>(&mut self, column: &str, values: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(Error::Validation(format!("IN list for {column} must not be empty")));
        }

        let placeholders = vec!["?"; values.len()].join(", ");
        self.push(&format!("{column} IN ({placeholders})"));
        self.params.extend(values);
        Ok(self)
    }

    /// `column BETWEEN ? AND ?`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` unless exactly two values are given.
    pub fn between<I, V>(&mut self, column: &str, values: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if values.len() != 2 {
            return Err(Error::Validation(format!(
                "BETWEEN on {column} needs exactly two values, got {}",
                values.len()
            )));
        }

        self.push(&format!("{column} BETWEEN ? AND ?"));
        self.params.extend(values);
        Ok(self)
    }

    pub fn group_by(&mut self, columns: &[&str]) -> &mut Self {
        self.push(&format!("GROUP BY {}", columns.join(", ")));
        self
    }

    pub fn having(&mut self, condition: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.push(&format!("HAVING {condition}"));
        self.params.push(value.into());
        self
    }

    pub fn order_by(&mut self, columns: &[&str], direction: Direction) -> &mut Self {
        self.push(&format!("ORDER BY {} {}", columns.join(", "), direction.keyword()));
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.push("LIMIT ?");
        self.params.push(limit.into());
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.push("OFFSET ?");
        self.params.push(offset.into());
        self
    }

    /// `INSERT INTO target (columns) VALUES (?, ...)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if `values` is empty or its length differs
    /// from `columns`.
    pub fn insert_into<I, V>(&mut self, target: Target, columns: &[&str], values: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(Error::Validation(format!("INSERT INTO {target} needs at least one value")));
        }
        if values.len() != columns.len() {
            return Err(Error::Validation(format!(
                "INSERT INTO {target} has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }

        let table = self.table(target);
        let placeholders = vec!["?"; values.len()].join(", ");
        self.push(&format!("INSERT INTO {table} ({}) VALUES ({placeholders})", columns.join(", ")));
        self.params.extend(values);
        Ok(self)
    }

    /// `UPDATE target SET`; follow with [`set`](Self::set).
    pub fn update(&mut self, target: Target) -> &mut Self {
        let table = self.table(target);
        self.push(&format!("UPDATE {table} SET"));
        self
    }

    /// `column = ?, ...` binding `values` in column order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the lists are empty or differ in length.
    pub fn set<I, V>(&mut self, columns: &[&str], values: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if columns.len() != values.len() {
            return Err(Error::Validation(format!(
                "SET has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        if columns.is_empty() {
            return Err(Error::Validation("SET needs at least one column".into()));
        }

        let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
        self.push(&assignments.join(", "));
        self.params.extend(values);
        Ok(self)
    }

    pub fn delete_from(&mut self, target: Target) -> &mut Self {
        let table = self.table(target);
        self.push(&format!("DELETE FROM {table}"));
        self
    }

    /// Upsert tail for a preceding [`insert_into`](Self::insert_into).
    ///
    /// MySQL gets `ON DUPLICATE KEY UPDATE c = VALUES(c)`, SQLite gets
    /// `ON CONFLICT DO UPDATE SET c = excluded.c`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if `columns` is empty.
    pub fn on_duplicate_key_update(&mut self, columns: &[&str]) -> Result<&mut Self, Error> {
        if columns.is_empty() {
            return Err(Error::Validation("duplicate-key update needs at least one column".into()));
        }

        let fragment = match self.backend {
            Backend::Mysql => {
                let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = VALUES({c})")).collect();
                format!("ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
            }
            Backend::Sqlite => {
                let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = excluded.{c}")).collect();
                format!("ON CONFLICT DO UPDATE SET {}", assignments.join(", "))
            }
        };
        self.push(&fragment);
        Ok(self)
    }

    /// Snapshot the accumulated statement. The builder is left untouched.
    pub fn build(&self) -> Statement {
        debug_assert_eq!(
            self.text.matches('?').count(),
            self.params.len(),
            "placeholders and parameters out of step"
        );
        Statement { text: self.text.trim().to_string(), params: self.params.clone() }
    }

    /// Reset both buffers for an unrelated statement.
    pub fn clear(&mut self) -> &mut Self {
        self.text.clear();
        self.params.clear();
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> StatementBuilder {
        StatementBuilder::with_backend(Backend::Sqlite, "")
    }

    #[test]
    fn test_new_rejects_unsupported_backend() {
        let config = DatabaseConfig { provider: "postgres".into(), ..Default::default() };
        assert!(matches!(StatementBuilder::new(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_prefix_applied_to_tables() {
        let config = DatabaseConfig { sqlite_table_prefix: "ev_".into(), ..Default::default() };
        let stmt = StatementBuilder::new(&config)
            .unwrap()
            .select(&[])
            .from(Target::Forums)
            .join(JoinKind::Left, Target::Categories, "ev_forums.categoryId = ev_categories.id")
            .build();
        assert_eq!(
            stmt.text(),
            "SELECT * FROM ev_forums LEFT JOIN ev_categories ON ev_forums.categoryId = ev_categories.id"
        );
    }

    #[test]
    fn test_select_where_order_limit() {
        let stmt = builder()
            .select(&["id", "title"])
            .from(Target::Topics)
            .where_clause("forumId = ?", [3_i64])
            .and_where("locked = ?", 0_i64)
            .or_where("pinned = ?", 1_i64)
            .order_by(&["lastPost"], Direction::Desc)
            .limit(10)
            .offset(20)
            .build();

        assert_eq!(
            stmt.text(),
            "SELECT id, title FROM topics WHERE forumId = ? AND locked = ? OR pinned = ? \
             ORDER BY lastPost DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            stmt.params(),
            &[
                SqlValue::Integer(3),
                SqlValue::Integer(0),
                SqlValue::Integer(1),
                SqlValue::Integer(10),
                SqlValue::Integer(20)
            ]
        );
        assert!(stmt.is_read());
    }

    #[test]
    fn test_distinct_rewrites_first_select() {
        let stmt = builder().select(&["memberId"]).distinct().from(Target::Sessions).build();
        assert_eq!(stmt.text(), "SELECT DISTINCT memberId FROM sessions");
    }

    #[test]
    fn test_in_rejects_empty_list() {
        let mut b = builder();
        let result = b.select(&[]).from(Target::Posts).only_where().in_values("id", Vec::<i64>::new());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_in_binds_every_value() {
        let mut b = builder();
        b.delete_from(Target::Sessions)
            .only_where()
            .in_values("id", ["a".to_string(), "b".to_string()])
            .unwrap();
        let stmt = b.build();
        assert_eq!(stmt.text(), "DELETE FROM sessions WHERE id IN (?, ?)");
        assert_eq!(stmt.params(), &[SqlValue::Text("a".into()), SqlValue::Text("b".into())]);
        assert!(!stmt.is_read());
    }

    #[test]
    fn test_between_requires_two_values() {
        assert!(matches!(builder().between("created", [1_i64]), Err(Error::Validation(_))));
        assert!(matches!(builder().between("created", [1_i64, 2, 3]), Err(Error::Validation(_))));

        let mut b = builder();
        b.select(&[]).from(Target::Posts).only_where().between("created", [5_i64, 9]).unwrap();
        let stmt = b.build();
        assert_eq!(stmt.text(), "SELECT * FROM posts WHERE created BETWEEN ? AND ?");
        assert_eq!(stmt.params(), &[SqlValue::Integer(5), SqlValue::Integer(9)]);
    }

    #[test]
    fn test_set_length_mismatch() {
        let mut b = builder();
        let result = b.update(Target::Members).set(&["x", "y"], [1_i64]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_set_binds_in_column_order() {
        let mut b = builder();
        b.update(Target::Members)
            .set(&["x", "y"], [1_i64, 2])
            .unwrap()
            .where_clause("id = ?", [9_i64]);
        let stmt = b.build();
        assert_eq!(stmt.text(), "UPDATE members SET x = ?, y = ? WHERE id = ?");
        assert_eq!(stmt.params(), &[SqlValue::Integer(1), SqlValue::Integer(2), SqlValue::Integer(9)]);
    }

    #[test]
    fn test_insert_rejects_empty_values() {
        let mut b = builder();
        let result = b.insert_into(Target::Registry, &[], Vec::<SqlValue>::new());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_insert_appends_parameters() {
        let mut b = builder();
        b.insert_into(Target::Registry, &["name", "value"], ["theme".to_string(), "dark".to_string()])
            .unwrap();
        let stmt = b.build();
        assert_eq!(stmt.text(), "INSERT INTO registry (name, value) VALUES (?, ?)");
        assert_eq!(stmt.params().len(), 2);
    }

    #[test]
    fn test_on_duplicate_key_per_backend() {
        let mut sqlite = builder();
        sqlite
            .insert_into(Target::Registry, &["name", "value"], ["k".to_string(), "v".to_string()])
            .unwrap()
            .on_duplicate_key_update(&["value"])
            .unwrap();
        assert!(sqlite.build().text().ends_with("ON CONFLICT DO UPDATE SET value = excluded.value"));

        let mut mysql = StatementBuilder::with_backend(Backend::Mysql, "");
        mysql.on_duplicate_key_update(&["value", "type"]).unwrap();
        assert_eq!(mysql.build().text(), "ON DUPLICATE KEY UPDATE value = VALUES(value), type = VALUES(type)");

        assert!(matches!(builder().on_duplicate_key_update(&[]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_group_by_having() {
        let stmt = builder()
            .select(&["forumId", "COUNT(*)"])
            .from(Target::Topics)
            .group_by(&["forumId"])
            .having("COUNT(*) > ?", 5_i64)
            .build();
        assert_eq!(stmt.text(), "SELECT forumId, COUNT(*) FROM topics GROUP BY forumId HAVING COUNT(*) > ?");
        assert_eq!(stmt.params(), &[SqlValue::Integer(5)]);
    }

    #[test]
    fn test_build_does_not_mutate_and_clear_resets() {
        let mut b = builder();
        b.select(&[]).from(Target::Themes).where_clause("id = ?", [1_i64]);
        let first = b.build();
        let second = b.build();
        assert_eq!(first, second);

        b.clear();
        assert!(b.text().is_empty());
        assert!(b.params().is_empty());

        let stmt = b.select(&[]).from(Target::Locales).build();
        assert_eq!(stmt.text(), "SELECT * FROM locales");
        assert!(stmt.params().is_empty());
    }
}
