use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{
    MySql, MySqlPool,
    mysql::MySqlArguments,
    query::{Query, QueryAs, QueryScalar},
};
use tracing::debug;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    U32(u32),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Json(Value),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::U32(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Binds one value onto a runtime query.
pub fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::String(v) => query.bind(v),
        SqlValue::U64(v) => query.bind(v),
        SqlValue::U32(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
        SqlValue::Null => query.bind(None::<String>),
    }
}

pub fn bind_value_as<'q, O>(
    query: QueryAs<'q, MySql, O, MySqlArguments>,
    value: SqlValue,
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    match value {
        SqlValue::String(v) => query.bind(v),
        SqlValue::U64(v) => query.bind(v),
        SqlValue::U32(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
        SqlValue::Null => query.bind(None::<String>),
    }
}

pub fn bind_value_scalar<'q, O>(
    query: QueryScalar<'q, MySql, O, MySqlArguments>,
    value: SqlValue,
) -> QueryScalar<'q, MySql, O, MySqlArguments> {
    match value {
        SqlValue::String(v) => query.bind(v),
        SqlValue::U64(v) => query.bind(v),
        SqlValue::U32(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
        SqlValue::Null => query.bind(None::<String>),
    }
}

/// ===============================
/// Partial UPDATE builder
/// ===============================
///
/// Column names are `&'static str` so only identifiers written in the source
/// can reach the SQL text; every value is bound.
#[derive(Debug)]
pub struct SqlUpdate {
    table: &'static str,
    assignments: Vec<(&'static str, SqlValue)>,
    guard: Option<&'static str>,
}

impl SqlUpdate {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            guard: None,
        }
    }

    /// Extra condition the row must still satisfy, e.g. `status = 'draft'`.
    /// A row that fails it is left untouched and counts as 0 rows affected.
    pub fn guard(mut self, condition: &'static str) -> Self {
        self.guard = Some(condition);
        self
    }

    /// Adds `column = ?` when the field was provided.
    pub fn set<V: Into<SqlValue>>(mut self, column: &'static str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.assignments.push((column, v.into()));
        }
        self
    }

    /// Same as `set` but distinguishes an explicit `null` (clear the column) from absence.
    pub fn set_nullable<V: Into<SqlValue>>(
        mut self,
        column: &'static str,
        value: Option<Option<V>>,
    ) -> Self {
        if let Some(v) = value {
            self.assignments.push((column, SqlValue::from(v)));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn sql(&self) -> String {
        let set_clause = self
            .assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");

        match self.guard {
            Some(guard) => format!(
                "UPDATE {} SET {} WHERE id = ? AND {}",
                self.table, set_clause, guard
            ),
            None => format!("UPDATE {} SET {} WHERE id = ?", self.table, set_clause),
        }
    }

    /// Executes the update and returns rows affected. Callers check `is_empty` first.
    pub async fn execute(self, pool: &MySqlPool, id: u64) -> Result<u64, sqlx::Error> {
        let sql = self.sql();
        debug!(sql = %sql, id, "Executing partial update");

        let mut query = sqlx::query(&sql);
        for (_, value) in self.assignments {
            query = bind_value(query, value);
        }

        let result = query.bind(id).execute(pool).await?;
        Ok(result.rows_affected())
    }
}

/// ===============================
/// Dynamic WHERE clause for list endpoints
/// ===============================
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `condition` with its bound values when `value` is present.
    pub fn eq<V: Into<SqlValue>>(&mut self, column: &'static str, value: Option<V>) {
        if let Some(v) = value {
            self.conditions.push(format!("{} = ?", column));
            self.values.push(v.into());
        }
    }

    /// Raw condition whose placeholders match `values` in order.
    pub fn push(&mut self, condition: &'static str, values: Vec<SqlValue>) {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
    }

    /// `LIKE %term%` over each column, OR-ed together.
    pub fn search(&mut self, columns: &[&'static str], term: Option<&str>) {
        let term = match term.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return,
        };
        let like = format!("%{}%", term);
        let clause = columns
            .iter()
            .map(|c| format!("{} LIKE ?", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({})", clause));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> Vec<SqlValue> {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_only_includes_provided_fields() {
        let update = SqlUpdate::new("branches")
            .set("name", Some("Riyadh HQ"))
            .set::<String>("city", None)
            .set("institution_id", Some(3u64));

        assert!(!update.is_empty());
        assert_eq!(
            update.sql(),
            "UPDATE branches SET name = ?, institution_id = ? WHERE id = ?"
        );
    }

    #[test]
    fn guard_is_appended_after_id() {
        let update = SqlUpdate::new("compensations")
            .set("amount", Some(120.5))
            .guard("payroll_run_id IS NULL");
        assert_eq!(
            update.sql(),
            "UPDATE compensations SET amount = ? WHERE id = ? AND payroll_run_id IS NULL"
        );
    }

    #[test]
    fn explicit_null_clears_column() {
        let update = SqlUpdate::new("employees").set_nullable::<u64>("branch_id", Some(None));
        assert_eq!(update.sql(), "UPDATE employees SET branch_id = ? WHERE id = ?");
        assert_eq!(update.assignments[0].1, SqlValue::Null);

        let untouched = SqlUpdate::new("employees").set_nullable::<u64>("branch_id", None);
        assert!(untouched.is_empty());
    }

    #[test]
    fn filters_build_where_clause_in_order() {
        let mut filters = Filters::new();
        filters.eq("institution_id", Some(7u64));
        filters.eq::<String>("status", None);
        filters.search(&["full_name", "employee_code"], Some(" ali "));

        assert_eq!(
            filters.where_clause(),
            "WHERE institution_id = ? AND (full_name LIKE ? OR employee_code LIKE ?)"
        );
        assert_eq!(
            filters.values(),
            vec![
                SqlValue::U64(7),
                SqlValue::String("%ali%".into()),
                SqlValue::String("%ali%".into()),
            ]
        );
    }

    #[test]
    fn empty_filters_produce_no_where() {
        let mut filters = Filters::new();
        filters.search(&["name"], Some("   "));
        assert_eq!(filters.where_clause(), "");
        assert!(filters.values().is_empty());
    }
}
