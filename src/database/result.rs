//! Row decoding and argument binding for SQLite statements.

use crate::error::{DatabaseError, DbResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::{Column as _, Row as _, TypeInfo, ValueRef};

/// A dynamically bound SQLite statement.
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Row data as column name to value, in statement column order.
pub type Row = IndexMap<String, CellValue>;

/// Cell value matching SQLite's storage classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

impl From<SqliteQueryResult> for UpdateOutcome {
    fn from(result: SqliteQueryResult) -> Self {
        Self {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        }
    }
}

/// Decode one row using the runtime storage class of each value.
pub fn decode_row(row: &SqliteRow) -> DbResult<Row> {
    let mut out = Row::with_capacity(row.len());

    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(query_failed)?;
        let value = if raw.is_null() {
            CellValue::Null
        } else {
            let type_info = raw.type_info();
            match type_info.name() {
                "INTEGER" => CellValue::Int(row.try_get(i).map_err(query_failed)?),
                "REAL" => CellValue::Float(row.try_get(i).map_err(query_failed)?),
                "BLOB" => CellValue::Blob(row.try_get(i).map_err(query_failed)?),
                _ => CellValue::Text(row.try_get(i).map_err(query_failed)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }

    Ok(out)
}

pub fn decode_rows(rows: &[SqliteRow]) -> DbResult<Vec<Row>> {
    rows.iter().map(decode_row).collect()
}

/// Bind one JSON value as a positional parameter.
pub fn bind_json<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}

pub fn bind_all<'q>(query: SqliteQuery<'q>, args: &[Value]) -> SqliteQuery<'q> {
    args.iter().fold(query, bind_json)
}

fn query_failed(err: sqlx::Error) -> DatabaseError {
    DatabaseError::QueryFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> sqlx::SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_decode_keeps_column_order_and_types() {
        let pool = memory_pool().await;
        let row = sqlx::query("SELECT 'x' AS zed, 7 AS alpha, 1.5 AS mid, NULL AS \"nothing\", x'0102' AS raw")
            .fetch_one(&pool)
            .await
            .unwrap();

        let decoded = decode_row(&row).unwrap();
        let keys: Vec<&str> = decoded.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zed", "alpha", "mid", "nothing", "raw"]);
        assert_eq!(decoded["zed"], CellValue::Text("x".into()));
        assert_eq!(decoded["alpha"], CellValue::Int(7));
        assert_eq!(decoded["mid"], CellValue::Float(1.5));
        assert!(decoded["nothing"].is_null());
        assert_eq!(decoded["raw"], CellValue::Blob(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_bind_json_values() {
        let pool = memory_pool().await;
        let args = vec![
            json!(null),
            json!(true),
            json!(42),
            json!(2.5),
            json!("text"),
            json!({"k": [1, 2]}),
        ];

        let query = bind_all(
            sqlx::query("SELECT ? AS a, ? AS b, ? AS c, ? AS d, ? AS e, ? AS f"),
            &args,
        );
        let row = query.fetch_one(&pool).await.unwrap();
        let decoded = decode_row(&row).unwrap();

        assert!(decoded["a"].is_null());
        assert_eq!(decoded["b"], CellValue::Int(1));
        assert_eq!(decoded["c"], CellValue::Int(42));
        assert_eq!(decoded["d"], CellValue::Float(2.5));
        assert_eq!(decoded["e"].as_str(), Some("text"));
        assert_eq!(decoded["f"].as_str(), Some(r#"{"k":[1,2]}"#));
    }

    #[test]
    fn test_cell_value_serializes_untagged() {
        let mut row = Row::new();
        row.insert("id".into(), 1i64.into());
        row.insert("name".into(), "alice".into());
        row.insert("score".into(), CellValue::Null);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"alice","score":null}"#);
    }
}
