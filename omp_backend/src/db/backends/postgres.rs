//! PostgreSQL backend using Diesel.
//!
//! Statements arrive as raw SQL with `$n` placeholders and are sent through
//! Diesel's boxed `sql_query`, binding each [`Value`] with its matching SQL
//! type. SELECT statements are wrapped so that every row comes back as a
//! single `json` document; with `serde_json`'s `preserve_order` feature the
//! column order of the original statement survives decoding.
//!
//! Transactions are driven explicitly through Diesel's
//! [`AnsiTransactionManager`], one transaction per read-write scope.

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::{Pg, PgConnection};
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Bool, Double, Json, Nullable, Text, Timestamp};
use diesel::{sql_query, Connection as _, QueryableByName, RunQueryDsl};
use log::debug;
use std::collections::VecDeque;

use crate::db::connection::{Connection, CursorState, Transactional};
use crate::db::cursor::is_select;
use crate::db::dialect::Dialect;
use crate::db::value::{Column, Row, Value};

/// Errors raised by the Postgres adapter.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error(transparent)]
    Connection(#[from] diesel::ConnectionError),

    #[error(transparent)]
    Query(#[from] diesel::result::Error),

    #[error("unexpected row encoding: {0}")]
    Decode(String),

    #[error("no result set to fetch from")]
    NoResultSet,
}

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Json)]
    row: serde_json::Value,
}

/// Cursor handle holding the buffered result of the last statement.
#[derive(Debug, Default)]
pub struct PostgresCursor {
    columns: Option<Vec<Column>>,
    rows: VecDeque<Row>,
    row_count: Option<u64>,
    has_result: bool,
}

impl PostgresCursor {
    fn load_rows(&mut self, rows: Vec<JsonRow>) -> Result<(), PostgresError> {
        self.rows.clear();
        self.columns = None;
        for JsonRow { row } in rows {
            let object = match row {
                serde_json::Value::Object(object) => object,
                other => return Err(PostgresError::Decode(other.to_string())),
            };
            if self.columns.is_none() {
                self.columns = Some(object.keys().map(Column::new).collect());
            }
            self.rows
                .push_back(object.into_iter().map(|(_, v)| json_to_value(v)).collect());
        }
        self.row_count = Some(self.rows.len() as u64);
        self.has_result = true;
        Ok(())
    }

    fn load_affected(&mut self, count: usize) {
        self.rows.clear();
        self.columns = None;
        self.row_count = Some(count as u64);
        self.has_result = false;
    }
}

impl CursorState for PostgresCursor {
    fn description(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }
}

/// A single Diesel connection to the OMP Postgres database.
///
/// SELECT rows are decoded from `row_to_json`, which keys each value by its
/// column name. Result columns must therefore have distinct names: in
/// `SELECT a.x, b.x` the second `x` replaces the first, so alias one of
/// them (`SELECT a.x, b.x AS b_x`).
pub struct PostgresConnection {
    conn: PgConnection,
    guard_statements: bool,
}

impl PostgresConnection {
    /// Connect using a `postgres://` URL.
    pub fn establish(database_url: &str) -> Result<Self, PostgresError> {
        let conn = PgConnection::establish(database_url)?;
        debug!("Connected to Postgres");
        Ok(Self {
            conn,
            guard_statements: true,
        })
    }

    pub fn with_statement_guard(mut self, enabled: bool) -> Self {
        self.guard_statements = enabled;
        self
    }
}

/// Rewrite a SELECT so each row is returned as one JSON object.
fn wrap_select(statement: &str) -> String {
    let inner = statement.trim().trim_end_matches(';');
    format!(
        "SELECT row_to_json(omp_row) AS row FROM ({}) AS omp_row",
        inner
    )
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::Text(s),
        other => Value::Text(other.to_string()),
    }
}

fn bind_all<'f>(
    mut query: BoxedSqlQuery<'f, Pg, SqlQuery>,
    params: &[Value],
) -> BoxedSqlQuery<'f, Pg, SqlQuery> {
    for param in params {
        query = match param {
            Value::Null => query.bind::<Nullable<Text>, _>(None::<String>),
            Value::Bool(b) => query.bind::<Bool, _>(*b),
            Value::Int(i) => query.bind::<BigInt, _>(*i),
            Value::Float(f) => query.bind::<Double, _>(*f),
            Value::Text(s) => query.bind::<Text, _>(s.clone()),
            Value::DateTime(dt) => query.bind::<Timestamp, _>(*dt),
        };
    }
    query
}

impl Connection for PostgresConnection {
    type Error = PostgresError;
    type Cursor = PostgresCursor;

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn guards_read_only(&self) -> bool {
        self.guard_statements
    }

    fn open_cursor(&mut self) -> Result<PostgresCursor, PostgresError> {
        Ok(PostgresCursor::default())
    }

    fn execute(
        &mut self,
        cursor: &mut PostgresCursor,
        statement: &str,
        params: &[Value],
    ) -> Result<(), PostgresError> {
        if is_select(statement) {
            let query = bind_all(sql_query(wrap_select(statement)).into_boxed(), params);
            let rows: Vec<JsonRow> = query.load(&mut self.conn)?;
            cursor.load_rows(rows)
        } else {
            let query = bind_all(sql_query(statement).into_boxed(), params);
            let affected = query.execute(&mut self.conn)?;
            cursor.load_affected(affected);
            Ok(())
        }
    }

    fn fetch_one(&mut self, cursor: &mut PostgresCursor) -> Result<Option<Row>, PostgresError> {
        if !cursor.has_result {
            return Err(PostgresError::NoResultSet);
        }
        Ok(cursor.rows.pop_front())
    }

    fn fetch_all(&mut self, cursor: &mut PostgresCursor) -> Result<Vec<Row>, PostgresError> {
        if !cursor.has_result {
            return Err(PostgresError::NoResultSet);
        }
        Ok(cursor.rows.drain(..).collect())
    }

    fn close_cursor(&mut self, _cursor: PostgresCursor) -> Result<(), PostgresError> {
        Ok(())
    }

    fn close(self) -> Result<(), PostgresError> {
        drop(self.conn);
        Ok(())
    }
}

impl Transactional for PostgresConnection {
    fn begin(&mut self) -> Result<(), PostgresError> {
        AnsiTransactionManager::begin_transaction(&mut self.conn)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PostgresError> {
        AnsiTransactionManager::commit_transaction(&mut self.conn)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PostgresError> {
        AnsiTransactionManager::rollback_transaction(&mut self.conn)?;
        Ok(())
    }
}
