//! TDS backend (Sybase ASE / SQL Server) using Tiberius.
//!
//! Tiberius is asynchronous; this adapter owns a current-thread Tokio
//! runtime and blocks on it, so the connection can sit behind the same
//! synchronous lock manager as every other backend. The servers are used
//! read-mostly, so only [`Connection`] is implemented and scopes run under
//! `OmpReadLock`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::debug;
use std::collections::VecDeque;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, Query};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::db::connection::{Connection, CursorState};
use crate::db::cursor::is_select;
use crate::db::dialect::Dialect;
use crate::db::value::{Column, Row, Value};

/// Errors raised by the TDS adapter.
#[derive(Debug, thiserror::Error)]
pub enum TdsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tds(#[from] tiberius::error::Error),

    #[error("no result set to fetch from")]
    NoResultSet,
}

/// Connection parameters for a TDS server.
#[derive(Debug, Clone)]
pub struct TdsSettings {
    pub server: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: String,
    pub password: String,
    pub trust_cert: bool,
}

impl TdsSettings {
    fn to_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.server);
        config.port(self.port);
        if let Some(database) = &self.database {
            config.database(database);
        }
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        if self.trust_cert {
            config.trust_cert();
        }
        config
    }
}

/// Cursor handle holding the buffered result of the last statement.
#[derive(Debug, Default)]
pub struct TdsCursor {
    columns: Option<Vec<Column>>,
    rows: VecDeque<Row>,
    row_count: Option<u64>,
    has_result: bool,
}

impl CursorState for TdsCursor {
    fn description(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }
}

/// A blocking connection to a TDS server.
pub struct TdsConnection {
    runtime: Runtime,
    client: Client<Compat<TcpStream>>,
    guard_statements: bool,
}

impl TdsConnection {
    pub fn connect(settings: &TdsSettings) -> Result<Self, TdsError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let config = settings.to_config();

        let client = runtime.block_on(async {
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            let client = Client::connect(config, tcp.compat_write()).await?;
            Ok::<_, TdsError>(client)
        })?;
        debug!("Connected to TDS server {}:{}", settings.server, settings.port);

        Ok(Self {
            runtime,
            client,
            guard_statements: true,
        })
    }

    pub fn with_statement_guard(mut self, enabled: bool) -> Self {
        self.guard_statements = enabled;
        self
    }
}

fn bind_all(query: &mut Query<'_>, params: &[Value]) {
    for param in params {
        match param {
            Value::Null => query.bind(Option::<&str>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::DateTime(dt) => query.bind(*dt),
        }
    }
}

/// Convert one column of a TDS row into a [`Value`].
fn column_value(data: &ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::U8(v) => v.map(Value::from),
        ColumnData::I16(v) => v.map(Value::from),
        ColumnData::I32(v) => v.map(Value::from),
        ColumnData::I64(v) => v.map(Value::from),
        ColumnData::F32(v) => v.map(Value::from),
        ColumnData::F64(v) => v.map(Value::from),
        ColumnData::Bit(v) => v.map(Value::from),
        ColumnData::String(v) => v.as_ref().map(|s| Value::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| Value::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| Value::Text(hex::encode(b))),
        ColumnData::Numeric(v) => v.map(|n| Value::Float(f64::from(n))),
        other => temporal_value(other),
    };
    value.unwrap_or(Value::Null)
}

fn temporal_value(data: &ColumnData<'static>) -> Option<Value> {
    if let Ok(Some(dt)) = NaiveDateTime::from_sql(data) {
        return Some(Value::DateTime(dt));
    }
    if let Ok(Some(date)) = NaiveDate::from_sql(data) {
        return Some(Value::DateTime(date.and_time(NaiveTime::MIN)));
    }
    if let Ok(Some(dt)) = DateTime::<Utc>::from_sql(data) {
        return Some(Value::DateTime(dt.naive_utc()));
    }
    if let Ok(Some(time)) = NaiveTime::from_sql(data) {
        return Some(Value::Text(time.to_string()));
    }
    None
}

impl Connection for TdsConnection {
    type Error = TdsError;
    type Cursor = TdsCursor;

    fn dialect(&self) -> Dialect {
        Dialect::Tds
    }

    fn guards_read_only(&self) -> bool {
        self.guard_statements
    }

    fn open_cursor(&mut self) -> Result<TdsCursor, TdsError> {
        Ok(TdsCursor::default())
    }

    fn execute(
        &mut self,
        cursor: &mut TdsCursor,
        statement: &str,
        params: &[Value],
    ) -> Result<(), TdsError> {
        let mut query = Query::new(statement.to_string());
        bind_all(&mut query, params);
        let client = &mut self.client;

        cursor.rows.clear();
        cursor.columns = None;

        if is_select(statement) {
            let (columns, rows) = self.runtime.block_on(async {
                let mut stream = query.query(client).await?;
                let columns: Option<Vec<Column>> = stream
                    .columns()
                    .await?
                    .map(|cols| cols.iter().map(|c| Column::new(c.name())).collect());
                let rows = stream.into_first_result().await?;
                Ok::<_, TdsError>((columns, rows))
            })?;

            cursor.rows = rows
                .into_iter()
                .map(|row| row.cells().map(|(_, data)| column_value(data)).collect())
                .collect();
            cursor.row_count = Some(cursor.rows.len() as u64);
            cursor.columns = columns;
            cursor.has_result = true;
        } else {
            let result = self
                .runtime
                .block_on(async { query.execute(client).await })?;
            cursor.row_count = Some(result.rows_affected().iter().sum());
            cursor.has_result = false;
        }
        Ok(())
    }

    fn fetch_one(&mut self, cursor: &mut TdsCursor) -> Result<Option<Row>, TdsError> {
        if !cursor.has_result {
            return Err(TdsError::NoResultSet);
        }
        Ok(cursor.rows.pop_front())
    }

    fn fetch_all(&mut self, cursor: &mut TdsCursor) -> Result<Vec<Row>, TdsError> {
        if !cursor.has_result {
            return Err(TdsError::NoResultSet);
        }
        Ok(cursor.rows.drain(..).collect())
    }

    fn close_cursor(&mut self, _cursor: TdsCursor) -> Result<(), TdsError> {
        Ok(())
    }

    fn close(self) -> Result<(), TdsError> {
        let TdsConnection {
            runtime, client, ..
        } = self;
        runtime.block_on(client.close())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_scalar_columns() {
        assert_eq!(column_value(&ColumnData::I32(Some(7))), Value::Int(7));
        assert_eq!(column_value(&ColumnData::I32(None)), Value::Null);
        assert_eq!(column_value(&ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            column_value(&ColumnData::String(Some(Cow::from("ACSIS")))),
            Value::from("ACSIS")
        );
        assert_eq!(column_value(&ColumnData::F64(Some(0.5))), Value::Float(0.5));
    }

    #[test]
    fn test_binary_column_is_hex() {
        let data = ColumnData::Binary(Some(Cow::from(vec![0xde_u8, 0xad])));
        assert_eq!(column_value(&data), Value::from("dead"));
    }

    #[test]
    fn test_settings_address() {
        let settings = TdsSettings {
            server: "sybase.example".into(),
            port: 5000,
            database: Some("jcmt".into()),
            user: "reader".into(),
            password: "secret".into(),
            trust_cert: true,
        };
        assert_eq!(settings.to_config().get_addr(), "sybase.example:5000");
    }
}
