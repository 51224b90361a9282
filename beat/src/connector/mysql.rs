//! MySQL driver binding on sqlx
//!
//! Statements go over the text protocol so every cell arrives as text,
//! whatever its column type.

use super::{Database, QueryResult, Session, SessionError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row};

/// Production [`Database`] dialing a MySQL server
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    options: MySqlConnectOptions,
    target: String,
}

impl MySqlDatabase {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password);
        Self {
            options,
            target: format!("{host}:{port}"),
        }
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    fn describe(&self) -> String {
        self.target.clone()
    }

    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        let conn = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(classify)?;
        Ok(Box::new(MySqlSession { conn }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
}

#[async_trait]
impl Session for MySqlSession {
    async fn query(&mut self, sql: &str) -> Result<QueryResult, SessionError> {
        let rows = (&mut self.conn)
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(classify)?;
        Ok(to_query_result(&rows))
    }

    async fn ping(&mut self) -> Result<(), SessionError> {
        self.conn.ping().await.map_err(classify)
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.conn.close().await.map_err(classify)
    }
}

fn to_query_result(rows: &[MySqlRow]) -> QueryResult {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| {
                    // Text protocol: decode raw bytes without the type check
                    row.try_get_unchecked::<Option<Vec<u8>>, _>(i)
                        .ok()
                        .flatten()
                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                })
                .collect()
        })
        .collect();

    QueryResult { columns, rows }
}

/// Split driver errors into broken links and statement failures
fn classify(err: sqlx::Error) -> SessionError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => SessionError::Broken(err.to_string()),
        other => SessionError::Query(other.to_string()),
    }
}
