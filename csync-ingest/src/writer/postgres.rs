//! PostgreSQL / Citus procedure store
//!
//! Holds one connection for the lifetime of a run. Call SQL for every
//! catalog procedure is prepared once at connect time; at call time the only
//! inputs are the procedure name and the text parameters.

use super::ProcedureStore;
use crate::catalog::Catalog;
use crate::error::{SetupError, WriteError};
use async_trait::async_trait;
use csync_common::config::TargetConfig;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prepared call for one procedure
#[derive(Debug, Clone)]
struct PreparedCall {
    sql: String,
    arity: usize,
}

/// Procedure store backed by a single PostgreSQL connection
pub struct PgProcedureStore {
    conn: PgConnection,
    options: PgConnectOptions,
    connect_timeout: Duration,
    display_url: String,
    calls: HashMap<&'static str, PreparedCall>,
}

impl PgProcedureStore {
    /// Connect and verify every catalog procedure exists in the target
    pub async fn connect(target: &TargetConfig, catalog: &Catalog) -> Result<Self, SetupError> {
        let display_url = target.display_url();
        let options: PgConnectOptions =
            target
                .database_url
                .parse()
                .map_err(|e: sqlx::Error| SetupError::TargetUnreachable {
                    url: display_url.clone(),
                    message: e.to_string(),
                })?;
        let connect_timeout = Duration::from_secs(target.connect_timeout_secs);

        let conn = open(&options, connect_timeout).await.map_err(|message| {
            SetupError::TargetUnreachable {
                url: display_url.clone(),
                message,
            }
        })?;
        info!("Successfully connected to the target database: {}", display_url);

        let calls = catalog
            .entities()
            .iter()
            .map(|spec| {
                (
                    spec.procedure,
                    PreparedCall {
                        sql: spec.call_sql(),
                        arity: spec.params.len(),
                    },
                )
            })
            .collect();

        let mut store = Self {
            conn,
            options,
            connect_timeout,
            display_url,
            calls,
        };
        store.verify_procedures(catalog).await?;
        Ok(store)
    }

    /// Check each procedure exists with the declared number of arguments
    async fn verify_procedures(&mut self, catalog: &Catalog) -> Result<(), SetupError> {
        for spec in catalog.entities() {
            // Catalog validation guarantees a schema-qualified name
            let Some((schema, name)) = spec.procedure_parts() else {
                return Err(SetupError::Catalog(format!(
                    "procedure '{}' is not schema-qualified",
                    spec.procedure
                )));
            };
            let arity = spec.params.len();

            let found: i64 = sqlx::query_scalar(
                r#"
                SELECT count(*)
                FROM pg_catalog.pg_proc p
                JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
                WHERE n.nspname = $1 AND p.proname = $2 AND p.pronargs = $3
                "#,
            )
            .bind(schema)
            .bind(name)
            .bind(arity as i16)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| SetupError::TargetUnreachable {
                url: self.display_url.clone(),
                message: format!("procedure lookup failed: {}", e),
            })?;

            if found == 0 {
                return Err(SetupError::MissingProcedure {
                    procedure: spec.procedure.to_string(),
                    arity,
                });
            }
            debug!(procedure = spec.procedure, arity, "Procedure present in target");
        }
        Ok(())
    }

    /// Replace a dead connection; called only after a failed call
    async fn recover_connection(&mut self) {
        if self.conn.ping().await.is_ok() {
            return;
        }
        warn!("Target connection lost, reconnecting to {}", self.display_url);
        match open(&self.options, self.connect_timeout).await {
            Ok(conn) => {
                self.conn = conn;
                info!("Reconnected to the target database");
            }
            Err(message) => warn!("Reconnect failed: {}", message),
        }
    }
}

#[async_trait]
impl ProcedureStore for PgProcedureStore {
    async fn call(&mut self, procedure: &str, params: &[Option<String>]) -> Result<(), WriteError> {
        let prepared = self
            .calls
            .get(procedure)
            .ok_or_else(|| WriteError::UnknownProcedure(procedure.to_string()))?;
        if prepared.arity != params.len() {
            return Err(WriteError::Arity {
                procedure: procedure.to_string(),
                expected: prepared.arity,
                actual: params.len(),
            });
        }

        let result = call_in_transaction(&mut self.conn, procedure, &prepared.sql, params).await;
        if result.is_err() {
            self.recover_connection().await;
        }
        result
    }

    async fn close(self) {
        match self.conn.close().await {
            Ok(()) => info!("Database connection closed."),
            Err(e) => warn!("Error closing database connection: {}", e),
        }
    }
}

/// One call, one transaction: commit on success, roll back on any failure
async fn call_in_transaction(
    conn: &mut PgConnection,
    procedure: &str,
    sql: &str,
    params: &[Option<String>],
) -> Result<(), WriteError> {
    let mut tx = conn.begin().await.map_err(|e| classify(procedure, e))?;

    let mut query = sqlx::query(sql);
    for param in params {
        query = query.bind(param.as_deref());
    }

    match query.execute(&mut *tx).await {
        Ok(_) => tx.commit().await.map_err(|e| classify(procedure, e)),
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after failed {} also failed: {}", procedure, rollback_err);
            }
            Err(classify(procedure, e))
        }
    }
}

async fn open(options: &PgConnectOptions, timeout: Duration) -> Result<PgConnection, String> {
    match tokio::time::timeout(timeout, PgConnection::connect_with(options)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connection timed out after {}s", timeout.as_secs())),
    }
}

/// Split sqlx errors into procedure failures and connection failures
///
/// A terminated backend answers with a FATAL error before closing the
/// socket; those SQLSTATEs (class 08, 57P01..57P03) count as connection loss.
fn classify(procedure: &str, err: sqlx::Error) -> WriteError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|c| is_connection_state(&c)) => {
            WriteError::Connection {
                procedure: procedure.to_string(),
                message: db_err.message().to_string(),
            }
        }
        sqlx::Error::Database(db_err) => WriteError::Procedure {
            procedure: procedure.to_string(),
            code: db_err.code().map(|c| c.into_owned()),
            message: db_err.message().to_string(),
        },
        other => WriteError::Connection {
            procedure: procedure.to_string(),
            message: other.to_string(),
        },
    }
}

fn is_connection_state(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}
