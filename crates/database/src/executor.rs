use crate::connection::{ConnectionResolver, ConnectionTarget, Connector, Session};
use crate::error::DbError;
use crate::statement::{QueryOutcome, Statement, StatementKind};
use configuration::ExecutorConfig;
use core_types::{normalize_params, SqlValue};
use std::sync::Arc;
use std::time::Duration;

/// Bounded, fixed-delay retry for "connection lost" failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&ExecutorConfig> for RetryPolicy {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Runs one statement against one logical database.
///
/// Every attempt opens its own connection and closes it before the attempt
/// returns, whatever the outcome. This executor never talks to backups.
#[derive(Clone)]
pub struct QueryExecutor {
    resolver: Arc<ConnectionResolver>,
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(resolver: Arc<ConnectionResolver>, connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            resolver,
            connector,
            policy,
        }
    }

    pub fn resolver(&self) -> &Arc<ConnectionResolver> {
        &self.resolver
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Executes `statement`, surfacing the failure kind.
    ///
    /// Routing errors fail immediately. Only [`DbError::is_transient`] failures
    /// are retried, up to `max_attempts` attempts in total.
    pub async fn try_execute(&self, database: &str, statement: &Statement) -> Result<QueryOutcome, DbError> {
        if statement.sql().trim().is_empty() {
            return Err(DbError::InvalidStatement("empty SQL text".to_string()));
        }
        let target = self.resolver.resolve(database)?;
        let params = normalize_params(statement.params());

        tracing::debug!(
            database,
            kind = %statement.kind(),
            sql = %statement.sql(),
            params = ?params,
            "Executing statement"
        );

        let mut attempt = 1;
        loop {
            match self.attempt(&target, statement.kind(), statement.sql(), &params).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        database,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Connection lost, retrying after {:?}",
                        self.policy.backoff
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Executes `statement`, collapsing every failure to `None` after logging it.
    pub async fn execute(&self, database: &str, statement: &Statement) -> Option<QueryOutcome> {
        match self.try_execute(database, statement).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log_failure(database, statement, &e);
                None
            }
        }
    }

    /// Text-only entry point: the statement kind is inferred from the SQL.
    pub async fn execute_sql(&self, database: &str, sql: &str, params: &[SqlValue]) -> Option<QueryOutcome> {
        let statement = Statement::infer(sql).bind_all(params.iter().cloned());
        self.execute(database, &statement).await
    }

    async fn attempt(
        &self,
        target: &ConnectionTarget,
        kind: StatementKind,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryOutcome, DbError> {
        let mut session = self.connector.open(target).await?;
        let result = dispatch(session.as_mut(), kind, sql, params).await;
        if let Err(e) = session.close().await {
            tracing::debug!(database = %target.logical, error = %e, "Error while closing connection");
        }
        result
    }
}

async fn dispatch(
    session: &mut dyn Session,
    kind: StatementKind,
    sql: &str,
    params: &[SqlValue],
) -> Result<QueryOutcome, DbError> {
    match kind {
        StatementKind::Select => {
            let rows = session.fetch_all(sql, params).await?;
            tracing::debug!("Query returned {} rows", rows.len());
            Ok(QueryOutcome::Rows(rows))
        }
        StatementKind::Insert => {
            let summary = session.execute(sql, params).await?;
            let id = summary.last_insert_id.unwrap_or(0);
            tracing::debug!("Insert committed, last id {}", id);
            Ok(QueryOutcome::Inserted { id })
        }
        StatementKind::Update | StatementKind::Delete => {
            let summary = session.execute(sql, params).await?;
            tracing::debug!("{} committed, {} rows affected", kind, summary.rows_affected);
            Ok(QueryOutcome::Affected {
                rows: summary.rows_affected,
            })
        }
        StatementKind::Ddl => {
            session.execute(sql, params).await?;
            Ok(QueryOutcome::Applied)
        }
    }
}

pub(crate) fn log_failure(database: &str, statement: &Statement, error: &DbError) {
    if error.is_routing() {
        tracing::error!(
            database,
            kind = %statement.kind(),
            sql = %statement.sql(),
            error = %error,
            "Statement not sent, no route"
        );
        return;
    }
    tracing::error!(
        database,
        kind = %statement.kind(),
        sql = %statement.sql(),
        params = ?statement.params(),
        error = %error,
        "Statement failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::WriteSummary;
    use async_trait::async_trait;
    use configuration::Settings;
    use core_types::RowSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` opens with the given error, then serves canned results.
    struct ScriptedConnector {
        failures: usize,
        error: fn() -> DbError,
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
        seen_params: Arc<Mutex<Vec<Vec<SqlValue>>>>,
    }

    impl ScriptedConnector {
        fn new(failures: usize, error: fn() -> DbError) -> Self {
            Self {
                failures,
                error,
                opens: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
                seen_params: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct ScriptedSession {
        fail_with: Option<DbError>,
        closes: Arc<AtomicUsize>,
        seen_params: Arc<Mutex<Vec<Vec<SqlValue>>>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn open(&self, _target: &ConnectionTarget) -> Result<Box<dyn Session>, DbError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            let fail_with = (n < self.failures).then(|| (self.error)());
            Ok(Box::new(ScriptedSession {
                fail_with,
                closes: self.closes.clone(),
                seen_params: self.seen_params.clone(),
            }))
        }

        async fn ensure_database(&self, _target: &ConnectionTarget) -> Result<(), DbError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn fetch_all(&mut self, _sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError> {
            self.seen_params.lock().unwrap().push(params.to_vec());
            match self.fail_with.take() {
                Some(e) => Err(e),
                None => Ok(vec![vec![SqlValue::Int(1)]]),
            }
        }

        async fn execute(&mut self, _sql: &str, params: &[SqlValue]) -> Result<WriteSummary, DbError> {
            self.seen_params.lock().unwrap().push(params.to_vec());
            match self.fail_with.take() {
                Some(e) => Err(e),
                None => Ok(WriteSummary {
                    rows_affected: 1,
                    last_insert_id: Some(42),
                }),
            }
        }

        async fn close(self: Box<Self>) -> Result<(), DbError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor(connector: Arc<ScriptedConnector>) -> QueryExecutor {
        let resolver = Arc::new(ConnectionResolver::new(Arc::new(Settings::default_layout())));
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };
        QueryExecutor::new(resolver, connector, policy)
    }

    fn lost() -> DbError {
        DbError::ConnectionLost("lost connection to server during query".to_string())
    }

    fn syntax() -> DbError {
        DbError::Statement("You have an error in your SQL syntax".to_string())
    }

    #[tokio::test]
    async fn retries_connection_lost_then_succeeds() {
        let connector = Arc::new(ScriptedConnector::new(2, lost));
        let exec = executor(connector.clone());

        let outcome = exec
            .try_execute("patients_db", &Statement::select("SELECT 1"))
            .await
            .unwrap();

        assert_eq!(outcome, QueryOutcome::Rows(vec![vec![SqlValue::Int(1)]]));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 3);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let connector = Arc::new(ScriptedConnector::new(10, lost));
        let exec = executor(connector.clone());

        let result = exec.execute("patients_db", &Statement::select("SELECT 1")).await;

        assert!(result.is_none());
        assert_eq!(connector.opens.load(Ordering::SeqCst), 3);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn statement_errors_are_not_retried() {
        let connector = Arc::new(ScriptedConnector::new(1, syntax));
        let exec = executor(connector.clone());

        let err = exec
            .try_execute("billing_db", &Statement::insert("INSERT INTO invoices VALUES (?)").bind(1))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Statement(_)));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_database_never_opens_a_connection() {
        let connector = Arc::new(ScriptedConnector::new(0, lost));
        let exec = executor(connector.clone());

        assert!(exec.execute("pharmacy_db", &Statement::select("SELECT 1")).await.is_none());
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn classifies_writes_and_normalizes_params() {
        let connector = Arc::new(ScriptedConnector::new(0, lost));
        let exec = executor(connector.clone());

        let inserted = exec
            .execute_sql(
                "patients_db",
                "  insert into patients (first_name, gender) values (?, ?)",
                &[SqlValue::from("Ann"), SqlValue::from("None")],
            )
            .await;
        assert_eq!(inserted, Some(QueryOutcome::Inserted { id: 42 }));

        let updated = exec
            .execute("patients_db", &Statement::update("UPDATE patients SET email = ?").bind(""))
            .await;
        assert_eq!(updated, Some(QueryOutcome::Affected { rows: 1 }));

        let seen = connector.seen_params.lock().unwrap();
        assert_eq!(seen[0], vec![SqlValue::from("Ann"), SqlValue::Null]);
        assert_eq!(seen[1], vec![SqlValue::Null]);
    }

    #[tokio::test]
    async fn empty_sql_is_rejected() {
        let connector = Arc::new(ScriptedConnector::new(0, lost));
        let exec = executor(connector.clone());
        let err = exec
            .try_execute("patients_db", &Statement::select("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidStatement(_)));
    }
}
