use crate::error::DbError;
use crate::executor::{log_failure, QueryExecutor};
use crate::statement::{QueryOutcome, Statement};
use core_types::SqlValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What happened to the backup copy of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationStatus {
    /// Reads are never mirrored.
    NotAWrite,
    /// The primary has no backup configured.
    NoBackup,
    Replicated { backup: String, outcome: QueryOutcome },
    /// The backup write failed. The primary write stands regardless.
    Failed { backup: String, error: String },
}

/// Executes against a primary and mirrors successful writes to its backup.
///
/// The pipeline is two steps: `apply_primary`, then `apply_backup`. The backup
/// step goes through the plain [`QueryExecutor`], which has no notion of
/// backups, so a mirrored write can never trigger another mirror.
#[derive(Clone)]
pub struct ReplicatedExecutor {
    executor: QueryExecutor,
    backups: Arc<BTreeMap<String, String>>,
}

impl ReplicatedExecutor {
    pub fn new(executor: QueryExecutor, backups: BTreeMap<String, String>) -> Self {
        Self {
            executor,
            backups: Arc::new(backups),
        }
    }

    /// The non-replicating executor underneath.
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn backup_for(&self, database: &str) -> Option<&str> {
        self.backups.get(database).map(String::as_str)
    }

    /// Runs the statement on the primary and, if it was a successful write, on the backup.
    pub async fn execute_replicated(
        &self,
        database: &str,
        statement: &Statement,
    ) -> Result<(QueryOutcome, ReplicationStatus), DbError> {
        let outcome = self.apply_primary(database, statement).await?;
        let status = if statement.kind().is_write() {
            self.apply_backup(database, statement).await
        } else {
            ReplicationStatus::NotAWrite
        };
        Ok((outcome, status))
    }

    pub async fn try_execute(&self, database: &str, statement: &Statement) -> Result<QueryOutcome, DbError> {
        self.execute_replicated(database, statement)
            .await
            .map(|(outcome, _)| outcome)
    }

    /// Collapses every primary failure to `None` after logging it.
    /// Backup failures never reach the caller.
    pub async fn execute(&self, database: &str, statement: &Statement) -> Option<QueryOutcome> {
        match self.try_execute(database, statement).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log_failure(database, statement, &e);
                None
            }
        }
    }

    pub async fn execute_sql(&self, database: &str, sql: &str, params: &[SqlValue]) -> Option<QueryOutcome> {
        let statement = Statement::infer(sql).bind_all(params.iter().cloned());
        self.execute(database, &statement).await
    }

    async fn apply_primary(&self, database: &str, statement: &Statement) -> Result<QueryOutcome, DbError> {
        self.executor.try_execute(database, statement).await
    }

    async fn apply_backup(&self, primary: &str, statement: &Statement) -> ReplicationStatus {
        let Some(backup) = self.backup_for(primary) else {
            return ReplicationStatus::NoBackup;
        };

        match self.executor.try_execute(backup, statement).await {
            Ok(outcome) => {
                tracing::debug!(primary, backup, "Write mirrored to backup");
                ReplicationStatus::Replicated {
                    backup: backup.to_string(),
                    outcome,
                }
            }
            Err(e) => {
                tracing::error!(
                    primary,
                    backup,
                    sql = %statement.sql(),
                    params = ?statement.params(),
                    error = %e,
                    "Backup replication failed; primary write is kept"
                );
                ReplicationStatus::Failed {
                    backup: backup.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}
