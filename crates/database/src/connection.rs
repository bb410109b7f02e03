use crate::driver::SqlxConnector;
use crate::error::DbError;
use crate::executor::{QueryExecutor, RetryPolicy};
use crate::replication::ReplicatedExecutor;
use async_trait::async_trait;
use configuration::{Driver, Settings};
use core_types::{RowSet, SqlValue};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything needed to open a session against one logical database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub logical: String,
    pub server: String,
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Schema name on the server.
    pub database: String,
}

impl ConnectionTarget {
    /// File backing this database when the server is a SQLite directory.
    pub fn sqlite_path(&self) -> PathBuf {
        PathBuf::from(&self.host).join(format!("{}.sqlite3", self.database))
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("logical", &self.logical)
            .field("server", &self.server)
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Maps logical database names to physical servers.
///
/// Stateless apart from the routing table it was built with, so the same name
/// always resolves to the same target for the life of the process.
#[derive(Debug, Clone)]
pub struct ConnectionResolver {
    settings: Arc<Settings>,
}

impl ConnectionResolver {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    pub fn resolve(&self, logical: &str) -> Result<ConnectionTarget, DbError> {
        let route = self
            .settings
            .databases
            .get(logical)
            .ok_or_else(|| DbError::UnknownDatabase(logical.to_string()))?;
        let server = self
            .settings
            .servers
            .get(&route.server)
            .ok_or_else(|| DbError::ServerUnavailable {
                database: logical.to_string(),
                server: route.server.clone(),
            })?;

        Ok(ConnectionTarget {
            logical: logical.to_string(),
            server: route.server.clone(),
            driver: server.driver,
            host: server.host.clone(),
            port: server.port,
            user: server.user.clone(),
            password: server.password.clone(),
            database: route.database.clone(),
        })
    }

    /// Every routed logical database, sorted by name.
    pub fn logical_databases(&self) -> Vec<&str> {
        self.settings.databases.keys().map(String::as_str).collect()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Counters reported by the driver after a data-changing statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Opens sessions against a resolved target.
///
/// This is the seam between the executor and a concrete driver; the executor
/// only ever holds one session at a time.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, target: &ConnectionTarget) -> Result<Box<dyn Session>, DbError>;

    /// Makes sure the schema named by `target.database` exists on its server.
    async fn ensure_database(&self, target: &ConnectionTarget) -> Result<(), DbError>;
}

/// One open connection.
#[async_trait]
pub trait Session: Send {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<RowSet, DbError>;

    /// Runs a statement inside its own transaction and commits it.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteSummary, DbError>;

    async fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Wires the resolver, the sqlx driver and the backup replicator from one settings object.
pub fn connect(settings: Arc<Settings>) -> ReplicatedExecutor {
    connect_with(settings, Arc::new(SqlxConnector::new()))
}

/// Same as [`connect`] with a caller-supplied driver.
pub fn connect_with(settings: Arc<Settings>, connector: Arc<dyn Connector>) -> ReplicatedExecutor {
    let policy = RetryPolicy::from(&settings.executor);
    let backups = settings.backups.clone();
    let resolver = Arc::new(ConnectionResolver::new(settings));
    ReplicatedExecutor::new(QueryExecutor::new(resolver, connector, policy), backups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::DatabaseRoute;

    fn resolver() -> ConnectionResolver {
        ConnectionResolver::new(Arc::new(Settings::default_layout()))
    }

    #[test]
    fn known_names_resolve_to_their_server() {
        let resolver = resolver();
        let target = resolver.resolve("appointments_db").unwrap();
        assert_eq!(target.server, "server2");
        assert_eq!(target.database, "appointments_db");
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, 3306);
    }

    #[test]
    fn resolution_is_stable_across_calls() {
        let resolver = resolver();
        for db in resolver.logical_databases() {
            let first = resolver.resolve(db).unwrap();
            for _ in 0..5 {
                assert_eq!(resolver.resolve(db).unwrap(), first);
            }
        }
    }

    #[test]
    fn unknown_name_is_a_routing_error() {
        let err = resolver().resolve("pharmacy_db").unwrap_err();
        assert!(matches!(err, DbError::UnknownDatabase(ref name) if name == "pharmacy_db"));
    }

    #[test]
    fn missing_server_is_reported_separately() {
        let mut settings = Settings::default_layout();
        settings.databases.insert(
            "lab_db".to_string(),
            DatabaseRoute {
                server: "server9".to_string(),
                database: "lab_db".to_string(),
            },
        );
        let resolver = ConnectionResolver::new(Arc::new(settings));
        let err = resolver.resolve("lab_db").unwrap_err();
        assert!(matches!(err, DbError::ServerUnavailable { ref server, .. } if server == "server9"));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let target = resolver().resolve("patients_db").unwrap();
        let rendered = format!("{target:?}");
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("password: \"root\""));
    }
}
