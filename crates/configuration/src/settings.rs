use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Built once at startup and shared read-only; nothing mutates routing at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Physical servers, keyed by server name (e.g. "server1").
    pub servers: BTreeMap<String, ServerConfig>,
    /// Logical database name -> which server hosts it and under what schema name.
    pub databases: BTreeMap<String, DatabaseRoute>,
    /// Primary logical database -> its backup logical database.
    #[serde(default)]
    pub backups: BTreeMap<String, String>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The database engine spoken by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    #[serde(alias = "mariadb")]
    Mysql,
    /// Each logical database is a file `<host>/<database>.sqlite3`.
    Sqlite,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Mysql => f.write_str("mysql"),
            Driver::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Connection parameters of one physical server.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub driver: Driver,
    /// Hostname for MySQL, data directory for SQLite.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Where a logical database lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseRoute {
    pub server: String,
    /// Schema name on the server. Usually equal to the logical name.
    pub database: String,
}

/// Retry policy for "connection lost" failures.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl ExecutorConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. "info" or "database=debug,info".
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_port() -> u16 {
    3306
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

/// The four logical databases the application knows about, with the
/// server each one lives on in the stock two-server layout.
pub const DEFAULT_LAYOUT: [(&str, &str); 4] = [
    ("patients_db", "server1"),
    ("medical_db", "server1"),
    ("appointments_db", "server2"),
    ("billing_db", "server2"),
];

impl Settings {
    /// The stock deployment: two MySQL servers on localhost, no backups.
    pub fn default_layout() -> Self {
        let server = ServerConfig {
            driver: Driver::Mysql,
            host: "localhost".to_string(),
            port: default_port(),
            user: "root".to_string(),
            password: "root".to_string(),
        };
        Self::with_servers([("server1", server.clone()), ("server2", server)])
    }

    /// The stock layout backed by SQLite files, one directory per server.
    /// Every primary gets a `<name>_backup_db` on a third directory.
    pub fn sqlite_layout(root: &Path) -> Self {
        let server = |name: &str| ServerConfig {
            driver: Driver::Sqlite,
            host: root.join(name).to_string_lossy().into_owned(),
            port: 0,
            user: String::new(),
            password: String::new(),
        };
        let mut settings = Self::with_servers([
            ("server1", server("server1")),
            ("server2", server("server2")),
        ]);
        settings.servers.insert("backup".to_string(), server("backup"));
        for (primary, _) in DEFAULT_LAYOUT {
            let backup = backup_name(primary);
            settings.databases.insert(
                backup.clone(),
                DatabaseRoute {
                    server: "backup".to_string(),
                    database: backup.clone(),
                },
            );
            settings.backups.insert(primary.to_string(), backup);
        }
        settings
    }

    fn with_servers<const N: usize>(servers: [(&str, ServerConfig); N]) -> Self {
        let databases = DEFAULT_LAYOUT
            .iter()
            .map(|(db, server)| {
                (
                    db.to_string(),
                    DatabaseRoute {
                        server: server.to_string(),
                        database: db.to_string(),
                    },
                )
            })
            .collect();
        Self {
            servers: servers
                .into_iter()
                .map(|(name, cfg)| (name.to_string(), cfg))
                .collect(),
            databases,
            backups: BTreeMap::new(),
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Checks the cross-references between sections.
    ///
    /// A route naming a server that is not configured is deliberately accepted
    /// here; it is reported per call when that database is resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "executor.max_attempts must be at least 1".to_string(),
            ));
        }
        for (primary, backup) in &self.backups {
            if !self.databases.contains_key(primary) {
                return Err(ConfigError::ValidationError(format!(
                    "backup configured for unknown database '{primary}'"
                )));
            }
            if !self.databases.contains_key(backup) {
                return Err(ConfigError::ValidationError(format!(
                    "backup '{backup}' of '{primary}' is not a routed database"
                )));
            }
            if primary == backup {
                return Err(ConfigError::ValidationError(format!(
                    "'{primary}' cannot be its own backup"
                )));
            }
            if self.backups.contains_key(backup) {
                return Err(ConfigError::ValidationError(format!(
                    "backup '{backup}' must not have a backup of its own"
                )));
            }
        }
        Ok(())
    }

    /// Parses settings from TOML text and validates them.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }
}

/// The conventional backup name for a primary logical database.
pub fn backup_name(primary: &str) -> String {
    match primary.strip_suffix("_db") {
        Some(stem) => format!("{stem}_backup_db"),
        None => format!("{primary}_backup"),
    }
}
