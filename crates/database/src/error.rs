use thiserror::Error;

/// MySQL error numbers that mean the session is gone rather than the statement is wrong.
const MYSQL_CONNECTION_LOST: [u16; 5] = [
    1053, // server shutdown in progress
    1927, // connection was killed
    2006, // server has gone away
    2013, // lost connection during query
    4031, // disconnected by the server because of inactivity
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No route is configured for logical database '{0}'")]
    UnknownDatabase(String),

    #[error("Server '{server}' hosting '{database}' is not configured")]
    ServerUnavailable { database: String, server: String },

    #[error("Lost connection to the database: {0}")]
    ConnectionLost(String),

    #[error("Failed to connect to the database: {0}")]
    Connection(String),

    #[error("Statement failed: {0}")]
    Statement(String),

    #[error("Failed to decode a result column: {0}")]
    Decode(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("No row in '{table}' with id {id}")]
    MissingReference { table: &'static str, id: i64 },
}

impl DbError {
    /// Whether a fresh attempt on a fresh connection could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::ConnectionLost(_))
    }

    pub fn is_routing(&self) -> bool {
        matches!(self, DbError::UnknownDatabase(_) | DbError::ServerUnavailable { .. })
    }

    /// Maps a failure to open a connection. Never retried.
    pub fn connect(err: sqlx::Error) -> Self {
        DbError::Connection(err.to_string())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => DbError::ConnectionLost(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                DbError::ConnectionLost(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let lost = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| MYSQL_CONNECTION_LOST.contains(&e.number()))
                    .unwrap_or(false);
                if lost {
                    DbError::ConnectionLost(db_err.to_string())
                } else {
                    DbError::Statement(db_err.to_string())
                }
            }
            sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => DbError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. } => DbError::Decode(err.to_string()),
            other => DbError::Statement(other.to_string()),
        }
    }
}
