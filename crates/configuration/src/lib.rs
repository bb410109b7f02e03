use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    backup_name, DatabaseRoute, Driver, ExecutorConfig, LoggingConfig, ServerConfig, Settings,
    DEFAULT_LAYOUT,
};

/// The file read when `HOSPITAL_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "hospital.toml";

/// Loads the application configuration.
///
/// Reads the TOML file named by `HOSPITAL_CONFIG` (or `hospital.toml`), then
/// layers `HOSPITAL__*` environment variables on top, e.g.
/// `HOSPITAL__SERVERS__SERVER1__PASSWORD`. The result is validated before
/// it is returned.
pub fn load_config() -> Result<Settings, ConfigError> {
    let path = std::env::var("HOSPITAL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    load_config_from(&path)
}

pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("HOSPITAL")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Settings` struct
    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FILE: &str = r#"
        [servers.server1]
        host = "10.0.0.1"
        user = "app"
        password = "secret"

        [databases.patients_db]
        server = "server1"
        database = "patients_db"
    "#;

    #[test]
    fn environment_overrides_file_values_without_retyping_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hospital.toml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(FILE.as_bytes())
            .unwrap();

        // Only this test touches HOSPITAL__* variables in this crate.
        unsafe {
            std::env::set_var("HOSPITAL__SERVERS__SERVER1__PASSWORD", "007");
            std::env::set_var("HOSPITAL__SERVERS__SERVER1__PORT", "3307");
        }
        let loaded = load_config_from(path.to_str().unwrap());
        unsafe {
            std::env::remove_var("HOSPITAL__SERVERS__SERVER1__PASSWORD");
            std::env::remove_var("HOSPITAL__SERVERS__SERVER1__PORT");
        }

        let settings = loaded.unwrap();
        let server = &settings.servers["server1"];
        assert_eq!(server.password, "007");
        assert_eq!(server.port, 3307);
        assert_eq!(server.host, "10.0.0.1");
        assert_eq!(settings.databases["patients_db"].server, "server1");
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load_config_from(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
