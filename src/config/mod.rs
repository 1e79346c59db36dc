//! Configuration management for the firewall.
//!
//! Process settings come from an optional TOML file layered with `FIREWALL__`
//! environment variables. The firewall policy itself lives in a separate JSON
//! document managed through [`store::ConfigStore`].

pub mod store;

use std::env;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};

use crate::models::Config;

pub use store::{ConfigStore, JsonFileStore, PersistedState, StoreError};

/// Load configuration from the file named by `CONFIG_FILE` and the environment
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());
    load_config_from(&config_file)
}

pub fn load_config_from(config_file: &str) -> Result<Config, ConfigError> {
    let defaults = Config::default();

    let config = ConfigBuilder::builder()
        .add_source(File::with_name(config_file).required(false))
        .add_source(
            Environment::with_prefix("FIREWALL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_default("server.host", defaults.server.host)?
        .set_default("server.port", defaults.server.port)?
        .set_default("server.max_body_bytes", defaults.server.max_body_bytes)?
        .set_default("admin.host", defaults.admin.host)?
        .set_default("admin.port", defaults.admin.port)?
        .set_default("admin.username", defaults.admin.username)?
        .set_default("admin.session_ttl_hours", defaults.admin.session_ttl_hours)?
        .set_default("upstream.url", defaults.upstream.url)?
        .set_default("upstream.timeout_seconds", defaults.upstream.timeout_seconds)?
        .set_default("policy_store.file", defaults.policy_store.file)?
        .set_default("metrics.enabled", defaults.metrics.enabled)?
        .set_default("metrics.listen", defaults.metrics.listen)?
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config_from("does/not/exist").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_body_bytes, 64 * 1024 * 1024);
        assert_eq!(config.admin.port, 9090);
        assert_eq!(config.admin.password, None);
        assert_eq!(config.upstream.url, "http://127.0.0.1:3000");
        assert_eq!(config.policy_store.file, "firewall.json");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = env::temp_dir().join(format!("firewall-settings-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 8181\nmax_body_bytes = 1024\n\n[upstream]\nurl = \"http://backend:5000\"\n\n[admin]\npassword = \"s3cret\""
        )
        .unwrap();

        let config = load_config_from(path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.server.port, 8181);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.max_body_bytes, 1024);
        assert_eq!(config.upstream.url, "http://backend:5000");
        assert_eq!(config.admin.password.as_deref(), Some("s3cret"));
    }
}
