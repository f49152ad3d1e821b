pub mod auth;
pub mod database;
pub mod mail;
pub mod queue;
pub mod server;
pub mod storage;

use once_cell::sync::Lazy;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: server::ServerConfig,
    pub database: database::DatabaseConfig,
    pub auth: auth::AuthConfig,
    pub mail: mail::MailConfig,
    pub storage: storage::StorageConfig,
    pub queue: queue::QueueConfig,

    // Build info
    pub commit_hash: String,
    pub version: String,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: server::ServerConfig::from_env(),
            database: database::DatabaseConfig::from_env(),
            auth: auth::AuthConfig::from_env(),
            mail: mail::MailConfig::from_env(),
            storage: storage::StorageConfig::from_env(),
            queue: queue::QueueConfig::from_env(),

            // Build info
            commit_hash: env::var("COMMIT_HASH").unwrap_or_else(|_| "unknown".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),

            // Logging
            log_level: env::var("BACKOFFICE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("BACKOFFICE_LOG_JSON")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[cfg(test)]
mod tests {
    use super::mail::MailDriver;

    #[test]
    fn test_mail_driver_parse() {
        assert_eq!(MailDriver::parse("log"), MailDriver::Log);
        assert_eq!(MailDriver::parse(" LOG "), MailDriver::Log);
        assert_eq!(MailDriver::parse("smtp"), MailDriver::Smtp);
        assert_eq!(MailDriver::parse("anything"), MailDriver::Smtp);
    }

    #[test]
    fn test_storage_paths_derive_from_root() {
        let storage = super::storage::StorageConfig::with_root("/srv/data".into());
        assert_eq!(storage.temp_dir, std::path::PathBuf::from("/srv/data/tmp"));
        assert_eq!(storage.files_dir, std::path::PathBuf::from("/srv/data/app"));
    }
}
