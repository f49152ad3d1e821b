use std::env;
use std::path::PathBuf;

/// Filesystem locations used by backups and cleanup
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub storage_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Directory copied by "files" and "full" backups
    pub files_dir: PathBuf,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let storage_dir = PathBuf::from(
            env::var("BACKOFFICE_STORAGE_DIR").unwrap_or_else(|_| "storage".to_string()),
        );
        Self::with_root(storage_dir)
    }

    /// Derive every path from a single storage root
    pub fn with_root(storage_dir: PathBuf) -> Self {
        Self {
            backup_dir: env::var("BACKOFFICE_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| storage_dir.join("backups")),
            temp_dir: storage_dir.join("tmp"),
            files_dir: storage_dir.join("app"),
            storage_dir,
        }
    }
}
