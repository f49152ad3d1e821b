pub mod accounts;
pub mod audit;
pub mod backup;
pub mod cache;
pub mod cleanup;
pub mod diagnostics;
pub mod jobs;
pub mod mail;
pub mod notification;
pub mod retention;
pub mod scheduler;
pub mod security;
pub mod settings;
pub mod system;

pub use audit::AuditService;
pub use backup::BackupService;
pub use cleanup::CleanupService;
pub use mail::MailService;
pub use notification::NotificationService;
pub use settings::SettingsService;
