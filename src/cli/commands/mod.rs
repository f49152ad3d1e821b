pub mod backup;
pub mod cleanup;
pub mod jobs;
pub mod logs;
pub mod mail;
pub mod notification;
pub mod settings;
pub mod system;
pub mod user;
pub mod validate;
