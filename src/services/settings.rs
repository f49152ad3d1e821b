//! Application settings: registry of known keys, typed getters, sections and repair
//!
//! Keys are `<section>.<name>`. Rows in `app_settings` override the registry
//! defaults; unknown keys may be stored and are treated as plain strings.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::app_setting;
use crate::models::prelude::*;
use crate::services::cache::SettingsCache;
use crate::services::retention::MAX_RETENTION_DAYS;

pub const SECTIONS: [&str; 5] = ["general", "appearance", "security", "notifications", "advanced"];

const FOOTER_CACHE_KEY: &str = "settings.footer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Boolean,
    Integer,
    Url,
    /// File path that should be stored relative to the storage dir
    Path,
}

impl SettingKind {
    /// Value written to `app_settings.setting_type`
    pub fn storage_type(&self) -> &'static str {
        match self {
            SettingKind::Boolean => "boolean",
            SettingKind::Integer => "integer",
            _ => "string",
        }
    }
}

#[derive(Debug)]
pub struct SettingDefinition {
    pub key: &'static str,
    pub default: &'static str,
    pub kind: SettingKind,
    pub description: &'static str,
    /// Inclusive bounds for integer settings
    pub range: Option<(i64, i64)>,
}

macro_rules! setting {
    ($key:expr, $default:expr, Integer($min:expr, $max:expr), $desc:expr) => {
        SettingDefinition {
            key: $key,
            default: $default,
            kind: SettingKind::Integer,
            description: $desc,
            range: Some(($min, $max)),
        }
    };
    ($key:expr, $default:expr, $kind:ident, $desc:expr) => {
        SettingDefinition {
            key: $key,
            default: $default,
            kind: SettingKind::$kind,
            description: $desc,
            range: None,
        }
    };
}

pub static SETTINGS: &[SettingDefinition] = &[
    // General
    setting!("general.app_name", "Back Office", Text, "Application name shown in mails and the footer"),
    setting!("general.app_url", "http://localhost:8000", Url, "Public base URL"),
    setting!("general.timezone", "UTC", Text, "Default timezone"),
    setting!("general.locale", "en", Text, "Default locale"),
    setting!("general.admin_email", "", Text, "Primary administrator contact"),
    // Appearance
    setting!("appearance.logo_path", "", Path, "Logo file, relative to the storage dir"),
    setting!("appearance.favicon_path", "", Path, "Favicon file, relative to the storage dir"),
    setting!("appearance.primary_color", "#1f2937", Text, "Primary brand colour"),
    setting!("appearance.footer_text", "Powered by Back Office", Text, "Footer text"),
    setting!("appearance.footer_copyright", "", Text, "Footer copyright line (generated when empty)"),
    setting!("appearance.footer_show_version", "true", Boolean, "Show the application version in the footer"),
    // Security
    setting!("security.session_lifetime_minutes", "480", Integer(5, 43_200), "Session lifetime in minutes"),
    setting!("security.password_min_length", "8", Integer(6, 128), "Minimum password length"),
    setting!("security.require_email_verification", "false", Boolean, "Only verified users may sign in"),
    setting!("security.max_login_attempts", "5", Integer(0, 100), "Failed logins before the account is locked (0 disables lockout)"),
    // Notifications
    setting!("notifications.enabled", "true", Boolean, "Send administrator notifications"),
    setting!("notifications.recipients", "", Text, "Comma separated recipients (defaults to admin users)"),
    setting!("notifications.backup_failure_enabled", "true", Boolean, "Notify when a backup fails"),
    setting!("notifications.job_failure_enabled", "true", Boolean, "Notify when a job exhausts its attempts"),
    setting!("notifications.test_enabled", "true", Boolean, "Allow test notifications"),
    // Advanced
    setting!("advanced.maintenance_mode", "false", Boolean, "Reject API requests from non-administrators"),
    setting!("advanced.maintenance_message", "The back office is undergoing maintenance.", Text, "Message returned while in maintenance"),
    setting!("advanced.backup_retention_days", "30", Integer(0, MAX_RETENTION_DAYS), "Days before a backup expires"),
    setting!("advanced.auto_backup_enabled", "false", Boolean, "Create a database backup every day"),
    setting!("advanced.failed_job_retention_days", "7", Integer(1, MAX_RETENTION_DAYS), "Days to keep failed jobs"),
    setting!("advanced.audit_retention_days", "90", Integer(1, MAX_RETENTION_DAYS), "Days to keep audit log entries"),
    setting!("advanced.support_url", "", Url, "Support page linked from mails"),
];

pub fn definition(key: &str) -> Option<&'static SettingDefinition> {
    SETTINGS.iter().find(|d| d.key == key)
}

pub fn is_section(name: &str) -> bool {
    SECTIONS.contains(&name)
}

pub fn section_of(key: &str) -> Option<&str> {
    key.split_once('.').map(|(section, _)| section)
}

pub fn section_definitions(section: &str) -> impl Iterator<Item = &'static SettingDefinition> + '_ {
    SETTINGS
        .iter()
        .filter(move |d| section_of(d.key) == Some(section))
}

/// Accepts `1/yes/on/true` and `0/no/off/false` in any case
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "yes" | "on" | "true" => Some(true),
        "0" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

/// Canonical stored form of a value for a known setting
pub fn normalize_value(def: &SettingDefinition, value: &str) -> std::result::Result<String, String> {
    match def.kind {
        SettingKind::Boolean => parse_bool(value)
            .map(|b| b.to_string())
            .ok_or_else(|| format!("'{}' is not a boolean", value)),
        SettingKind::Integer => {
            let n = value
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{}' is not an integer", value))?;
            match def.range {
                Some((min, max)) if !(min..=max).contains(&n) => {
                    Err(format!("{} must be between {} and {}", def.key, min, max))
                }
                _ => Ok(n.to_string()),
            }
        }
        SettingKind::Url | SettingKind::Path => Ok(value.trim().to_string()),
        SettingKind::Text => Ok(value.to_string()),
    }
}

/// Fix a stored value; `None` when it is already clean
pub fn repair_value(
    def: &SettingDefinition,
    value: &str,
    storage_roots: &[PathBuf],
) -> Option<(String, &'static str)> {
    let repaired = match def.kind {
        SettingKind::Boolean | SettingKind::Integer => match normalize_value(def, value) {
            Ok(v) => (v, "normalised value"),
            Err(_) => (def.default.to_string(), "invalid value reset to default"),
        },
        SettingKind::Url => {
            let without_fragment = value.split('#').next().unwrap_or_default();
            (
                without_fragment.trim().trim_end_matches('/').to_string(),
                "stripped URL fragment or trailing slash",
            )
        }
        SettingKind::Path => {
            let trimmed = value.trim();
            let path = Path::new(trimmed);
            let relative = storage_roots
                .iter()
                .filter(|root| path.is_absolute() && root.is_absolute())
                .find_map(|root| path.strip_prefix(root).ok())
                .map(|rel| rel.to_string_lossy().replace('\\', "/"));
            match relative {
                Some(rel) => (rel, "made path relative to storage"),
                None => (trimmed.to_string(), "trimmed whitespace"),
            }
        }
        SettingKind::Text => (value.trim().to_string(), "trimmed whitespace"),
    };

    if repaired.0 == value {
        None
    } else {
        Some(repaired)
    }
}

fn section_cache_key(section: &str) -> String {
    format!("settings.section.{}", section)
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct FooterConfig {
    pub text: String,
    pub copyright: String,
    pub show_version: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub setting_type: String,
    pub description: Option<String>,
    pub is_default: bool,
}

/// Values of the `security` section that sign-in and account maintenance enforce
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicy {
    pub session_lifetime_secs: i64,
    pub password_min_length: usize,
    pub require_email_verification: bool,
    /// 0 disables lockout
    pub max_login_attempts: i64,
}

impl SecurityPolicy {
    pub fn check_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.password_min_length {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters",
                self.password_min_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SettingChange {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct SettingsService {
    db: DbConn,
    cache: SettingsCache,
}

impl SettingsService {
    pub fn new(db: DbConn, cache: SettingsCache) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &SettingsCache {
        &self.cache
    }

    /// Stored value, else the registry default, else None
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(row) = AppSetting::find_by_id(key).one(&self.db).await? {
            return Ok(Some(row.value));
        }
        Ok(definition(key).map(|d| d.default.to_string()))
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get(key).await?;
        Ok(value
            .as_deref()
            .and_then(parse_bool)
            .or_else(|| definition(key).and_then(|d| parse_bool(d.default)))
            .unwrap_or(false))
    }

    /// Integer value; registered bounds are applied to whatever is stored
    pub async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        let def = definition(key);
        let value = self.get(key).await?;
        let parsed = value
            .and_then(|v| v.trim().parse::<i64>().ok())
            .or_else(|| def.and_then(|d| d.default.parse().ok()));
        Ok(match def.and_then(|d| d.range) {
            Some((min, max)) => parsed.map(|n| n.clamp(min, max)),
            None => parsed,
        })
    }

    /// Upsert a setting; known keys are validated and normalised
    pub async fn set(&self, key: &str, value: &str) -> Result<app_setting::Model> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::BadRequest("Setting key cannot be empty".to_string()));
        }

        let (value, setting_type, description) = match definition(key) {
            Some(def) => (
                normalize_value(def, value).map_err(|e| {
                    AppError::BadRequest(format!("Invalid value for '{}': {}", key, e))
                })?,
                def.kind.storage_type(),
                Some(def.description.to_string()),
            ),
            None => (value.to_string(), SettingKind::Text.storage_type(), None),
        };

        let now = Utc::now();
        let existing = AppSetting::find_by_id(key).one(&self.db).await?;

        let saved = if let Some(row) = existing {
            let mut setting: app_setting::ActiveModel = row.into();
            setting.value = Set(value);
            setting.setting_type = Set(setting_type.to_string());
            setting.updated_at = Set(now);
            setting.update(&self.db).await?
        } else {
            app_setting::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value),
                setting_type: Set(setting_type.to_string()),
                description: Set(description),
                updated_at: Set(now),
            }
            .insert(&self.db)
            .await?
        };

        self.invalidate(key).await;
        tracing::debug!(key = %saved.key, "Setting updated");
        Ok(saved)
    }

    /// Every registry key plus any stored unknown keys
    pub async fn list(&self) -> Result<Vec<SettingEntry>> {
        let rows = AppSetting::find()
            .order_by_asc(app_setting::Column::Key)
            .all(&self.db)
            .await?;
        let mut stored: HashMap<String, app_setting::Model> =
            rows.into_iter().map(|r| (r.key.clone(), r)).collect();

        let mut entries: Vec<SettingEntry> = SETTINGS
            .iter()
            .map(|def| match stored.remove(def.key) {
                Some(row) => SettingEntry {
                    key: row.key,
                    value: row.value,
                    setting_type: row.setting_type,
                    description: Some(def.description.to_string()),
                    is_default: false,
                },
                None => SettingEntry {
                    key: def.key.to_string(),
                    value: def.default.to_string(),
                    setting_type: def.kind.storage_type().to_string(),
                    description: Some(def.description.to_string()),
                    is_default: true,
                },
            })
            .collect();

        entries.extend(stored.into_values().map(|row| SettingEntry {
            key: row.key,
            value: row.value,
            setting_type: row.setting_type,
            description: row.description,
            is_default: false,
        }));
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Stored rows of a section merged over the defaults, cached
    pub async fn section(&self, name: &str) -> Result<BTreeMap<String, String>> {
        if !is_section(name) {
            return Err(AppError::NotFound(format!(
                "Unknown settings section '{}'",
                name
            )));
        }

        let cache_key = section_cache_key(name);
        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(map) = serde_json::from_value::<BTreeMap<String, String>>(cached) {
                return Ok(map);
            }
        }

        let prefix = format!("{}.", name);
        let rows = AppSetting::find()
            .filter(app_setting::Column::Key.starts_with(&prefix))
            .all(&self.db)
            .await?;

        let mut merged: BTreeMap<String, String> = section_definitions(name)
            .map(|d| (d.key.to_string(), d.default.to_string()))
            .collect();
        for row in rows {
            merged.insert(row.key, row.value);
        }

        self.cache
            .put(&cache_key, serde_json::to_value(&merged)?)
            .await;
        Ok(merged)
    }

    /// All sections keyed by section name
    pub async fn dashboard(&self) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        let mut sections = BTreeMap::new();
        for name in SECTIONS {
            sections.insert(name.to_string(), self.section(name).await?);
        }
        Ok(sections)
    }

    /// Write several keys of one section; keys may be given with or without the prefix
    pub async fn update_section(
        &self,
        name: &str,
        values: HashMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        if !is_section(name) {
            return Err(AppError::NotFound(format!(
                "Unknown settings section '{}'",
                name
            )));
        }

        let prefix = format!("{}.", name);
        let mut updates = Vec::with_capacity(values.len());
        for (key, value) in values {
            let key = if key.contains('.') {
                key
            } else {
                format!("{}{}", prefix, key)
            };
            let def = definition(&key)
                .filter(|d| d.key.starts_with(&prefix))
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Setting '{}' does not belong to section '{}'",
                        key, name
                    ))
                })?;
            normalize_value(def, &value)
                .map_err(|e| AppError::BadRequest(format!("Invalid value for '{}': {}", key, e)))?;
            updates.push((key, value));
        }

        for (key, value) in &updates {
            self.set(key, value).await?;
        }

        self.cache.forget(&section_cache_key(name)).await;
        self.section(name).await
    }

    /// Delete every stored row of a section so defaults apply again
    pub async fn reset_section(&self, name: &str) -> Result<u64> {
        if !is_section(name) {
            return Err(AppError::NotFound(format!(
                "Unknown settings section '{}'",
                name
            )));
        }

        let result = AppSetting::delete_many()
            .filter(app_setting::Column::Key.starts_with(format!("{}.", name)))
            .exec(&self.db)
            .await?;

        self.cache.forget(&section_cache_key(name)).await;
        self.cache.forget(FOOTER_CACHE_KEY).await;
        tracing::info!(section = name, removed = result.rows_affected, "Settings section reset");
        Ok(result.rows_affected)
    }

    pub async fn footer(&self) -> Result<FooterConfig> {
        if let Some(cached) = self.cache.get(FOOTER_CACHE_KEY).await {
            if let Ok(footer) = serde_json::from_value::<FooterConfig>(cached) {
                return Ok(footer);
            }
        }

        let appearance = self.section("appearance").await?;
        let general = self.section("general").await?;
        let value = |key: &str| appearance.get(key).cloned().unwrap_or_default();

        let show_version = parse_bool(&value("appearance.footer_show_version")).unwrap_or(true);
        let mut copyright = value("appearance.footer_copyright");
        if copyright.trim().is_empty() {
            let app_name = general
                .get("general.app_name")
                .cloned()
                .unwrap_or_default();
            copyright = format!("© {} {}", Utc::now().year(), app_name);
        }

        let footer = FooterConfig {
            text: value("appearance.footer_text"),
            copyright,
            show_version,
            version: show_version.then(|| env!("CARGO_PKG_VERSION").to_string()),
        };

        self.cache
            .put(FOOTER_CACHE_KEY, serde_json::to_value(&footer)?)
            .await;
        Ok(footer)
    }

    pub async fn security_policy(&self) -> Result<SecurityPolicy> {
        let lifetime_minutes = self
            .get_int("security.session_lifetime_minutes")
            .await?
            .unwrap_or(480);
        let min_length = self
            .get_int("security.password_min_length")
            .await?
            .unwrap_or(8);
        Ok(SecurityPolicy {
            session_lifetime_secs: lifetime_minutes * 60,
            password_min_length: usize::try_from(min_length).unwrap_or(8),
            require_email_verification: self
                .get_bool("security.require_email_verification")
                .await?,
            max_login_attempts: self
                .get_int("security.max_login_attempts")
                .await?
                .unwrap_or(5),
        })
    }

    /// Normalise stored values in place; with `dry_run` only report
    pub async fn repair(&self, storage_dir: &Path, dry_run: bool) -> Result<Vec<SettingChange>> {
        let mut roots = vec![storage_dir.to_path_buf()];
        if let Ok(canonical) = std::fs::canonicalize(storage_dir) {
            roots.push(canonical);
        }

        let rows = AppSetting::find()
            .order_by_asc(app_setting::Column::Key)
            .all(&self.db)
            .await?;

        let mut changes = Vec::new();
        for row in rows {
            let Some(def) = definition(&row.key) else {
                continue;
            };

            let repaired = repair_value(def, &row.value, &roots);
            let type_mismatch = row.setting_type != def.kind.storage_type();
            if repaired.is_none() && !type_mismatch {
                continue;
            }

            let (new_value, reason) = repaired
                .unwrap_or_else(|| (row.value.clone(), "corrected setting type"));
            changes.push(SettingChange {
                key: row.key.clone(),
                old_value: row.value.clone(),
                new_value: new_value.clone(),
                reason: reason.to_string(),
            });

            if !dry_run {
                let mut setting: app_setting::ActiveModel = row.into();
                setting.value = Set(new_value);
                setting.setting_type = Set(def.kind.storage_type().to_string());
                setting.updated_at = Set(Utc::now());
                setting.update(&self.db).await?;
            }
        }

        if !dry_run && !changes.is_empty() {
            self.cache.flush().await;
            tracing::info!(changes = changes.len(), "Repaired stored settings");
        }

        Ok(changes)
    }

    async fn invalidate(&self, key: &str) {
        if let Some(section) = section_of(key) {
            self.cache.forget(&section_cache_key(section)).await;
            if section == "appearance" || section == "general" {
                self.cache.forget(FOOTER_CACHE_KEY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_check_counts_characters() {
        let policy = SecurityPolicy {
            session_lifetime_secs: 3600,
            password_min_length: 10,
            require_email_verification: false,
            max_login_attempts: 5,
        };
        assert!(policy.check_password("ninechars").is_err());
        assert!(policy.check_password("tencharss!").is_ok());
        assert!(policy.check_password("ééééééééé").is_err());
    }

    #[test]
    fn test_registry_keys_belong_to_known_sections() {
        for def in SETTINGS {
            let section = section_of(def.key).unwrap();
            assert!(is_section(section), "{} has unknown section", def.key);
            assert!(normalize_value(def, def.default).is_ok(), "{} default invalid", def.key);
        }
    }

    #[test]
    fn test_parse_bool_variants() {
        for v in ["1", "yes", "ON", "true", " True "] {
            assert_eq!(parse_bool(v), Some(true), "{}", v);
        }
        for v in ["0", "no", "off", "FALSE"] {
            assert_eq!(parse_bool(v), Some(false), "{}", v);
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_normalize_integer_rejects_garbage() {
        let def = definition("advanced.backup_retention_days").unwrap();
        assert_eq!(normalize_value(def, " 14 ").unwrap(), "14");
        assert!(normalize_value(def, "two weeks").is_err());
    }

    #[test]
    fn test_normalize_integer_enforces_range() {
        let def = definition("advanced.failed_job_retention_days").unwrap();
        assert!(normalize_value(def, "9000000000").is_err());
        assert!(normalize_value(def, "0").is_err());
        assert_eq!(normalize_value(def, "36500").unwrap(), "36500");

        let def = definition("security.password_min_length").unwrap();
        assert!(normalize_value(def, "3").is_err());
        assert_eq!(normalize_value(def, "20").unwrap(), "20");
    }

    #[test]
    fn test_repair_url_strips_fragment_and_slash() {
        let def = definition("general.app_url").unwrap();
        let (fixed, _) = repair_value(def, "https://admin.example.com/#/dashboard", &[]).unwrap();
        assert_eq!(fixed, "https://admin.example.com");
        assert!(repair_value(def, "https://admin.example.com", &[]).is_none());
    }

    #[test]
    fn test_repair_path_made_relative() {
        let def = definition("appearance.logo_path").unwrap();
        let roots = vec![PathBuf::from("/srv/storage")];
        let (fixed, _) = repair_value(def, "/srv/storage/branding/logo.png", &roots).unwrap();
        assert_eq!(fixed, "branding/logo.png");
        assert!(repair_value(def, "branding/logo.png", &roots).is_none());
        assert!(repair_value(def, "/elsewhere/logo.png", &roots).is_none());
    }

    #[test]
    fn test_repair_boolean_resets_invalid_to_default() {
        let def = definition("advanced.maintenance_mode").unwrap();
        assert_eq!(repair_value(def, "yes", &[]).unwrap().0, "true");
        assert_eq!(repair_value(def, "banana", &[]).unwrap().0, "false");
        assert!(repair_value(def, "false", &[]).is_none());
    }
}
