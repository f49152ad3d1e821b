use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored mail-transport credentials
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "smtp_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub host: String,
    pub port: i32,
    /// `none`, `starttls` or `tls`
    pub encryption: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub timeout_secs: i32,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    None,
    StartTls,
    Tls,
}

impl Encryption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encryption::None => "none",
            Encryption::StartTls => "starttls",
            Encryption::Tls => "tls",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "" => Some(Encryption::None),
            "starttls" => Some(Encryption::StartTls),
            "tls" | "ssl" => Some(Encryption::Tls),
            _ => None,
        }
    }
}

/// Runtime mailer configuration derived from a stored SMTP config
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub from_address: String,
    pub from_name: Option<String>,
}

impl Model {
    /// Check the configuration for problems; an empty list means it is usable
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.host.trim().is_empty() {
            problems.push("Host is required".to_string());
        }
        if !(1..=65535).contains(&self.port) {
            problems.push(format!("Port {} is out of range", self.port));
        }
        if Encryption::parse(&self.encryption).is_none() {
            problems.push(format!("Unknown encryption '{}'", self.encryption));
        }
        if self.from_address.parse::<lettre::Address>().is_err() {
            problems.push(format!("Invalid from address '{}'", self.from_address));
        }
        let has_username = self
            .username
            .as_deref()
            .map(|u| !u.is_empty())
            .unwrap_or(false);
        let has_password = self
            .password
            .as_deref()
            .map(|p| !p.is_empty())
            .unwrap_or(false);
        if has_username && !has_password {
            problems.push("Username is set but password is missing".to_string());
        }
        if self.timeout_secs <= 0 {
            problems.push("Timeout must be positive".to_string());
        }

        problems
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Convert to the runtime mailer configuration, failing when invalid
    pub fn to_mailer_config(&self) -> Result<MailerConfig, String> {
        let problems = self.validate();
        if !problems.is_empty() {
            return Err(problems.join("; "));
        }

        Ok(MailerConfig {
            transport: "smtp".to_string(),
            host: self.host.trim().to_string(),
            port: self.port as u16,
            encryption: Encryption::parse(&self.encryption).unwrap_or(Encryption::None),
            username: self.username.clone().filter(|u| !u.is_empty()),
            password: self.password.clone().filter(|p| !p.is_empty()),
            timeout_secs: self.timeout_secs as u64,
            from_address: self.from_address.clone(),
            from_name: self.from_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> Model {
        Model {
            id: 1,
            name: "primary".to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            encryption: "starttls".to_string(),
            username: Some("mailer".to_string()),
            password: Some("secret".to_string()),
            from_address: "noreply@example.com".to_string(),
            from_name: Some("Back Office".to_string()),
            timeout_secs: 30,
            is_default: true,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_config_has_no_problems() {
        assert!(config().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut c = config();
        c.host = " ".to_string();
        c.port = 70000;
        c.encryption = "rot13".to_string();
        c.from_address = "not-an-address".to_string();
        c.password = None;

        let problems = c.validate();
        assert_eq!(problems.len(), 5, "{:?}", problems);
    }

    #[test]
    fn test_to_mailer_config() {
        let mailer = config().to_mailer_config().unwrap();
        assert_eq!(mailer.port, 587);
        assert_eq!(mailer.encryption, Encryption::StartTls);
        assert_eq!(mailer.username.as_deref(), Some("mailer"));

        let json = serde_json::to_value(&mailer).unwrap();
        assert!(json.get("password").is_none());
    }

    #[test]
    fn test_to_mailer_config_rejects_invalid() {
        let mut c = config();
        c.port = 0;
        assert!(c.to_mailer_config().is_err());
    }

    #[test]
    fn test_encryption_aliases() {
        assert_eq!(Encryption::parse("SSL"), Some(Encryption::Tls));
        assert_eq!(Encryption::parse(""), Some(Encryption::None));
        assert_eq!(Encryption::parse("weird"), None);
    }
}
