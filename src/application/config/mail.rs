use std::env;

/// How outgoing mail leaves the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailDriver {
    /// Deliver through the default stored SMTP configuration
    Smtp,
    /// Write messages to the log instead of sending them
    Log,
}

impl MailDriver {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "log" => MailDriver::Log,
            _ => MailDriver::Smtp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MailDriver::Smtp => "smtp",
            MailDriver::Log => "log",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub driver: MailDriver,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            driver: MailDriver::parse(
                &env::var("BACKOFFICE_MAIL_DRIVER").unwrap_or_else(|_| "smtp".to_string()),
            ),
        }
    }
}
