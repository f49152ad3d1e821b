//! Outgoing mail
//!
//! The `smtp` driver delivers through the default stored SMTP configuration;
//! the `log` driver only logs messages and keeps the most recent ones in memory.

pub mod smtp;
pub mod templates;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::mail::MailDriver;
use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::email_template::RenderedEmail;
use crate::models::smtp_config::{Encryption, MailerConfig};
use crate::services::settings::SettingsService;

const OUTBOX_CAPACITY: usize = 50;

/// A message ready to be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Plain text as a preformatted HTML body, with markup escaped
pub fn text_to_html(text: &str) -> String {
    format!("<pre>{}</pre>", escape_html(text))
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl OutgoingEmail {
    pub fn from_rendered(to: Vec<String>, rendered: RenderedEmail) -> Self {
        Self {
            to,
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
        }
    }
}

#[derive(Clone)]
pub struct MailService {
    db: DbConn,
    settings: SettingsService,
    driver: MailDriver,
    outbox: Arc<Mutex<VecDeque<OutgoingEmail>>>,
}

impl MailService {
    pub fn new(db: DbConn, settings: SettingsService, driver: MailDriver) -> Self {
        Self {
            db,
            settings,
            driver,
            outbox: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn driver(&self) -> MailDriver {
        self.driver
    }

    /// Messages recorded by the `log` driver, oldest first
    pub fn recent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().iter().cloned().collect()
    }

    /// Runtime configuration from the default SMTP config
    pub async fn default_mailer(&self) -> Result<Option<MailerConfig>> {
        smtp::default_config(&self.db)
            .await?
            .map(|config| config.to_mailer_config().map_err(AppError::Mail))
            .transpose()
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if email.to.is_empty() {
            return Err(AppError::BadRequest("Email has no recipients".to_string()));
        }

        match self.driver {
            MailDriver::Log => {
                tracing::info!(
                    to = %email.to.join(", "),
                    subject = %email.subject,
                    "Mail (log driver)"
                );
                let mut outbox = self.outbox.lock();
                if outbox.len() == OUTBOX_CAPACITY {
                    outbox.pop_front();
                }
                outbox.push_back(email.clone());
                Ok(())
            }
            MailDriver::Smtp => {
                let config = self.default_mailer().await?.ok_or_else(|| {
                    AppError::Mail("No default SMTP configuration".to_string())
                })?;
                self.send_with(&config, email).await
            }
        }
    }

    /// Deliver through a specific configuration regardless of the driver
    pub async fn send_with(&self, config: &MailerConfig, email: &OutgoingEmail) -> Result<()> {
        let transport = build_transport(config)?;
        let message = build_message(config, email)?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::Mail(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            to = %email.to.join(", "),
            subject = %email.subject,
            host = %config.host,
            "Mail sent"
        );
        Ok(())
    }

    /// Render a stored template and send it; `app_name` is filled in when not given
    pub async fn send_template(
        &self,
        name: &str,
        to: Vec<String>,
        vars: &HashMap<String, String>,
    ) -> Result<RenderedEmail> {
        let template = templates::get_by_name(&self.db, name).await?;
        if !template.is_active {
            return Err(AppError::BadRequest(format!(
                "Email template '{}' is inactive",
                name
            )));
        }

        let mut vars = vars.clone();
        if !vars.contains_key("app_name") {
            if let Some(app_name) = self.settings.get("general.app_name").await? {
                vars.insert("app_name".to_string(), app_name);
            }
        }

        let missing = template.missing_variables(&vars);
        if !missing.is_empty() {
            tracing::warn!(template = name, missing = ?missing, "Template rendered with missing variables");
        }

        let rendered = template.render(&vars);
        self.send(&OutgoingEmail::from_rendered(to, rendered.clone()))
            .await?;
        Ok(rendered)
    }
}

/// Build an SMTP transport for a configuration
pub fn build_transport(config: &MailerConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let builder = match config.encryption {
        Encryption::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::Mail(format!("Failed to create SMTP transport: {}", e)))?,
        Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::Mail(format!("Failed to create SMTP transport: {}", e)))?,
        Encryption::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
    };

    let mut builder = builder
        .port(config.port)
        .timeout(Some(Duration::from_secs(config.timeout_secs)));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

/// Build a multipart (plain + html) message, or html-only without a text body
pub fn build_message(config: &MailerConfig, email: &OutgoingEmail) -> Result<Message> {
    let from_address: Address = config
        .from_address
        .parse()
        .map_err(|_| AppError::Mail(format!("Invalid from address '{}'", config.from_address)))?;

    let mut builder = Message::builder()
        .from(Mailbox::new(config.from_name.clone(), from_address))
        .subject(email.subject.clone());

    for recipient in &email.to {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid recipient '{}'", recipient)))?;
        builder = builder.to(mailbox);
    }

    let message = match &email.text {
        Some(text) => builder.multipart(MultiPart::alternative_plain_html(
            text.clone(),
            email.html.clone(),
        )),
        None => builder
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone()),
    };

    message.map_err(|e| AppError::Mail(format!("Failed to build email: {}", e)))
}

/// Open a connection to the SMTP server and run the handshake
pub async fn test_connection(config: &MailerConfig) -> Result<()> {
    let transport = build_transport(config)?;
    let reachable = transport
        .test_connection()
        .await
        .map_err(|e| AppError::Mail(format!("Connection failed: {}", e)))?;

    if reachable {
        Ok(())
    } else {
        Err(AppError::Mail(format!(
            "SMTP server {}:{} did not accept the connection",
            config.host, config.port
        )))
    }
}
