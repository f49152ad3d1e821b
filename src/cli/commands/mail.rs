use std::collections::HashMap;

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{self, print_table};
use crate::services::mail::{smtp, templates, test_connection, OutgoingEmail};
use crate::state::AppState;

const TEST_TEMPLATE: &str = "test_email";

#[derive(Debug, Subcommand)]
pub enum MailCommand {
    /// Send the test email template to an address
    Test {
        email: String,
        /// SMTP configuration id; the default configuration otherwise
        #[arg(long)]
        config: Option<i64>,
    },
    /// List email templates
    Templates,
    /// List SMTP configurations and their problems
    Configs {
        /// Also open a connection to every valid configuration
        #[arg(long)]
        connect: bool,
    },
}

pub async fn run(state: &AppState, command: MailCommand) -> Result<()> {
    match command {
        MailCommand::Test { email, config } => {
            let vars: HashMap<String, String> =
                [("sent_at".to_string(), chrono::Utc::now().to_rfc2822())]
                    .into_iter()
                    .collect();

            match config {
                Some(id) => {
                    let stored = smtp::get(&state.db, id).await?;
                    let mailer = stored
                        .to_mailer_config()
                        .map_err(|e| anyhow::anyhow!("SMTP config {} is invalid: {}", id, e))?;
                    let mut vars = vars;
                    if let Some(app_name) = state.settings.get("general.app_name").await? {
                        vars.insert("app_name".to_string(), app_name);
                    }
                    let rendered = templates::get_by_name(&state.db, TEST_TEMPLATE)
                        .await?
                        .render(&vars);
                    state
                        .mail
                        .send_with(&mailer, &OutgoingEmail::from_rendered(vec![email.clone()], rendered))
                        .await?;
                    output::success(format!("Test email sent to {} via {}", email, stored.name));
                }
                None => {
                    state
                        .mail
                        .send_template(TEST_TEMPLATE, vec![email.clone()], &vars)
                        .await?;
                    output::success(format!(
                        "Test email sent to {} ({} driver)",
                        email,
                        state.mail.driver().as_str()
                    ));
                }
            }
        }
        MailCommand::Templates => {
            let rows: Vec<Vec<String>> = templates::list(&state.db)
                .await?
                .into_iter()
                .map(|t| {
                    let variables = t.declared_variables().join(", ");
                    vec![
                        t.id.to_string(),
                        t.name,
                        t.category,
                        if t.is_active { "yes" } else { "no" }.to_string(),
                        variables,
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Category", "Active", "Variables"], &rows);
        }
        MailCommand::Configs { connect } => {
            let mut rows = Vec::new();
            let mut broken = 0;
            for config in smtp::list(&state.db).await? {
                let problems = config.validate();
                let mut state_label = if problems.is_empty() {
                    "valid".to_string()
                } else {
                    broken += 1;
                    problems.join("; ")
                };
                if connect && problems.is_empty() {
                    if let Ok(mailer) = config.to_mailer_config() {
                        if let Err(e) = test_connection(&mailer).await {
                            broken += 1;
                            state_label = e.to_string();
                        }
                    }
                }
                rows.push(vec![
                    config.id.to_string(),
                    config.name,
                    format!("{}:{}", config.host, config.port),
                    if config.is_default { "yes" } else { "no" }.to_string(),
                    state_label,
                ]);
            }
            print_table(&["ID", "Name", "Server", "Default", "State"], &rows);
            if broken > 0 {
                anyhow::bail!("{} SMTP configuration(s) have problems", broken);
            }
        }
    }
    Ok(())
}
