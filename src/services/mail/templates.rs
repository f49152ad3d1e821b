use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::email_template::{self, placeholders};
use crate::models::prelude::*;

fn default_category() -> String {
    "general".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct EmailTemplateInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, message = "HTML body is required"))]
    pub body_html: String,
    pub body_text: Option<String>,
    /// Declared placeholders; derived from the bodies when omitted
    pub variables: Option<Vec<String>>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl EmailTemplateInput {
    fn variables_json(&self) -> Result<String> {
        let vars: Vec<String> = match &self.variables {
            Some(vars) => vars.clone(),
            None => {
                let mut found = placeholders(&self.subject);
                found.extend(placeholders(&self.body_html));
                if let Some(text) = &self.body_text {
                    found.extend(placeholders(text));
                }
                found.into_iter().collect()
            }
        };
        Ok(serde_json::to_string(&vars)?)
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TemplatePreview {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    /// Placeholders left intact because no value was given
    pub missing_variables: Vec<String>,
}

pub async fn list(db: &DbConn) -> Result<Vec<email_template::Model>> {
    Ok(EmailTemplate::find()
        .order_by_asc(email_template::Column::Category)
        .order_by_asc(email_template::Column::Name)
        .all(db)
        .await?)
}

pub async fn get(db: &DbConn, id: i64) -> Result<email_template::Model> {
    EmailTemplate::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Email template {} not found", id)))
}

pub async fn get_by_name(db: &DbConn, name: &str) -> Result<email_template::Model> {
    EmailTemplate::find()
        .filter(email_template::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Email template '{}' not found", name)))
}

pub async fn create(db: &DbConn, input: EmailTemplateInput) -> Result<email_template::Model> {
    input.validate()?;
    let name = input.name.trim().to_string();

    let existing = EmailTemplate::find()
        .filter(email_template::Column::Name.eq(&name))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Email template '{}' already exists",
            name
        )));
    }

    let now = Utc::now();
    let created = email_template::ActiveModel {
        name: Set(name),
        subject: Set(input.subject.clone()),
        body_html: Set(input.body_html.clone()),
        body_text: Set(input.body_text.clone()),
        variables: Set(input.variables_json()?),
        category: Set(input.category.clone()),
        is_active: Set(input.is_active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(created)
}

pub async fn update(db: &DbConn, id: i64, input: EmailTemplateInput) -> Result<email_template::Model> {
    input.validate()?;
    let existing = get(db, id).await?;
    let name = input.name.trim().to_string();

    let clash = EmailTemplate::find()
        .filter(email_template::Column::Name.eq(&name))
        .filter(email_template::Column::Id.ne(id))
        .one(db)
        .await?;
    if clash.is_some() {
        return Err(AppError::Conflict(format!(
            "Email template '{}' already exists",
            name
        )));
    }

    let mut active: email_template::ActiveModel = existing.into();
    active.name = Set(name);
    active.subject = Set(input.subject.clone());
    active.body_html = Set(input.body_html.clone());
    active.body_text = Set(input.body_text.clone());
    active.variables = Set(input.variables_json()?);
    active.category = Set(input.category.clone());
    active.is_active = Set(input.is_active);
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

pub async fn delete(db: &DbConn, id: i64) -> Result<()> {
    let result = EmailTemplate::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound(format!("Email template {} not found", id)));
    }
    Ok(())
}

pub fn preview_template(template: &email_template::Model, vars: &HashMap<String, String>) -> TemplatePreview {
    let rendered = template.render(vars);
    TemplatePreview {
        subject: rendered.subject,
        html: rendered.html,
        text: rendered.text,
        missing_variables: template.missing_variables(vars),
    }
}

pub async fn preview(db: &DbConn, id: i64, vars: &HashMap<String, String>) -> Result<TemplatePreview> {
    let template = get(db, id).await?;
    Ok(preview_template(&template, vars))
}
