use std::collections::{BTreeSet, HashMap};

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_templates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    /// JSON array of declared placeholder names
    pub variables: String,
    pub category: String,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// A template with its placeholders substituted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

impl Model {
    /// Declared variables, falling back to placeholders found in the bodies
    pub fn declared_variables(&self) -> Vec<String> {
        match serde_json::from_str::<Vec<String>>(&self.variables) {
            Ok(vars) if !vars.is_empty() => vars,
            _ => self.used_placeholders().into_iter().collect(),
        }
    }

    /// Every placeholder referenced by subject, html and text bodies
    pub fn used_placeholders(&self) -> BTreeSet<String> {
        let mut names = placeholders(&self.subject);
        names.extend(placeholders(&self.body_html));
        if let Some(text) = &self.body_text {
            names.extend(placeholders(text));
        }
        names
    }

    /// Placeholders that `vars` does not provide a value for
    pub fn missing_variables(&self, vars: &HashMap<String, String>) -> Vec<String> {
        self.used_placeholders()
            .into_iter()
            .filter(|name| !vars.contains_key(name))
            .collect()
    }

    pub fn render(&self, vars: &HashMap<String, String>) -> RenderedEmail {
        RenderedEmail {
            subject: render_str(&self.subject, vars),
            html: render_str(&self.body_html, vars),
            text: self.body_text.as_deref().map(|t| render_str(t, vars)),
        }
    }
}

/// Walk `{{ name }}` occurrences, calling `f` with (name, raw placeholder)
fn scan<'a>(input: &'a str, mut f: impl FnMut(&'a str, &'a str)) {
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if is_placeholder_name(name) {
            f(name, &rest[start..start + 2 + end + 2]);
        }
        rest = &after[end + 2..];
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Extract placeholder names from a template string
pub fn placeholders(input: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    scan(input, |name, _| {
        names.insert(name.to_string());
    });
    names
}

/// Substitute known placeholders; unknown ones are left intact
pub fn render_str(input: &str, vars: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        output.push_str(&rest[..start]);
        match vars.get(name) {
            Some(value) if is_placeholder_name(name) => output.push_str(value),
            _ => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (ToString::to_string(&k), ToString::to_string(&v)))
            .collect()
    }

    #[test]
    fn test_placeholders_allow_whitespace() {
        let names = placeholders("Hello {{name}}, {{ app.name }} says {{  name }}");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["app.name".to_string(), "name".to_string()]
        );
    }

    #[test]
    fn test_render_substitutes_known_and_keeps_unknown() {
        let out = render_str(
            "Hi {{ name }}, reset at {{url}} ({{ missing }})",
            &vars(&[("name", "Ada"), ("url", "https://x/reset")]),
        );
        assert_eq!(out, "Hi Ada, reset at https://x/reset ({{ missing }})");
    }

    #[test]
    fn test_render_handles_unterminated_braces() {
        let out = render_str("Total {{ amount", &vars(&[("amount", "5")]));
        assert_eq!(out, "Total {{ amount");
    }

    #[test]
    fn test_non_identifier_braces_are_not_placeholders() {
        assert!(placeholders("{{ not a var }} {{}}").is_empty());
    }
}
