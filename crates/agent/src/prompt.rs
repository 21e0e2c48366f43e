//! System prompt rendering.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tally_core::domain::time_entry::UserId;
use tera::{Context, Tera};
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a time-tracking assistant. Today is {{ today }} and you act for user `{{ user_id }}`.

Resolve relative dates such as \"yesterday\" or \"Wednesday\" against today's date and pass \
dates to tools as YYYY-MM-DD.

Before booking, look up the project with getProjects and use its projectId. Hours are booked \
in quarter-hour steps between 0 and 24.

Every booking, update or deletion is reviewed by a human before it runs. If a call is \
rejected, explain what happened and ask how to continue instead of retrying the same call.

Use getDatabaseSchema and executeQuery, when available, only to read data. Time entries are \
created with bookTimeEntry.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render prompt template: {0}")]
    Render(#[from] tera::Error),
}

/// Reads the configured template, or falls back to the built-in one.
pub fn load_template(path: Option<&Path>) -> Result<String, PromptError> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|source| PromptError::Read { path: path.to_path_buf(), source }),
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

pub fn render_system_prompt(
    template: &str,
    today: NaiveDate,
    user_id: &UserId,
) -> Result<String, PromptError> {
    let mut context = Context::new();
    context.insert("today", &today.format("%Y-%m-%d").to_string());
    context.insert("user_id", &user_id.0);
    Ok(Tera::one_off(template, &context, false)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;
    use tally_core::domain::time_entry::UserId;

    use super::{load_template, render_system_prompt, PromptError, DEFAULT_SYSTEM_PROMPT};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).expect("valid date")
    }

    #[test]
    fn default_template_mentions_today_and_user() {
        let prompt = render_system_prompt(DEFAULT_SYSTEM_PROMPT, today(), &UserId("user123".into()))
            .expect("render");

        assert!(prompt.contains("Today is 2025-04-14"));
        assert!(prompt.contains("`user123`"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn template_file_overrides_default() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "Date: {{{{ today }}}}").expect("write template");

        let template = load_template(Some(file.path())).expect("load");
        let prompt = render_system_prompt(&template, today(), &UserId("u".into())).expect("render");

        assert_eq!(prompt, "Date: 2025-04-14");
    }

    #[test]
    fn missing_file_and_bad_syntax_are_errors() {
        let missing = load_template(Some(std::path::Path::new("/nonexistent/prompt.txt")));
        let broken = render_system_prompt("{{ today", today(), &UserId("u".into()));

        assert!(matches!(missing, Err(PromptError::Read { .. })));
        assert!(matches!(broken, Err(PromptError::Render(_))));
    }
}
