use std::env;
use std::fs;
use std::path::Path;

use tally_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

/// One reported setting: dotted key, rendered value, env vars that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    overridden: bool,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config, options) {
        let source = if field.overridden {
            "flag".to_string()
        } else {
            field_source(
                field.key,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            )
        };
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig, options: &LoadOptions) -> Vec<Field> {
    let overrides = &options.overrides;
    let api_key = if config.has_llm_credentials() { "<redacted>" } else { "<unset>" };

    vec![
        Field {
            key: "api.base_url",
            value: config.api.base_url.clone(),
            env_keys: &["TALLY_API_BASE_URL"],
            overridden: overrides.api_base_url.is_some(),
        },
        Field {
            key: "api.user_id",
            value: config.api.user_id.clone(),
            env_keys: &["TALLY_API_USER_ID"],
            overridden: overrides.api_user_id.is_some(),
        },
        Field {
            key: "api.timeout_secs",
            value: config.api.timeout_secs.to_string(),
            env_keys: &["TALLY_API_TIMEOUT_SECS"],
            overridden: false,
        },
        Field {
            key: "llm.api_key",
            value: api_key.to_string(),
            env_keys: &["TALLY_LLM_API_KEY", "ANTHROPIC_API_KEY"],
            overridden: overrides.llm_api_key.is_some(),
        },
        Field {
            key: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["TALLY_LLM_BASE_URL"],
            overridden: false,
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["TALLY_LLM_MODEL"],
            overridden: overrides.llm_model.is_some(),
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["TALLY_LLM_TIMEOUT_SECS"],
            overridden: false,
        },
        Field {
            key: "llm.max_tokens",
            value: config.llm.max_tokens.to_string(),
            env_keys: &["TALLY_LLM_MAX_TOKENS"],
            overridden: false,
        },
        Field {
            key: "database.url",
            value: config
                .database
                .url
                .as_deref()
                .map(redact_url)
                .unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["TALLY_DATABASE_URL"],
            overridden: overrides.database_url.is_some(),
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["TALLY_DATABASE_MAX_CONNECTIONS"],
            overridden: false,
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["TALLY_DATABASE_TIMEOUT_SECS"],
            overridden: false,
        },
        Field {
            key: "agent.max_steps",
            value: config.agent.max_steps.to_string(),
            env_keys: &["TALLY_AGENT_MAX_STEPS"],
            overridden: false,
        },
        Field {
            key: "agent.prompt_path",
            value: config
                .agent
                .prompt_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<built-in>".to_string()),
            env_keys: &["TALLY_AGENT_PROMPT_PATH"],
            overridden: false,
        },
        Field {
            key: "agent.session_dir",
            value: config.agent.session_dir.display().to_string(),
            env_keys: &["TALLY_AGENT_SESSION_DIR"],
            overridden: overrides.session_dir.is_some(),
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["TALLY_LOGGING_LEVEL", "TALLY_LOG_LEVEL"],
            overridden: overrides.log_level.is_some(),
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["TALLY_LOGGING_FORMAT", "TALLY_LOG_FORMAT"],
            overridden: false,
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Hides credentials embedded in a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
