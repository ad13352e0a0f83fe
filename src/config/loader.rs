//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AuthzConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable that overrides `backend.token`.
pub const TOKEN_ENV: &str = "AUTHZ_BACKEND_TOKEN";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AuthzConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config = load_config_str(&content)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
///
/// Environment overrides apply either way. Returns whether the file existed.
pub fn load_config_or_default(path: &Path) -> Result<(AuthzConfig, bool), ConfigError> {
    if path.exists() {
        return load_config(path).map(|config| (config, true));
    }
    let mut config = AuthzConfig::default();
    apply_env_overrides(&mut config);
    Ok((config, false))
}

/// Apply `AUTHZ_BACKEND_TOKEN` on top of whatever the file said.
pub fn apply_env_overrides(config: &mut AuthzConfig) {
    apply_token(config, std::env::var(TOKEN_ENV).ok());
}

fn apply_token(config: &mut AuthzConfig, token: Option<String>) {
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        config.backend.token = Some(token);
    }
}

/// Parse and validate configuration from TOML text.
pub fn load_config_str(content: &str) -> Result<AuthzConfig, ConfigError> {
    let config: AuthzConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_text_loads() {
        let config = load_config_str(
            r#"
            [backend]
            endpoint = "https://authz.internal:8443"

            [cache]
            max_entries = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.endpoint, "https://authz.internal:8443");
        assert_eq!(config.cache.max_entries, 50);
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = load_config_str("[cache\nmax_entries = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_semantic_errors_are_all_reported() {
        let err = load_config_str(
            r#"
            [cache]
            max_entries = 0

            [circuit]
            failure_threshold = 0
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_token_override() {
        let mut config = AuthzConfig::default();
        apply_token(&mut config, Some("from-env".to_string()));
        assert_eq!(config.backend.token.as_deref(), Some("from-env"));

        apply_token(&mut config, Some(String::new()));
        apply_token(&mut config, None);
        assert_eq!(config.backend.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let (config, found) =
            load_config_or_default(Path::new("/nonexistent/authz.toml")).unwrap();
        assert!(!found);
        assert_eq!(config.cache.max_entries, AuthzConfig::default().cache.max_entries);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/authz.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
