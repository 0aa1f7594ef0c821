//! Server configuration from environment variables

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// All environment the server consumes, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database DSN (`FOUNDRY_DATABASE_URL`).
    pub database_url: String,
    /// Bind address (`HOST` / `PORT`).
    pub bind_address: String,
    /// 32-byte base64 symmetric key for workflow environments
    /// (`FOUNDRY_ENCRYPTION_KEY`).
    pub encryption_key: String,
    /// HS256 secret for execution-token claims (`FOUNDRY_TOKEN_SECRET`).
    pub token_secret: String,
    /// Container platform credentials.
    pub platform_base_url: String,
    pub platform_api_token: String,
    pub platform_project_id: String,
    pub platform_environment_id: String,
    /// Default remote-execution image tag (`FOUNDRY_DEFAULT_IMAGE`).
    pub default_image: String,
    /// Public base URL containers call back (`FOUNDRY_ENDPOINT_URL`).
    pub endpoint_url: String,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = optional("HOST", "127.0.0.1");
        let port = optional("PORT", "8080");
        port.parse::<u16>().map_err(|e| ConfigError::Invalid {
            name: "PORT",
            reason: e.to_string(),
        })?;

        Ok(Self {
            database_url: optional("FOUNDRY_DATABASE_URL", "sqlite:foundry.db?mode=rwc"),
            bind_address: format!("{host}:{port}"),
            encryption_key: required("FOUNDRY_ENCRYPTION_KEY")?,
            token_secret: required("FOUNDRY_TOKEN_SECRET")?,
            platform_base_url: optional("FOUNDRY_PLATFORM_URL", "https://backboard.railway.app"),
            platform_api_token: optional("FOUNDRY_PLATFORM_TOKEN", ""),
            platform_project_id: optional("FOUNDRY_PLATFORM_PROJECT", ""),
            platform_environment_id: optional("FOUNDRY_PLATFORM_ENVIRONMENT", ""),
            default_image: optional("FOUNDRY_DEFAULT_IMAGE", "foundry-runner:latest"),
            endpoint_url: optional("FOUNDRY_ENDPOINT_URL", format!("http://{host}:{port}").as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_key_is_reported() {
        // from_env reads the process environment; only assert the error type
        // for a variable we can be sure is absent.
        std::env::remove_var("FOUNDRY_ENCRYPTION_KEY");
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
