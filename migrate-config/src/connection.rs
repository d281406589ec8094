use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::migration::ValidationError;

/// Connection configuration for the Postgres database holding id map state.
///
/// This intentionally does not implement `Serialize`: the password must not
/// leak into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    /// Host on which the database is listening.
    pub host: String,
    /// Port on which the database is listening.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication, if required.
    pub password: Option<SecretString>,
    /// Whether to require TLS for the connection.
    #[serde(default)]
    pub require_ssl: bool,
}

impl PgConnectionConfig {
    /// Converts this configuration into sqlx connect options with the
    /// database selected.
    pub fn with_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.username)
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    /// Validates connection settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyConnectionHost);
        }

        if self.port == 0 {
            return Err(ValidationError::ZeroConnectionPort);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "migrate".to_string(),
            username: "postgres".to_string(),
            password: None,
            require_ssl: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut bad = config();
        bad.port = 0;
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::ZeroConnectionPort)
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let mut with_password = config();
        with_password.password = Some(SecretString::new("hunter2".to_string()));

        let rendered = format!("{with_password:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
