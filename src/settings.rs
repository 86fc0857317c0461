use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::refresh::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_REFRESH_BUFFER, MAX_CHECK_INTERVAL, MIN_CHECK_INTERVAL,
};
use crate::session::token_store::ACCESS_TOKEN_FILE;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionwardSettings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the GoTrue-style auth API, e.g. `https://<project>.supabase.co/auth/v1`
    pub url: String,

    // Direct value (can be overridden by the environment variable named below)
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,

    /// Where the provider keeps its own session between restarts
    pub session_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seconds between access-token expiry checks
    pub refresh_check_interval_secs: u64,
    /// Refresh once the token expires within this many seconds
    pub refresh_buffer_secs: u64,
    /// File holding the access token for other HTTP clients
    pub token_path: String,
    /// Route requested after logout
    pub login_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `env_logger` filter directives, e.g. `info` or `sessionward=debug`
    pub level: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9999".to_string(),
            api_key: None,
            api_key_env: None,
            session_file: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_check_interval_secs: DEFAULT_CHECK_INTERVAL.as_secs(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER.as_secs(),
            token_path: ACCESS_TOKEN_FILE.to_string(),
            login_path: "/login".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SessionwardSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    /// - A value is out of range
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let (mut settings, sources) = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Self::initialize_logging(&settings.logging)?;

        for source in sources {
            log::info!("{source}");
        }
        settings.session.validate()?;

        Ok(settings)
    }

    /// Initialize the logger from the resolved `[logging]` section
    ///
    /// # Errors
    ///
    /// Returns an error if a logger is already installed
    fn initialize_logging(logging: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::new()
            .parse_filters(&logging.level)
            .try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `SESSIONWARD_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    ///
    /// The logger is not installed yet, so the notes on where settings came
    /// from are handed back for the caller to log.
    fn load_base_settings() -> Result<(Self, Vec<String>), Box<dyn std::error::Error>> {
        let mut settings = Self::default();
        let mut sources = Vec::new();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = Self::from_toml(&toml_content)?;
            sources.push(format!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            ));
        }

        if let Ok(secrets_dir) = std::env::var("SESSIONWARD_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = Self::from_toml(&secrets_toml_content)?;
                sources.push(format!("✓ Overriding settings from {}", secrets_path.display()));
            } else {
                sources.push(format!(
                    "ℹ SESSIONWARD_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                ));
            }
        }

        Ok((settings, sources))
    }

    /// Parse settings from TOML text; missing sections and keys fall back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed
    pub fn from_toml(content: &str) -> Result<Self, basic_toml::Error> {
        basic_toml::from_str(content)
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    /// Apply environment overrides for provider settings
    pub fn apply_provider_env_overrides(provider_settings: &mut ProviderSettings) {
        if let Ok(url) = std::env::var("PROVIDER_URL") {
            provider_settings.url = url;
        }
        if let Ok(api_key) = std::env::var("PROVIDER_API_KEY") {
            if !api_key.is_empty() {
                provider_settings.api_key = Some(api_key);
            }
        }
        if let Ok(session_file) = std::env::var("PROVIDER_SESSION_FILE") {
            provider_settings.session_file = (!session_file.is_empty()).then_some(session_file);
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        Self::apply_numeric_env_override(
            "REFRESH_CHECK_INTERVAL_SECS",
            &mut session_settings.refresh_check_interval_secs,
        );
        Self::apply_numeric_env_override(
            "REFRESH_BUFFER_SECS",
            &mut session_settings.refresh_buffer_secs,
        );
        if let Ok(token_path) = std::env::var("TOKEN_PATH") {
            session_settings.token_path = token_path;
        }
        if let Ok(login_path) = std::env::var("LOGIN_PATH") {
            session_settings.login_path = login_path;
        }
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}

impl ProviderSettings {
    /// Get the API key, checking the named environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(env_var) = &self.api_key_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.api_key.clone()
    }
}

impl SessionSettings {
    /// Check that the refresh interval is one the timer can run with
    ///
    /// # Errors
    ///
    /// Returns a description of the offending value
    pub fn validate(&self) -> Result<(), String> {
        let interval = self.refresh_check_interval();
        if interval < MIN_CHECK_INTERVAL || interval > MAX_CHECK_INTERVAL {
            return Err(format!(
                "refresh_check_interval_secs must be between {} and {}, got {}",
                MIN_CHECK_INTERVAL.as_secs(),
                MAX_CHECK_INTERVAL.as_secs(),
                self.refresh_check_interval_secs
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn refresh_check_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_check_interval_secs)
    }

    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clean_env_vars() {
        for var in [
            "PROVIDER_URL",
            "PROVIDER_API_KEY",
            "PROVIDER_SESSION_FILE",
            "REFRESH_CHECK_INTERVAL_SECS",
            "REFRESH_BUFFER_SECS",
            "TOKEN_PATH",
            "LOGIN_PATH",
            "SESSIONWARD_SECRETS_DIR",
            "SESSIONWARD_TEST_API_KEY",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_session_defaults() {
        let session = SessionSettings::default();
        assert_eq!(session.refresh_check_interval(), Duration::from_secs(60));
        assert_eq!(session.refresh_buffer(), Duration::from_secs(300));
        assert_eq!(session.login_path, "/login");
        assert_eq!(session.token_path, "access_token");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = SessionwardSettings::from_toml(
            r#"
            [provider]
            url = "https://auth.example.com/auth/v1"
            api_key = "anon-key"
            "#,
        )
        .unwrap();

        assert_eq!(settings.provider.url, "https://auth.example.com/auth/v1");
        assert_eq!(settings.provider.get_api_key().as_deref(), Some("anon-key"));
        assert_eq!(settings.session.refresh_buffer_secs, 300);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_section_keeps_field_defaults() {
        let settings = SessionwardSettings::from_toml(
            r#"
            [session]
            login_path = "/entrar"

            [logging]
            "#,
        )
        .unwrap();

        assert_eq!(settings.session.login_path, "/entrar");
        assert_eq!(settings.session.refresh_check_interval_secs, 60);
        assert_eq!(settings.session.token_path, "access_token");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_refresh_interval_bounds() {
        assert!(SessionSettings::default().validate().is_ok());

        let at_limit = SessionSettings {
            refresh_check_interval_secs: MAX_CHECK_INTERVAL.as_secs(),
            ..SessionSettings::default()
        };
        assert!(at_limit.validate().is_ok());

        for secs in [0, MAX_CHECK_INTERVAL.as_secs() + 1, u64::MAX] {
            let settings = SessionSettings {
                refresh_check_interval_secs: secs,
                ..SessionSettings::default()
            };
            let err = settings.validate().unwrap_err();
            assert!(err.contains("refresh_check_interval_secs"));
        }
    }

    #[test]
    #[serial]
    fn test_out_of_range_env_interval_is_rejected() {
        clean_env_vars();

        let mut session_settings = SessionSettings::default();
        std::env::set_var("REFRESH_CHECK_INTERVAL_SECS", u64::MAX.to_string());
        SessionwardSettings::apply_session_env_overrides(&mut session_settings);

        assert_eq!(session_settings.refresh_check_interval_secs, u64::MAX);
        assert!(session_settings.validate().is_err());

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_session_env_override() {
        clean_env_vars();

        let mut session_settings = SessionSettings::default();
        std::env::set_var("REFRESH_CHECK_INTERVAL_SECS", "15");
        std::env::set_var("REFRESH_BUFFER_SECS", "not-a-number");
        std::env::set_var("LOGIN_PATH", "/signin");

        SessionwardSettings::apply_session_env_overrides(&mut session_settings);

        assert_eq!(session_settings.refresh_check_interval_secs, 15);
        assert_eq!(session_settings.refresh_buffer_secs, 300);
        assert_eq!(session_settings.login_path, "/signin");

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_provider_env_override() {
        clean_env_vars();

        let mut provider_settings = ProviderSettings::default();
        std::env::set_var("PROVIDER_URL", "https://override.example.com/auth/v1");
        std::env::set_var("PROVIDER_API_KEY", "env-key");
        std::env::set_var("PROVIDER_SESSION_FILE", "/tmp/session.json");

        SessionwardSettings::apply_provider_env_overrides(&mut provider_settings);

        assert_eq!(provider_settings.url, "https://override.example.com/auth/v1");
        assert_eq!(provider_settings.api_key.as_deref(), Some("env-key"));
        assert_eq!(
            provider_settings.session_file.as_deref(),
            Some("/tmp/session.json")
        );

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_api_key_env_indirection() {
        clean_env_vars();

        let provider_settings = ProviderSettings {
            api_key: Some("direct-key".to_string()),
            api_key_env: Some("SESSIONWARD_TEST_API_KEY".to_string()),
            ..Default::default()
        };
        assert_eq!(provider_settings.get_api_key().as_deref(), Some("direct-key"));

        std::env::set_var("SESSIONWARD_TEST_API_KEY", "indirect-key");
        assert_eq!(
            provider_settings.get_api_key().as_deref(),
            Some("indirect-key")
        );

        clean_env_vars();
    }
}
