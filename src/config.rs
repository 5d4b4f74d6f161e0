use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: PathBuf,
        field: String,
        value: String,
        valid_values: Vec<String>,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(
                    f,
                    "Failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Invalid TOML syntax in {}: {}", path.display(), source)
            }
            ConfigError::InvalidValue {
                path,
                field,
                value,
                valid_values,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for '{}' in {}\n  Valid values: {}",
                    value,
                    field,
                    path.display(),
                    valid_values.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}

/// Configuration loaded from `~/.config/dashrewrite/config.toml`.
///
/// Every field has a default, so an absent file or an empty section is valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub rewrite: RewriteConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rewrite service endpoint.
///
/// Example in `config.toml`:
/// ```toml
/// [api]
/// base_url = "https://irving.dev"
/// authorization_scheme = "Bearer"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_rewrite_path")]
    pub rewrite_path: String,
    /// Time allowed until response headers arrive (default: 120).
    /// `0` waits indefinitely. The body read is never bounded.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Scheme prepended to the token in the Authorization header.
    /// Unset sends the raw token, which is what the rewrite service expects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_scheme: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:4321".to_string()
}

fn default_rewrite_path() -> String {
    "/api/v1/applications/rewrite".to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            rewrite_path: default_rewrite_path(),
            timeout_secs: default_timeout(),
            authorization_scheme: None,
        }
    }
}

impl ApiConfig {
    pub fn rewrite_url(&self) -> String {
        [self.base_url.trim_end_matches('/'), &self.rewrite_path].concat()
    }
}

/// Input limits applied before a request is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Maximum input length in characters (default: 1000)
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Input must be longer than this many characters; 0 disables the check
    #[serde(default)]
    pub min_length: usize,
}

fn default_max_length() -> usize {
    1000
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            min_length: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Silent anonymous sign-in against the identity service
    Anonymous,
    /// Fixed token from config, `--token` or `DASHREWRITE_TOKEN`
    Token,
}

impl AuthMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anonymous" | "anon" => Some(AuthMode::Anonymous),
            "token" | "static" => Some(AuthMode::Token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// "anonymous" or "token"
    #[serde(default = "default_auth_mode")]
    pub mode: String,
    /// Web API key of the identity project (anonymous mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_sign_up_url")]
    pub sign_up_url: String,
    #[serde(default = "default_refresh_url")]
    pub refresh_url: String,
}

fn default_auth_mode() -> String {
    "anonymous".to_string()
}

fn default_sign_up_url() -> String {
    "https://identitytoolkit.googleapis.com/v1/accounts:signUp".to_string()
}

fn default_refresh_url() -> String {
    "https://securetoken.googleapis.com/v1/token".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            api_key: None,
            token: None,
            sign_up_url: default_sign_up_url(),
            refresh_url: default_refresh_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    pub fn dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dashrewrite")
    }

    pub fn path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String, valid: &[&str]| ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: field.to_string(),
            value,
            valid_values: valid.iter().map(|v| v.to_string()).collect(),
        };

        if AuthMode::parse(&self.auth.mode).is_none() {
            return Err(invalid(
                "auth.mode",
                self.auth.mode.clone(),
                &["anonymous", "token"],
            ));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(invalid(
                "api.base_url",
                self.api.base_url.clone(),
                &["http://...", "https://..."],
            ));
        }

        if !self.api.rewrite_path.starts_with('/') {
            return Err(invalid(
                "api.rewrite_path",
                self.api.rewrite_path.clone(),
                &["a path starting with '/'"],
            ));
        }

        if self.rewrite.max_length == 0 {
            return Err(invalid(
                "rewrite.max_length",
                "0".to_string(),
                &["a positive number"],
            ));
        }

        if self.rewrite.min_length >= self.rewrite.max_length {
            return Err(invalid(
                "rewrite.min_length",
                self.rewrite.min_length.to_string(),
                &["a number below rewrite.max_length"],
            ));
        }

        Ok(())
    }

    /// Check that the selected auth mode has what it needs. Run after
    /// [`Config::with_overrides`], since the token may come from the CLI or env.
    pub fn validate_auth(&self) -> Result<(), ConfigError> {
        if self.auth_mode() == AuthMode::Token && self.auth.token.is_none() {
            return Err(ConfigError::InvalidValue {
                path: Self::path(),
                field: "auth.token".to_string(),
                value: String::new(),
                valid_values: vec![
                    "a token (auth.token, --token or DASHREWRITE_TOKEN)".to_string(),
                ],
            });
        }
        Ok(())
    }

    pub fn auth_mode(&self) -> AuthMode {
        AuthMode::parse(&self.auth.mode).unwrap_or(AuthMode::Anonymous)
    }

    /// Apply CLI flags and environment variables on top of the file config.
    /// A token from either source switches the auth mode to `token`.
    pub fn with_overrides(
        mut self,
        base_url: Option<String>,
        token: Option<String>,
        debug: bool,
    ) -> Self {
        if let Some(url) = base_url {
            self.api.base_url = url;
        }
        if let Ok(key) = std::env::var("DASHREWRITE_API_KEY") {
            self.auth.api_key = Some(key);
        }
        if let Some(token) = token.or_else(|| std::env::var("DASHREWRITE_TOKEN").ok()) {
            self.auth.token = Some(token);
            self.auth.mode = "token".to_string();
        }
        if debug {
            self.logging.debug = true;
        }
        self
    }
}
