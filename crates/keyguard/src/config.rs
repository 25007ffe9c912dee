//! Loader configuration types
//!
//! All configuration is plain, immutable data passed explicitly to
//! constructors. [`LoaderConfig`] can only be obtained through
//! [`LoaderConfigBuilder::build`] or from [`LoaderSettings`], both of which
//! reject conflicting or incomplete setups up front.
//!
//! ```rust
//! use keyguard::config::{LoaderConfig, ParserLimits};
//!
//! let config = LoaderConfig::builder()
//!     .jwks_url("https://idp.example.com/protocol/openid-connect/certs")
//!     .issuer_identifier("https://idp.example.com")
//!     .parser_limits(ParserLimits::default())
//!     .build()
//!     .unwrap();
//! assert_eq!(config.issuer_identifier(), "https://idp.example.com");
//! ```

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::{Host, Url};

/// Maximum token size (8 KiB)
pub const DEFAULT_MAX_TOKEN_SIZE: usize = 8 * 1024;

/// Maximum length of a single JSON string (4 KiB)
pub const DEFAULT_MAX_STRING_SIZE: usize = 4 * 1024;

/// Maximum JSON nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Maximum size of a JSON document handed to the decoder (64 KiB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum element count of a single JSON array or object
pub const DEFAULT_MAX_ARRAY_SIZE: usize = 64;

/// Maximum HTTP response body size (1 MiB)
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No key source was configured
    #[error("No JWKS source configured: set one of jwks_url, well_known_url, jwks_file, jwks_content")]
    NoSource,

    /// More than one key source was configured
    #[error("JWKS sources are mutually exclusive, got: {}", .0.join(", "))]
    ConflictingSources(Vec<&'static str>),

    /// The issuer identifier is missing or blank
    #[error("issuer_identifier must not be empty")]
    MissingIssuer,

    /// A URL could not be parsed
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Configuration field holding the URL
        field: &'static str,
        /// Parser message
        reason: String,
    },

    /// A URL uses a scheme other than http/https
    #[error("Unsupported URL scheme '{scheme}' (only https is permitted)")]
    UnsupportedScheme {
        /// The rejected scheme
        scheme: String,
    },

    /// Plain http to a non-loopback host without `allow_insecure_http`
    #[error("Insecure URL {0}: http is only allowed for loopback hosts")]
    InsecureUrl(String),

    /// A numeric limit is zero
    #[error("Limit '{0}' must be greater than zero")]
    InvalidLimit(&'static str),

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

/// Resource limits for untrusted input
///
/// Consumed by the token gate ([`crate::token::TokenStringValidator`]) and the
/// JSON decoder ([`crate::json::BoundedJsonDecoder`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserLimits {
    /// Maximum token size in bytes (inclusive)
    pub max_token_size: usize,
    /// Maximum length of any single JSON string in bytes
    pub max_string_size: usize,
    /// Maximum structural nesting depth
    pub max_depth: usize,
    /// Maximum size of a JSON document in bytes
    pub max_buffer_size: usize,
    /// Maximum number of elements in a single array or object
    pub max_array_size: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_token_size: DEFAULT_MAX_TOKEN_SIZE,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
        }
    }
}

impl ParserLimits {
    /// Check that every limit is non-zero
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLimit`] naming the first zero limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_token_size", self.max_token_size),
            ("max_string_size", self.max_string_size),
            ("max_depth", self.max_depth),
            ("max_buffer_size", self.max_buffer_size),
            ("max_array_size", self.max_array_size),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::InvalidLimit(name)),
            None => Ok(()),
        }
    }
}

/// Bounded retry policy for retryable fetch failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one (1 = no retry)
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration_millis")]
    pub max_backoff: Duration,
    /// Backoff growth factor between retries
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor)
            .min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// TCP/TLS connect timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Whole-request timeout (including body read)
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Maximum response body size in bytes
    pub max_response_size: usize,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Permit plain http to non-loopback hosts
    pub allow_insecure_http: bool,
    /// Retry policy
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            user_agent: format!("keyguard/{}", env!("CARGO_PKG_VERSION")),
            allow_insecure_http: false,
            retry: RetryConfig::default(),
        }
    }
}

impl HttpConfig {
    /// Check that `url` may be fetched under this configuration
    ///
    /// `https` is always allowed; `http` only for loopback hosts unless
    /// [`HttpConfig::allow_insecure_http`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedScheme`] or [`ConfigError::InsecureUrl`].
    pub fn check_url(&self, url: &Url) -> Result<(), ConfigError> {
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.allow_insecure_http || is_loopback(url) => Ok(()),
            "http" => Err(ConfigError::InsecureUrl(url.to_string())),
            other => Err(ConfigError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

/// Where a key set comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksSource {
    /// Direct JWKS endpoint
    Http(Url),
    /// OIDC discovery document that names the JWKS endpoint in `jwks_uri`
    WellKnown(Url),
    /// Local JWKS file
    File(PathBuf),
    /// JWKS document given as a string
    Inline(String),
}

impl JwksSource {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            JwksSource::Http(_) => "http",
            JwksSource::WellKnown(_) => "well-known",
            JwksSource::File(_) => "file",
            JwksSource::Inline(_) => "inline",
        }
    }
}

/// Validated configuration for a [`crate::jwks::KeyLoader`]
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    source: JwksSource,
    issuer_identifier: String,
    parser_limits: ParserLimits,
    http: HttpConfig,
}

impl LoaderConfig {
    /// Create a configuration builder
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Key source
    pub fn source(&self) -> &JwksSource {
        &self.source
    }

    /// Logical issuer tag attached to events from this loader
    pub fn issuer_identifier(&self) -> &str {
        &self.issuer_identifier
    }

    /// Resource limits for decoding
    pub fn parser_limits(&self) -> &ParserLimits {
        &self.parser_limits
    }

    /// HTTP transport settings
    pub fn http(&self) -> &HttpConfig {
        &self.http
    }
}

/// Builder for [`LoaderConfig`]
#[derive(Debug, Default)]
pub struct LoaderConfigBuilder {
    jwks_url: Option<String>,
    well_known_url: Option<String>,
    jwks_file: Option<PathBuf>,
    jwks_content: Option<String>,
    issuer_identifier: Option<String>,
    parser_limits: Option<ParserLimits>,
    http: Option<HttpConfig>,
}

impl LoaderConfigBuilder {
    /// Direct JWKS endpoint
    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    /// OIDC well-known discovery endpoint
    pub fn well_known_url(mut self, url: impl Into<String>) -> Self {
        self.well_known_url = Some(url.into());
        self
    }

    /// Local JWKS file
    pub fn jwks_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.jwks_file = Some(path.into());
        self
    }

    /// JWKS document content
    pub fn jwks_content(mut self, content: impl Into<String>) -> Self {
        self.jwks_content = Some(content.into());
        self
    }

    /// Logical issuer tag
    pub fn issuer_identifier(mut self, issuer: impl Into<String>) -> Self {
        self.issuer_identifier = Some(issuer.into());
        self
    }

    /// Parser limits (defaults apply when unset)
    pub fn parser_limits(mut self, limits: ParserLimits) -> Self {
        self.parser_limits = Some(limits);
        self
    }

    /// HTTP settings (defaults apply when unset)
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = Some(http);
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if zero or several sources are set, the issuer
    /// is blank, a URL is malformed or insecure, or a limit is zero.
    pub fn build(self) -> Result<LoaderConfig, ConfigError> {
        let configured: Vec<&'static str> = [
            ("jwks_url", self.jwks_url.is_some()),
            ("well_known_url", self.well_known_url.is_some()),
            ("jwks_file", self.jwks_file.is_some()),
            ("jwks_content", self.jwks_content.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();

        if configured.len() > 1 {
            return Err(ConfigError::ConflictingSources(configured));
        }

        let http = self.http.unwrap_or_default();
        let source = if let Some(url) = self.jwks_url {
            JwksSource::Http(parse_url("jwks_url", &url, &http)?)
        } else if let Some(url) = self.well_known_url {
            JwksSource::WellKnown(parse_url("well_known_url", &url, &http)?)
        } else if let Some(path) = self.jwks_file {
            JwksSource::File(path)
        } else if let Some(content) = self.jwks_content {
            JwksSource::Inline(content)
        } else {
            return Err(ConfigError::NoSource);
        };

        let issuer_identifier = self
            .issuer_identifier
            .filter(|issuer| !issuer.trim().is_empty())
            .ok_or(ConfigError::MissingIssuer)?;

        let parser_limits = self.parser_limits.unwrap_or_default();
        parser_limits.validate()?;

        Ok(LoaderConfig {
            source,
            issuer_identifier,
            parser_limits,
            http,
        })
    }
}

fn parse_url(field: &'static str, raw: &str, http: &HttpConfig) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    http.check_url(&url)?;
    Ok(url)
}

/// Flat, deserializable loader settings
///
/// Suitable for configuration files and environment variables; convert into
/// a [`LoaderConfig`] with `LoaderConfig::try_from`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Direct JWKS endpoint
    pub jwks_url: Option<String>,
    /// OIDC discovery endpoint
    pub well_known_url: Option<String>,
    /// Local JWKS file
    pub jwks_file: Option<PathBuf>,
    /// Inline JWKS document
    pub jwks_content: Option<String>,
    /// Logical issuer tag
    pub issuer_identifier: String,
    /// Parser limits
    pub parser: ParserLimits,
    /// HTTP settings
    pub http: HttpConfig,
}

impl LoaderSettings {
    /// Load settings from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `KEYGUARD_` prefix override file
    /// settings, using `__` for nesting (e.g. `KEYGUARD_PARSER__MAX_DEPTH=8`).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, "KEYGUARD")
    }

    /// Load settings from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`LoaderSettings::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl TryFrom<LoaderSettings> for LoaderConfig {
    type Error = ConfigError;

    fn try_from(settings: LoaderSettings) -> Result<Self, Self::Error> {
        let mut builder = LoaderConfig::builder()
            .issuer_identifier(settings.issuer_identifier)
            .parser_limits(settings.parser)
            .http(settings.http);
        if let Some(url) = settings.jwks_url {
            builder = builder.jwks_url(url);
        }
        if let Some(url) = settings.well_known_url {
            builder = builder.well_known_url(url);
        }
        if let Some(path) = settings.jwks_file {
            builder = builder.jwks_file(path);
        }
        if let Some(content) = settings.jwks_content {
            builder = builder.jwks_content(content);
        }
        builder.build()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
