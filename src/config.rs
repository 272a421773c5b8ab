//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup; secrets are kept in memory for the lifetime of
//! the process and never logged.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Which credential store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Which media relay images are pushed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaBackend {
    Cloudinary {
        cloud_name: String,
        api_key: String,
        api_secret: String,
    },
    Local {
        dir: PathBuf,
        base_url: String,
    },
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Allowed CORS origin (credentials are allowed for it)
    pub cors_origin: String,

    // --- Credential store ---
    pub store_backend: StoreBackend,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Firestore database name
    pub database_name: String,

    // --- Session tokens ---
    pub access_token_secret: Vec<u8>,
    pub access_token_expiry: Duration,
    pub refresh_token_secret: Vec<u8>,
    pub refresh_token_expiry: Duration,

    // --- Uploads ---
    pub media_backend: MediaBackend,
    /// Where multipart files are staged before being relayed
    pub upload_staging_dir: PathBuf,
    pub upload_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Deterministic config for tests: in-memory store, local media relay
    /// under a fresh temp directory.
    pub fn test_default() -> Self {
        let root = env::temp_dir().join(format!("accounts-api-test-{}", uuid::Uuid::new_v4()));
        Self {
            port: 8080,
            cors_origin: "http://localhost:5173".to_string(),
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            database_name: "(default)".to_string(),
            access_token_secret: b"test_access_secret_32_bytes_min!".to_vec(),
            access_token_expiry: Duration::from_secs(15 * 60),
            refresh_token_secret: b"test_refresh_secret_32_bytes_mn!".to_vec(),
            refresh_token_expiry: Duration::from_secs(10 * 24 * 60 * 60),
            media_backend: MediaBackend::Local {
                dir: root.join("media"),
                base_url: "http://localhost:8080/media".to_string(),
            },
            upload_staging_dir: root.join("temp"),
            upload_timeout: Duration::from_secs(5),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => return Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        };

        let media_backend = match env::var("MEDIA_BACKEND")
            .unwrap_or_else(|_| "cloudinary".to_string())
            .as_str()
        {
            "cloudinary" => MediaBackend::Cloudinary {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
            },
            "local" => MediaBackend::Local {
                dir: env::var("LOCAL_MEDIA_DIR")
                    .unwrap_or_else(|_| "public/media".to_string())
                    .into(),
                base_url: env::var("LOCAL_MEDIA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/media".to_string()),
            },
            other => return Err(ConfigError::Invalid("MEDIA_BACKEND", other.to_string())),
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            store_backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            database_name: env::var("FIRESTORE_DATABASE")
                .unwrap_or_else(|_| "(default)".to_string()),
            access_token_secret: required("ACCESS_TOKEN_SECRET")?.into_bytes(),
            access_token_expiry: expiry("ACCESS_TOKEN_EXPIRY", "1d")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?.into_bytes(),
            refresh_token_expiry: expiry("REFRESH_TOKEN_EXPIRY", "10d")?,
            media_backend,
            upload_staging_dir: env::var("UPLOAD_STAGING_DIR")
                .unwrap_or_else(|_| "public/temp".to_string())
                .into(),
            upload_timeout: Duration::from_secs(
                env::var("UPLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn expiry(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_expiry(&raw).ok_or(ConfigError::Invalid(name, raw))
}

/// Parse a token lifetime like `15m`, `1d`, `12h`, `30s` or bare seconds.
pub fn parse_expiry(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&raw[..idx], c),
        _ => (raw, 's'),
    };
    let n: u64 = digits.parse().ok()?;
    let secs = match unit {
        's' => n,
        'm' => n.checked_mul(60)?,
        'h' => n.checked_mul(60 * 60)?,
        'd' => n.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expiry_units() {
        assert_eq!(parse_expiry("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_expiry("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_expiry("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_expiry("10d"), Some(Duration::from_secs(864_000)));
        assert_eq!(parse_expiry("3600"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_expiry_rejects_garbage() {
        assert_eq!(parse_expiry(""), None);
        assert_eq!(parse_expiry("d"), None);
        assert_eq!(parse_expiry("5w"), None);
        assert_eq!(parse_expiry("0m"), None);
        assert_eq!(parse_expiry("-1d"), None);
    }

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("ACCESS_TOKEN_SECRET", "access_secret");
        env::set_var("REFRESH_TOKEN_SECRET", "refresh_secret");
        env::set_var("ACCESS_TOKEN_EXPIRY", "15m");
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("MEDIA_BACKEND", "local");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.access_token_secret, b"access_secret");
        assert_eq!(config.refresh_token_secret, b"refresh_secret");
        assert_eq!(config.access_token_expiry, Duration::from_secs(900));
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(matches!(config.media_backend, MediaBackend::Local { .. }));
    }
}
