use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    pub media_path: String,
    /// Public base URL used to build record permalinks and asset URLs.
    pub base_url: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
    /// Platform-level admin address, the fallback recipient for the admin
    /// notification channel.
    pub admin_email: String,
    /// Optional HTTP mail gateway. When unset, notification channels report a
    /// delivery failure but submissions still succeed.
    pub mail_gateway_url: String,
    /// Endpoint the anti-bot response token is verified against.
    pub captcha_verify_url: String,
    /// Hard timeout for every outbound call (anti-bot verification, mail).
    pub outbound_timeout_secs: u64,
    /// Present when the host's view-count collaborator is installed.
    pub enable_post_views: bool,
    /// Whether schema authors may store notification templates without the
    /// safe-tag allowlist applied.
    pub allow_unrestricted_html: bool,
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = env::var("DATABASE_PATH")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'DATABASE_PATH' is not set in your .env file.".to_string()
            ))?;

        let media_path = env::var("MEDIA_PATH")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'MEDIA_PATH' is not set in your .env file.".to_string()
            ))?;

        let base_url = env::var("BASE_URL")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'BASE_URL' is not set in your .env file.".to_string()
            ))?;

        if url::Url::parse(&base_url).is_err() {
            return Err(config::ConfigError::Message(
                "FATAL: 'BASE_URL' is not a valid URL.".to_string()
            ));
        }

        let session_secret_key = env::var("SESSION_SECRET_KEY")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'SESSION_SECRET_KEY' is not set in your .env file.".to_string()
            ))?;

        // The session key must be 128 hex characters (64 bytes).
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
            ));
        }

        let admin_url_prefix = env::var("ADMIN_URL_PREFIX")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'ADMIN_URL_PREFIX' is not set in your .env file.".to_string()
            ))?;

        if admin_url_prefix.is_empty() || !admin_url_prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(config::ConfigError::Message(
                "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string()
            ));
        }

        let admin_email = env::var("ADMIN_EMAIL")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'ADMIN_EMAIL' is not set in your .env file.".to_string()
            ))?;

        let mail_gateway_url = env::var("MAIL_GATEWAY_URL").unwrap_or_else(|_| "".to_string());
        if !mail_gateway_url.is_empty() && url::Url::parse(&mail_gateway_url).is_err() {
            return Err(config::ConfigError::Message(
                "FATAL: 'MAIL_GATEWAY_URL' is set but is not a valid URL.".to_string()
            ));
        }

        let captcha_verify_url = env::var("CAPTCHA_VERIFY_URL")
            .unwrap_or_else(|_| "https://www.google.com/recaptcha/api/siteverify".to_string());

        let outbound_timeout_secs = env::var("OUTBOUND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|_| config::ConfigError::Message(
                "FATAL: 'OUTBOUND_TIMEOUT_SECS' must be a whole number of seconds.".to_string()
            ))?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let enable_post_views = env::var("ENABLE_POST_VIEWS")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let allow_unrestricted_html = env::var("ALLOW_UNRESTRICTED_HTML")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        if Path::new(&media_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'MEDIA_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                media_path
            )));
        }

        let builder = config::Config::builder()
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("base_url", base_url)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("admin_email", admin_email)?
            .set_override("mail_gateway_url", mail_gateway_url)?
            .set_override("captcha_verify_url", captcha_verify_url)?
            .set_override("outbound_timeout_secs", outbound_timeout_secs)?
            .set_override("enable_post_views", enable_post_views)?
            .set_override("allow_unrestricted_html", allow_unrestricted_html)?
            .build()?;

        builder.try_deserialize()
    }

    /// Full path to the platform database file (accounts, forms, taxonomy).
    pub fn platform_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("platform")
            .join("platform.db")
    }

    /// Full path to the content-record database file.
    pub fn records_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("records")
            .join("records.db")
    }

    /// Directory inline and featured images are written into.
    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.media_path).join("uploads")
    }

    /// Permalink for a content record.
    pub fn permalink(&self, record_id: &str) -> String {
        format!("{}/p/{}", self.base_url.trim_end_matches('/'), record_id)
    }

    /// Public URL for a persisted media asset.
    pub fn media_url(&self, file_name: &str) -> String {
        format!("{}/media/uploads/{}", self.base_url.trim_end_matches('/'), file_name)
    }
}
