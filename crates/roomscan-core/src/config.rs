//! Configuration module
//!
//! Reads the service configuration from the environment (with `.env` support).
//! Numeric settings that fail to parse, or are not positive, fall back to their
//! defaults with a warning instead of aborting startup. Only a missing API token
//! and an invalid port are fatal.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

const SERVER_PORT: u16 = 4000;
const STORAGE_DIR: &str = "storage";
const UPLOAD_DIR: &str = "uploads";
const MAX_UPLOAD_MB: u64 = 200;
const MAX_META_BYTES: usize = 4096;
const QUEUE_CONCURRENCY: usize = 1;
const QUEUE_MAX_DEPTH: usize = 10;
const QUEUE_RETRY_AFTER_SECS: u64 = 30;
const RETENTION_HOURS: u64 = 72;
const SWEEP_INTERVAL_SECS: u64 = 3600;
const SCRATCH_GRACE_SECS: u64 = 600;
const CONVERTER_PATH: &str = "blender";
const CONVERTER_ARGS: &str = "-b -P ./convert_blender.py -- {input} {output}";
const CONVERTER_PROBE_TIMEOUT_SECS: u64 = 15;
const RATE_LIMIT_WINDOW_SECS: u64 = 60;
const RATE_LIMIT_MAX: u32 = 120;
const HTTP_CONCURRENCY_LIMIT: usize = 256;
const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Service configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    /// Shared bearer secret for every protected route.
    pub api_token: String,
    pub storage_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub max_meta_bytes: usize,
    pub queue_concurrency: usize,
    /// Pending plus running jobs.
    pub queue_max_depth: usize,
    pub queue_retry_after_secs: u64,
    pub retention_hours: u64,
    pub sweep_interval_secs: u64,
    /// Scratch entries younger than this survive periodic sweeps.
    pub scratch_grace_secs: u64,
    pub converter_path: String,
    /// Argument template; `{input}` and `{output}` are substituted per job.
    pub converter_args: Vec<String>,
    pub converter_verbose: bool,
    pub converter_probe_timeout_secs: u64,
    pub skip_filetype_check: bool,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max: u32,
    /// In-flight HTTP requests across all clients.
    pub http_concurrency_limit: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
            api_token: String::new(),
            storage_dir: PathBuf::from(STORAGE_DIR),
            upload_dir: PathBuf::from(UPLOAD_DIR),
            max_upload_bytes: MAX_UPLOAD_MB * 1024 * 1024,
            max_meta_bytes: MAX_META_BYTES,
            queue_concurrency: QUEUE_CONCURRENCY,
            queue_max_depth: QUEUE_MAX_DEPTH,
            queue_retry_after_secs: QUEUE_RETRY_AFTER_SECS,
            retention_hours: RETENTION_HOURS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            scratch_grace_secs: SCRATCH_GRACE_SECS,
            converter_path: CONVERTER_PATH.to_string(),
            converter_args: split_args(CONVERTER_ARGS),
            converter_verbose: false,
            converter_probe_timeout_secs: CONVERTER_PROBE_TIMEOUT_SECS,
            skip_filetype_check: false,
            rate_limit_window_secs: RATE_LIMIT_WINDOW_SECS,
            rate_limit_max: RATE_LIMIT_MAX,
            http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
            shutdown_grace_secs: SHUTDOWN_GRACE_SECS,
        }
    }
}

impl Config {
    /// Load a `.env` file into the process environment if present.
    /// Existing variables win, so calling this more than once is harmless.
    pub fn load_dotenv() {
        dotenvy::dotenv().ok();
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::load_dotenv();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let api_token = env::var("API_TOKEN")
            .map_err(|_| anyhow::anyhow!("API_TOKEN must be set for authentication"))?;

        let server_port = env::var("PORT")
            .unwrap_or_else(|_| SERVER_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        // MAX_UPLOAD_BYTES wins over MAX_UPLOAD_MB when both are set.
        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES").ok() {
            Some(raw) => parse_positive(
                "MAX_UPLOAD_BYTES",
                Some(raw),
                MAX_UPLOAD_MB * 1024 * 1024,
            ),
            None => env_positive("MAX_UPLOAD_MB", MAX_UPLOAD_MB) * 1024 * 1024,
        };

        let converter_path = env::var("CONVERTER_PATH")
            .or_else(|_| env::var("BLENDER_PATH"))
            .unwrap_or_else(|_| CONVERTER_PATH.to_string());

        let converter_args = split_args(
            &env::var("CONVERTER_ARGS").unwrap_or_else(|_| CONVERTER_ARGS.to_string()),
        );

        Ok(Self {
            server_port,
            environment,
            cors_origins,
            api_token,
            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(STORAGE_DIR)),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(UPLOAD_DIR)),
            max_upload_bytes,
            max_meta_bytes: env_positive("MAX_META_BYTES", MAX_META_BYTES),
            queue_concurrency: env_positive("QUEUE_CONCURRENCY", QUEUE_CONCURRENCY),
            queue_max_depth: env_positive("QUEUE_MAX_DEPTH", QUEUE_MAX_DEPTH),
            queue_retry_after_secs: env_positive("QUEUE_RETRY_AFTER_SECS", QUEUE_RETRY_AFTER_SECS),
            retention_hours: env_positive("RETENTION_HOURS", RETENTION_HOURS),
            sweep_interval_secs: env_positive("SWEEP_INTERVAL_SECS", SWEEP_INTERVAL_SECS),
            scratch_grace_secs: env_positive("SCRATCH_GRACE_SECS", SCRATCH_GRACE_SECS),
            converter_path,
            converter_args,
            converter_verbose: env_flag("CONVERTER_VERBOSE"),
            converter_probe_timeout_secs: env_positive(
                "CONVERTER_PROBE_TIMEOUT_SECS",
                CONVERTER_PROBE_TIMEOUT_SECS,
            ),
            skip_filetype_check: env_flag("SKIP_FILETYPE_CHECK"),
            rate_limit_window_secs: env_positive("RATE_LIMIT_WINDOW_SECS", RATE_LIMIT_WINDOW_SECS),
            rate_limit_max: env_positive("RATE_LIMIT_MAX", RATE_LIMIT_MAX),
            http_concurrency_limit: env_positive("HTTP_CONCURRENCY_LIMIT", HTTP_CONCURRENCY_LIMIT),
            shutdown_grace_secs: env_positive("SHUTDOWN_GRACE_SECS", SHUTDOWN_GRACE_SECS),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.api_token.trim().is_empty() {
            return Err(anyhow::anyhow!("API_TOKEN must not be empty"));
        }

        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.converter_path.trim().is_empty() {
            return Err(anyhow::anyhow!("CONVERTER_PATH must not be empty"));
        }

        let joined = self.converter_args.join(" ");
        if !joined.contains("{input}") || !joined.contains("{output}") {
            return Err(anyhow::anyhow!(
                "CONVERTER_ARGS must reference both {{input}} and {{output}}"
            ));
        }

        if self.storage_dir == self.upload_dir {
            return Err(anyhow::anyhow!(
                "STORAGE_DIR and UPLOAD_DIR must be different directories"
            ));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Retention threshold for job directories.
    pub fn retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key).map(|v| v.trim().to_lowercase()).as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

fn env_positive<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Display + Copy,
{
    parse_positive(key, env::var(key).ok(), default)
}

/// Parses a strictly positive number; anything else yields `default` with a warning.
pub fn parse_positive<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Display + Copy,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!(
                key = key,
                value = %raw,
                default = %default,
                "Invalid positive integer, using default"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            api_token: "secret".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_parse_positive_accepts_positive() {
        assert_eq!(parse_positive("X", Some("5".to_string()), 1usize), 5);
        assert_eq!(parse_positive("X", Some(" 42 ".to_string()), 1u64), 42);
    }

    #[test]
    fn test_parse_positive_falls_back() {
        assert_eq!(parse_positive("X", None, 7usize), 7);
        assert_eq!(parse_positive("X", Some("0".to_string()), 7usize), 7);
        assert_eq!(parse_positive("X", Some("-3".to_string()), 7u64), 7);
        assert_eq!(parse_positive("X", Some("abc".to_string()), 7u32), 7);
    }

    #[test]
    fn test_default_converter_template() {
        let config = Config::default();
        assert_eq!(config.converter_path, "blender");
        assert_eq!(
            config.converter_args,
            vec!["-b", "-P", "./convert_blender.py", "--", "{input}", "{output}"]
        );
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
    }

    #[test]
    fn test_validate_requires_token() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wildcard_cors_in_production() {
        let config = Config {
            environment: "production".to_string(),
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            environment: "production".to_string(),
            cors_origins: vec!["https://app.example.com".to_string()],
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_placeholders() {
        let config = Config {
            converter_args: vec!["{input}".to_string()],
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_dirs() {
        let config = Config {
            upload_dir: PathBuf::from("storage"),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }
}
