//! API configuration.

use std::time::Duration;

/// Secret used when `JWT_SECRET` is unset outside production.
const DEV_SECRET: &str = "pixvault-dev-secret-change-me";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Max JSON request body size
    pub max_body_size: usize,
    /// Max upload size for media files
    pub max_upload_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// HMAC secret for signed file links
    pub file_token_secret: String,
    /// Processing jobs idle longer than this are failed
    pub stale_job_threshold: Duration,
    pub stale_check_interval: Duration,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 1024 * 1024,         // 1MB
            max_upload_size: 50 * 1024 * 1024, // 50MB
            environment: "development".to_string(),
            jwt_secret: DEV_SECRET.to_string(),
            file_token_secret: DEV_SECRET.to_string(),
            stale_job_threshold: Duration::from_secs(3600),
            stale_check_interval: Duration::from_secs(60),
            metrics_enabled: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret);
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            file_token_secret: std::env::var("FILE_TOKEN_SECRET")
                .unwrap_or_else(|_| jwt_secret.clone()),
            jwt_secret,
            stale_job_threshold: env_parse("STALE_JOB_THRESHOLD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_job_threshold),
            stale_check_interval: env_parse("STALE_CHECK_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_check_interval),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Refuse to run production with the built-in development secret.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() || self.file_token_secret.is_empty() {
            return Err("JWT_SECRET and FILE_TOKEN_SECRET must not be empty".to_string());
        }
        if self.is_production()
            && (self.jwt_secret == DEV_SECRET || self.file_token_secret == DEV_SECRET)
        {
            return Err("JWT_SECRET must be set in production".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_requires_secret() {
        let mut config = ApiConfig::default();
        assert!(config.validate().is_ok());

        config.environment = "Production".to_string();
        assert!(config.is_production());
        assert!(config.validate().is_err());

        config.jwt_secret = "a-real-secret".to_string();
        config.file_token_secret = "another-secret".to_string();
        assert!(config.validate().is_ok());
    }
}
