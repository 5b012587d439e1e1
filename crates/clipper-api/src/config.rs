//! API configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clipper_media::ClipConfig;
use clipper_models::{OutputFormat, ValidationLimits};
use tracing::warn;

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
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Request validation limits
    pub limits: ValidationLimits,
    /// Orchestration settings
    pub clip: ClipConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            max_body_size: 64 * 1024, // 64KB
            environment: "development".to_string(),
            limits: ValidationLimits::default(),
            clip: ClipConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = ValidationLimits::default();

        let max_clip_duration = std::env::var("MAX_CLIP_DURATION_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &u64| *n > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_clip_duration);

        let allowed_formats = std::env::var("ALLOWED_FORMATS")
            .ok()
            .map(|s| parse_formats(&s))
            .filter(|formats| !formats.is_empty())
            .unwrap_or(defaults.allowed_formats);

        let mut limits = ValidationLimits::new(max_clip_duration, allowed_formats);
        if let Ok(root) = std::env::var("SOURCE_ROOT") {
            if !root.trim().is_empty() {
                limits = limits.with_source_root(PathBuf::from(root));
            }
        }

        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            limits,
            clip: ClipConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

/// Parse a comma-separated format list, skipping unknown names.
fn parse_formats(list: &str) -> HashSet<OutputFormat> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|name| match name.parse::<OutputFormat>() {
            Ok(format) => Some(format),
            Err(e) => {
                warn!("Ignoring entry in ALLOWED_FORMATS: {}", e);
                None
            }
        })
        .collect()
}
