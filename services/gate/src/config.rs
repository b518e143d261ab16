//! Gate service configuration

use anyhow::{Context, Result, anyhow, bail};
use chrono::Duration;
use std::{collections::HashSet, env, str::FromStr};

use crate::{quota::QuotaPolicy, rate_limiter::RatePolicy, validation::normalize_email};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Where rate-limit counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Process-local; each instance counts on its own
    Memory,
    /// Shared through Redis
    Redis,
}

/// Where users and the submission ledger live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Gate service configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub jwt_secret: String,
    pub environment: Environment,
    pub magic_link_ttl: Duration,
    pub session_ttl: Duration,
    pub email_from: String,
    pub frontend_url: String,
    /// Unset disables the admin listings
    pub admin_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub openai_api_key: String,
    pub openai_model: String,
    pub quota: QuotaPolicy,
    pub magic_link_rate: RatePolicy,
    pub rewrite_rate: RatePolicy,
    pub sweep_interval: std::time::Duration,
    pub rate_limit_backend: RateLimitBackend,
    pub storage_backend: StorageBackend,
    pub bind_addr: String,
}

impl GateConfig {
    /// Create a new GateConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: Token signing secret (required)
    /// - `APP_ENV`: `development` or `production` (default: development)
    /// - `MAGIC_LINK_EXPIRY_MINUTES`: Magic-link lifetime (default: 15)
    /// - `SESSION_MAX_AGE_DAYS`: Session cookie lifetime (default: 30)
    /// - `EMAIL_FROM`, `FRONTEND_URL`: Magic-link email sender and link base
    /// - `ADMIN_API_KEY`: Shared secret for the admin listings (optional)
    /// - `RESEND_API_KEY`: Mail API key (required in production)
    /// - `OPENAI_API_KEY`, `OPENAI_MODEL`: Rewrite model access
    /// - `QUOTA_DAILY_CAP`, `QUOTA_LOOKUP_TIMEOUT_MS`, `QUOTA_UNLIMITED_EMAILS`
    /// - `RATE_LIMIT_MAGIC_PER_MINUTE`, `RATE_LIMIT_REWRITE_PER_MINUTE`,
    ///   `RATE_LIMIT_SWEEP_SECONDS`, `RATE_LIMIT_BACKEND` (`memory` or `redis`)
    /// - `STORAGE_BACKEND`: `postgres` or `memory` (default: postgres)
    /// - `BIND_ADDR`: Listen address (default: 0.0.0.0:3000)
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;

        let environment = match var_or("APP_ENV", "development").as_str() {
            "development" | "dev" | "test" => Environment::Development,
            "production" | "prod" => Environment::Production,
            other => bail!("APP_ENV must be development or production, got {other}"),
        };

        let magic_link_minutes: i64 = parse_var("MAGIC_LINK_EXPIRY_MINUTES", 15)?;
        let session_days: i64 = parse_var("SESSION_MAX_AGE_DAYS", 30)?;
        if magic_link_minutes <= 0 || session_days <= 0 {
            bail!("MAGIC_LINK_EXPIRY_MINUTES and SESSION_MAX_AGE_DAYS must be positive");
        }

        let resend_api_key = env::var("RESEND_API_KEY").ok().filter(|k| !k.is_empty());
        if environment == Environment::Production && resend_api_key.is_none() {
            bail!("RESEND_API_KEY must be set in production");
        }

        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set"))?;

        let unlimited_emails: HashSet<String> = env::var("QUOTA_UNLIMITED_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .collect();

        let quota = QuotaPolicy {
            daily_cap: parse_var("QUOTA_DAILY_CAP", 1)?,
            lookup_timeout: std::time::Duration::from_millis(parse_var(
                "QUOTA_LOOKUP_TIMEOUT_MS",
                5_000,
            )?),
            unlimited_emails,
            ..QuotaPolicy::default()
        };

        let rate_limit_backend = match var_or("RATE_LIMIT_BACKEND", "memory").as_str() {
            "memory" => RateLimitBackend::Memory,
            "redis" => RateLimitBackend::Redis,
            other => bail!("RATE_LIMIT_BACKEND must be memory or redis, got {other}"),
        };

        let sweep_seconds: u64 = parse_var("RATE_LIMIT_SWEEP_SECONDS", 60)?;
        if sweep_seconds == 0 {
            bail!("RATE_LIMIT_SWEEP_SECONDS must be positive");
        }

        let storage_backend = match var_or("STORAGE_BACKEND", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => bail!("STORAGE_BACKEND must be postgres or memory, got {other}"),
        };

        Ok(Self {
            jwt_secret,
            environment,
            magic_link_ttl: Duration::minutes(magic_link_minutes),
            session_ttl: Duration::days(session_days),
            email_from: var_or("EMAIL_FROM", "noreply@resumerewriter.com"),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            resend_api_key,
            openai_api_key,
            openai_model: var_or("OPENAI_MODEL", "gpt-3.5-turbo"),
            quota,
            magic_link_rate: RatePolicy::per_minute(
                "magic",
                parse_var("RATE_LIMIT_MAGIC_PER_MINUTE", 5)?,
            ),
            rewrite_rate: RatePolicy::per_minute(
                "rewrite",
                parse_var("RATE_LIMIT_REWRITE_PER_MINUTE", 10)?,
            ),
            sweep_interval: std::time::Duration::from_secs(sweep_seconds),
            rate_limit_backend,
            storage_backend,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "JWT_SECRET",
        "APP_ENV",
        "MAGIC_LINK_EXPIRY_MINUTES",
        "SESSION_MAX_AGE_DAYS",
        "EMAIL_FROM",
        "FRONTEND_URL",
        "ADMIN_API_KEY",
        "RESEND_API_KEY",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "QUOTA_DAILY_CAP",
        "QUOTA_LOOKUP_TIMEOUT_MS",
        "QUOTA_UNLIMITED_EMAILS",
        "RATE_LIMIT_MAGIC_PER_MINUTE",
        "RATE_LIMIT_REWRITE_PER_MINUTE",
        "RATE_LIMIT_SWEEP_SECONDS",
        "RATE_LIMIT_BACKEND",
        "STORAGE_BACKEND",
        "BIND_ADDR",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    fn set_required() {
        unsafe {
            env::set_var("JWT_SECRET", "test-secret");
            env::set_var("OPENAI_API_KEY", "sk-test");
        }
    }

    #[test]
    #[serial]
    fn test_missing_secret_is_fatal() {
        clear_env();
        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-test");
        }

        let err = GateConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        unsafe {
            env::set_var("JWT_SECRET", "");
        }
        assert!(GateConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        set_required();

        let config = GateConfig::from_env().unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.magic_link_ttl, Duration::minutes(15));
        assert_eq!(config.session_ttl, Duration::days(30));
        assert_eq!(config.email_from, "noreply@resumerewriter.com");
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert_eq!(config.admin_api_key, None);
        assert_eq!(config.openai_model, "gpt-3.5-turbo");
        assert_eq!(config.quota.daily_cap, 1);
        assert_eq!(config.quota.window, Duration::hours(24));
        assert!(config.quota.unlimited_emails.is_empty());
        assert_eq!(config.magic_link_rate.purpose, "magic");
        assert_eq!(config.magic_link_rate.max_requests, 5);
        assert_eq!(config.rewrite_rate.purpose, "rewrite");
        assert_eq!(config.rewrite_rate.max_requests, 10);
        assert_eq!(config.rate_limit_backend, RateLimitBackend::Memory);
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        set_required();
        unsafe {
            env::set_var("MAGIC_LINK_EXPIRY_MINUTES", "5");
            env::set_var("FRONTEND_URL", "https://rewrite.example.com/");
            env::set_var("QUOTA_DAILY_CAP", "3");
            env::set_var("QUOTA_UNLIMITED_EMAILS", " QA@Example.com, ,ops@example.com");
            env::set_var("RATE_LIMIT_BACKEND", "redis");
            env::set_var("STORAGE_BACKEND", "memory");
        }

        let config = GateConfig::from_env().unwrap();
        assert_eq!(config.magic_link_ttl, Duration::minutes(5));
        assert_eq!(config.frontend_url, "https://rewrite.example.com");
        assert_eq!(config.quota.daily_cap, 3);
        assert_eq!(
            config.quota.unlimited_emails,
            HashSet::from(["qa@example.com".to_string(), "ops@example.com".to_string()])
        );
        assert_eq!(config.rate_limit_backend, RateLimitBackend::Redis);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
    }

    #[test]
    #[serial]
    fn test_production_requires_mail_key() {
        clear_env();
        set_required();
        unsafe {
            env::set_var("APP_ENV", "production");
        }
        assert!(GateConfig::from_env().is_err());

        unsafe {
            env::set_var("RESEND_API_KEY", "re_test");
        }
        let config = GateConfig::from_env().unwrap();
        assert!(config.is_production());
    }

    #[test]
    #[serial]
    fn test_malformed_numbers_are_rejected() {
        clear_env();
        set_required();
        unsafe {
            env::set_var("QUOTA_DAILY_CAP", "lots");
        }

        let err = GateConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("QUOTA_DAILY_CAP"));
    }

    #[test]
    #[serial]
    fn test_zero_sweep_interval_is_rejected() {
        clear_env();
        set_required();
        unsafe {
            env::set_var("RATE_LIMIT_SWEEP_SECONDS", "0");
        }

        let err = GateConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_SWEEP_SECONDS"));

        unsafe {
            env::set_var("RATE_LIMIT_SWEEP_SECONDS", "15");
        }
        let config = GateConfig::from_env().unwrap();
        assert_eq!(config.sweep_interval, std::time::Duration::from_secs(15));
    }
}
