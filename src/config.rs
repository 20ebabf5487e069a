use anyhow::{bail, Context};
use std::env;
use std::net::SocketAddr;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub token_ttl_minutes: i64,
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub digest: DigestConfig,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Error responses carry the underlying error text outside production.
    pub fn exposes_error_detail(self) -> bool {
        self != Environment::Production
    }
}

#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub enabled: bool,
    /// Local hour of day (0-23) at which the digest is sent.
    pub hour: u32,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let secret_key = match env::var("SECRET_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ if environment == Environment::Production => {
                bail!("SECRET_KEY must be set in production")
            }
            _ => "secret".to_string(),
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_var("PORT", 8000)?;
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid HOST/PORT: {host}:{port}"))?;

        let hour: u32 = parse_var("DIGEST_HOUR", 8)?;
        if hour > 23 {
            bail!("DIGEST_HOUR must be between 0 and 23, got {hour}");
        }

        let mail = env::var("MAIL_API_URL").ok().map(|api_url| MailConfig {
            api_url,
            api_key: env::var("MAIL_API_KEY").ok(),
            from: env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@taskboard.local".into()),
        });

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data.db".into()),
            secret_key,
            token_ttl_minutes: parse_var("TOKEN_TTL_MINUTES", 60)?,
            bind_addr,
            environment,
            digest: DigestConfig {
                enabled: parse_var("DIGEST_ENABLED", true)?,
                hour,
            },
            mail,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            secret_key: "test-secret".into(),
            token_ttl_minutes: 60,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            environment: Environment::Development,
            digest: DigestConfig {
                enabled: false,
                hour: 8,
            },
            mail: None,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}
