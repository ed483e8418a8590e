pub mod engine;

use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub admin_token: Option<String>,
    pub discord_token: String,
    pub discord_api_base: Url,
    pub guild_id: i64,
    pub ban_role_id: i64,
    pub admin_channel_id: Option<i64>,
    pub dedup_window_seconds: i64,
    pub audit_poll_seconds: u64,
    pub audit_poll_limit: u8,
    pub maintenance_interval_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let discord_api_base = Url::parse(&env_or("DISCORD_API_BASE", "https://discord.com/api/v10"))
            .map_err(|err| anyhow!("invalid DISCORD_API_BASE: {}", err))?;

        let audit_poll_limit: u8 = env_or_parse("AUDIT_POLL_LIMIT", "50")?;
        if !(1..=100).contains(&audit_poll_limit) {
            return Err(anyhow!("invalid AUDIT_POLL_LIMIT: must be between 1 and 100"));
        }

        let dedup_window_seconds: i64 = env_or_parse("DEDUP_WINDOW_SECONDS", "30")?;
        if dedup_window_seconds <= 0 {
            return Err(anyhow!("invalid DEDUP_WINDOW_SECONDS: must be positive"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "10")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            discord_token: env_or_err("DISCORD_TOKEN")?,
            discord_api_base,
            guild_id: env_parse_required("GUILD_ID")?,
            ban_role_id: env_parse_required("BAN_ROLE_ID")?,
            admin_channel_id: env_parse_optional("ADMIN_CHANNEL_ID")?,
            dedup_window_seconds,
            audit_poll_seconds: env_or_parse("AUDIT_POLL_SECONDS", "10")?,
            audit_poll_limit,
            maintenance_interval_seconds: env_or_parse("MAINTENANCE_INTERVAL_SECONDS", "3600")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_parse_required<T>(key: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    env_or_err(key)?
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow!("invalid {}: {}", key, err)),
        Err(_) => Ok(None),
    }
}
