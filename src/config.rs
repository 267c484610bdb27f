use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub media_root: PathBuf,
    pub max_body_size: usize,
    pub token_ttl_hours: i64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;

        let host: IpAddr = env_or("WORKFORCE_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid WORKFORCE_HOST: {e}"))?;

        let port: u16 = env_or("WORKFORCE_PORT", "8000")
            .parse()
            .map_err(|e| format!("Invalid WORKFORCE_PORT: {e}"))?;

        let media_root = PathBuf::from(env_or("WORKFORCE_MEDIA_ROOT", "./media"));

        let max_body_size: usize = env_or("WORKFORCE_MAX_BODY_SIZE", "5242880")
            .parse()
            .map_err(|e| format!("Invalid WORKFORCE_MAX_BODY_SIZE: {e}"))?;

        let token_ttl_hours: i64 = env_or("WORKFORCE_TOKEN_TTL_HOURS", "168")
            .parse()
            .map_err(|e| format!("Invalid WORKFORCE_TOKEN_TTL_HOURS: {e}"))?;
        if token_ttl_hours <= 0 {
            return Err("WORKFORCE_TOKEN_TTL_HOURS must be positive".to_string());
        }

        let log_level = env_or("WORKFORCE_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            host,
            port,
            media_root,
            max_body_size,
            token_ttl_hours,
            log_level,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
