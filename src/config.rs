use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Development fallback for the Web Push application server key. Not a
/// credential; production deployments set `VAPID_PUBLIC_KEY`.
pub const DEFAULT_VAPID_PUBLIC_KEY: &str =
    "BNxWf3ZmcJrAtlQqyvDdyMLcvLLEzKqBioMvX0TnlNpn0vF1P2xuT7mZ9tA4J5cdQsnLR8bkQo3D1hGg4vYw2pU";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub storage_dir: PathBuf,
    pub vapid_public_key: String,
    pub device_type: String,
    pub device_name: String,
    pub maintenance_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let maintenance_interval_secs = match env::var("MAINTENANCE_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse()
                .context("MAINTENANCE_INTERVAL_SECS must be a number of seconds")?,
            Err(_) => 3600,
        };
        Ok(Self {
            api_base_url: env::var("LINGUIFY_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            storage_dir: env::var("LINGUIFY_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            vapid_public_key: env::var("VAPID_PUBLIC_KEY")
                .unwrap_or_else(|_| DEFAULT_VAPID_PUBLIC_KEY.to_string()),
            device_type: env::var("DEVICE_TYPE").unwrap_or_else(|_| "web".to_string()),
            device_name: env::var("DEVICE_NAME")
                .unwrap_or_else(|_| "linguify-desktop".to_string()),
            maintenance_interval_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        // Single test so the env mutations cannot race a parallel sibling.
        env::remove_var("LINGUIFY_API_URL");
        env::remove_var("MAINTENANCE_INTERVAL_SECS");
        env::remove_var("VAPID_PUBLIC_KEY");
        let config = Config::from_env().unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.vapid_public_key, DEFAULT_VAPID_PUBLIC_KEY);
        assert_eq!(config.maintenance_interval_secs, 3600);

        env::set_var("LINGUIFY_API_URL", "https://app.linguify.example");
        env::set_var("MAINTENANCE_INTERVAL_SECS", "120");
        let config = Config::from_env().unwrap();
        assert_eq!(config.api_base_url, "https://app.linguify.example");
        assert_eq!(config.maintenance_interval_secs, 120);

        env::set_var("MAINTENANCE_INTERVAL_SECS", "not-a-number");
        assert!(Config::from_env().is_err());

        env::remove_var("LINGUIFY_API_URL");
        env::remove_var("MAINTENANCE_INTERVAL_SECS");
    }
}
