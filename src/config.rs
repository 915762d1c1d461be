use crate::domain::ExchangeId;
use chrono_tz::Tz;
use std::collections::HashMap;
use thiserror::Error;

const DEFAULT_MAX_IMPORT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Exchange id whose uploads are parsed as Bybit transaction logs.
    pub bybit_exchange_id: ExchangeId,
    /// Timezone used when a caller does not send one.
    pub default_timezone: String,
    pub max_import_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let bybit_exchange_id = env_map
            .get("BYBIT_EXCHANGE_ID")
            .map(|s| s.as_str())
            .unwrap_or("7")
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(ExchangeId::new)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "BYBIT_EXCHANGE_ID".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let default_timezone = env_map
            .get("DEFAULT_TIMEZONE")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "UTC".to_string());
        if default_timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_TIMEZONE".to_string(),
                format!("unknown timezone {}", default_timezone),
            ));
        }

        let max_import_bytes = match env_map.get("MAX_IMPORT_BYTES") {
            None => DEFAULT_MAX_IMPORT_BYTES,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "MAX_IMPORT_BYTES".to_string(),
                        "must be a positive integer".to_string(),
                    )
                })?,
        };

        Ok(Config {
            port,
            database_path,
            bybit_exchange_id,
            default_timezone,
            max_import_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, "/tmp/test.db");
        assert_eq!(config.bybit_exchange_id, ExchangeId::new(7));
        assert_eq!(config.default_timezone, "UTC");
        assert_eq!(config.max_import_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(key, _)) => assert_eq!(key, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_custom_bybit_exchange_id() {
        let mut env_map = setup_required_env();
        env_map.insert("BYBIT_EXCHANGE_ID".to_string(), "12".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.bybit_exchange_id, ExchangeId::new(12));
    }

    #[test]
    fn test_non_positive_bybit_exchange_id_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("BYBIT_EXCHANGE_ID".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(key, _)) => assert_eq!(key, "BYBIT_EXCHANGE_ID"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_unknown_default_timezone_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_TIMEZONE".to_string(), "Mars/Olympus".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(key, _)) => assert_eq!(key, "DEFAULT_TIMEZONE"),
            _ => panic!("Expected InvalidValue error"),
        }

        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_TIMEZONE".to_string(), "Asia/Tokyo".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.default_timezone, "Asia/Tokyo");
    }

    #[test]
    fn test_max_import_bytes() {
        let mut env_map = setup_required_env();
        env_map.insert("MAX_IMPORT_BYTES".to_string(), "2048".to_string());
        assert_eq!(Config::from_env_map(env_map).unwrap().max_import_bytes, 2048);

        let mut env_map = setup_required_env();
        env_map.insert("MAX_IMPORT_BYTES".to_string(), "-1".to_string());
        assert!(Config::from_env_map(env_map).is_err());
    }
}
