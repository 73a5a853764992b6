use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub session_secret: String,
    pub service_api_key: String,
    pub session_idle_timeout: Duration,
    pub session_max_age: Duration,
    pub bind_addr: String,
    pub cors_origin: String,
}

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_MAX_AGE_SECS: u64 = 12 * 60 * 60;

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL must be set")?;

        let session_secret = lookup("SESSION_SECRET").ok_or("SESSION_SECRET must be set")?;
        if session_secret.len() < 32 {
            return Err("SESSION_SECRET must be at least 32 bytes".to_string());
        }

        let service_api_key = lookup("SERVICE_API_KEY").ok_or("SERVICE_API_KEY must be set")?;

        let session_idle_timeout = parse_secs(
            "SESSION_IDLE_TIMEOUT_SECS",
            lookup("SESSION_IDLE_TIMEOUT_SECS"),
            DEFAULT_IDLE_TIMEOUT_SECS,
        )?;
        let session_max_age = parse_secs(
            "SESSION_MAX_AGE_SECS",
            lookup("SESSION_MAX_AGE_SECS"),
            DEFAULT_MAX_AGE_SECS,
        )?;

        Ok(Self {
            database_url,
            session_secret,
            service_api_key,
            session_idle_timeout,
            session_max_age,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }
}

fn parse_secs(name: &str, value: Option<String>, default: u64) -> Result<Duration, String> {
    let secs = match value {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("{} must be a whole number of seconds", name))?,
        None => default,
    };

    if secs == 0 {
        return Err(format!("{} must be greater than zero", name));
    }

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/hms"),
            ("SESSION_SECRET", SECRET),
            ("SERVICE_API_KEY", "bridge-key"),
        ]))
        .unwrap();

        assert_eq!(config.session_idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.session_max_age, Duration::from_secs(43200));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_database_url() {
        let err = AppConfig::from_lookup(lookup_from(&[("SESSION_SECRET", SECRET)])).unwrap_err();
        assert!(err.contains("DATABASE_URL"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/hms"),
            ("SESSION_SECRET", "short"),
            ("SERVICE_API_KEY", "bridge-key"),
        ]))
        .unwrap_err();
        assert!(err.contains("32 bytes"));
    }

    #[test]
    fn test_bad_timeout() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/hms"),
            ("SESSION_SECRET", SECRET),
            ("SERVICE_API_KEY", "bridge-key"),
            ("SESSION_IDLE_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.contains("SESSION_IDLE_TIMEOUT_SECS"));
    }
}
