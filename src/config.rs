use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    /// Sessions unused for this long are dropped and their calls cancelled.
    pub session_idle_timeout: Duration,
    pub max_sessions: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
    #[error("SESSION_IDLE_TIMEOUT_SECS must be a positive number of seconds")]
    InvalidSessionTimeout,
    #[error("MAX_SESSIONS must be a positive integer")]
    InvalidMaxSessions,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let port = lookup("PORT")
            .map(|value| {
                value
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort)
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let session_idle_timeout = lookup("SESSION_IDLE_TIMEOUT_SECS")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or(ConfigError::InvalidSessionTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SESSION_IDLE_TIMEOUT);
        let max_sessions = lookup("MAX_SESSIONS")
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|max| *max > 0)
                    .ok_or(ConfigError::InvalidMaxSessions)
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_SESSIONS);

        let config = Self {
            bind_addr,
            port,
            session_idle_timeout,
            max_sessions,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = config_from(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.session_idle_timeout, DEFAULT_SESSION_IDLE_TIMEOUT);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
    }

    #[test]
    fn session_limits_are_configurable() {
        let config = config_from(&[("SESSION_IDLE_TIMEOUT_SECS", "90"), ("MAX_SESSIONS", "8")])
            .expect("config should parse");
        assert_eq!(config.session_idle_timeout, Duration::from_secs(90));
        assert_eq!(config.max_sessions, 8);
    }

    #[test]
    fn zero_session_limits_fail() {
        let err = config_from(&[("SESSION_IDLE_TIMEOUT_SECS", "0")])
            .expect_err("expected invalid timeout");
        assert!(matches!(err, ConfigError::InvalidSessionTimeout));

        let err = config_from(&[("MAX_SESSIONS", "0")]).expect_err("expected invalid cap");
        assert!(matches!(err, ConfigError::InvalidMaxSessions));
    }

    #[test]
    fn port_override_is_used() {
        let config = config_from(&[("PORT", "9090"), ("BIND_ADDR", "127.0.0.1")])
            .expect("config should parse");
        assert_eq!(
            config.bind_socket().expect("socket"),
            "127.0.0.1:9090".parse().expect("valid socket")
        );
    }

    #[test]
    fn invalid_port_fails() {
        let err = config_from(&[("PORT", "eighty")]).expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = config_from(&[("BIND_ADDR", "not an address")])
            .expect_err("expected invalid socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }
}
