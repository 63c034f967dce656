//! Guardian configuration

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use guardian_domain::AuthorizationList;

use crate::bridge::BridgeSettings;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Configuration loaded from `GUARDIAN_*` environment variables
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Whether the command server starts at all
    pub enabled: bool,
    /// Listen address (loopback by default)
    pub server_host: IpAddr,
    /// Listen port
    pub server_port: u16,
    /// Discord ids allowed to run trade commands
    pub authorized_ids: AuthorizationList,
    /// Default verbosity when RUST_LOG is unset
    pub log_level: String,
    /// HTTP worker threads
    pub worker_threads: usize,
    /// How long a request waits for its result
    pub request_timeout: Duration,
    /// Host tick interval (drives the simulated host loop)
    pub tick_interval: Duration,

    /// Command queue configuration
    pub queue: QueueConfig,

    /// Trade configuration
    pub trade: TradeConfig,
}

/// Command queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum queued commands before callers get ServerBusy
    pub capacity: usize,
    /// Commands drained per host tick (0 pauses draining)
    pub commands_per_tick: usize,
}

/// Trade automation configuration
#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Capture a screenshot after accepting a trade
    pub screenshot_trades: bool,
    /// Accept automatically once the partner accepts our pending offer
    pub auto_accept_trades: bool,
    /// How long a sent request may wait for the window to open
    pub request_timeout: Duration,
    /// How long Accepted/Declined linger before resetting
    pub grace_period: Duration,
}

impl GuardianConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("GUARDIAN_LOG_LEVEL")
            .map(|level| level.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "info".to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::Invalid {
                key: "GUARDIAN_LOG_LEVEL",
                value: log_level,
                expected: "one of trace, debug, info, warn, error",
            });
        }

        Ok(Self {
            enabled: flag(&lookup, "GUARDIAN_ENABLED", true)?,
            server_host: parse(
                &lookup,
                "GUARDIAN_HOST",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                "an IP address",
            )?,
            server_port: parse(&lookup, "GUARDIAN_PORT", 9001, "a valid port number")?,
            authorized_ids: lookup("GUARDIAN_AUTHORIZED_IDS")
                .map(|raw| AuthorizationList::parse_csv(&raw))
                .unwrap_or_default(),
            log_level,
            worker_threads: positive(&lookup, "GUARDIAN_WORKER_THREADS", 2)?,
            request_timeout: millis(&lookup, "GUARDIAN_REQUEST_TIMEOUT_MS", 3000)?,
            tick_interval: millis(&lookup, "GUARDIAN_TICK_INTERVAL_MS", 600)?,

            queue: QueueConfig {
                capacity: positive(&lookup, "GUARDIAN_QUEUE_CAPACITY", 32)?,
                commands_per_tick: parse(
                    &lookup,
                    "GUARDIAN_COMMANDS_PER_TICK",
                    2,
                    "a non-negative integer",
                )?,
            },

            trade: TradeConfig {
                screenshot_trades: flag(&lookup, "GUARDIAN_SCREENSHOT_TRADES", true)?,
                auto_accept_trades: flag(&lookup, "GUARDIAN_AUTO_ACCEPT_TRADES", false)?,
                request_timeout: Duration::from_secs(parse(
                    &lookup,
                    "GUARDIAN_TRADE_REQUEST_TIMEOUT_SECS",
                    30,
                    "a number of seconds",
                )?),
                grace_period: Duration::from_secs(parse(
                    &lookup,
                    "GUARDIAN_TRADE_GRACE_SECS",
                    5,
                    "a number of seconds",
                )?),
            },
        })
    }

    /// Re-read only the authorized id list from the environment.
    pub fn authorized_ids_from_env() -> AuthorizationList {
        env::var("GUARDIAN_AUTHORIZED_IDS")
            .map(|raw| AuthorizationList::parse_csv(&raw))
            .unwrap_or_default()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_host, self.server_port)
    }

    /// Tracing filter used when RUST_LOG is unset.
    pub fn default_log_filter(&self) -> String {
        format!(
            "guardian_engine={level},guardian_domain={level},tower_http={level}",
            level = self.log_level
        )
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            queue_capacity: self.queue.capacity,
            commands_per_tick: self.queue.commands_per_tick,
            trade_request_timeout: self.trade.request_timeout,
            trade_grace_period: self.trade.grace_period,
            auto_accept_trades: self.trade.auto_accept_trades,
            screenshot_trades: self.trade.screenshot_trades,
        }
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            expected,
        }),
    }
}

fn positive<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let expected = "a positive integer";
    let value = parse(lookup, key, default, expected)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            expected,
        });
    }
    Ok(value)
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let expected = "a positive number of milliseconds";
    let value: u64 = parse(lookup, key, default, expected)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            expected,
        });
    }
    Ok(Duration::from_millis(value))
}

fn flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            expected: "true or false",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GuardianConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GuardianConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_plugin_settings() {
        let config = load(&[]).unwrap();
        assert!(config.enabled);
        assert_eq!(config.bind_addr(), "127.0.0.1:9001".parse::<SocketAddr>().unwrap());
        assert!(config.authorized_ids.is_empty());
        assert_eq!(config.log_level, "info");
        assert!(config.trade.screenshot_trades);
        assert!(!config.trade.auto_accept_trades);
        assert_eq!(config.queue.capacity, 32);
        assert_eq!(config.queue.commands_per_tick, 2);
        assert_eq!(config.request_timeout, Duration::from_millis(3000));
        assert_eq!(config.tick_interval, Duration::from_millis(600));
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("GUARDIAN_ENABLED", "false"),
            ("GUARDIAN_HOST", "0.0.0.0"),
            ("GUARDIAN_PORT", "9100"),
            ("GUARDIAN_AUTHORIZED_IDS", "1001, 1002"),
            ("GUARDIAN_LOG_LEVEL", "DEBUG"),
            ("GUARDIAN_AUTO_ACCEPT_TRADES", "yes"),
            ("GUARDIAN_COMMANDS_PER_TICK", "0"),
        ])
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.server_port, 9100);
        assert_eq!(config.server_host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(config.authorized_ids.contains("1002"));
        assert_eq!(config.log_level, "debug");
        assert!(config.trade.auto_accept_trades);
        assert_eq!(config.bridge_settings().commands_per_tick, 0);
        assert_eq!(
            config.default_log_filter(),
            "guardian_engine=debug,guardian_domain=debug,tower_http=debug"
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            load(&[("GUARDIAN_PORT", "ninety")]).unwrap_err(),
            ConfigError::Invalid {
                key: "GUARDIAN_PORT",
                value: "ninety".to_string(),
                expected: "a valid port number",
            }
        );
        assert!(load(&[("GUARDIAN_QUEUE_CAPACITY", "0")]).is_err());
        assert!(load(&[("GUARDIAN_ENABLED", "maybe")]).is_err());
        assert!(load(&[("GUARDIAN_LOG_LEVEL", "loud")]).is_err());
        assert!(load(&[("GUARDIAN_REQUEST_TIMEOUT_MS", "0")]).is_err());
    }
}
