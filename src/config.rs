use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::rpc::RetryPolicy;
use crate::scanner::ScanOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub eth_rpc_url: String,
    pub http_bind_addr: String,
    pub rpc_timeout: Duration,
    pub retry: RetryPolicy,
    pub scan: ScanOptions,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing ETH_RPC_URL env var")]
    MissingEthRpcUrl,
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let eth_rpc_url = lookup("ETH_RPC_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingEthRpcUrl)?;
        let http_bind_addr = lookup("HTTP_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, "RPC_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_var(&lookup, "RPC_RETRY_DELAY_MS", 2_000)?),
            multiplier: parse_var(&lookup, "RPC_RETRY_MULTIPLIER", defaults.multiplier)?,
            max_delay: Duration::from_millis(parse_var(&lookup, "RPC_RETRY_MAX_DELAY_MS", 30_000)?),
            jitter: parse_var(&lookup, "RPC_RETRY_JITTER", defaults.jitter)?,
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "RPC_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                var: "RPC_RETRY_MULTIPLIER",
                value: retry.multiplier.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::Invalid {
                var: "RPC_RETRY_JITTER",
                value: retry.jitter.to_string(),
            });
        }

        let scan_defaults = ScanOptions::default();
        let scan = ScanOptions {
            batch_size: parse_positive(&lookup, "SCAN_BATCH_SIZE", scan_defaults.batch_size)?,
            concurrency: parse_positive(&lookup, "SCAN_CONCURRENCY", scan_defaults.concurrency)?,
        };
        let rpc_timeout = Duration::from_secs(parse_var(&lookup, "RPC_TIMEOUT_SECS", 30)?);

        Ok(Self {
            eth_rpc_url,
            http_bind_addr,
            rpc_timeout,
            retry,
            scan,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var(lookup, var, default)? {
        0 => Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
        }),
        n => Ok(n),
    }
}
