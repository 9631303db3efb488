use std::net::{SocketAddr, ToSocketAddrs};
use thiserror::Error;

use crate::session::DEFAULT_PREVIEW_ROWS;

pub const ADDR_VAR: &str = "DATA_SWEEPER_ADDR";
pub const MAX_UPLOAD_VAR: &str = "DATA_SWEEPER_MAX_UPLOAD_MB";
pub const PREVIEW_ROWS_VAR: &str = "DATA_SWEEPER_PREVIEW_ROWS";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("Invalid value {value:?} for {key}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Server settings
///
/// Resolved from, lowest precedence first: built-in defaults, the
/// `DATA_SWEEPER_*` environment variables, and a positional `<host:port>`
/// command-line argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub preview_rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_bytes: 200 * 1024 * 1024,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment and arguments.
    pub fn from_env(args: &[String]) -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok(), args)
    }

    /// Resolve with an explicit variable lookup; `args[0]` is the program name.
    pub fn resolve<F>(lookup: F, args: &[String]) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ADDR_VAR) {
            config.addr = parse_addr(&addr)?;
        }
        if let Some(mb) = lookup(MAX_UPLOAD_VAR) {
            config.max_upload_bytes = parse_number(MAX_UPLOAD_VAR, &mb)?
                .checked_mul(1024 * 1024)
                .ok_or_else(|| ConfigError::InvalidNumber {
                    key: MAX_UPLOAD_VAR,
                    value: mb.clone(),
                })?;
        }
        if let Some(rows) = lookup(PREVIEW_ROWS_VAR) {
            config.preview_rows = parse_number(PREVIEW_ROWS_VAR, &rows)?;
        }
        if let Some(addr) = args.get(1) {
            config.addr = parse_addr(addr)?;
        }

        Ok(config)
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidAddress(value.to_string()))
}

fn parse_number(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
}
