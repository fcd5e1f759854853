//! IMAP connection configuration

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

/// How the transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (imaps, port 993).
    Tls,
    /// Plain connect, then `STARTTLS` (port 143).
    StartTls,
}

impl Security {
    /// The well-known port for this kind of transport.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Tls => 993,
            Self::StartTls => 143,
        }
    }
}

impl FromStr for Security {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "imaps" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!("Invalid IMAP_SECURITY: {other}"))),
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tls => "tls",
            Self::StartTls => "starttls",
        })
    }
}

/// Everything needed to open (and reopen) a session.
#[derive(Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: Security,
    /// Convert folder names to and from modified UTF-7.
    pub folder_encode: bool,
    /// Skip certificate verification (self-signed test servers).
    pub accept_invalid_certs: bool,
}

impl ImapConfig {
    /// A configuration with the usual defaults for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Security::Tls.default_port(),
            username: username.into(),
            password: password.into(),
            security: Security::Tls,
            folder_encode: true,
            accept_invalid_certs: false,
        }
    }

    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_SECURITY` (`tls` or `starttls`, default: `tls`)
    /// - `IMAP_PORT` (default: `993` for tls, `143` for starttls)
    /// - `IMAP_FOLDER_ENCODE` (default: `true`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let security: Security = match env::var("IMAP_SECURITY") {
            Ok(value) => value.parse()?,
            Err(_) => Security::Tls,
        };
        let port = match env::var("IMAP_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            Err(_) => security.default_port(),
        };

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            username: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            password: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            security,
            folder_encode: env_bool("IMAP_FOLDER_ENCODE", true)?,
            accept_invalid_certs: env_bool("IMAP_ACCEPT_INVALID_CERTS", false)?,
        })
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    env::var(name).map_or(Ok(default), |value| parse_bool(&value).ok_or_else(|| {
        Error::Config(format!("Invalid {name}: {value}"))
    }))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// The password stays out of logs.
impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("security", &self.security)
            .field("folder_encode", &self.folder_encode)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}
