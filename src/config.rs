//! Client configuration and provider endpoint derivation.
//!
//! A [`Config`] names the data provider, the API key, and (for the MANUAL
//! provider) the host to dial. The API key may come from the config file or
//! from the `INTRINIO_API_KEY` environment variable.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{ConfigError, Result};

/// Which realtime feed endpoint to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// Consolidated US options tape.
    Opra,
    DelayedSip,
    NasdaqBasic,
    CboeOne,
    Iex,
    /// Host-supplied IP address (testing / private relays).
    Manual,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Opra => "OPRA",
            Provider::DelayedSip => "DELAYED_SIP",
            Provider::NasdaqBasic => "NASDAQ_BASIC",
            Provider::CboeOne => "CBOE_ONE",
            Provider::Iex => "IEX",
            Provider::Manual => "MANUAL",
        }
    }

    fn host(&self) -> &'static str {
        match self {
            Provider::Opra => "realtime-options.intrinio.com",
            Provider::DelayedSip => "realtime-delayed-sip.intrinio.com",
            Provider::NasdaqBasic => "realtime-nasdaq-basic.intrinio.com",
            Provider::CboeOne => "cboe-one.intrinio.com",
            Provider::Iex => "realtime-mx.intrinio.com",
            Provider::Manual => "",
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, ConfigError> {
        match s {
            "OPRA" => Ok(Provider::Opra),
            "DELAYED_SIP" => Ok(Provider::DelayedSip),
            "NASDAQ_BASIC" => Ok(Provider::NasdaqBasic),
            "CBOE_ONE" => Ok(Provider::CboeOne),
            "IEX" => Ok(Provider::Iex),
            "MANUAL" => Ok(Provider::Manual),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = ConfigError;

    fn try_from(s: String) -> std::result::Result<Self, ConfigError> {
        s.parse()
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> String {
        p.as_str().to_string()
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    pub provider: Provider,
    #[serde(default, alias = "IPAddress")]
    pub ip_address: String,
}

impl Config {
    pub fn new(api_key: impl Into<String>, provider: Provider) -> Self {
        Config {
            api_key: api_key.into(),
            provider,
            ip_address: String::new(),
        }
    }

    /// Load configuration from a JSON file, falling back to the
    /// `INTRINIO_API_KEY` environment variable for a blank key.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        info!(path = %path.display(), "Client - Loading application configuration");
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut config: Config =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.api_key.trim().is_empty() {
            config.api_key = std::env::var("INTRINIO_API_KEY").unwrap_or_default();
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey.into());
        }
        if self.provider == Provider::Manual && self.ip_address.trim().is_empty() {
            return Err(ConfigError::MissingIpAddress.into());
        }
        Ok(())
    }

    /// HTTPS endpoint that exchanges the API key for an opaque session token.
    pub fn auth_url(&self) -> String {
        match self.provider {
            Provider::Manual => format!("http://{}/auth?api_key={}", self.ip_address, self.api_key),
            p => format!("https://{}/auth?api_key={}", p.host(), self.api_key),
        }
    }

    /// Streaming endpoint for a given session token.
    pub fn websocket_url(&self, token: &str) -> String {
        match self.provider {
            Provider::Manual => format!(
                "ws://{}/socket/websocket?vsn=1.0.0&token={}",
                self.ip_address, token
            ),
            p => format!(
                "wss://{}/socket/websocket?vsn=1.0.0&token={}",
                p.host(),
                token
            ),
        }
    }
}
