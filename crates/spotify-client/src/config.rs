//! Client configuration
//!
//! Every field has a default, so an empty `[client]` table (or none at all)
//! yields a client talking to the real Spotify endpoints with a 7 second
//! timeout and up to 10 rate-limit retries.

use std::time::Duration;

use serde::Deserialize;
use spotify_auth::{
    ACCOUNTS_BASE_URL, API_BASE_URL, AUTHORIZE_PATH, Error, Result, TOKEN_PATH, TransportConfig,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds before a request fails with a timeout error
    pub timeout_secs: u64,
    /// Automatic retries of rate-limited GET/PUT/DELETE requests
    pub max_retries: u32,
    /// Seconds before the first rate-limit retry; doubled on each retry
    pub backoff_factor: f64,
    /// Proxy URL for all outbound traffic
    pub proxy: Option<String>,
    /// Probe the API whenever user credentials are set, failing if rejected
    pub ensure_user_auth: bool,
    /// Send and verify the CSRF `state` in the authorization-code flow
    pub enforce_state_check: bool,
    pub api_base_url: String,
    pub accounts_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 7,
            max_retries: 10,
            backoff_factor: 0.1,
            proxy: None,
            ensure_user_auth: false,
            enforce_state_check: true,
            api_base_url: API_BASE_URL.to_string(),
            accounts_base_url: ACCOUNTS_BASE_URL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        self.backoff()?;
        for (name, url) in [
            ("api_base_url", &self.api_base_url),
            ("accounts_base_url", &self.accounts_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }
        Ok(())
    }

    pub fn transport(&self) -> Result<TransportConfig> {
        Ok(TransportConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            backoff_factor: self.backoff()?,
            proxy: self.proxy.clone(),
        })
    }

    fn backoff(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.backoff_factor).map_err(|_| {
            Error::Config(format!(
                "backoff_factor must be a non-negative number of seconds, got: {}",
                self.backoff_factor
            ))
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.accounts_base_url.trim_end_matches('/'))
    }

    pub fn authorize_url(&self) -> String {
        format!(
            "{}{AUTHORIZE_PATH}",
            self.accounts_base_url.trim_end_matches('/')
        )
    }
}
