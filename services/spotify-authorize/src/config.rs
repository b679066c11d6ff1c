//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from SPOTIFY_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use spotify_auth::{ALL_SCOPES, ClientCredentials, DEFAULT_REDIRECT_URI};
use spotify_client::ClientConfig;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Application registration and credential storage
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to SPOTIFY_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Requested scopes; empty means every scope
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub show_dialog: bool,
    /// Directory holding the persisted credential files
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. SPOTIFY_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, |name| std::env::var(name).ok())
    }

    fn parse(contents: &str, env: impl Fn(&str) -> Option<String>) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if config.spotify.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }
        if !config.spotify.redirect_uri.starts_with("http://")
            && !config.spotify.redirect_uri.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "redirect_uri must start with http:// or https://, got: {}",
                config.spotify.redirect_uri
            )));
        }
        config
            .client
            .validate()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if let Some(secret) = env("SPOTIFY_CLIENT_SECRET") {
            config.spotify.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.spotify.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.spotify.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("spotify-authorize.toml")
    }

    /// Application credentials described by this config.
    pub fn client_credentials(&self) -> ClientCredentials {
        let scopes = if self.spotify.scopes.is_empty() {
            ALL_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            self.spotify.scopes.clone()
        };
        ClientCredentials {
            client_id: Some(self.spotify.client_id.clone()),
            client_secret: self.spotify.client_secret.clone(),
            scopes,
            redirect_uri: Some(self.spotify.redirect_uri.clone()),
            show_dialog: Some(self.spotify.show_dialog),
            ..Default::default()
        }
    }
}
