//! Credential records for the two OAuth callers
//!
//! `ClientCredentials` identifies the application (client id/secret, OAuth
//! settings, and the access token obtained through the client-credentials
//! grant). `UserCredentials` holds a user's tokens obtained through the
//! authorization-code grant plus the CSRF `state` sent with the authorize URL.
//!
//! Every field is optional: records are built up incrementally across the
//! OAuth flow. `expiry` is an absolute unix timestamp in milliseconds (UTC),
//! computed from the token endpoint's `expires_in` delta at exchange time.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::authorize::generate_state;
use crate::constants::{ALL_SCOPES, DEFAULT_REDIRECT_URI};
use crate::error::{Error, Result};

/// Current time as a unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// `Some(true)` once `expiry` lies strictly before `now`, `Some(false)` before
/// that, `None` when no expiry is known.
fn expired_at(expiry: Option<u64>, now: u64) -> Option<bool> {
    expiry.map(|expiry| expiry < now)
}

fn required_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name).ok_or_else(|| Error::Config(format!("environment variable {name} is not set")))
}

/// Application credentials and OAuth settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    /// Permission scopes requested in the authorization URL
    pub scopes: Vec<String>,
    pub redirect_uri: Option<String>,
    /// Whether Spotify re-prompts a user that already authorized the app
    pub show_dialog: Option<bool>,
    /// Token from the client-credentials grant
    pub access_token: Option<Secret<String>>,
    /// Expiration as unix timestamp in milliseconds
    pub expiry: Option<u64>,
}

impl ClientCredentials {
    /// Credentials with the default OAuth settings: every scope,
    /// `http://localhost` as redirect URI, and no forced dialog.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(Secret::new(client_secret.into())),
            scopes: ALL_SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_uri: Some(DEFAULT_REDIRECT_URI.to_string()),
            show_dialog: Some(false),
            access_token: None,
            expiry: None,
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_show_dialog(mut self, show_dialog: bool) -> Self {
        self.show_dialog = Some(show_dialog);
        self
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_ref().map(|t| t.expose().as_str())
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_ref().map(|s| s.expose().as_str())
    }

    /// See [`UserCredentials::access_is_expired`].
    pub fn access_is_expired(&self) -> Option<bool> {
        expired_at(self.expiry, now_millis())
    }

    /// Whether the authorization-code flow can start: client id, redirect
    /// URI, scopes and the dialog flag are all set.
    pub fn is_oauth_ready(&self) -> bool {
        self.client_id.as_deref().is_some_and(|id| !id.is_empty())
            && self.redirect_uri.as_deref().is_some_and(|uri| !uri.is_empty())
            && !self.scopes.is_empty()
            && self.show_dialog.is_some()
    }

    /// Overwrite every field that is present on `update`. Absent fields (and
    /// an empty scope list) leave the stored value untouched.
    pub fn merge(&mut self, update: ClientCredentials) {
        if update.client_id.is_some() {
            self.client_id = update.client_id;
        }
        if update.client_secret.is_some() {
            self.client_secret = update.client_secret;
        }
        if !update.scopes.is_empty() {
            self.scopes = update.scopes;
        }
        if update.redirect_uri.is_some() {
            self.redirect_uri = update.redirect_uri;
        }
        if update.show_dialog.is_some() {
            self.show_dialog = update.show_dialog;
        }
        if update.access_token.is_some() {
            self.access_token = update.access_token;
        }
        if update.expiry.is_some() {
            self.expiry = update.expiry;
        }
    }

    /// Read `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` and
    /// `SPOTIFY_REDIRECT_URI` from the process environment.
    pub fn load_from_env(&mut self) -> Result<()> {
        self.load_from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`load_from_env`](Self::load_from_env) with an explicit lookup.
    /// Nothing is modified unless all three variables are present.
    pub fn load_from_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let client_id = required_var(&lookup, "SPOTIFY_CLIENT_ID")?;
        let client_secret = required_var(&lookup, "SPOTIFY_CLIENT_SECRET")?;
        let redirect_uri = required_var(&lookup, "SPOTIFY_REDIRECT_URI")?;
        self.client_id = Some(client_id);
        self.client_secret = Some(Secret::new(client_secret));
        self.redirect_uri = Some(redirect_uri);
        Ok(())
    }
}

/// A user's tokens from the authorization-code grant.
///
/// `Default` generates a fresh CSRF `state`; records parsed from a token
/// response carry none, so merging them keeps the stored state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCredentials {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub scopes: Vec<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expiry: Option<u64>,
    /// Spotify user id, resolved once through `/me` and cached
    pub user_id: Option<String>,
    /// CSRF token sent with the authorization URL and checked on callback
    pub state: Option<Secret<String>>,
}

impl Default for UserCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl UserCredentials {
    /// Empty record with a freshly generated CSRF state.
    pub fn new() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            scopes: Vec::new(),
            expiry: None,
            user_id: None,
            state: Some(Secret::new(generate_state())),
        }
    }

    /// Record holding an existing access token, e.g. one bootstrapped from
    /// the environment.
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(Secret::new(access_token.into())),
            ..Self::new()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token.into()));
        self
    }

    pub fn with_expiry(mut self, expiry_millis: u64) -> Self {
        self.expiry = Some(expiry_millis);
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(Secret::new(state.into()));
        self
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_ref().map(|t| t.expose().as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose().as_str())
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.expose().as_str())
    }

    /// `Some(true)` if the expiry has passed, `Some(false)` if it lies in the
    /// future, `None` if unknown. Unknown means: don't refresh proactively,
    /// wait for the API to report expiry.
    pub fn access_is_expired(&self) -> Option<bool> {
        expired_at(self.expiry, now_millis())
    }

    /// Overwrite every field that is present on `update`. Absent fields (and
    /// an empty scope list) leave the stored value untouched.
    pub fn merge(&mut self, update: UserCredentials) {
        if update.access_token.is_some() {
            self.access_token = update.access_token;
        }
        if update.refresh_token.is_some() {
            self.refresh_token = update.refresh_token;
        }
        if !update.scopes.is_empty() {
            self.scopes = update.scopes;
        }
        if update.expiry.is_some() {
            self.expiry = update.expiry;
        }
        if update.user_id.is_some() {
            self.user_id = update.user_id;
        }
        if update.state.is_some() {
            self.state = update.state;
        }
    }

    /// Read `SPOTIFY_ACCESS_TOKEN` (required), `SPOTIFY_USER_ID` and
    /// `SPOTIFY_REFRESH_TOKEN` from the process environment.
    pub fn load_from_env(&mut self) -> Result<()> {
        self.load_from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`load_from_env`](Self::load_from_env) with an explicit lookup.
    pub fn load_from_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let access_token = required_var(&lookup, "SPOTIFY_ACCESS_TOKEN")?;
        self.access_token = Some(Secret::new(access_token));
        self.user_id = lookup("SPOTIFY_USER_ID");
        self.refresh_token = lookup("SPOTIFY_REFRESH_TOKEN").map(Secret::new);
        Ok(())
    }
}
