//! Authorization-code flow entry point
//!
//! Generates the CSRF `state` token carried by each `UserCredentials` and
//! builds the URL the user visits to grant access. The authorization server
//! echoes `state` back on the redirect; the client compares it against the
//! stored value before exchanging the code.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

use crate::credentials::ClientCredentials;
use crate::error::{Error, Result};

/// Generate a cryptographically random CSRF state token.
///
/// 32 random bytes encoded as URL-safe base64 without padding (43 chars), so
/// the value survives the redirect round-trip without escaping issues.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL for the code flow.
///
/// `state` is omitted when `None` (state checking disabled). Scopes are
/// joined with spaces and form-encoded along with the other parameters.
pub fn build_authorization_url(
    authorize_endpoint: &str,
    client: &ClientCredentials,
    state: Option<&str>,
) -> Result<String> {
    let client_id = client
        .client_id
        .as_deref()
        .ok_or_else(|| Error::Config("client_id is required to build an authorization URL".into()))?;
    let redirect_uri = client.redirect_uri.as_deref().ok_or_else(|| {
        Error::Config("redirect_uri is required to build an authorization URL".into())
    })?;
    let scopes = client.scopes.join(" ");

    let mut params = vec![
        ("client_id", client_id),
        ("response_type", "code"),
        ("redirect_uri", redirect_uri),
        ("scopes", scopes.as_str()),
    ];
    if let Some(state) = state {
        params.push(("state", state));
    }

    let url = reqwest::Url::parse_with_params(authorize_endpoint, &params)
        .map_err(|e| Error::Config(format!("invalid authorize endpoint {authorize_endpoint}: {e}")))?;
    Ok(url.to_string())
}
