//! Authorization header builders
//!
//! Basic credentials authenticate the application at the token endpoint;
//! Bearer tokens authorize resource requests on behalf of the active caller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderValue;

use crate::credentials::ClientCredentials;
use crate::error::{Error, Result};

/// `Basic base64(client_id:client_secret)`.
///
/// Fails with a configuration error if either half is missing.
pub fn basic_authorization(client: &ClientCredentials) -> Result<HeaderValue> {
    let (Some(client_id), Some(client_secret)) = (client.client_id.as_deref(), client.client_secret())
    else {
        return Err(Error::Config(
            "no client credentials found to make an authorization header".into(),
        ));
    };
    let encoded = STANDARD.encode(format!("{client_id}:{client_secret}"));
    sensitive(format!("Basic {encoded}"))
}

/// `Bearer <access_token>`.
pub fn bearer_authorization(access_token: &str) -> Result<HeaderValue> {
    sensitive(format!("Bearer {access_token}"))
}

fn sensitive(value: String) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&value)
        .map_err(|e| Error::Config(format!("invalid authorization header value: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}
