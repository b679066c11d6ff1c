//! OAuth token exchanges
//!
//! All three grants POST a form-encoded body to the token endpoint,
//! authenticated with the application's Basic credentials:
//! 1. Client credentials (application-only access)
//! 2. Authorization code (completes the user authorization flow)
//! 3. Refresh token (renews an expired user access token)
//!
//! Any failure reported by the token endpoint surfaces as
//! `Error::Authentication`, keeping the HTTP context of the response.

use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credentials::{ClientCredentials, UserCredentials, now_millis};
use crate::error::{Error, ErrorDetail, Result};
use crate::header::basic_authorization;
use crate::request::ApiRequest;
use crate::transport::Transport;

/// Response from the token endpoint for every grant.
///
/// `expires_in` is a delta in seconds from the response time; `scope` is a
/// space-separated list. Refresh responses may omit `refresh_token`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry in unix milliseconds, relative to `now`.
    pub fn expiry_from(&self, now: u64) -> u64 {
        now.saturating_add(self.expires_in.saturating_mul(1000))
    }

    /// Partial client record holding only the new token and its expiry.
    pub fn into_client_credentials(self) -> ClientCredentials {
        let expiry = self.expiry_from(now_millis());
        ClientCredentials {
            access_token: Some(Secret::new(self.access_token)),
            expiry: Some(expiry),
            ..Default::default()
        }
    }

    /// Partial user record: token, scopes, expiry and (if sent) the refresh
    /// token. No `state` and no `user_id`, so merging keeps the stored ones.
    pub fn into_user_credentials(self) -> UserCredentials {
        let expiry = self.expiry_from(now_millis());
        UserCredentials {
            access_token: Some(Secret::new(self.access_token)),
            refresh_token: self.refresh_token.map(Secret::new),
            scopes: self
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            expiry: Some(expiry),
            user_id: None,
            state: None,
        }
    }
}

/// Client-credentials grant.
///
/// Fails without touching the network if the client id or secret is missing
/// or empty.
pub async fn request_client_token(
    transport: &Transport,
    token_url: &str,
    client: &ClientCredentials,
) -> Result<TokenResponse> {
    let id_set = client.client_id.as_deref().is_some_and(|id| !id.is_empty());
    let secret_set = client.client_secret().is_some_and(|secret| !secret.is_empty());
    if !id_set || !secret_set {
        return Err(Error::auth("No client credentials set"));
    }
    let token = post_token(
        transport,
        token_url,
        client,
        vec![("grant_type", "client_credentials".to_string())],
        "failed to authenticate with client credentials",
    )
    .await?;
    info!("client credentials exchange succeeded");
    Ok(token)
}

/// Authorization-code grant: exchange the code from the redirect for tokens.
pub async fn request_user_token(
    transport: &Transport,
    token_url: &str,
    client: &ClientCredentials,
    code: &str,
) -> Result<TokenResponse> {
    let redirect_uri = client
        .redirect_uri
        .clone()
        .ok_or_else(|| Error::Config("redirect_uri is required for the code exchange".into()))?;
    let token = post_token(
        transport,
        token_url,
        client,
        vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri),
        ],
        "authorization code exchange failed",
    )
    .await?;
    info!("authorization code exchange succeeded");
    Ok(token)
}

/// Refresh-token grant.
pub async fn refresh_user_token(
    transport: &Transport,
    token_url: &str,
    client: &ClientCredentials,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let token = post_token(
        transport,
        token_url,
        client,
        vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ],
        "token refresh failed",
    )
    .await?;
    info!("user token refresh succeeded");
    Ok(token)
}

async fn post_token(
    transport: &Transport,
    token_url: &str,
    client: &ClientCredentials,
    form: Vec<(&'static str, String)>,
    failure: &str,
) -> Result<TokenResponse> {
    let request = ApiRequest::post(token_url)
        .header(AUTHORIZATION, basic_authorization(client)?)
        .header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        )
        .form(form);

    debug!(url = token_url, "requesting token");
    let response = transport
        .send(&request)
        .await
        .map_err(|e| e.into_authentication(failure))?;

    response.json::<TokenResponse>().await.map_err(|e| {
        Error::Authentication(Box::new(
            ErrorDetail::new(format!("{failure}: invalid token response"))
                .with_request(request.info())
                .with_source(e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use tokio::net::TcpListener;

    use super::*;
    use crate::transport::TransportConfig;

    /// Token endpoint mock recording every form body it receives.
    #[derive(Clone, Default)]
    struct TokenEndpoint {
        calls: Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>,
    }

    async fn token_handler(
        State(endpoint): State<TokenEndpoint>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        endpoint.calls.lock().unwrap().push((auth, form.clone()));

        match form.get("grant_type").map(String::as_str) {
            Some("client_credentials") => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "access_token": "client-token",
                    "token_type": "Bearer",
                    "expires_in": 3600
                })),
            ),
            Some("authorization_code") if form.get("code").map(String::as_str) == Some("good") => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "access_token": "user-token",
                    "token_type": "Bearer",
                    "scope": "a b c",
                    "expires_in": 3600,
                    "refresh_token": "user-refresh"
                })),
            ),
            Some("refresh_token") if form.get("refresh_token").map(String::as_str) == Some("R") => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "access_token": "refreshed-token",
                    "token_type": "Bearer",
                    "scope": "a b c",
                    "expires_in": 3600
                })),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid authorization code"
                })),
            ),
        }
    }

    async fn start_token_endpoint() -> (String, TokenEndpoint) {
        let endpoint = TokenEndpoint::default();
        let app = Router::new()
            .route("/api/token", post(token_handler))
            .with_state(endpoint.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api/token"), endpoint)
    }

    fn transport() -> Transport {
        Transport::new(&TransportConfig::default()).unwrap()
    }

    #[test]
    fn token_response_deserializes_minimal_body() {
        let json = r#"{"access_token":"at_abc","expires_in":3600}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.expires_in, 3600);
        assert!(token.scope.is_none());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn scopes_split_on_whitespace() {
        let json = r#"{"access_token":"at","expires_in":60,"scope":"a b  c"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        let creds = token.into_user_credentials();
        assert_eq!(creds.scopes, vec!["a", "b", "c"]);
        assert!(creds.refresh_token.is_none());
        assert!(creds.state.is_none());
        assert_eq!(creds.access_is_expired(), Some(false));
    }

    #[test]
    fn merging_parsed_token_keeps_stored_refresh_token() {
        let json = r#"{"access_token":"new","expires_in":60,"scope":"a b c"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();

        let mut stored = UserCredentials::with_access_token("old").with_refresh_token("R");
        let state = stored.state().map(str::to_owned);
        stored.merge(token.into_user_credentials());

        assert_eq!(stored.access_token(), Some("new"));
        assert_eq!(stored.refresh_token(), Some("R"));
        assert_eq!(stored.scopes, vec!["a", "b", "c"]);
        assert_eq!(stored.state().map(str::to_owned), state);
    }

    #[test]
    fn expiry_is_absolute_millis() {
        let token = TokenResponse {
            access_token: "at".into(),
            token_type: None,
            expires_in: 3600,
            scope: None,
            refresh_token: None,
        };
        assert_eq!(token.expiry_from(1_000), 3_601_000);
    }

    #[tokio::test]
    async fn client_grant_without_secret_never_calls_network() {
        let (url, endpoint) = start_token_endpoint().await;
        let client = ClientCredentials {
            client_secret: None,
            ..ClientCredentials::new("X", "Y")
        };

        let err = request_client_token(&transport(), &url, &client)
            .await
            .unwrap_err();

        assert!(err.is_authentication(), "got: {err:?}");
        assert!(endpoint.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_grant_with_empty_id_or_secret_never_calls_network() {
        let (url, endpoint) = start_token_endpoint().await;

        for client in [
            ClientCredentials::new("X", ""),
            ClientCredentials::new("", "Y"),
        ] {
            let err = request_client_token(&transport(), &url, &client)
                .await
                .unwrap_err();
            assert!(err.is_authentication(), "got: {err:?}");
        }
        assert!(endpoint.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_grant_sends_basic_auth_and_grant_type() {
        let (url, endpoint) = start_token_endpoint().await;
        let client = ClientCredentials::new("X", "Y");

        let token = request_client_token(&transport(), &url, &client)
            .await
            .unwrap();
        assert_eq!(token.access_token, "client-token");

        let calls = endpoint.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (auth, form) = &calls[0];
        assert_eq!(auth.as_deref(), Some("Basic WDpZ"));
        assert_eq!(form.get("grant_type").unwrap(), "client_credentials");
    }

    #[tokio::test]
    async fn code_grant_sends_code_and_redirect_uri() {
        let (url, endpoint) = start_token_endpoint().await;
        let client =
            ClientCredentials::new("X", "Y").with_redirect_uri("http://localhost:8888/callback");

        let token = request_user_token(&transport(), &url, &client, "good")
            .await
            .unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("user-refresh"));

        let calls = endpoint.calls.lock().unwrap();
        let (_, form) = &calls[0];
        assert_eq!(form.get("grant_type").unwrap(), "authorization_code");
        assert_eq!(form.get("code").unwrap(), "good");
        assert_eq!(
            form.get("redirect_uri").unwrap(),
            "http://localhost:8888/callback"
        );
    }

    #[tokio::test]
    async fn rejected_code_is_an_authentication_error() {
        let (url, _endpoint) = start_token_endpoint().await;
        let client = ClientCredentials::new("X", "Y");

        let err = request_user_token(&transport(), &url, &client, "bogus")
            .await
            .unwrap_err();

        assert!(err.is_authentication(), "got: {err:?}");
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("Invalid authorization code"), "got: {err}");
    }

    #[tokio::test]
    async fn refresh_grant_returns_new_token() {
        let (url, endpoint) = start_token_endpoint().await;
        let client = ClientCredentials::new("X", "Y");

        let token = refresh_user_token(&transport(), &url, &client, "R")
            .await
            .unwrap();
        assert_eq!(token.access_token, "refreshed-token");
        assert!(token.refresh_token.is_none());

        let calls = endpoint.calls.lock().unwrap();
        assert_eq!(calls[0].1.get("grant_type").unwrap(), "refresh_token");
    }

    #[tokio::test]
    async fn refresh_with_revoked_token_is_an_authentication_error() {
        let (url, _endpoint) = start_token_endpoint().await;
        let client = ClientCredentials::new("X", "Y");

        let err = refresh_user_token(&transport(), &url, &client, "revoked")
            .await
            .unwrap_err();
        assert!(err.is_authentication(), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_without_client_secret_is_a_config_error() {
        let (url, endpoint) = start_token_endpoint().await;
        let client = ClientCredentials {
            client_secret: None,
            ..ClientCredentials::new("X", "Y")
        };

        let err = refresh_user_token(&transport(), &url, &client, "R")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got: {err:?}");
        assert!(endpoint.calls.lock().unwrap().is_empty());
    }
}
