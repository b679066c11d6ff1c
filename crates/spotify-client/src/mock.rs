//! In-process Spotify mock for tests
//!
//! Serves the token endpoint (`/api/token`) and a slice of the Web API
//! (`/v1/search`, `/v1/me`, `/v1/albums/{id}`) on a random local port.
//! Records every grant and every API call with the bearer header it carried,
//! and lets tests mark tokens as expired or rejected.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::config::ClientConfig;

pub(crate) const CLIENT_ID: &str = "X";
pub(crate) const CLIENT_SECRET: &str = "Y";
pub(crate) const GOOD_CODE: &str = "good-code";
pub(crate) const USER_ID: &str = "wizzler";

type Reply = (StatusCode, Json<Value>);

#[derive(Clone, Default)]
pub(crate) struct MockSpotify {
    grants: Arc<Mutex<Vec<String>>>,
    api_calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    expired: Arc<Mutex<HashSet<String>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
    refresh_override: Arc<Mutex<Option<String>>>,
    issued: Arc<AtomicUsize>,
}

impl MockSpotify {
    /// Grant types received by the token endpoint, in order.
    pub fn grants(&self) -> Vec<String> {
        self.grants.lock().unwrap().clone()
    }

    /// Authorization headers of every call to `path` (e.g. "/v1/search").
    pub fn calls_to(&self, path: &str) -> Vec<Option<String>> {
        self.api_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, auth)| auth.clone())
            .collect()
    }

    /// Answer requests bearing `token` with 401 "The access token expired".
    pub fn expire(&self, token: &str) {
        self.expired.lock().unwrap().insert(token.to_string());
    }

    /// Answer requests bearing `token` with 401 "Invalid access token".
    pub fn reject(&self, token: &str) {
        self.rejected.lock().unwrap().insert(token.to_string());
    }

    /// Make every refresh grant return `token` instead of a fresh one.
    pub fn refresh_returns(&self, token: &str) {
        *self.refresh_override.lock().unwrap() = Some(token.to_string());
    }

    fn next_id(&self) -> usize {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_bearer(&self, headers: &HeaderMap) -> Result<(), Reply> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let Some(token) = token else {
            return Err(api_error(StatusCode::UNAUTHORIZED, "No token provided"));
        };
        if self.expired.lock().unwrap().contains(token) {
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                "The access token expired",
            ));
        }
        if self.rejected.lock().unwrap().contains(token) {
            return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid access token"));
        }
        Ok(())
    }
}

fn api_error(status: StatusCode, message: &str) -> Reply {
    (
        status,
        Json(json!({"error": {"status": status.as_u16(), "message": message}})),
    )
}

fn auth_error(error: &str, description: &str) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": error, "error_description": description})),
    )
}

async fn token(
    State(mock): State<MockSpotify>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Reply {
    let grant = form.get("grant_type").cloned().unwrap_or_default();
    mock.grants.lock().unwrap().push(grant.clone());

    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{CLIENT_ID}:{CLIENT_SECRET}"))
    );
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return auth_error("invalid_client", "Invalid client");
    }

    match grant.as_str() {
        "client_credentials" => (
            StatusCode::OK,
            Json(json!({
                "access_token": format!("client-token-{}", mock.next_id()),
                "token_type": "Bearer",
                "expires_in": 3600
            })),
        ),
        "authorization_code" if form.get("code").map(String::as_str) == Some(GOOD_CODE) => (
            StatusCode::OK,
            Json(json!({
                "access_token": format!("user-token-{}", mock.next_id()),
                "token_type": "Bearer",
                "scope": "user-read-private user-read-email",
                "expires_in": 3600,
                "refresh_token": "user-refresh"
            })),
        ),
        "authorization_code" => auth_error("invalid_grant", "Invalid authorization code"),
        "refresh_token" if form.contains_key("refresh_token") && form["refresh_token"] != "revoked" => {
            let access_token = mock
                .refresh_override
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| format!("refreshed-token-{}", mock.next_id()));
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": access_token,
                    "token_type": "Bearer",
                    "scope": "user-read-private user-read-email",
                    "expires_in": 3600
                })),
            )
        }
        "refresh_token" => auth_error("invalid_grant", "Refresh token revoked"),
        _ => auth_error("unsupported_grant_type", "grant_type must be client_credentials, authorization_code or refresh_token"),
    }
}

async fn resource(State(mock): State<MockSpotify>, uri: Uri, headers: HeaderMap) -> Reply {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    mock.api_calls
        .lock()
        .unwrap()
        .push((uri.path().to_string(), auth));

    if let Err(reply) = mock.check_bearer(&headers) {
        return reply;
    }
    match uri.path() {
        "/v1/me" => (
            StatusCode::OK,
            Json(json!({"id": USER_ID, "display_name": "JM Wizzler"})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({"artists": {"items": [], "total": 0}})),
        ),
    }
}

async fn album(
    State(mock): State<MockSpotify>,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Reply {
    mock.api_calls
        .lock()
        .unwrap()
        .push((uri.path().to_string(), None));
    if let Err(reply) = mock.check_bearer(&headers) {
        return reply;
    }
    api_error(StatusCode::NOT_FOUND, &format!("non existing id: {id}"))
}

/// Start the mock and return it with a config pointing every endpoint at it.
pub(crate) async fn start() -> (MockSpotify, ClientConfig) {
    let mock = MockSpotify::default();
    let app = Router::new()
        .route("/api/token", post(token))
        .route("/v1/search", get(resource))
        .route("/v1/me", get(resource))
        .route("/v1/albums/{id}", get(album))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig {
        api_base_url: format!("http://{addr}/v1"),
        accounts_base_url: format!("http://{addr}"),
        backoff_factor: 0.0,
        ..Default::default()
    };
    (mock, config)
}
