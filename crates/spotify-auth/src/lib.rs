//! Spotify OAuth building blocks
//!
//! Credential records, header builders, the shared HTTP transport and the
//! three token exchanges. This crate holds no caller state; the
//! `spotify-client` crate layers the active-caller state machine and the
//! refreshing request dispatcher on top of it.
//!
//! Authorization-code flow:
//! 1. `authorize::build_authorization_url()` with the user record's `state`
//! 2. The user authorizes and is redirected back with `code` and `state`
//! 3. `token::request_user_token()` exchanges the code
//! 4. `token::refresh_user_token()` renews the access token on expiry
//! 5. `persist::save()` stores the record between runs

pub mod authorize;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod header;
pub mod persist;
pub mod request;
pub mod token;
pub mod transport;

pub use authorize::{build_authorization_url, generate_state};
pub use constants::*;
pub use credentials::{ClientCredentials, UserCredentials, now_millis};
pub use error::{Error, ErrorDetail, RequestInfo, Result};
pub use header::{basic_authorization, bearer_authorization};
pub use request::{ApiRequest, RequestBody};
pub use token::{TokenResponse, refresh_user_token, request_client_token, request_user_token};
pub use transport::{Transport, TransportConfig};
