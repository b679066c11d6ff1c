//! Spotify Web API client core
//!
//! Tracks which credential set (application or user) authorizes requests,
//! refreshes tokens transparently, and retries a request once when the API
//! reports an expired token. Resource endpoints are thin wrappers around
//! [`Client::send_authorized`] / [`Client::get_json`].

pub mod client;
pub mod config;
pub mod metrics;

#[cfg(test)]
mod mock;

pub use client::{BuildUserOptions, Caller, Client};
pub use config::ClientConfig;
pub use spotify_auth::{ApiRequest, ClientCredentials, Error, ErrorDetail, Result, UserCredentials};
