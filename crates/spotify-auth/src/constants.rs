//! Spotify Web API endpoints and OAuth constants

/// Base URI of the Spotify Web API resource endpoints
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Base URI of the Spotify accounts service (token + authorize endpoints)
pub const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";

/// Token endpoint path, relative to `ACCOUNTS_BASE_URL`
pub const TOKEN_PATH: &str = "/api/token";

/// Authorization endpoint path, relative to `ACCOUNTS_BASE_URL`
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Default redirect URI for freshly constructed client credentials
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Error message the resource API returns in a 401 body when the bearer
/// token has expired. Only this message triggers refresh-and-retry.
pub const TOKEN_EXPIRED_MSG: &str = "The access token expired";

/// Every permission scope the Web API defines.
pub const ALL_SCOPES: &[&str] = &[
    // Playback
    "streaming",
    "app-remote-control",
    // Follow
    "user-follow-modify",
    "user-follow-read",
    // Playlists
    "playlist-read-private",
    "playlist-modify-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    // Spotify Connect
    "user-modify-playback-state",
    "user-read-playback-state",
    "user-read-currently-playing",
    // Users
    "user-read-private",
    "user-read-birthdate",
    "user-read-email",
    // Library
    "user-library-read",
    "user-library-modify",
    // Listening history
    "user-top-read",
    "user-read-recently-played",
];
