//! Configuration management for sporlplay.
//!
//! Values come from environment variables, which may be provided through a
//! `.env` file in the local data directory. Everything except the client id
//! has a default pointing at the public Spotify endpoints, so a minimal
//! `.env` only names the registered application. Getters read the
//! environment on every call and never panic; a missing required value is a
//! [`PlayerError::Config`].
//!
//! The lookup order is:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults

use std::{env, path::PathBuf, time::Duration};

use crate::error::{PlayerError, Result};

/// Scopes requested at sign-in: streaming, playback state read/modify and
/// library/catalog read access.
pub const SCOPES: &[&str] = &[
    "streaming",
    "user-read-email",
    "user-read-private",
    "user-modify-playback-state",
    "user-read-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "user-top-read",
    "user-read-recently-played",
    "user-library-read",
];

/// Returns the local data directory used for the `.env` file and caches.
///
/// Falls back to the working directory when the platform has no local data
/// directory.
///
/// - Linux: `~/.local/share/sporlplay`
/// - macOS: `~/Library/Application Support/sporlplay`
/// - Windows: `%LOCALAPPDATA%/sporlplay`
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("sporlplay");
    path
}

/// Loads environment variables from `.env` in the local data directory.
///
/// Creates the directory if needed. A missing `.env` file is not an error,
/// since every setting but the client id has a default.
///
/// # Returns
///
/// `Ok(())` once the directory exists and the file, if any, was applied.
/// Variables already set in the process environment are not overridden.
///
/// # Errors
///
/// Returns [`PlayerError::Io`] if the directory cannot be created and
/// [`PlayerError::Config`] if an existing `.env` file cannot be parsed.
///
/// # Example
///
/// ```
/// use sporlplay::config;
///
/// #[tokio::main]
/// async fn main() {
///     if let Err(e) = config::load_env().await {
///         eprintln!("Configuration error: {}", e);
///     }
/// }
/// ```
pub async fn load_env() -> Result<()> {
    let dir = data_dir();
    async_fs::create_dir_all(&dir).await?;

    let path = dir.join(".env");
    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| PlayerError::Config(e.to_string()))?;
    }
    Ok(())
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Address the local OAuth callback server binds to.
///
/// Reads `SERVER_ADDRESS` and defaults to `127.0.0.1:8888`, which matches the
/// default redirect URI.
///
/// # Example
///
/// ```
/// let addr = server_addr(); // e.g., "127.0.0.1:8888"
/// ```
pub fn server_addr() -> String {
    var_or("SERVER_ADDRESS", "127.0.0.1:8888")
}

/// Client id of the application registered with Spotify.
///
/// Retrieves `SPOTIFY_API_AUTH_CLIENT_ID`, the id shown in the Spotify
/// developer dashboard. The PKCE flow needs no client secret.
///
/// # Errors
///
/// Fails with [`PlayerError::Config`] when `SPOTIFY_API_AUTH_CLIENT_ID` is unset.
pub fn spotify_client_id() -> Result<String> {
    env::var("SPOTIFY_API_AUTH_CLIENT_ID")
        .map_err(|_| PlayerError::Config("SPOTIFY_API_AUTH_CLIENT_ID must be set".to_string()))
}

/// Redirect URI registered for the application.
///
/// Reads `SPOTIFY_API_REDIRECT_URI`. It has to be registered in the developer
/// dashboard and must point at [`server_addr`] plus `/callback`, otherwise
/// the browser never reaches the local server.
pub fn spotify_redirect_uri() -> String {
    var_or("SPOTIFY_API_REDIRECT_URI", "http://127.0.0.1:8888/callback")
}

/// Space separated scope list.
///
/// Reads `SPOTIFY_API_AUTH_SCOPE` and defaults to [`SCOPES`]. Playback control
/// needs at least `streaming` and `user-modify-playback-state`.
pub fn spotify_scope() -> String {
    env::var("SPOTIFY_API_AUTH_SCOPE").unwrap_or_else(|_| SCOPES.join(" "))
}

/// Authorization endpoint of the Spotify accounts service.
///
/// Reads `SPOTIFY_API_AUTH_URL`.
///
/// # Example
///
/// ```
/// let url = spotify_apiauth_url(); // "https://accounts.spotify.com/authorize"
/// ```
pub fn spotify_apiauth_url() -> String {
    var_or(
        "SPOTIFY_API_AUTH_URL",
        "https://accounts.spotify.com/authorize",
    )
}

/// Base URL of the Spotify Web API, without a trailing slash.
///
/// Reads `SPOTIFY_API_URL`. Every catalog and player path is appended to it.
///
/// # Example
///
/// ```
/// let url = format!("{}/me/player", spotify_apiurl());
/// ```
pub fn spotify_apiurl() -> String {
    var_or("SPOTIFY_API_URL", "https://api.spotify.com/v1")
}

/// Token endpoint of the Spotify accounts service.
///
/// Reads `SPOTIFY_API_TOKEN_URL`. Used for both the code exchange and the
/// refresh-token grant.
pub fn spotify_apitoken_url() -> String {
    var_or(
        "SPOTIFY_API_TOKEN_URL",
        "https://accounts.spotify.com/api/token",
    )
}

/// Name of the Spotify Connect device `player attach` binds to.
///
/// Reads `SPORLPLAY_DEVICE_NAME`; the match against the device list is case
/// insensitive. Defaults to `sporlplay`.
pub fn device_name() -> String {
    var_or("SPORLPLAY_DEVICE_NAME", "sporlplay")
}

/// How long the playback runtime may take to become ready.
///
/// Reads `SPORLPLAY_SDK_TIMEOUT_SECS` and defaults to 15 seconds. Unparsable
/// values fall back to the default.
pub fn sdk_load_timeout() -> Duration {
    let secs = env::var("SPORLPLAY_SDK_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(15);
    Duration::from_secs(secs)
}

/// Shortest interval the Connect device polls at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Interval at which the Connect device polls the current playback.
///
/// Reads `SPORLPLAY_POLL_INTERVAL_MS` and defaults to one second. Values below
/// [`MIN_POLL_INTERVAL`], including `0`, are raised to it.
///
/// # Example
///
/// ```
/// let interval = sporlplay::config::poll_interval();
/// assert!(interval >= sporlplay::config::MIN_POLL_INTERVAL);
/// ```
pub fn poll_interval() -> Duration {
    let ms = env::var("SPORLPLAY_POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1000);
    Duration::from_millis(ms).max(MIN_POLL_INTERVAL)
}
