//! Spotify accounts service integration.
//!
//! Covers the two token grants sporlplay uses: the OAuth 2.0 authorization
//! code flow with PKCE for the first sign-in, and the refresh-token grant
//! that keeps the session alive afterwards. [`SpotifyAccounts`] is the
//! [`SessionProvider`] behind every [`TokenSupplier`](crate::player::TokenSupplier)
//! built by the CLI.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    config,
    error::{PlayerError, Result},
    management::SessionCache,
    player::SessionProvider,
    server::start_api_server,
    types::{PkceToken, Session, TokenResponse},
    utils, warning,
};

/// How long sign-in waits for the browser to come back to the callback.
///
/// The user has to log in and grant the scopes in that time.
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(120);

/// The Spotify accounts service as a [`SessionProvider`].
///
/// Renewed sessions are written to the session cache so they survive a
/// restart. When a refresh is rejected the supplier calls
/// [`SessionProvider::invalidate`], which removes the cache file so the next
/// run asks for a fresh sign-in instead of retrying a revoked token.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sporlplay::{player::TokenSupplier, spotify::auth::SpotifyAccounts};
///
/// let accounts = Arc::new(SpotifyAccounts::from_env()?);
/// let session = accounts.cache().load().await?;
/// let tokens = TokenSupplier::new(accounts, session);
/// ```
pub struct SpotifyAccounts {
    client: Client,
    token_url: String,
    client_id: String,
    cache: SessionCache,
}

impl SpotifyAccounts {
    /// Creates an accounts client for the token endpoint from the environment.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Client id of the registered Spotify application
    /// * `cache` - Where sessions are persisted after sign-in and refresh
    pub fn new(client_id: String, cache: SessionCache) -> Self {
        Self::with_token_url(config::spotify_apitoken_url(), client_id, cache)
    }

    /// Creates an accounts client for an explicit token endpoint.
    ///
    /// Mostly useful to point the client at a local mock in tests.
    ///
    /// # Arguments
    ///
    /// * `token_url` - Full URL of the `/api/token` endpoint
    /// * `client_id` - Client id of the registered Spotify application
    /// * `cache` - Where sessions are persisted after sign-in and refresh
    pub fn with_token_url(token_url: String, client_id: String, cache: SessionCache) -> Self {
        Self {
            client: Client::new(),
            token_url,
            client_id,
            cache,
        }
    }

    /// Accounts service configured from the environment, caching in the
    /// local data directory.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Config`] when `SPOTIFY_API_AUTH_CLIENT_ID` is not
    /// set.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            config::spotify_client_id()?,
            SessionCache::default_location(),
        ))
    }

    /// The session cache renewed sessions are written to.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Posts a form to the token endpoint and decodes the token response.
    ///
    /// Any non-success status becomes [`PlayerError::Api`] carrying the raw
    /// response body, e.g. `{"error":"invalid_grant"}` for a revoked token.
    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let res = self.client.post(&self.token_url).form(form).send().await?;

        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(PlayerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(res.json::<TokenResponse>().await?)
    }

    /// Exchanges an authorization code for a new session (PKCE).
    ///
    /// The verifier proves that the client finishing the flow is the one that
    /// started it, so no client secret is needed. The session gets a fresh
    /// local id and an absolute expiry computed from `expires_in`.
    ///
    /// # Arguments
    ///
    /// * `code` - Authorization code from the `/callback` query string
    /// * `verifier` - The code verifier generated when the flow started
    ///
    /// # Returns
    ///
    /// The new [`Session`]. It is not persisted here; [`sign_in`] does that
    /// once the callback handed it over.
    ///
    /// # Errors
    ///
    /// - [`PlayerError::Api`] if Spotify rejected the code or the verifier
    /// - [`PlayerError::Http`] on transport failures
    pub async fn exchange_code_pkce(&self, code: &str, verifier: &str) -> Result<Session> {
        let redirect_uri = config::spotify_redirect_uri();
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .await?;

        Ok(Session {
            id: utils::generate_session_id(),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            scope: response.scope.unwrap_or_default(),
            expires_at: Utc::now().timestamp() + response.expires_in,
        })
    }
}

#[async_trait]
impl SessionProvider for SpotifyAccounts {
    /// Runs the refresh-token grant and caches the renewed session.
    ///
    /// Spotify may or may not rotate the refresh token; [`Session::renewed`]
    /// keeps the old one when the response carries none. A failing cache
    /// write is logged and does not fail the refresh.
    ///
    /// # Errors
    ///
    /// - [`PlayerError::AuthExpired`] if the session has no refresh token
    /// - [`PlayerError::Api`] if Spotify rejected the refresh token
    async fn refresh(&self, session: &Session) -> Result<Session> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Err(PlayerError::AuthExpired);
        };

        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .await?;

        let renewed = session.renewed(response);
        if let Err(e) = self.cache.persist(&renewed).await {
            warn!("could not cache refreshed session: {}", e);
        }
        debug!(session = %renewed.id, "session refreshed");
        Ok(renewed)
    }

    async fn invalidate(&self) {
        if let Err(e) = self.cache.clear().await {
            warn!("could not clear session cache: {}", e);
        }
    }
}

/// Builds the authorization URL the user is sent to.
///
/// # Arguments
///
/// * `code_challenge` - Base64url SHA256 of the code verifier, see
///   [`utils::generate_code_challenge`]
///
/// # Returns
///
/// The authorize URL with client id, redirect URI, `S256` challenge and the
/// configured scopes as query parameters.
///
/// # Errors
///
/// Returns [`PlayerError::Config`] if the client id is missing or
/// `SPOTIFY_API_AUTH_URL` is not a valid URL.
///
/// # Example
///
/// ```
/// let verifier = utils::generate_code_verifier();
/// let url = authorize_url(&utils::generate_code_challenge(&verifier))?;
/// assert!(url.contains("code_challenge_method=S256"));
/// ```
pub fn authorize_url(code_challenge: &str) -> Result<String> {
    let url = Url::parse_with_params(
        &config::spotify_apiauth_url(),
        &[
            ("client_id", config::spotify_client_id()?),
            ("response_type", "code".to_string()),
            ("redirect_uri", config::spotify_redirect_uri()),
            ("code_challenge", code_challenge.to_string()),
            ("code_challenge_method", "S256".to_string()),
            ("scope", config::spotify_scope()),
        ],
    )
    .map_err(|e| PlayerError::Config(format!("invalid authorization url: {}", e)))?;
    Ok(url.to_string())
}

/// Runs the OAuth 2.0 PKCE sign-in flow and caches the resulting session.
///
/// 1. generates the code verifier and challenge
/// 2. starts the local callback server
/// 3. opens the authorization URL in the browser
/// 4. waits for the callback to exchange the code
/// 5. persists the session
///
/// If the browser cannot be opened the URL is printed so the user can open
/// it by hand. The callback server is stopped once a session arrived or
/// [`SIGN_IN_TIMEOUT`] passed.
///
/// # Arguments
///
/// * `accounts` - Accounts client shared with the callback handler, which
///   performs the code exchange
///
/// # Errors
///
/// - [`PlayerError::Config`] if the authorize URL cannot be built
/// - [`PlayerError::NoSession`] if no callback arrived in time
/// - [`PlayerError::Io`] if the session cannot be written to the cache
///
/// # Example
///
/// ```
/// let accounts = Arc::new(SpotifyAccounts::from_env()?);
/// let session = sign_in(accounts).await?;
/// println!("signed in, token expires at {}", session.expires_at);
/// ```
pub async fn sign_in(accounts: Arc<SpotifyAccounts>) -> Result<Session> {
    let code_verifier = utils::generate_code_verifier();
    let code_challenge = utils::generate_code_challenge(&code_verifier);
    let auth_url = authorize_url(&code_challenge)?;

    // store verifier in shared state before redirect
    let shared_state: Arc<Mutex<Option<PkceToken>>> = Arc::new(Mutex::new(Some(PkceToken {
        code_verifier,
        session: None,
    })));

    let server = tokio::spawn(start_api_server(
        Arc::clone(&shared_state),
        Arc::clone(&accounts),
    ));

    if webbrowser::open(&auth_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    }

    let session = wait_for_session(shared_state).await;
    server.abort();

    let session = session.ok_or(PlayerError::NoSession)?;
    accounts.cache().persist(&session).await?;
    Ok(session)
}

/// Polls the shared state until the callback stored a session.
///
/// # Returns
///
/// `Some(session)` once the callback handler exchanged the code, `None` after
/// [`SIGN_IN_TIMEOUT`]. The lock is only held for the check, so the handler
/// is never blocked by this loop.
async fn wait_for_session(shared_state: Arc<Mutex<Option<PkceToken>>>) -> Option<Session> {
    let deadline = tokio::time::Instant::now() + SIGN_IN_TIMEOUT;

    while tokio::time::Instant::now() < deadline {
        {
            let lock = shared_state.lock().await;
            if let Some(session) = lock.as_ref().and_then(|pkce| pkce.session.clone()) {
                return Some(session);
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    None
}
