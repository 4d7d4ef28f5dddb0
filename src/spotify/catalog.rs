//! Spotify Web API client.
//!
//! [`CatalogGateway`] wraps every Web API call sporlplay makes: the catalog
//! reads behind `search`, `library` and `browse`, and the player endpoints
//! the Connect device and the session's [`PlaybackApi`] use. All of them go
//! through [`CatalogGateway::request`], which owns authorization and status
//! classification, so callers only ever see typed values or a
//! [`PlayerError`].

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, Method, Response, StatusCode,
    header::{CONTENT_LENGTH, RETRY_AFTER},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config,
    error::{PlayerError, Result, mentions_premium},
    player::{PlaybackApi, TokenSupplier},
    types::{
        CategoriesResponse, Category, CurrentPlayback, Device, DevicesResponse,
        FeaturedPlaylistsResponse, NewReleasesResponse, Paging, PlayHistory, Playlist,
        PlaylistItem, SavedAlbum, SavedTrack, SearchResponse, SimpleAlbum, StartPlaybackRequest,
        Track, TransferPlaybackRequest, UserProfile,
    },
    utils,
};

/// Fallback when a 429 comes without a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Client for the Spotify Web API.
///
/// Every request pulls a token from the [`TokenSupplier`] right before it is
/// sent. A 401 triggers exactly one refresh-and-retry; nothing else is ever
/// retried here, rate limits included.
#[derive(Clone)]
pub struct CatalogGateway {
    client: Client,
    base_url: String,
    tokens: TokenSupplier,
}

impl CatalogGateway {
    /// Creates a gateway for the Web API configured in the environment.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Supplier shared with the rest of the session
    ///
    /// # Example
    ///
    /// ```
    /// let catalog = CatalogGateway::new(tokens.clone());
    /// let profile = catalog.me().await?;
    /// ```
    pub fn new(tokens: TokenSupplier) -> Self {
        Self::with_base_url(config::spotify_apiurl(), tokens)
    }

    /// Creates a gateway for an explicit base URL, e.g. a local mock.
    ///
    /// A trailing slash on `base_url` is ignored.
    pub fn with_base_url(base_url: impl Into<String>, tokens: TokenSupplier) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenSupplier {
        &self.tokens
    }

    /// Issues one request and classifies the response.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(json))` for 2xx responses with a JSON body
    /// - `Ok(None)` for 204 and other empty 2xx responses
    ///
    /// # Errors
    ///
    /// - [`PlayerError::AuthExpired`] if the token is rejected again after a refresh
    /// - [`PlayerError::PremiumRequired`] for 403 responses asking for premium
    /// - [`PlayerError::RateLimited`] for 429, with the server's retry hint
    /// - [`PlayerError::Api`] for every other non-2xx status
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let token = self.tokens.get_token().await?;
        match self.send(&method, path, query, body, &token).await {
            Err(PlayerError::Unauthorized) => {
                debug!(%path, "token rejected, refreshing once");
                self.tokens.expire();
                let token = self.tokens.get_token().await?;
                match self.send(&method, path, query, body, &token).await {
                    Err(PlayerError::Unauthorized) => Err(PlayerError::AuthExpired),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        token: &str,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(token);

        if !query.is_empty() {
            request = request.query(query);
        }

        request = match body {
            Some(body) => request.json(body),
            // the player endpoints answer 411 to bodiless PUT/POST without it
            None if *method != Method::GET => request.header(CONTENT_LENGTH, 0),
            None => request,
        };

        let response = request.send().await?;
        classify(response).await
    }

    /// GET `path` and deserialize the body.
    ///
    /// # Errors
    ///
    /// Everything [`request`](Self::request) returns, plus
    /// [`PlayerError::Json`] when the endpoint answered without content or
    /// the body does not match `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        match self.request(Method::GET, path, query, None).await? {
            Some(json) => Ok(serde_json::from_value(json)?),
            None => Err(PlayerError::Json(format!("{} returned no content", path))),
        }
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        device_id: Option<&str>,
        mut query: Vec<(&'static str, String)>,
        body: Option<Value>,
    ) -> Result<()> {
        if let Some(device_id) = device_id {
            query.push(("device_id", device_id.to_string()));
        }
        self.request(method, path, &query, body.as_ref()).await?;
        Ok(())
    }

    /// Profile of the signed-in user. `product` tells whether the account
    /// is premium.
    pub async fn me(&self) -> Result<UserProfile> {
        self.get("/me", &[]).await
    }

    /// Searches the catalog for tracks.
    ///
    /// # Arguments
    ///
    /// * `q` - Free text query, Spotify's field filters like `artist:` work
    /// * `limit` - Maximum number of tracks, at most 50
    ///
    /// # Example
    ///
    /// ```
    /// let tracks = catalog.search_tracks("artist:Radiohead", 20).await?;
    /// for track in &tracks {
    ///     println!("{}", track.name);
    /// }
    /// ```
    pub async fn search_tracks(&self, q: &str, limit: u32) -> Result<Vec<Track>> {
        let res: SearchResponse = self
            .get(
                "/search",
                &[
                    ("q", q.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(res.tracks.items)
    }

    /// Playlists owned or followed by the user.
    pub async fn user_playlists(&self, limit: u32) -> Result<Vec<Playlist>> {
        let res: Paging<Playlist> = self.get("/me/playlists", &limit_query(limit)).await?;
        Ok(res.items)
    }

    /// Tracks of a playlist. Local files and removed tracks have no track
    /// object and are skipped.
    pub async fn playlist_tracks(&self, playlist_id: &str, limit: u32) -> Result<Vec<Track>> {
        let res: Paging<PlaylistItem> = self
            .get(
                &format!("/playlists/{}/tracks", playlist_id),
                &limit_query(limit),
            )
            .await?;
        Ok(res.items.into_iter().filter_map(|item| item.track).collect())
    }

    /// Liked songs, most recently saved first.
    pub async fn saved_tracks(&self, limit: u32) -> Result<Vec<Track>> {
        let res: Paging<SavedTrack> = self.get("/me/tracks", &limit_query(limit)).await?;
        Ok(res.items.into_iter().map(|saved| saved.track).collect())
    }

    pub async fn saved_albums(&self, limit: u32) -> Result<Vec<SimpleAlbum>> {
        optional("saved albums", async {
            let res: Paging<SavedAlbum> = self.get("/me/albums", &limit_query(limit)).await?;
            Ok(res.items.into_iter().map(|saved| saved.album).collect())
        })
        .await
    }

    pub async fn top_tracks(&self, limit: u32) -> Result<Vec<Track>> {
        optional("top tracks", async {
            let res: Paging<Track> = self.get("/me/top/tracks", &limit_query(limit)).await?;
            Ok(res.items)
        })
        .await
    }

    pub async fn recently_played(&self, limit: u32) -> Result<Vec<Track>> {
        optional("recently played", async {
            let res: Paging<PlayHistory> = self
                .get("/me/player/recently-played", &limit_query(limit))
                .await?;
            Ok(res.items.into_iter().map(|played| played.track).collect())
        })
        .await
    }

    /// New album releases.
    ///
    /// This and the other browse sections are optional: an [`PlayerError::Api`]
    /// or unreadable body yields an empty list and a warning, since not every
    /// account or market can see them. Auth and rate limit failures still
    /// surface.
    pub async fn new_releases(&self, limit: u32) -> Result<Vec<SimpleAlbum>> {
        optional("new releases", async {
            let res: NewReleasesResponse = self
                .get("/browse/new-releases", &limit_query(limit))
                .await?;
            Ok(res.albums.items)
        })
        .await
    }

    pub async fn featured_playlists(&self, limit: u32) -> Result<Vec<Playlist>> {
        optional("featured playlists", async {
            let res: FeaturedPlaylistsResponse = self
                .get("/browse/featured-playlists", &limit_query(limit))
                .await?;
            Ok(res.playlists.items)
        })
        .await
    }

    pub async fn categories(&self, limit: u32) -> Result<Vec<Category>> {
        optional("categories", async {
            let res: CategoriesResponse = self
                .get("/browse/categories", &limit_query(limit))
                .await?;
            Ok(res.categories.items)
        })
        .await
    }

    /// Current playback, `None` when nothing is playing anywhere.
    pub async fn current_playback(&self) -> Result<Option<CurrentPlayback>> {
        match self.request(Method::GET, "/me/player", &[], None).await? {
            Some(json) => Ok(Some(serde_json::from_value(json)?)),
            None => Ok(None),
        }
    }

    /// Connect devices currently visible to the account.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let res: DevicesResponse = self.get("/me/player/devices", &[]).await?;
        Ok(res.devices)
    }

    /// Starts or resumes playback.
    ///
    /// # Arguments
    ///
    /// * `device_id` - Target device, `None` for the active one
    /// * `body` - Context or URIs to play; an empty body resumes
    ///
    /// # Errors
    ///
    /// [`PlayerError::PremiumRequired`] for free accounts, [`PlayerError::Api`]
    /// with status 404 when no device is active.
    pub async fn play(&self, device_id: Option<&str>, body: &StartPlaybackRequest) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.command(Method::PUT, "/me/player/play", device_id, Vec::new(), Some(body))
            .await
    }

    pub async fn pause(&self, device_id: Option<&str>) -> Result<()> {
        self.command(Method::PUT, "/me/player/pause", device_id, Vec::new(), None)
            .await
    }

    pub async fn next(&self, device_id: Option<&str>) -> Result<()> {
        self.command(Method::POST, "/me/player/next", device_id, Vec::new(), None)
            .await
    }

    pub async fn previous(&self, device_id: Option<&str>) -> Result<()> {
        self.command(Method::POST, "/me/player/previous", device_id, Vec::new(), None)
            .await
    }

    /// Seeks to `position_ms` in the current track.
    pub async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> Result<()> {
        self.command(
            Method::PUT,
            "/me/player/seek",
            device_id,
            vec![("position_ms", position_ms.to_string())],
            None,
        )
        .await
    }

    /// `volume` is in `0.0..=1.0`, the Web API wants a percentage.
    pub async fn set_volume(&self, volume: f32, device_id: Option<&str>) -> Result<()> {
        self.command(
            Method::PUT,
            "/me/player/volume",
            device_id,
            vec![("volume_percent", utils::volume_percent(volume).to_string())],
            None,
        )
        .await
    }

    /// Moves playback to `device_id`.
    ///
    /// With `play == false` the current pause state is kept, which makes the
    /// call safe to repeat.
    pub async fn transfer(&self, device_id: &str, play: bool) -> Result<()> {
        let body = serde_json::to_value(TransferPlaybackRequest {
            device_ids: vec![device_id.to_string()],
            play,
        })?;
        self.command(Method::PUT, "/me/player", None, Vec::new(), Some(body))
            .await
    }
}

#[async_trait]
impl PlaybackApi for CatalogGateway {
    async fn start_playback(&self, device_id: &str, uris: &[String]) -> Result<()> {
        let body = StartPlaybackRequest {
            uris: Some(uris.to_vec()),
            ..StartPlaybackRequest::default()
        };
        self.play(Some(device_id), &body).await
    }

    async fn transfer_playback(&self, device_id: &str, play: bool) -> Result<()> {
        self.transfer(device_id, play).await
    }
}

fn limit_query(limit: u32) -> [(&'static str, String); 1] {
    [("limit", limit.to_string())]
}

/// Browse endpoints are not available to every account or region; those
/// degrade to an empty list, while auth and rate limit failures still surface.
async fn optional<T, F>(what: &str, fetch: F) -> Result<Vec<T>>
where
    F: Future<Output = Result<Vec<T>>>,
{
    match fetch.await {
        Err(e @ (PlayerError::Api { .. } | PlayerError::Json(_))) => {
            warn!("{} not available: {}", what, e);
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Maps a response to a body or a [`PlayerError`], see
/// [`CatalogGateway::request`].
async fn classify(response: Response) -> Result<Option<Value>> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await?;
        if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            return Ok(None);
        }
        return match serde_json::from_slice(&bytes) {
            Ok(json) => Ok(Some(json)),
            Err(e) => {
                debug!(%status, "ignoring non-json success body: {}", e);
                Ok(None)
            }
        };
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let text = response.text().await.unwrap_or_default();
    let (message, reason) = parse_error_body(&text);
    let message = message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match status {
        StatusCode::UNAUTHORIZED => Err(PlayerError::Unauthorized),
        StatusCode::FORBIDDEN
            if reason.as_deref() == Some("PREMIUM_REQUIRED") || mentions_premium(&message) =>
        {
            Err(PlayerError::PremiumRequired)
        }
        StatusCode::TOO_MANY_REQUESTS => Err(PlayerError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        }),
        _ => Err(PlayerError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Extracts `error.message` and `error.reason` from a Web API error body.
fn parse_error_body(text: &str) -> (Option<String>, Option<String>) {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        let text = text.trim();
        return ((!text.is_empty()).then(|| text.to_string()), None);
    };

    let error = &json["error"];
    let message = error["message"]
        .as_str()
        .or_else(|| error.as_str())
        .or_else(|| json["error_description"].as_str())
        .map(str::to_string);
    let reason = error["reason"].as_str().map(str::to_string);
    (message, reason)
}
