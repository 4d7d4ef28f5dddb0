use chrono::Utc;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// An authenticated user session as issued by the accounts service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: String,
    /// Unix timestamp (seconds) at which `access_token` stops being valid.
    pub expires_at: i64,
}

impl Session {
    /// Whether the access token is still usable `buffer_secs` from now.
    pub fn is_fresh(&self, buffer_secs: i64) -> bool {
        Utc::now().timestamp() < self.expires_at - buffer_secs
    }

    /// Applies a token endpoint response. Refresh responses may omit the
    /// refresh token, in which case the previous one is kept.
    pub fn renewed(&self, response: TokenResponse) -> Session {
        Session {
            id: self.id.clone(),
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            scope: response.scope.unwrap_or_else(|| self.scope.clone()),
            expires_at: Utc::now().timestamp() + response.expires_in,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
pub struct PkceToken {
    pub code_verifier: String,
    pub session: Option<Session>,
}

/// The track currently loaded on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub name: String,
    pub artists: Vec<String>,
    pub album_art: Option<String>,
    pub uri: String,
}

/// Snapshot of what the device reports. Values are taken verbatim from the
/// device; `duration_ms == 0` means there is no track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub paused: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub current_track: Option<TrackInfo>,
    /// Unix timestamp in milliseconds of the device report.
    pub last_updated: i64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            paused: true,
            position_ms: 0,
            duration_ms: 0,
            current_track: None,
            last_updated: 0,
        }
    }
}

impl PlaybackState {
    /// The state reported when playback moved away from the device.
    ///
    /// Carries the stamp of the last applied report: device reports use the
    /// server clock, so a local stamp could shadow the reports that follow.
    pub fn inactive(last_updated: i64) -> Self {
        Self {
            last_updated,
            ..Self::default()
        }
    }
}

/// A control operation issued against the playback device.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    Play(Option<String>),
    Pause,
    TogglePlay,
    Next,
    Previous,
    Seek(u64),
    SetVolume(f32),
    TransferTo { device_id: String, autoplay: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleArtist {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleAlbum {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    pub album: Option<SimpleAlbum>,
}

impl Track {
    pub fn artist_names(&self) -> Vec<String> {
        self.artists.iter().map(|a| a.name.clone()).collect()
    }

    pub fn to_track_info(&self) -> TrackInfo {
        TrackInfo {
            name: self.name.clone(),
            artists: self.artist_names(),
            album_art: self
                .album
                .as_ref()
                .and_then(|album| album.images.first())
                .map(|image| image.url.clone()),
            uri: self.uri.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub tracks: Paging<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistOwner {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTracksRef {
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<PlaylistOwner>,
    pub tracks: Option<PlaylistTracksRef>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedTrack {
    pub track: Track,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAlbum {
    pub album: SimpleAlbum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayHistory {
    pub track: Track,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedPlaylistsResponse {
    pub playlists: Paging<Playlist>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReleasesResponse {
    pub albums: Paging<SimpleAlbum>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Paging<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub is_active: bool,
    pub volume_percent: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentPlayback {
    pub device: Option<Device>,
    #[serde(default)]
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<Track>,
    pub timestamp: Option<i64>,
}

impl CurrentPlayback {
    pub fn to_playback_state(&self) -> PlaybackState {
        PlaybackState {
            paused: !self.is_playing,
            position_ms: self.progress_ms.unwrap_or(0),
            duration_ms: self.item.as_ref().map_or(0, |t| t.duration_ms),
            current_track: self.item.as_ref().map(Track::to_track_info),
            last_updated: self
                .timestamp
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartPlaybackRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPlaybackRequest {
    pub device_ids: Vec<String>,
    pub play: bool,
}

#[derive(Tabled)]
pub struct TrackTableRow {
    pub name: String,
    pub artists: String,
    pub album: String,
    pub length: String,
    pub uri: String,
}

#[derive(Tabled)]
pub struct AlbumTableRow {
    pub name: String,
    pub artists: String,
    pub release_date: String,
}

#[derive(Tabled)]
pub struct PlaylistTableRow {
    pub name: String,
    pub owner: String,
    pub tracks: u64,
    pub id: String,
}

#[derive(Tabled)]
pub struct CategoryTableRow {
    pub name: String,
    pub id: String,
}

#[derive(Tabled)]
pub struct DeviceTableRow {
    pub name: String,
    pub kind: String,
    pub active: String,
    pub volume: String,
    pub id: String,
}
