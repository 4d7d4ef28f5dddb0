use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::types::{
    AlbumTableRow, Category, CategoryTableRow, Device, DeviceTableRow, Playlist,
    PlaylistTableRow, SimpleAlbum, Track, TrackTableRow,
};

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

pub fn generate_session_id() -> String {
    random_alphanumeric(32)
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Formats milliseconds as `m:ss`.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Converts a `0.0..=1.0` volume into the Web API's percentage.
pub fn volume_percent(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u32
}

pub fn parse_volume(s: &str) -> Result<f32, String> {
    let volume: f32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if !(0.0..=1.0).contains(&volume) {
        return Err(format!("volume must be between 0 and 1, got {}", volume));
    }
    Ok(volume)
}

pub fn join_artists(artists: &[String]) -> String {
    artists.join(", ")
}

pub fn track_rows(tracks: &[Track]) -> Vec<TrackTableRow> {
    tracks
        .iter()
        .map(|t| TrackTableRow {
            name: t.name.clone(),
            artists: join_artists(&t.artist_names()),
            album: t
                .album
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            length: format_duration(t.duration_ms),
            uri: t.uri.clone(),
        })
        .collect()
}

pub fn album_rows(albums: &[SimpleAlbum]) -> Vec<AlbumTableRow> {
    albums
        .iter()
        .map(|a| AlbumTableRow {
            name: a.name.clone(),
            artists: a
                .artists
                .iter()
                .map(|artist| artist.name.clone())
                .collect::<Vec<_>>()
                .join(", "),
            release_date: a.release_date.clone().unwrap_or_default(),
        })
        .collect()
}

pub fn playlist_rows(playlists: &[Playlist]) -> Vec<PlaylistTableRow> {
    playlists
        .iter()
        .map(|p| PlaylistTableRow {
            name: p.name.clone(),
            owner: p
                .owner
                .as_ref()
                .and_then(|o| o.display_name.clone())
                .unwrap_or_default(),
            tracks: p.tracks.as_ref().map_or(0, |t| t.total),
            id: p.id.clone(),
        })
        .collect()
}

pub fn category_rows(categories: &[Category]) -> Vec<CategoryTableRow> {
    categories
        .iter()
        .map(|c| CategoryTableRow {
            name: c.name.clone(),
            id: c.id.clone(),
        })
        .collect()
}

pub fn device_rows(devices: &[Device]) -> Vec<DeviceTableRow> {
    devices
        .iter()
        .map(|d| DeviceTableRow {
            name: d.name.clone(),
            kind: d.device_type.clone(),
            active: if d.is_active { "yes" } else { "" }.to_string(),
            volume: d
                .volume_percent
                .map(|v| format!("{}%", v))
                .unwrap_or_default(),
            id: d.id.clone().unwrap_or_default(),
        })
        .collect()
}

/// Finds a device by name, ignoring case.
pub fn find_device<'a>(devices: &'a [Device], name: &str) -> Option<&'a Device> {
    devices
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name) && d.id.is_some())
}
