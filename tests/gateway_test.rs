use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Form, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::{Value, json};

use sporlplay::{
    error::{PlayerError, Result},
    management::SessionCache,
    player::{PlaybackApi, SessionProvider, TokenSupplier},
    spotify::{CatalogGateway, auth::SpotifyAccounts},
    types::Session,
};

/// What the mock Web API saw.
#[derive(Default)]
struct Mock {
    requests: AtomicUsize,
    play_calls: Mutex<Vec<(HashMap<String, String>, Value, String)>>,
    token_forms: Mutex<Vec<HashMap<String, String>>>,
}

type Shared = Arc<Mock>;

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn error_body(status: StatusCode, message: &str, reason: Option<&str>) -> Response {
    let mut error = json!({ "status": status.as_u16(), "message": message });
    if let Some(reason) = reason {
        error["reason"] = json!(reason);
    }
    (status, axum::Json(json!({ "error": error }))).into_response()
}

async fn current_playback(State(mock): State<Shared>) -> StatusCode {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

// rejects the initial token, accepts refreshed ones
async fn devices(State(mock): State<Shared>, headers: HeaderMap) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    if bearer(&headers) == "Bearer initial" {
        return error_body(StatusCode::UNAUTHORIZED, "The access token expired", None);
    }
    axum::Json(json!({
        "devices": [
            { "id": "abc", "name": "Desk", "type": "Computer", "is_active": true, "volume_percent": 40 },
            { "id": null, "name": "Restricted", "type": "Speaker", "is_active": false, "volume_percent": null }
        ]
    }))
    .into_response()
}

async fn me(State(mock): State<Shared>) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    error_body(StatusCode::UNAUTHORIZED, "Invalid access token", None)
}

async fn pause(State(mock): State<Shared>) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    error_body(
        StatusCode::FORBIDDEN,
        "Player command failed: Premium required",
        Some("PREMIUM_REQUIRED"),
    )
}

async fn next(State(mock): State<Shared>) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "7")],
        "",
    )
        .into_response()
}

async fn previous(State(mock): State<Shared>) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    error_body(StatusCode::NOT_FOUND, "Device not found", None)
}

async fn play(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    mock.play_calls
        .lock()
        .unwrap()
        .push((query, body, bearer(&headers)));
    StatusCode::NO_CONTENT
}

async fn new_releases(State(mock): State<Shared>) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    error_body(StatusCode::NOT_FOUND, "Not available in this region", None)
}

async fn search(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    assert_eq!(query.get("type").map(String::as_str), Some("track"));
    axum::Json(json!({
        "tracks": {
            "items": [{
                "id": "123",
                "name": query.get("q").cloned().unwrap_or_default(),
                "uri": "spotify:track:123",
                "duration_ms": 200000,
                "artists": [{ "id": "a1", "name": "Band" }],
                "album": { "id": "al1", "name": "Record", "images": [{ "url": "https://img/1" }] }
            }],
            "next": null,
            "total": 1
        }
    }))
    .into_response()
}

async fn token(State(mock): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    let grant = form.get("grant_type").cloned().unwrap_or_default();
    let revoked = form.get("refresh_token").map(String::as_str) == Some("revoked");
    mock.token_forms.lock().unwrap().push(form);

    if revoked {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": "invalid_grant", "error_description": "Refresh token revoked" })),
        )
            .into_response();
    }

    match grant.as_str() {
        "authorization_code" => axum::Json(json!({
            "access_token": "from-code",
            "token_type": "Bearer",
            "scope": "streaming",
            "expires_in": 3600,
            "refresh_token": "refresh-1"
        }))
        .into_response(),
        // refresh responses may leave out the refresh token
        _ => axum::Json(json!({
            "access_token": "from-refresh",
            "token_type": "Bearer",
            "expires_in": 3600
        }))
        .into_response(),
    }
}

async fn serve() -> (String, Shared) {
    let mock: Shared = Arc::new(Mock::default());
    let app = Router::new()
        .route("/me", get(me))
        .route("/me/player", get(current_playback))
        .route("/me/player/devices", get(devices))
        .route("/me/player/pause", put(pause))
        .route("/me/player/next", post(next))
        .route("/me/player/previous", post(previous))
        .route("/me/player/play", put(play))
        .route("/browse/new-releases", get(new_releases))
        .route("/search", get(search))
        .route("/api/token", post(token))
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), mock)
}

#[derive(Default)]
struct CountingProvider {
    refreshes: AtomicUsize,
}

#[async_trait]
impl SessionProvider for CountingProvider {
    async fn refresh(&self, session: &Session) -> Result<Session> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session {
            access_token: format!("refreshed-{}", n),
            expires_at: Utc::now().timestamp() + 3600,
            ..session.clone()
        })
    }
}

fn session(access_token: &str, expires_in: i64, refresh_token: &str) -> Session {
    Session {
        id: "session".to_string(),
        access_token: access_token.to_string(),
        refresh_token: Some(refresh_token.to_string()),
        scope: "streaming".to_string(),
        expires_at: Utc::now().timestamp() + expires_in,
    }
}

async fn gateway(access_token: &str, expires_in: i64) -> (CatalogGateway, Shared, Arc<CountingProvider>) {
    let (base_url, mock) = serve().await;
    let provider = Arc::new(CountingProvider::default());
    let tokens = TokenSupplier::new(
        provider.clone(),
        Some(session(access_token, expires_in, "refresh")),
    );
    (CatalogGateway::with_base_url(base_url, tokens), mock, provider)
}

#[tokio::test]
async fn no_content_is_not_an_error() {
    let (catalog, _, _) = gateway("valid", 3600).await;
    assert!(catalog.current_playback().await.unwrap().is_none());
}

#[tokio::test]
async fn unauthorized_refreshes_once_and_retries() {
    let (catalog, mock, provider) = gateway("initial", 3600).await;

    let devices = catalog.devices().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id.as_deref(), Some("abc"));
    assert_eq!(devices[0].device_type, "Computer");
    assert!(devices[1].id.is_none());

    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(mock.requests.load(Ordering::SeqCst), 2);
    assert_eq!(catalog.tokens().get_token().await.unwrap(), "refreshed-1");
}

#[tokio::test]
async fn repeated_unauthorized_means_auth_expired() {
    let (catalog, mock, provider) = gateway("valid", 3600).await;

    let err = catalog.me().await.unwrap_err();
    assert!(matches!(err, PlayerError::AuthExpired));
    assert!(err.needs_login());
    // exactly one retry
    assert_eq!(mock.requests.load(Ordering::SeqCst), 2);
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forbidden_premium_is_classified() {
    let (catalog, _, _) = gateway("valid", 3600).await;
    let err = catalog.pause(Some("abc")).await.unwrap_err();
    assert!(matches!(err, PlayerError::PremiumRequired));
}

#[tokio::test]
async fn rate_limit_carries_retry_after_and_is_not_retried() {
    let (catalog, mock, _) = gateway("valid", 3600).await;
    let err = catalog.next(None).await.unwrap_err();
    match err {
        PlayerError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Duration::from_secs(7))
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert_eq!(mock.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn other_statuses_keep_status_and_message() {
    let (catalog, _, _) = gateway("valid", 3600).await;
    match catalog.previous(None).await.unwrap_err() {
        PlayerError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Device not found");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn unavailable_browse_section_is_empty() {
    let (catalog, _, _) = gateway("valid", 3600).await;
    assert!(catalog.new_releases(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_returns_tracks() {
    let (catalog, _, _) = gateway("valid", 3600).await;
    let tracks = catalog.search_tracks("night drive", 5).await.unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].name, "night drive");

    let info = tracks[0].to_track_info();
    assert_eq!(info.artists, vec!["Band"]);
    assert_eq!(info.album_art.as_deref(), Some("https://img/1"));
}

#[tokio::test]
async fn play_uri_on_device_with_expiring_token() {
    // token expires in 60s, inside the refresh buffer
    let (catalog, mock, provider) = gateway("initial", 60).await;

    catalog
        .start_playback("abc", &["track:123".to_string()])
        .await
        .unwrap();

    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    let calls = mock.play_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (query, body, auth) = &calls[0];
    assert_eq!(query.get("device_id").map(String::as_str), Some("abc"));
    assert_eq!(body, &json!({ "uris": ["track:123"] }));
    assert_eq!(auth, "Bearer refreshed-1");
}

fn temp_cache(name: &str) -> SessionCache {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "sporlplay-gateway-{}-{}/token.json",
        name,
        std::process::id()
    ));
    SessionCache::new(path)
}

#[tokio::test]
async fn accounts_exchange_code_and_refresh() {
    let (base_url, mock) = serve().await;
    let cache = temp_cache("refresh");
    let accounts = SpotifyAccounts::with_token_url(
        format!("{}/api/token", base_url),
        "client-1".to_string(),
        cache.clone(),
    );

    let session = accounts.exchange_code_pkce("code-1", "verifier-1").await.unwrap();
    assert_eq!(session.access_token, "from-code");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert!(session.is_fresh(300));

    let renewed = accounts.refresh(&session).await.unwrap();
    assert_eq!(renewed.id, session.id);
    assert_eq!(renewed.access_token, "from-refresh");
    // kept from the previous session
    assert_eq!(renewed.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(renewed.scope, "streaming");
    assert_eq!(cache.load().await.unwrap(), Some(renewed));

    let forms = mock.token_forms.lock().unwrap().clone();
    assert_eq!(forms[0].get("grant_type").map(String::as_str), Some("authorization_code"));
    assert_eq!(forms[0].get("code_verifier").map(String::as_str), Some("verifier-1"));
    assert_eq!(forms[0].get("client_id").map(String::as_str), Some("client-1"));
    assert_eq!(forms[1].get("grant_type").map(String::as_str), Some("refresh_token"));

    cache.clear().await.unwrap();
}

#[tokio::test]
async fn revoked_refresh_token_drops_the_cached_session() {
    let (base_url, _) = serve().await;
    let cache = temp_cache("revoked");
    let accounts = Arc::new(SpotifyAccounts::with_token_url(
        format!("{}/api/token", base_url),
        "client-1".to_string(),
        cache.clone(),
    ));

    let expired = session("old", -10, "revoked");
    cache.persist(&expired).await.unwrap();

    let tokens = TokenSupplier::new(accounts, Some(expired));
    assert!(matches!(
        tokens.get_token().await,
        Err(PlayerError::AuthExpired)
    ));
    assert!(tokens.session().is_none());
    assert_eq!(cache.load().await.unwrap(), None);
}
