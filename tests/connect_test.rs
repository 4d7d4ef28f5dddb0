use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::json;

use sporlplay::{
    config,
    connect::{ConnectDeviceFactory, ConnectRuntime},
    error::{PlayerError, Result},
    player::{
        DeviceEvent, DeviceEvents, DeviceFactory, DeviceOptions, DeviceSession, LoadState,
        PlaybackDevice, SdkLoader, SessionConfig, SessionPhase, SessionProvider, TokenSupplier,
    },
    spotify::CatalogGateway,
    types::Session,
};

/// Mock Connect backend with one device called "Desk".
#[derive(Default)]
struct Backend {
    online: AtomicBool,
    premium_missing: AtomicBool,
    playback_failing: AtomicBool,
    commands: Mutex<Vec<String>>,
}

type Shared = Arc<Backend>;

async fn devices(State(backend): State<Shared>) -> Response {
    if backend.premium_missing.load(Ordering::SeqCst) {
        return (
            StatusCode::FORBIDDEN,
            axum::Json(json!({ "error": { "status": 403, "message": "Premium required", "reason": "PREMIUM_REQUIRED" } })),
        )
            .into_response();
    }
    let devices = if backend.online.load(Ordering::SeqCst) {
        json!([{ "id": "abc", "name": "Desk", "type": "Computer", "is_active": true, "volume_percent": 50 }])
    } else {
        json!([])
    };
    axum::Json(json!({ "devices": devices })).into_response()
}

async fn playback(State(backend): State<Shared>) -> Response {
    if backend.playback_failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    axum::Json(json!({
        "device": { "id": "abc", "name": "Desk", "type": "Computer", "is_active": true, "volume_percent": 50 },
        "is_playing": true,
        "progress_ms": 30000,
        "timestamp": Utc::now().timestamp_millis(),
        "item": {
            "id": "123",
            "name": "Song",
            "uri": "spotify:track:123",
            "duration_ms": 180000,
            "artists": [{ "id": "a1", "name": "Band" }],
            "album": { "id": "al1", "name": "Record", "images": [] }
        }
    }))
    .into_response()
}

fn record(backend: &Backend, name: &str, query: &HashMap<String, String>) {
    let mut params: Vec<_> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    params.sort();
    backend
        .commands
        .lock()
        .unwrap()
        .push(format!("{} {}", name, params.join("&")));
}

async fn volume(
    State(backend): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    record(&backend, "volume", &query);
    StatusCode::NO_CONTENT
}

async fn pause(
    State(backend): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    record(&backend, "pause", &query);
    StatusCode::NO_CONTENT
}

async fn next(
    State(backend): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    record(&backend, "next", &query);
    StatusCode::NO_CONTENT
}

async fn transfer(State(backend): State<Shared>) -> StatusCode {
    backend.commands.lock().unwrap().push("transfer".to_string());
    StatusCode::NO_CONTENT
}

async fn serve(online: bool) -> (String, Shared) {
    let backend: Shared = Arc::new(Backend::default());
    backend.online.store(online, Ordering::SeqCst);

    let app = Router::new()
        .route("/me/player", get(playback).put(transfer))
        .route("/me/player/devices", get(devices))
        .route("/me/player/volume", put(volume))
        .route("/me/player/pause", put(pause))
        .route("/me/player/next", post(next))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), backend)
}

struct NoRefresh;

#[async_trait]
impl SessionProvider for NoRefresh {
    async fn refresh(&self, _session: &Session) -> Result<Session> {
        Err(PlayerError::AuthExpired)
    }
}

fn tokens() -> TokenSupplier {
    TokenSupplier::new(
        Arc::new(NoRefresh),
        Some(Session {
            id: "session".to_string(),
            access_token: "valid".to_string(),
            refresh_token: None,
            scope: "streaming".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
        }),
    )
}

fn options(name: &str) -> DeviceOptions {
    DeviceOptions {
        name: name.to_string(),
        tokens: tokens(),
        initial_volume: 0.3,
    }
}

async fn next_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<DeviceEvent>) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for device event")
        .expect("device event channel closed")
}

#[tokio::test]
async fn device_reports_ready_and_state() {
    let (base_url, backend) = serve(true).await;
    let factory = ConnectDeviceFactory::new(base_url, Duration::from_millis(20));
    let (events, mut rx) = DeviceEvents::channel();

    let device = factory.create(options("desk"), events);
    assert!(device.connect().await.unwrap());

    assert_eq!(
        next_event(&mut rx).await,
        DeviceEvent::Ready {
            device_id: "abc".to_string()
        }
    );

    match next_event(&mut rx).await {
        DeviceEvent::StateChanged(Some(state)) => {
            assert!(!state.paused);
            assert_eq!(state.position_ms, 30_000);
            assert_eq!(state.duration_ms, 180_000);
            assert_eq!(state.current_track.unwrap().artists, vec!["Band"]);
        }
        other => panic!("expected state, got {:?}", other),
    }

    // initial volume is applied once the device is online
    assert!(
        backend
            .commands
            .lock()
            .unwrap()
            .contains(&"volume device_id=abc&volume_percent=30".to_string())
    );

    device.pause().await.unwrap();
    device.next_track().await.unwrap();
    device.disconnect().await;

    let commands = backend.commands.lock().unwrap().clone();
    assert!(commands.contains(&"pause device_id=abc".to_string()));
    assert!(commands.contains(&"next device_id=abc".to_string()));
}

#[tokio::test]
async fn unknown_device_name_is_refused() {
    let (base_url, _) = serve(true).await;
    let factory = ConnectDeviceFactory::new(base_url, Duration::from_millis(20));
    let (events, _rx) = DeviceEvents::channel();

    let device = factory.create(options("Living Room"), events);
    assert!(!device.connect().await.unwrap());
    assert!(matches!(device.pause().await, Err(PlayerError::DeviceNotReady)));
}

#[tokio::test]
async fn device_going_offline_reports_not_ready() {
    let (base_url, backend) = serve(true).await;
    let factory = ConnectDeviceFactory::new(base_url, Duration::from_millis(20));
    let (events, mut rx) = DeviceEvents::channel();

    let device = factory.create(options("Desk"), events);
    assert!(device.connect().await.unwrap());
    assert!(matches!(next_event(&mut rx).await, DeviceEvent::Ready { .. }));

    backend.online.store(false, Ordering::SeqCst);
    loop {
        if let DeviceEvent::NotReady { device_id } = next_event(&mut rx).await {
            assert_eq!(device_id, "abc");
            break;
        }
    }
    device.disconnect().await;
}

#[tokio::test]
async fn missing_premium_while_polling_is_an_account_error() {
    let (base_url, backend) = serve(true).await;
    let factory = ConnectDeviceFactory::new(base_url, Duration::from_millis(20));
    let (events, mut rx) = DeviceEvents::channel();

    let device = factory.create(options("Desk"), events);
    assert!(device.connect().await.unwrap());
    backend.premium_missing.store(true, Ordering::SeqCst);

    loop {
        if let DeviceEvent::AccountError { message } = next_event(&mut rx).await {
            assert!(message.to_lowercase().contains("premium"));
            break;
        }
    }
    device.disconnect().await;
}

#[tokio::test]
async fn persistent_backend_failure_is_reported_once() {
    let (base_url, backend) = serve(true).await;
    backend.playback_failing.store(true, Ordering::SeqCst);
    let factory = ConnectDeviceFactory::new(base_url, Duration::from_millis(20));
    let (events, mut rx) = DeviceEvents::channel();

    let device = factory.create(options("Desk"), events);
    assert!(device.connect().await.unwrap());

    loop {
        if let DeviceEvent::PlaybackError { message } = next_event(&mut rx).await {
            assert!(message.contains("500"));
            break;
        }
    }

    // several more failing polls pass without another report
    tokio::time::sleep(Duration::from_millis(400)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, DeviceEvent::PlaybackError { .. }),
            "repeated error: {:?}",
            event
        );
    }

    // once playback recovers, the state comes through again
    backend.playback_failing.store(false, Ordering::SeqCst);
    loop {
        if let DeviceEvent::StateChanged(Some(state)) = next_event(&mut rx).await {
            assert_eq!(state.position_ms, 30_000);
            break;
        }
    }
    device.disconnect().await;
}

#[tokio::test]
async fn zero_poll_interval_is_raised_to_the_minimum() {
    let (base_url, _) = serve(true).await;
    let factory = ConnectDeviceFactory::new(base_url, Duration::ZERO);
    assert_eq!(factory.poll_interval(), config::MIN_POLL_INTERVAL);

    let (events, mut rx) = DeviceEvents::channel();
    let device = factory.create(options("Desk"), events);
    assert!(device.connect().await.unwrap());
    assert!(matches!(next_event(&mut rx).await, DeviceEvent::Ready { .. }));
    device.disconnect().await;
}

#[tokio::test]
async fn runtime_probe_loads_once() {
    let (base_url, _) = serve(true).await;
    let catalog = CatalogGateway::with_base_url(base_url, tokens());
    let loader = SdkLoader::new(Arc::new(ConnectRuntime::new(catalog)));

    loader.ensure_loaded().await.unwrap();
    loader.ensure_loaded().await.unwrap();
    assert_eq!(loader.state(), LoadState::Loaded);
    assert_eq!(loader.injections(), 1);
}

#[tokio::test]
async fn runtime_probe_failure_is_a_load_error() {
    let (base_url, backend) = serve(true).await;
    backend.premium_missing.store(true, Ordering::SeqCst);
    let catalog = CatalogGateway::with_base_url(base_url, tokens());
    let loader = SdkLoader::new(Arc::new(ConnectRuntime::new(catalog)));

    assert!(matches!(
        loader.ensure_loaded().await,
        Err(PlayerError::SdkLoadError(_))
    ));
    assert_eq!(loader.state(), LoadState::NotLoaded);
}

#[tokio::test]
async fn session_attaches_to_connect_device() {
    let (base_url, backend) = serve(true).await;
    let catalog = CatalogGateway::with_base_url(base_url.clone(), tokens());

    let session = DeviceSession::new(
        SdkLoader::new(Arc::new(ConnectRuntime::new(catalog.clone()))),
        catalog.tokens().clone(),
        Arc::new(ConnectDeviceFactory::new(base_url, Duration::from_millis(20))),
        Arc::new(catalog),
        SessionConfig {
            device_name: "Desk".to_string(),
            initial_volume: 0.5,
        },
    );

    session.start().await.unwrap();
    let mut rx = session.store().subscribe();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|s| s.is_ready() && s.playback.current_track.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snapshot.device_id.as_deref(), Some("abc"));
    assert_eq!(snapshot.playback.position_ms, 30_000);

    session.pause().await.unwrap();
    session.stop().await;
    assert_eq!(session.phase(), SessionPhase::Disconnected);

    let commands = backend.commands.lock().unwrap().clone();
    assert!(commands.contains(&"pause device_id=abc".to_string()));

    // the best-effort transfer on ready runs in the background
    for _ in 0..100 {
        if backend.commands.lock().unwrap().contains(&"transfer".to_string()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("playback was never transferred to the device");
}
