use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Table;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    cli, config,
    connect::{ConnectDeviceFactory, ConnectRuntime},
    error,
    error::Result,
    info,
    player::{
        DeviceFactory, DeviceSession, PlaybackApi, PlayerSnapshot, SdkLoader, SdkRuntime,
        SessionConfig, SessionPhase,
    },
    success,
    types::{PlaybackState, StartPlaybackRequest},
    utils, warning,
};

/// One-shot controls for whatever device is currently active.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play(Option<String>),
    Pause,
    Next,
    Previous,
    Seek(u64),
    Volume(f32),
    Transfer { device_id: String, play: bool },
}

pub async fn status() {
    let ctx = cli::context().await;
    match ctx.catalog.current_playback().await {
        Ok(Some(playback)) => {
            let device = playback
                .device
                .as_ref()
                .map_or("unknown device".to_string(), |d| d.name.clone());
            info!("{} on {}", describe_playback(&playback.to_playback_state()), device);
        }
        Ok(None) => info!("Nothing is playing."),
        Err(e) => error!("Failed to load playback. Err: {}", cli::describe(&e)),
    }
}

pub async fn devices() {
    let ctx = cli::context().await;
    match ctx.catalog.devices().await {
        Ok(devices) if devices.is_empty() => {
            warning!("No devices available. Open Spotify on a device first.")
        }
        Ok(devices) => println!("{}", Table::new(utils::device_rows(&devices))),
        Err(e) => error!("Failed to load devices. Err: {}", cli::describe(&e)),
    }
}

pub async fn player_command(command: PlayerCommand) {
    let ctx = cli::context().await;
    let catalog = &ctx.catalog;

    let result = match &command {
        PlayerCommand::Play(uri) => {
            let body = StartPlaybackRequest {
                uris: uri.clone().map(|uri| vec![uri]),
                ..StartPlaybackRequest::default()
            };
            catalog.play(None, &body).await
        }
        PlayerCommand::Pause => catalog.pause(None).await,
        PlayerCommand::Next => catalog.next(None).await,
        PlayerCommand::Previous => catalog.previous(None).await,
        PlayerCommand::Seek(position_ms) => catalog.seek(*position_ms, None).await,
        PlayerCommand::Volume(volume) => catalog.set_volume(*volume, None).await,
        PlayerCommand::Transfer { device_id, play } => catalog.transfer(device_id, *play).await,
    };

    match result {
        Ok(()) => success!("Done."),
        Err(e) => error!("{:?} failed. Err: {}", command, cli::describe(&e)),
    }
}

/// Attaches a [`DeviceSession`] to the named Connect device and follows it
/// until Ctrl-C or `quit`. Controls are read from stdin, one per line.
pub async fn attach(device: Option<String>) {
    let ctx = cli::context().await;
    let name = device.unwrap_or_else(config::device_name);

    let runtime: Arc<dyn SdkRuntime> = Arc::new(ConnectRuntime::new(ctx.catalog.clone()));
    let factory: Arc<dyn DeviceFactory> = Arc::new(ConnectDeviceFactory::from_env());
    let api: Arc<dyn PlaybackApi> = Arc::new(ctx.catalog.clone());
    let session = DeviceSession::new(
        SdkLoader::with_timeout(runtime, config::sdk_load_timeout()),
        ctx.tokens.clone(),
        factory,
        api,
        SessionConfig {
            device_name: name.clone(),
            ..SessionConfig::default()
        },
    );

    let mut snapshots = session.store().subscribe();

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Connecting to {}...", name));
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }

    if let Err(e) = session.start().await {
        pb.finish_and_clear();
        error!("Could not attach to {}. Err: {}", name, cli::describe(&e));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_printed: Option<String> = None;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !matches!(snapshot.phase, SessionPhase::Initializing | SessionPhase::Connecting) {
                    pb.finish_and_clear();
                }

                let line = render(&snapshot);
                if last_printed.as_deref() != Some(line.as_str()) {
                    match &snapshot.phase {
                        SessionPhase::Error(_) | SessionPhase::NotReady => warning!("{}", line),
                        _ => info!("{}", line),
                    }
                    last_printed = Some(line);
                }

                if let SessionPhase::Error(record) = &snapshot.phase {
                    warning!("Session ended. Run sporlplay player attach again to reconnect.");
                    if record.action() == crate::error::UserAction::Login {
                        warning!("Run sporlplay auth to sign in again.");
                    }
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        match run_control(&session, line.trim()).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => warning!("{}", cli::describe(&e)),
                        }
                    }
                    // stdin closed, keep following until Ctrl-C
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    pb.finish_and_clear();
    session.stop().await;
    success!("Detached from {}.", name);
}

/// Runs one stdin control line. `Ok(false)` ends the attach loop.
async fn run_control(session: &DeviceSession, line: &str) -> Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };
    let arg = parts.next();

    match command {
        "q" | "quit" | "exit" => return Ok(false),
        "t" | "toggle" => session.toggle_play().await?,
        "play" => session.play(arg).await?,
        "pause" => session.pause().await?,
        "n" | "next" => session.next().await?,
        "b" | "prev" | "previous" => session.previous().await?,
        "seek" => match arg.and_then(|ms| ms.parse::<u64>().ok()) {
            Some(ms) => session.seek(ms).await?,
            None => warning!("usage: seek <ms>"),
        },
        "vol" | "volume" => match arg.map(utils::parse_volume) {
            Some(Ok(volume)) => session.set_volume(volume).await?,
            Some(Err(e)) => warning!("{}", e),
            None => warning!("usage: volume <0..1>"),
        },
        "transfer" => match arg {
            Some(device_id) => session.transfer_to(device_id, true).await?,
            None => warning!("usage: transfer <device id>"),
        },
        "clear" => session.store().clear_error(),
        _ => warning!(
            "unknown command '{}' (toggle, play [uri], pause, next, prev, seek <ms>, volume <0..1>, transfer <id>, clear, quit)",
            command
        ),
    }
    Ok(true)
}

fn render(snapshot: &PlayerSnapshot) -> String {
    match &snapshot.phase {
        SessionPhase::Ready => match &snapshot.playback.current_track {
            Some(_) => describe_playback(&snapshot.playback),
            None => format!(
                "Ready as {}, nothing playing here",
                snapshot.device_id.as_deref().unwrap_or("?")
            ),
        },
        SessionPhase::Error(record) => format!("Error: {}", record.message),
        phase => format!("{:?}", phase),
    }
}

fn describe_playback(playback: &PlaybackState) -> String {
    let Some(track) = &playback.current_track else {
        return "No track".to_string();
    };
    format!(
        "{} {} - {} [{} / {}]",
        if playback.paused { "Paused" } else { "Playing" },
        utils::join_artists(&track.artists),
        track.name,
        utils::format_duration(playback.position_ms),
        utils::format_duration(playback.duration_ms),
    )
}
