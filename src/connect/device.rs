use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config,
    error::{PlayerError, Result},
    player::{DeviceEvent, DeviceEvents, DeviceFactory, DeviceOptions, PlaybackDevice},
    spotify::CatalogGateway,
    types::{PlaybackState, StartPlaybackRequest},
    utils,
};

/// Creates [`ConnectDevice`]s talking to the Web API at `base_url`.
pub struct ConnectDeviceFactory {
    base_url: String,
    poll_interval: Duration,
}

impl ConnectDeviceFactory {
    /// Intervals below [`config::MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            poll_interval: poll_interval.max(config::MIN_POLL_INTERVAL),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn from_env() -> Self {
        Self::new(config::spotify_apiurl(), config::poll_interval())
    }
}

impl DeviceFactory for ConnectDeviceFactory {
    fn create(&self, options: DeviceOptions, events: DeviceEvents) -> Arc<dyn PlaybackDevice> {
        let catalog = CatalogGateway::with_base_url(self.base_url.clone(), options.tokens.clone());
        Arc::new(ConnectDevice::new(
            catalog,
            options,
            events,
            self.poll_interval,
        ))
    }
}

/// A Connect device addressed by name.
pub struct ConnectDevice {
    name: String,
    initial_volume: f32,
    poll_interval: Duration,
    catalog: CatalogGateway,
    events: DeviceEvents,
    device_id: Mutex<Option<String>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectDevice {
    pub fn new(
        catalog: CatalogGateway,
        options: DeviceOptions,
        events: DeviceEvents,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: options.name,
            initial_volume: options.initial_volume,
            poll_interval,
            catalog,
            events,
            device_id: Mutex::new(None),
            poller: Mutex::new(None),
        }
    }

    fn id(&self) -> Result<String> {
        self.device_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(PlayerError::DeviceNotReady)
    }
}

impl Drop for ConnectDevice {
    fn drop(&mut self) {
        let poller = self
            .poller
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(poller) = poller {
            poller.abort();
        }
    }
}

#[async_trait]
impl PlaybackDevice for ConnectDevice {
    async fn connect(&self) -> Result<bool> {
        let devices = self.catalog.devices().await?;
        let Some(id) = utils::find_device(&devices, &self.name).and_then(|d| d.id.clone()) else {
            warn!(name = %self.name, "no connect device with that name");
            return Ok(false);
        };

        *self
            .device_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id.clone());

        let poller = tokio::spawn(poll(Poller {
            name: self.name.clone(),
            device_id: id,
            initial_volume: self.initial_volume,
            interval: self.poll_interval,
            catalog: self.catalog.clone(),
            events: self.events.clone(),
        }));

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(poller);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(true)
    }

    async fn disconnect(&self) {
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(poller) = poller {
            poller.abort();
            debug!(name = %self.name, "connect device released");
        }
    }

    async fn toggle_play(&self) -> Result<()> {
        let id = self.id()?;
        let playing_here = self
            .catalog
            .current_playback()
            .await?
            .is_some_and(|playback| {
                playback.is_playing
                    && playback
                        .device
                        .as_ref()
                        .and_then(|d| d.id.as_deref())
                        == Some(id.as_str())
            });

        if playing_here {
            self.catalog.pause(Some(&id)).await
        } else {
            self.catalog
                .play(Some(&id), &StartPlaybackRequest::default())
                .await
        }
    }

    async fn resume(&self) -> Result<()> {
        let id = self.id()?;
        self.catalog
            .play(Some(&id), &StartPlaybackRequest::default())
            .await
    }

    async fn pause(&self) -> Result<()> {
        let id = self.id()?;
        self.catalog.pause(Some(&id)).await
    }

    async fn next_track(&self) -> Result<()> {
        let id = self.id()?;
        self.catalog.next(Some(&id)).await
    }

    async fn previous_track(&self) -> Result<()> {
        let id = self.id()?;
        self.catalog.previous(Some(&id)).await
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let id = self.id()?;
        self.catalog.seek(position_ms, Some(&id)).await
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        let id = self.id()?;
        self.catalog.set_volume(volume, Some(&id)).await
    }
}

struct Poller {
    name: String,
    device_id: String,
    initial_volume: f32,
    interval: Duration,
    catalog: CatalogGateway,
    events: DeviceEvents,
}

/// Watches one device until the listener goes away or a fatal error was
/// reported.
async fn poll(poller: Poller) {
    let mut ticker = time::interval(poller.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut online = false;
    let mut volume_applied = false;
    let mut last_state: Option<PlaybackState> = None;
    let mut last_error: Option<String> = None;

    loop {
        ticker.tick().await;
        if poller.events.is_closed() {
            break;
        }

        let devices = match poller.catalog.devices().await {
            Ok(devices) => devices,
            Err(e) => match report(&poller, e, &mut last_error).await {
                Some(()) => continue,
                None => break,
            },
        };

        let present = devices
            .iter()
            .any(|d| d.id.as_deref() == Some(poller.device_id.as_str()));

        if present != online {
            online = present;
            let event = if present {
                info!(name = %poller.name, "connect device online");
                DeviceEvent::Ready {
                    device_id: poller.device_id.clone(),
                }
            } else {
                DeviceEvent::NotReady {
                    device_id: poller.device_id.clone(),
                }
            };
            if !poller.events.emit(event) {
                break;
            }
        }

        if !online {
            continue;
        }

        if !volume_applied {
            volume_applied = true;
            if let Err(e) = poller
                .catalog
                .set_volume(poller.initial_volume, Some(&poller.device_id))
                .await
            {
                debug!("could not apply initial volume: {}", e);
            }
        }

        let playback = match poller.catalog.current_playback().await {
            Ok(playback) => playback,
            Err(e) => match report(&poller, e, &mut last_error).await {
                Some(()) => continue,
                None => break,
            },
        };

        last_error = None;

        let here = playback.filter(|p| {
            p.device
                .as_ref()
                .and_then(|d| d.id.as_deref())
                == Some(poller.device_id.as_str())
        });

        let event = match (here, last_state.is_some()) {
            (Some(p), _) => {
                let state = p.to_playback_state();
                if last_state.as_ref().is_some_and(|last| same_report(last, &state)) {
                    continue;
                }
                last_state = Some(state.clone());
                DeviceEvent::StateChanged(Some(state))
            }
            (None, true) => {
                last_state = None;
                DeviceEvent::StateChanged(None)
            }
            (None, false) => continue,
        };

        if !poller.events.emit(event) {
            break;
        }
    }
}

/// Reports a polling failure. `None` means the poller has to stop.
///
/// API failures are only emitted when they differ from `last_error`, so a
/// backend that keeps failing does not flood the listener.
async fn report(
    poller: &Poller,
    error: PlayerError,
    last_error: &mut Option<String>,
) -> Option<()> {
    let event = match error {
        PlayerError::Unauthorized | PlayerError::AuthExpired | PlayerError::NoSession => {
            DeviceEvent::AuthenticationError {
                message: error.to_string(),
            }
        }
        PlayerError::PremiumRequired => DeviceEvent::AccountError {
            message: error.to_string(),
        },
        PlayerError::RateLimited { retry_after } => {
            warn!("polling rate limited, backing off {}s", retry_after.as_secs());
            time::sleep(retry_after).await;
            return Some(());
        }
        PlayerError::Api { .. } => {
            let message = error.to_string();
            if last_error.as_deref() == Some(message.as_str()) {
                debug!("polling still failing: {}", message);
                return Some(());
            }
            *last_error = Some(message.clone());
            return poller
                .events
                .emit(DeviceEvent::PlaybackError { message })
                .then_some(());
        }
        other => {
            warn!("polling connect device failed: {}", other);
            return Some(());
        }
    };

    poller.events.emit(event);
    None
}

/// Ignores the report timestamp, which moves on every poll.
fn same_report(a: &PlaybackState, b: &PlaybackState) -> bool {
    a.paused == b.paused
        && a.duration_ms == b.duration_ms
        && a.position_ms == b.position_ms
        && a.current_track == b.current_track
}
