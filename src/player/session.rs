use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    error::{ErrorRecord, PlayerError, Result},
    player::{
        DeviceEvent, DeviceEvents, DeviceFactory, DeviceOptions, PlaybackApi, PlaybackDevice,
        PlaybackStateStore, SdkLoader, SessionPhase, TokenSupplier,
    },
    types::ControlRequest,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_name: String,
    pub initial_volume: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: "sporlplay".to_string(),
            initial_volume: 0.5,
        }
    }
}

/// The device owned by one start cycle.
///
/// Dropping a handle that was not [`release`]d still unsubscribes and
/// disconnects the device, so a dropped session or a cancelled `start` does
/// not leave it running.
struct DeviceHandle {
    device: Arc<dyn PlaybackDevice>,
    pump: JoinHandle<()>,
    device_id: Option<String>,
    released: bool,
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.pump.abort();
        if self.released {
            return;
        }

        let device = Arc::clone(&self.device);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("releasing dropped playback device");
                runtime.spawn(async move { device.disconnect().await });
            }
            Err(_) => warn!("playback device dropped outside a runtime, not disconnected"),
        }
    }
}

struct SessionState {
    phase: SessionPhase,
    /// Bumped on every start and stop. Events and results carrying an older
    /// epoch belong to a torn down device and are dropped.
    epoch: u64,
    handle: Option<DeviceHandle>,
}

struct SessionInner {
    loader: Arc<SdkLoader>,
    tokens: TokenSupplier,
    factory: Arc<dyn DeviceFactory>,
    api: Arc<dyn PlaybackApi>,
    store: PlaybackStateStore,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

/// Owns the lifecycle of one playback device and exposes its controls.
///
/// Clones share the same device; hand a clone to whatever needs the control
/// surface.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

impl DeviceSession {
    pub fn new(
        loader: Arc<SdkLoader>,
        tokens: TokenSupplier,
        factory: Arc<dyn DeviceFactory>,
        api: Arc<dyn PlaybackApi>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                loader,
                tokens,
                factory,
                api,
                store: PlaybackStateStore::new(),
                config,
                state: Mutex::new(SessionState {
                    phase: SessionPhase::Idle,
                    epoch: 0,
                    handle: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &PlaybackStateStore {
        &self.inner.store
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase.clone()
    }

    pub fn device_id(&self) -> Option<String> {
        self.lock()
            .handle
            .as_ref()
            .and_then(|handle| handle.device_id.clone())
    }

    fn set_phase(&self, state: &mut SessionState, phase: SessionPhase) {
        state.phase = phase.clone();
        self.inner.store.set_phase(phase);
    }

    /// Brings up a new device, tearing down the current one first.
    ///
    /// Returns once the device accepted the connect request; the session
    /// becomes [`SessionPhase::Ready`] when the device reports its id. This is
    /// also the only way out of [`SessionPhase::Error`].
    pub async fn start(&self) -> Result<()> {
        let (epoch, previous) = {
            let mut state = self.lock();
            state.epoch += 1;
            state.phase = SessionPhase::Initializing;
            self.inner.store.begin();
            (state.epoch, state.handle.take())
        };

        if let Some(previous) = previous {
            release(previous).await;
        }

        if let Err(e) = self.inner.loader.ensure_loaded().await {
            let failure = PlayerError::InitializationError(e.to_string());
            self.fail(epoch, &failure);
            return Err(e);
        }

        if let Err(e) = self.inner.tokens.get_token().await {
            let failure = PlayerError::AuthenticationError(e.to_string());
            self.fail(epoch, &failure);
            return Err(e);
        }

        let (events, rx) = DeviceEvents::channel();
        let device = self.inner.factory.create(
            DeviceOptions {
                name: self.inner.config.device_name.clone(),
                tokens: self.inner.tokens.clone(),
                initial_volume: self.inner.config.initial_volume,
            },
            events,
        );

        let superseded = {
            let mut state = self.lock();
            if state.epoch == epoch {
                let pump = tokio::spawn(pump_events(Arc::downgrade(&self.inner), epoch, rx));
                state.handle = Some(DeviceHandle {
                    device: Arc::clone(&device),
                    pump,
                    device_id: None,
                    released: false,
                });
                self.set_phase(&mut state, SessionPhase::Connecting);
                false
            } else {
                true
            }
        };

        if superseded {
            debug!("start superseded before connecting");
            device.disconnect().await;
            return Ok(());
        }

        debug!(name = %self.inner.config.device_name, "connecting playback device");
        let failure = match device.connect().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                PlayerError::InitializationError("device refused to connect".to_string())
            }
            Err(e) => PlayerError::InitializationError(e.to_string()),
        };

        self.fail(epoch, &failure);
        Err(failure)
    }

    /// Moves to [`SessionPhase::Error`] and releases the device, unless the
    /// cycle was superseded or already failed with a more specific error.
    fn fail(&self, epoch: u64, failure: &PlayerError) {
        let handle = {
            let mut state = self.lock();
            if state.epoch != epoch {
                return;
            }
            if !matches!(state.phase, SessionPhase::Error(_)) {
                error!("playback session failed: {}", failure);
                self.set_phase(&mut state, SessionPhase::Error(ErrorRecord::from(failure)));
            }
            state.handle.take()
        };

        // dropping the handle disconnects the device in the background
        drop(handle);
    }

    /// Tears the session down from whatever phase it is in.
    pub async fn stop(&self) {
        let handle = {
            let mut state = self.lock();
            state.epoch += 1;
            self.set_phase(&mut state, SessionPhase::Disconnected);
            state.handle.take()
        };

        if let Some(handle) = handle {
            release(handle).await;
        }
        info!("playback session stopped");
    }

    fn dispatch(&self, epoch: u64, event: DeviceEvent) -> ControlFlow<()> {
        let mut state = self.lock();
        if state.epoch != epoch || state.handle.is_none() {
            debug!(?event, "dropping event from released device");
            return ControlFlow::Break(());
        }

        match event {
            DeviceEvent::Ready { device_id } => {
                info!(%device_id, "playback device ready");
                if let Some(handle) = state.handle.as_mut() {
                    handle.device_id = Some(device_id.clone());
                }
                state.phase = SessionPhase::Ready;
                self.inner.store.set_ready(&device_id);

                // make the device addressable without touching playback elsewhere
                let api = Arc::clone(&self.inner.api);
                tokio::spawn(async move {
                    if let Err(e) = api.transfer_playback(&device_id, false).await {
                        warn!(%device_id, "could not transfer playback to device: {}", e);
                    }
                });
            }
            DeviceEvent::NotReady { device_id } => {
                warn!(%device_id, "playback device went offline");
                if state.phase == SessionPhase::Ready {
                    self.set_phase(&mut state, SessionPhase::NotReady);
                }
            }
            DeviceEvent::StateChanged(Some(playback)) => {
                self.inner.store.apply_state(playback);
            }
            DeviceEvent::StateChanged(None) => self.inner.store.apply_inactive(),
            DeviceEvent::PlaybackError { message } => {
                warn!("playback error: {}", message);
                self.inner
                    .store
                    .record_error(ErrorRecord::from(&PlayerError::PlaybackError(message)));
            }
            DeviceEvent::InitializationError { message } => {
                return self.fatal(&mut state, PlayerError::InitializationError(message));
            }
            DeviceEvent::AuthenticationError { message } => {
                self.inner.tokens.expire();
                return self.fatal(&mut state, PlayerError::AuthenticationError(message));
            }
            DeviceEvent::AccountError { message } => {
                return self.fatal(&mut state, PlayerError::account(message));
            }
        }

        ControlFlow::Continue(())
    }

    fn fatal(&self, state: &mut SessionState, failure: PlayerError) -> ControlFlow<()> {
        error!("playback device failed: {}", failure);
        self.set_phase(state, SessionPhase::Error(ErrorRecord::from(&failure)));

        // runs on the pump itself, so the disconnect is left to the handle's drop
        drop(state.handle.take());
        ControlFlow::Break(())
    }

    /// Runs one control operation against the ready device.
    ///
    /// # Errors
    ///
    /// [`PlayerError::DeviceNotReady`] without any I/O unless the session is
    /// ready; otherwise whatever the device or the Web API reported. Failures
    /// are recorded in the store but never change the phase.
    pub async fn execute(&self, request: ControlRequest) -> Result<()> {
        let ready = {
            let state = self.lock();
            match (&state.phase, &state.handle) {
                (SessionPhase::Ready, Some(handle)) => Some((
                    state.epoch,
                    Arc::clone(&handle.device),
                    handle.device_id.clone().unwrap_or_default(),
                )),
                (
                    SessionPhase::Initializing | SessionPhase::Connecting | SessionPhase::NotReady,
                    _,
                ) => {
                    self.inner
                        .store
                        .record_error(ErrorRecord::from(&PlayerError::DeviceNotReady));
                    None
                }
                _ => None,
            }
        };

        let Some((epoch, device, device_id)) = ready else {
            return Err(PlayerError::DeviceNotReady);
        };

        let result = match request {
            ControlRequest::Play(None) => device.resume().await,
            ControlRequest::Play(Some(uri)) => self.inner.api.start_playback(&device_id, &[uri]).await,
            ControlRequest::Pause => device.pause().await,
            ControlRequest::TogglePlay => device.toggle_play().await,
            ControlRequest::Next => device.next_track().await,
            ControlRequest::Previous => device.previous_track().await,
            ControlRequest::Seek(position_ms) => device.seek(position_ms).await,
            ControlRequest::SetVolume(volume) if (0.0..=1.0).contains(&volume) => {
                device.set_volume(volume).await
            }
            ControlRequest::SetVolume(volume) => Err(PlayerError::PlaybackError(format!(
                "volume {} is outside 0..1",
                volume
            ))),
            ControlRequest::TransferTo {
                device_id,
                autoplay,
            } => self.inner.api.transfer_playback(&device_id, autoplay).await,
        };

        let state = self.lock();
        if state.epoch == epoch {
            match &result {
                Ok(()) => self.inner.store.clear_error(),
                Err(e) => {
                    warn!("control operation failed: {}", e);
                    self.inner.store.record_error(ErrorRecord::from(e));
                }
            }
        }
        result
    }

    /// Resumes the current context, or plays `uri` on this device.
    pub async fn play(&self, uri: Option<&str>) -> Result<()> {
        self.execute(ControlRequest::Play(uri.map(str::to_string)))
            .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.execute(ControlRequest::Pause).await
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.execute(ControlRequest::TogglePlay).await
    }

    pub async fn next(&self) -> Result<()> {
        self.execute(ControlRequest::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.execute(ControlRequest::Previous).await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        self.execute(ControlRequest::Seek(position_ms)).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.execute(ControlRequest::SetVolume(volume)).await
    }

    pub async fn transfer_to(&self, device_id: &str, autoplay: bool) -> Result<()> {
        self.execute(ControlRequest::TransferTo {
            device_id: device_id.to_string(),
            autoplay,
        })
        .await
    }
}

/// Unsubscribes first, then disconnects, so the disconnect cannot feed events
/// back into the store.
async fn release(mut handle: DeviceHandle) {
    handle.pump.abort();
    handle.released = true;
    handle.device.disconnect().await;
}

async fn pump_events(
    session: Weak<SessionInner>,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<DeviceEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        let session = DeviceSession { inner };
        if session.dispatch(epoch, event).is_break() {
            break;
        }
    }
}
