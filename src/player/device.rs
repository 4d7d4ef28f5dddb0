//! The contract between the session manager and the playback runtime.
//!
//! A runtime provides a [`DeviceFactory`]; devices report what happens to them
//! through [`DeviceEvents`] and are driven through [`PlaybackDevice`]. Calls
//! that must address the device through the Web API go through
//! [`PlaybackApi`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{error::Result, player::TokenSupplier, types::PlaybackState};

/// Everything a device needs at construction time.
#[derive(Clone)]
pub struct DeviceOptions {
    pub name: String,
    /// Queried for every authentication handshake the device performs.
    pub tokens: TokenSupplier,
    pub initial_volume: f32,
}

/// Events a device reports, already translated out of the runtime's
/// callback style.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    /// `None` when playback moved away from this device.
    StateChanged(Option<PlaybackState>),
    InitializationError { message: String },
    AuthenticationError { message: String },
    AccountError { message: String },
    PlaybackError { message: String },
}

/// Listener registration handed to a device. Emitting after the session
/// unsubscribed is a no-op.
#[derive(Debug, Clone)]
pub struct DeviceEvents {
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl DeviceEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once nobody listens anymore.
    pub fn emit(&self, event: DeviceEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One playback device instance.
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Starts connecting. `Ok(false)` means the runtime refused; the device
    /// id arrives later through [`DeviceEvent::Ready`].
    async fn connect(&self) -> Result<bool>;
    async fn disconnect(&self);
    async fn toggle_play(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn next_track(&self) -> Result<()>;
    async fn previous_track(&self) -> Result<()>;
    async fn seek(&self, position_ms: u64) -> Result<()>;
    /// `volume` is in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;
}

pub trait DeviceFactory: Send + Sync {
    fn create(&self, options: DeviceOptions, events: DeviceEvents) -> Arc<dyn PlaybackDevice>;
}

/// Web API calls that address a device by id.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    async fn start_playback(&self, device_id: &str, uris: &[String]) -> Result<()>;
    async fn transfer_playback(&self, device_id: &str, play: bool) -> Result<()>;
}
