//! # Spotify Connect runtime
//!
//! Implements the playback runtime on top of the Web API's Connect endpoints.
//! A device is any Connect device the account can see (a desktop client, a
//! speaker, `spotifyd`, ...) matched by name. Its presence and playback state
//! are polled and turned into [`DeviceEvent`](crate::player::DeviceEvent)s.

mod device;
mod runtime;

pub use device::{ConnectDevice, ConnectDeviceFactory};
pub use runtime::ConnectRuntime;
