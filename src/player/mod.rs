//! # Playback session manager
//!
//! Keeps one playback device alive and in sync with a local state machine.
//!
//! ```text
//! DeviceSession::start
//!     ├── SdkLoader::ensure_loaded      (runtime loaded once per loader)
//!     ├── TokenSupplier::get_token      (cached, refreshed, coalesced)
//!     └── DeviceFactory::create + connect
//!              ↓ DeviceEvent
//!     PlaybackStateStore  ──watch──▶  UI / CLI
//!              ▲
//!     controls (play, pause, seek, ...) ─▶ PlaybackDevice / PlaybackApi
//! ```
//!
//! Phases: `Idle → Initializing → Connecting → Ready ⇄ NotReady → Disconnected`,
//! with `Error` reachable from any live phase. Leaving `Error` always takes an
//! explicit [`DeviceSession::start`]; nothing here retries on its own.

mod device;
mod loader;
mod session;
mod store;
mod token;

pub use device::{
    DeviceEvent, DeviceEvents, DeviceFactory, DeviceOptions, PlaybackApi, PlaybackDevice,
};
pub use loader::{DEFAULT_LOAD_TIMEOUT, LoadState, SdkLoader, SdkRuntime, SdkSignal};
pub use session::{DeviceSession, SessionConfig};
pub use store::{PlaybackStateStore, PlayerSnapshot, SessionPhase};
pub use token::{REFRESH_BUFFER_SECS, SessionProvider, TokenSupplier};
