use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::{error::ErrorRecord, types::PlaybackState};

/// Lifecycle phase of a [`DeviceSession`](crate::player::DeviceSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Initializing,
    Connecting,
    Ready,
    NotReady,
    Disconnected,
    Error(ErrorRecord),
}

/// Immutable view of the player handed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSnapshot {
    pub phase: SessionPhase,
    pub device_id: Option<String>,
    pub playback: PlaybackState,
    /// Latest error, until dismissed or superseded by a successful operation.
    pub error: Option<ErrorRecord>,
}

impl PlayerSnapshot {
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            device_id: None,
            playback: PlaybackState::default(),
            error: None,
        }
    }
}

/// Observable player state. Only the device session writes to it; everybody
/// else reads snapshots or subscribes to changes.
#[derive(Clone)]
pub struct PlaybackStateStore {
    tx: Arc<watch::Sender<PlayerSnapshot>>,
}

impl Default for PlaybackStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PlayerSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.tx.subscribe()
    }

    /// Dismisses the current error record.
    pub fn clear_error(&self) {
        self.tx.send_if_modified(|s| s.error.take().is_some());
    }

    /// Starts a fresh cycle: no device, no playback, no error.
    pub(crate) fn begin(&self) {
        self.tx.send_modify(|s| {
            *s = PlayerSnapshot {
                phase: SessionPhase::Initializing,
                ..PlayerSnapshot::default()
            };
        });
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        self.tx.send_modify(|s| {
            if let SessionPhase::Error(record) = &phase {
                s.error = Some(record.clone());
            }
            s.phase = phase;
        });
    }

    pub(crate) fn set_ready(&self, device_id: &str) {
        self.tx.send_modify(|s| {
            s.phase = SessionPhase::Ready;
            s.device_id = Some(device_id.to_string());
            s.error = None;
        });
    }

    /// Applies a device report unless a newer one was already applied.
    pub(crate) fn apply_state(&self, playback: PlaybackState) -> bool {
        self.tx.send_if_modified(|s| {
            if playback.last_updated < s.playback.last_updated || s.playback == playback {
                return false;
            }
            s.playback = playback;
            true
        })
    }

    /// Marks playback as gone from the device, keeping the stamp of the last
    /// report so the next one from the device still applies.
    pub(crate) fn apply_inactive(&self) {
        self.tx.send_if_modified(|s| {
            let inactive = PlaybackState::inactive(s.playback.last_updated);
            if s.playback == inactive {
                return false;
            }
            s.playback = inactive;
            true
        });
    }

    pub(crate) fn record_error(&self, record: ErrorRecord) {
        self.tx.send_modify(|s| s.error = Some(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PlayerError};

    fn playback(position_ms: u64, last_updated: i64) -> PlaybackState {
        PlaybackState {
            paused: false,
            position_ms,
            duration_ms: 200_000,
            current_track: None,
            last_updated,
        }
    }

    #[test]
    fn newest_report_wins() {
        let store = PlaybackStateStore::new();
        assert!(store.apply_state(playback(10_000, 2_000)));
        assert!(!store.apply_state(playback(5_000, 1_000)));
        assert_eq!(store.snapshot().playback.position_ms, 10_000);

        assert!(store.apply_state(playback(12_000, 3_000)));
        assert_eq!(store.snapshot().playback.position_ms, 12_000);
    }

    #[test]
    fn ready_clears_error_and_error_phase_records_it() {
        let store = PlaybackStateStore::new();
        store.record_error(ErrorRecord::from(&PlayerError::DeviceNotReady));
        store.set_ready("abc");

        let snapshot = store.snapshot();
        assert!(snapshot.is_ready());
        assert_eq!(snapshot.device_id.as_deref(), Some("abc"));
        assert!(snapshot.error.is_none());

        let record = ErrorRecord::from(&PlayerError::account("Premium required"));
        store.set_phase(SessionPhase::Error(record.clone()));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.error, Some(record));
        assert!(matches!(
            snapshot.phase,
            SessionPhase::Error(ErrorRecord {
                kind: ErrorKind::AccountError {
                    premium_required: true
                },
                ..
            })
        ));
    }

    #[test]
    fn report_after_inactive_is_applied() {
        let store = PlaybackStateStore::new();
        assert!(store.apply_state(playback(10_000, 5_000)));

        store.apply_inactive();
        let snapshot = store.snapshot();
        assert!(snapshot.playback.paused);
        assert_eq!(snapshot.playback.position_ms, 0);

        // same server-side change as before, playback came back to the device
        assert!(store.apply_state(playback(10_000, 5_000)));
        assert_eq!(store.snapshot().playback.position_ms, 10_000);
        assert!(!store.apply_state(playback(8_000, 4_000)));
    }

    #[tokio::test]
    async fn subscribers_see_changes_and_dismissals() {
        let store = PlaybackStateStore::new();
        let mut rx = store.subscribe();

        store.record_error(ErrorRecord::from(&PlayerError::PlaybackError("boom".into())));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().error.is_some());

        store.clear_error();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().error.is_none());
    }
}
