use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{PlayerError, Result};

/// Default time the runtime gets to signal readiness.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// The playback runtime that has to be brought up once per process before any
/// device can be constructed.
pub trait SdkRuntime: Send + Sync {
    /// Starts loading the runtime. Must report the outcome exactly once through
    /// `signal`, either right away or later from another task. Dropping the
    /// signal without reporting counts as a load failure.
    fn inject(&self, signal: SdkSignal);
}

/// One-shot readiness callback handed to [`SdkRuntime::inject`].
#[derive(Debug)]
pub struct SdkSignal {
    tx: oneshot::Sender<std::result::Result<(), String>>,
}

impl SdkSignal {
    pub fn ready(self) {
        let _ = self.tx.send(Ok(()));
    }

    pub fn failed(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

type Waiter = oneshot::Sender<Result<()>>;

struct LoaderState {
    state: LoadState,
    waiters: Vec<Waiter>,
    injections: usize,
}

/// Loads the playback runtime exactly once and fans the outcome out to every
/// caller that asked for it in the meantime.
pub struct SdkLoader {
    runtime: Arc<dyn SdkRuntime>,
    timeout: Duration,
    state: Mutex<LoaderState>,
}

impl SdkLoader {
    pub fn new(runtime: Arc<dyn SdkRuntime>) -> Arc<Self> {
        Self::with_timeout(runtime, DEFAULT_LOAD_TIMEOUT)
    }

    pub fn with_timeout(runtime: Arc<dyn SdkRuntime>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            timeout,
            state: Mutex::new(LoaderState {
                state: LoadState::NotLoaded,
                waiters: Vec::new(),
                injections: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> LoadState {
        self.lock().state
    }

    /// Number of times the runtime has been injected.
    pub fn injections(&self) -> usize {
        self.lock().injections
    }

    /// Resolves once the runtime is ready.
    ///
    /// # Errors
    ///
    /// - [`PlayerError::SdkLoadError`] if the runtime failed to load; a later
    ///   call retries
    /// - [`PlayerError::SdkTimeout`] if readiness was not signalled in time; the
    ///   loader stays failed until [`reset`](Self::reset)
    pub async fn ensure_loaded(self: &Arc<Self>) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = self.lock();
            match state.state {
                LoadState::Loaded => return Ok(()),
                LoadState::Failed => return Err(PlayerError::SdkTimeout(self.timeout)),
                LoadState::Loading => {
                    state.waiters.push(tx);
                    false
                }
                LoadState::NotLoaded => {
                    state.state = LoadState::Loading;
                    state.injections += 1;
                    state.waiters.push(tx);
                    true
                }
            }
        };

        if start {
            let (signal_tx, signal_rx) = oneshot::channel();
            debug!("injecting playback runtime");
            self.runtime.inject(SdkSignal { tx: signal_tx });

            let loader = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = tokio::time::timeout(loader.timeout, signal_rx).await;
                loader.settle(outcome);
            });
        }

        rx.await
            .unwrap_or_else(|_| Err(PlayerError::SdkLoadError("loader dropped".to_string())))
    }

    fn settle(
        &self,
        outcome: std::result::Result<
            std::result::Result<std::result::Result<(), String>, oneshot::error::RecvError>,
            tokio::time::error::Elapsed,
        >,
    ) {
        let (result, next) = match outcome {
            Ok(Ok(Ok(()))) => (Ok(()), LoadState::Loaded),
            Ok(Ok(Err(reason))) => (Err(PlayerError::SdkLoadError(reason)), LoadState::NotLoaded),
            Ok(Err(_)) => (
                Err(PlayerError::SdkLoadError(
                    "runtime dropped its readiness signal".to_string(),
                )),
                LoadState::NotLoaded,
            ),
            Err(_) => (Err(PlayerError::SdkTimeout(self.timeout)), LoadState::Failed),
        };

        let waiters = {
            let mut state = self.lock();
            state.state = next;
            mem::take(&mut state.waiters)
        };

        if let Err(e) = &result {
            warn!("playback runtime failed to load: {}", e);
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    /// Forgets a previous failure so the next call injects again. Has no
    /// effect while a load is in flight.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.state != LoadState::Loading {
            state.state = LoadState::NotLoaded;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Keeps the signal so the test decides when the runtime reports.
    #[derive(Default)]
    struct ManualRuntime {
        injected: AtomicUsize,
        signal: Mutex<Option<SdkSignal>>,
    }

    impl ManualRuntime {
        fn take_signal(&self) -> SdkSignal {
            self.signal.lock().unwrap().take().expect("runtime was not injected")
        }
    }

    impl SdkRuntime for ManualRuntime {
        fn inject(&self, signal: SdkSignal) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            *self.signal.lock().unwrap() = Some(signal);
        }
    }

    fn spawn_waiters(loader: &Arc<SdkLoader>, n: usize) -> Vec<tokio::task::JoinHandle<Result<()>>> {
        (0..n)
            .map(|_| {
                let loader = Arc::clone(loader);
                tokio::spawn(async move { loader.ensure_loaded().await })
            })
            .collect()
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_injection() {
        let runtime = Arc::new(ManualRuntime::default());
        let loader = SdkLoader::new(runtime.clone());

        let handles = spawn_waiters(&loader, 5);
        tokio::task::yield_now().await;
        assert_eq!(loader.state(), LoadState::Loading);

        runtime.take_signal().ready();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(runtime.injected.load(Ordering::SeqCst), 1);
        assert_eq!(loader.state(), LoadState::Loaded);

        // already loaded: no further injection
        loader.ensure_loaded().await.unwrap();
        assert_eq!(loader.injections(), 1);
    }

    #[tokio::test]
    async fn load_error_rejects_everyone_and_allows_retry() {
        let runtime = Arc::new(ManualRuntime::default());
        let loader = SdkLoader::new(runtime.clone());

        let handles = spawn_waiters(&loader, 3);
        tokio::task::yield_now().await;
        runtime.take_signal().failed("network error");

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(PlayerError::SdkLoadError(_))
            ));
        }
        assert_eq!(loader.state(), LoadState::NotLoaded);

        let retry = spawn_waiters(&loader, 1);
        tokio::task::yield_now().await;
        runtime.take_signal().ready();
        for handle in retry {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(loader.injections(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_until_reset() {
        let runtime = Arc::new(ManualRuntime::default());
        let loader = SdkLoader::new(runtime.clone());

        let handles = spawn_waiters(&loader, 4);
        tokio::time::sleep(DEFAULT_LOAD_TIMEOUT + Duration::from_secs(1)).await;

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(PlayerError::SdkTimeout(_))
            ));
        }
        assert_eq!(loader.state(), LoadState::Failed);
        assert!(matches!(
            loader.ensure_loaded().await,
            Err(PlayerError::SdkTimeout(_))
        ));
        assert_eq!(loader.injections(), 1);

        loader.reset();
        assert_eq!(loader.state(), LoadState::NotLoaded);
        let retry = spawn_waiters(&loader, 1);
        tokio::task::yield_now().await;
        runtime.take_signal().ready();
        for handle in retry {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn dropped_signal_counts_as_load_error() {
        struct ForgetfulRuntime;
        impl SdkRuntime for ForgetfulRuntime {
            fn inject(&self, _signal: SdkSignal) {}
        }

        let loader = SdkLoader::new(Arc::new(ForgetfulRuntime));
        assert!(matches!(
            loader.ensure_loaded().await,
            Err(PlayerError::SdkLoadError(_))
        ));
        assert_eq!(loader.state(), LoadState::NotLoaded);
    }
}
