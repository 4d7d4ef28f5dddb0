use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tracing::{debug, warn};

use crate::{
    error::{PlayerError, Result},
    types::Session,
};

/// Tokens are refreshed this many seconds before they actually expire.
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// The identity provider behind the supplier.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Exchanges the session's refresh token for a renewed session.
    async fn refresh(&self, session: &Session) -> Result<Session>;

    /// Called once the supplier has dropped its session, after a failed
    /// refresh or on sign-out.
    async fn invalidate(&self) {}
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Session>>>;

#[derive(Default)]
struct SupplierState {
    session: Option<Session>,
    stale: bool,
    refresh: Option<(u64, RefreshFuture)>,
    generation: u64,
}

/// Hands out access tokens, refreshing them through a [`SessionProvider`].
///
/// Cloning is cheap and every clone shares the same cache, so the device,
/// the catalog client and the CLI all see one session. Concurrent callers
/// that find the token expired wait on the same refresh.
#[derive(Clone)]
pub struct TokenSupplier {
    provider: Arc<dyn SessionProvider>,
    state: Arc<Mutex<SupplierState>>,
}

impl TokenSupplier {
    pub fn new(provider: Arc<dyn SessionProvider>, session: Option<Session>) -> Self {
        Self {
            provider,
            state: Arc::new(Mutex::new(SupplierState {
                session,
                ..SupplierState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupplierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a usable access token.
    ///
    /// # Errors
    ///
    /// - [`PlayerError::NoSession`] if nobody is signed in
    /// - [`PlayerError::AuthExpired`] if the refresh failed; the session is
    ///   dropped and the user has to sign in again
    pub async fn get_token(&self) -> Result<String> {
        let (id, refresh) = {
            let mut state = self.lock();

            if let Some((id, refresh)) = &state.refresh {
                (*id, refresh.clone())
            } else {
                let Some(session) = state.session.clone() else {
                    return Err(PlayerError::NoSession);
                };

                if !state.stale && session.is_fresh(REFRESH_BUFFER_SECS) {
                    return Ok(session.access_token);
                }

                debug!(session = %session.id, "access token expiring, refreshing");
                let provider = Arc::clone(&self.provider);
                let refresh = async move { provider.refresh(&session).await }
                    .boxed()
                    .shared();

                state.generation += 1;
                let id = state.generation;
                state.refresh = Some((id, refresh.clone()));
                (id, refresh)
            }
        };

        let result = refresh.await;

        let dropped = {
            let mut state = self.lock();
            let current = matches!(&state.refresh, Some((current, _)) if *current == id);
            if current {
                state.refresh = None;
                match &result {
                    Ok(session) => {
                        state.session = Some(session.clone());
                        state.stale = false;
                        false
                    }
                    Err(_) => {
                        state.session = None;
                        state.stale = false;
                        true
                    }
                }
            } else {
                false
            }
        };

        match result {
            Ok(session) => Ok(session.access_token),
            Err(e) => {
                if dropped {
                    warn!("token refresh failed, dropping session: {}", e);
                    self.provider.invalidate().await;
                }
                Err(PlayerError::AuthExpired)
            }
        }
    }

    /// Replaces the session, e.g. right after signing in.
    pub fn install(&self, session: Session) {
        let mut state = self.lock();
        state.session = Some(session);
        state.stale = false;
        state.refresh = None;
    }

    /// Forces the next [`get_token`](Self::get_token) to refresh, keeping the
    /// refresh token. Used after the backend rejected the current token.
    pub fn expire(&self) {
        let mut state = self.lock();
        if state.session.is_some() {
            state.stale = true;
        }
    }

    pub async fn sign_out(&self) {
        {
            let mut state = self.lock();
            state.session = None;
            state.stale = false;
            state.refresh = None;
        }
        self.provider.invalidate().await;
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }
}
