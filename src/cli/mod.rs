//! # CLI Module
//!
//! User-facing commands. Each command builds what it needs from the cached
//! session, talks to Spotify and prints the result with the colored output
//! macros or as a table.
//!
//! ```text
//! auth / logout     -> spotify::auth + management::SessionCache
//! search, library,
//! playlist, browse  -> spotify::CatalogGateway
//! player ...        -> CatalogGateway (one-shot) or player::DeviceSession (attach)
//! ```
//!
//! Unrecoverable failures end the process through [`error!`](crate::error!)
//! with a hint on what to do next.

use std::sync::Arc;

mod auth;
mod catalog;
mod player;

pub use auth::{auth, logout};
pub use catalog::{BrowseSections, browse, library, playlist, search};
pub use player::{attach, devices, status};
pub use player::{PlayerCommand, player_command};

use crate::{
    error,
    error::{ErrorRecord, PlayerError, UserAction},
    player::{SessionProvider, TokenSupplier},
    spotify::{CatalogGateway, auth::SpotifyAccounts},
};

/// Everything an authenticated command needs.
pub(crate) struct Context {
    pub tokens: TokenSupplier,
    pub catalog: CatalogGateway,
}

/// Loads the cached session, exiting with a login hint if there is none.
pub(crate) async fn context() -> Context {
    let accounts = match SpotifyAccounts::from_env() {
        Ok(accounts) => Arc::new(accounts),
        Err(e) => error!("{}", e),
    };

    let session = match accounts.cache().load().await {
        Ok(Some(session)) => session,
        Ok(None) => error!("No session found. Please run sporlplay auth"),
        Err(e) => error!("Failed to load session. Err: {}", e),
    };

    let provider: Arc<dyn SessionProvider> = accounts;
    let tokens = TokenSupplier::new(provider, Some(session));
    let catalog = CatalogGateway::new(tokens.clone());
    Context { tokens, catalog }
}

/// Turns an error into the message plus the follow-up the user should take.
pub(crate) fn describe(err: &PlayerError) -> String {
    let record = ErrorRecord::from(err);
    match record.action() {
        UserAction::Login => format!("{}\nRun sporlplay auth to sign in again.", record.message),
        UserAction::UpgradeAccount => format!(
            "{}\nPlayback control needs a Spotify Premium account.",
            record.message
        ),
        UserAction::Retry => match record.retry_after {
            Some(after) => format!("{} (try again in {}s)", record.message, after.as_secs()),
            None => record.message,
        },
        UserAction::Wait => format!("{} (wait a moment and try again)", record.message),
    }
}
