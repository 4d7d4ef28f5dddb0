use std::sync::Arc;

use crate::{
    error, info,
    management::SessionCache,
    player::{SessionProvider, TokenSupplier},
    spotify::{
        CatalogGateway,
        auth::{SpotifyAccounts, sign_in},
    },
    success, warning,
};

/// Signs in through the browser and caches the session.
pub async fn auth() {
    let accounts = match SpotifyAccounts::from_env() {
        Ok(accounts) => Arc::new(accounts),
        Err(e) => error!("{}", e),
    };

    info!("Opening browser for Spotify sign-in...");
    let session = match sign_in(Arc::clone(&accounts)).await {
        Ok(session) => session,
        Err(e) => error!("Sign-in failed. Err: {}", e),
    };

    let provider: Arc<dyn SessionProvider> = accounts;
    let tokens = TokenSupplier::new(provider, None);
    tokens.install(session);

    match CatalogGateway::new(tokens).me().await {
        Ok(profile) => {
            let name = profile.display_name.unwrap_or(profile.id);
            success!("Signed in as {}.", name);
            if profile.product.as_deref() != Some("premium") {
                warning!("Playback control needs a Spotify Premium account.");
            }
        }
        Err(e) => {
            warning!("Signed in, but the profile could not be loaded. Err: {}", e);
        }
    }
}

/// Forgets the cached session.
pub async fn logout() {
    let cache = SessionCache::default_location();
    match cache.load().await {
        Ok(None) => {
            info!("Not signed in.");
            return;
        }
        Ok(Some(_)) => {}
        Err(e) => warning!("Cached session is unreadable, removing it. Err: {}", e),
    }

    match cache.clear().await {
        Ok(()) => success!("Signed out."),
        Err(e) => error!("Failed to remove {}. Err: {}", cache.path().display(), e),
    }
}
