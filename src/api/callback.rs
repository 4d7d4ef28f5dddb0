use std::{collections::HashMap, sync::Arc};

use axum::{Extension, extract::Query, response::Html};
use tokio::sync::Mutex;

use crate::{spotify::auth::SpotifyAccounts, types::PkceToken, warning};

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(shared_state): Extension<Arc<Mutex<Option<PkceToken>>>>,
    Extension(accounts): Extension<Arc<SpotifyAccounts>>,
) -> Html<&'static str> {
    if let Some(error) = params.get("error") {
        warning!("Authorization was declined: {}", error);
        return Html("<h4>Login declined.</h4>");
    }

    let Some(code) = params.get("code") else {
        return Html("<h4>Missing authorization code.</h4>");
    };

    let mut state = shared_state.lock().await;
    // take code verifier from state
    let Some(pkce_state) = state.as_mut() else {
        return Html("<h4>Missing PKCE code verifier.</h4>");
    };

    match accounts
        .exchange_code_pkce(code, &pkce_state.code_verifier)
        .await
    {
        Ok(session) => {
            pkce_state.session = Some(session);
            Html("<h2>Authentication successful.</h2><p>Close browser window.</p>")
        }
        Err(e) => {
            warning!("Token exchange failed: {}", e);
            Html("<h4>Login failed.</h4>")
        }
    }
}
