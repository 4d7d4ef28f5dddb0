//! # API Module
//!
//! HTTP endpoints of the local server that is up while `sporlplay auth` runs.
//!
//! - [`callback`] - finishes the OAuth 2.0 PKCE flow: receives the
//!   authorization code from Spotify's accounts service, exchanges it for a
//!   session and hands the session to the waiting sign-in flow.
//! - [`health`] - reports status and version, handy to check that the
//!   callback server is reachable on the configured address.
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use sporlplay::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health));
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
