//! # Spotify Integration Module
//!
//! Clients for the two Spotify HTTP surfaces sporlplay talks to.
//!
//! ```text
//! Player core / CLI
//!          ↓
//! Spotify Integration Layer
//!     ├── Accounts (OAuth 2.0 PKCE sign-in, refresh-token grant)
//!     └── Catalog  (Web API: browse, library, search, player endpoints)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//! ```
//!
//! ## Accounts
//!
//! [`auth`] signs the user in through the PKCE flow (local callback server,
//! browser launch, code exchange) and implements
//! [`SessionProvider`](crate::player::SessionProvider) on top of the
//! refresh-token grant. Renewed sessions are written to the session cache.
//!
//! ## Catalog
//!
//! [`catalog`] wraps the Web API. Every request fetches a fresh token from the
//! [`TokenSupplier`](crate::player::TokenSupplier), responses are classified
//! into the crate's error taxonomy:
//!
//! | response                  | result                          |
//! |---------------------------|---------------------------------|
//! | 2xx                       | `Ok(Some(json))`                |
//! | 204 / empty body          | `Ok(None)`                      |
//! | 401                       | one refresh + retry, then `AuthExpired` |
//! | 403 premium required      | `PremiumRequired`               |
//! | 429                       | `RateLimited { retry_after }`   |
//! | anything else             | `Api { status, message }`       |
//!
//! Rate limits are never retried here; the caller decides when to try again.
//!
//! ## API Coverage
//!
//! - `GET /me`, `GET /search`
//! - `GET /me/playlists`, `GET /playlists/{id}/tracks`
//! - `GET /me/tracks`, `GET /me/albums`, `GET /me/top/tracks`
//! - `GET /me/player/recently-played`
//! - `GET /browse/new-releases`, `GET /browse/featured-playlists`,
//!   `GET /browse/categories`
//! - `GET /me/player`, `GET /me/player/devices`, `PUT /me/player`
//! - `PUT /me/player/play`, `PUT /me/player/pause`, `POST /me/player/next`,
//!   `POST /me/player/previous`, `PUT /me/player/seek`, `PUT /me/player/volume`

pub mod auth;
pub mod catalog;

pub use catalog::CatalogGateway;
