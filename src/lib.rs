//! Spotify playback session manager
//!
//! Keeps a playback device connected to a Spotify account, mirrors its state
//! into an observable store and exposes transport controls plus a thin
//! catalog client on top of the Spotify Web API.
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local OAuth callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `connect` - Playback runtime backed by Spotify Connect devices
//! - `error` - Error taxonomy and user-facing error records
//! - `management` - Local persistence of the signed-in session
//! - `player` - Token supply, runtime loading and the device session state machine
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - Spotify accounts and Web API clients
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use sporlplay::{config, spotify::auth::SpotifyAccounts};
//!
//! #[tokio::main]
//! async fn main() -> sporlplay::error::Result<()> {
//!     config::load_env().await?;
//!     let accounts = SpotifyAccounts::from_env()?;
//!     let session = accounts.cache().load().await?;
//!     println!("signed in: {}", session.is_some());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod connect;
pub mod error;
pub mod management;
pub mod player;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

/// Prints an informational message with a blue bullet point.
///
/// ```
/// info!("Waiting for device {}", name);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program
/// with status 1. Only for failures the command cannot recover from.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
