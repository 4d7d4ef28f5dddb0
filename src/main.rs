use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::filter::LevelFilter;

use sporlplay::{
    cli::{self, BrowseSections, PlayerCommand},
    config, error, utils,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Log level for diagnostics on stderr (off, error, warn, info, debug, trace)
    #[clap(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Spotify API
    Auth,

    /// Forget the cached session
    Logout,

    /// Search for tracks
    Search(SearchOptions),

    /// Show your library
    Library(LibraryOptions),

    /// Show the tracks of a playlist
    Playlist(PlaylistOptions),

    /// Browse new releases, featured playlists and your listening history
    Browse(BrowseOptions),

    /// Control playback
    #[command(subcommand)]
    Player(PlayerSubcommand),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// Search query
    #[clap(required = true, num_args = 1..)]
    query: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct LibraryOptions {
    #[clap(long)]
    playlists: bool,
    #[clap(long)]
    albums: bool,
    #[clap(long)]
    tracks: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PlaylistOptions {
    /// Playlist id
    id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct BrowseOptions {
    #[clap(long)]
    new_releases: bool,
    #[clap(long)]
    featured: bool,
    #[clap(long)]
    categories: bool,
    /// Your top tracks
    #[clap(long)]
    top: bool,
    /// Recently played tracks
    #[clap(long)]
    recent: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PlayerSubcommand {
    /// Show what is playing
    Status,
    /// List available devices
    Devices,
    /// Resume playback, or play the given track URI
    Play { uri: Option<String> },
    Pause,
    Next,
    Previous,
    /// Seek to a position in milliseconds
    Seek { position_ms: u64 },
    /// Set the volume between 0 and 1
    Volume {
        #[clap(value_parser = utils::parse_volume)]
        volume: f32,
    },
    /// Move playback to another device
    Transfer {
        device_id: String,
        /// Start playing after the transfer
        #[clap(long)]
        play: bool,
    },
    /// Attach to a Connect device and follow its playback
    Attach {
        /// Device name, defaults to SPORLPLAY_DEVICE_NAME
        #[clap(long)]
        device: Option<String>,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn init_logging(level: LevelFilter) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    match cli.command {
        Command::Auth => cli::auth().await,
        Command::Logout => cli::logout().await,
        Command::Search(opt) => cli::search(opt.query.join(" ")).await,
        Command::Library(opt) => cli::library(opt.playlists, opt.albums, opt.tracks).await,
        Command::Playlist(opt) => cli::playlist(opt.id).await,
        Command::Browse(opt) => {
            cli::browse(BrowseSections {
                new_releases: opt.new_releases,
                featured: opt.featured,
                categories: opt.categories,
                top: opt.top,
                recent: opt.recent,
            })
            .await
        }
        Command::Player(sub) => match sub {
            PlayerSubcommand::Status => cli::status().await,
            PlayerSubcommand::Devices => cli::devices().await,
            PlayerSubcommand::Attach { device } => cli::attach(device).await,
            PlayerSubcommand::Play { uri } => cli::player_command(PlayerCommand::Play(uri)).await,
            PlayerSubcommand::Pause => cli::player_command(PlayerCommand::Pause).await,
            PlayerSubcommand::Next => cli::player_command(PlayerCommand::Next).await,
            PlayerSubcommand::Previous => cli::player_command(PlayerCommand::Previous).await,
            PlayerSubcommand::Seek { position_ms } => {
                cli::player_command(PlayerCommand::Seek(position_ms)).await
            }
            PlayerSubcommand::Volume { volume } => {
                cli::player_command(PlayerCommand::Volume(volume)).await
            }
            PlayerSubcommand::Transfer { device_id, play } => {
                cli::player_command(PlayerCommand::Transfer { device_id, play }).await
            }
        },
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
