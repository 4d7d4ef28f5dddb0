use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::{Table, Tabled};

use crate::{cli, error, info, utils, warning};

const LIMIT: u32 = 20;

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}

fn print_rows<T: Tabled>(title: &str, rows: Vec<T>) {
    if rows.is_empty() {
        warning!("No {} found.", title);
        return;
    }
    info!("{}", title);
    println!("{}", Table::new(rows));
}

pub async fn search(query: String) {
    let ctx = cli::context().await;
    let pb = spinner(&format!("Searching for '{}'...", query));
    let result = ctx.catalog.search_tracks(&query, LIMIT).await;
    pb.finish_and_clear();

    match result {
        Ok(tracks) => print_rows("tracks", utils::track_rows(&tracks)),
        Err(e) => error!("Search failed. Err: {}", cli::describe(&e)),
    }
}

/// Shows the user's library. Without a flag all sections are listed.
pub async fn library(playlists: bool, albums: bool, tracks: bool) {
    let all = !(playlists || albums || tracks);
    let ctx = cli::context().await;
    let pb = spinner("Loading library...");

    if all || playlists {
        match ctx.catalog.user_playlists(LIMIT).await {
            Ok(items) => {
                pb.suspend(|| print_rows("playlists", utils::playlist_rows(&items)))
            }
            Err(e) => pb.suspend(|| warning!("Failed to load playlists. Err: {}", cli::describe(&e))),
        }
    }

    if all || albums {
        match ctx.catalog.saved_albums(LIMIT).await {
            Ok(items) => pb.suspend(|| print_rows("saved albums", utils::album_rows(&items))),
            Err(e) => pb.suspend(|| warning!("Failed to load albums. Err: {}", cli::describe(&e))),
        }
    }

    if all || tracks {
        match ctx.catalog.saved_tracks(LIMIT).await {
            Ok(items) => pb.suspend(|| print_rows("saved tracks", utils::track_rows(&items))),
            Err(e) => pb.suspend(|| warning!("Failed to load tracks. Err: {}", cli::describe(&e))),
        }
    }

    pb.finish_and_clear();
}

pub async fn playlist(id: String) {
    let ctx = cli::context().await;
    let pb = spinner("Loading playlist...");
    let result = ctx.catalog.playlist_tracks(&id, 50).await;
    pb.finish_and_clear();

    match result {
        Ok(tracks) => print_rows("tracks", utils::track_rows(&tracks)),
        Err(e) => error!("Failed to load playlist {}. Err: {}", id, cli::describe(&e)),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BrowseSections {
    pub new_releases: bool,
    pub featured: bool,
    pub categories: bool,
    pub top: bool,
    pub recent: bool,
}

impl BrowseSections {
    fn any(&self) -> bool {
        self.new_releases || self.featured || self.categories || self.top || self.recent
    }
}

/// Browse sections the account may not have access to come back empty
/// instead of failing the whole command.
pub async fn browse(sections: BrowseSections) {
    let all = !sections.any();
    let ctx = cli::context().await;
    let pb = spinner("Browsing...");

    if all || sections.new_releases {
        match ctx.catalog.new_releases(LIMIT).await {
            Ok(items) => pb.suspend(|| print_rows("new releases", utils::album_rows(&items))),
            Err(e) => pb.suspend(|| warning!("{}", cli::describe(&e))),
        }
    }

    if all || sections.featured {
        match ctx.catalog.featured_playlists(LIMIT).await {
            Ok(items) => pb.suspend(|| {
                print_rows("featured playlists", utils::playlist_rows(&items))
            }),
            Err(e) => pb.suspend(|| warning!("{}", cli::describe(&e))),
        }
    }

    if all || sections.categories {
        match ctx.catalog.categories(LIMIT).await {
            Ok(items) => pb.suspend(|| print_rows("categories", utils::category_rows(&items))),
            Err(e) => pb.suspend(|| warning!("{}", cli::describe(&e))),
        }
    }

    if all || sections.top {
        match ctx.catalog.top_tracks(LIMIT).await {
            Ok(items) => pb.suspend(|| print_rows("top tracks", utils::track_rows(&items))),
            Err(e) => pb.suspend(|| warning!("{}", cli::describe(&e))),
        }
    }

    if all || sections.recent {
        match ctx.catalog.recently_played(LIMIT).await {
            Ok(items) => {
                pb.suspend(|| print_rows("recently played", utils::track_rows(&items)))
            }
            Err(e) => pb.suspend(|| warning!("{}", cli::describe(&e))),
        }
    }

    pb.finish_and_clear();
}
