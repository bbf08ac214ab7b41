use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iptv-viewer")]
#[command(author, version, about = "Browse and play IPTV playlists")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Playlist URL (overrides config)
    #[arg(short, long, global = true)]
    pub playlist: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every channel in the playlist
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show channels grouped by category
    Groups {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find channels whose name or group contains the query
    Search {
        #[arg(required = true)]
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play the first channel matching the query
    Play {
        #[arg(required = true)]
        query: String,

        /// External player program (overrides config)
        #[arg(long)]
        player: Option<String>,

        /// Let the player resolve HLS manifests instead of the built-in engine
        #[arg(long)]
        native: bool,

        /// Start in fullscreen
        #[arg(long)]
        fullscreen: bool,
    },
}
