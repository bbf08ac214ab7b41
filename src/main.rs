//! IPTV Viewer - command-line host
//! Browses M3U playlists and streams channels through an external player

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cli;

use std::error::Error;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use cli::{Cli, Commands};
use iptv_viewer::models::UNKNOWN_NAME;
use iptv_viewer::player::{
    format_time, EngineFactory, ExternalPlayerConfig, ExternalPlayerSink, HlsEngineFactory,
    PlaybackSession, PlayerState,
};
use iptv_viewer::{AppConfig, Channel, ChannelBrowser, FetchError, PlaylistLoader};
use tracing::{error, info, warn};

const LOADER_POLL: Duration = Duration::from_millis(50);
const PLAYER_POLL: Duration = Duration::from_millis(250);

type CliResult = Result<(), Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "iptv_viewer=debug,player=debug".to_string()
        } else {
            "iptv_viewer=info,player=warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => match AppConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load config");
                return ExitCode::FAILURE;
            }
        },
        None => AppConfig::load(),
    };
    if let Some(url) = cli.playlist {
        config.playlist_url = url;
    }

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &AppConfig) -> CliResult {
    let mut browser = ChannelBrowser::new(config.search_debounce());
    browser.set_channels(load_channels(config)?);

    match command {
        Commands::List { json } => print_channels(browser.channels(), json),
        Commands::Groups { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(browser.groups())?);
            } else {
                for (group, channels) in browser.groups().iter() {
                    println!("{} ({})", group, channels.len());
                }
            }
            Ok(())
        }
        Commands::Search { query, json } => {
            browser.apply_query_now(&query);
            print_channels(browser.filtered(), json)
        }
        Commands::Play {
            query,
            player,
            native,
            fullscreen,
        } => {
            browser.apply_query_now(&query);
            let url = match browser.filtered().first() {
                Some(channel) => channel.url.clone(),
                None => return Err(format!("no channel matches '{}'", query).into()),
            };
            let name = browser
                .select(&url)
                .map_or(UNKNOWN_NAME.to_string(), |c| c.name.clone());
            let program = player.unwrap_or_else(|| config.external_player.clone());
            info!(channel = %name, program = %program, "Playing");
            play(config, &url, program, native, fullscreen)
        }
    }
}

/// Fetch the playlist through the background loader
fn load_channels(config: &AppConfig) -> Result<Vec<Channel>, FetchError> {
    let mut loader = PlaylistLoader::new(config.fetch_options());
    loader.request(&config.playlist_url);
    loop {
        if let Some(outcome) = loader.poll() {
            return outcome.result;
        }
        thread::sleep(LOADER_POLL);
    }
}

fn print_channels(channels: &[Channel], json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(channels)?);
        return Ok(());
    }
    for channel in channels {
        println!("{}\t{}\t{}", channel.name, channel.group_key(), channel.url);
    }
    Ok(())
}

fn play(config: &AppConfig, url: &str, program: String, native: bool, fullscreen: bool) -> CliResult {
    let sink = ExternalPlayerSink::new(ExternalPlayerConfig {
        program,
        user_agent: config.user_agent.clone(),
        viewport_width: config.viewport_width,
    });
    let engines: Option<Box<dyn EngineFactory>> = if native {
        None
    } else {
        Some(Box::new(HlsEngineFactory))
    };
    let mut player_config = config.player_config();
    player_config.autoplay = true;

    let mut session = PlaybackSession::new(sink, engines, player_config);
    session.bind(url)?;
    if fullscreen {
        session.enter_fullscreen();
    }

    let mut started = false;
    loop {
        session.poll(Instant::now());
        match session.state() {
            PlayerState::Playing => started = true,
            PlayerState::Paused | PlayerState::Idle | PlayerState::Detached => break,
            PlayerState::Loading => {}
        }
        thread::sleep(PLAYER_POLL);
    }

    let position = format_time(session.position());
    session.unmount();
    if !started {
        warn!(url, "Playback never started");
        return Err("player failed to start".into());
    }
    info!(position = %position, "Playback stopped");
    Ok(())
}
