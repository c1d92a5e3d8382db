mod api;
mod app;
mod capture;
mod clock;
mod config;
mod error;
mod event;
mod input;
mod lifecycle;
mod network;
mod review;
mod roster;
mod submission;
mod ui;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crossterm::{
    event::DisableMouseCapture,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use snaphunt_common::protocol::{CreateRoomRequest, JoinRoomRequest};
use snaphunt_common::room::random_avatar_index;

use crate::app::RoomEntry;
use crate::capture::{CaptureBackend, FrameSize, StillImageBackend, TestPatternBackend};
use crate::config::ClientConfig;

const DEFAULT_LOG_FILTER: &str = "snaphunt_client=debug,snaphunt_common=debug";

/// Snaphunt - photo scavenger hunt rooms in the terminal
#[derive(Parser, Debug)]
#[command(name = "snaphunt", version, about)]
struct Args {
    /// Base URL of the room service API
    #[arg(
        short = 's',
        long,
        env = "SNAPHUNT_SERVER",
        default_value = "http://127.0.0.1:8080/api/"
    )]
    server: String,

    /// Use this picture as the camera instead of the built-in test pattern
    #[arg(long)]
    camera_image: Option<PathBuf>,

    /// Preview width in pixels
    #[arg(long, default_value_t = 200)]
    preview_width: u32,

    /// Preview height in pixels
    #[arg(long, default_value_t = 200)]
    preview_height: u32,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a room and organize it
    Create {
        /// Room name
        name: String,

        /// Challenge length in minutes
        #[arg(long, default_value_t = 30)]
        duration: u32,

        /// Minutes before the challenge starts
        #[arg(long, default_value_t = 5)]
        delay: u32,

        /// A task description; repeat for each task
        #[arg(short, long = "task", required = true)]
        tasks: Vec<String>,

        /// Let the server shuffle the task order
        #[arg(long)]
        randomize: bool,
    },
    /// Join a room by its code
    Join {
        /// Room code shown to the organizer
        code: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Avatar index; picked at random when omitted
        #[arg(long)]
        avatar: Option<u8>,
    },
}

impl Command {
    fn into_entry(self) -> anyhow::Result<RoomEntry> {
        let entry = match self {
            Command::Create {
                name,
                duration,
                delay,
                tasks,
                randomize,
            } => {
                let request = CreateRoomRequest {
                    room_name: name,
                    duration_minutes: duration,
                    delay_minutes: delay,
                    tasks,
                    randomize_order: randomize,
                };
                request.validate()?;
                RoomEntry::Create(request)
            }
            Command::Join { code, name, avatar } => {
                let request = JoinRoomRequest {
                    room_code: code,
                    display_name: name,
                    avatar_index: avatar
                        .unwrap_or_else(|| random_avatar_index(&mut rand::thread_rng())),
                };
                request.validate()?;
                RoomEntry::Join(request)
            }
        };
        Ok(entry)
    }
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    // Bad input is reported before the terminal is taken over
    let config = ClientConfig::new(
        &args.server,
        FrameSize::new(args.preview_width, args.preview_height),
    )?;
    let entry = args.command.into_entry()?;
    let backend: Arc<dyn CaptureBackend> = match args.camera_image {
        Some(path) => Arc::new(StillImageBackend::new(path)),
        None => Arc::new(TestPatternBackend::default()),
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend_term = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend_term)?;

    let result = app::run(&mut terminal, config, entry, backend).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}
