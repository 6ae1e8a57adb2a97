use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use playlist_digest::collaborators::{
    parse_playlist_id, CommandSummarizer, FfmpegCapturer, YtDlpCatalog,
};
use playlist_digest::config::{self, RunOverrides, CONFIG_FILE_NAME};
use playlist_digest::error::DigestError;
use playlist_digest::lock;
use playlist_digest::log::{item_tag, parse_log_level, progress_tag};
use playlist_digest::preflight;
use playlist_digest::scheduler::{self, PipelineEvent, PipelineParams};
use playlist_digest::session;
use playlist_digest::state;
use playlist_digest::{log_error, log_info, log_warn};

#[derive(Parser)]
#[command(
    name = "playlist-digest",
    about = "Summarize every video in a playlist and capture screenshots at each section"
)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/playlist-digest.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the state and output directories
    Init,
    /// Process every pending item of a playlist
    Run {
        /// Playlist id or any URL with a list= parameter
        playlist: String,
        /// Maximum number of items processed at once
        #[arg(long)]
        concurrency: Option<u32>,
        /// Summary language
        #[arg(long)]
        locale: Option<String>,
        /// Skip the screenshot stage
        #[arg(long)]
        no_screenshots: bool,
    },
    /// Show progress and failures recorded for a playlist
    Status {
        /// Playlist id or any URL with a list= parameter
        playlist: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => playlist_digest::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let root = &cli.root;
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Init => handle_init(root),
        Commands::Run {
            playlist,
            concurrency,
            locale,
            no_screenshots,
        } => {
            let overrides = RunOverrides {
                concurrency,
                locale,
                no_screenshots,
            };
            handle_run(root, config_path, &playlist, &overrides).await
        }
        Commands::Status { playlist } => handle_status(root, config_path, &playlist),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn handle_init(root: &Path) -> Result<(), String> {
    let config = config::DigestConfig::default();
    let dirs = [config.state_dir(root), config.output_dir(root)];
    for dir in &dirs {
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    }

    let config_path = root.join(CONFIG_FILE_NAME);
    let wrote_config = if config_path.exists() {
        false
    } else {
        fs::write(&config_path, config::default_config_toml())
            .map_err(|e| format!("Failed to write {}: {}", config_path.display(), e))?;
        true
    };

    println!("Initialized playlist-digest in {}", root.display());
    println!(
        "  Created: {}/, {}/",
        config.run.state_dir, config.run.output_dir
    );
    if wrote_config {
        println!("  Created: {}", CONFIG_FILE_NAME);
    } else {
        println!("  Kept existing {}", CONFIG_FILE_NAME);
    }

    Ok(())
}

async fn handle_run(
    root: &Path,
    config_path: Option<&Path>,
    playlist: &str,
    overrides: &RunOverrides,
) -> Result<(), String> {
    log_info!("--- Playlist Digest ---");

    let mut config = config::load_config_from(config_path, root)
        .map_err(DigestError::InvalidConfig)?;
    config::apply_overrides(&mut config, overrides);

    let playlist_id = parse_playlist_id(playlist).map_err(DigestError::InvalidConfig)?;
    let state_dir = config.state_dir(root);

    log_info!("[pre] Acquiring lock for {}...", playlist_id);
    let _lock = lock::try_acquire(&state_dir, &playlist_id).map_err(DigestError::LockHeld)?;

    // A stored document pins locale and screenshots for the whole collection
    let existing = session::load_existing(&state_dir, &playlist_id)?;
    let run_config = session::resolve_run_config(existing.as_ref(), config.run_config());
    config.run.locale = run_config.locale.clone();
    config.run.screenshots = run_config.screenshots;

    log_info!("[pre] Running preflight checks...");
    if let Err(errors) = preflight::run_preflight(&config) {
        log_error!(
            "[pre] Preflight FAILED:\n{}",
            preflight::format_preflight_errors(&errors)
        );
        return Err(DigestError::Preflight(format!(
            "{} preflight error(s), fix all issues before running",
            errors.len()
        ))
        .into());
    }

    log_info!("[pre] Fetching playlist {}...", playlist_id);
    let catalog = session::fetch_catalog(&YtDlpCatalog::new(&config.tools), &playlist_id).await?;

    log_info!(
        "[config] Locale: {}, screenshots: {}, concurrency: {}",
        config.run.locale,
        if config.run.screenshots { "on" } else { "off" },
        config.run.concurrency
    );

    let opened =
        session::open_collection(&state_dir, &playlist_id, existing, &catalog, run_config)
            .await?;

    let pending = opened.coordinator.pending_ids().await?;
    log_info!(
        "[pre] \"{}\": {} items tracked, {} pending",
        catalog.title,
        catalog.items.len(),
        pending.len()
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let event_task = tokio::spawn(log_events(rx));

    let params = PipelineParams {
        concurrency: config.run.concurrency as usize,
        output_dir: config.output_dir(root).join(&playlist_id),
    };
    let summary = scheduler::run_pipeline(
        &opened.coordinator,
        Arc::new(CommandSummarizer::new(config.summarizer.clone())),
        Arc::new(FfmpegCapturer::new(&config.tools)),
        pending,
        &params,
        Some(tx),
    )
    .await?;

    let snapshot = match opened
        .coordinator
        .get_snapshot()
        .await
        .map_err(DigestError::State)
    {
        Ok(record) => Some(record),
        Err(e) if !e.is_fatal() => {
            log_warn!("Failure details unavailable: {}", e);
            None
        }
        Err(e) => return Err(e.into()),
    };

    drop(opened.coordinator);
    if let Err(e) = opened.coordinator_task.await {
        log_warn!("Coordinator task panicked: {:?}", e);
    }
    if let Err(e) = event_task.await {
        log_warn!("Event logger panicked: {:?}", e);
    }

    log_info!("\n--- Run Summary ---");
    log_info!("Items attempted: {}", summary.attempted);
    log_info!("Items succeeded: {}", summary.succeeded.len());
    if !summary.failed.is_empty() {
        log_info!("Items failed: {}", summary.failed.join(", "));
        for id in &summary.failed {
            if let Some(item) = snapshot.as_ref().and_then(|record| record.find_item(id)) {
                print_item_errors(item);
            }
        }
    }
    log_info!("Stats: {}", summary.stats);
    log_info!("State: {}", opened.state_path.display());

    Ok(())
}

/// Turn pipeline events into progress lines.
async fn log_events(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::ItemStarted { item_id, title } => {
                log_info!("{} Starting: {}", item_tag(&item_id, None), title);
            }
            PipelineEvent::StageStarted { item_id, stage } => {
                let stage = stage.to_string();
                log_info!("{} Started", item_tag(&item_id, Some(&stage)));
            }
            PipelineEvent::ScreenshotCaptured { item_id, timestamp } => {
                log_info!(
                    "{} Captured {}",
                    item_tag(&item_id, Some("capture")),
                    timestamp
                );
            }
            PipelineEvent::ItemCompleted {
                item_id,
                finished,
                total,
            } => {
                log_info!(
                    "{} {} Done",
                    progress_tag(finished, total),
                    item_tag(&item_id, None)
                );
            }
            PipelineEvent::ItemFailed {
                item_id,
                error,
                finished,
                total,
            } => {
                log_warn!(
                    "{} {} Failed: {}",
                    progress_tag(finished, total),
                    item_tag(&item_id, None),
                    error
                );
            }
        }
    }
}

fn print_item_errors(item: &playlist_digest::types::ItemRecord) {
    if let Some(ref e) = item.summarize.error {
        println!("  {} summarize: {}", item.id, e);
    }
    if let Some(ref e) = item.capture.error {
        println!(
            "  {} capture ({}/{}): {}",
            item.id, item.capture.completed, item.capture.total, e
        );
    }
}

fn handle_status(root: &Path, config_path: Option<&Path>, playlist: &str) -> Result<(), String> {
    let config = config::load_config_from(config_path, root)?;
    let playlist_id = parse_playlist_id(playlist)?;
    let path = state::state_path(&config.state_dir(root), &playlist_id);

    let record = match state::load(&path)? {
        Some(record) => record,
        None => {
            println!("No state recorded for {} yet.", playlist_id);
            return Ok(());
        }
    };

    println!("{} ({})", record.title, record.playlist_id);
    println!(
        "  locale={}, screenshots={}, updated {}",
        record.config.locale,
        if record.config.screenshots { "on" } else { "off" },
        record.updated_at
    );
    println!("  {}", state::stats(&record));

    let failed = state::failed_ids(&record);
    if !failed.is_empty() {
        println!("\nFailed items:");
        for id in &failed {
            if let Some(item) = record.find_item(id) {
                println!("  {} {}", item.output_slug, item.title);
                print_item_errors(item);
            }
        }
    }

    Ok(())
}
