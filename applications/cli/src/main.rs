/// Cadence - headless playback session host
use anyhow::{bail, Context};
use cadence_cli::host::{self, Outcome};
use cadence_cli::{CadenceConfig, ManifestLibrary};
use cadence_core::KeyValueStore;
use cadence_playback::{
    PlayRequest, RepeatMode, SessionHandle, SessionSnapshot, ShuffleMode, SleepAction,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence playback session host", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a manifest from the given position
    Play {
        /// JSON manifest of tracks
        manifest: PathBuf,
        /// Queue position to start at
        #[arg(short, long, default_value_t = 0)]
        index: usize,
        /// Shuffle the queue
        #[arg(long)]
        shuffle: bool,
        /// Repeat mode (off, all, one)
        #[arg(long, default_value = "off")]
        repeat: RepeatMode,
        /// Arm the sleep timer for this many seconds
        #[arg(long)]
        sleep: Option<u64>,
        /// What the sleep timer does (pause, stop, exit)
        #[arg(long, default_value = "pause")]
        sleep_action: SleepAction,
    },
    /// Continue the saved session
    Resume {
        /// JSON manifest the saved track ids are resolved against
        manifest: PathBuf,
    },
    /// Show the saved session
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CadenceConfig::load_from(path)?,
        None => CadenceConfig::load()?,
    };
    config.validate()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Play {
            manifest,
            index,
            shuffle,
            repeat,
            sleep,
            sleep_action,
        } => {
            let options = PlayOptions {
                index,
                shuffle: ShuffleMode::from(shuffle),
                repeat,
                sleep: sleep.map(|secs| (secs.saturating_mul(1000), sleep_action)),
            };
            play(&config, &manifest, options).await?;
        }
        Commands::Resume { manifest } => {
            resume(&config, &manifest).await?;
        }
        Commands::Status => {
            status(&config).await?;
        }
    }

    Ok(())
}

struct PlayOptions {
    index: usize,
    shuffle: ShuffleMode,
    repeat: RepeatMode,
    sleep: Option<(u64, SleepAction)>,
}

async fn start_session(
    config: &CadenceConfig,
    manifest: &Path,
) -> anyhow::Result<(SessionHandle, Arc<ManifestLibrary>)> {
    let library = ManifestLibrary::load(manifest)
        .await
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
    let library = Arc::new(library);
    tracing::info!("Manifest: {} tracks", library.len());

    let store = host::open_store(&config.storage).await?;
    let handle = SessionHandle::spawn(
        config.session.clone(),
        host::collaborators(store, library.clone()),
    );
    Ok((handle, library))
}

async fn play(config: &CadenceConfig, manifest: &Path, options: PlayOptions) -> anyhow::Result<()> {
    let (handle, library) = start_session(config, manifest).await?;

    handle.set_repeat_mode(options.repeat).await?;
    handle.set_shuffle_mode(options.shuffle).await?;
    handle
        .play(PlayRequest::Queue {
            tracks: library.tracks().to_vec(),
            index: options.index,
        })
        .await?;

    if let Some((duration_ms, action)) = options.sleep {
        handle.arm_sleep_timer(duration_ms, action).await?;
    }

    run(&handle).await
}

async fn resume(config: &CadenceConfig, manifest: &Path) -> anyhow::Result<()> {
    let (handle, _) = start_session(config, manifest).await?;

    let view = handle.status().await?;
    if view.queue.tracks.is_empty() {
        handle.shutdown().await?;
        bail!("No saved session to resume");
    }
    tracing::info!(
        "Resuming at {} ({} queued)",
        host::format_ms(view.position_ms),
        view.queue.tracks.len()
    );

    handle.play(PlayRequest::Current).await?;
    run(&handle).await
}

async fn run(handle: &SessionHandle) -> anyhow::Result<()> {
    let outcome = host::drive(handle, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    tracing::info!("Session finished: {:?}", outcome);
    if outcome == Outcome::Closed {
        bail!("Session stopped unexpectedly");
    }

    // Persists the final position before the process exits
    handle.shutdown().await?;

    if outcome == Outcome::Failed {
        bail!("Playback failed");
    }
    Ok(())
}

async fn status(config: &CadenceConfig) -> anyhow::Result<()> {
    let store = host::open_store(&config.storage).await?;
    let bytes = store
        .read(&config.session.snapshot_key)
        .await
        .context("Failed to read saved session")?;

    match bytes.as_deref().and_then(SessionSnapshot::decode) {
        Some(snapshot) => println!("{}", host::describe_snapshot(&snapshot)),
        None => println!("No saved session"),
    }
    Ok(())
}
