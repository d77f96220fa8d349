use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use encore::config::EncoreConfig;
use encore::engine::CaptureEngine;
use encore::graph::{AudioGraphProvider, SineGraph, StaticGraphProvider};
use encore::library::{ExportBundle, Library};
use encore::model::{EventKind, RecordKind};
use encore::sync::{HttpSyncBackend, RemoteSync};
use milkcrate::{BlobStore, FileKvStore};

/// Capture, store, and export live mixing performances
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of ./encore.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List records of a kind, newest first
    List {
        #[arg(value_enum, default_value_t = KindArg::Performance)]
        kind: KindArg,
    },

    /// Export a record's metadata (and audio, if any) to files
    Export {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,

        /// Directory to write into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Delete a record and its audio
    Remove {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
    },

    /// Store a mixer state snapshot from a JSON document
    Snapshot {
        /// File holding the state JSON; reads stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Capture a synthetic performance against a tone generator, then export it
    Demo {
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Capture length in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,

        /// Directory to write the exported files into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Performance,
    Recording,
    Session,
}

impl From<KindArg> for RecordKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Performance => RecordKind::Performance,
            KindArg::Recording => RecordKind::AudioRecording,
            KindArg::Session => RecordKind::StateSnapshot,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        EncoreConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(state_dir) = cli.state_dir {
        config.paths.state_dir = state_dir;
    }

    let filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::List { kind } => {
            let engine = build_engine(&config, Arc::new(StaticGraphProvider::empty()))?;
            list_records(&engine, kind.into());
        }
        Command::Export { kind, id, out_dir } => {
            let engine = build_engine(&config, Arc::new(StaticGraphProvider::empty()))?;
            let bundle = engine.export(kind.into(), &id)?;
            write_bundle(&bundle, &out_dir)?;
        }
        Command::Remove { kind, id } => {
            let mut engine = build_engine(&config, Arc::new(StaticGraphProvider::empty()))?;
            engine.remove(kind.into(), &id)?;
            println!("removed {id}");
        }
        Command::Snapshot { file } => {
            let json = match &file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => io::read_to_string(io::stdin()).context("Failed to read stdin")?,
            };
            let state: serde_json::Value =
                serde_json::from_str(&json).context("State document is not valid JSON")?;

            let mut engine = build_engine(&config, Arc::new(StaticGraphProvider::empty()))?;
            let record = engine.save_current_state(state);
            println!("saved {} ({} tracks)", record.id, record.tracks.len());
        }
        Command::Demo {
            frequency,
            seconds,
            out_dir,
        } => {
            let provider = StaticGraphProvider::new(Arc::new(SineGraph::new(frequency, seconds)));
            let mut engine = build_engine(&config, Arc::new(provider))?;
            run_demo(&mut engine, &out_dir).await?;
        }
        Command::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}

fn build_engine(
    config: &EncoreConfig,
    provider: Arc<dyn AudioGraphProvider>,
) -> Result<CaptureEngine> {
    let kv = Arc::new(
        FileKvStore::new(config.collections_dir()).context("Failed to open collections store")?,
    );
    let blobs = BlobStore::new(config.blobs_dir()).context("Failed to open blob store")?;
    let library = Library::open(kv, blobs);

    let sync = if config.sync.enabled && !config.sync.base_url.is_empty() {
        info!(url = %config.sync.base_url, user = %config.sync.user, "remote sync enabled");
        Arc::new(RemoteSync::new(Arc::new(HttpSyncBackend::new(
            &config.sync.base_url,
            &config.sync.user,
        ))))
    } else {
        Arc::new(RemoteSync::disabled())
    };

    Ok(CaptureEngine::new(provider, library, sync))
}

fn list_records(engine: &CaptureEngine, kind: RecordKind) {
    let records = engine.list(kind);
    if records.is_empty() {
        println!("no {kind} records");
        return;
    }

    for record in records {
        println!(
            "{}  {}  {:>8}ms  {:>3} events  {:>2} tracks{}",
            record.id,
            format_time(record.start_time),
            record.duration_ms,
            record.events.len(),
            record.tracks.len(),
            if record.has_audio() { "  [audio]" } else { "" },
        );
    }
}

fn write_bundle(bundle: &ExportBundle, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir).context("Failed to create output directory")?;

    let metadata_path = out_dir.join(&bundle.metadata_name);
    std::fs::write(&metadata_path, &bundle.metadata)
        .with_context(|| format!("Failed to write {}", metadata_path.display()))?;
    println!("wrote {}", metadata_path.display());

    if let Some(audio) = &bundle.audio {
        let audio_path = out_dir.join(&audio.file_name);
        std::fs::write(&audio_path, &audio.blob.data)
            .with_context(|| format!("Failed to write {}", audio_path.display()))?;
        println!("wrote {} ({} bytes)", audio_path.display(), audio.blob.len());
    }

    Ok(())
}

async fn run_demo(engine: &mut CaptureEngine, out_dir: &Path) -> Result<()> {
    let id = engine.start_performance_capture()?;
    println!("capturing {id}...");

    engine.record_event(
        EventKind::CueTrigger,
        "deck_a",
        serde_json::json!({"cue": 1}),
    );
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    engine.record_event(
        EventKind::VolumeChange,
        "deck_b",
        serde_json::json!({"volume": 0.8}),
    );
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    engine.record_event(
        EventKind::FilterChange,
        "deck_a",
        serde_json::json!({"cutoff": 1200}),
    );

    let record = engine
        .stop_performance_capture()
        .await
        .context("Demo capture produced no record")?;

    println!(
        "captured {} ({}ms, {} events, {} tracks)",
        record.id,
        record.duration_ms,
        record.events.len(),
        record.tracks.len(),
    );

    let bundle = engine.export(RecordKind::Performance, &record.id)?;
    write_bundle(&bundle, out_dir)?;

    Ok(())
}

fn format_time(epoch_ms: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}
