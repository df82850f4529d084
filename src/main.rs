//! GestureFlow CLI
//!
//! Webcam hand-gesture control for the desktop.

use clap::{Parser, Subcommand};
use gestureflow::{
    actions::{GestureConfigEntry, GestureConfigStore, Preset},
    config::Config,
    core::GestureClassifier,
    AppState, VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gestureflow")]
#[command(version = VERSION)]
#[command(about = "Hand-gesture desktop control and virtual mouse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP / WebSocket server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (overrides the config file)
        #[arg(long)]
        host: Option<String>,
    },

    /// List gesture → action mappings
    Gestures,

    /// Map a gesture to a preset action or a keyboard shortcut
    Map {
        /// Gesture label as trained
        gesture: String,

        /// Preset action name, e.g. "Volume Up"
        #[arg(long, conflicts_with = "keys", required_unless_present = "keys")]
        preset: Option<String>,

        /// Key combo, e.g. "cmd+shift+a"
        #[arg(long)]
        keys: Option<String>,

        /// Display label for a keyboard shortcut
        #[arg(long)]
        label: Option<String>,
    },

    /// Remove a gesture mapping
    Unmap {
        /// Gesture label
        gesture: String,
    },

    /// Inspect or reset the trained model
    Model {
        #[command(subcommand)]
        action: ModelCommand,
    },

    /// Show configuration
    Config,
}

#[derive(Subcommand)]
enum ModelCommand {
    /// Show sample counts per gesture
    Info,
    /// Delete the saved model (a running server resets via DELETE /api/model)
    Reset,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => {
            cmd_serve(port, host);
        }
        Commands::Gestures => {
            cmd_gestures();
        }
        Commands::Map {
            gesture,
            preset,
            keys,
            label,
        } => {
            cmd_map(&gesture, preset, keys, label);
        }
        Commands::Unmap { gesture } => {
            cmd_unmap(&gesture);
        }
        Commands::Model { action } => match action {
            ModelCommand::Info => cmd_model_info(),
            ModelCommand::Reset => cmd_model_reset(),
        },
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gestureflow=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}), using defaults");
            Config::default()
        }
    }
}

fn open_store(config: &Config) -> GestureConfigStore {
    GestureConfigStore::open(config.gestures_path())
}

fn cmd_serve(port: Option<u16>, host: Option<String>) {
    init_logging();

    let mut config = load_config();
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("GestureFlow v{VERSION}");
    println!();
    println!("  Landmark feed: {} {}", config.feed.command, config.feed.args.join(" "));
    println!("  Target FPS: {}", config.pipeline.target_fps);
    println!("  Data path: {:?}", config.data_path);
    println!();

    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = ctrlc_handler(running.clone()) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    let result: anyhow::Result<()> = runtime.block_on(async move {
        let state = Arc::new(AppState::new(config));
        let (addr, shutdown_tx) = gestureflow::server::run(state).await?;

        println!("Listening on http://{addr} (WebSocket at ws://{addr}/ws)");
        println!("Press Ctrl+C to stop");
        println!();

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        println!();
        println!("Shutting down...");
        let _ = shutdown_tx.send(());
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    });

    if let Err(e) = result {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

fn cmd_gestures() {
    let config = load_config();
    let store = open_store(&config);

    println!("Gesture Mappings");
    println!("================");
    println!();

    let entries = store.list();
    if entries.is_empty() {
        println!("No gestures mapped.");
        return;
    }

    for entry in entries {
        let status = match entry.resolve() {
            Ok(action) => action.to_string(),
            Err(e) => format!("invalid ({e})"),
        };
        println!("  {:<16} {:<10} {}", entry.name, entry.action_type, status);
    }

    println!();
    println!(
        "Presets: {}",
        Preset::ALL.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
    );
}

fn cmd_map(gesture: &str, preset: Option<String>, keys: Option<String>, label: Option<String>) {
    let entry = match (preset, keys) {
        (Some(preset), _) => GestureConfigEntry::new(gesture, "preset", preset, ""),
        (None, Some(keys)) => {
            let action = label.unwrap_or_else(|| keys.clone());
            GestureConfigEntry::new(gesture, "keyboard", action, keys)
        }
        (None, None) => {
            eprintln!("Error: pass either --preset or --keys");
            std::process::exit(1);
        }
    };

    let action = match entry.resolve() {
        Ok(action) => action,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let config = load_config();
    let mut store = open_store(&config);
    if let Err(e) = store.upsert(entry) {
        eprintln!("Error saving gesture mapping: {e}");
        std::process::exit(1);
    }
    println!("Mapped '{gesture}' -> {action}");
}

fn cmd_unmap(gesture: &str) {
    let config = load_config();
    let mut store = open_store(&config);
    match store.delete(gesture) {
        Ok(true) => println!("Removed mapping for '{gesture}'"),
        Ok(false) => println!("No mapping found for '{gesture}'"),
        Err(e) => {
            eprintln!("Error saving gesture mapping: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_model_info() {
    let config = load_config();
    let path = config.model_path();
    let mut classifier =
        GestureClassifier::new(config.classifier.n_neighbors, config.classifier.unknown_threshold);

    match classifier.load(&path) {
        Ok(true) => {}
        Ok(false) => {
            println!("No saved model at {path:?}");
            println!("Train gestures from the UI to create one.");
            return;
        }
        Err(e) => {
            eprintln!("Error loading model: {e}");
            std::process::exit(1);
        }
    }

    let stats = classifier.stats();
    println!("Model");
    println!("=====");
    println!();
    println!("File: {path:?}");
    println!("Trained: {}", stats.trained);
    println!("Samples: {}", stats.samples);
    if let Some(saved_at) = stats.saved_at {
        println!("Saved at: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    for (label, count) in &stats.classes {
        println!("  {label:<16} {count}");
    }
}

fn cmd_model_reset() {
    let config = load_config();
    let path = config.model_path();
    if !path.exists() {
        println!("No saved model at {path:?}");
        return;
    }
    match std::fs::remove_file(&path) {
        Ok(()) => println!("Deleted {path:?}"),
        Err(e) => {
            eprintln!("Error deleting model: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
}
