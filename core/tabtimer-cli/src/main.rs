//! tabtimer: inspection and replay tool for the tab timer page core.
//!
//! ## Subcommands
//!
//! - `replay`: Runs a recorded page scenario on a virtual clock and prints
//!   every title write
//! - `effective`: Resolves the settings that would apply to a URL
//! - `format`: Formats seconds the way decorated titles show them

mod logging;
mod replay;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabtimer_core::{
    default_preferences_path, format_hms, load_preferences, PageConfig, PlatformRouter,
    PreferenceSnapshot, TabTimerError,
};
use tabtimer_protocol::canonical_host;

#[derive(Parser)]
#[command(name = "tabtimer")]
#[command(about = "Tab title countdown core: replays and settings inspection")]
#[command(version)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a page scenario (JSON) and print each title write
    Replay {
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Print the whole report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective settings for a page URL
    Effective {
        #[arg(value_name = "URL")]
        url: String,

        /// Preference file (defaults to ~/.tabtimer/preferences.toml)
        #[arg(long, value_name = "PATH")]
        preferences: Option<PathBuf>,
    },

    /// Format a number of seconds as H:MM:SS / M:SS
    Format {
        #[arg(value_name = "SECONDS")]
        seconds: u64,
    },
}

fn main() {
    let cli = Cli::parse();
    let _logging_guard = logging::init(cli.log_file.as_deref());

    match cli.command {
        Commands::Replay { scenario, json } => {
            if let Err(e) = run_replay(&scenario, json) {
                tracing::error!(error = %e, "tabtimer replay failed");
                eprintln!("tabtimer: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Effective { url, preferences } => {
            if let Err(e) = run_effective(&url, preferences.as_deref()) {
                tracing::error!(error = %e, "tabtimer effective failed");
                eprintln!("tabtimer: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Format { seconds } => println!("{}", format_hms(seconds)),
    }
}

fn run_replay(path: &Path, json: bool) -> Result<(), replay::ReplayError> {
    let scenario = replay::load(path)?;
    let report = replay::run(&scenario);

    if json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|source| TabTimerError::Json {
            context: "replay report".to_string(),
            source,
        })?;
        println!("{}", rendered);
        return Ok(());
    }

    for write in &report.writes {
        println!("{:>8}ms  {}", write.at_ms, write.title);
    }
    for response in &report.responses {
        if let Ok(line) = serde_json::to_string(response) {
            println!("response  {}", line);
        }
    }
    Ok(())
}

fn run_effective(url: &str, preferences: Option<&Path>) -> Result<(), TabTimerError> {
    let path = preferences
        .map(Path::to_path_buf)
        .or_else(default_preferences_path);
    let snapshot = match &path {
        Some(path) => load_preferences(path)?,
        None => PreferenceSnapshot::default(),
    };

    let host = canonical_host(url);
    let config = PageConfig::resolve(&snapshot, &host);
    let router = PlatformRouter::new();
    let report = serde_json::json!({
        "host": host,
        "platform": router.for_url(url).name(),
        "preferences": path.map(|p| p.display().to_string()),
        "enabled": config.enabled(None),
        "hideWhenInactive": config.hide_when_inactive(None),
        "config": config,
    });

    let rendered = serde_json::to_string_pretty(&report).map_err(|source| TabTimerError::Json {
        context: "effective settings".to_string(),
        source,
    })?;
    println!("{}", rendered);
    Ok(())
}
