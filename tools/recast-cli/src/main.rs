//! Recast CLI — screen and audio recording from the terminal.
//!
//! Usage:
//!   recast record [OPTIONS]    Record the screen to a file
//!   recast devices [--use ID]  List microphones, optionally pick one
//!   recast check               Check host capture capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "recast",
    about = "Screen recording with mixed system and microphone audio",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the screen
    Record {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Disable microphone capture
        #[arg(long)]
        no_mic: bool,

        /// Disable system audio capture
        #[arg(long)]
        no_system_audio: bool,

        /// Microphone device id (overrides the saved preference)
        #[arg(long)]
        mic_device: Option<String>,
    },

    /// List audio input devices
    Devices {
        /// Save this device id as the microphone preference
        #[arg(long = "use")]
        use_device: Option<String>,
    },

    /// Check host capture capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = recast_common::AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    recast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            output,
            no_mic,
            no_system_audio,
            mic_device,
        } => commands::record::run(output, !no_mic, !no_system_audio, mic_device, config).await,
        Commands::Devices { use_device } => commands::devices::run(use_device, config).await,
        Commands::Check => commands::check::run(),
    }
}
