//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for the aura presence engine.
#[derive(Parser)]
#[command(name = "aura")]
#[command(about = "Drive and inspect the aura voice avatar presence engine")]
#[command(version)]
pub struct Cli {
    /// Presence settings file (TOML)
    #[arg(long = "config", env = "AURA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List audio input devices
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Classify the emotion of a piece of text
    Classify {
        /// Text to classify
        #[arg(required = true)]
        text: Vec<String>,

        /// Print the full score as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the built-in agents
    Agents {
        /// Print the system instruction for this agent instead of the list
        #[arg(long = "prompt", value_name = "ID")]
        prompt: Option<String>,

        /// User name to include in the system instruction
        #[arg(long = "user-name", requires = "prompt")]
        user_name: Option<String>,

        /// Extra information about the user for the system instruction
        #[arg(long = "user-info", requires = "prompt")]
        user_info: Option<String>,
    },

    /// Run the presence engine on the local microphone and print state changes
    Monitor(MonitorArgs),
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct MonitorArgs {
    /// Agent to play
    #[arg(long, default_value = "proper-paul")]
    pub agent: String,

    /// Input device name (defaults to the system default)
    #[arg(long)]
    pub device: Option<String>,

    /// Start with the microphone muted
    #[arg(long)]
    pub muted: bool,

    /// Stop after this many seconds (runs until Ctrl-C otherwise)
    #[arg(long)]
    pub seconds: Option<u64>,

    /// Whisper GGML model for local speech recognition
    #[arg(long = "whisper-model", env = "AURA_WHISPER_MODEL")]
    pub whisper_model: Option<PathBuf>,

    /// Print snapshots as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Record outbound audio chunks to this file as JSON lines
    #[arg(long = "chunks-out", value_name = "FILE")]
    pub chunks_out: Option<PathBuf>,
}
