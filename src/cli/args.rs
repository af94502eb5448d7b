//! CLI argument parsing with clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::provider::DEFAULT_VOICE_TYPE;

/// Generate UGC-style video ads from an avatar, a voice and a script
#[derive(Parser, Debug)]
#[command(name = "ugc-studio")]
#[command(version, about = "AI UGC video ad generator", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Create an account and pick an avatar
    ugc-studio signup --email me@example.com --name Me
    ugc-studio avatars --gender female --style professional
    ugc-studio select-avatar avatar-3

    # Generate a video
    ugc-studio set-key <PROVIDER_API_KEY>
    ugc-studio generate --voice voice-3 --brand Acme \\
        --script \"I love how [Brand] made my mornings easier.\"")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter (e.g. info, debug, ugc_studio=trace)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Sign in to an existing account
    Signin {
        #[arg(long)]
        email: String,
    },
    /// Sign out of the current account
    Signout,
    /// Show the current account, credits and selections
    Whoami,
    /// List avatars, optionally searched and filtered
    Avatars(AvatarQuery),
    /// Choose the avatar used for generation
    SelectAvatar {
        /// Avatar id (from `avatars`)
        id: String,
    },
    /// List voices
    Voices {
        /// Only show voices in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Store the video provider API key
    SetKey {
        key: String,
    },
    /// Remove the stored video provider API key
    ClearKey,
    /// Generate a video with the selected avatar
    Generate(GenerateArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct AvatarQuery {
    /// Search avatar names
    #[arg(long, short)]
    pub search: Option<String>,
    #[arg(long)]
    pub gender: Option<String>,
    #[arg(long)]
    pub style: Option<String>,
    #[arg(long)]
    pub ethnicity: Option<String>,
    #[arg(long)]
    pub age_range: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct GenerateArgs {
    /// Voice id (from `voices`)
    #[arg(long)]
    pub voice: String,

    /// Provider voice synthesis mode
    #[arg(long, default_value = DEFAULT_VOICE_TYPE)]
    pub voice_type: String,

    /// Script text; use [Brand] where the brand name belongs
    #[arg(long, conflicts_with = "script_file")]
    pub script: Option<String>,

    /// Read the script from a file
    #[arg(long)]
    pub script_file: Option<PathBuf>,

    /// Brand name substituted for [Brand]
    #[arg(long)]
    pub brand: Option<String>,

    /// Title of the generated video
    #[arg(long)]
    pub name: Option<String>,

    /// Download the finished video to this path
    #[arg(long)]
    pub download: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
