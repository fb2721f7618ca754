//! rawimg - raw disk image builder.
//!
//! Partitions and formats loop-backed raw images from image templates.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rawimg::commands;
use rawimg::config::Config;

#[derive(Parser)]
#[command(name = "rawimg")]
#[command(about = "Raw disk image builder")]
#[command(
    after_help = "QUICK START:\n  rawimg preflight          Check host tools and privileges\n  rawimg plan image.yml     Show the partition layout\n  rawimg build image.yml    Build the raw image"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a raw image from a template (needs root)
    Build {
        /// Image template (.yml, .yaml or .json)
        template: PathBuf,

        /// Directory for the image (default: RAWIMG_WORK_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Version for the final file name (default: from template, else "dev")
        #[arg(long)]
        version: Option<String>,
    },

    /// Print the partition table a template would produce
    Plan {
        /// Image template (.yml, .yaml or .json)
        template: PathBuf,

        /// Logical sector size in bytes
        #[arg(long, default_value = "512")]
        logical: u64,

        /// Physical block size in bytes
        #[arg(long, default_value = "512")]
        physical: u64,
    },

    /// Inspect or detach loop devices
    Loop {
        #[command(subcommand)]
        what: LoopCommand,
    },

    /// Run preflight checks (host tools, privileges)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum LoopCommand {
    /// List attached loop devices
    List,
    /// Show one loop device
    Info { device: String },
    /// Detach one loop device
    Detach { device: String },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show partition type names and GUIDs
    Types,
}

fn init_tracing(default_level: &str) {
    if let Err(e) = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init()
    {
        eprintln!("[WARN] Failed to initialize tracing: {}", e);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir);
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Build {
            template,
            output_dir,
            version,
        } => {
            commands::cmd_build(&template, output_dir, version, &config)?;
        }

        Commands::Plan {
            template,
            logical,
            physical,
        } => {
            commands::cmd_plan(&template, logical, physical)?;
        }

        Commands::Loop { what } => {
            let target = match what {
                LoopCommand::List => commands::loopdev::LoopTarget::List,
                LoopCommand::Info { device } => commands::loopdev::LoopTarget::Info(device),
                LoopCommand::Detach { device } => commands::loopdev::LoopTarget::Detach(device),
            };
            commands::cmd_loop(target, &config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Types => commands::show::ShowTarget::Types,
            };
            commands::cmd_show(target, &config)?;
        }
    }

    Ok(())
}
