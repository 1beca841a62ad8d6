//! X-engine CLI - Offline asset tools and headless frame runs

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{frame, mesh, script, terrain};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xengine")]
#[command(about = "Asset tools and headless runs for the X-engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh conversion and inspection
    #[command(subcommand)]
    Mesh(mesh::MeshCommands),

    /// Script file checks
    #[command(subcommand)]
    Script(script::ScriptCommands),

    /// Heightmap checks
    #[command(subcommand)]
    Terrain(terrain::TerrainCommands),

    /// Load a map and render frames without a window
    Frame {
        /// Map script, resolved against the asset root
        map: PathBuf,

        /// Engine config (TOML). A missing file means defaults.
        #[arg(long, default_value = "xengine.toml")]
        config: PathBuf,

        /// Asset root (defaults to the map's directory)
        #[arg(long)]
        assets: Option<PathBuf>,

        /// Number of frames to run
        #[arg(long, default_value = "60")]
        frames: u32,

        /// Render through wgpu instead of the recording backend
        #[arg(long)]
        gpu: bool,

        /// With --gpu: write the last frame to this PNG
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long, default_value = "960")]
        width: u32,

        #[arg(long, default_value = "640")]
        height: u32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Mesh(cmd) => mesh::run(cmd),
        Commands::Script(cmd) => script::run(cmd),
        Commands::Terrain(cmd) => terrain::run(cmd),
        Commands::Frame {
            map,
            config,
            assets,
            frames,
            gpu,
            out,
            width,
            height,
        } => frame::run(frame::FrameArgs {
            map,
            config,
            assets,
            frames,
            gpu,
            out,
            width,
            height,
        }),
    }
}
