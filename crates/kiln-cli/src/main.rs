//! Kiln CLI - headless rendering and diagnostics for the Kiln frame pipeline

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config, cull, render};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Multi-pass wgpu renderer with GPU culling, OIT, SSAO, HDR and TAA", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the demo scene to a PNG image (headless)
    Render {
        /// Output image path
        #[arg(short, long, default_value = "render.png")]
        output: String,

        /// Path to a TOML config file
        #[arg(long)]
        config: Option<String>,

        /// Image width in pixels (overrides the config)
        #[arg(long)]
        width: Option<u32>,

        /// Image height in pixels (overrides the config)
        #[arg(long)]
        height: Option<u32>,

        /// Frames to render before reading back; temporal effects need a few
        #[arg(long, default_value = "16")]
        frames: u32,

        /// Camera position
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
        eye: Option<Vec<f32>>,

        /// Point the camera looks at
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
        target: Option<Vec<f32>>,

        /// Disable temporal anti-aliasing (FXAA is used if enabled in the config)
        #[arg(long)]
        no_taa: bool,

        /// Use FXAA (implies --no-taa)
        #[arg(long)]
        fxaa: bool,

        /// Disable HDR tone mapping, adaptation and bloom
        #[arg(long)]
        no_hdr: bool,

        /// Disable ambient occlusion
        #[arg(long)]
        no_ssao: bool,

        /// Disable shadows
        #[arg(long)]
        no_shadows: bool,

        /// Disable GPU frustum culling
        #[arg(long)]
        no_culling: bool,

        /// Count and report OIT fragments dropped past capacity
        #[arg(long)]
        count_overflow: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Path to a TOML config file; defaults are printed when omitted
        #[arg(long)]
        config: Option<String>,
    },

    /// Cull the demo scene on the CPU and report what survives
    Cull {
        /// Camera position
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
        eye: Option<Vec<f32>>,

        /// Point the camera looks at
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
        target: Option<Vec<f32>>,

        /// Path to a TOML config file (camera settings)
        #[arg(long)]
        config: Option<String>,

        /// List every draw with its verdict
        #[arg(long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            output,
            config,
            width,
            height,
            frames,
            eye,
            target,
            no_taa,
            fxaa,
            no_hdr,
            no_ssao,
            no_shadows,
            no_culling,
            count_overflow,
        } => render::run(render::RenderArgs {
            output,
            config,
            width,
            height,
            frames,
            eye: eye.as_deref().and_then(commands::vec3),
            target: target.as_deref().and_then(commands::vec3),
            no_taa: no_taa || fxaa,
            fxaa,
            no_hdr,
            no_ssao,
            no_shadows,
            no_culling,
            count_overflow,
        }),
        Commands::Config { config } => config::run(config.as_deref()),
        Commands::Cull {
            eye,
            target,
            config,
            verbose,
        } => cull::run(cull::CullArgs {
            eye: eye.as_deref().and_then(commands::vec3),
            target: target.as_deref().and_then(commands::vec3),
            config,
            verbose,
        }),
    }
}
