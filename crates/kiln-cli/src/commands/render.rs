//! Headless render of the demo scene to a PNG

use anyhow::{Context, Result};
use glam::Vec3;
use kiln_render::{Camera, FirstPersonController, FrameOrchestrator, FrameStats, HeadlessContext};
use kiln_scene::demo::demo_scene;

/// Fixed timestep the frames are rendered at
const FRAME_DELTA: f32 = 1.0 / 60.0;

pub struct RenderArgs {
    pub output: String,
    pub config: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frames: u32,
    pub eye: Option<Vec3>,
    pub target: Option<Vec3>,
    pub no_taa: bool,
    pub fxaa: bool,
    pub no_hdr: bool,
    pub no_ssao: bool,
    pub no_shadows: bool,
    pub no_culling: bool,
    pub count_overflow: bool,
}

pub fn run(args: RenderArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.renderer.width = width;
    }
    if let Some(height) = args.height {
        config.renderer.height = height;
    }
    let frame = &mut config.frame;
    if args.no_taa {
        frame.taa.enabled = false;
    }
    if args.fxaa {
        frame.fxaa.enabled = true;
    }
    if args.no_hdr {
        frame.hdr.enabled = false;
    }
    if args.no_ssao {
        frame.ssao.enabled = false;
    }
    if args.no_shadows {
        frame.shadows.enabled = false;
    }
    if args.no_culling {
        frame.culling.enabled = false;
    }
    if args.count_overflow {
        frame.oit.count_overflow = true;
    }
    config.validate().context("Invalid configuration")?;

    let ctx = pollster::block_on(HeadlessContext::new(
        config.renderer.width,
        config.renderer.height,
    ))
    .context("Failed to create headless render context")?;

    let scene = demo_scene();
    println!(
        "Demo scene: {} draws, {} materials",
        scene.draws.len(),
        scene.materials.len()
    );

    let mut orchestrator =
        FrameOrchestrator::new(&ctx.device, &ctx.queue, &scene, &config.renderer, ctx.format)
            .context("Failed to build the frame pipeline")?;

    let (eye, target) = super::viewpoint(args.eye, args.target);
    let camera = Camera::FirstPerson(FirstPersonController::new(eye, target, Vec3::Y));

    let mut stats = FrameStats::default();
    for _ in 0..args.frames.max(1) {
        stats = orchestrator.render(
            &ctx.device,
            &ctx.queue,
            &ctx.color_view,
            &camera,
            &config.frame,
            FRAME_DELTA,
        );
    }

    let pixels = pollster::block_on(ctx.read_pixels()).context("Failed to read rendered pixels")?;
    let img = image::RgbaImage::from_raw(ctx.width, ctx.height, pixels)
        .context("Failed to create image from pixel data")?;
    img.save(&args.output)
        .with_context(|| format!("Failed to save image to {}", args.output))?;

    println!(
        "Rendered {} frames at {}x{} to {}",
        stats.frame_index + 1,
        ctx.width,
        ctx.height,
        args.output
    );
    println!(
        "Visible: {} opaque, {} transparent",
        stats.visible_opaque, stats.visible_transparent
    );
    if config.frame.oit.count_overflow {
        println!(
            "OIT: {} fragments, {} dropped",
            stats.oit_fragments, stats.oit_dropped
        );
    }
    Ok(())
}
