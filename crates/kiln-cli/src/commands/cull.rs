//! CPU culling report for the demo scene

use anyhow::Result;
use glam::{Mat4, Vec3};
use kiln_core::Frustum;
use kiln_render::projection_matrix;
use kiln_scene::cull::cull_commands;
use kiln_scene::demo::demo_scene;

pub struct CullArgs {
    pub eye: Option<Vec3>,
    pub target: Option<Vec3>,
    pub config: Option<String>,
    pub verbose: bool,
}

pub fn run(args: CullArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let (eye, target) = super::viewpoint(args.eye, args.target);

    let scene = demo_scene();
    let aspect = config.renderer.width as f32 / config.renderer.height.max(1) as f32;
    let view = Mat4::look_at_rh(eye, target, Vec3::Y);
    let proj = projection_matrix(&config.frame.camera, aspect);
    let frustum = Frustum::from_view_projection(&(proj * view));

    let boxes = scene.world_bounds();
    let mut partition = scene.partition();
    let opaque = cull_commands(&mut partition.opaque, &boxes, &frustum);
    let transparent = cull_commands(&mut partition.transparent, &boxes, &frustum);

    println!("Camera: eye {} -> target {}", eye, target);
    println!(
        "Opaque: {}/{} visible",
        opaque,
        partition.opaque.len()
    );
    println!(
        "Transparent: {}/{} visible",
        transparent,
        partition.transparent.len()
    );

    if args.verbose {
        for (label, commands) in [("opaque", &partition.opaque), ("transparent", &partition.transparent)] {
            for command in commands.iter() {
                let slot = command.draw_slot() as usize;
                let verdict = if command.instance_count == 1 { "visible" } else { "culled" };
                println!(
                    "  [{}] draw {:>3} material {:>2} {}  {:?}",
                    label,
                    slot,
                    command.material_index(),
                    verdict,
                    boxes.get(slot)
                );
            }
        }
    }
    Ok(())
}
