//! Procedural demo content
//!
//! A ground plane, a ring of opaque boxes, a few tinted glass panes and one box placed
//! behind the default camera so culling has something to reject.

use crate::material::MaterialDescription;
use crate::primitives::{append_box, append_plane};
use crate::snapshot::{DrawData, EnvironmentMap, SceneSnapshot, TextureTable};
use glam::{Mat4, Quat, Vec3};

pub const CAMERA_POSITION: Vec3 = Vec3::new(-10.0, 3.0, 3.0);
pub const CAMERA_TARGET: Vec3 = Vec3::new(0.0, 0.0, -1.0);

const CHECKER_SIZE: u32 = 64;

pub fn demo_scene() -> SceneSnapshot {
    let mut scene = SceneSnapshot {
        textures: checker_table(),
        environment: sky_gradient(64, 32),
        ..Default::default()
    };

    let cube = append_box(&mut scene, Vec3::ONE);
    let pane = append_box(&mut scene, Vec3::new(3.0, 2.0, 0.1));
    let ground = append_plane(&mut scene, 60.0, 60.0);

    scene.materials = vec![
        MaterialDescription::opaque([0.8, 0.8, 0.8, 1.0]).with_albedo_map(0),
        MaterialDescription::opaque([0.9, 0.35, 0.2, 1.0]),
        MaterialDescription::opaque([0.2, 0.5, 0.9, 1.0]),
        MaterialDescription::opaque([1.0, 0.9, 0.6, 1.0]).with_emissive([6.0, 5.0, 3.0, 0.0]),
        MaterialDescription::transparent([0.2, 0.9, 0.4, 1.0], 0.4),
        MaterialDescription::transparent([0.9, 0.2, 0.6, 1.0], 0.5),
    ];

    push(&mut scene, ground, 0, Mat4::IDENTITY);

    for i in 0..12 {
        let angle = i as f32 / 12.0 * std::f32::consts::TAU;
        let height = 1.0 + (i % 3) as f32;
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, height, 1.0),
            Quat::from_rotation_y(angle),
            Vec3::new(angle.cos() * 6.0, height * 0.5, angle.sin() * 6.0 - 1.0),
        );
        push(&mut scene, cube, 1 + (i % 2), transform);
    }

    // Emissive block for the bloom pass
    push(
        &mut scene,
        cube,
        3,
        Mat4::from_scale_rotation_translation(Vec3::splat(0.6), Quat::IDENTITY, Vec3::new(0.0, 2.5, -1.0)),
    );

    for (i, x) in [-2.0f32, 0.5, 3.0].into_iter().enumerate() {
        push(
            &mut scene,
            pane,
            4 + (i as u32 % 2),
            Mat4::from_rotation_translation(
                Quat::from_rotation_y(0.3 * i as f32),
                Vec3::new(x, 1.0, 1.5 + i as f32),
            ),
        );
    }

    // Behind the default camera
    push(&mut scene, cube, 1, Mat4::from_translation(Vec3::new(-40.0, 1.0, 15.0)));

    scene
}

fn push(scene: &mut SceneSnapshot, mesh: u32, material: u32, transform: Mat4) {
    scene.transforms.push(transform);
    scene.draws.push(DrawData {
        mesh_index: mesh,
        material_index: material,
        transform_index: (scene.transforms.len() - 1) as u32,
    });
}

/// One box straight ahead of the camera in `two_box_view_projection`, one straight behind it
pub fn two_box_scene() -> SceneSnapshot {
    let mut scene = SceneSnapshot::default();
    let cube = append_box(&mut scene, Vec3::splat(2.0));
    scene.materials.push(MaterialDescription::opaque([1.0; 4]));
    for z in [-10.0, 10.0] {
        push(&mut scene, cube, 0, Mat4::from_translation(Vec3::new(0.0, 0.0, z)));
    }
    scene
}

/// Camera at the origin looking down -Z
pub fn two_box_view_projection() -> Mat4 {
    let proj = Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 100.0);
    proj * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y)
}

fn checker_table() -> TextureTable {
    let mut texels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let value = if ((x / 8) + (y / 8)) % 2 == 0 { 230 } else { 140 };
            texels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    TextureTable {
        size: CHECKER_SIZE,
        layers: vec![texels],
    }
}

/// Horizon-to-zenith gradient with a warm band near the horizon
fn sky_gradient(width: u32, height: u32) -> EnvironmentMap {
    let mut texels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        // v = 0 is straight up
        let elevation = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
        for _ in 0..width {
            let t = elevation.max(0.0);
            let horizon = (1.0 - elevation.abs()).powi(8);
            let ground = (-elevation).max(0.0);
            texels.push([
                0.35 + 0.5 * horizon - 0.25 * t - 0.2 * ground,
                0.5 + 0.3 * horizon - 0.1 * t - 0.3 * ground,
                0.9 + 0.1 * horizon - 0.55 * ground,
                1.0,
            ]);
        }
    }
    EnvironmentMap {
        width,
        height,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_scene_is_valid() {
        let scene = demo_scene();
        scene.validate().unwrap();
        assert!(scene.is_textured());
    }

    #[test]
    fn test_demo_scene_has_both_partitions() {
        let part = demo_scene().partition();
        assert_eq!(part.transparent.len(), 3);
        assert_eq!(part.opaque.len(), demo_scene().draws.len() - 3);
    }

    #[test]
    fn test_scene_bounds_cover_ground() {
        let bounds = demo_scene().scene_bounds();
        assert!(bounds.min.x <= -30.0 && bounds.max.x >= 30.0);
    }
}
