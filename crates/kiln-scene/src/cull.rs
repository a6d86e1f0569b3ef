//! CPU frustum culling over indirect commands
//!
//! Same decision the culling compute shader makes: each command's draw slot selects
//! its world box, the instance count becomes 0 or 1, and the number of survivors is
//! returned.

use crate::draw::IndirectCommands;
use kiln_core::{BoundingBox, Frustum};

pub fn cull_commands(commands: &mut IndirectCommands, boxes: &[BoundingBox], frustum: &Frustum) -> u32 {
    let mut visible = 0;
    for command in commands.as_mut_slice() {
        let inside = boxes
            .get(command.draw_slot() as usize)
            .is_some_and(|b| frustum.contains_box(b));
        command.instance_count = u32::from(inside);
        visible += command.instance_count;
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_inside_and_outside_boxes() {
        let scene = demo::two_box_scene();
        let mut commands = scene.draw_commands();
        let boxes = scene.world_bounds();
        let frustum = Frustum::from_view_projection(&demo::two_box_view_projection());

        let visible = cull_commands(&mut commands, &boxes, &frustum);

        let counts: Vec<u32> = commands.iter().map(|c| c.instance_count).collect();
        assert_eq!(counts, vec![1, 0]);
        assert_eq!(visible, 1);
        assert_eq!(visible, commands.visible_count());
    }

    #[test]
    fn test_counter_matches_instance_counts_on_demo_scene() {
        let scene = demo::demo_scene();
        let part = scene.partition();
        let boxes = scene.world_bounds();
        let proj = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        let view = Mat4::look_at_rh(demo::CAMERA_POSITION, demo::CAMERA_TARGET, Vec3::Y);
        let frustum = Frustum::from_view_projection(&(proj * view));

        for mut list in [part.opaque, part.transparent] {
            let visible = cull_commands(&mut list, &boxes, &frustum);
            assert_eq!(visible, list.visible_count());
        }
    }

    #[test]
    fn test_missing_box_is_culled() {
        let scene = demo::two_box_scene();
        let mut commands = scene.draw_commands();
        let frustum = Frustum::from_view_projection(&demo::two_box_view_projection());
        assert_eq!(cull_commands(&mut commands, &[], &frustum), 0);
    }
}
