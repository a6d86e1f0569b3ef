//! Procedural meshes appended straight into a snapshot's shared buffers

use crate::snapshot::{MeshInfo, SceneSnapshot, Vertex};
use glam::Vec3;
use kiln_core::BoundingBox;

/// Face normal plus two in-plane axes with `u x v == normal`, so the quad
/// `[-u-v, +u-v, +u+v, -u+v]` winds counter-clockwise seen from outside.
const BOX_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

const QUAD_CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Append a box centered at the origin; returns its mesh index
pub fn append_box(scene: &mut SceneSnapshot, size: Vec3) -> u32 {
    let half = size * 0.5;
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in BOX_FACES {
        let base = vertices.len() as u32;
        for (su, sv) in QUAD_CORNERS {
            vertices.push(Vertex {
                position: ((normal + u * su + v * sv) * half).to_array(),
                uv: [su * 0.5 + 0.5, 0.5 - sv * 0.5],
                normal: normal.to_array(),
            });
        }
        indices.extend(QUAD_INDICES.iter().map(|i| base + i));
    }
    append_mesh(scene, vertices, indices)
}

/// Append a horizontal plane facing +Y; UVs tile once per world unit
pub fn append_plane(scene: &mut SceneSnapshot, width: f32, depth: f32) -> u32 {
    let (hw, hd) = (width * 0.5, depth * 0.5);
    let vertices = QUAD_CORNERS
        .iter()
        .map(|&(su, sv)| Vertex {
            position: [su * hw, 0.0, -sv * hd],
            uv: [(su * 0.5 + 0.5) * width, (0.5 - sv * 0.5) * depth],
            normal: [0.0, 1.0, 0.0],
        })
        .collect();
    append_mesh(scene, vertices, QUAD_INDICES.to_vec())
}

/// Append raw geometry with mesh-relative indices; returns the new mesh index
pub fn append_mesh(scene: &mut SceneSnapshot, vertices: Vec<Vertex>, indices: Vec<u32>) -> u32 {
    let info = MeshInfo {
        index_offset: scene.indices.len() as u32,
        vertex_offset: scene.vertices.len() as u32,
        index_count: indices.len() as u32,
        bounds: BoundingBox::from_points(vertices.iter().map(|v| Vec3::from(v.position))),
    };
    scene.vertices.extend(vertices);
    scene.indices.extend(indices);
    scene.meshes.push(info);
    (scene.meshes.len() - 1) as u32
}
