//! The immutable scene handed to the renderer

use crate::draw::{pack_base_instance, DrawCommand, DrawPartition, IndirectCommands, MAX_DRAWS, MAX_MATERIALS};
use crate::material::MaterialDescription;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use kiln_core::{BoundingBox, KilnError, Result};

/// Mesh vertex: position, texture coordinate, normal
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

/// A range of the shared vertex/index arrays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInfo {
    pub index_offset: u32,
    pub vertex_offset: u32,
    pub index_count: u32,
    /// Mesh-local bounds
    pub bounds: BoundingBox,
}

/// One entry of the flattened draw list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawData {
    pub mesh_index: u32,
    pub material_index: u32,
    pub transform_index: u32,
}

/// Square RGBA8 (sRGB) layers, all the same size
#[derive(Debug, Clone, Default)]
pub struct TextureTable {
    pub size: u32,
    pub layers: Vec<Vec<u8>>,
}

/// Equirectangular linear-HDR panorama used for the skybox and ambient light
#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl EnvironmentMap {
    /// 1x1 map of a single color
    pub fn uniform(color: [f32; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneSnapshot {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub meshes: Vec<MeshInfo>,
    pub draws: Vec<DrawData>,
    pub transforms: Vec<Mat4>,
    pub materials: Vec<MaterialDescription>,
    pub textures: TextureTable,
    pub environment: EnvironmentMap,
}

impl SceneSnapshot {
    /// Check every cross-reference before anything is uploaded
    pub fn validate(&self) -> Result<()> {
        if self.draws.len() > MAX_DRAWS {
            return Err(KilnError::SceneError(format!(
                "{} draws exceed the limit of {}",
                self.draws.len(),
                MAX_DRAWS
            )));
        }
        if self.materials.len() > MAX_MATERIALS {
            return Err(KilnError::SceneError(format!(
                "{} materials exceed the limit of {}",
                self.materials.len(),
                MAX_MATERIALS
            )));
        }

        for (i, mesh) in self.meshes.iter().enumerate() {
            let end = mesh.index_offset as usize + mesh.index_count as usize;
            if end > self.indices.len() {
                return Err(KilnError::SceneError(format!(
                    "mesh {i} indices {}..{end} out of range ({})",
                    mesh.index_offset,
                    self.indices.len()
                )));
            }
            if mesh.vertex_offset as usize > self.vertices.len() {
                return Err(KilnError::SceneError(format!(
                    "mesh {i} vertex offset {} out of range",
                    mesh.vertex_offset
                )));
            }
        }

        for (i, draw) in self.draws.iter().enumerate() {
            if draw.mesh_index as usize >= self.meshes.len() {
                return Err(KilnError::SceneError(format!(
                    "draw {i} references missing mesh {}",
                    draw.mesh_index
                )));
            }
            if draw.material_index as usize >= self.materials.len() {
                return Err(KilnError::SceneError(format!(
                    "draw {i} references missing material {}",
                    draw.material_index
                )));
            }
            if draw.transform_index as usize >= self.transforms.len() {
                return Err(KilnError::SceneError(format!(
                    "draw {i} references missing transform {}",
                    draw.transform_index
                )));
            }
        }

        let layer_bytes = (self.textures.size as usize).pow(2) * 4;
        for (i, layer) in self.textures.layers.iter().enumerate() {
            if layer.len() != layer_bytes {
                return Err(KilnError::SceneError(format!(
                    "texture layer {i} has {} bytes, expected {layer_bytes}",
                    layer.len()
                )));
            }
        }
        let layer_count = self.textures.layers.len() as u32;
        for (i, material) in self.materials.iter().enumerate() {
            if let Some(bad) = material.texture_slots().find(|&t| t >= layer_count) {
                return Err(KilnError::SceneError(format!(
                    "material {i} references missing texture {bad}"
                )));
            }
        }

        let env = &self.environment;
        if env.width == 0 || env.height == 0 || env.texels.len() != (env.width * env.height) as usize {
            return Err(KilnError::SceneError(format!(
                "environment map {}x{} has {} texels",
                env.width,
                env.height,
                env.texels.len()
            )));
        }
        Ok(())
    }

    /// Global transform of every draw slot
    pub fn draw_transforms(&self) -> Vec<Mat4> {
        self.draws
            .iter()
            .map(|d| self.transforms[d.transform_index as usize])
            .collect()
    }

    /// World-space box of every draw slot
    pub fn world_bounds(&self) -> Vec<BoundingBox> {
        self.draws
            .iter()
            .map(|d| {
                let mesh = &self.meshes[d.mesh_index as usize];
                mesh.bounds.transformed(&self.transforms[d.transform_index as usize])
            })
            .collect()
    }

    /// Union of all draw boxes
    pub fn scene_bounds(&self) -> BoundingBox {
        self.world_bounds()
            .iter()
            .fold(BoundingBox::EMPTY, |acc, b| acc.union(b))
    }

    /// One command per draw, in draw order, all visible
    pub fn draw_commands(&self) -> IndirectCommands {
        let commands = self
            .draws
            .iter()
            .enumerate()
            .map(|(slot, d)| {
                let mesh = &self.meshes[d.mesh_index as usize];
                DrawCommand {
                    index_count: mesh.index_count,
                    instance_count: 1,
                    first_index: mesh.index_offset,
                    base_vertex: mesh.vertex_offset as i32,
                    base_instance: pack_base_instance(d.material_index, slot as u32),
                }
            })
            .collect();
        IndirectCommands::new(commands)
    }

    /// Split the command list by the material transparency flag
    pub fn partition(&self) -> DrawPartition {
        DrawPartition::by_material(&self.draw_commands(), &self.materials)
    }

    pub fn is_textured(&self) -> bool {
        !self.textures.layers.is_empty()
    }
}

impl Default for SceneSnapshot {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            meshes: Vec::new(),
            draws: Vec::new(),
            transforms: Vec::new(),
            materials: Vec::new(),
            textures: TextureTable::default(),
            environment: EnvironmentMap::uniform([0.0, 0.0, 0.0, 1.0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::material::INVALID_TEXTURE;
    use glam::Vec3;

    fn single_box_scene(translation: Vec3) -> SceneSnapshot {
        let mut scene = SceneSnapshot::default();
        let mesh = crate::primitives::append_box(&mut scene, Vec3::ONE);
        scene.materials.push(MaterialDescription::opaque([1.0; 4]));
        scene.transforms.push(Mat4::from_translation(translation));
        scene.draws.push(DrawData {
            mesh_index: mesh,
            material_index: 0,
            transform_index: 0,
        });
        scene
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let scene = single_box_scene(Vec3::new(5.0, 0.0, 0.0));
        let bounds = scene.world_bounds();
        assert_eq!(bounds.len(), 1);
        assert!((bounds[0].center() - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(scene.scene_bounds(), bounds[0]);
    }

    #[test]
    fn test_validate_catches_bad_references() {
        let mut scene = single_box_scene(Vec3::ZERO);
        assert!(scene.validate().is_ok());

        scene.draws[0].material_index = 7;
        assert!(matches!(scene.validate(), Err(KilnError::SceneError(_))));

        scene.draws[0].material_index = 0;
        scene.materials[0].albedo_map = 2;
        assert!(scene.validate().is_err());

        scene.materials[0].albedo_map = INVALID_TEXTURE;
        scene.environment.texels.clear();
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_draw_commands_pack_slot_and_material() {
        let scene = demo::demo_scene();
        let commands = scene.draw_commands();
        assert_eq!(commands.len(), scene.draws.len());
        for (slot, (cmd, draw)) in commands.iter().zip(&scene.draws).enumerate() {
            let (material, s) = crate::unpack_base_instance(cmd.base_instance);
            assert_eq!(material, draw.material_index);
            assert_eq!(s as usize, slot);
            assert_eq!(cmd.instance_count, 1);
        }
    }
}
