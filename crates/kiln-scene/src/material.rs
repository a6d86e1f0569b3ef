//! GPU material table entries

use bytemuck::{Pod, Zeroable};

/// Texture slot value meaning "no texture"
pub const INVALID_TEXTURE: u32 = u32::MAX;

/// One material, laid out exactly as the `Material` struct in the mesh shaders
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialDescription {
    pub emissive_color: [f32; 4],
    pub albedo_color: [f32; 4],
    /// Roughness in x and y; z and w unused
    pub roughness: [f32; 4],
    pub transparency_factor: f32,
    /// Discard texels whose albedo alpha is below this; 0 disables the test
    pub alpha_test: f32,
    pub metallic_factor: f32,
    pub flags: u32,
    /// Layer in the texture table
    pub albedo_map: u32,
    pub normal_map: u32,
    pub emissive_map: u32,
    pub _pad: u32,
}

impl MaterialDescription {
    pub const FLAG_TRANSPARENT: u32 = 1;

    pub fn opaque(albedo: [f32; 4]) -> Self {
        Self {
            albedo_color: albedo,
            ..Self::default()
        }
    }

    /// A transparent material; the final alpha is `albedo[3] * transparency_factor`
    pub fn transparent(albedo: [f32; 4], transparency_factor: f32) -> Self {
        Self {
            albedo_color: albedo,
            transparency_factor,
            flags: Self::FLAG_TRANSPARENT,
            ..Self::default()
        }
    }

    pub fn with_albedo_map(mut self, layer: u32) -> Self {
        self.albedo_map = layer;
        self
    }

    pub fn with_emissive(mut self, emissive: [f32; 4]) -> Self {
        self.emissive_color = emissive;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.flags & Self::FLAG_TRANSPARENT != 0
    }

    /// Texture layers this material refers to, skipping unset slots
    pub fn texture_slots(&self) -> impl Iterator<Item = u32> {
        [self.albedo_map, self.normal_map, self.emissive_map]
            .into_iter()
            .filter(|&t| t != INVALID_TEXTURE)
    }
}

impl Default for MaterialDescription {
    fn default() -> Self {
        Self {
            emissive_color: [0.0; 4],
            albedo_color: [1.0; 4],
            roughness: [1.0, 1.0, 0.0, 0.0],
            transparency_factor: 1.0,
            alpha_test: 0.0,
            metallic_factor: 0.0,
            flags: 0,
            albedo_map: INVALID_TEXTURE,
            normal_map: INVALID_TEXTURE,
            emissive_map: INVALID_TEXTURE,
            _pad: 0,
        }
    }
}
