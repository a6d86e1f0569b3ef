//! WGSL sources. Post-processing shaders are prefixed with the shared fullscreen
//! triangle vertex stage.

use kiln_core::MAX_FRAGMENTS_PER_PIXEL;

pub const CULL: &str = include_str!("shaders/cull.wgsl");
pub const MESH: &str = include_str!("shaders/mesh.wgsl");
pub const SHADOW: &str = include_str!("shaders/shadow.wgsl");
pub const SKYBOX: &str = include_str!("shaders/skybox.wgsl");
pub const OIT_CLEAR: &str = include_str!("shaders/oit_clear.wgsl");
pub const ADAPTATION: &str = include_str!("shaders/adaptation.wgsl");
pub const IRRADIANCE: &str = include_str!("shaders/irradiance.wgsl");

const OIT_RESOLVE: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/oit_resolve.wgsl")
);
pub const BLIT: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/blit.wgsl")
);
pub const BLUR: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/blur.wgsl")
);
pub const SSAO: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/ssao.wgsl")
);
pub const HDR: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/hdr.wgsl")
);
pub const TAA: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/taa.wgsl")
);
pub const FXAA: &str = concat!(
    include_str!("shaders/fullscreen.wgsl"),
    include_str!("shaders/fxaa.wgsl")
);

/// Resolve pass source with the per-pixel walk limit shared with `kiln_core::composite_pixel`
pub fn oit_resolve() -> String {
    format!(
        "const MAX_FRAGMENTS: u32 = {}u;\n{}",
        MAX_FRAGMENTS_PER_PIXEL, OIT_RESOLVE
    )
}

pub fn module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(source)),
    })
}
