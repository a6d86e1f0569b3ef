//! Kiln Render - wgpu frame pipeline
//!
//! One frame is GPU frustum culling into persistent indirect buffers, a directional
//! shadow map, opaque geometry plus per-pixel linked-list transparency, SSAO, HDR
//! tone mapping with bloom and light adaptation, and TAA or FXAA. `FrameOrchestrator`
//! owns the passes and threads the temporal state (jitter, TAA history, adapted
//! luminance) from one frame to the next.

mod bind;
pub mod blit;
mod camera;
mod context;
pub mod culling;
pub mod fence;
pub mod frame;
pub mod geometry;
pub mod gpu_scene;
pub mod hdr;
mod headless;
pub mod indirect;
pub mod irradiance;
pub mod oit;
mod orchestrator;
mod readback;
pub mod shaders;
pub mod shadow;
pub mod ssao;
mod stats;
pub mod taa;
pub mod targets;
#[cfg(test)]
mod testing;
pub mod uniforms;

pub use camera::{Camera, FirstPersonController, FreeMovingController, Movement};
pub use context::{create_device, optional_features, required_features, RenderError};
pub use fence::{FenceStatus, FenceToken};
pub use frame::{FramePlan, FrameStage, PassNode, TemporalState};
pub use headless::HeadlessContext;
pub use orchestrator::{projection_matrix, FrameOrchestrator};
pub use stats::{DebugTargets, FpsCounter, FrameStats};
pub use targets::{FrameTargets, RenderTarget, DEPTH_FORMAT, HDR_FORMAT};

#[cfg(test)]
mod tests {
    fn parses(name: &str, source: &str) {
        if let Err(e) = naga::front::wgsl::parse_str(source) {
            panic!("{} failed to parse: {}", name, e.emit_to_string(source));
        }
    }

    #[test]
    fn cull_shader_wgsl_parses() {
        parses("cull.wgsl", crate::shaders::CULL);
    }

    #[test]
    fn mesh_shader_wgsl_parses() {
        parses("mesh.wgsl", crate::shaders::MESH);
    }

    #[test]
    fn shadow_shader_wgsl_parses() {
        parses("shadow.wgsl", crate::shaders::SHADOW);
    }

    #[test]
    fn skybox_shader_wgsl_parses() {
        parses("skybox.wgsl", crate::shaders::SKYBOX);
    }

    #[test]
    fn oit_shaders_wgsl_parse() {
        parses("oit_clear.wgsl", crate::shaders::OIT_CLEAR);
        parses("oit_resolve.wgsl", &crate::shaders::oit_resolve());
    }

    #[test]
    fn oit_resolve_walk_limit_matches_core() {
        let expected = format!("const MAX_FRAGMENTS: u32 = {}u;", kiln_core::MAX_FRAGMENTS_PER_PIXEL);
        assert!(crate::shaders::oit_resolve().starts_with(&expected));
    }

    #[test]
    fn irradiance_shader_wgsl_parses() {
        parses("irradiance.wgsl", crate::shaders::IRRADIANCE);
    }

    #[test]
    fn blit_and_blur_shaders_wgsl_parse() {
        parses("blit.wgsl", crate::shaders::BLIT);
        parses("blur.wgsl", crate::shaders::BLUR);
    }

    #[test]
    fn ssao_shader_wgsl_parses() {
        parses("ssao.wgsl", crate::shaders::SSAO);
    }

    #[test]
    fn hdr_shaders_wgsl_parse() {
        parses("hdr.wgsl", crate::shaders::HDR);
        parses("adaptation.wgsl", crate::shaders::ADAPTATION);
    }

    #[test]
    fn anti_aliasing_shaders_wgsl_parse() {
        parses("taa.wgsl", crate::shaders::TAA);
        parses("fxaa.wgsl", crate::shaders::FXAA);
    }
}
