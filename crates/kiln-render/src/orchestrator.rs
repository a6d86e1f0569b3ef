//! Frame orchestrator: owns every pass and the temporal state, records one frame per tick
//!
//! Two submissions per frame. The culling compute goes first, followed by a fence token;
//! everything else follows in one command buffer. The token is waited on just before
//! telemetry is produced, so CPU work between the two overlaps the culling dispatch.

use crate::blit::PresentPass;
use crate::camera::Camera;
use crate::context::RenderError;
use crate::culling::{CullingPass, OPAQUE_COUNTER, TRANSPARENT_COUNTER};
use crate::fence;
use crate::frame::{FramePlan, PassNode, TemporalState};
use crate::geometry::{GeometryOptions, GeometryPass};
use crate::gpu_scene::GpuScene;
use crate::hdr::HdrPass;
use crate::oit::OitPass;
use crate::shadow::{LightMatrices, ShadowPass};
use crate::ssao::SsaoPass;
use crate::stats::{DebugTargets, FpsCounter, FrameStats};
use crate::taa::{FxaaPass, TaaPass};
use crate::targets::{copy_target, FrameTargets};
use crate::uniforms::{
    FrameBindings, FrameSlot, FrameUniforms, LightingUniforms, PrevFrameUniforms, SkyUniforms,
};
use glam::{Mat4, Vec2, Vec3};
use kiln_core::{
    dropped_fragments, AntiAliasing, CameraSettings, FrameConfig, Frustum, RendererSettings,
};
use kiln_scene::SceneSnapshot;

/// Perspective projection with wgpu's [0, 1] depth range
pub fn projection_matrix(camera: &CameraSettings, aspect_ratio: f32) -> Mat4 {
    Mat4::perspective_rh(
        camera.fov_degrees.to_radians(),
        aspect_ratio,
        camera.z_near,
        camera.z_far,
    )
}

/// Matrices and vectors shared by every uniform slot of one frame
struct FrameView {
    view: Mat4,
    proj: Mat4,
    camera_pos: Vec3,
    jitter: Vec2,
    light: LightMatrices,
    shadow_matrix: Mat4,
}

pub struct FrameOrchestrator {
    settings: RendererSettings,
    multi_draw: bool,
    frame: FrameBindings,
    scene: GpuScene,
    targets: FrameTargets,
    culling: CullingPass,
    shadow: ShadowPass,
    oit: OitPass,
    geometry: GeometryPass,
    ssao: SsaoPass,
    hdr: HdrPass,
    taa: TaaPass,
    fxaa: FxaaPass,
    present: PresentPass,
    temporal: TemporalState,
    fps: FpsCounter,
    /// Whether the indirect buffers currently hold culling results
    culled: bool,
}

impl FrameOrchestrator {
    /// Build every pipeline and target. Any shader or pipeline error is fatal.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        snapshot: &SceneSnapshot,
        settings: &RendererSettings,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        settings.validate()?;
        let multi_draw = device
            .features()
            .contains(wgpu::Features::MULTI_DRAW_INDIRECT);

        let frame = FrameBindings::new(device);
        let scene = GpuScene::upload(device, queue, snapshot)?;
        let targets = FrameTargets::new(device, settings.width, settings.height);

        let culling = CullingPass::new(device, &frame, &scene)?;
        let shadow = ShadowPass::new(device, &frame, &scene, settings.shadow_map_size)?;
        let oit = OitPass::new(device, &targets, settings.oit_max_fragments)?;
        let geometry = GeometryPass::new(device, &frame, &scene, &shadow, &oit, &targets)?;
        let ssao = SsaoPass::new(device, queue, &targets, settings.ssao_size)?;
        let hdr = HdrPass::new(device, queue, &targets, settings)?;
        let taa = TaaPass::new(device, &targets)?;
        let fxaa = FxaaPass::new(device, &targets)?;
        let present = PresentPass::new(device, surface_format, &targets.aa_output)?;

        log::info!(
            "Frame orchestrator ready: {}x{}, {} draws, multi-draw {}",
            targets.width,
            targets.height,
            scene.draw_count(),
            if multi_draw { "on" } else { "off" }
        );

        Ok(Self {
            settings: settings.clone(),
            multi_draw,
            frame,
            scene,
            targets,
            culling,
            shadow,
            oit,
            geometry,
            ssao,
            hdr,
            taa,
            fxaa,
            present,
            temporal: TemporalState::new(FrameConfig::default().taa.jitter_sequence_length),
            fps: FpsCounter::default(),
            culled: false,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.targets.width, self.targets.height)
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn scene(&self) -> &GpuScene {
        &self.scene
    }

    pub fn temporal(&self) -> &TemporalState {
        &self.temporal
    }

    /// Recreate every resolution-dependent target as one unit and drop TAA history
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == self.size() {
            return;
        }
        self.targets = FrameTargets::new(device, width, height);
        self.oit.rebuild_targets(device, &self.targets);
        self.geometry.rebuild_targets(device, &self.oit, &self.targets);
        self.ssao.rebuild_targets(device, &self.targets);
        self.hdr.rebuild_targets(device, &self.targets);
        self.taa.rebuild_targets(device, &self.targets);
        self.fxaa.rebuild_targets(device, &self.targets);
        self.present.rebuild_targets(device, &self.targets.aa_output);
        self.temporal.invalidate_history();
        self.settings.width = width;
        self.settings.height = height;
        log::info!("Resized frame targets to {}x{}", width, height);
    }

    pub fn debug_targets(&self) -> DebugTargets<'_> {
        DebugTargets {
            ssao: &self.ssao.occlusion,
            velocity: &self.targets.velocity,
            hdr_output: &self.targets.hdr_output,
            anti_aliased: &self.targets.aa_output,
            shadow_map: &self.shadow.map,
            luminance: self.hdr.luminance(),
            bloom: self.hdr.bloom(),
        }
    }

    /// Record and submit one frame into `target`
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        camera: &Camera,
        config: &FrameConfig,
        delta_seconds: f32,
    ) -> FrameStats {
        let plan = FramePlan::build(config, &self.temporal);
        let view = self.update_camera(queue, camera, config, &plan);

        // Culling goes in its own submission so it can be fenced
        let cull_token = self.cull(device, queue, config, &view);

        self.write_pass_uniforms(queue, config, &view);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        let mut counted_oit = false;
        for node in &plan.nodes {
            match *node {
                PassNode::ClearTargets { oit } => {
                    if oit {
                        self.oit.clear(&mut encoder, &self.targets);
                    }
                }
                PassNode::Shadow => {
                    self.shadow
                        .record(&mut encoder, &self.frame, &self.scene, self.multi_draw);
                }
                PassNode::Geometry {
                    opaque,
                    transparent,
                } => {
                    let options = GeometryOptions {
                        opaque,
                        transparent,
                        jitter: plan.anti_aliasing == AntiAliasing::Taa,
                        multi_draw: self.multi_draw,
                    };
                    self.geometry
                        .record(&mut encoder, &self.frame, &self.scene, &self.targets, options);
                }
                PassNode::Ssao { blur } => self.ssao.record(&mut encoder, &self.targets, blur),
                PassNode::CopyOpaque => {
                    copy_target(&mut encoder, &self.targets.opaque_color, &self.targets.screen_color)
                }
                PassNode::OitResolve => {
                    self.oit.resolve(&mut encoder, &self.targets);
                    if config.oit.count_overflow {
                        self.oit.record_counter_copy(&mut encoder);
                        counted_oit = true;
                    }
                }
                PassNode::ToneMap => self.hdr.record(&mut encoder, &self.targets),
                PassNode::CopyHdr => {
                    copy_target(&mut encoder, &self.targets.screen_color, &self.targets.hdr_output)
                }
                PassNode::Taa(resolve) => self.taa.record(&mut encoder, &self.targets, resolve),
                PassNode::Fxaa => self.fxaa.record(&mut encoder, &self.targets),
                PassNode::CopyAntiAlias => {
                    copy_target(&mut encoder, &self.targets.hdr_output, &self.targets.aa_output)
                }
                PassNode::Present => self.present.record(&mut encoder, target),
                // Handled outside the encoder
                PassNode::UpdateCamera { .. }
                | PassNode::ComputeLightMatrices { .. }
                | PassNode::Cull { .. }
                | PassNode::FenceWait
                | PassNode::SwapTemporal { .. } => {}
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
        if counted_oit {
            self.oit.submitted();
        }

        fence::wait_until_ready(device, &cull_token);
        let visible = self.culling.visible_counts();

        if plan.swaps_luminance() {
            self.hdr.commit_adaptation();
        }
        self.temporal.commit(view.view, view.proj, plan.anti_aliasing);
        self.fps.tick(delta_seconds);

        let mut stats = FrameStats {
            frame_index: self.temporal.frame_index() - 1,
            delta_seconds,
            fps: self.fps.fps(),
            visible_opaque: visible[OPAQUE_COUNTER as usize],
            visible_transparent: visible[TRANSPARENT_COUNTER as usize],
            ..Default::default()
        };
        if !config.culling.enabled {
            stats.visible_opaque = self.scene.opaque.len();
            stats.visible_transparent = self.scene.transparent.len();
        }
        if config.oit.count_overflow {
            stats.oit_fragments = self.oit.appended();
            stats.oit_dropped = dropped_fragments(stats.oit_fragments, self.oit.capacity);
            if stats.oit_dropped > 0 {
                log::warn!(
                    "OIT list full: {} of {} fragments dropped",
                    stats.oit_dropped,
                    stats.oit_fragments
                );
            }
        }
        stats
    }

    /// Camera matrices, jitter, previous-frame block and light setup
    fn update_camera(
        &mut self,
        queue: &wgpu::Queue,
        camera: &Camera,
        config: &FrameConfig,
        plan: &FramePlan,
    ) -> FrameView {
        let (width, height) = self.size();
        let view = camera.view_matrix();
        let proj = projection_matrix(&config.camera, self.targets.aspect_ratio());
        let jitter = self.temporal.next_jitter(
            config.taa.jitter_sequence_length,
            width,
            height,
            plan.anti_aliasing == AntiAliasing::Taa,
        );

        let (prev_view, prev_proj) = self.temporal.previous(view, proj);
        self.frame
            .write_prev(queue, &PrevFrameUniforms::new(prev_view, prev_proj, width, height));

        let light = LightMatrices::compute(
            config.shadows.light_theta,
            config.shadows.clamped_phi(),
            &self.scene.scene_bounds,
        );
        self.frame
            .write_lighting(queue, &LightingUniforms::new(light.direction));
        self.geometry.write_sky(queue, &SkyUniforms::new(view, proj));

        FrameView {
            view,
            proj,
            camera_pos: camera.position(),
            jitter,
            shadow_matrix: light.shadow_matrix(config.shadows.enabled),
            light,
        }
    }

    /// Write the cull slots, record both dispatches, submit and fence them
    fn cull(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &FrameConfig,
        view: &FrameView,
    ) -> fence::FenceToken {
        let culling_view = self
            .culling
            .culling_view(view.view, config.culling.freeze_view);
        let frustum = Frustum::from_view_projection(&(view.proj * culling_view));

        let counts = if config.culling.enabled {
            [self.scene.opaque.len(), self.scene.transparent.len()]
        } else {
            if self.culled {
                self.scene.opaque.restore(queue);
                self.scene.transparent.restore(queue);
                log::debug!("Culling disabled, restored indirect commands");
            }
            [0, 0]
        };
        self.culled = config.culling.enabled;

        let slots = [
            (FrameSlot::CullOpaque, OPAQUE_COUNTER, counts[0]),
            (FrameSlot::CullTransparent, TRANSPARENT_COUNTER, counts[1]),
        ];
        for (slot, counter, count) in slots {
            let uniforms = FrameUniforms::new(culling_view, view.proj, view.shadow_matrix, view.camera_pos)
                .with_frustum(&frustum)
                .with_cull(count, counter);
            self.frame.write_frame(queue, slot, &uniforms);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cull Encoder"),
        });
        self.culling.record(&mut encoder, &self.frame, counts);
        queue.submit(std::iter::once(encoder.finish()));
        self.culling.submitted();
        fence::submit(queue)
    }

    fn write_pass_uniforms(&self, queue: &wgpu::Queue, config: &FrameConfig, view: &FrameView) {
        let shadow = FrameUniforms::new(view.light.view, view.light.proj, Mat4::ZERO, view.camera_pos);
        self.frame.write_frame(queue, FrameSlot::Shadow, &shadow);

        let main_frustum = Frustum::from_view_projection(&(view.proj * view.view));
        let main = FrameUniforms::new(view.view, view.proj, view.shadow_matrix, view.camera_pos)
            .with_frustum(&main_frustum)
            .with_jitter(view.jitter);
        self.frame.write_frame(queue, FrameSlot::Main, &main);

        self.ssao.prepare(queue, &config.ssao, &config.camera);
        self.hdr.prepare(queue, &config.hdr);
        self.taa.prepare(queue, &config.taa, &config.camera);
        self.fxaa.prepare(queue, &config.fxaa);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FirstPersonController;
    use crate::headless::HeadlessContext;
    use crate::testing;
    use kiln_scene::demo;

    const SIZE: u32 = 16;

    fn small_settings() -> RendererSettings {
        RendererSettings {
            width: SIZE,
            height: SIZE,
            shadow_map_size: 64,
            ssao_size: SIZE,
            bloom_size: SIZE,
            luminance_size: SIZE,
            oit_max_fragments: 4096,
        }
    }

    /// Camera at the origin looking down -Z
    fn origin_camera() -> Camera {
        Camera::FirstPerson(FirstPersonController::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y))
    }

    fn orchestrator(scene: &SceneSnapshot) -> Option<(HeadlessContext, FrameOrchestrator)> {
        let ctx = testing::context(SIZE, SIZE)?;
        let orchestrator =
            FrameOrchestrator::new(&ctx.device, &ctx.queue, scene, &small_settings(), ctx.format)
                .expect("orchestrator");
        Some((ctx, orchestrator))
    }

    fn render(
        ctx: &HeadlessContext,
        orchestrator: &mut FrameOrchestrator,
        config: &FrameConfig,
    ) -> FrameStats {
        orchestrator.render(
            &ctx.device,
            &ctx.queue,
            &ctx.color_view,
            &origin_camera(),
            config,
            1.0 / 60.0,
        )
    }

    #[test]
    fn test_projection_uses_zero_to_one_depth() {
        let camera = CameraSettings::default();
        let proj = projection_matrix(&camera, 16.0 / 9.0);
        let near = proj.project_point3(Vec3::new(0.0, 0.0, -camera.z_near));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, -camera.z_far));
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_projection_aspect() {
        let proj = projection_matrix(&CameraSettings::default(), 2.0);
        assert!((proj.y_axis.y / proj.x_axis.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_first_taa_frame_is_the_jittered_color() {
        let Some((ctx, mut orchestrator)) = orchestrator(&demo::demo_scene()) else {
            return;
        };
        let config = FrameConfig::default();
        assert_eq!(config.anti_aliasing(), AntiAliasing::Taa);
        render(&ctx, &mut orchestrator, &config);

        let targets = &orchestrator.targets;
        let jittered = testing::read_bytes(&ctx, &targets.hdr_output.texture);
        assert!(jittered.iter().any(|&b| b != 0));
        assert_eq!(testing::read_bytes(&ctx, &targets.aa_output.texture), jittered);
    }

    #[test]
    fn test_hdr_off_copies_scene_color() {
        let Some((ctx, mut orchestrator)) = orchestrator(&demo::demo_scene()) else {
            return;
        };
        let mut config = FrameConfig::default();
        config.hdr.enabled = false;
        config.taa.enabled = false;
        render(&ctx, &mut orchestrator, &config);

        let targets = &orchestrator.targets;
        let scene_color = testing::read_bytes(&ctx, &targets.screen_color.texture);
        assert!(scene_color.iter().any(|&b| b != 0));
        assert_eq!(testing::read_bytes(&ctx, &targets.hdr_output.texture), scene_color);
    }

    #[test]
    fn test_box_behind_camera_issues_no_draw() {
        let Some((ctx, mut orchestrator)) = orchestrator(&demo::two_box_scene()) else {
            return;
        };
        render(&ctx, &mut orchestrator, &FrameConfig::default());

        // Five words per command; instance count is the second
        let commands = testing::read_u32(&ctx, &orchestrator.scene.opaque.buffer);
        assert_eq!(commands.len(), 10);
        assert_eq!(commands[1], 1, "box ahead of the camera was culled");
        assert_eq!(commands[5 + 1], 0, "box behind the camera still draws");
    }

    #[test]
    fn test_velocity_written_only_under_taa() {
        let Some((ctx, mut orchestrator)) = orchestrator(&demo::demo_scene()) else {
            return;
        };
        let marker = wgpu::Color {
            r: 0.25,
            g: -0.5,
            b: 0.0,
            a: 0.0,
        };
        testing::fill(&ctx, &orchestrator.targets.velocity.view, marker);
        let before = testing::read_bytes(&ctx, &orchestrator.targets.velocity.texture);

        let mut config = FrameConfig::default();
        config.taa.enabled = false;
        config.fxaa.enabled = true;
        render(&ctx, &mut orchestrator, &config);
        let velocity = &orchestrator.targets.velocity.texture;
        assert_eq!(testing::read_bytes(&ctx, velocity), before);

        config.taa.enabled = true;
        render(&ctx, &mut orchestrator, &config);
        let velocity = &orchestrator.targets.velocity.texture;
        assert_ne!(testing::read_bytes(&ctx, velocity), before);
    }
}
