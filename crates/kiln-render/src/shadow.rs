//! Directional light matrices and the depth-only shadow pass

use crate::context::{validated, RenderError};
use crate::gpu_scene::{vertex_layout, GpuScene};
use crate::shaders;
use crate::targets::{RenderTarget, DEPTH_FORMAT};
use crate::uniforms::{FrameBindings, FrameSlot};
use glam::{Mat4, Vec3};
use kiln_core::BoundingBox;

/// View and projection of the directional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightMatrices {
    /// Direction the light travels
    pub direction: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
}

impl LightMatrices {
    /// Light from `theta` (about Z) and `phi` (about X) in degrees, with an orthographic
    /// box fitted tightly around `scene_bounds` in light space
    pub fn compute(theta_degrees: f32, phi_degrees: f32, scene_bounds: &BoundingBox) -> Self {
        let direction = light_direction(theta_degrees, phi_degrees);
        let view = Mat4::look_at_rh(Vec3::ZERO, direction, Vec3::Z);

        let light_box = if scene_bounds.is_empty() {
            BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0))
        } else {
            scene_bounds.transformed(&view)
        };
        // Padding keeps a flat scene from collapsing the depth range
        let (min, max) = (light_box.min - Vec3::splat(0.01), light_box.max + Vec3::splat(0.01));
        let proj = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z);

        Self {
            direction,
            view,
            proj,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// Matrix handed to the geometry pass: the light's view-projection, or all zeros
    /// when shadows are off so every lookup reads as lit
    pub fn shadow_matrix(&self, enabled: bool) -> Mat4 {
        if enabled {
            self.view_proj()
        } else {
            Mat4::ZERO
        }
    }
}

pub fn light_direction(theta_degrees: f32, phi_degrees: f32) -> Vec3 {
    let rotation = Mat4::from_rotation_z(theta_degrees.to_radians())
        * Mat4::from_rotation_x(phi_degrees.to_radians());
    rotation.transform_vector3(Vec3::NEG_Y).normalize()
}

pub struct ShadowPass {
    pub map: RenderTarget,
    pub comparison_sampler: wgpu::Sampler,
    pipeline: wgpu::RenderPipeline,
}

impl ShadowPass {
    pub fn new(
        device: &wgpu::Device,
        frame: &FrameBindings,
        scene: &GpuScene,
        size: u32,
    ) -> Result<Self, RenderError> {
        let map = RenderTarget::new(
            device,
            "Shadow Map",
            size,
            size,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let pipeline = validated(device, "Shadow Pipeline", || {
            let module = shaders::module(device, "Shadow Shader", shaders::SHADOW);
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shadow Pipeline Layout"),
                bind_group_layouts: &[&frame.layout, &scene.draw_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Shadow Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_shadow"),
                    buffers: &[vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: None,
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState {
                        constant: 2,
                        slope_scale: 2.0,
                        clamp: 0.0,
                    },
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self {
            map,
            comparison_sampler,
            pipeline,
        })
    }

    /// Render every draw (the uncapped list) from the light. The Shadow frame slot must
    /// hold the light's view and projection.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameBindings,
        scene: &GpuScene,
        multi_draw: bool,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.map.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &frame.bind_group, &[frame.offset(FrameSlot::Shadow)]);
        pass.set_bind_group(1, &scene.draw_group, &[]);
        scene.bind_geometry(&mut pass);
        scene.all.draw(&mut pass, multi_draw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_box() -> BoundingBox {
        BoundingBox::new(Vec3::new(-30.0, -1.0, -30.0), Vec3::new(30.0, 8.0, 30.0))
    }

    #[test]
    fn test_default_light_points_down() {
        let d = light_direction(0.0, 0.0);
        assert!((d - Vec3::NEG_Y).length() < 1e-6);
    }

    #[test]
    fn test_phi_tilts_toward_negative_z() {
        let d = light_direction(0.0, 90.0);
        assert!((d - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_scene_fits_light_volume() {
        let bounds = scene_box();
        for (theta, phi) in [(0.0, 0.0), (30.0, 45.0), (-120.0, -60.0), (200.0, 85.0)] {
            let light = LightMatrices::compute(theta, phi, &bounds);
            let vp = light.view_proj();
            for corner in bounds.corners() {
                let p = vp.project_point3(corner);
                assert!(p.x.abs() <= 1.0 + 1e-4, "x {} for {theta}/{phi}", p.x);
                assert!(p.y.abs() <= 1.0 + 1e-4, "y {} for {theta}/{phi}", p.y);
                assert!(p.z >= -1e-4 && p.z <= 1.0 + 1e-4, "z {} for {theta}/{phi}", p.z);
            }
        }
    }

    #[test]
    fn test_disabled_shadows_use_zero_matrix() {
        let light = LightMatrices::compute(10.0, 20.0, &scene_box());
        assert_eq!(light.shadow_matrix(false), Mat4::ZERO);
        assert_eq!(light.shadow_matrix(true), light.view_proj());
    }
}
