//! Screen-space ambient occlusion, optional separable blur, and the combine into the
//! screen color

use crate::bind;
use crate::blit::{BlurChain, BlurPipelines, FullscreenPipeline};
use crate::context::RenderError;
use crate::shaders;
use crate::targets::{FrameTargets, RenderTarget, HDR_FORMAT};
use crate::uniforms::{uniform_buffer, SsaoParams};
use glam::Vec3;
use kiln_core::{CameraSettings, SsaoSettings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

pub const SSAO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const NOISE_SIZE: u32 = 4;

/// Tileable texture of random unit vectors used as per-pixel reflection planes,
/// encoded into [0, 255]. Fixed seed so every run looks the same.
pub fn rotation_noise(seed: u64) -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let encode = |x: f32| ((x * 0.5 + 0.5) * 255.0).round() as u8;
    (0..NOISE_SIZE * NOISE_SIZE)
        .map(|_| {
            let v = loop {
                let candidate = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                let length = candidate.length();
                if length > 0.1 && length <= 1.0 {
                    break candidate / length;
                }
            };
            [encode(v.x), encode(v.y), encode(v.z), 255]
        })
        .collect()
}

pub fn ssao_params(settings: &SsaoSettings, camera: &CameraSettings) -> SsaoParams {
    SsaoParams {
        scale: settings.scale,
        bias: settings.bias,
        z_near: camera.z_near,
        z_far: camera.z_far,
        radius: settings.radius,
        attenuation_scale: settings.attenuation_scale,
        distance_scale: settings.distance_scale,
        _pad: 0.0,
    }
}

pub struct SsaoPass {
    pub occlusion: RenderTarget,
    blur_target: RenderTarget,
    params: wgpu::Buffer,
    rotation_view: wgpu::TextureView,
    rotation_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    ssao: FullscreenPipeline,
    combine: FullscreenPipeline,
    blur: BlurPipelines,
    blur_chain: BlurChain,
    ssao_group: wgpu::BindGroup,
    combine_group: wgpu::BindGroup,
}

impl SsaoPass {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        targets: &FrameTargets,
        size: u32,
    ) -> Result<Self, RenderError> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let occlusion = RenderTarget::new(device, "SSAO", size, size, SSAO_FORMAT, usage);
        let blur_target = RenderTarget::new(device, "SSAO Blur", size, size, SSAO_FORMAT, usage);

        let noise = rotation_noise(0x55A0);
        let rotation = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("SSAO Rotation Noise"),
                size: wgpu::Extent3d {
                    width: NOISE_SIZE,
                    height: NOISE_SIZE,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&noise),
        );
        let rotation_view = rotation.create_view(&wgpu::TextureViewDescriptor::default());
        let rotation_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SSAO Rotation Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            ..Default::default()
        });
        let linear_sampler = bind::linear_sampler(device, "SSAO Linear Sampler");
        let params = uniform_buffer::<SsaoParams>(device, "SSAO Params");

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let module = shaders::module(device, "SSAO Shader", shaders::SSAO);
        let ssao = FullscreenPipeline::new(
            device,
            "SSAO",
            &module,
            "fs_ssao",
            &[
                bind::depth_2d(0, fragment),
                bind::texture_2d(1, fragment),
                bind::sampler(2, fragment, wgpu::SamplerBindingType::Filtering),
                bind::uniform(3, fragment),
            ],
            SSAO_FORMAT,
        )?;
        let combine = FullscreenPipeline::new(
            device,
            "SSAO Combine",
            &module,
            "fs_combine",
            &[
                bind::uniform(3, fragment),
                bind::texture_2d(4, fragment),
                bind::texture_2d(5, fragment),
                bind::sampler(6, fragment, wgpu::SamplerBindingType::Filtering),
            ],
            HDR_FORMAT,
        )?;
        let blur = BlurPipelines::new(device, "SSAO", SSAO_FORMAT)?;
        let blur_chain = BlurChain::new(device, &blur, &occlusion, &blur_target, &linear_sampler);

        let ssao_group = Self::ssao_group(
            device,
            &ssao,
            targets,
            &rotation_view,
            &rotation_sampler,
            &params,
        );
        let combine_group = Self::combine_group(
            device,
            &combine,
            targets,
            &occlusion,
            &linear_sampler,
            &params,
        );

        Ok(Self {
            occlusion,
            blur_target,
            params,
            rotation_view,
            rotation_sampler,
            linear_sampler,
            ssao,
            combine,
            blur,
            blur_chain,
            ssao_group,
            combine_group,
        })
    }

    fn ssao_group(
        device: &wgpu::Device,
        pipeline: &FullscreenPipeline,
        targets: &FrameTargets,
        rotation: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.depth.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(rotation),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
            ],
        )
    }

    fn combine_group(
        device: &wgpu::Device,
        pipeline: &FullscreenPipeline,
        targets: &FrameTargets,
        occlusion: &RenderTarget,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&targets.opaque_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&occlusion.view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        )
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, targets: &FrameTargets) {
        self.ssao_group = Self::ssao_group(
            device,
            &self.ssao,
            targets,
            &self.rotation_view,
            &self.rotation_sampler,
            &self.params,
        );
        self.combine_group = Self::combine_group(
            device,
            &self.combine,
            targets,
            &self.occlusion,
            &self.linear_sampler,
            &self.params,
        );
    }

    pub fn prepare(&self, queue: &wgpu::Queue, settings: &SsaoSettings, camera: &CameraSettings) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&ssao_params(settings, camera)));
    }

    /// Occlusion from depth, optional blur, then `screen_color = opaque_color * ao`
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets, blur: bool) {
        self.ssao.draw(encoder, &self.occlusion.view, &self.ssao_group);
        if blur {
            self.blur_chain
                .record(encoder, &self.blur, &self.occlusion, &self.blur_target);
        }
        self.combine
            .draw(encoder, &targets.screen_color.view, &self.combine_group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_deterministic() {
        assert_eq!(rotation_noise(7), rotation_noise(7));
        assert_ne!(rotation_noise(7), rotation_noise(8));
    }

    #[test]
    fn test_noise_decodes_to_unit_vectors() {
        for texel in rotation_noise(1) {
            let decode = |b: u8| b as f32 / 255.0 * 2.0 - 1.0;
            let v = Vec3::new(decode(texel[0]), decode(texel[1]), decode(texel[2]));
            assert!((v.length() - 1.0).abs() < 0.02, "length {}", v.length());
            assert_eq!(texel[3], 255);
        }
    }

    #[test]
    fn test_params_follow_settings() {
        let settings = SsaoSettings::default();
        let camera = CameraSettings::default();
        let p = ssao_params(&settings, &camera);
        assert_eq!(p.scale, settings.scale);
        assert_eq!(p.radius, settings.radius);
        assert_eq!(p.z_near, camera.z_near);
        assert_eq!(p.z_far, camera.z_far);
    }
}
