//! Anti-aliasing stage: TAA resolve with history, or single-pass FXAA

use crate::bind;
use crate::blit::FullscreenPipeline;
use crate::context::RenderError;
use crate::shaders;
use crate::targets::{copy_target, FrameTargets, HDR_FORMAT};
use crate::uniforms::{uniform_buffer, FxaaParams, TaaParams};
use kiln_core::{CameraSettings, FxaaSettings, TaaSettings};

const FRAGMENT: wgpu::ShaderStages = wgpu::ShaderStages::FRAGMENT;

/// Relative linear depth change treated as a disocclusion
pub const DEPTH_REJECTION: f32 = 0.1;
pub const FXAA_SUBPIXEL_BLENDING: f32 = 0.75;

pub fn taa_params(settings: &TaaSettings, camera: &CameraSettings) -> TaaParams {
    TaaParams {
        source_weight: settings.source_weight,
        clamp_mode: settings.clamp_mode.as_u32(),
        luminance_weighting: settings.luminance_weighting as u32,
        depth_rejection: DEPTH_REJECTION,
        z_near: camera.z_near,
        z_far: camera.z_far,
        _pad: [0.0; 2],
    }
}

pub fn fxaa_params(settings: &FxaaSettings) -> FxaaParams {
    FxaaParams {
        threshold: settings.threshold,
        relative_threshold: settings.relative_threshold,
        subpixel_blending: FXAA_SUBPIXEL_BLENDING,
        _pad: 0.0,
    }
}

/// How the TAA output of a frame is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaaResolve {
    /// No usable history: output is the jittered color, history is seeded from it
    Seed,
    Blend,
}

impl TaaResolve {
    pub fn for_history(history_valid: bool) -> Self {
        if history_valid {
            TaaResolve::Blend
        } else {
            TaaResolve::Seed
        }
    }
}

pub struct TaaPass {
    pipeline: FullscreenPipeline,
    params: wgpu::Buffer,
    sampler: wgpu::Sampler,
    group: wgpu::BindGroup,
}

impl TaaPass {
    pub fn new(device: &wgpu::Device, targets: &FrameTargets) -> Result<Self, RenderError> {
        let module = shaders::module(device, "TAA Shader", shaders::TAA);
        let pipeline = FullscreenPipeline::new(
            device,
            "TAA Resolve",
            &module,
            "fs_taa",
            &[
                bind::texture_2d(0, FRAGMENT),
                bind::texture_2d(1, FRAGMENT),
                bind::texture_2d(2, FRAGMENT),
                bind::depth_2d(3, FRAGMENT),
                bind::depth_2d(4, FRAGMENT),
                bind::sampler(5, FRAGMENT, wgpu::SamplerBindingType::Filtering),
                bind::uniform(6, FRAGMENT),
            ],
            HDR_FORMAT,
        )?;
        let params = uniform_buffer::<TaaParams>(device, "TAA Params");
        let sampler = bind::linear_sampler(device, "TAA Sampler");
        let group = Self::group(device, &pipeline, targets, &sampler, &params);
        Ok(Self {
            pipeline,
            params,
            sampler,
            group,
        })
    }

    fn group(
        device: &wgpu::Device,
        pipeline: &FullscreenPipeline,
        targets: &FrameTargets,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        pipeline.bind_group(
            device,
            &[
                bind::view_entry(0, &targets.hdr_output.view),
                bind::view_entry(1, &targets.history_color.view),
                bind::view_entry(2, &targets.velocity.view),
                bind::view_entry(3, &targets.depth.view),
                bind::view_entry(4, &targets.history_depth.view),
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: params.as_entire_binding(),
                },
            ],
        )
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, targets: &FrameTargets) {
        self.group = Self::group(device, &self.pipeline, targets, &self.sampler, &self.params);
    }

    pub fn prepare(&self, queue: &wgpu::Queue, settings: &TaaSettings, camera: &CameraSettings) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&taa_params(settings, camera)));
    }

    /// Resolve `hdr_output` into `aa_output`, then store this frame as history
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets, resolve: TaaResolve) {
        match resolve {
            TaaResolve::Seed => copy_target(encoder, &targets.hdr_output, &targets.aa_output),
            TaaResolve::Blend => self.pipeline.draw(encoder, &targets.aa_output.view, &self.group),
        }
        copy_target(encoder, &targets.aa_output, &targets.history_color);
        copy_target(encoder, &targets.depth, &targets.history_depth);
    }
}

pub struct FxaaPass {
    pipeline: FullscreenPipeline,
    params: wgpu::Buffer,
    sampler: wgpu::Sampler,
    group: wgpu::BindGroup,
}

impl FxaaPass {
    pub fn new(device: &wgpu::Device, targets: &FrameTargets) -> Result<Self, RenderError> {
        let module = shaders::module(device, "FXAA Shader", shaders::FXAA);
        let pipeline = FullscreenPipeline::new(
            device,
            "FXAA",
            &module,
            "fs_fxaa",
            &[
                bind::texture_2d(0, FRAGMENT),
                bind::sampler(1, FRAGMENT, wgpu::SamplerBindingType::Filtering),
                bind::uniform(2, FRAGMENT),
            ],
            HDR_FORMAT,
        )?;
        let params = uniform_buffer::<FxaaParams>(device, "FXAA Params");
        let sampler = bind::linear_sampler(device, "FXAA Sampler");
        let group = Self::group(device, &pipeline, targets, &sampler, &params);
        Ok(Self {
            pipeline,
            params,
            sampler,
            group,
        })
    }

    fn group(
        device: &wgpu::Device,
        pipeline: &FullscreenPipeline,
        targets: &FrameTargets,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.hdr_output.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        )
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, targets: &FrameTargets) {
        self.group = Self::group(device, &self.pipeline, targets, &self.sampler, &self.params);
    }

    pub fn prepare(&self, queue: &wgpu::Queue, settings: &FxaaSettings) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&fxaa_params(settings)));
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets) {
        self.pipeline
            .draw(encoder, &targets.aa_output.view, &self.group);
    }
}
