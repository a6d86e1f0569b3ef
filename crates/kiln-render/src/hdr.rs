//! HDR stage: luminance measurement, light adaptation, bloom and tone mapping
//!
//! The adapted luminance lives in a ping-pong pair of 1x1 textures. `record` writes the
//! next slot; `commit_adaptation` promotes it once the frame has been submitted.

use crate::bind;
use crate::blit::{source_entries, source_group, BlurChain, BlurPipelines, FullscreenPipeline};
use crate::context::{validated, RenderError};
use crate::shaders;
use crate::targets::{FrameTargets, RenderTarget, HDR_FORMAT};
use crate::uniforms::{uniform_buffer, HdrParams};
use kiln_core::{HdrSettings, PingPong, RendererSettings};

pub const LUMINANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const ADAPTATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Luminance both adaptation slots start from
pub const INITIAL_LUMINANCE: f32 = 50.0;
pub const BLOOM_ITERATIONS: usize = 4;

const FRAGMENT: wgpu::ShaderStages = wgpu::ShaderStages::FRAGMENT;

pub fn hdr_params(settings: &HdrSettings) -> HdrParams {
    HdrParams {
        exposure: settings.exposure,
        max_white: settings.max_white,
        bloom_strength: settings.bloom_strength,
        adaptation_speed: settings.adaptation_speed,
    }
}

/// Bind group index for a frame whose adaptation writes `next`. Group `k` reads slot `1 - k`.
fn adaptation_reads(next: usize) -> usize {
    next ^ 1
}

pub struct HdrPass {
    luminance: RenderTarget,
    luminance_mips: Vec<wgpu::TextureView>,
    adaptation: PingPong<RenderTarget>,
    bloom: [RenderTarget; 2],
    params: wgpu::Buffer,
    linear_sampler: wgpu::Sampler,

    measure: FullscreenPipeline,
    downsample: FullscreenPipeline,
    bright: FullscreenPipeline,
    tonemap: FullscreenPipeline,
    blur: BlurPipelines,
    blur_chain: BlurChain,
    adapt_pipeline: wgpu::ComputePipeline,

    measure_group: wgpu::BindGroup,
    downsample_groups: Vec<wgpu::BindGroup>,
    /// Indexed by the slot being written this frame
    adapt_groups: [wgpu::BindGroup; 2],
    bright_groups: [wgpu::BindGroup; 2],
    tonemap_groups: [wgpu::BindGroup; 2],
}

impl HdrPass {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        targets: &FrameTargets,
        settings: &RendererSettings,
    ) -> Result<Self, RenderError> {
        let ra_tb = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let mip_count = settings.luminance_mip_count();
        let luminance = RenderTarget::with_mips(
            device,
            "Luminance",
            settings.luminance_size,
            settings.luminance_size,
            LUMINANCE_FORMAT,
            ra_tb,
            mip_count,
        );
        let luminance_mips: Vec<_> = (0..mip_count).map(|level| luminance.mip_view(level)).collect();

        let adaptation_usage = wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        let adaptation = PingPong::new(
            RenderTarget::new(device, "Adapted Luminance 0", 1, 1, ADAPTATION_FORMAT, adaptation_usage),
            RenderTarget::new(device, "Adapted Luminance 1", 1, 1, ADAPTATION_FORMAT, adaptation_usage),
        );
        for slot in adaptation.slots() {
            seed_luminance(queue, slot, INITIAL_LUMINANCE);
        }

        let bloom = [
            RenderTarget::new(device, "Bloom 0", settings.bloom_size, settings.bloom_size, HDR_FORMAT, ra_tb),
            RenderTarget::new(device, "Bloom 1", settings.bloom_size, settings.bloom_size, HDR_FORMAT, ra_tb),
        ];
        let params = uniform_buffer::<HdrParams>(device, "HDR Params");
        let linear_sampler = bind::linear_sampler(device, "HDR Linear Sampler");

        let module = shaders::module(device, "HDR Shader", shaders::HDR);
        let measure = FullscreenPipeline::new(
            device,
            "Luminance",
            &module,
            "fs_luminance",
            &source_entries(),
            LUMINANCE_FORMAT,
        )?;
        let blit_module = shaders::module(device, "Blit Shader", shaders::BLIT);
        let downsample = FullscreenPipeline::new(
            device,
            "Luminance Downsample",
            &blit_module,
            "fs_blit",
            &source_entries(),
            LUMINANCE_FORMAT,
        )?;
        let bright = FullscreenPipeline::new(
            device,
            "Bright Pass",
            &module,
            "fs_bright_pass",
            &[
                bind::texture_2d(0, FRAGMENT),
                bind::sampler(1, FRAGMENT, wgpu::SamplerBindingType::Filtering),
                bind::unfilterable_2d(2, FRAGMENT),
            ],
            HDR_FORMAT,
        )?;
        let tonemap = FullscreenPipeline::new(
            device,
            "Tone Map",
            &module,
            "fs_tonemap",
            &[
                bind::texture_2d(0, FRAGMENT),
                bind::sampler(1, FRAGMENT, wgpu::SamplerBindingType::Filtering),
                bind::unfilterable_2d(2, FRAGMENT),
                bind::texture_2d(3, FRAGMENT),
                bind::uniform(4, FRAGMENT),
            ],
            HDR_FORMAT,
        )?;
        let blur = BlurPipelines::new(device, "Bloom", HDR_FORMAT)?;
        let blur_chain = BlurChain::new(device, &blur, &bloom[0], &bloom[1], &linear_sampler);

        let compute = wgpu::ShaderStages::COMPUTE;
        let adapt_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Adaptation BGL"),
            entries: &[
                bind::unfilterable_2d(0, compute),
                bind::texture_2d(1, compute),
                bind::storage_texture(2, compute, ADAPTATION_FORMAT),
                bind::uniform(3, compute),
            ],
        });
        let adapt_pipeline = validated(device, "Adaptation Pipeline", || {
            let module = shaders::module(device, "Adaptation Shader", shaders::ADAPTATION);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Adaptation Pipeline Layout"),
                bind_group_layouts: &[&adapt_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Adaptation Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("cs_adapt"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let downsample_groups = luminance_mips
            .iter()
            .take(luminance_mips.len().saturating_sub(1))
            .map(|view| source_group(device, &downsample, view, &linear_sampler))
            .collect();
        let measured = luminance_mips.last().unwrap_or(&luminance.view);
        let adapt_groups = [0, 1].map(|next| {
            adapt_group(device, &adapt_layout, &adaptation, next, measured, &params)
        });
        let measure_group = source_group(device, &measure, &targets.screen_color.view, &linear_sampler);
        let bright_groups = bright_groups(device, &bright, targets, &adaptation, &linear_sampler);
        let tonemap_groups =
            tonemap_groups(device, &tonemap, targets, &adaptation, &bloom[0], &linear_sampler, &params);

        log::debug!(
            "HDR stage: {} luminance mips, {}x{} bloom",
            mip_count,
            settings.bloom_size,
            settings.bloom_size
        );

        Ok(Self {
            luminance,
            luminance_mips,
            adaptation,
            bloom,
            params,
            linear_sampler,
            measure,
            downsample,
            bright,
            tonemap,
            blur,
            blur_chain,
            adapt_pipeline,
            measure_group,
            downsample_groups,
            adapt_groups,
            bright_groups,
            tonemap_groups,
        })
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, targets: &FrameTargets) {
        self.measure_group = source_group(
            device,
            &self.measure,
            &targets.screen_color.view,
            &self.linear_sampler,
        );
        self.bright_groups = bright_groups(
            device,
            &self.bright,
            targets,
            &self.adaptation,
            &self.linear_sampler,
        );
        self.tonemap_groups = tonemap_groups(
            device,
            &self.tonemap,
            targets,
            &self.adaptation,
            &self.bloom[0],
            &self.linear_sampler,
            &self.params,
        );
    }

    pub fn prepare(&self, queue: &wgpu::Queue, settings: &HdrSettings) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&hdr_params(settings)));
    }

    /// Full HDR chain from `screen_color` into `hdr_output`. Writes the next adaptation slot;
    /// call `commit_adaptation` afterwards.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets) {
        let next = self.adaptation.current_index() ^ 1;

        self.measure
            .draw(encoder, &self.luminance_mips[0], &self.measure_group);
        for (level, group) in self.downsample_groups.iter().enumerate() {
            self.downsample
                .draw(encoder, &self.luminance_mips[level + 1], group);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Light Adaptation"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.adapt_pipeline);
            pass.set_bind_group(0, &self.adapt_groups[next], &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }

        self.bright
            .draw(encoder, &self.bloom[0].view, &self.bright_groups[next]);
        for _ in 0..BLOOM_ITERATIONS {
            self.blur_chain
                .record(encoder, &self.blur, &self.bloom[0], &self.bloom[1]);
        }

        self.tonemap
            .draw(encoder, &targets.hdr_output.view, &self.tonemap_groups[next]);
    }

    /// Promote the slot written by the last `record`
    pub fn commit_adaptation(&mut self) {
        self.adaptation.swap();
    }

    pub fn adaptation_index(&self) -> usize {
        self.adaptation.current_index()
    }

    pub fn luminance(&self) -> &RenderTarget {
        &self.luminance
    }

    pub fn bloom(&self) -> &RenderTarget {
        &self.bloom[0]
    }

    /// Re-seed both slots, e.g. after a long pause
    pub fn reset_adaptation(&self, queue: &wgpu::Queue) {
        for slot in self.adaptation.slots() {
            seed_luminance(queue, slot, INITIAL_LUMINANCE);
        }
    }
}

fn seed_luminance(queue: &wgpu::Queue, target: &RenderTarget, value: f32) {
    let texel = [value, value, value, 1.0f32];
    queue.write_texture(
        target.texture.as_image_copy(),
        bytemuck::cast_slice(&texel),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(std::mem::size_of_val(&texel) as u32),
            rows_per_image: None,
        },
        target.extent(),
    );
}

fn adapt_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    adaptation: &PingPong<RenderTarget>,
    next: usize,
    measured: &wgpu::TextureView,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let slots = adaptation.slots();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Adaptation Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&slots[adaptation_reads(next)].view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(measured),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&slots[next].view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: params.as_entire_binding(),
            },
        ],
    })
}

fn bright_groups(
    device: &wgpu::Device,
    pipeline: &FullscreenPipeline,
    targets: &FrameTargets,
    adaptation: &PingPong<RenderTarget>,
    sampler: &wgpu::Sampler,
) -> [wgpu::BindGroup; 2] {
    [0, 1].map(|next| {
        pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.screen_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&adaptation.slots()[next].view),
                },
            ],
        )
    })
}

fn tonemap_groups(
    device: &wgpu::Device,
    pipeline: &FullscreenPipeline,
    targets: &FrameTargets,
    adaptation: &PingPong<RenderTarget>,
    bloom: &RenderTarget,
    sampler: &wgpu::Sampler,
    params: &wgpu::Buffer,
) -> [wgpu::BindGroup; 2] {
    [0, 1].map(|next| {
        pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.screen_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&adaptation.slots()[next].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&bloom.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: params.as_entire_binding(),
                },
            ],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use glam::Vec3;
    use kiln_core::{adapt_luminance, tone_map_hdr};

    #[test]
    fn test_adaptation_reads_the_other_slot() {
        assert_eq!(adaptation_reads(0), 1);
        assert_eq!(adaptation_reads(1), 0);
    }

    #[test]
    fn test_params_follow_settings() {
        let settings = HdrSettings::default();
        let p = hdr_params(&settings);
        assert_eq!(p.exposure, 0.9);
        assert_eq!(p.max_white, 1.17);
        assert_eq!(p.bloom_strength, 1.1);
        assert_eq!(p.adaptation_speed, 0.1);
    }

    #[test]
    fn test_default_luminance_chain_reaches_one_texel() {
        let settings = RendererSettings::default();
        let mips = settings.luminance_mip_count();
        assert_eq!(settings.luminance_size >> (mips - 1), 1);
    }

    #[test]
    fn test_first_frame_matches_cpu_tone_map() {
        let Some(ctx) = testing::context(1, 1) else {
            return;
        };
        let targets = FrameTargets::new(&ctx.device, 4, 4);
        let settings = RendererSettings {
            luminance_size: 4,
            bloom_size: 4,
            ..RendererSettings::default()
        };
        let hdr_settings = HdrSettings::default();
        let mut hdr = HdrPass::new(&ctx.device, &ctx.queue, &targets, &settings).expect("hdr pass");
        hdr.prepare(&ctx.queue, &hdr_settings);
        testing::fill(
            &ctx,
            &targets.screen_color.view,
            wgpu::Color {
                r: 0.5,
                g: 0.5,
                b: 0.5,
                a: 1.0,
            },
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        hdr.record(&mut encoder, &targets);
        ctx.queue.submit(std::iter::once(encoder.finish()));
        hdr.commit_adaptation();

        let adapted = adapt_luminance(INITIAL_LUMINANCE, 0.5, hdr_settings.adaptation_speed);
        let slot = testing::read_f32(&ctx, &hdr.adaptation.current().texture);
        assert!((slot[0] - adapted).abs() < 1e-3, "gpu {} cpu {}", slot[0], adapted);

        // A dim frame against a bright history has no bloom
        let expected = tone_map_hdr(
            Vec3::splat(0.5),
            adapted,
            hdr_settings.exposure,
            hdr_settings.max_white,
            Vec3::ZERO,
            hdr_settings.bloom_strength,
        );
        let output = testing::read_f16(&ctx, &targets.hdr_output.texture);
        for texel in output.chunks(4) {
            let actual = Vec3::from_slice(&texel[..3]);
            assert!(
                (actual - expected).abs().max_element() < 1e-3,
                "gpu {:?} cpu {:?}",
                actual,
                expected
            );
        }
    }
}
