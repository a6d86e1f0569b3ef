//! Fullscreen-triangle pipelines shared by the post-processing stages

use crate::bind;
use crate::context::{validated, RenderError};
use crate::shaders;
use crate::targets::RenderTarget;

const FRAGMENT: wgpu::ShaderStages = wgpu::ShaderStages::FRAGMENT;

/// A fragment entry point drawn over a fullscreen triangle, with its single bind group layout
pub struct FullscreenPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
    label: String,
}

impl FullscreenPipeline {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        module: &wgpu::ShaderModule,
        entry_point: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
        format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        validated(device, label, || {
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_fullscreen"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            Self {
                pipeline,
                layout,
                label: label.to_string(),
            }
        })
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        entries: &[wgpu::BindGroupEntry],
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &self.layout,
            entries,
        })
    }

    /// Draw into `target`, replacing its contents
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Entries for a `source` texture + sampler pair at bindings 0 and 1
pub fn source_entries() -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        bind::texture_2d(0, FRAGMENT),
        bind::sampler(1, FRAGMENT, wgpu::SamplerBindingType::Filtering),
    ]
}

pub fn source_group(
    device: &wgpu::Device,
    pipeline: &FullscreenPipeline,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    pipeline.bind_group(
        device,
        &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    )
}

/// Horizontal and vertical gaussian passes writing `format`
pub struct BlurPipelines {
    pub horizontal: FullscreenPipeline,
    pub vertical: FullscreenPipeline,
}

impl BlurPipelines {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        let module = shaders::module(device, "Blur Shader", shaders::BLUR);
        Ok(Self {
            horizontal: FullscreenPipeline::new(
                device,
                &format!("{label} Blur X"),
                &module,
                "fs_blur_x",
                &source_entries(),
                format,
            )?,
            vertical: FullscreenPipeline::new(
                device,
                &format!("{label} Blur Y"),
                &module,
                "fs_blur_y",
                &source_entries(),
                format,
            )?,
        })
    }
}

/// Bind groups for one blur round trip: `a` -> `b` horizontally, then `b` -> `a` vertically
pub struct BlurChain {
    horizontal_group: wgpu::BindGroup,
    vertical_group: wgpu::BindGroup,
}

impl BlurChain {
    pub fn new(
        device: &wgpu::Device,
        blur: &BlurPipelines,
        a: &RenderTarget,
        b: &RenderTarget,
        sampler: &wgpu::Sampler,
    ) -> Self {
        Self {
            horizontal_group: source_group(device, &blur.horizontal, &a.view, sampler),
            vertical_group: source_group(device, &blur.vertical, &b.view, sampler),
        }
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        blur: &BlurPipelines,
        a: &RenderTarget,
        b: &RenderTarget,
    ) {
        blur.horizontal.draw(encoder, &b.view, &self.horizontal_group);
        blur.vertical.draw(encoder, &a.view, &self.vertical_group);
    }
}

/// Final copy to the presentation format, clamped to displayable range
pub struct PresentPass {
    pipeline: FullscreenPipeline,
    sampler: wgpu::Sampler,
    group: wgpu::BindGroup,
}

impl PresentPass {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        source: &RenderTarget,
    ) -> Result<Self, RenderError> {
        let module = shaders::module(device, "Blit Shader", shaders::BLIT);
        let pipeline = FullscreenPipeline::new(
            device,
            "Present",
            &module,
            "fs_present",
            &source_entries(),
            surface_format,
        )?;
        let sampler = bind::nearest_sampler(device, "Present Sampler");
        let group = source_group(device, &pipeline, &source.view, &sampler);
        Ok(Self {
            pipeline,
            sampler,
            group,
        })
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, source: &RenderTarget) {
        self.group = source_group(device, &self.pipeline, &source.view, &self.sampler);
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        self.pipeline.draw(encoder, target, &self.group);
    }
}
