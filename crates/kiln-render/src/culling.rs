//! GPU frustum culling of the opaque and transparent indirect buffers

use crate::bind;
use crate::context::{validated, RenderError};
use crate::gpu_scene::GpuScene;
use crate::indirect::IndirectBuffer;
use crate::readback::CounterReadback;
use crate::shaders;
use crate::uniforms::{FrameBindings, FrameSlot};
use glam::Mat4;

pub const WORKGROUP_SIZE: u32 = 64;

/// Index of each buffer's visible counter
pub const OPAQUE_COUNTER: u32 = 0;
pub const TRANSPARENT_COUNTER: u32 = 1;

pub fn workgroup_count(draws: u32) -> u32 {
    draws.div_ceil(WORKGROUP_SIZE)
}

pub struct CullingPass {
    pipeline: wgpu::ComputePipeline,
    opaque_group: wgpu::BindGroup,
    transparent_group: wgpu::BindGroup,
    /// Two atomic counters, reset before every dispatch
    visible: wgpu::Buffer,
    readback: CounterReadback,
    freeze: ViewFreeze,
}

/// Holds the culling view still while freezing is on
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewFreeze {
    frozen: Option<Mat4>,
}

impl ViewFreeze {
    pub fn resolve(&mut self, camera_view: Mat4, freeze: bool) -> Mat4 {
        if !freeze {
            self.frozen = None;
            return camera_view;
        }
        *self.frozen.get_or_insert(camera_view)
    }
}

impl CullingPass {
    pub fn new(
        device: &wgpu::Device,
        frame: &FrameBindings,
        scene: &GpuScene,
    ) -> Result<Self, RenderError> {
        let compute = wgpu::ShaderStages::COMPUTE;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull BGL"),
            entries: &[
                bind::storage(0, compute, true),
                bind::storage(1, compute, false),
                bind::storage(2, compute, false),
            ],
        });

        let pipeline = validated(device, "Cull Pipeline", || {
            let module = shaders::module(device, "Cull Shader", shaders::CULL);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Cull Pipeline Layout"),
                bind_group_layouts: &[&frame.layout, &layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Cull Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("cs_cull"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let visible = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Visible Counters"),
            size: 2 * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let group = |label: &str, commands: &IndirectBuffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: scene.bounds.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: commands.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: visible.as_entire_binding(),
                    },
                ],
            })
        };
        let opaque_group = group("Cull Opaque", &scene.opaque);
        let transparent_group = group("Cull Transparent", &scene.transparent);

        Ok(Self {
            pipeline,
            opaque_group,
            transparent_group,
            readback: CounterReadback::new(device, "Visible Counter Readback", 2),
            visible,
            freeze: ViewFreeze::default(),
        })
    }

    /// View to cull against. While frozen, the last unfrozen view is held.
    pub fn culling_view(&mut self, camera_view: Mat4, freeze: bool) -> Mat4 {
        self.freeze.resolve(camera_view, freeze)
    }

    /// Reset the counters and cull both buffers. `counts` are the draw counts written into
    /// the two cull uniform slots; zero skips the dispatch.
    pub fn record(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameBindings,
        counts: [u32; 2],
    ) {
        encoder.clear_buffer(&self.visible, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Cull Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            let dispatches = [
                (FrameSlot::CullOpaque, &self.opaque_group, counts[0]),
                (FrameSlot::CullTransparent, &self.transparent_group, counts[1]),
            ];
            for (slot, group, count) in dispatches {
                if count == 0 {
                    continue;
                }
                pass.set_bind_group(0, &frame.bind_group, &[frame.offset(slot)]);
                pass.set_bind_group(1, group, &[]);
                pass.dispatch_workgroups(workgroup_count(count), 1, 1);
            }
        }
        self.readback.record_copy(encoder, &self.visible);
    }

    /// Call once the encoder from `record` has been submitted
    pub fn submitted(&mut self) {
        self.readback.submitted();
    }

    /// Latest `[opaque, transparent]` visible counts the GPU reported
    pub fn visible_counts(&mut self) -> [u32; 2] {
        let values = self.readback.poll();
        [values[OPAQUE_COUNTER as usize], values[TRANSPARENT_COUNTER as usize]]
    }
}
