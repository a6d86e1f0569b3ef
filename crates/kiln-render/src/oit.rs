//! Per-pixel linked-list transparency: fragment storage, head reset and resolve

use crate::bind;
use crate::blit::FullscreenPipeline;
use crate::context::{validated, RenderError};
use crate::readback::CounterReadback;
use crate::shaders;
use crate::targets::{FrameTargets, HDR_FORMAT};

/// Bytes per stored fragment: vec4 color, depth, next index, padding
pub const FRAGMENT_SIZE: u64 = 32;

const CLEAR_WORKGROUP_SIZE: u32 = 64;
const MAX_DISPATCH_X: u32 = 65_535;

/// Fragments the device can hold: the configured count capped by binding and buffer limits
pub fn fragment_capacity(requested: u32, limits: &wgpu::Limits) -> u32 {
    let by_binding = limits.max_storage_buffer_binding_size as u64 / FRAGMENT_SIZE;
    let by_buffer = limits.max_buffer_size / FRAGMENT_SIZE;
    (requested as u64).min(by_binding).min(by_buffer).max(1) as u32
}

/// 2D workgroup grid covering `pixels` invocations of the head clear
pub fn clear_dispatch(pixels: u32) -> (u32, u32) {
    let groups = pixels.div_ceil(CLEAR_WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_DISPATCH_X);
    (x, groups.div_ceil(x))
}

pub struct OitPass {
    pub fragments: wgpu::Buffer,
    /// Global append counter
    pub counter: wgpu::Buffer,
    pub capacity: u32,
    clear_pipeline: wgpu::ComputePipeline,
    clear_layout: wgpu::BindGroupLayout,
    clear_group: wgpu::BindGroup,
    resolve: FullscreenPipeline,
    resolve_group: wgpu::BindGroup,
    readback: CounterReadback,
}

impl OitPass {
    pub fn new(
        device: &wgpu::Device,
        targets: &FrameTargets,
        requested_capacity: u32,
    ) -> Result<Self, RenderError> {
        let capacity = fragment_capacity(requested_capacity, &device.limits());
        if capacity < requested_capacity {
            log::warn!(
                "OIT capacity clamped from {} to {} fragments by device limits",
                requested_capacity,
                capacity
            );
        }

        let fragments = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OIT Fragments"),
            size: capacity as u64 * FRAGMENT_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OIT Counter"),
            size: std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let clear_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("OIT Clear BGL"),
            entries: &[bind::storage(0, wgpu::ShaderStages::COMPUTE, false)],
        });
        let clear_pipeline = validated(device, "OIT Clear Pipeline", || {
            let module = shaders::module(device, "OIT Clear Shader", shaders::OIT_CLEAR);
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("OIT Clear Pipeline Layout"),
                bind_group_layouts: &[&clear_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("OIT Clear Pipeline"),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("cs_clear_heads"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let module = shaders::module(device, "OIT Resolve Shader", &shaders::oit_resolve());
        let resolve = FullscreenPipeline::new(
            device,
            "OIT Resolve",
            &module,
            "fs_resolve",
            &[
                bind::storage(0, fragment, true),
                bind::storage(1, fragment, true),
                bind::unfilterable_2d(2, fragment),
            ],
            HDR_FORMAT,
        )?;

        let clear_group = Self::clear_group(device, &clear_layout, targets);
        let resolve_group = Self::resolve_group(device, &resolve, &fragments, targets);

        Ok(Self {
            fragments,
            counter,
            capacity,
            clear_pipeline,
            clear_layout,
            clear_group,
            resolve,
            resolve_group,
            readback: CounterReadback::new(device, "OIT Counter Readback", 1),
        })
    }

    fn clear_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        targets: &FrameTargets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("OIT Clear Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: targets.oit_heads.as_entire_binding(),
            }],
        })
    }

    fn resolve_group(
        device: &wgpu::Device,
        resolve: &FullscreenPipeline,
        fragments: &wgpu::Buffer,
        targets: &FrameTargets,
    ) -> wgpu::BindGroup {
        resolve.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: targets.oit_heads.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: fragments.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.screen_color.view),
                },
            ],
        )
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, targets: &FrameTargets) {
        self.clear_group = Self::clear_group(device, &self.clear_layout, targets);
        self.resolve_group = Self::resolve_group(device, &self.resolve, &self.fragments, targets);
    }

    /// Reset every head to the empty sentinel and the append counter to zero
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets) {
        encoder.clear_buffer(&self.counter, 0, None);
        let (x, y) = clear_dispatch(targets.pixel_count());
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("OIT Clear Heads"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.clear_pipeline);
        pass.set_bind_group(0, &self.clear_group, &[]);
        pass.dispatch_workgroups(x, y, 1);
    }

    /// Composite the lists over `screen_color` into `opaque_color`, then copy the result
    /// back so `screen_color` holds the composited image
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets) {
        self.resolve
            .draw(encoder, &targets.opaque_color.view, &self.resolve_group);
        crate::targets::copy_target(encoder, &targets.opaque_color, &targets.screen_color);
    }

    /// Queue a copy of the append counter for overflow reporting
    pub fn record_counter_copy(&mut self, encoder: &mut wgpu::CommandEncoder) {
        self.readback.record_copy(encoder, &self.counter);
    }

    pub fn submitted(&mut self) {
        self.readback.submitted();
    }

    /// Most recent appended-fragment count that reached the CPU
    pub fn appended(&mut self) -> u32 {
        self.readback.poll()[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use glam::Vec4;
    use kiln_core::{composite_pixel, OitList, MAX_FRAGMENTS_PER_PIXEL};

    /// GPU layout of one fragment: color, depth, next, two words of padding
    fn fragment_words(list: &OitList) -> Vec<u32> {
        list.fragments()
            .iter()
            .flat_map(|f| {
                let [r, g, b, a] = f.color.to_array();
                [r, g, b, a, f.depth].map(f32::to_bits).into_iter().chain([f.next, 0, 0])
            })
            .collect()
    }

    #[test]
    fn test_default_capacity_fits_default_limits() {
        let limits = wgpu::Limits::default();
        assert_eq!(fragment_capacity(4 * 1024 * 1024, &limits), 4 * 1024 * 1024);
    }

    #[test]
    fn test_capacity_clamped_by_binding_size() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024 * 32,
            ..wgpu::Limits::default()
        };
        assert_eq!(fragment_capacity(1_000_000, &limits), 1024);
    }

    #[test]
    fn test_clear_dispatch_covers_every_pixel() {
        for (w, h) in [(1, 1), (1280, 720), (3840, 2160), (8192, 8192)] {
            let pixels = w * h;
            let (x, y) = clear_dispatch(pixels);
            assert!(x <= MAX_DISPATCH_X);
            assert!(x as u64 * y as u64 * 64 >= pixels as u64);
        }
    }

    #[test]
    fn test_resolve_matches_cpu_composite() {
        let Some(ctx) = testing::context(1, 1) else {
            return;
        };
        let targets = FrameTargets::new(&ctx.device, 4, 1);
        let oit = OitPass::new(&ctx.device, &targets, 64).expect("oit pass");

        let mut list = OitList::new(4, 64);
        // Pixel 0 stays empty
        list.append(1, Vec4::new(1.0, 0.0, 0.0, 0.5), 0.3);
        list.append(1, Vec4::new(0.0, 0.0, 1.0, 0.5), 0.7);
        // The oldest fragments are opaque white and nearest; they fall past the walk limit
        for _ in 0..8 {
            list.append(2, Vec4::ONE, 0.01);
        }
        for i in 0..MAX_FRAGMENTS_PER_PIXEL {
            let color = if i % 2 == 0 {
                Vec4::new(1.0, 0.0, 0.0, 0.25)
            } else {
                Vec4::new(0.0, 1.0, 0.0, 0.25)
            };
            list.append(2, color, 0.5 + i as f32 * 0.01);
        }
        list.append(3, Vec4::new(0.0, 1.0, 0.0, 2.0), 0.5);

        ctx.queue
            .write_buffer(&targets.oit_heads, 0, bytemuck::cast_slice(list.heads()));
        ctx.queue
            .write_buffer(&oit.fragments, 0, bytemuck::cast_slice(&fragment_words(&list)));
        // 0.25 and 0.5 are exact in half precision
        let background = Vec4::new(0.25, 0.5, 0.25, 1.0);
        testing::fill(
            &ctx,
            &targets.screen_color.view,
            wgpu::Color {
                r: 0.25,
                g: 0.5,
                b: 0.25,
                a: 1.0,
            },
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        oit.resolve(&mut encoder, &targets);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let resolved = testing::read_f16(&ctx, &targets.screen_color.texture);
        for pixel in 0..4 {
            let expected = composite_pixel(&list.fragments_at(pixel), background);
            let actual = Vec4::from_slice(&resolved[pixel * 4..pixel * 4 + 4]);
            assert!(
                (actual - expected).abs().max_element() < 2e-3,
                "pixel {}: gpu {:?} cpu {:?}",
                pixel,
                actual,
                expected
            );
        }
        assert_eq!(Vec4::from_slice(&resolved[0..4]), background);
        assert!(resolved[2 * 4 + 2] < 0.1, "white fragments past the limit were composited");
        assert!((resolved[3 * 4 + 1] - 1.0).abs() < 1e-3);
    }
}
