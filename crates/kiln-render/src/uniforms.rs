//! Uniform blocks shared with the WGSL shaders
//!
//! Every struct here mirrors a WGSL struct field for field; the size tests at the
//! bottom pin the layouts.

use crate::bind;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use kiln_core::Frustum;

/// Per-view block consumed by the culler, the shadow pass and the geometry pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    /// Light view-projection used for shadow lookups; all zero disables shadowing
    pub light: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub frustum_planes: [[f32; 4]; 6],
    pub frustum_corners: [[f32; 4]; 8],
    /// NDC jitter applied by the jittered vertex entry point
    pub jitter: [f32; 2],
    pub num_shapes_to_cull: u32,
    /// Which visible counter the culler increments
    pub cull_counter_slot: u32,
}

impl FrameUniforms {
    pub fn new(view: Mat4, proj: Mat4, light: Mat4, camera_pos: Vec3) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            light: light.to_cols_array_2d(),
            camera_pos: camera_pos.extend(1.0).to_array(),
            frustum_planes: [[0.0; 4]; 6],
            frustum_corners: [[0.0; 4]; 8],
            jitter: [0.0; 2],
            num_shapes_to_cull: 0,
            cull_counter_slot: 0,
        }
    }

    pub fn with_frustum(mut self, frustum: &Frustum) -> Self {
        for (dst, plane) in self.frustum_planes.iter_mut().zip(frustum.planes.iter()) {
            *dst = plane.to_array();
        }
        for (dst, corner) in self.frustum_corners.iter_mut().zip(frustum.corners.iter()) {
            *dst = corner.to_array();
        }
        self
    }

    pub fn with_jitter(mut self, jitter: Vec2) -> Self {
        self.jitter = jitter.to_array();
        self
    }

    pub fn with_cull(mut self, count: u32, counter_slot: u32) -> Self {
        self.num_shapes_to_cull = count;
        self.cull_counter_slot = counter_slot;
        self
    }
}

/// Previous frame's committed (unjittered) matrices for reprojection
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PrevFrameUniforms {
    pub prev_view: [[f32; 4]; 4],
    pub prev_proj: [[f32; 4]; 4],
    pub viewport: [f32; 2],
    pub _pad: [f32; 2],
}

impl PrevFrameUniforms {
    pub fn new(prev_view: Mat4, prev_proj: Mat4, width: u32, height: u32) -> Self {
        Self {
            prev_view: prev_view.to_cols_array_2d(),
            prev_proj: prev_proj.to_cols_array_2d(),
            viewport: [width as f32, height as f32],
            _pad: [0.0; 2],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightingUniforms {
    /// Direction the light travels, xyz
    pub direction: [f32; 4],
    pub color: [f32; 4],
    pub ambient: [f32; 4],
}

impl LightingUniforms {
    pub fn new(direction: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero().extend(0.0).to_array(),
            color: [3.0, 2.9, 2.7, 1.0],
            ambient: [0.6, 0.6, 0.6, 1.0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SsaoParams {
    pub scale: f32,
    pub bias: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub radius: f32,
    pub attenuation_scale: f32,
    pub distance_scale: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct HdrParams {
    pub exposure: f32,
    pub max_white: f32,
    pub bloom_strength: f32,
    pub adaptation_speed: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TaaParams {
    pub source_weight: f32,
    pub clamp_mode: u32,
    pub luminance_weighting: u32,
    /// Relative linear-depth difference above which history is discarded
    pub depth_rejection: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FxaaParams {
    pub threshold: f32,
    pub relative_threshold: f32,
    pub subpixel_blending: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SkyUniforms {
    pub inv_view_proj: [[f32; 4]; 4],
}

impl SkyUniforms {
    /// Inverse of the rotation-only view-projection, so the sky never translates
    pub fn new(view: Mat4, proj: Mat4) -> Self {
        let mut rotation = view;
        rotation.w_axis = glam::Vec4::W;
        Self {
            inv_view_proj: (proj * rotation).inverse().to_cols_array_2d(),
        }
    }
}

/// Fixed slots of the frame uniform buffer. Queue writes land before any command of
/// the submission runs, so each view that is live in the same frame gets its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    CullOpaque,
    CullTransparent,
    Shadow,
    Main,
}

impl FrameSlot {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            FrameSlot::CullOpaque => 0,
            FrameSlot::CullTransparent => 1,
            FrameSlot::Shadow => 2,
            FrameSlot::Main => 3,
        }
    }
}

/// `FrameUniforms` size rounded up to the device's dynamic offset alignment
pub fn frame_slot_stride(min_uniform_offset_alignment: u32) -> u64 {
    let size = std::mem::size_of::<FrameUniforms>() as u64;
    let align = min_uniform_offset_alignment.max(1) as u64;
    size.div_ceil(align) * align
}

/// One uniform buffer holding every `FrameUniforms` slot, bound with a dynamic offset
pub struct FrameUniformBuffer {
    pub buffer: wgpu::Buffer,
    stride: u64,
}

impl FrameUniformBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let stride = frame_slot_stride(device.limits().min_uniform_buffer_offset_alignment);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: stride * FrameSlot::COUNT as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, stride }
    }

    pub fn write(&self, queue: &wgpu::Queue, slot: FrameSlot, uniforms: &FrameUniforms) {
        queue.write_buffer(&self.buffer, self.byte_offset(slot), bytemuck::bytes_of(uniforms));
    }

    pub fn byte_offset(&self, slot: FrameSlot) -> u64 {
        self.stride * slot.index() as u64
    }

    /// Dynamic offset to pass to `set_bind_group`
    pub fn dynamic_offset(&self, slot: FrameSlot) -> u32 {
        self.byte_offset(slot) as u32
    }

    /// Binding resource covering exactly one slot
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(std::mem::size_of::<FrameUniforms>() as u64),
        })
    }
}

/// Bind group 0 shared by the culler, the shadow pass and the geometry pass
pub struct FrameBindings {
    pub frame: FrameUniformBuffer,
    pub prev: wgpu::Buffer,
    pub lighting: wgpu::Buffer,
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl FrameBindings {
    pub fn new(device: &wgpu::Device) -> Self {
        let visibility = wgpu::ShaderStages::VERTEX
            | wgpu::ShaderStages::FRAGMENT
            | wgpu::ShaderStages::COMPUTE;
        let frame = FrameUniformBuffer::new(device);
        let prev = uniform_buffer::<PrevFrameUniforms>(device, "Previous Frame Uniforms");
        let lighting = uniform_buffer::<LightingUniforms>(device, "Lighting Uniforms");

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame BGL"),
            entries: &[
                bind::dynamic_uniform(0, visibility, std::mem::size_of::<FrameUniforms>() as u64),
                bind::uniform(1, visibility),
                bind::uniform(2, visibility),
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: prev.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lighting.as_entire_binding(),
                },
            ],
        });

        Self {
            frame,
            prev,
            lighting,
            layout,
            bind_group,
        }
    }

    pub fn write_frame(&self, queue: &wgpu::Queue, slot: FrameSlot, uniforms: &FrameUniforms) {
        self.frame.write(queue, slot, uniforms);
    }

    pub fn write_prev(&self, queue: &wgpu::Queue, prev: &PrevFrameUniforms) {
        queue.write_buffer(&self.prev, 0, bytemuck::bytes_of(prev));
    }

    pub fn write_lighting(&self, queue: &wgpu::Queue, lighting: &LightingUniforms) {
        queue.write_buffer(&self.lighting, 0, bytemuck::bytes_of(lighting));
    }

    pub fn offset(&self, slot: FrameSlot) -> u32 {
        self.frame.dynamic_offset(slot)
    }
}

/// Uniform buffer sized for one `T`
pub fn uniform_buffer<T: Pod>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<T>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_sizes_match_wgsl_layouts() {
        assert_eq!(size_of::<FrameUniforms>(), 448);
        assert_eq!(size_of::<PrevFrameUniforms>(), 144);
        assert_eq!(size_of::<LightingUniforms>(), 48);
        assert_eq!(size_of::<SsaoParams>(), 32);
        assert_eq!(size_of::<HdrParams>(), 16);
        assert_eq!(size_of::<TaaParams>(), 32);
        assert_eq!(size_of::<FxaaParams>(), 16);
        assert_eq!(size_of::<SkyUniforms>(), 64);
    }

    #[test]
    fn test_slot_stride_respects_alignment() {
        assert_eq!(frame_slot_stride(256), 512);
        assert_eq!(frame_slot_stride(64), 448);
        assert_eq!(frame_slot_stride(0), 448);
    }

    #[test]
    fn test_slots_are_distinct() {
        let slots = [
            FrameSlot::CullOpaque,
            FrameSlot::CullTransparent,
            FrameSlot::Shadow,
            FrameSlot::Main,
        ];
        let mut indices: Vec<_> = slots.iter().map(|s| s.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), FrameSlot::COUNT);
    }

    #[test]
    fn test_frustum_copied_into_block() {
        let vp = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let frustum = Frustum::from_view_projection(&vp);
        let block = FrameUniforms::new(Mat4::IDENTITY, vp, Mat4::ZERO, Vec3::ZERO)
            .with_frustum(&frustum)
            .with_cull(12, 1);
        assert_eq!(block.frustum_planes[4], frustum.planes[4].to_array());
        assert_eq!(block.frustum_corners[7], frustum.corners[7].to_array());
        assert_eq!(block.num_shapes_to_cull, 12);
        assert_eq!(block.cull_counter_slot, 1);
        assert_eq!(block.light, [[0.0; 4]; 4]);
    }

    #[test]
    fn test_sky_ignores_translation() {
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let a = SkyUniforms::new(Mat4::from_translation(Vec3::new(5.0, 1.0, 2.0)), proj);
        let b = SkyUniforms::new(Mat4::IDENTITY, proj);
        assert_eq!(a.inv_view_proj, b.inv_view_proj);
    }
}
