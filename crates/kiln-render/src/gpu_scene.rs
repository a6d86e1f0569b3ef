//! Upload of an immutable `SceneSnapshot` into GPU buffers and textures

use crate::bind;
use crate::context::RenderError;
use crate::indirect::IndirectBuffer;
use crate::irradiance;
use crate::targets::RenderTarget;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use kiln_core::BoundingBox;
use kiln_scene::{SceneSnapshot, Vertex};
use wgpu::util::DeviceExt;

/// Model matrix and the matching normal matrix of one draw slot
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DrawTransform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl DrawTransform {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
        }
    }
}

/// World-space box of one draw slot, padded to vec4s for storage layout
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuBounds {
    pub min: [f32; 4],
    pub max: [f32; 4],
}

impl From<&BoundingBox> for GpuBounds {
    fn from(b: &BoundingBox) -> Self {
        Self {
            min: b.min.extend(1.0).to_array(),
            max: b.max.extend(1.0).to_array(),
        }
    }
}

pub const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x3];

pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// Everything the passes read from the scene. Nothing here changes after upload except
/// the instance counts inside the indirect buffers.
pub struct GpuScene {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub transforms: wgpu::Buffer,
    pub materials: wgpu::Buffer,
    pub bounds: wgpu::Buffer,
    pub texture_view: wgpu::TextureView,
    pub environment_view: wgpu::TextureView,
    /// Cosine-convolved environment sampled by the ambient term
    pub irradiance: RenderTarget,
    /// Every draw, never culled; used by the shadow pass
    pub all: IndirectBuffer,
    pub opaque: IndirectBuffer,
    pub transparent: IndirectBuffer,
    pub world_bounds: Vec<BoundingBox>,
    pub scene_bounds: BoundingBox,
    /// Group 1 of the mesh pipelines: transforms and materials
    pub draw_layout: wgpu::BindGroupLayout,
    pub draw_group: wgpu::BindGroup,
}

impl GpuScene {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &SceneSnapshot,
    ) -> Result<Self, RenderError> {
        scene.validate()?;

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Vertices"),
            contents: bytemuck::cast_slice(&non_empty(&scene.vertices)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Indices"),
            contents: bytemuck::cast_slice(&non_empty(&scene.indices)),
            usage: wgpu::BufferUsages::INDEX,
        });

        let transforms: Vec<DrawTransform> = scene
            .draw_transforms()
            .into_iter()
            .map(DrawTransform::new)
            .collect();
        let transforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Transforms"),
            contents: bytemuck::cast_slice(&non_empty(&transforms)),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let materials = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Materials"),
            contents: bytemuck::cast_slice(&non_empty(&scene.materials)),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let world_bounds = scene.world_bounds();
        let gpu_bounds: Vec<GpuBounds> = world_bounds.iter().map(GpuBounds::from).collect();
        let bounds = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Bounds"),
            contents: bytemuck::cast_slice(&non_empty(&gpu_bounds)),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let scene_bounds = world_bounds
            .iter()
            .fold(BoundingBox::EMPTY, |acc, b| acc.union(b));

        let partition = scene.partition();
        let all = IndirectBuffer::new(device, "Indirect All", scene.draw_commands());
        let opaque = IndirectBuffer::new(device, "Indirect Opaque", partition.opaque);
        let transparent = IndirectBuffer::new(device, "Indirect Transparent", partition.transparent);

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Data BGL"),
            entries: &[
                bind::storage(0, visibility, true),
                bind::storage(1, visibility, true),
            ],
        });
        let draw_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Data Bind Group"),
            layout: &draw_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: transforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: materials.as_entire_binding(),
                },
            ],
        });

        let texture_view = upload_texture_table(device, queue, scene);
        let environment_view = upload_environment(device, queue, scene);
        let irradiance = irradiance::convolve(device, queue, &environment_view)?;

        log::info!(
            "Uploaded scene: {} vertices, {} indices, {} draws ({} opaque, {} transparent), {} texture layers",
            scene.vertices.len(),
            scene.indices.len(),
            scene.draws.len(),
            opaque.len(),
            transparent.len(),
            scene.textures.layers.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            transforms,
            materials,
            bounds,
            texture_view,
            environment_view,
            irradiance,
            all,
            opaque,
            transparent,
            world_bounds,
            scene_bounds,
            draw_layout,
            draw_group,
        })
    }

    pub fn draw_count(&self) -> u32 {
        self.all.len()
    }

    pub fn bind_geometry(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }
}

/// Bound buffers may not be empty; pad with one zeroed element
fn non_empty<T: Pod>(items: &[T]) -> Vec<T> {
    if items.is_empty() {
        vec![T::zeroed()]
    } else {
        items.to_vec()
    }
}

fn upload_texture_table(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    scene: &SceneSnapshot,
) -> wgpu::TextureView {
    let (size, data) = if scene.is_textured() && scene.textures.size > 0 {
        let size = scene.textures.size;
        (size, scene.textures.layers.concat())
    } else {
        (1, vec![255u8; 4])
    };
    let layers = (data.len() / (size as usize * size as usize * 4)).max(1) as u32;

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("Texture Table"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &data,
    );
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Texture Table View"),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        ..Default::default()
    })
}

fn upload_environment(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    scene: &SceneSnapshot,
) -> wgpu::TextureView {
    let env = &scene.environment;
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("Environment Map"),
            size: wgpu::Extent3d {
                width: env.width,
                height: env.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(&env.texels),
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
