//! Offscreen device and color target for rendering frames to an image

use crate::context::{create_device, RenderError};

/// Device plus an sRGB target the orchestrator presents into
pub struct HeadlessContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
}

impl HeadlessContext {
    pub async fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterNotFound)?;

        let (device, queue) = create_device(&adapter, "Kiln Headless Device").await?;

        let width = width.max(1);
        let height = height.max(1);
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Headless Color Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            device,
            queue,
            format,
            width,
            height,
            color_texture,
            color_view,
        })
    }

    /// Tightly packed RGBA8 rows of the color target
    pub async fn read_pixels(&self) -> Result<Vec<u8>, RenderError> {
        read_texture(&self.device, &self.queue, &self.color_texture).await
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Copy a whole single-sample texture back to the CPU as tightly packed rows
pub(crate) async fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<Vec<u8>, RenderError> {
    let format = texture.format();
    let texel_size = format
        .block_copy_size(None)
        .ok_or_else(|| RenderError::BufferReadFailed(format!("{format:?} cannot be copied")))?;
    let (width, height) = (texture.width(), texture.height());
    let unpadded = width * texel_size;
    let padded = padded_bytes_per_row(unpadded);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Texture Readback Buffer"),
        size: (padded * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        if tx.send(result).is_err() {
            log::warn!("Texture readback finished after its receiver was dropped");
        }
    });
    if !device.poll(wgpu::Maintain::Wait).is_queue_empty() {
        log::warn!("Device still busy after waiting for texture readback");
    }
    rx.recv()
        .map_err(|e| RenderError::BufferReadFailed(e.to_string()))?
        .map_err(|e| RenderError::BufferReadFailed(e.to_string()))?;

    let data = {
        let mapped = slice.get_mapped_range();
        strip_row_padding(&mapped, unpadded, padded, height)
    };
    staging.unmap();
    Ok(data)
}

fn padded_bytes_per_row(unpadded: u32) -> u32 {
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

fn strip_row_padding(data: &[u8], unpadded: u32, padded: u32, rows: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((unpadded * rows) as usize);
    for row in 0..rows {
        let start = (row * padded) as usize;
        pixels.extend_from_slice(&data[start..start + unpadded as usize]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64 * 4), 256);
        assert_eq!(padded_bytes_per_row(65 * 4), 512);
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(32 * 8), 256);
    }

    #[test]
    fn test_padding_stripped() {
        let mut data = vec![0u8; 512];
        data[0..4].copy_from_slice(&[1, 2, 3, 4]);
        data[256..260].copy_from_slice(&[5, 6, 7, 8]);
        let pixels = strip_row_padding(&data, 4, 256, 2);
        assert_eq!(pixels, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
