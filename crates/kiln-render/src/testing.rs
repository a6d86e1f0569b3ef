//! GPU helpers shared by the tests. Tests that need a device return early when no
//! adapter is available.

use crate::headless::{read_texture, HeadlessContext};

pub fn context(width: u32, height: u32) -> Option<HeadlessContext> {
    match pollster::block_on(HeadlessContext::new(width, height)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("Skipping GPU test: {}", e);
            None
        }
    }
}

pub fn read_bytes(ctx: &HeadlessContext, texture: &wgpu::Texture) -> Vec<u8> {
    pollster::block_on(read_texture(&ctx.device, &ctx.queue, texture)).expect("texture readback")
}

/// Channels of an `Rgba16Float` or `R16Float` texture
pub fn read_f16(ctx: &HeadlessContext, texture: &wgpu::Texture) -> Vec<f32> {
    read_bytes(ctx, texture)
        .chunks_exact(2)
        .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
        .collect()
}

pub fn read_f32(ctx: &HeadlessContext, texture: &wgpu::Texture) -> Vec<f32> {
    read_bytes(ctx, texture)
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Whole contents of a buffer created with `COPY_SRC`
pub fn read_buffer(ctx: &HeadlessContext, buffer: &wgpu::Buffer) -> Vec<u8> {
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Buffer Readback"),
        size: buffer.size(),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, buffer.size());
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).expect("map receiver alive");
    });
    ctx.device.poll(wgpu::Maintain::Wait);
    rx.recv().expect("map callback ran").expect("buffer mapped");
    let data = slice.get_mapped_range().to_vec();
    staging.unmap();
    data
}

pub fn read_u32(ctx: &HeadlessContext, buffer: &wgpu::Buffer) -> Vec<u32> {
    read_buffer(ctx, buffer)
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Clear a render-attachable target to `color`
pub fn fill(ctx: &HeadlessContext, view: &wgpu::TextureView, color: wgpu::Color) {
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Test Fill"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    ctx.queue.submit(std::iter::once(encoder.finish()));
}
