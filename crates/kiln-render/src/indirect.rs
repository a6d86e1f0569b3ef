//! GPU-resident indirect command buffers with their CPU mirrors

use kiln_scene::{DrawCommand, IndirectCommands};
use wgpu::util::DeviceExt;

const COMMAND_SIZE: u64 = std::mem::size_of::<DrawCommand>() as u64;

/// One partition's commands. The GPU copy is written by the culler; the CPU copy keeps
/// the load-time state (every instance count 1) for restoring.
pub struct IndirectBuffer {
    pub buffer: wgpu::Buffer,
    commands: IndirectCommands,
}

impl IndirectBuffer {
    pub fn new(device: &wgpu::Device, label: &str, commands: IndirectCommands) -> Self {
        let mut contents: Vec<DrawCommand> = commands.as_slice().to_vec();
        // Zero-sized buffers cannot be bound
        if contents.is_empty() {
            contents.push(bytemuck::Zeroable::zeroed());
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&contents),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });
        Self { buffer, commands }
    }

    pub fn len(&self) -> u32 {
        self.commands.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &IndirectCommands {
        &self.commands
    }

    /// Put the CPU mirror back on the GPU, undoing any culling results
    pub fn restore(&self, queue: &wgpu::Queue) {
        if !self.commands.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(self.commands.as_slice()));
        }
    }

    /// Issue every command. Culled commands have an instance count of 0 and draw nothing.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, multi_draw: bool) {
        if self.is_empty() {
            return;
        }
        if multi_draw {
            pass.multi_draw_indexed_indirect(&self.buffer, 0, self.len());
        } else {
            for i in 0..self.len() as u64 {
                pass.draw_indexed_indirect(&self.buffer, i * COMMAND_SIZE);
            }
        }
    }
}
