//! Asynchronous readback of small GPU counters

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

enum State {
    Idle,
    /// Copy recorded, not yet submitted
    Copied,
    /// `map_async` requested; the flag is set by its callback
    Mapping(Arc<AtomicBool>),
}

/// Copies a few `u32`s into a staging buffer and maps it without stalling. While a
/// previous readback is still in flight new copies are skipped, so the values read
/// can lag the GPU by a frame.
pub struct CounterReadback {
    staging: wgpu::Buffer,
    words: usize,
    state: State,
    latest: Vec<u32>,
}

impl CounterReadback {
    pub fn new(device: &wgpu::Device, label: &str, words: usize) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (words * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            staging,
            words,
            state: State::Idle,
            latest: vec![0; words],
        }
    }

    /// Record a copy of `source` (starting at byte 0) if no readback is in flight
    pub fn record_copy(&mut self, encoder: &mut wgpu::CommandEncoder, source: &wgpu::Buffer) {
        if let State::Idle = self.state {
            encoder.copy_buffer_to_buffer(source, 0, &self.staging, 0, self.staging.size());
            self.state = State::Copied;
        }
    }

    /// Call after the encoder holding the copy was submitted
    pub fn submitted(&mut self) {
        if let State::Copied = self.state {
            let ready = Arc::new(AtomicBool::new(false));
            let flag = ready.clone();
            self.staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| match result {
                    Ok(()) => flag.store(true, Ordering::Release),
                    Err(e) => log::warn!("Counter readback failed: {}", e),
                });
            self.state = State::Mapping(ready);
        }
    }

    /// Pick up a completed mapping, if any, and return the most recent values
    pub fn poll(&mut self) -> &[u32] {
        if let State::Mapping(ready) = &self.state {
            if ready.load(Ordering::Acquire) {
                {
                    let data = self.staging.slice(..).get_mapped_range();
                    let values: &[u32] = bytemuck::cast_slice(&data[..]);
                    self.latest.clear();
                    self.latest.extend_from_slice(&values[..self.words]);
                }
                self.staging.unmap();
                self.state = State::Idle;
            }
        }
        &self.latest
    }
}
