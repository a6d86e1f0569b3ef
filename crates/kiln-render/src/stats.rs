//! Frame telemetry for a HUD or the CLI. Read-only: nothing here feeds back into rendering.

use crate::targets::RenderTarget;

/// Averages frame rate over a fixed interval
#[derive(Debug, Clone)]
pub struct FpsCounter {
    interval: f32,
    elapsed: f32,
    frames: u32,
    fps: f32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl FpsCounter {
    pub fn new(interval: f32) -> Self {
        Self {
            interval: interval.max(f32::EPSILON),
            elapsed: 0.0,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame. Returns true when a new average was published.
    pub fn tick(&mut self, delta_seconds: f32) -> bool {
        self.elapsed += delta_seconds.max(0.0);
        self.frames += 1;
        if self.elapsed < self.interval {
            return false;
        }
        self.fps = self.frames as f32 / self.elapsed;
        self.elapsed = 0.0;
        self.frames = 0;
        true
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub delta_seconds: f32,
    pub fps: f32,
    /// May lag a frame behind when the counter readback has not landed yet
    pub visible_opaque: u32,
    pub visible_transparent: u32,
    /// Only counted when `oit.count_overflow` is set
    pub oit_fragments: u32,
    pub oit_dropped: u32,
}

impl FrameStats {
    pub fn visible_total(&self) -> u32 {
        self.visible_opaque + self.visible_transparent
    }
}

/// Intermediate targets exposed for inspection
pub struct DebugTargets<'a> {
    pub ssao: &'a RenderTarget,
    pub velocity: &'a RenderTarget,
    pub hdr_output: &'a RenderTarget,
    pub anti_aliased: &'a RenderTarget,
    pub shadow_map: &'a RenderTarget,
    pub luminance: &'a RenderTarget,
    pub bloom: &'a RenderTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_published_after_interval() {
        let mut counter = FpsCounter::default();
        for _ in 0..29 {
            assert!(!counter.tick(1.0 / 60.0));
        }
        assert_eq!(counter.fps(), 0.0);
        assert!(counter.tick(1.0 / 60.0));
        assert!((counter.fps() - 60.0).abs() < 0.5);
    }

    #[test]
    fn test_fps_resets_between_intervals() {
        let mut counter = FpsCounter::new(1.0);
        counter.tick(1.0);
        assert!((counter.fps() - 1.0).abs() < 1e-6);
        for _ in 0..10 {
            counter.tick(0.1);
        }
        assert!((counter.fps() - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_visible_total() {
        let stats = FrameStats {
            visible_opaque: 3,
            visible_transparent: 2,
            ..Default::default()
        };
        assert_eq!(stats.visible_total(), 5);
    }
}
