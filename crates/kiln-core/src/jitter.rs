//! Halton(2, 3) sub-pixel jitter for temporal anti-aliasing

use glam::Vec2;

/// Radical inverse of `i` in base `b`
pub fn halton(mut i: u32, b: u32) -> f32 {
    let mut f = 1.0f32;
    let mut r = 0.0f32;
    while i > 0 {
        f /= b as f32;
        r += f * (i % b) as f32;
        i /= b;
    }
    r
}

/// Cycles through a fixed number of Halton samples, one per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterSequence {
    index: u32,
    length: u32,
}

impl JitterSequence {
    pub fn new(length: u32) -> Self {
        Self {
            index: 0,
            length: length.max(1),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Change the cycle length, wrapping the current index into range
    pub fn set_length(&mut self, length: u32) {
        self.length = length.max(1);
        self.index %= self.length;
    }

    /// NDC offset for the current index. Samples are in [-1, 1] and scaled by the
    /// reciprocal viewport size on each axis.
    pub fn offset(&self, width: u32, height: u32) -> Vec2 {
        let x = 2.0 * halton(self.index + 1, 2) - 1.0;
        let y = 2.0 * halton(self.index + 1, 3) - 1.0;
        Vec2::new(x / width.max(1) as f32, y / height.max(1) as f32)
    }

    /// Returns the current index and offset, then moves to the next sample
    pub fn advance(&mut self, width: u32, height: u32) -> (u32, Vec2) {
        let current = (self.index, self.offset(width, height));
        self.index = (self.index + 1) % self.length;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_base_2_and_3() {
        assert!((halton(1, 2) - 0.5).abs() < 1e-6);
        assert!((halton(2, 2) - 0.25).abs() < 1e-6);
        assert!((halton(3, 2) - 0.75).abs() < 1e-6);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(2, 3) - 2.0 / 3.0).abs() < 1e-6);
        assert!((halton(4, 3) - 4.0 / 9.0).abs() < 1e-6);
        assert_eq!(halton(0, 2), 0.0);
    }

    #[test]
    fn test_sequence_cycles_every_length_frames() {
        let mut seq = JitterSequence::new(8);
        let first: Vec<_> = (0..8).map(|_| seq.advance(1920, 1080)).collect();
        let second: Vec<_> = (0..8).map(|_| seq.advance(1920, 1080)).collect();

        let indices: Vec<u32> = first.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(first, second);
    }

    #[test]
    fn test_offset_is_subpixel() {
        let mut seq = JitterSequence::new(16);
        for _ in 0..16 {
            let (_, o) = seq.advance(800, 600);
            assert!(o.x.abs() <= 1.0 / 800.0);
            assert!(o.y.abs() <= 1.0 / 600.0);
        }
    }

    #[test]
    fn test_first_offset() {
        let seq = JitterSequence::new(8);
        let o = seq.offset(100, 300);
        assert!((o.x - 0.0).abs() < 1e-7);
        assert!((o.y - (-1.0 / 3.0) / 300.0).abs() < 1e-7);
    }

    #[test]
    fn test_set_length_wraps_index() {
        let mut seq = JitterSequence::new(8);
        for _ in 0..6 {
            seq.advance(1, 1);
        }
        seq.set_length(4);
        assert_eq!(seq.index(), 2);
        seq.set_length(0);
        assert_eq!(seq.length(), 1);
        assert_eq!(seq.index(), 0);
    }
}
