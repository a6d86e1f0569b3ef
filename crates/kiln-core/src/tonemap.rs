//! Reference versions of the HDR stage math. The WGSL in `kiln-render` mirrors these.

use glam::Vec3;

const LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

/// Rec. 709 relative luminance
pub fn luminance(color: Vec3) -> f32 {
    color.dot(LUMA)
}

/// One light adaptation step: exponential moving average toward the measured luminance.
/// The blend factor depends only on `speed`, not on frame time.
pub fn adapt_luminance(previous: f32, current: f32, speed: f32) -> f32 {
    previous + (current - previous) * (1.0 - (-speed).exp())
}

/// Extended Reinhard: maps `max_white` to 1.0
pub fn reinhard_extended(x: Vec3, max_white: f32) -> Vec3 {
    let w2 = max_white * max_white;
    x * (Vec3::ONE + x / w2) / (Vec3::ONE + x)
}

/// HDR combine: exposure against adapted luminance, tone map, add bloom
pub fn tone_map_hdr(
    color: Vec3,
    adapted_luminance: f32,
    exposure: f32,
    max_white: f32,
    bloom: Vec3,
    bloom_strength: f32,
) -> Vec3 {
    let exposed = color / adapted_luminance.max(1e-4) * exposure;
    reinhard_extended(exposed, max_white) + bloom * bloom_strength
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance_of_white() {
        assert!((luminance(Vec3::ONE) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_adaptation_converges_monotonically() {
        let target = 0.25;
        let mut lum = 50.0;
        let mut last_gap = f32::MAX;
        for _ in 0..100 {
            lum = adapt_luminance(lum, target, 0.1);
            let gap = (lum - target).abs();
            assert!(gap < last_gap);
            last_gap = gap;
        }
        assert!(last_gap < 0.01);
    }

    #[test]
    fn test_adaptation_fixed_point() {
        assert!((adapt_luminance(0.7, 0.7, 0.3) - 0.7).abs() < 1e-7);
        assert!((adapt_luminance(1.0, 0.0, 0.0) - 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_reinhard_maps_max_white_to_one() {
        let out = reinhard_extended(Vec3::splat(1.17), 1.17);
        assert!((out.x - 1.0).abs() < 1e-5);
        assert_eq!(reinhard_extended(Vec3::ZERO, 1.17), Vec3::ZERO);
    }

    #[test]
    fn test_tone_map_adds_bloom() {
        let base = tone_map_hdr(Vec3::splat(0.5), 1.0, 1.0, 2.0, Vec3::ZERO, 1.0);
        let bloomed = tone_map_hdr(Vec3::splat(0.5), 1.0, 1.0, 2.0, Vec3::splat(0.1), 2.0);
        assert!(((bloomed - base).x - 0.2).abs() < 1e-6);
    }
}
