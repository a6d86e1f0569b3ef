//! View frustum planes and corners
//!
//! Uses wgpu's clip-space convention: x and y in [-1, 1], depth in [0, 1].
//! The same planes and corners are uploaded for the culling compute shader, so
//! `contains_box` here is the reference for what the GPU decides.

use crate::BoundingBox;
use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far. Points with `dot(plane, p) >= 0` are inside.
    pub planes: [Vec4; 6],
    pub corners: [Vec4; 8],
}

impl Frustum {
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        Self {
            planes: Self::planes(view_proj),
            corners: Self::corners(view_proj),
        }
    }

    fn planes(m: &Mat4) -> [Vec4; 6] {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2]
    }

    fn corners(m: &Mat4) -> [Vec4; 8] {
        let inv = m.inverse();
        let mut out = [Vec4::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let ndc = Vec4::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { 0.0 } else { 1.0 },
                1.0,
            );
            let p = inv * ndc;
            *corner = p / p.w;
        }
        out
    }

    /// Conservative visibility test.
    ///
    /// A box is rejected when all its corners are behind one plane, or when all frustum
    /// corners lie beyond the same face of the box. The second test catches large boxes
    /// near frustum edges that the plane test alone would keep.
    pub fn contains_box(&self, b: &BoundingBox) -> bool {
        let box_corners = b.corners();
        for plane in &self.planes {
            let outside = box_corners
                .iter()
                .filter(|c| plane.dot(c.extend(1.0)) < 0.0)
                .count();
            if outside == 8 {
                return false;
            }
        }

        for axis in 0..3 {
            let beyond_max = self.corners.iter().filter(|c| c[axis] > b.max[axis]).count();
            if beyond_max == 8 {
                return false;
            }
            let beyond_min = self.corners.iter().filter(|c| c[axis] < b.min[axis]).count();
            if beyond_min == 8 {
                return false;
            }
        }
        true
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.dot(p.extend(1.0)) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let f = camera_frustum();
        let b = BoundingBox::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        assert!(f.contains_box(&b));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let f = camera_frustum();
        let b = BoundingBox::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert!(!f.contains_box(&b));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let f = camera_frustum();
        let b = BoundingBox::new(Vec3::new(-1.0, -1.0, -130.0), Vec3::new(1.0, 1.0, -120.0));
        assert!(!f.contains_box(&b));
    }

    #[test]
    fn test_box_enclosing_camera_is_visible() {
        let f = camera_frustum();
        let b = BoundingBox::new(Vec3::splat(-500.0), Vec3::splat(500.0));
        assert!(f.contains_box(&b));
    }

    #[test]
    fn test_corners_lie_on_near_and_far_planes() {
        let f = camera_frustum();
        assert!((f.corners[0].z + 0.1).abs() < 1e-4);
        assert!((f.corners[7].z + 100.0).abs() < 1e-2);
        assert!(f.contains_point(Vec3::new(0.0, 0.0, -50.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_wide_box_behind_camera_is_culled() {
        // Wide box behind the camera: every frustum corner has z below the box.
        let f = camera_frustum();
        let b = BoundingBox::new(Vec3::new(-300.0, -2.0, 50.0), Vec3::new(300.0, 2.0, 60.0));
        assert!(!f.contains_box(&b));
    }
}
