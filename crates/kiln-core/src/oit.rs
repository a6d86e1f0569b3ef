//! Per-pixel linked lists for order-independent transparency
//!
//! CPU model of what the transparent fragment shader and the resolve pass do on the GPU.
//! The GPU side keeps the same layout: one head index per pixel, a flat fragment array
//! and a single append counter. `MAX_FRAGMENTS_PER_PIXEL` is compiled into the resolve
//! shader, so both sides stop walking a list at the same length.

use glam::{Vec3, Vec4};

/// Head value for a pixel with no fragments
pub const OIT_EMPTY: u32 = 0xFFFF_FFFF;

/// Longest list the resolve pass walks; older fragments past it are ignored
pub const MAX_FRAGMENTS_PER_PIXEL: usize = 32;

/// Fragments that did not fit: the append counter keeps counting past capacity
pub fn dropped_fragments(appended: u32, capacity: u32) -> u32 {
    appended.saturating_sub(capacity)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OitFragment {
    pub color: Vec4,
    pub depth: f32,
    pub next: u32,
}

#[derive(Debug, Clone)]
pub struct OitList {
    heads: Vec<u32>,
    fragments: Vec<OitFragment>,
    capacity: u32,
    counter: u32,
}

impl OitList {
    pub fn new(pixel_count: usize, capacity: u32) -> Self {
        Self {
            heads: vec![OIT_EMPTY; pixel_count],
            fragments: Vec::with_capacity(capacity as usize),
            capacity,
            counter: 0,
        }
    }

    /// Reset heads to the sentinel and the counter to zero
    pub fn clear(&mut self) {
        self.heads.fill(OIT_EMPTY);
        self.fragments.clear();
        self.counter = 0;
    }

    /// Prepend a fragment to `pixel`'s list. Returns false when the fragment was dropped
    /// because the list is full; the counter still advances, like the GPU atomic.
    pub fn append(&mut self, pixel: usize, color: Vec4, depth: f32) -> bool {
        let index = self.counter;
        self.counter = self.counter.saturating_add(1);
        if index >= self.capacity {
            return false;
        }
        let next = std::mem::replace(&mut self.heads[pixel], index);
        self.fragments.push(OitFragment { color, depth, next });
        true
    }

    /// Fragments that did not fit
    pub fn dropped(&self) -> u32 {
        dropped_fragments(self.counter, self.capacity)
    }

    /// One head index per pixel, `OIT_EMPTY` for an empty list
    pub fn heads(&self) -> &[u32] {
        &self.heads
    }

    /// Stored fragments in append order
    pub fn fragments(&self) -> &[OitFragment] {
        &self.fragments
    }

    pub fn head(&self, pixel: usize) -> u32 {
        self.heads[pixel]
    }

    /// Walk `pixel`'s list, most recently appended first
    pub fn fragments_at(&self, pixel: usize) -> Vec<OitFragment> {
        let mut out = Vec::new();
        let mut index = self.heads[pixel];
        while index != OIT_EMPTY {
            let fragment = self.fragments[index as usize];
            out.push(fragment);
            index = fragment.next;
        }
        out
    }

    pub fn resolve(&self, pixel: usize, background: Vec4) -> Vec4 {
        composite_pixel(&self.fragments_at(pixel), background)
    }
}

/// Blend a pixel's list back-to-front over `background`.
///
/// `fragments` is in list order (most recent first). Only the first
/// `MAX_FRAGMENTS_PER_PIXEL` take part. They are stably sorted by descending depth so
/// equal depths keep list order, and each alpha is clamped to [0, 1]. With no fragments
/// the background is returned untouched.
pub fn composite_pixel(fragments: &[OitFragment], background: Vec4) -> Vec4 {
    let walked = &fragments[..fragments.len().min(MAX_FRAGMENTS_PER_PIXEL)];
    if walked.is_empty() {
        return background;
    }
    let mut sorted = walked.to_vec();
    sorted.sort_by(|a, b| b.depth.total_cmp(&a.depth));

    let mut rgb: Vec3 = background.truncate();
    for fragment in &sorted {
        rgb = rgb.lerp(fragment.color.truncate(), fragment.color.w.clamp(0.0, 1.0));
    }
    rgb.extend(background.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pixel_is_unchanged() {
        let list = OitList::new(4, 16);
        let bg = Vec4::new(0.3, 0.6, 0.9, 1.0);
        assert_eq!(list.head(2), OIT_EMPTY);
        assert_eq!(list.resolve(2, bg), bg);
    }

    #[test]
    fn test_append_prepends() {
        let mut list = OitList::new(1, 16);
        list.append(0, Vec4::ONE, 0.2);
        list.append(0, Vec4::ZERO, 0.1);
        let frags = list.fragments_at(0);
        assert_eq!(frags.len(), 2);
        assert!((frags[0].depth - 0.1).abs() < 1e-7);
        assert_eq!(frags[1].next, OIT_EMPTY);
    }

    #[test]
    fn test_composite_is_order_independent() {
        let red = Vec4::new(1.0, 0.0, 0.0, 0.5);
        let blue = Vec4::new(0.0, 0.0, 1.0, 0.5);
        let bg = Vec4::new(0.0, 0.0, 0.0, 1.0);

        let mut near_first = OitList::new(1, 8);
        near_first.append(0, red, 0.2);
        near_first.append(0, blue, 0.6);

        let mut far_first = OitList::new(1, 8);
        far_first.append(0, blue, 0.6);
        far_first.append(0, red, 0.2);

        let a = near_first.resolve(0, bg);
        let b = far_first.resolve(0, bg);
        assert_eq!(a, b);
        // Blue is farther, so red lands on top of it.
        assert!((a.x - 0.5).abs() < 1e-6);
        assert!((a.z - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_overflow_is_dropped_and_counted() {
        let mut list = OitList::new(2, 3);
        let kept: Vec<bool> = (0..5).map(|i| list.append(i % 2, Vec4::ONE, 0.5)).collect();
        assert_eq!(kept, vec![true, true, true, false, false]);
        assert_eq!(list.dropped(), 2);
        assert_eq!(list.fragments_at(0).len() + list.fragments_at(1).len(), 3);

        list.clear();
        assert_eq!(list.dropped(), 0);
        assert_eq!(list.head(0), OIT_EMPTY);
    }

    #[test]
    fn test_dropped_fragments_saturates() {
        assert_eq!(dropped_fragments(10, 100), 0);
        assert_eq!(dropped_fragments(100, 100), 0);
        assert_eq!(dropped_fragments(150, 100), 50);
    }

    #[test]
    fn test_resolve_walks_at_most_max_fragments() {
        let bg = Vec4::new(0.0, 0.0, 0.0, 1.0);
        let mut list = OitList::new(1, 64);
        // The oldest fragment is opaque red and nearest; it falls off the end of the walk
        list.append(0, Vec4::new(1.0, 0.0, 0.0, 1.0), 0.01);
        for i in 0..MAX_FRAGMENTS_PER_PIXEL {
            list.append(0, Vec4::new(0.0, 0.0, 1.0, 0.5), 0.5 + i as f32 * 0.01);
        }
        assert_eq!(list.fragments_at(0).len(), MAX_FRAGMENTS_PER_PIXEL + 1);

        let out = list.resolve(0, bg);
        assert_eq!(out.x, 0.0);
        assert!(out.z > 0.99);
    }

    #[test]
    fn test_alpha_is_clamped() {
        let bg = Vec4::new(0.2, 0.2, 0.2, 1.0);
        let over = OitFragment {
            color: Vec4::new(1.0, 0.0, 0.0, 1.5),
            depth: 0.5,
            next: OIT_EMPTY,
        };
        let under = OitFragment {
            color: Vec4::new(1.0, 0.0, 0.0, -0.5),
            ..over
        };
        assert_eq!(composite_pixel(&[over], bg), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(composite_pixel(&[under], bg), bg);
    }
}
