//! Two-slot rotating buffer

/// Two resources where one is "current" (last written, safe to read) and the other is the
/// write target for the next step. A single index bit selects the roles.
#[derive(Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    /// `first` starts out as current
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            current: 0,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// The slot the next step writes into
    pub fn next(&self) -> &T {
        &self.slots[self.current ^ 1]
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    pub fn next_mut(&mut self) -> &mut T {
        &mut self.slots[self.current ^ 1]
    }

    /// Promote the written slot to current
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_disjoint() {
        let pair = PingPong::new("a", "b");
        assert_eq!(*pair.current(), "a");
        assert_eq!(*pair.next(), "b");
    }

    #[test]
    fn test_even_swaps_restore_assignment() {
        let mut pair = PingPong::new(1, 2);
        for _ in 0..10 {
            pair.swap();
        }
        assert_eq!(pair.current_index(), 0);
        pair.swap();
        assert_eq!(pair.current_index(), 1);
        assert_eq!(*pair.current(), 2);
    }

    #[test]
    fn test_current_tracks_latest_write() {
        let mut pair = PingPong::new(0.0f32, 0.0f32);
        for step in 1..=5 {
            let prev = *pair.current();
            *pair.next_mut() = prev + step as f32;
            pair.swap();
            assert_eq!(*pair.current(), prev + step as f32);
        }
        assert_eq!(*pair.current(), 15.0);
    }
}
