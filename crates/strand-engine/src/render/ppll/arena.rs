//! CPU model of the fragment arena.
//!
//! Same layout and atomics as the GPU buffers: one head word per pixel, an
//! append counter and a fixed pool of nodes. `ppll_store.wgsl` follows
//! [`FragmentArena::append`] step for step.

use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};

/// End-of-list marker for head words and `next` links.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// One stored fragment, byte-compatible with `FragmentNode` in WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentNode {
    /// `f32` bits of the depth in [0, 1]; non-negative floats order like their bits.
    pub depth: u32,
    /// Straight-alpha RGBA8, red in the low byte.
    pub color: u32,
    pub next: u32,
}

impl FragmentNode {
    pub fn new(depth: f32, rgba: [f32; 4], next: u32) -> Self {
        Self {
            depth: depth.to_bits(),
            color: pack_unorm4x8(rgba),
            next,
        }
    }

    pub fn depth(&self) -> f32 {
        f32::from_bits(self.depth)
    }

    pub fn rgba(&self) -> [f32; 4] {
        unpack_unorm4x8(self.color)
    }

    /// Sort key: nearest first, ties broken by color so the order is total.
    pub fn key(&self) -> (u32, u32) {
        (self.depth, self.color)
    }
}

/// Matches WGSL `pack4x8unorm`.
pub fn pack_unorm4x8(rgba: [f32; 4]) -> u32 {
    rgba.iter().enumerate().fold(0u32, |acc, (i, c)| {
        let b = (c.clamp(0.0, 1.0) * 255.0 + 0.5).floor() as u32;
        acc | (b << (8 * i))
    })
}

/// Matches WGSL `unpack4x8unorm`.
pub fn unpack_unorm4x8(packed: u32) -> [f32; 4] {
    std::array::from_fn(|i| ((packed >> (8 * i)) & 0xff) as f32 / 255.0)
}

struct NodeSlot {
    depth: AtomicU32,
    color: AtomicU32,
    next: AtomicU32,
}

/// Per-pixel linked lists over a bounded node pool.
///
/// `append` is safe to call from many threads at once; `walk`/`list` must only
/// run after all appends finished, the same ordering the GPU gets from the
/// submission boundary between the store and blend passes.
pub struct FragmentArena {
    width: u32,
    height: u32,
    heads: Vec<AtomicU32>,
    counter: AtomicU32,
    nodes: Vec<NodeSlot>,
}

impl FragmentArena {
    pub fn new(width: u32, height: u32, capacity: u32) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            heads: (0..pixels).map(|_| AtomicU32::new(SENTINEL)).collect(),
            counter: AtomicU32::new(0),
            nodes: (0..capacity)
                .map(|_| NodeSlot {
                    depth: AtomicU32::new(0),
                    color: AtomicU32::new(0),
                    next: AtomicU32::new(SENTINEL),
                })
                .collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Resets every head to `SENTINEL` and the counter to zero.
    ///
    /// Node contents are left as they are; nothing reachable points at them.
    pub fn reset(&mut self) {
        for h in &mut self.heads {
            *h.get_mut() = SENTINEL;
        }
        *self.counter.get_mut() = 0;
    }

    /// Appends a fragment to the list of pixel `(x, y)`.
    ///
    /// Returns the node index, or `None` when the pool is exhausted. The counter
    /// still advances on overflow so the attempted total stays observable.
    pub fn append(&self, x: u32, y: u32, depth: f32, rgba: [f32; 4]) -> Option<u32> {
        debug_assert!(x < self.width && y < self.height);
        let slot = self.counter.fetch_add(1, Ordering::Relaxed);
        if slot >= self.capacity() {
            return None;
        }
        let pixel = (y * self.width + x) as usize;
        let prev = self.heads[pixel].swap(slot, Ordering::AcqRel);

        let node = &self.nodes[slot as usize];
        node.depth.store(depth.to_bits(), Ordering::Relaxed);
        node.color.store(pack_unorm4x8(rgba), Ordering::Relaxed);
        node.next.store(prev, Ordering::Relaxed);
        Some(slot)
    }

    /// Raw counter value; above `capacity()` when fragments were dropped.
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Number of nodes actually written.
    pub fn stored(&self) -> u32 {
        self.counter().min(self.capacity())
    }

    pub fn head(&self, x: u32, y: u32) -> u32 {
        self.heads[(y * self.width + x) as usize].load(Ordering::Acquire)
    }

    pub fn node(&self, index: u32) -> FragmentNode {
        let n = &self.nodes[index as usize];
        FragmentNode {
            depth: n.depth.load(Ordering::Relaxed),
            color: n.color.load(Ordering::Relaxed),
            next: n.next.load(Ordering::Relaxed),
        }
    }

    /// Walks the list of `(x, y)`, newest first, stopping after `capacity`
    /// steps even if a link is corrupt.
    pub fn walk(&self, x: u32, y: u32) -> impl Iterator<Item = FragmentNode> + '_ {
        let mut cursor = self.head(x, y);
        let mut steps = 0u32;
        std::iter::from_fn(move || {
            if cursor == SENTINEL || cursor >= self.capacity() || steps >= self.capacity() {
                return None;
            }
            steps += 1;
            let node = self.node(cursor);
            cursor = node.next;
            Some(node)
        })
    }

    pub fn list(&self, x: u32, y: u32) -> Vec<FragmentNode> {
        self.walk(x, y).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    const RED: [f32; 4] = [1.0, 0.0, 0.0, 0.5];

    // ── packing ───────────────────────────────────────────────────────────

    #[test]
    fn node_is_twelve_bytes() {
        assert_eq!(std::mem::size_of::<FragmentNode>(), 12);
    }

    #[test]
    fn unorm_packing_matches_wgsl_layout() {
        assert_eq!(pack_unorm4x8([1.0, 0.0, 0.0, 0.0]), 0x0000_00ff);
        assert_eq!(pack_unorm4x8([0.0, 0.0, 0.0, 1.0]), 0xff00_0000);
        assert_eq!(pack_unorm4x8([2.0, -1.0, 0.5, 1.0]), 0xff80_00ff);
        let back = unpack_unorm4x8(pack_unorm4x8([0.2, 0.4, 0.6, 0.8]));
        for (a, b) in back.iter().zip([0.2, 0.4, 0.6, 0.8]) {
            assert!((a - b).abs() <= 0.5 / 255.0 + 1e-6);
        }
    }

    #[test]
    fn depth_bits_order_like_depths() {
        let a = FragmentNode::new(0.25, RED, SENTINEL);
        let b = FragmentNode::new(0.75, RED, SENTINEL);
        assert!(a.key() < b.key());
        assert_eq!(a.depth(), 0.25);
    }

    // ── lists ─────────────────────────────────────────────────────────────

    #[test]
    fn fresh_arena_is_empty() {
        let a = FragmentArena::new(3, 2, 8);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(a.head(x, y), SENTINEL);
                assert!(a.list(x, y).is_empty());
            }
        }
        assert_eq!(a.counter(), 0);
    }

    #[test]
    fn single_fragment_per_pixel() {
        let a = FragmentArena::new(2, 2, 4);
        for y in 0..2 {
            for x in 0..2 {
                a.append(x, y, 0.1 * (x + 2 * y) as f32, RED).unwrap();
            }
        }
        for y in 0..2 {
            for x in 0..2 {
                let l = a.list(x, y);
                assert_eq!(l.len(), 1);
                assert_eq!(l[0].next, SENTINEL);
                assert_eq!(l[0].depth(), 0.1 * (x + 2 * y) as f32);
            }
        }
    }

    #[test]
    fn lists_are_newest_first() {
        let a = FragmentArena::new(1, 1, 4);
        for d in [0.1, 0.2, 0.3] {
            a.append(0, 0, d, RED);
        }
        let depths: Vec<f32> = a.walk(0, 0).map(|n| n.depth()).collect();
        assert_eq!(depths, vec![0.3, 0.2, 0.1]);
    }

    #[test]
    fn overflow_with_capacity_one() {
        let a = FragmentArena::new(2, 1, 1);
        assert_eq!(a.append(0, 0, 0.5, RED), Some(0));
        assert_eq!(a.append(1, 0, 0.5, RED), None);
        assert_eq!(a.append(0, 0, 0.4, RED), None);

        assert_eq!(a.counter(), 3);
        assert_eq!(a.stored(), 1);
        assert_eq!(a.list(0, 0).len(), 1);
        assert!(a.list(1, 0).is_empty());
    }

    #[test]
    fn walk_is_bounded_by_capacity() {
        let a = FragmentArena::new(1, 1, 2);
        a.append(0, 0, 0.1, RED);
        a.append(0, 0, 0.2, RED);
        // Corrupt the oldest link into a cycle.
        a.nodes[0].next.store(1, Ordering::Relaxed);
        assert_eq!(a.walk(0, 0).count(), 2);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut a = FragmentArena::new(2, 2, 8);
        a.append(1, 1, 0.3, RED);
        a.reset();
        let once: Vec<u32> = (0..4).map(|i| a.head(i % 2, i / 2)).collect();
        a.reset();
        let twice: Vec<u32> = (0..4).map(|i| a.head(i % 2, i / 2)).collect();
        assert_eq!(once, twice);
        assert!(once.iter().all(|&h| h == SENTINEL));
        assert_eq!(a.counter(), 0);
    }

    // ── concurrency ───────────────────────────────────────────────────────

    #[test]
    fn concurrent_appends_keep_lists_disjoint() {
        const THREADS: u32 = 8;
        const PER_THREAD: u32 = 200;
        let arena = Arc::new(FragmentArena::new(4, 4, THREADS * PER_THREAD / 2));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let arena = Arc::clone(&arena);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let p = (t * 7 + i) % 16;
                        arena.append(p % 4, p / 4, (i as f32) / PER_THREAD as f32, RED);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(arena.counter(), THREADS * PER_THREAD);
        assert_eq!(arena.stored(), arena.capacity());

        let mut seen = HashSet::new();
        let mut total = 0;
        for y in 0..4 {
            for x in 0..4 {
                let mut cursor = arena.head(x, y);
                while cursor != SENTINEL {
                    assert!(cursor < arena.capacity());
                    assert!(seen.insert(cursor), "node {cursor} reachable twice");
                    cursor = arena.node(cursor).next;
                    total += 1;
                }
            }
        }
        assert_eq!(total, arena.capacity());
    }
}
