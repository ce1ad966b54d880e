//! CPU model of the blend pass.
//!
//! The `K_NEAREST` closest fragments are kept sorted and composited exactly,
//! back to front. Everything farther away is folded into an order-independent
//! tail (weighted average color, product of transmittances) that sits behind
//! them. `ppll_blend.wgsl` is a transcription of [`resolve`].

use super::arena::FragmentNode;

/// Fragments composited in exact depth order per pixel.
pub const K_NEAREST: usize = 16;

/// Premultiplied RGBA produced for one pixel.
pub type Premul = [f32; 4];

#[derive(Debug, Default, Clone, Copy)]
struct Tail {
    /// Sum of straight color weighted by alpha.
    weighted: [f32; 3],
    alpha_sum: f32,
    transmittance: f32,
}

impl Tail {
    fn new() -> Self {
        Self {
            transmittance: 1.0,
            ..Self::default()
        }
    }

    fn add(&mut self, rgba: [f32; 4]) {
        let a = rgba[3];
        for c in 0..3 {
            self.weighted[c] += rgba[c] * a;
        }
        self.alpha_sum += a;
        self.transmittance *= 1.0 - a;
    }

    fn premul(&self) -> Premul {
        let coverage = 1.0 - self.transmittance;
        if self.alpha_sum <= 1e-6 {
            return [0.0; 4];
        }
        let k = coverage / self.alpha_sum;
        [
            self.weighted[0] * k,
            self.weighted[1] * k,
            self.weighted[2] * k,
            coverage,
        ]
    }
}

/// Blends one pixel's fragments into a premultiplied color.
///
/// The result does not depend on the order `nodes` yields fragments in, up to
/// float rounding inside the tail. An empty list yields `[0; 4]`.
pub fn resolve<I>(nodes: I) -> Premul
where
    I: IntoIterator<Item = FragmentNode>,
{
    let mut near = [FragmentNode {
        depth: 0,
        color: 0,
        next: 0,
    }; K_NEAREST];
    let mut count = 0usize;
    let mut tail = Tail::new();

    for node in nodes {
        let evicted = if count < K_NEAREST {
            count += 1;
            None
        } else if node.key() < near[K_NEAREST - 1].key() {
            Some(near[K_NEAREST - 1])
        } else {
            tail.add(node.rgba());
            continue;
        };

        // Insertion into the sorted prefix.
        let mut j = count - 1;
        while j > 0 && near[j - 1].key() > node.key() {
            near[j] = near[j - 1];
            j -= 1;
        }
        near[j] = node;

        if let Some(e) = evicted {
            tail.add(e.rgba());
        }
    }

    let mut out = tail.premul();
    for node in near[..count].iter().rev() {
        out = over(straight_to_premul(node.rgba()), out);
    }
    out
}

fn straight_to_premul(c: [f32; 4]) -> Premul {
    [c[0] * c[3], c[1] * c[3], c[2] * c[3], c[3]]
}

/// `src` over `dst`, both premultiplied.
pub fn over(src: Premul, dst: Premul) -> Premul {
    let k = 1.0 - src[3];
    std::array::from_fn(|i| src[i] + dst[i] * k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ppll::arena::{FragmentArena, SENTINEL};
    use crate::scene::rng::Pcg32;

    fn node(depth: f32, rgba: [f32; 4]) -> FragmentNode {
        FragmentNode::new(depth, rgba, SENTINEL)
    }

    fn close(a: Premul, b: Premul, eps: f32) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= eps)
    }

    fn shuffle(v: &mut [FragmentNode], rng: &mut Pcg32) {
        for i in (1..v.len()).rev() {
            let j = rng.range_inclusive(0, i as u32) as usize;
            v.swap(i, j);
        }
    }

    // ── scenarios ─────────────────────────────────────────────────────────

    #[test]
    fn empty_list_is_transparent() {
        assert_eq!(resolve(std::iter::empty()), [0.0; 4]);
    }

    #[test]
    fn single_fragment_is_premultiplied() {
        let n = node(0.5, [1.0, 0.0, 0.0, 0.6]);
        let c = n.rgba();
        let out = resolve([n]);
        assert!(close(out, [c[3], 0.0, 0.0, c[3]], 1e-6));
    }

    #[test]
    fn nearest_fragment_ends_on_top() {
        let near = node(0.2, [1.0, 0.0, 0.0, 1.0]);
        let far = node(0.8, [0.0, 0.0, 1.0, 1.0]);
        assert!(close(resolve([far, near]), [1.0, 0.0, 0.0, 1.0], 1e-6));
        assert!(close(resolve([near, far]), [1.0, 0.0, 0.0, 1.0], 1e-6));
    }

    #[test]
    fn two_layers_match_over_operator() {
        let front = node(0.1, [1.0, 1.0, 1.0, 0.5]);
        let back = node(0.9, [0.0, 0.0, 1.0, 0.5]);
        let f = straight_to_premul(front.rgba());
        let b = straight_to_premul(back.rgba());
        let expected = over(f, b);
        assert!(close(resolve([back, front]), expected, 1e-6));
    }

    // ── order independence ────────────────────────────────────────────────

    #[test]
    fn result_does_not_depend_on_arrival_order() {
        let mut rng = Pcg32::new(7);
        let mut nodes: Vec<FragmentNode> = (0..40)
            .map(|_| {
                node(
                    rng.unit_f32(),
                    [rng.unit_f32(), rng.unit_f32(), rng.unit_f32(), 0.1 + 0.4 * rng.unit_f32()],
                )
            })
            .collect();

        let reference = resolve(nodes.iter().copied());
        for _ in 0..10 {
            shuffle(&mut nodes, &mut rng);
            assert!(close(resolve(nodes.iter().copied()), reference, 1e-5));
        }
    }

    #[test]
    fn equal_depths_are_ordered_by_color() {
        let a = node(0.5, [1.0, 0.0, 0.0, 0.5]);
        let b = node(0.5, [0.0, 1.0, 0.0, 0.5]);
        assert_eq!(resolve([a, b]), resolve([b, a]));
    }

    #[test]
    fn tail_sits_behind_the_nearest_layers() {
        let mut nodes = vec![node(0.9, [0.0, 0.0, 1.0, 1.0])];
        nodes.extend((0..K_NEAREST).map(|i| node(0.1 + 0.01 * i as f32, [1.0, 0.0, 0.0, 0.1])));
        let out = resolve(nodes.iter().copied());

        // The opaque blue fragment is beyond the K nearest, so it is the tail,
        // and the 16 faint red layers cover it.
        let t = (1.0 - nodes[1].rgba()[3]).powi(K_NEAREST as i32);
        assert!((out[3] - 1.0).abs() < 1e-5);
        assert!((out[2] - t).abs() < 1e-4);
        assert!(out[0] > 0.7);
    }

    #[test]
    fn all_fragments_contribute_coverage() {
        let nodes: Vec<_> = (0..3 * K_NEAREST)
            .map(|i| node(i as f32 / 64.0, [0.5, 0.5, 0.5, 0.25]))
            .collect();
        let out = resolve(nodes);
        let expected = 1.0 - 0.75f32.powi(3 * K_NEAREST as i32);
        assert!((out[3] - expected).abs() < 1e-4);
    }

    // ── arena integration ─────────────────────────────────────────────────

    #[test]
    fn resolves_arena_lists() {
        let arena = FragmentArena::new(2, 1, 1);
        arena.append(0, 0, 0.5, [0.0, 1.0, 0.0, 1.0]);
        arena.append(1, 0, 0.5, [0.0, 1.0, 0.0, 1.0]);

        assert!(close(resolve(arena.walk(0, 0)), [0.0, 1.0, 0.0, 1.0], 1e-6));
        // Dropped by the capacity, so the pixel stays untouched.
        assert_eq!(resolve(arena.walk(1, 0)), [0.0; 4]);
    }
}
