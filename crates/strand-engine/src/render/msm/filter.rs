//! Gaussian kernel for the moment filter plus CPU reference convolutions.

use glam::Vec4;

use crate::config::MAX_FILTER_RADIUS;

/// Taps stored per kernel: the center plus up to `MAX_FILTER_RADIUS` on each side.
pub const MAX_TAPS: usize = MAX_FILTER_RADIUS as usize + 1;

/// Symmetric, normalized 1D Gaussian. `weights[i]` applies at offsets `±i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    pub radius: u32,
    pub weights: [f32; MAX_TAPS],
}

impl Kernel {
    /// Gaussian with `sigma = radius / 2`, clamped to `MAX_FILTER_RADIUS`.
    pub fn gaussian(radius: u32) -> Self {
        let radius = radius.min(MAX_FILTER_RADIUS);
        let mut weights = [0.0; MAX_TAPS];
        if radius == 0 {
            weights[0] = 1.0;
            return Self { radius, weights };
        }

        let sigma = radius as f32 * 0.5;
        let denom = 2.0 * sigma * sigma;
        for (i, w) in weights.iter_mut().enumerate().take(radius as usize + 1) {
            *w = (-((i * i) as f32) / denom).exp();
        }
        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        for w in &mut weights {
            *w /= total;
        }
        Self { radius, weights }
    }

    /// Weight at signed offset `d`.
    pub fn weight(&self, d: i32) -> f32 {
        let i = d.unsigned_abs();
        if i > self.radius {
            0.0
        } else {
            self.weights[i as usize]
        }
    }

    /// Weights packed as the `array<vec4<f32>, 4>` the filter shader reads.
    pub fn packed(&self) -> [[f32; 4]; 4] {
        std::array::from_fn(|i| std::array::from_fn(|j| self.weights[i * 4 + j]))
    }
}

fn clamped(v: i64, len: u32) -> usize {
    v.clamp(0, i64::from(len) - 1) as usize
}

/// One 1D pass with clamp-to-edge addressing; `direction` is `(1, 0)` or `(0, 1)`.
pub fn convolve_1d(
    src: &[Vec4],
    width: u32,
    height: u32,
    kernel: &Kernel,
    direction: (i32, i32),
) -> Vec<Vec4> {
    debug_assert_eq!(src.len(), width as usize * height as usize);
    let r = kernel.radius as i32;
    let mut out = Vec::with_capacity(src.len());
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut acc = Vec4::ZERO;
            for d in -r..=r {
                let sx = clamped(x + i64::from(d * direction.0), width);
                let sy = clamped(y + i64::from(d * direction.1), height);
                acc += src[sy * width as usize + sx] * kernel.weight(d);
            }
            out.push(acc);
        }
    }
    out
}

/// Horizontal then vertical pass, the order the GPU filter runs in.
pub fn convolve_separable(src: &[Vec4], width: u32, height: u32, kernel: &Kernel) -> Vec<Vec4> {
    let tmp = convolve_1d(src, width, height, kernel, (1, 0));
    convolve_1d(&tmp, width, height, kernel, (0, 1))
}

/// Direct 2D convolution with the outer-product kernel.
pub fn convolve_2d(src: &[Vec4], width: u32, height: u32, kernel: &Kernel) -> Vec<Vec4> {
    let r = kernel.radius as i32;
    let mut out = Vec::with_capacity(src.len());
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut acc = Vec4::ZERO;
            for dy in -r..=r {
                let sy = clamped(y + i64::from(dy), height);
                for dx in -r..=r {
                    let sx = clamped(x + i64::from(dx), width);
                    acc += src[sy * width as usize + sx] * (kernel.weight(dx) * kernel.weight(dy));
                }
            }
            out.push(acc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::msm::moments;
    use crate::scene::rng::Pcg32;

    fn noise(width: u32, height: u32) -> Vec<Vec4> {
        let mut rng = Pcg32::new(11);
        (0..width * height)
            .map(|_| moments::encode(rng.unit_f32()))
            .collect()
    }

    // ── kernel ────────────────────────────────────────────────────────────

    #[test]
    fn kernel_is_normalized() {
        for r in [0, 1, 4, 15] {
            let k = Kernel::gaussian(r);
            let total: f32 = (-(r as i32)..=r as i32).map(|d| k.weight(d)).sum();
            assert!((total - 1.0).abs() < 1e-5, "radius {r}: {total}");
        }
    }

    #[test]
    fn kernel_radius_is_clamped() {
        let k = Kernel::gaussian(40);
        assert_eq!(k.radius, MAX_FILTER_RADIUS);
        assert_eq!(k.weight(MAX_FILTER_RADIUS as i32 + 1), 0.0);
    }

    #[test]
    fn kernel_decreases_away_from_center() {
        let k = Kernel::gaussian(6);
        for i in 0..6 {
            assert!(k.weights[i] > k.weights[i + 1]);
        }
        assert_eq!(k.weights[7], 0.0);
    }

    #[test]
    fn packed_layout_is_row_major() {
        let k = Kernel::gaussian(15);
        let p = k.packed();
        assert_eq!(p[0][0], k.weights[0]);
        assert_eq!(p[1][2], k.weights[6]);
        assert_eq!(p[3][3], k.weights[15]);
    }

    // ── convolution ───────────────────────────────────────────────────────

    #[test]
    fn separable_filter_matches_2d_filter() {
        let (w, h) = (13, 9);
        let src = noise(w, h);
        let k = Kernel::gaussian(4);
        let a = convolve_separable(&src, w, h, &k);
        let b = convolve_2d(&src, w, h, &k);
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((*x - *y).abs().max_element() < 1e-4, "texel {i}: {x:?} vs {y:?}");
        }
    }

    #[test]
    fn constant_field_is_preserved() {
        let c = moments::clear_value();
        let src = vec![c; 8 * 8];
        let out = convolve_separable(&src, 8, 8, &Kernel::gaussian(5));
        for v in out {
            assert!((v - c).abs().max_element() < 1e-5);
        }
    }

    #[test]
    fn zero_radius_is_identity() {
        let src = noise(5, 4);
        assert_eq!(convolve_separable(&src, 5, 4, &Kernel::gaussian(0)), src);
    }
}
