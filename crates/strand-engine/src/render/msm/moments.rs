//! Optimized four-moment encoding and Hamburger reconstruction.
//!
//! Moments `[z, z², z³, z⁴]` are rotated by a fixed matrix so they survive
//! 16-bit float storage (Peters and Klein 2015, "Moment Shadow Mapping").
//! `msm_common.wgsl` carries the same constants and functions.

use glam::{Mat4, Vec4};

/// Added to the first optimized moment after the rotation.
pub const MOMENT_OFFSET: f32 = 0.035955884801;

/// Target the raw moments are pulled toward by the moment bias.
pub const BIAS_TARGET: Vec4 = Vec4::new(0.0, 0.63, 0.0, 0.63);

/// Rows of the encoding matrix: `m_j = Σ_i b_i * ENCODE[i][j]`.
pub const ENCODE: [[f32; 4]; 4] = [
    [-2.07224649, 13.7948857237, 0.105877704, 9.7924062118],
    [32.23703778, -59.4683975703, -1.9077466311, -33.7652110555],
    [-68.571074599, 82.0359750338, 9.3496555107, 47.9456096605],
    [39.3703274134, -35.364903257, -6.6543490743, -23.9728048165],
];

/// Rows of the exact inverse of [`ENCODE`].
pub const DECODE: [[f32; 4]; 4] = [
    [0.2227744146, 0.1549679261, 0.1451988946, 0.163127443],
    [0.0771972861, 0.1394629426, 0.2120202157, 0.2591432266],
    [0.7926986636, 0.7963415838, 0.7258694464, 0.6539092497],
    [0.0319417555, -0.1722823173, -0.2758014811, -0.3376131734],
];

/// Row-vector product `v * M` with `M` given by rows.
fn row_mul(v: Vec4, rows: &[[f32; 4]; 4]) -> Vec4 {
    // Rows as columns of a glam matrix turn `M * v` into the row-vector product.
    Mat4::from_cols_array_2d(rows) * v
}

/// Optimized moments of one depth sample in [0, 1].
pub fn encode(depth: f32) -> Vec4 {
    let z2 = depth * depth;
    let b = Vec4::new(depth, z2, z2 * depth, z2 * z2);
    let mut m = row_mul(b, &ENCODE);
    m.x += MOMENT_OFFSET;
    m
}

/// Raw moments `[E[z], E[z²], E[z³], E[z⁴]]` from optimized ones.
pub fn decode(moments: Vec4) -> Vec4 {
    let mut m = moments;
    m.x -= MOMENT_OFFSET;
    row_mul(m, &DECODE)
}

/// Texel the moment target is cleared to: a fully lit far plane.
pub fn clear_value() -> Vec4 {
    encode(1.0)
}

/// Fraction of light blocked at `depth` according to the filtered `moments`.
///
/// 0 is fully lit, 1 fully shadowed. `moment_bias` trades light leaking for
/// numerical robustness; `depth_bias` is subtracted from the receiver depth.
pub fn shadow_intensity(moments: Vec4, depth: f32, depth_bias: f32, moment_bias: f32) -> f32 {
    let b = decode(moments).lerp(BIAS_TARGET, moment_bias);
    let z0 = depth - depth_bias;

    // Cholesky factorization of the Hankel matrix.
    let l32_d22 = -b.x * b.y + b.z;
    let d22 = -b.x * b.x + b.y;
    let squared_depth_variance = -b.y * b.y + b.w;
    let d33_d22 = squared_depth_variance * d22 - l32_d22 * l32_d22;
    let inv_d22 = 1.0 / d22;
    let l32 = l32_d22 * inv_d22;

    // Solve for the quadratic whose roots are the support points.
    let mut c = [1.0, z0, z0 * z0];
    c[1] -= b.x;
    c[2] -= b.y + l32 * c[1];
    c[1] *= inv_d22;
    c[2] *= d22 / d33_d22;
    c[1] -= l32 * c[2];
    c[0] -= c[1] * b.x + c[2] * b.y;

    let p = c[1] / c[2];
    let q = c[0] / c[2];
    let r = (p * p * 0.25 - q).max(0.0).sqrt();
    let z1 = -p * 0.5 - r;
    let z2 = -p * 0.5 + r;

    let switch = if z2 < z0 {
        [z1, z0, 1.0, 1.0]
    } else if z1 < z0 {
        [z0, z1, 0.0, 1.0]
    } else {
        [0.0; 4]
    };
    let quotient =
        (switch[0] * z2 - b.x * (switch[0] + z2) + b.y) / ((z2 - switch[1]) * (z0 - z1));
    (switch[2] + switch[3] * quotient).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOMENT_BIAS: f32 = 6e-5;

    // ── matrices ──────────────────────────────────────────────────────────

    #[test]
    fn decode_matrix_inverts_encode_matrix() {
        for i in 0..4 {
            for j in 0..4 {
                let v: f32 = (0..4).map(|k| ENCODE[i][k] * DECODE[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-5, "E*D[{i}][{j}] = {v}");
            }
        }
    }

    #[test]
    fn clear_value_is_far_plane() {
        let c = clear_value();
        assert!((c.x - 1.0).abs() < 1e-4);
        assert!((c.y - 0.99756).abs() < 1e-4);
        assert!((c.z - 0.89344).abs() < 1e-4);
        assert!(c.w.abs() < 1e-4);
    }

    #[test]
    fn zero_depth_is_offset_only() {
        assert_eq!(encode(0.0), Vec4::new(MOMENT_OFFSET, 0.0, 0.0, 0.0));
    }

    // ── round trip ────────────────────────────────────────────────────────

    #[test]
    fn moments_round_trip_on_unit_interval() {
        for i in 0..=100 {
            let z = i as f32 / 100.0;
            let b = decode(encode(z));
            let z2 = z * z;
            let expected = Vec4::new(z, z2, z2 * z, z2 * z2);
            assert!((b - expected).abs().max_element() < 1e-3, "z = {z}: {b:?}");
        }
    }

    // ── reconstruction ────────────────────────────────────────────────────

    #[test]
    fn receiver_in_front_of_occluder_is_lit() {
        let m = encode(0.5);
        for d in [0.1, 0.3, 0.45] {
            assert!(shadow_intensity(m, d, 0.0, MOMENT_BIAS) < 0.05, "depth {d}");
        }
    }

    #[test]
    fn receiver_behind_occluder_is_shadowed() {
        let m = encode(0.3);
        for d in [0.4, 0.6, 1.0] {
            assert!(shadow_intensity(m, d, 0.0, MOMENT_BIAS) > 0.95, "depth {d}");
        }
    }

    #[test]
    fn cleared_map_casts_no_shadow() {
        let m = clear_value();
        for d in [0.0, 0.5, 0.99] {
            assert!(shadow_intensity(m, d, 0.0, MOMENT_BIAS) < 0.01);
        }
    }

    #[test]
    fn half_covered_texel_gives_partial_shadow() {
        let m = (encode(0.3) + encode(1.0)) * 0.5;
        let s = shadow_intensity(m, 0.9, 0.0, MOMENT_BIAS);
        assert!((0.4..=0.6).contains(&s), "got {s}");
    }

    #[test]
    fn depth_bias_pulls_receiver_forward() {
        let m = encode(0.3);
        assert!(shadow_intensity(m, 0.35, 0.0, MOMENT_BIAS) > 0.9);
        assert!(shadow_intensity(m, 0.35, 0.1, MOMENT_BIAS) < 0.05);
    }
}
