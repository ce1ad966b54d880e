//! Built-in content used when no assets are configured.

use std::sync::Arc;

use anyhow::Result;
use glam::{Vec2, Vec3};

use super::fiber::FiberAsset;
use super::mesh::{Material, MeshShape};
use super::rng::Pcg32;
use super::texture::TextureData;

/// Square in the `y = 0` plane facing +Y, `half` units from the origin on each side.
pub fn ground_plane(half: f32, texture_repeats: f32) -> MeshShape {
    let corners = [
        Vec3::new(-half, 0.0, -half),
        Vec3::new(-half, 0.0, half),
        Vec3::new(half, 0.0, half),
        Vec3::new(half, 0.0, -half),
    ];
    let uv = [
        Vec2::new(0.0, texture_repeats),
        Vec2::new(0.0, 0.0),
        Vec2::new(texture_repeats, 0.0),
        Vec2::new(texture_repeats, texture_repeats),
    ];

    let mut positions = Vec::with_capacity(6);
    let mut texcoords = Vec::with_capacity(6);
    for i in [0, 1, 2, 0, 2, 3] {
        positions.push(corners[i]);
        texcoords.push(uv[i]);
    }

    MeshShape {
        name: "ground".to_string(),
        normals: vec![Vec3::Y; positions.len()],
        positions,
        texcoords,
        material: Material {
            name: "ground".to_string(),
            diffuse: Vec3::splat(0.9),
            diffuse_map: Some(Arc::new(TextureData::checker(
                64,
                2,
                [235, 235, 235, 255],
                [190, 190, 190, 255],
            ))),
            alpha_map: None,
        },
    }
}

/// Axis-aligned box with flat normals.
pub fn cuboid(center: Vec3, half: Vec3, diffuse: Vec3) -> MeshShape {
    // (normal, tangent u, tangent v) per face; u x v = normal.
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut positions = Vec::with_capacity(36);
    let mut normals = Vec::with_capacity(36);
    let mut texcoords = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let quad = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for i in [0, 1, 2, 0, 2, 3] {
            let (a, b) = quad[i];
            positions.push(center + (n + u * a + v * b) * half);
            normals.push(n);
            texcoords.push(Vec2::new((a + 1.0) * 0.5, (b + 1.0) * 0.5));
        }
    }

    MeshShape {
        name: "box".to_string(),
        positions,
        normals,
        texcoords,
        material: Material {
            name: "box".to_string(),
            diffuse,
            diffuse_map: None,
            alpha_map: None,
        },
    }
}

/// Grid of `rows * rows` wavy strands rooted in the `[-extent, extent]` square
/// of the `y = 0` plane, each with `verts` vertices and roughly `height` tall.
pub fn fibers_on_plane(rows: u32, verts: u32, extent: f32, height: f32) -> Result<FiberAsset> {
    let mut rng = Pcg32::new(Pcg32::FIBER_SEED ^ 0x5eed);
    let rows = rows.max(1);
    let verts = verts.max(2);
    let cell = 2.0 * extent / rows as f32;

    let mut strands = Vec::with_capacity((rows * rows) as usize);
    for iz in 0..rows {
        for ix in 0..rows {
            let root = Vec3::new(
                -extent + (ix as f32 + rng.unit_f32()) * cell,
                0.0,
                -extent + (iz as f32 + rng.unit_f32()) * cell,
            );
            let phase = rng.unit_f32() * std::f32::consts::TAU;
            let lean = Vec3::new(rng.unit_f32() - 0.5, 0.0, rng.unit_f32() - 0.5) * 0.4;
            let len = height * (0.75 + 0.5 * rng.unit_f32());

            let strand = (0..verts)
                .map(|i| {
                    let t = i as f32 / (verts - 1) as f32;
                    let sway = Vec3::new((phase + 6.0 * t).sin(), 0.0, (phase + 6.0 * t).cos());
                    root + Vec3::Y * (len * t) + (lean + sway * 0.05) * t * len
                })
                .collect();
            strands.push(strand);
        }
    }

    FiberAsset::from_strands(&strands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_plane_faces_up() {
        let g = ground_plane(2.0, 4.0);
        g.validate().unwrap();
        assert_eq!(g.vertex_count(), 6);
        let p = &g.positions;
        let n = (p[1] - p[0]).cross(p[2] - p[0]).normalize();
        assert!((n - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn cuboid_winding_matches_normals() {
        let b = cuboid(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.5), Vec3::ONE);
        b.validate().unwrap();
        assert_eq!(b.vertex_count(), 36);
        for (tri, n) in b.positions.chunks_exact(3).zip(b.normals.chunks_exact(3)) {
            let geo = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize();
            assert!((geo - n[0]).length() < 1e-5);
        }
        let bounds = b.bounds();
        assert_eq!(bounds.min, Vec3::new(0.5, 1.5, 2.5));
        assert_eq!(bounds.max, Vec3::new(1.5, 2.5, 3.5));
    }

    #[test]
    fn fibers_are_rooted_on_the_plane() {
        let f = fibers_on_plane(4, 8, 1.0, 1.0).unwrap();
        assert_eq!(f.fiber_count(), 16);
        assert_eq!(f.vertex_count(), 128);
        for (i, root) in f.positions.iter().step_by(8).enumerate() {
            assert_eq!(root.y, 0.0, "fiber {i}");
            assert!(root.x.abs() <= 1.0 && root.z.abs() <= 1.0);
        }
        let b = f.bounds();
        assert!(b.max.y > 0.5);
    }
}
