use std::sync::Arc;

use anyhow::{ensure, Result};
use glam::{Vec2, Vec3};

use super::bounds::Aabb;
use super::texture::TextureData;

/// Surface description of one mesh blob.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    /// Diffuse color multiplied with `diffuse_map`.
    pub diffuse: Vec3,
    pub diffuse_map: Option<Arc<TextureData>>,
    /// Cutout mask; the red channel is the coverage.
    pub alpha_map: Option<Arc<TextureData>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: Vec3::splat(0.8),
            diffuse_map: None,
            alpha_map: None,
        }
    }
}

/// Non-indexed triangle list with one material.
///
/// All three streams are per vertex and have the same length, a multiple of 3.
#[derive(Debug, Clone)]
pub struct MeshShape {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub material: Material,
}

impl MeshShape {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Shapes with an alpha mask are drawn with the cutout pipeline.
    pub fn is_cutout(&self) -> bool {
        self.material.alpha_map.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        ensure!(
            n % 3 == 0,
            "mesh {:?}: {n} positions do not form whole triangles",
            self.name
        );
        ensure!(
            self.normals.len() == n,
            "mesh {:?}: {} normals for {n} positions",
            self.name,
            self.normals.len()
        );
        ensure!(
            self.texcoords.len() == n,
            "mesh {:?}: {} texcoords for {n} positions",
            self.name,
            self.texcoords.len()
        );
        Ok(())
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshShape {
        MeshShape {
            name: "tri".to_string(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            texcoords: vec![Vec2::ZERO; 3],
            material: Material::default(),
        }
    }

    #[test]
    fn complete_triangle_validates() {
        triangle().validate().unwrap();
    }

    #[test]
    fn short_normal_stream_is_named() {
        let mut m = triangle();
        m.normals.pop();
        let err = m.validate().unwrap_err();
        assert!(err.to_string().contains("normals"));
    }

    #[test]
    fn partial_triangle_rejected() {
        let mut m = triangle();
        m.positions.push(Vec3::ONE);
        m.normals.push(Vec3::Z);
        m.texcoords.push(Vec2::ZERO);
        assert!(m.validate().is_err());
    }

    #[test]
    fn cutout_follows_alpha_map() {
        let mut m = triangle();
        assert!(!m.is_cutout());
        m.material.alpha_map = Some(Arc::new(TextureData::solid([255; 4])));
        assert!(m.is_cutout());
    }
}
