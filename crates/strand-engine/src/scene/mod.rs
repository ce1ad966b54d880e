//! Scene content.
//!
//! Renderer-agnostic CPU data: opaque mesh shapes, one hair asset, their
//! textures and bounds. The render layer uploads it once through
//! `render::GpuScene`.

pub mod bounds;
pub mod fiber;
pub mod mesh;
pub mod obj;
pub mod procedural;
pub mod rng;
pub mod texture;

pub use bounds::{Aabb, BoundingSphere};
pub use fiber::FiberAsset;
pub use mesh::{Material, MeshShape};
pub use texture::TextureData;

use anyhow::Result;
use glam::Vec3;

use crate::config::AssetPaths;

#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub shapes: Vec<MeshShape>,
    pub fibers: Option<FiberAsset>,
}

impl Scene {
    /// Loads the configured assets; unconfigured parts stay empty.
    pub fn load(paths: &AssetPaths) -> Result<Self> {
        let shapes = match &paths.mesh {
            Some(p) => obj::load_obj(p)?,
            None => Vec::new(),
        };

        let fibers = match &paths.hair {
            Some(p) => {
                let base_color = paths
                    .hair_base_color
                    .as_deref()
                    .map(TextureData::load)
                    .transpose()?;
                let specular_offset = paths
                    .hair_specular_offset
                    .as_deref()
                    .map(TextureData::load)
                    .transpose()?;
                Some(FiberAsset::load_ind(p)?.with_textures(base_color, specular_offset))
            }
            None => None,
        };

        let scene = Self { shapes, fibers };
        scene.validate()?;
        Ok(scene)
    }

    /// Ground plane, a box casting a shadow and a patch of hair.
    pub fn procedural() -> Result<Self> {
        let scene = Self {
            shapes: vec![
                procedural::ground_plane(3.0, 6.0),
                procedural::cuboid(
                    Vec3::new(1.6, 0.4, -1.4),
                    Vec3::splat(0.4),
                    Vec3::new(0.55, 0.6, 0.75),
                ),
            ],
            fibers: Some(procedural::fibers_on_plane(64, 16, 1.0, 1.0)?),
        };
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> Result<()> {
        for shape in &self.shapes {
            shape.validate()?;
        }
        if let Some(f) = &self.fibers {
            f.validate()?;
        }
        Ok(())
    }

    /// Bounds of everything that casts or receives shadows.
    pub fn bounds(&self) -> Aabb {
        let mut b = self
            .shapes
            .iter()
            .fold(Aabb::EMPTY, |acc, s| acc.union(&s.bounds()));
        if let Some(f) = &self.fibers {
            b = b.union(&f.bounds());
        }
        b
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.fibers.is_none()
    }
}
