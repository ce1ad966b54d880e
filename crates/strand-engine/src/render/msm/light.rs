use glam::{Mat4, Vec3};

use crate::scene::Aabb;

/// Directional light framed around the scene.
///
/// Orthographic, centered on the bounding sphere and exactly `[-r, r]` wide;
/// near and far planes enclose the sphere. The shadow pass and every consumer
/// of the shadow map must use the same frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightFrame {
    /// Unit direction the light travels in.
    pub direction: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
}

impl LightFrame {
    pub fn fit(bounds: &Aabb, direction: Vec3) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let sphere = bounds.bounding_sphere();
        let r = sphere.radius.max(1e-3);

        let eye = sphere.center - direction * (2.0 * r);
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(eye, sphere.center, up);
        let proj = Mat4::orthographic_rh(-r, r, -r, r, r, 3.0 * r);

        Self {
            direction,
            view,
            proj,
            view_proj: proj * view,
        }
    }
}
