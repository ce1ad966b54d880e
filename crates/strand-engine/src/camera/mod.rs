//! Cameras.
//!
//! Both cameras produce right-handed view matrices and wgpu-style projections
//! (depth in [0, 1]). Cursor coordinates are physical pixels with a top-left
//! origin, exactly as the input layer reports them.

mod arcball;
mod wander;

pub use arcball::ArcballCamera;
pub use wander::WanderCamera;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::config::{CameraConfig, CameraMode};

/// Camera contract consumed by the frame orchestrator.
pub trait Camera {
    /// Eye position in world space.
    fn position(&self) -> Vec3;

    fn projection(&self) -> Mat4;

    fn view(&self) -> Mat4;

    fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// Camera-specific zoom (field of view or dolly).
    fn zoom(&mut self, amount: f32);

    /// Drives a drag gesture. `None` ends the gesture.
    fn track(&mut self, cursor: Option<Vec2>);

    /// Updates the viewport the cursor is interpreted against.
    fn resize(&mut self, width: u32, height: u32);

    /// Drops accumulated rotation and zoom.
    fn reset(&mut self);
}

/// Builds the configured camera for a `width` x `height` viewport.
pub fn from_config(cfg: &CameraConfig, width: u32, height: u32) -> Box<dyn Camera> {
    let position = Vec3::from_array(cfg.position);
    let target = Vec3::from_array(cfg.target);
    let fov_y = cfg.fov_y_degrees.to_radians();
    match cfg.mode {
        CameraMode::Arcball => Box::new(ArcballCamera::new(position, target, width, height, fov_y)),
        CameraMode::Wander => Box::new(WanderCamera::new(position, target, width, height, fov_y)),
    }
}

/// Cursor movement below this distance on the unit sphere is ignored.
const TRACK_EPS: f32 = 1e-4;

/// Window coordinates (bottom-left origin, depth in [0, 1]) back to world space.
pub(crate) fn unproject(win: Vec3, view: Mat4, proj: Mat4, width: u32, height: u32) -> Vec3 {
    let ndc = Vec4::new(
        2.0 * win.x / width.max(1) as f32 - 1.0,
        2.0 * win.y / height.max(1) as f32 - 1.0,
        win.z,
        1.0,
    );
    let world = (proj * view).inverse() * ndc;
    world.truncate() / world.w
}

fn in_viewport(cursor: Vec2, width: u32, height: u32) -> bool {
    cursor.x >= 0.0 && cursor.y >= 0.0 && cursor.x <= width as f32 && cursor.y <= height as f32
}

fn aspect(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}
