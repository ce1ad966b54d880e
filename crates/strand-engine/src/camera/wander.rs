use glam::{Mat4, Quat, Vec2, Vec3};

use super::{aspect, in_viewport, unproject, Camera, TRACK_EPS};

/// First-person camera: dragging turns the view direction, zoom dollies
/// along it.
#[derive(Debug, Clone)]
pub struct WanderCamera {
    position: Vec3,
    initial_position: Vec3,
    dir: Vec3,
    up: Vec3,
    fov_y: f32,
    width: u32,
    height: u32,

    rot: Quat,
    rot_prev: Quat,
    tracking: bool,
    hit_prev: Vec3,
}

impl WanderCamera {
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 100.0;

    pub fn new(position: Vec3, spot: Vec3, width: u32, height: u32, fov_y: f32) -> Self {
        Self {
            position,
            initial_position: position,
            dir: (spot - position).try_normalize().unwrap_or(Vec3::NEG_Z),
            up: Vec3::Y,
            fov_y,
            width,
            height,
            rot: Quat::IDENTITY,
            rot_prev: Quat::IDENTITY,
            tracking: false,
            hit_prev: Vec3::ZERO,
        }
    }

    /// Current view direction.
    pub fn forward(&self) -> Vec3 {
        self.rot.normalize() * self.dir
    }

    /// Direction through the cursor, relative to the orientation at drag start.
    fn intersect(&self, cursor: Vec2) -> Vec3 {
        let win = Vec3::new(cursor.x, self.height as f32 - 1.0 - cursor.y, 0.0);
        let view = Mat4::look_at_rh(
            self.position,
            self.position + self.rot_prev.normalize() * self.dir,
            self.up,
        );
        let on_near = unproject(win, view, self.projection(), self.width, self.height);
        (on_near - self.position).normalize()
    }
}

impl Camera for WanderCamera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect(self.width, self.height), Self::NEAR, Self::FAR)
    }

    fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), self.up)
    }

    fn zoom(&mut self, amount: f32) {
        self.position += self.forward() * amount;
    }

    fn track(&mut self, cursor: Option<Vec2>) {
        let Some(cursor) = cursor.filter(|c| in_viewport(*c, self.width, self.height)) else {
            self.rot_prev = self.rot;
            self.tracking = false;
            return;
        };
        let hit = self.intersect(cursor);

        if !self.tracking {
            self.hit_prev = hit;
            self.tracking = true;
            return;
        }

        if (hit - self.hit_prev).length() < TRACK_EPS {
            return;
        }

        // Reversed cross product: the scene follows the cursor.
        let Some(axis) = (self.rot_prev.conjugate() * hit.cross(self.hit_prev)).try_normalize()
        else {
            return;
        };
        let angle = self.hit_prev.dot(hit).clamp(-1.0, 1.0).acos();
        self.rot = self.rot_prev * Quat::from_axis_angle(axis, angle);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn reset(&mut self) {
        self.position = self.initial_position;
        self.rot = Quat::IDENTITY;
        self.rot_prev = Quat::IDENTITY;
        self.tracking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> WanderCamera {
        WanderCamera::new(Vec3::new(0.0, 1.0, 5.0), Vec3::new(0.0, 1.0, 0.0), 200, 100, 1.0)
    }

    #[test]
    fn zoom_dollies_along_view_direction() {
        let mut cam = camera();
        cam.zoom(2.0);
        assert!((cam.position() - Vec3::new(0.0, 1.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn view_maps_eye_to_origin() {
        let mut cam = camera();
        cam.track(Some(Vec2::new(100.0, 50.0)));
        cam.track(Some(Vec2::new(140.0, 60.0)));
        let eye_in_view = cam.view().transform_point3(cam.position());
        assert!(eye_in_view.length() < 1e-4);
    }

    #[test]
    fn drag_turns_view_and_release_latches_rotation() {
        let mut cam = camera();
        let before = cam.forward();
        cam.track(Some(Vec2::new(100.0, 50.0)));
        cam.track(Some(Vec2::new(150.0, 50.0)));
        let turned = cam.forward();
        assert!(turned.dot(before) < 0.999);
        assert!((turned.length() - 1.0).abs() < 1e-4);

        cam.track(None);
        assert_eq!(cam.rot_prev, cam.rot);
        assert!((cam.forward() - turned).length() < 1e-6);
    }

    #[test]
    fn reset_restores_start() {
        let mut cam = camera();
        cam.zoom(1.0);
        cam.reset();
        assert_eq!(cam.position(), Vec3::new(0.0, 1.0, 5.0));
        assert!((cam.forward() - Vec3::NEG_Z).length() < 1e-6);
    }
}
