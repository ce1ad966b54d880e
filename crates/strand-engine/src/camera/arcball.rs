use glam::{Mat4, Quat, Vec2, Vec3};

use super::{aspect, in_viewport, unproject, Camera, TRACK_EPS};

/// Orbits a target point; zoom narrows or widens the field of view.
#[derive(Debug, Clone)]
pub struct ArcballCamera {
    position: Vec3,
    target: Vec3,
    fov_y: f32,
    initial_fov_y: f32,
    width: u32,
    height: u32,

    rot: Quat,
    rot_prev: Quat,
    tracking: bool,
    hit_prev: Vec3,
}

impl ArcballCamera {
    pub const NEAR: f32 = 1.0;
    pub const FAR: f32 = 100.0;

    /// Radius of the virtual trackball, in units of the eye distance.
    const RADIUS: f32 = 0.71;
    /// Rotation applied per radian of cursor travel on the ball.
    const GAIN: f32 = 5.0;

    pub fn new(position: Vec3, target: Vec3, width: u32, height: u32, fov_y: f32) -> Self {
        Self {
            position,
            target,
            fov_y,
            initial_fov_y: fov_y,
            width,
            height,
            rot: Quat::IDENTITY,
            rot_prev: Quat::IDENTITY,
            tracking: false,
            hit_prev: Vec3::ZERO,
        }
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// Casts the cursor onto the trackball sphere seen from a unit-distance eye.
    fn intersect(&self, cursor: Vec2) -> Option<Vec3> {
        let win = Vec3::new(cursor.x, self.height as f32 - 1.0 - cursor.y, 0.0);
        let eye = (self.position - self.target).normalize();
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let on_near = unproject(win, view, self.projection(), self.width, self.height);

        let ro = eye;
        let rd = (on_near - ro).normalize();
        let b = 2.0 * ro.dot(rd);
        let c = ro.dot(ro) - Self::RADIUS * Self::RADIUS;
        let delta = b * b - 4.0 * c;
        if delta < TRACK_EPS {
            return None;
        }

        let t = (-b - delta.sqrt()) / 2.0;
        Some((ro + t * rd).normalize())
    }
}

impl Camera for ArcballCamera {
    fn position(&self) -> Vec3 {
        self.rot.conjugate() * (self.position - self.target) + self.target
    }

    fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect(self.width, self.height), Self::NEAR, Self::FAR)
    }

    fn view(&self) -> Mat4 {
        let look = Mat4::look_at_rh(self.position, self.target, Vec3::Y);
        look * Mat4::from_translation(self.target)
            * Mat4::from_quat(self.rot.normalize())
            * Mat4::from_translation(-self.target)
    }

    fn zoom(&mut self, amount: f32) {
        self.fov_y = (self.fov_y + amount).clamp(5f32.to_radians(), 120f32.to_radians());
    }

    fn track(&mut self, cursor: Option<Vec2>) {
        let Some(cursor) = cursor.filter(|c| in_viewport(*c, self.width, self.height)) else {
            self.tracking = false;
            return;
        };
        let Some(hit) = self.intersect(cursor) else {
            return;
        };

        if !self.tracking {
            self.hit_prev = hit;
            self.rot_prev = self.rot;
            self.tracking = true;
        }

        if (hit - self.hit_prev).length() < TRACK_EPS {
            return;
        }

        let Some(axis) = (self.rot_prev.conjugate() * self.hit_prev.cross(hit)).try_normalize()
        else {
            return;
        };
        let angle = self.hit_prev.dot(hit).clamp(-1.0, 1.0).acos();
        self.rot = self.rot_prev * Quat::from_axis_angle(axis, Self::GAIN * angle);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn reset(&mut self) {
        self.rot = Quat::IDENTITY;
        self.rot_prev = Quat::IDENTITY;
        self.tracking = false;
        self.fov_y = self.initial_fov_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> ArcballCamera {
        ArcballCamera::new(
            Vec3::new(3.71, 2.25, 2.47),
            Vec3::ZERO,
            256,
            256,
            60f32.to_radians(),
        )
    }

    fn drag(cam: &mut ArcballCamera, from: Vec2, to: Vec2) {
        cam.track(Some(from));
        cam.track(Some(to));
        cam.track(None);
    }

    // ── view ──────────────────────────────────────────────────────────────

    #[test]
    fn view_maps_eye_to_origin() {
        let mut cam = camera();
        drag(&mut cam, Vec2::new(128.0, 128.0), Vec2::new(160.0, 110.0));

        let eye_in_view = cam.view().transform_point3(cam.position());
        assert!(eye_in_view.length() < 1e-4, "{eye_in_view:?}");
    }

    #[test]
    fn orbit_preserves_distance_to_target() {
        let mut cam = camera();
        let before = cam.position().length();
        drag(&mut cam, Vec2::new(128.0, 128.0), Vec2::new(180.0, 128.0));

        let after = cam.position();
        assert!((after.length() - before).abs() < 1e-4);
        assert!((after - Vec3::new(3.71, 2.25, 2.47)).length() > 1e-2);
    }

    // ── track ─────────────────────────────────────────────────────────────

    #[test]
    fn cursor_outside_viewport_stops_tracking() {
        let mut cam = camera();
        cam.track(Some(Vec2::new(128.0, 128.0)));
        cam.track(Some(Vec2::new(-5.0, 10.0)));
        assert!(!cam.tracking);
    }

    #[test]
    fn center_of_screen_hits_ball_facing_eye() {
        let cam = camera();
        let hit = cam.intersect(Vec2::new(127.5, 127.5)).unwrap();
        let eye = Vec3::new(3.71, 2.25, 2.47).normalize();
        assert!(hit.dot(eye) > 0.999);
    }

    #[test]
    fn corner_misses_ball_at_wide_fov() {
        let mut cam = camera();
        // At 120 degrees the corner ray leaves the ball's 45 degree silhouette.
        cam.zoom(10.0);
        assert!(cam.intersect(Vec2::new(0.0, 0.0)).is_none());
    }

    // ── zoom ──────────────────────────────────────────────────────────────

    #[test]
    fn zoom_clamps_field_of_view() {
        let mut cam = camera();
        cam.zoom(10.0);
        assert!((cam.fov_y() - 120f32.to_radians()).abs() < 1e-6);
        cam.zoom(-10.0);
        assert!((cam.fov_y() - 5f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn reset_restores_initial_pose() {
        let mut cam = camera();
        drag(&mut cam, Vec2::new(128.0, 128.0), Vec2::new(150.0, 150.0));
        cam.zoom(0.3);
        cam.reset();
        assert!((cam.position() - Vec3::new(3.71, 2.25, 2.47)).length() < 1e-6);
        assert!((cam.fov_y() - 60f32.to_radians()).abs() < 1e-6);
    }
}
