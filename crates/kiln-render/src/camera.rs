//! Camera controllers
//!
//! The renderer only ever asks a camera for its view matrix and eye position.
//! `Camera` is the closed set of controllers that can answer that.

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

/// A camera driven by one of the supported controllers
#[derive(Debug, Clone)]
pub enum Camera {
    FirstPerson(FirstPersonController),
    FreeMoving(FreeMovingController),
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        match self {
            Camera::FirstPerson(c) => c.view_matrix(),
            Camera::FreeMoving(c) => c.view_matrix(),
        }
    }

    pub fn position(&self) -> Vec3 {
        match self {
            Camera::FirstPerson(c) => c.position(),
            Camera::FreeMoving(c) => c.position(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Camera::FirstPerson(FirstPersonController::new(
            Vec3::new(-10.0, 3.0, 3.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Y,
        ))
    }
}

/// Which movement keys are held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Movement {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub fast: bool,
}

/// Quaternion-based first-person / look-at camera with damped movement
#[derive(Debug, Clone)]
pub struct FirstPersonController {
    pub movement: Movement,
    pub mouse_speed: f32,
    pub acceleration: f32,
    /// Seconds for the velocity to decay once no key is held
    pub damping: f32,
    pub max_speed: f32,
    /// Multiplier applied to acceleration and max speed while `fast` is held
    pub fast_coef: f32,

    mouse_position: Vec2,
    position: Vec3,
    orientation: Quat,
    move_speed: Vec3,
    up: Vec3,
}

impl FirstPersonController {
    pub fn new(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut controller = Self {
            movement: Movement::default(),
            mouse_speed: 4.0,
            acceleration: 150.0,
            damping: 0.1,
            max_speed: 10.0,
            fast_coef: 10.0,
            mouse_position: Vec2::ZERO,
            position,
            orientation: Quat::IDENTITY,
            move_speed: Vec3::ZERO,
            up,
        };
        controller.look_at(position, target, up);
        controller
    }

    pub fn look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.position = position;
        self.orientation = Quat::from_mat4(&Mat4::look_at_rh(position, target, up));
    }

    /// Advance by `delta_seconds`. `mouse_position` is normalized to the window; while
    /// `mouse_pressed` the delta since the last update rotates the view.
    pub fn update(&mut self, delta_seconds: f32, mouse_position: Vec2, mouse_pressed: bool) {
        if mouse_pressed {
            let delta = mouse_position - self.mouse_position;
            let delta_quat = Quat::from_euler(
                EulerRot::ZYX,
                0.0,
                self.mouse_speed * delta.x,
                -self.mouse_speed * delta.y,
            );
            self.orientation = (delta_quat * self.orientation).normalize();
            self.set_up_vector(self.up);
        }
        self.mouse_position = mouse_position;

        let rotation = Mat4::from_quat(self.orientation);
        let forward = -rotation.row(2).truncate();
        let right = rotation.row(0).truncate();
        let up = right.cross(forward);

        let m = self.movement;
        let mut accel = Vec3::ZERO;
        if m.forward {
            accel += forward;
        }
        if m.backward {
            accel -= forward;
        }
        if m.left {
            accel -= right;
        }
        if m.right {
            accel += right;
        }
        if m.up {
            accel += up;
        }
        if m.down {
            accel -= up;
        }
        if m.fast {
            accel *= self.fast_coef;
        }

        if accel == Vec3::ZERO {
            // Decelerate naturally according to the damping value
            let decay = ((1.0 / self.damping) * delta_seconds).min(1.0);
            self.move_speed -= self.move_speed * decay;
        } else {
            self.move_speed += accel * self.acceleration * delta_seconds;
            let max_speed = if m.fast {
                self.max_speed * self.fast_coef
            } else {
                self.max_speed
            };
            if self.move_speed.length() > max_speed {
                self.move_speed = self.move_speed.normalize() * max_speed;
            }
        }

        self.position += self.move_speed * delta_seconds;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.orientation) * Mat4::from_translation(-self.position)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Forget the last mouse position so the next update does not jump
    pub fn reset_mouse_position(&mut self, position: Vec2) {
        self.mouse_position = position;
    }

    /// Re-orthogonalize the orientation around `up`, keeping the view direction
    pub fn set_up_vector(&mut self, up: Vec3) {
        let view = self.view_matrix();
        let dir = -view.row(2).truncate();
        self.orientation = Quat::from_mat4(&Mat4::look_at_rh(
            self.position,
            self.position + dir,
            up,
        ));
    }
}

/// Euler-angle camera that eases toward a desired position and orientation
#[derive(Debug, Clone)]
pub struct FreeMovingController {
    pub damping_linear: f32,
    /// Per-axis easing rate for pitch, pan and roll
    pub damping_euler_angles: Vec3,

    position_current: Vec3,
    position_desired: Vec3,
    /// Pitch, pan, roll in degrees
    angles_current: Vec3,
    angles_desired: Vec3,
    transform: Mat4,
}

impl FreeMovingController {
    pub fn new(position: Vec3, angles: Vec3) -> Self {
        let mut controller = Self {
            damping_linear: 10.0,
            damping_euler_angles: Vec3::splat(5.0),
            position_current: position,
            position_desired: position,
            angles_current: angles,
            angles_desired: angles,
            transform: Mat4::IDENTITY,
        };
        controller.rebuild_transform();
        controller
    }

    pub fn update(&mut self, delta_seconds: f32) {
        self.position_current +=
            self.damping_linear * delta_seconds * (self.position_desired - self.position_current);

        self.angles_current = clip_angles(self.angles_current);
        self.angles_desired = clip_angles(self.angles_desired);

        self.angles_current -= angle_delta(self.angles_current, self.angles_desired)
            * self.damping_euler_angles
            * delta_seconds;

        self.angles_current = clip_angles(self.angles_current);
        self.rebuild_transform();
    }

    fn rebuild_transform(&mut self) {
        let a = Vec3::new(
            self.angles_current.x.to_radians(),
            self.angles_current.y.to_radians(),
            self.angles_current.z.to_radians(),
        );
        let rotation = Mat4::from_euler(EulerRot::YXZ, a.y, a.x, a.z);
        self.transform = rotation * Mat4::from_translation(-self.position_current);
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.position_current
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position_current = position;
        self.rebuild_transform();
    }

    /// Pitch, pan, roll in degrees
    pub fn set_angles(&mut self, angles: Vec3) {
        self.angles_current = angles;
        self.rebuild_transform();
    }

    pub fn set_desired_position(&mut self, position: Vec3) {
        self.position_desired = position;
    }

    pub fn set_desired_angles(&mut self, angles: Vec3) {
        self.angles_desired = angles;
    }
}

fn clip_angle(d: f32) -> f32 {
    if d < -180.0 {
        d + 360.0
    } else if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

fn clip_angles(angles: Vec3) -> Vec3 {
    Vec3::new(angles.x % 360.0, angles.y % 360.0, angles.z % 360.0)
}

/// Shortest signed difference between two sets of angles
fn angle_delta(current: Vec3, desired: Vec3) -> Vec3 {
    let d = clip_angles(current) - clip_angles(desired);
    Vec3::new(clip_angle(d.x), clip_angle(d.y), clip_angle(d.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_first_person_looks_at_target() {
        let camera = FirstPersonController::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let view = camera.view_matrix();
        // The target lands on the -Z axis in view space
        let target = view.transform_point3(Vec3::ZERO);
        assert!(approx(target, Vec3::new(0.0, 0.0, -5.0)));
        assert!(approx(camera.position(), Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn test_view_matches_look_at() {
        let eye = Vec3::new(-10.0, 3.0, 3.0);
        let target = Vec3::new(0.0, 0.0, -1.0);
        let camera = FirstPersonController::new(eye, target, Vec3::Y);
        let expected = Mat4::look_at_rh(eye, target, Vec3::Y);
        assert!(camera.view_matrix().abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn test_forward_movement_is_capped_and_damped() {
        let mut camera = FirstPersonController::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        camera.movement.forward = true;
        for _ in 0..100 {
            camera.update(0.01, Vec2::ZERO, false);
        }
        // Moving along -Z at no more than max speed
        assert!(camera.position().z < 0.0);
        assert!(camera.position().z >= -camera.max_speed * 1.0 - 1e-3);
        assert!(camera.position().x.abs() < 1e-4);

        camera.movement.forward = false;
        let before = camera.position();
        for _ in 0..100 {
            camera.update(0.01, Vec2::ZERO, false);
        }
        let drift = (camera.position() - before).length();
        assert!(drift < camera.max_speed * 0.2);
    }

    #[test]
    fn test_mouse_only_rotates_while_pressed() {
        let mut camera = FirstPersonController::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let before = camera.view_matrix();
        camera.update(0.016, Vec2::new(0.1, 0.0), false);
        assert!(camera.view_matrix().abs_diff_eq(before, 1e-6));

        camera.update(0.016, Vec2::new(0.2, 0.0), true);
        assert!(!camera.view_matrix().abs_diff_eq(before, 1e-3));
        assert!(approx(camera.position(), Vec3::ZERO));
    }

    #[test]
    fn test_free_moving_eases_toward_target() {
        let mut camera = FreeMovingController::new(Vec3::ZERO, Vec3::ZERO);
        camera.set_desired_position(Vec3::new(10.0, 0.0, 0.0));
        camera.set_desired_angles(Vec3::new(0.0, 90.0, 0.0));
        for _ in 0..200 {
            camera.update(0.01);
        }
        assert!(approx(camera.position(), Vec3::new(10.0, 0.0, 0.0)));
        let view = camera.view_matrix();
        assert!(view.transform_point3(camera.position()).length() < 1e-3);
    }

    #[test]
    fn test_angle_delta_takes_short_way() {
        let d = angle_delta(Vec3::new(170.0, 0.0, 0.0), Vec3::new(-170.0, 0.0, 0.0));
        assert!((d.x - -20.0).abs() < 1e-4);
    }

    #[test]
    fn test_camera_enum_dispatch() {
        let camera = Camera::FreeMoving(FreeMovingController::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO));
        assert_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(camera
            .view_matrix()
            .abs_diff_eq(Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0)), 1e-6));
    }
}
