//! Orbiting camera.
//!
//! With a zero orbit speed the camera rests at a fixed position. Otherwise
//! it circles the look-at point at a fixed radius and height, with the
//! angle growing as `elapsed * ORBIT_RATE * speed`. Elapsed time is kept
//! in `f64` so a widget left running for weeks still moves every frame.

use std::f64::consts::TAU;

use glam::{Mat4, Vec3};

use crate::constants::{
    CAMERA_FAR, CAMERA_FOV_DEGREES, CAMERA_LOOK_AT, CAMERA_NEAR, CAMERA_REST_POSITION,
    ORBIT_HEIGHT, ORBIT_RADIUS, ORBIT_RATE,
};

#[derive(Debug, Clone)]
pub struct OrbitCamera {
    speed: f32,
    elapsed: f64,
    aspect: f32,
}

impl OrbitCamera {
    pub fn new(aspect: f32) -> Self {
        Self {
            speed: 0.0,
            elapsed: 0.0,
            aspect,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Seconds accumulated by [`OrbitCamera::advance`].
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn advance(&mut self, delta: f32) {
        self.elapsed += f64::from(delta);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn position(&self) -> Vec3 {
        orbit_position(self.elapsed, self.speed)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), Vec3::from(CAMERA_LOOK_AT), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            CAMERA_FOV_DEGREES.to_radians(),
            self.aspect,
            CAMERA_NEAR,
            CAMERA_FAR,
        )
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Camera position after `elapsed` seconds at orbit speed `speed`.
pub fn orbit_position(elapsed: f64, speed: f32) -> Vec3 {
    if speed == 0.0 {
        return Vec3::from(CAMERA_REST_POSITION);
    }
    let angle = (f64::from(ORBIT_RATE) * elapsed * f64::from(speed)).rem_euclid(TAU);
    Vec3::new(
        angle.cos() as f32 * ORBIT_RADIUS,
        ORBIT_HEIGHT,
        angle.sin() as f32 * ORBIT_RADIUS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_speed_rests() {
        for elapsed in [0.0, 1.0, 123.4] {
            assert_eq!(orbit_position(elapsed, 0.0), Vec3::new(0.0, 10.0, 20.0));
        }
    }

    #[test]
    fn test_orbit_formula() {
        let p = orbit_position(2.5, 3.0);
        let angle: f32 = 0.2 * 2.5 * 3.0;
        assert!((p.x - angle.cos() * 20.0).abs() < 1e-5);
        assert_eq!(p.y, 10.0);
        assert!((p.z - angle.sin() * 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_camera_accumulates_time() {
        let mut camera = OrbitCamera::new(4.0 / 3.0);
        camera.set_speed(1.0);
        camera.advance(0.5);
        camera.advance(0.5);
        assert_eq!(camera.elapsed(), 1.0);
        assert!((camera.position() - orbit_position(1.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_orbit_keeps_moving_after_a_week() {
        let mut camera = OrbitCamera::new(1.0);
        camera.set_speed(1.0);
        camera.advance(604_800.0);
        let before = camera.position();

        for _ in 0..600 {
            camera.advance(1.0 / 60.0);
        }
        let after = camera.position();

        // Ten seconds at 0.2 rad/s is two radians of travel
        assert!((camera.elapsed() - 604_810.0).abs() < 1e-4);
        assert!((before - after).length() > 1.0);
        assert!((after - orbit_position(604_810.0, 1.0)).length() < 1e-3);
    }

    #[test]
    fn test_view_looks_at_target() {
        let camera = OrbitCamera::new(1.0);
        let target = camera.view_matrix().transform_point3(Vec3::from(CAMERA_LOOK_AT));
        // Target lies straight ahead on -Z in view space
        assert!(target.x.abs() < 1e-4);
        assert!(target.y.abs() < 1e-4);
        assert!(target.z < 0.0);
    }
}
