//! # Camera
//!
//! View and projection for one viewport. Follows the OpenGL conventions:
//! right-handed view space looking down -Z, clip-space depth in [-1, 1] and
//! window coordinates with the origin at the bottom-left pixel.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Mat4, Mat4Ext, Point3, Vec3, Vec4};
use crate::render::api::Rect;

/// Projection model of a camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Visible height in world units; the width follows the aspect ratio
        height: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

/// A camera looking at a target point through a viewport
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Point looked at in world space
    pub target: Vec3,
    /// Up direction
    pub up: Vec3,
    /// Projection model
    pub projection: Projection,
    viewport: Rect,
}

impl Camera {
    /// Perspective camera at `position` looking at the origin
    ///
    /// # Arguments
    /// * `position` - Eye position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `viewport` - Pixel rectangle rendered into; also sets the aspect ratio
    /// * `near` - Near plane distance (must be > 0)
    /// * `far` - Far plane distance (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, viewport: Rect, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            projection: Projection::Perspective {
                fov_y: utils::deg_to_rad(fov_degrees),
                near,
                far,
            },
            viewport,
        }
    }

    /// Orthographic camera at `position` looking at the origin
    pub fn orthographic(position: Vec3, height: f32, viewport: Rect, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            projection: Projection::Orthographic { height, near, far },
            viewport,
        }
    }

    /// Move the eye
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Aim at `target` with the given up direction
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
    }

    /// Pixel rectangle rendered into
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Change the viewport, and with it the aspect ratio
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    /// Width over height of the viewport
    pub fn aspect(&self) -> f32 {
        self.viewport.aspect_ratio()
    }

    /// World-to-view matrix
    pub fn get_view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// View-to-world matrix
    ///
    /// Falls back to identity for a degenerate view (eye on target).
    pub fn get_inverse_view_matrix(&self) -> Mat4 {
        self.get_view_matrix().try_inverse().unwrap_or_else(Mat4::identity)
    }

    /// View-to-clip matrix
    pub fn get_projection_matrix(&self) -> Mat4 {
        let aspect = self.aspect();
        match self.projection {
            Projection::Perspective { fov_y, near, far } => Mat4::perspective(fov_y, aspect, near, far),
            Projection::Orthographic { height, near, far } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }

    /// World-to-clip matrix
    pub fn get_view_projection_matrix(&self) -> Mat4 {
        self.get_projection_matrix() * self.get_view_matrix()
    }

    /// Distance from the eye to a world-space point
    pub fn distance_to(&self, point: Vec3) -> f32 {
        (point - self.position).norm()
    }

    /// Project a world-space point to window coordinates
    ///
    /// Returns `(x, y)` in pixels and depth in [0, 1], or `None` when the
    /// point is at or behind the eye.
    pub fn project_to_window(&self, point: Vec3) -> Option<Vec3> {
        let clip = self.get_view_projection_matrix() * Vec4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = Point3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w);
        let vp = self.viewport;
        Some(Vec3::new(
            vp.x as f32 + (ndc.x + 1.0) * 0.5 * vp.width as f32,
            vp.y as f32 + (ndc.y + 1.0) * 0.5 * vp.height as f32,
            (ndc.z + 1.0) * 0.5,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, Rect::from_size(800, 600), 0.1, 100.0)
    }

    #[test]
    fn test_target_projects_to_viewport_center() {
        let window = camera().project_to_window(Vec3::zeros()).unwrap();
        assert_relative_eq!(window.x, 400.0, epsilon = 1e-3);
        assert_relative_eq!(window.y, 300.0, epsilon = 1e-3);
        assert!(window.z > 0.0 && window.z < 1.0);
    }

    #[test]
    fn test_point_behind_eye_does_not_project() {
        assert!(camera().project_to_window(Vec3::new(0.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn test_inverse_view_recovers_eye() {
        let cam = camera();
        let eye = cam.get_inverse_view_matrix().transform_point(&Point3::origin());
        assert_relative_eq!(eye.coords, cam.position, epsilon = 1e-5);
    }

    #[test]
    fn test_orthographic_width_follows_aspect() {
        let cam = Camera::orthographic(Vec3::new(0.0, 0.0, 5.0), 2.0, Rect::from_size(400, 200), 0.1, 10.0);
        let right_edge = cam.project_to_window(Vec3::new(2.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(right_edge.x, 400.0, epsilon = 1e-3);
    }
}
