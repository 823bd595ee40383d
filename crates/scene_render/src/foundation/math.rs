//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics. Matrices follow the
//! OpenGL conventions: column vectors, right-handed view space and a clip
//! volume spanning `[-1, 1]` on every axis.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix2, Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 2x2 matrix type
pub type Mat2 = Matrix2<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Builder-style uniform scale
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, scale);
        self
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Point3) -> Point3 {
        self.to_matrix().transform_point(&point)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a rotation matrix around the X axis
    fn rotation_x(angle: f32) -> Mat4;

    /// Create a rotation matrix around the Y axis
    fn rotation_y(angle: f32) -> Mat4;

    /// Create an OpenGL perspective projection matrix (clip z in `[-1, 1]`)
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an OpenGL orthographic projection matrix
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Inverse-transpose of the upper 3x3 block, used to transform normals
    ///
    /// Falls back to the plain upper 3x3 block when it is singular.
    fn normal_matrix(&self) -> Mat3;
}

impl Mat4Ext for Mat4 {
    fn rotation_x(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::x_axis(), angle)
    }

    fn rotation_y(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), angle)
    }

    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, fov_y, near, far)
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_orthographic(left, right, bottom, top, near, far)
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    fn normal_matrix(&self) -> Mat3 {
        let upper: Mat3 = self.fixed_view::<3, 3>(0, 0).into_owned();
        upper
            .try_inverse()
            .map_or(upper, |inverse| inverse.transpose())
    }
}

/// Axis-aligned bounding box
///
/// A box whose `min` exceeds its `max` on any axis is "null" (contains
/// nothing); [`Aabb::null`] produces one and [`Aabb::add_point`] grows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from two corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An empty box that contains nothing
    pub fn null() -> Self {
        Self {
            min: Vec3::repeat(f32::MAX),
            max: Vec3::repeat(f32::MIN),
        }
    }

    /// Smallest box enclosing every point
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut aabb = Self::null();
        for p in points {
            aabb.add_point(Vec3::new(p[0], p[1], p[2]));
        }
        aabb
    }

    /// Whether the box contains nothing
    pub fn is_null(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow the box to include `point`
    pub fn add_point(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Center of the box (origin for a null box)
    pub fn center(&self) -> Vec3 {
        if self.is_null() {
            Vec3::zeros()
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Full size along each axis
    pub fn extents(&self) -> Vec3 {
        if self.is_null() {
            Vec3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Radius of the enclosing sphere centered on [`Aabb::center`]
    pub fn radius(&self) -> f32 {
        self.extents().norm() * 0.5
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after transformation by `matrix`
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_null() {
            return *self;
        }
        let mut out = Self::null();
        for corner in self.corners() {
            out.add_point(matrix.transform_point(&Point3::from(corner)).coords);
        }
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::null()
    }
}

/// Plane in Hessian normal form: `normal . p = origin`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Plane normal
    pub normal: Vec3,
    /// Signed distance of the plane from the origin along `normal`
    pub origin: f32,
}

impl Plane {
    /// Create a plane from a normal and a distance
    pub fn new(normal: Vec3, origin: f32) -> Self {
        Self { normal, origin }
    }

    /// Plane equation coefficients `(a, b, c, d)` with `ax + by + cz + d = 0`
    pub fn equation(&self) -> Vec4 {
        Vec4::new(self.normal.x, self.normal.y, self.normal.z, -self.origin)
    }

    /// Express the plane equation in the space mapped to by `matrix`
    ///
    /// Planes transform by the inverse-transpose of the point transform.
    pub fn transformed_equation(&self, matrix: &Mat4) -> Vec4 {
        let inverse_transpose = matrix
            .try_inverse()
            .map_or_else(Mat4::identity, |inverse| inverse.transpose());
        inverse_transpose * self.equation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_grows_and_reports_center() {
        let aabb = Aabb::from_points(&[[-1.0, 0.0, 0.0], [1.0, 2.0, 4.0]]);
        assert!(!aabb.is_null());
        assert_relative_eq!(aabb.center(), Vec3::new(0.0, 1.0, 2.0));
        assert_relative_eq!(aabb.extents(), Vec3::new(2.0, 2.0, 4.0));
    }

    #[test]
    fn test_null_aabb_survives_transform() {
        let aabb = Aabb::null();
        assert!(aabb.transformed(&Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0))).is_null());
        assert_eq!(aabb.center(), Vec3::zeros());
    }

    #[test]
    fn test_transformed_aabb_follows_translation() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let moved = aabb.transformed(&Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0)));
        assert_relative_eq!(moved.center(), Vec3::new(0.0, 0.0, -10.0));
        assert_relative_eq!(moved.radius(), aabb.radius());
    }

    #[test]
    fn test_normal_matrix_undoes_nonuniform_scale() {
        let scale = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
        let normal = scale.normal_matrix();
        assert_relative_eq!(normal[(0, 0)], 0.5);
        assert_relative_eq!(normal[(1, 1)], 1.0);
    }

    #[test]
    fn test_plane_equation_under_translation() {
        // z = 0 plane facing +z, moved to z = 5
        let plane = Plane::new(Vec3::new(0.0, 0.0, 1.0), 0.0);
        let eq = plane.transformed_equation(&Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0)));
        assert_relative_eq!(eq, Vec4::new(0.0, 0.0, 1.0, -5.0));
    }
}
