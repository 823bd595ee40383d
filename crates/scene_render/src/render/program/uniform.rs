//! Uniform values and uniform sets
//!
//! A [`Uniform`] carries a name, a declared element type and the values to
//! upload. [`UniformSet`] groups uniforms by name so a shader or actor can own
//! a single value object that the renderer uploads in one go.

use crate::foundation::math::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Scalar kind behind a uniform type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// No data
    None,
    /// Signed 32-bit integer (also used for samplers and booleans)
    Int,
    /// Unsigned 32-bit integer
    UInt,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

/// Declared element type of a uniform
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    /// Declared but never given a value
    None,

    Int,
    IntVec2,
    IntVec3,
    IntVec4,

    UInt,
    UIntVec2,
    UIntVec3,
    UIntVec4,

    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,

    Double,
    DoubleVec2,
    DoubleVec3,
    DoubleVec4,

    FloatMat2,
    FloatMat3,
    FloatMat4,
    FloatMat2x3,
    FloatMat3x2,
    FloatMat2x4,
    FloatMat4x2,
    FloatMat3x4,
    FloatMat4x3,

    DoubleMat2,
    DoubleMat3,
    DoubleMat4,
    DoubleMat2x3,
    DoubleMat3x2,
    DoubleMat2x4,
    DoubleMat4x2,
    DoubleMat3x4,
    DoubleMat4x3,
}

impl UniformType {
    /// Every type that carries data
    pub const ALL_DATA: [Self; 34] = [
        Self::Int, Self::IntVec2, Self::IntVec3, Self::IntVec4,
        Self::UInt, Self::UIntVec2, Self::UIntVec3, Self::UIntVec4,
        Self::Float, Self::FloatVec2, Self::FloatVec3, Self::FloatVec4,
        Self::Double, Self::DoubleVec2, Self::DoubleVec3, Self::DoubleVec4,
        Self::FloatMat2, Self::FloatMat3, Self::FloatMat4,
        Self::FloatMat2x3, Self::FloatMat3x2, Self::FloatMat2x4,
        Self::FloatMat4x2, Self::FloatMat3x4, Self::FloatMat4x3,
        Self::DoubleMat2, Self::DoubleMat3, Self::DoubleMat4,
        Self::DoubleMat2x3, Self::DoubleMat3x2, Self::DoubleMat2x4,
        Self::DoubleMat4x2, Self::DoubleMat3x4, Self::DoubleMat4x3,
    ];

    /// Scalar kind of each component
    pub const fn scalar(self) -> ScalarKind {
        use UniformType::*;
        match self {
            None => ScalarKind::None,
            Int | IntVec2 | IntVec3 | IntVec4 => ScalarKind::Int,
            UInt | UIntVec2 | UIntVec3 | UIntVec4 => ScalarKind::UInt,
            Float | FloatVec2 | FloatVec3 | FloatVec4 | FloatMat2 | FloatMat3 | FloatMat4
            | FloatMat2x3 | FloatMat3x2 | FloatMat2x4 | FloatMat4x2 | FloatMat3x4 | FloatMat4x3 => {
                ScalarKind::Float
            }
            Double | DoubleVec2 | DoubleVec3 | DoubleVec4 | DoubleMat2 | DoubleMat3 | DoubleMat4
            | DoubleMat2x3 | DoubleMat3x2 | DoubleMat2x4 | DoubleMat4x2 | DoubleMat3x4
            | DoubleMat4x3 => ScalarKind::Double,
        }
    }

    /// Components per element
    pub const fn components(self) -> usize {
        use UniformType::*;
        match self {
            None => 0,
            Int | UInt | Float | Double => 1,
            IntVec2 | UIntVec2 | FloatVec2 | DoubleVec2 => 2,
            IntVec3 | UIntVec3 | FloatVec3 | DoubleVec3 => 3,
            IntVec4 | UIntVec4 | FloatVec4 | DoubleVec4 | FloatMat2 | DoubleMat2 => 4,
            FloatMat2x3 | FloatMat3x2 | DoubleMat2x3 | DoubleMat3x2 => 6,
            FloatMat2x4 | FloatMat4x2 | DoubleMat2x4 | DoubleMat4x2 => 8,
            FloatMat3 | DoubleMat3 => 9,
            FloatMat3x4 | FloatMat4x3 | DoubleMat3x4 | DoubleMat4x3 => 12,
            FloatMat4 | DoubleMat4 => 16,
        }
    }

    /// Whether this is a matrix type
    pub const fn is_matrix(self) -> bool {
        use UniformType::*;
        matches!(
            self,
            FloatMat2 | FloatMat3 | FloatMat4 | FloatMat2x3 | FloatMat3x2 | FloatMat2x4
                | FloatMat4x2 | FloatMat3x4 | FloatMat4x3 | DoubleMat2 | DoubleMat3 | DoubleMat4
                | DoubleMat2x3 | DoubleMat3x2 | DoubleMat2x4 | DoubleMat4x2 | DoubleMat3x4
                | DoubleMat4x3
        )
    }

    /// GLSL spelling
    pub const fn glsl_name(self) -> &'static str {
        use UniformType::*;
        match self {
            None => "none",
            Int => "int",
            IntVec2 => "ivec2",
            IntVec3 => "ivec3",
            IntVec4 => "ivec4",
            UInt => "uint",
            UIntVec2 => "uvec2",
            UIntVec3 => "uvec3",
            UIntVec4 => "uvec4",
            Float => "float",
            FloatVec2 => "vec2",
            FloatVec3 => "vec3",
            FloatVec4 => "vec4",
            Double => "double",
            DoubleVec2 => "dvec2",
            DoubleVec3 => "dvec3",
            DoubleVec4 => "dvec4",
            FloatMat2 => "mat2",
            FloatMat3 => "mat3",
            FloatMat4 => "mat4",
            FloatMat2x3 => "mat2x3",
            FloatMat3x2 => "mat3x2",
            FloatMat2x4 => "mat2x4",
            FloatMat4x2 => "mat4x2",
            FloatMat3x4 => "mat3x4",
            FloatMat4x3 => "mat4x3",
            DoubleMat2 => "dmat2",
            DoubleMat3 => "dmat3",
            DoubleMat4 => "dmat4",
            DoubleMat2x3 => "dmat2x3",
            DoubleMat3x2 => "dmat3x2",
            DoubleMat2x4 => "dmat2x4",
            DoubleMat4x2 => "dmat4x2",
            DoubleMat3x4 => "dmat3x4",
            DoubleMat4x3 => "dmat4x3",
        }
    }

    /// Parse a GLSL type name; samplers and booleans map to `int`
    pub fn from_glsl(name: &str) -> Option<Self> {
        match name {
            "bool" => return Some(Self::Int),
            "bvec2" => return Some(Self::IntVec2),
            "bvec3" => return Some(Self::IntVec3),
            "bvec4" => return Some(Self::IntVec4),
            "mat2x2" => return Some(Self::FloatMat2),
            "mat3x3" => return Some(Self::FloatMat3),
            "mat4x4" => return Some(Self::FloatMat4),
            "dmat2x2" => return Some(Self::DoubleMat2),
            "dmat3x3" => return Some(Self::DoubleMat3),
            "dmat4x4" => return Some(Self::DoubleMat4),
            _ if name.contains("sampler") => return Some(Self::Int),
            _ => {}
        }
        Self::ALL_DATA.into_iter().find(|ty| ty.glsl_name() == name)
    }
}

/// Uniform values, one vector per scalar kind
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    /// No data
    None,
    /// Signed integer components
    Int(Vec<i32>),
    /// Unsigned integer components
    UInt(Vec<u32>),
    /// Float components
    Float(Vec<f32>),
    /// Double components
    Double(Vec<f64>),
}

impl UniformData {
    /// Number of scalar components stored
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Int(v) => v.len(),
            Self::UInt(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    /// Whether no components are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar kind of the stored components
    pub const fn scalar(&self) -> ScalarKind {
        match self {
            Self::None => ScalarKind::None,
            Self::Int(_) => ScalarKind::Int,
            Self::UInt(_) => ScalarKind::UInt,
            Self::Float(_) => ScalarKind::Float,
            Self::Double(_) => ScalarKind::Double,
        }
    }

    /// Whether the data can be uploaded as `ty`
    pub fn matches(&self, ty: UniformType) -> bool {
        let components = ty.components();
        self.scalar() == ty.scalar() && components > 0 && self.len() % components == 0 && !self.is_empty()
    }
}

/// A named uniform value
#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    name: String,
    ty: UniformType,
    data: UniformData,
}

impl Uniform {
    /// Declare a uniform without a value
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: UniformType::None,
            data: UniformData::None,
        }
    }

    /// Create a uniform from raw data
    ///
    /// Returns `None` when the data does not fit the declared type.
    pub fn from_data(name: impl Into<String>, ty: UniformType, data: UniformData) -> Option<Self> {
        data.matches(ty).then(|| Self {
            name: name.into(),
            ty,
            data,
        })
    }

    /// Single `int` (also samplers)
    pub fn int(name: impl Into<String>, value: i32) -> Self {
        Self::new(name).with_int(value)
    }

    /// Single `uint`
    pub fn uint(name: impl Into<String>, value: u32) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_uints(UniformType::UInt, &[value]);
        uniform
    }

    /// Single `float`
    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Self::new(name).with_float(value)
    }

    /// Single `double`
    pub fn double(name: impl Into<String>, value: f64) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_doubles(UniformType::Double, &[value]);
        uniform
    }

    /// Single `vec2`
    pub fn vec2(name: impl Into<String>, value: Vec2) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_floats(UniformType::FloatVec2, value.as_slice());
        uniform
    }

    /// Single `vec3`
    pub fn vec3(name: impl Into<String>, value: Vec3) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_floats(UniformType::FloatVec3, value.as_slice());
        uniform
    }

    /// Single `vec4`
    pub fn vec4(name: impl Into<String>, value: Vec4) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_floats(UniformType::FloatVec4, value.as_slice());
        uniform
    }

    /// Single `mat2`, column-major
    pub fn mat2(name: impl Into<String>, value: &Mat2) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_floats(UniformType::FloatMat2, value.as_slice());
        uniform
    }

    /// Single `mat3`, column-major
    pub fn mat3(name: impl Into<String>, value: &Mat3) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_floats(UniformType::FloatMat3, value.as_slice());
        uniform
    }

    /// Single `mat4`, column-major
    pub fn mat4(name: impl Into<String>, value: &Mat4) -> Self {
        let mut uniform = Self::new(name);
        uniform.set_floats(UniformType::FloatMat4, value.as_slice());
        uniform
    }

    /// Builder-style single `int`
    pub fn with_int(mut self, value: i32) -> Self {
        self.set_ints(UniformType::Int, &[value]);
        self
    }

    /// Builder-style single `float`
    pub fn with_float(mut self, value: f32) -> Self {
        self.set_floats(UniformType::Float, &[value]);
        self
    }

    /// Set signed integer data; the length must be a multiple of the type's components
    pub fn set_ints(&mut self, ty: UniformType, values: &[i32]) -> bool {
        self.assign(ty, UniformData::Int(values.to_vec()))
    }

    /// Set unsigned integer data
    pub fn set_uints(&mut self, ty: UniformType, values: &[u32]) -> bool {
        self.assign(ty, UniformData::UInt(values.to_vec()))
    }

    /// Set float data
    pub fn set_floats(&mut self, ty: UniformType, values: &[f32]) -> bool {
        self.assign(ty, UniformData::Float(values.to_vec()))
    }

    /// Set double data
    pub fn set_doubles(&mut self, ty: UniformType, values: &[f64]) -> bool {
        self.assign(ty, UniformData::Double(values.to_vec()))
    }

    fn assign(&mut self, ty: UniformType, data: UniformData) -> bool {
        if !data.matches(ty) {
            log::warn!(
                "Uniform '{}': {} components of {:?} do not fit {}",
                self.name,
                data.len(),
                data.scalar(),
                ty.glsl_name()
            );
            return false;
        }
        self.ty = ty;
        self.data = data;
        true
    }

    /// Uniform name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared element type
    pub fn ty(&self) -> UniformType {
        self.ty
    }

    /// Stored values
    pub fn data(&self) -> &UniformData {
        &self.data
    }

    /// Number of array elements
    pub fn count(&self) -> usize {
        match self.ty.components() {
            0 => 0,
            n => self.data.len() / n,
        }
    }
}

/// Uniforms keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    uniforms: Vec<Uniform>,
}

impl UniformSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`UniformSet::set_uniform`]
    pub fn with(mut self, uniform: Uniform) -> Self {
        self.set_uniform(uniform);
        self
    }

    /// Insert a uniform, replacing one with the same name
    pub fn set_uniform(&mut self, uniform: Uniform) {
        match self.uniforms.iter_mut().find(|u| u.name == uniform.name) {
            Some(existing) => *existing = uniform,
            None => self.uniforms.push(uniform),
        }
    }

    /// Uniform by name
    pub fn get(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Remove a uniform by name
    pub fn remove(&mut self, name: &str) -> Option<Uniform> {
        let pos = self.uniforms.iter().position(|u| u.name == name)?;
        Some(self.uniforms.remove(pos))
    }

    /// Uniforms in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Uniform> {
        self.uniforms.iter()
    }

    /// Number of uniforms
    pub fn len(&self) -> usize {
        self.uniforms.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glsl_names_round_trip() {
        for ty in UniformType::ALL_DATA {
            assert_eq!(UniformType::from_glsl(ty.glsl_name()), Some(ty));
        }
        assert_eq!(UniformType::from_glsl("sampler2DRect"), Some(UniformType::Int));
        assert_eq!(UniformType::from_glsl("struct"), None);
    }

    #[test]
    fn test_mismatched_data_is_rejected() {
        let mut uniform = Uniform::new("u_Color");
        assert!(!uniform.set_floats(UniformType::FloatVec3, &[1.0, 2.0]));
        assert_eq!(uniform.ty(), UniformType::None);
        assert!(!uniform.set_ints(UniformType::FloatVec2, &[1, 2]));
        assert!(uniform.set_floats(UniformType::FloatVec2, &[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(uniform.count(), 2);
    }

    #[test]
    fn test_set_replaces_by_name() {
        let set = UniformSet::new()
            .with(Uniform::float("u_Alpha", 0.5))
            .with(Uniform::int("u_Tex", 0))
            .with(Uniform::float("u_Alpha", 0.25));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("u_Alpha").map(Uniform::data), Some(&UniformData::Float(vec![0.25])));
    }
}
