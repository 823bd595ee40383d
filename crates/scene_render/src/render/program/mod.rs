//! # Shader Program Objects
//!
//! Stage compilation, program linking, name-to-location resolution and
//! typed uniform upload.

pub mod program;
pub mod registry;
pub mod stage;
pub mod uniform;

pub use program::{
    ShaderProgram, StandardAttribute, StandardLocations, MODEL_VIEW_MATRIX,
    MODEL_VIEW_PROJECTION_MATRIX, NORMAL_MATRIX, PROJECTION_MATRIX,
};
pub use registry::{ProgramKey, ProgramRegistry};
pub use stage::ShaderStage;
pub use uniform::{ScalarKind, Uniform, UniformData, UniformSet, UniformType};
