//! Device boundary and the made-current render context

pub mod context;
pub mod graphics_device;
pub mod types;

pub use context::RenderContext;
pub use graphics_device::{
    ActiveUniform, BufferId, DeviceCapabilities, DeviceError, DeviceResult, FramebufferId,
    GraphicsDevice, IndexRange, IndexSource, ProgramId, QueryId, ShaderId, TextureId,
    UniformLocation, VertexAttribLayout,
};
pub use types::*;
