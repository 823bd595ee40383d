//! The native graphics boundary
//!
//! Everything the renderer does to the GPU goes through [`GraphicsDevice`].
//! The trait is deliberately close to the native API: one method per native
//! entry point, plain handles, no hidden state. All caching and diffing lives
//! above it in [`GpuStateCache`](crate::render::state::GpuStateCache).
//!
//! ## Fixed-function state
//!
//! Materials, lights, clip planes, alpha test and legacy matrices only exist
//! on compatibility contexts. Their default implementations report
//! [`DeviceError::Unsupported`] so a core-profile backend only overrides what
//! it can honour.

use std::any::Any;

use crate::foundation::math::{Mat4, Vec4};
use crate::render::program::{UniformData, UniformType};
use crate::render::state::Capability;

use super::types::{
    Attachment, BlendEquation, BlendFactor, BufferKind, ClearFlags, CompareFunc, Face,
    IndexType, Light, Material, PolygonRasterMode, PrimitiveType, Rect, ShaderStageKind,
    StencilOp, TextureDesc, TextureTarget, Winding,
};

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported by a graphics device
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The driver or context does not support the feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A shader stage failed to compile
    #[error("Shader compilation failed: {log}")]
    CompileFailed {
        /// Driver info log
        log: String,
    },

    /// A program failed to link
    #[error("Program link failed: {log}")]
    LinkFailed {
        /// Driver info log
        log: String,
    },

    /// The driver could not allocate an object
    #[error("Out of resources: {0}")]
    OutOfResources(String),

    /// A handle does not name a live object
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Any other error raised by the native API
    #[error("Native error: {0}")]
    Native(String),
}

macro_rules! handle_type {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

handle_type! {
    /// Native program object
    ProgramId,
    /// Native shader stage object
    ShaderId,
    /// Native buffer object
    BufferId,
    /// Native texture object
    TextureId,
    /// Native framebuffer object
    FramebufferId,
    /// Native query object
    QueryId,
}

/// Resolved uniform location within a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

/// A uniform reported active by the linker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    /// Name as reported by the driver (arrays end in `[0]`)
    pub name: String,
    /// Element type
    pub ty: UniformType,
    /// Array length, `1` for non-arrays
    pub count: usize,
}

/// Where indexed draws read their indices from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource<'a> {
    /// The currently bound index buffer, starting at a byte offset
    Bound {
        /// Byte offset into the buffer
        offset: usize,
    },
    /// Client-side index bytes
    Client(&'a [u8]),
}

/// One sub-range of a multi-draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    /// First index (not byte) of the range
    pub first: u32,
    /// Number of indices
    pub count: u32,
}

/// Float vertex attribute fed from a buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribLayout {
    /// Source buffer
    pub buffer: BufferId,
    /// Components per vertex (1 to 4)
    pub components: u8,
    /// Byte stride between vertices, `0` for tightly packed
    pub stride: u32,
    /// Byte offset of the first component
    pub offset: u32,
}

/// Hardware limits and feature availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Number of combined texture image units
    pub max_texture_units: u32,
    /// Number of fixed-function lights
    pub max_lights: u32,
    /// Number of user clip planes
    pub max_clip_planes: u32,
    /// Fixed-function pipeline (materials, lights, legacy matrices) is present
    pub fixed_function: bool,
    /// Occlusion queries are available
    pub occlusion_query: bool,
    /// Double-precision uniforms are available
    pub double_precision_uniforms: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_lights: 8,
            max_clip_planes: 6,
            fixed_function: false,
            occlusion_query: true,
            double_precision_uniforms: false,
        }
    }
}

fn unsupported<T>(what: &str) -> DeviceResult<T> {
    Err(DeviceError::Unsupported(what.to_string()))
}

/// A made-current native graphics context
///
/// Implementations are single-threaded: the context belongs to the thread
/// that made it current and every call happens on that thread.
pub trait GraphicsDevice {
    /// Hardware limits and feature flags
    fn capabilities(&self) -> DeviceCapabilities;

    /// Whether the context is current on the calling thread
    fn is_current(&self) -> bool;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Report and clear the first pending native error
    fn check_error(&mut self) -> DeviceResult<()>;

    // === Capabilities ===

    /// Enable or disable a capability
    fn set_capability(&mut self, cap: Capability, enabled: bool) -> DeviceResult<()>;

    /// Enable or disable the scissor test
    fn set_scissor_test(&mut self, enabled: bool);

    /// Enable or disable fixed-index primitive restart
    fn set_primitive_restart(&mut self, enabled: bool);

    // === Value-bearing state ===

    /// Separate RGB and alpha blend factors
    fn blend_func(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> DeviceResult<()>;

    /// Separate RGB and alpha blend equations
    fn blend_equation(&mut self, rgb: BlendEquation, alpha: BlendEquation) -> DeviceResult<()>;

    /// Constant blend colour
    fn blend_color(&mut self, color: [f32; 4]) -> DeviceResult<()>;

    /// Alpha test function (fixed-function)
    fn alpha_func(&mut self, _func: CompareFunc, _reference: f32) -> DeviceResult<()> {
        unsupported("alpha test")
    }

    /// Depth comparison
    fn depth_func(&mut self, func: CompareFunc) -> DeviceResult<()>;

    /// Depth writes
    fn depth_mask(&mut self, write: bool) -> DeviceResult<()>;

    /// Depth range mapping
    fn depth_range(&mut self, near: f64, far: f64) -> DeviceResult<()>;

    /// Per-channel colour writes
    fn color_mask(&mut self, mask: [bool; 4]) -> DeviceResult<()>;

    /// Polygon rasterization
    fn polygon_mode(&mut self, face: Face, mode: PolygonRasterMode) -> DeviceResult<()>;

    /// Faces removed by culling
    fn cull_face(&mut self, face: Face) -> DeviceResult<()>;

    /// Winding that counts as front facing
    fn front_face(&mut self, winding: Winding) -> DeviceResult<()>;

    /// Depth offset for filled/line/point polygons
    fn polygon_offset(&mut self, factor: f32, units: f32) -> DeviceResult<()>;

    /// Rasterized line width
    fn line_width(&mut self, width: f32) -> DeviceResult<()>;

    /// Rasterized point size
    fn point_size(&mut self, size: f32) -> DeviceResult<()>;

    /// Stencil test function
    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32) -> DeviceResult<()>;

    /// Stencil operations
    fn stencil_op(&mut self, sfail: StencilOp, dpfail: StencilOp, dppass: StencilOp)
        -> DeviceResult<()>;

    /// Stencil write mask
    fn stencil_mask(&mut self, mask: u32) -> DeviceResult<()>;

    /// Front and back material (fixed-function), `None` restores the default
    fn set_material(&mut self, _material: Option<&Material>) -> DeviceResult<()> {
        unsupported("materials")
    }

    /// Configure and enable light `index` (fixed-function), `None` disables it
    fn set_light(&mut self, _index: u32, _light: Option<&Light>) -> DeviceResult<()> {
        unsupported("lights")
    }

    /// Configure and enable clip plane `index` with an eye-space equation, `None` disables it
    fn set_clip_plane(&mut self, _index: u32, _equation: Option<Vec4>) -> DeviceResult<()> {
        unsupported("clip planes")
    }

    /// Bind a texture to a texture unit, `None` unbinds
    fn bind_texture(
        &mut self,
        unit: u32,
        target: TextureTarget,
        texture: Option<TextureId>,
    ) -> DeviceResult<()>;

    /// Load the legacy model-view and projection matrices (fixed-function)
    fn load_matrices(&mut self, _model_view: &Mat4, _projection: &Mat4) -> DeviceResult<()> {
        unsupported("fixed-function matrices")
    }

    // === Program objects ===

    /// Create an empty program object
    fn create_program(&mut self) -> DeviceResult<ProgramId>;

    /// Delete a program object
    fn delete_program(&mut self, program: ProgramId);

    /// Create a shader stage object
    fn create_shader(&mut self, kind: ShaderStageKind) -> DeviceResult<ShaderId>;

    /// Delete a shader stage object
    fn delete_shader(&mut self, shader: ShaderId);

    /// Compile source into a stage, returning the info log on failure
    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> DeviceResult<()>;

    /// Attach a compiled stage
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> DeviceResult<()>;

    /// Detach a stage
    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) -> DeviceResult<()>;

    /// Bind an attribute name to a location for the next link
    fn bind_attrib_location(&mut self, program: ProgramId, index: u32, name: &str)
        -> DeviceResult<()>;

    /// Link attached stages, returning the info log on failure
    fn link_program(&mut self, program: ProgramId) -> DeviceResult<()>;

    /// Uniforms reported active by the last successful link
    fn active_uniforms(&mut self, program: ProgramId) -> DeviceResult<Vec<ActiveUniform>>;

    /// Location of a uniform, `None` when the linker removed it
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Location of a vertex attribute, `None` when inactive
    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<u32>;

    /// Make a program current, `None` unbinds
    fn use_program(&mut self, program: Option<ProgramId>);

    /// Currently bound program
    fn bound_program(&self) -> Option<ProgramId>;

    /// Upload to a uniform of the bound program
    fn set_uniform(
        &mut self,
        location: UniformLocation,
        ty: UniformType,
        data: &UniformData,
    ) -> DeviceResult<()>;

    /// Read back `count` elements of a uniform
    fn get_uniform(
        &mut self,
        program: ProgramId,
        location: UniformLocation,
        ty: UniformType,
        count: usize,
    ) -> DeviceResult<UniformData>;

    // === Buffers and vertex input ===

    /// Create a buffer object
    fn create_buffer(&mut self) -> DeviceResult<BufferId>;

    /// Delete a buffer object
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Replace a buffer's contents
    fn upload_buffer(&mut self, buffer: BufferId, kind: BufferKind, data: &[u8])
        -> DeviceResult<()>;

    /// Bind the element buffer, `None` unbinds
    fn bind_index_buffer(&mut self, buffer: Option<BufferId>);

    /// Currently bound element buffer
    fn bound_index_buffer(&self) -> Option<BufferId>;

    /// Feed attribute `index` from a buffer and enable the array
    fn enable_vertex_attrib(&mut self, index: u32, layout: &VertexAttribLayout)
        -> DeviceResult<()>;

    /// Disable attribute array `index`
    fn disable_vertex_attrib(&mut self, index: u32);

    /// Constant value used while attribute array `index` is disabled
    fn set_vertex_attrib_constant(&mut self, index: u32, value: [f32; 4]);

    // === Draw calls ===

    /// Non-indexed draw
    fn draw_arrays(&mut self, mode: PrimitiveType, first: u32, count: u32, instances: u32)
        -> DeviceResult<()>;

    /// Indexed draw
    fn draw_elements(
        &mut self,
        mode: PrimitiveType,
        count: u32,
        index_type: IndexType,
        source: IndexSource<'_>,
        instances: u32,
    ) -> DeviceResult<()>;

    /// Indexed draw with an index range hint
    fn draw_range_elements(
        &mut self,
        mode: PrimitiveType,
        start: u32,
        end: u32,
        count: u32,
        index_type: IndexType,
        source: IndexSource<'_>,
        instances: u32,
    ) -> DeviceResult<()>;

    /// Several indexed sub-ranges in one native call
    fn multi_draw_elements(
        &mut self,
        mode: PrimitiveType,
        index_type: IndexType,
        source: IndexSource<'_>,
        ranges: &[IndexRange],
        instances: u32,
    ) -> DeviceResult<()>;

    // === Render targets ===

    /// Set the viewport
    fn set_viewport(&mut self, rect: Rect);

    /// Set the scissor rectangle
    fn set_scissor(&mut self, rect: Rect);

    /// Clear buffers of the bound framebuffer
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f64);

    /// Clear one colour draw buffer of the bound framebuffer
    fn clear_color_buffer(&mut self, draw_buffer: u32, color: [f32; 4]);

    /// Allocate a texture
    fn create_texture(&mut self, desc: &TextureDesc) -> DeviceResult<TextureId>;

    /// Delete a texture
    fn delete_texture(&mut self, texture: TextureId);

    /// Create a framebuffer object
    fn create_framebuffer(&mut self) -> DeviceResult<FramebufferId>;

    /// Delete a framebuffer object
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Attach a texture to the bound framebuffer, `None` detaches
    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: Option<TextureId>,
    ) -> DeviceResult<()>;

    /// Verify framebuffer completeness
    fn check_framebuffer(&mut self, framebuffer: FramebufferId) -> DeviceResult<()>;

    /// Bind a framebuffer, `None` selects the default framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Select colour attachments written by fragment outputs
    fn set_draw_buffers(&mut self, attachments: &[u32]) -> DeviceResult<()>;

    // === Occlusion queries ===

    /// Create a query object
    fn create_query(&mut self) -> DeviceResult<QueryId>;

    /// Delete a query object
    fn delete_query(&mut self, query: QueryId);

    /// Start counting samples passed
    fn begin_occlusion_query(&mut self, query: QueryId) -> DeviceResult<()>;

    /// Stop counting samples passed
    fn end_occlusion_query(&mut self) -> DeviceResult<()>;

    /// Block until the query result is available and return it
    fn occlusion_query_result(&mut self, query: QueryId) -> DeviceResult<u64>;
}
