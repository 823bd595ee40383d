//! # Scene Rendering
//!
//! The rendering core: a typed GPU state model with delta application, GLSL
//! program objects, draw-call encoders, level-of-detail evaluation and two
//! top-level renderers built on them.
//!
//! ## Architecture
//!
//! - **api**: the [`GraphicsDevice`](api::GraphicsDevice) boundary and the
//!   made-current [`RenderContext`](api::RenderContext)
//! - **state**: enable flags, render states and the [`GpuStateCache`](state::GpuStateCache)
//! - **program**: shader stages, programs, uniforms and the program registry
//! - **draw**: index buffers and the draw-call encoders
//! - **scene**: camera, shaders, effects, actors and renderables
//! - **render_queue**: flat, sorted draw tokens with multi-pass links
//! - **renderer**: the single-pass delta-state renderer
//! - **depth_peeling**: order-independent transparency renderers
//!
//! ## Frame Flow
//!
//! ```text
//! Scene ──build──▶ RenderQueue ──▶ Renderer ──▶ GpuStateCache ──▶ GraphicsDevice
//!                                     │                ▲
//!                                     └── ShaderProgram ┘
//! ```

pub mod api;
pub mod backends;
pub mod depth_peeling;
pub mod draw;
pub mod lod;
pub mod program;
pub mod render_queue;
pub mod renderer;
pub mod scene;
pub mod state;

pub use api::{DeviceError, GraphicsDevice, RenderContext};
pub use depth_peeling::{DepthPeelingRenderer, PeelingOutcome};
pub use render_queue::{DrawToken, RenderQueue};
pub use renderer::{Renderer, RenderStatistics, SceneRenderer};

/// Error types for rendering operations
///
/// Recoverable conditions (unsupported state, missing uniform) never reach
/// this type: they are logged and skipped where they occur. What remains are
/// caller bugs and whole-subsystem failures.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// The caller broke a documented precondition
    ///
    /// Examples: linking a program with no stages, uploading a uniform that
    /// carries no data, rendering without a current context.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// A resource exists but is not usable yet (not uploaded, not linked)
    #[error("Resource not ready: {0}")]
    ResourceNotReady(String),

    /// A shader stage failed to compile
    #[error("Shader '{name}' failed to compile: {log}")]
    CompileFailed {
        /// Stage name
        name: String,
        /// Driver info log
        log: String,
    },

    /// A program failed to link
    #[error("Program '{name}' failed to link: {log}")]
    LinkFailed {
        /// Program name
        name: String,
        /// Driver info log
        log: String,
    },

    /// The device cannot perform the operation at all
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Render target or buffer allocation failed
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// A key or name does not refer to a live resource
    #[error("Missing resource: {0}")]
    MissingResource(String),

    /// Error raised by the device
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

impl RenderError {
    /// Build a contract violation, reporting it at error severity
    pub fn contract(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("Contract violation: {}", message);
        Self::ContractViolation(message)
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
