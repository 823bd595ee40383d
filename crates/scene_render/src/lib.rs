//! # Scene Render
//!
//! The rendering core of a retained-mode scene graph: given a sorted queue
//! of draw tokens it applies only the GPU state that changed since the
//! previous draw, binds programs and uniforms, and issues the draw calls.
//!
//! ## Features
//!
//! - **Delta State**: Enable flags and render states diffed per draw through a cache
//! - **Shader Programs**: Compile, link, uniform upload and typed read-back
//! - **Draw Calls**: Arrays, elements, range elements and multi-draw encoders
//! - **Level of Detail**: Distance and screen-coverage evaluators
//! - **Depth Peeling**: Dual and front-to-back order-independent transparency
//! - **Headless Device**: A recording backend for tests and tools
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_render::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ctx = RenderContext::new(Box::new(HeadlessDevice::new()));
//!     let mut scene = Scene::new();
//!     let shader = scene.add_shader(Shader::new());
//!     let effect = scene.add_effect(Effect::single(shader));
//!     let triangle = scene.add_renderable(Geometry::triangle(
//!         [0.0, 0.0, 0.0],
//!         [1.0, 0.0, 0.0],
//!         [0.0, 1.0, 0.0],
//!     ));
//!     scene.add_actor(Actor::new(triangle, effect));
//!
//!     let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, Rect::from_size(640, 480), 0.1, 100.0);
//!     let mut renderer = Renderer::new(RendererConfig::default());
//!     renderer.render_scene(&mut ctx, &mut scene, &camera)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::{DepthPeelingConfig, PeelingMode, RendererConfig},
        foundation::math::{Aabb, Mat4, Vec3, Vec4},
        render::{
            api::{GraphicsDevice, Rect, RenderContext},
            backends::HeadlessDevice,
            lod::{DistanceLodEvaluator, LodEvaluator, PixelLodEvaluator},
            program::{ProgramKey, ShaderProgram, ShaderStage, Uniform, UniformSet},
            scene::{Actor, ActorKey, Camera, Effect, Geometry, Renderable, Scene, Shader},
            state::{Capability, RenderState},
            DepthPeelingRenderer, PeelingOutcome, RenderError, RenderQueue, RenderResult, RenderStatistics,
            Renderer, SceneRenderer,
        },
    };
}
