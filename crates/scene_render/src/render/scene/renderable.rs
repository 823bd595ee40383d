//! The vertex-submission seam

use std::fmt::Debug;

use crate::foundation::math::Aabb;
use crate::render::api::GraphicsDevice;
use crate::render::RenderResult;

use super::ActorKey;

/// Something that can submit vertices for an actor
///
/// `render` is called with every vertex attribute array disabled and must
/// leave them all disabled again, whatever happens.
pub trait Renderable: Debug {
    /// Submit the vertices
    fn render(&self, actor: ActorKey, device: &mut dyn GraphicsDevice) -> RenderResult<()>;

    /// Object-space bounds
    fn bounds(&self) -> Aabb;

    /// Triangles drawn per render, negative when unknown
    fn triangle_count(&self) -> i64;

    /// Lines drawn per render, negative when unknown
    fn line_count(&self) -> i64;

    /// Points drawn per render, negative when unknown
    fn point_count(&self) -> i64;

    /// Create GPU resources
    fn upload(&mut self, _device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        Ok(())
    }

    /// Release GPU resources
    fn release(&mut self, _device: &mut dyn GraphicsDevice) {}

    /// Whether GPU resources are current
    fn is_uploaded(&self) -> bool {
        true
    }
}
