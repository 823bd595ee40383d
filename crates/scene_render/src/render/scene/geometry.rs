//! # Geometry
//!
//! The stock [`Renderable`]: per-vertex arrays in separate buffer objects
//! plus one or more [`DrawCall`]s over them.
//!
//! Attributes are fed at the [`StandardAttribute`] locations every program
//! binds before linking. A geometry without colours feeds a constant white
//! colour instead.

use crate::foundation::math::Aabb;
use crate::render::api::{BufferId, BufferKind, GraphicsDevice, IndexRange, PrimitiveType, VertexAttribLayout};
use crate::render::draw::{DrawArrays, DrawCall, DrawElements, IndexData, COUNT_UNKNOWN};
use crate::render::program::StandardAttribute;
use crate::render::{RenderError, RenderResult};

use super::renderable::Renderable;
use super::ActorKey;

#[derive(Debug, Clone, Copy)]
struct VertexBuffers {
    positions: BufferId,
    normals: Option<BufferId>,
    colors: Option<BufferId>,
    tex_coords: Option<BufferId>,
}

/// Vertex arrays and the draw calls that consume them
#[derive(Debug, Clone)]
pub struct Geometry {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    colors: Vec<[f32; 4]>,
    tex_coords: Vec<[f32; 2]>,
    draw_calls: Vec<DrawCall>,
    buffers: Option<VertexBuffers>,
    stale: bool,
}

impl Geometry {
    /// Geometry with positions only and no draw calls
    pub fn new(positions: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            normals: Vec::new(),
            colors: Vec::new(),
            tex_coords: Vec::new(),
            draw_calls: Vec::new(),
            buffers: None,
            stale: true,
        }
    }

    /// One indexed triangle
    pub fn triangle(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Self {
        Self::new(vec![a, b, c]).with_draw_call(DrawElements::new(PrimitiveType::Triangles, IndexData::U8(vec![0, 1, 2])))
    }

    /// Full-screen quad in normalized device coordinates, drawn as a strip
    pub fn quad_ndc() -> Self {
        Self::new(vec![
            [-1.0, -1.0, 0.0],
            [1.0, -1.0, 0.0],
            [-1.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ])
        .with_tex_coords(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])
        .with_draw_call(DrawArrays::new(PrimitiveType::TriangleStrip, 0, 4))
    }

    /// Builder-style normals, one per position
    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = normals;
        self.stale = true;
        self
    }

    /// Builder-style colours, one per position
    pub fn with_colors(mut self, colors: Vec<[f32; 4]>) -> Self {
        self.colors = colors;
        self.stale = true;
        self
    }

    /// Builder-style texture coordinates, one per position
    pub fn with_tex_coords(mut self, tex_coords: Vec<[f32; 2]>) -> Self {
        self.tex_coords = tex_coords;
        self.stale = true;
        self
    }

    /// Builder-style draw call
    pub fn with_draw_call(mut self, call: impl Into<DrawCall>) -> Self {
        self.draw_calls.push(call.into());
        self.stale = true;
        self
    }

    /// Split one index list into sub-ranges drawn with a single multi-draw
    pub fn with_multi_draw(self, mode: PrimitiveType, indices: &[u32], ranges: Vec<IndexRange>) -> Self {
        self.with_draw_call(crate::render::draw::MultiDrawElements::new(mode, IndexData::compact(indices), ranges))
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Draw calls
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Draw calls, for editing; the geometry must be uploaded again
    pub fn draw_calls_mut(&mut self) -> &mut Vec<DrawCall> {
        self.stale = true;
        &mut self.draw_calls
    }

    fn check_arrays(&self) -> RenderResult<()> {
        let n = self.positions.len();
        let mismatched = [
            ("normals", self.normals.len()),
            ("colors", self.colors.len()),
            ("texture coordinates", self.tex_coords.len()),
        ]
        .into_iter()
        .find(|&(_, len)| len != 0 && len != n);
        match mismatched {
            Some((what, len)) => Err(RenderError::contract(format!(
                "geometry has {} positions but {} {}",
                n, len, what
            ))),
            None => Ok(()),
        }
    }

    fn upload_array(device: &mut dyn GraphicsDevice, existing: Option<BufferId>, bytes: &[u8]) -> RenderResult<Option<BufferId>> {
        if bytes.is_empty() {
            if let Some(buffer) = existing {
                device.delete_buffer(buffer);
            }
            return Ok(None);
        }
        let buffer = match existing {
            Some(buffer) => buffer,
            None => device.create_buffer()?,
        };
        device.upload_buffer(buffer, BufferKind::Vertex, bytes)?;
        Ok(Some(buffer))
    }

    fn submit(&self, device: &mut dyn GraphicsDevice, buffers: &VertexBuffers, enabled: &mut Vec<u32>) -> RenderResult<()> {
        let arrays = [
            (StandardAttribute::Position, Some(buffers.positions), 3u8),
            (StandardAttribute::Normal, buffers.normals, 3),
            (StandardAttribute::Color, buffers.colors, 4),
            (StandardAttribute::TexCoord0, buffers.tex_coords, 2),
        ];
        for (attribute, buffer, components) in arrays {
            let index = attribute.location();
            match buffer {
                Some(buffer) => {
                    let layout = VertexAttribLayout { buffer, components, stride: 0, offset: 0 };
                    device.enable_vertex_attrib(index, &layout)?;
                    enabled.push(index);
                }
                None if attribute == StandardAttribute::Color => {
                    device.set_vertex_attrib_constant(index, [1.0, 1.0, 1.0, 1.0]);
                }
                None => {}
            }
        }
        for call in &self.draw_calls {
            call.encode(device)?;
        }
        Ok(())
    }

    fn sum_counts(&self, count: impl Fn(&DrawCall) -> i64) -> i64 {
        let mut total = 0;
        for call in &self.draw_calls {
            let n = count(call);
            if n < 0 {
                return COUNT_UNKNOWN;
            }
            total += n;
        }
        total
    }
}

impl Renderable for Geometry {
    fn render(&self, actor: ActorKey, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let Some(buffers) = self.buffers.filter(|_| !self.stale) else {
            return Err(RenderError::ResourceNotReady(format!(
                "geometry of actor {:?} is not uploaded",
                actor
            )));
        };
        let mut enabled = Vec::with_capacity(4);
        let result = self.submit(device, &buffers, &mut enabled);
        for index in enabled {
            device.disable_vertex_attrib(index);
        }
        result
    }

    fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }

    fn triangle_count(&self) -> i64 {
        self.sum_counts(DrawCall::triangle_count)
    }

    fn line_count(&self) -> i64 {
        self.sum_counts(DrawCall::line_count)
    }

    fn point_count(&self) -> i64 {
        self.sum_counts(DrawCall::point_count)
    }

    fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.check_arrays()?;
        let existing = self.buffers;
        let positions = Self::upload_array(device, existing.map(|b| b.positions), bytemuck::cast_slice(&self.positions))?;
        let Some(positions) = positions else {
            return Err(RenderError::contract("geometry has no positions"));
        };
        let normals = Self::upload_array(device, existing.and_then(|b| b.normals), bytemuck::cast_slice(&self.normals))?;
        let colors = Self::upload_array(device, existing.and_then(|b| b.colors), bytemuck::cast_slice(&self.colors))?;
        let tex_coords = Self::upload_array(device, existing.and_then(|b| b.tex_coords), bytemuck::cast_slice(&self.tex_coords))?;
        self.buffers = Some(VertexBuffers { positions, normals, colors, tex_coords });

        for call in &mut self.draw_calls {
            call.upload(device)?;
        }
        self.stale = false;
        log::debug!(
            "Uploaded geometry: {} vertices, {} draw calls",
            self.positions.len(),
            self.draw_calls.len()
        );
        Ok(())
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(buffers) = self.buffers.take() {
            device.delete_buffer(buffers.positions);
            for buffer in [buffers.normals, buffers.colors, buffers.tex_coords].into_iter().flatten() {
                device.delete_buffer(buffer);
            }
        }
        for call in &mut self.draw_calls {
            call.release(device);
        }
        self.stale = true;
    }

    fn is_uploaded(&self) -> bool {
        self.buffers.is_some() && !self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};

    fn triangle() -> Geometry {
        Geometry::triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0])
    }

    #[test]
    fn test_render_requires_upload() {
        let mut device = HeadlessDevice::new();
        let err = triangle().render(ActorKey::default(), &mut device).unwrap_err();
        assert!(matches!(err, RenderError::ResourceNotReady(_)));
    }

    #[test]
    fn test_render_leaves_attributes_disabled() {
        let mut device = HeadlessDevice::new();
        let mut geometry = triangle().with_normals(vec![[0.0, 0.0, 1.0]; 3]);
        geometry.upload(&mut device).unwrap();
        device.clear_calls();

        geometry.render(ActorKey::default(), &mut device).unwrap();
        assert_eq!(device.draw_count(), 1);
        assert_eq!(device.enabled_vertex_attribs(), 0);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::EnableVertexAttrib(_))),
            device.count_calls(|c| matches!(c, DeviceCall::DisableVertexAttrib(_)))
        );
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::VertexAttribConstant { index: 2, .. })),
            1
        );
    }

    #[test]
    fn test_mismatched_arrays_are_rejected() {
        let mut device = HeadlessDevice::new();
        let mut geometry = triangle().with_colors(vec![[1.0; 4]; 2]);
        assert!(matches!(geometry.upload(&mut device), Err(RenderError::ContractViolation(_))));
    }

    #[test]
    fn test_counts_and_bounds() {
        let quad = Geometry::quad_ndc();
        assert_eq!(quad.triangle_count(), 2);
        assert_eq!(quad.bounds().extents().x, 2.0);
        assert_eq!(triangle().triangle_count(), 1);
    }
}
