//! # Draw Calls
//!
//! One closed set of encoders, each issuing exactly one native draw:
//!
//! - [`DrawArrays`]: sequential vertices
//! - [`DrawElements`]: indexed
//! - [`DrawRangeElements`]: indexed with a `[start, end]` hint
//! - [`MultiDrawElements`]: several index sub-ranges of one buffer
//!
//! Every encoder carries an instance count, 1 by default. Primitive counts
//! are per instance times the instance count.
//!
//! ## Index Buffer Binding
//!
//! Indexed encoders bind their buffer object (or none, for client-side
//! indices) right before the draw and always leave the binding at none.
//!
//! ## Primitive Restart
//!
//! With restart on, the maximum value of the index type ends the current
//! strip. Primitive counts can no longer be derived from the index count, so
//! every count query returns [`COUNT_UNKNOWN`].

use crate::render::api::{GraphicsDevice, IndexRange, PrimitiveType};
use crate::render::RenderResult;

use super::index_buffer::IndexBuffer;

/// Primitive count that cannot be computed
pub const COUNT_UNKNOWN: i64 = -1;

fn triangles(mode: PrimitiveType, n: i64) -> i64 {
    match mode {
        PrimitiveType::Triangles => n / 3,
        PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan | PrimitiveType::Polygon => (n - 2).max(0),
        PrimitiveType::Quads => n / 4 * 2,
        PrimitiveType::QuadStrip => ((n - 2) / 2).max(0) * 2,
        PrimitiveType::TrianglesAdjacency => n / 6,
        PrimitiveType::TriangleStripAdjacency => ((n - 4) / 2).max(0),
        _ => 0,
    }
}

fn lines(mode: PrimitiveType, n: i64) -> i64 {
    match mode {
        PrimitiveType::Lines => n / 2,
        PrimitiveType::LineStrip => (n - 1).max(0),
        PrimitiveType::LineLoop if n > 1 => n,
        PrimitiveType::LinesAdjacency => n / 4,
        PrimitiveType::LineStripAdjacency => (n - 3).max(0),
        _ => 0,
    }
}

fn points(mode: PrimitiveType, n: i64) -> i64 {
    match mode {
        PrimitiveType::Points => n,
        _ => 0,
    }
}

/// Non-indexed draw of `count` vertices from `start`
#[derive(Debug, Clone, PartialEq)]
pub struct DrawArrays {
    /// Topology
    pub mode: PrimitiveType,
    /// First vertex
    pub start: u32,
    /// Vertex count
    pub count: u32,
    /// Instance count
    pub instances: u32,
}

impl DrawArrays {
    /// Draw `count` vertices from `start`
    pub fn new(mode: PrimitiveType, start: u32, count: u32) -> Self {
        Self { mode, start, count, instances: 1 }
    }

    /// Set the instance count
    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances.max(1);
        self
    }
}

/// Indexed draw of a whole index buffer
#[derive(Debug, Clone)]
pub struct DrawElements {
    /// Topology
    pub mode: PrimitiveType,
    /// Indices
    pub indices: IndexBuffer,
    /// Instance count
    pub instances: u32,
    /// Restart strips at the maximum index value
    pub primitive_restart: bool,
}

impl DrawElements {
    /// Draw every index
    pub fn new(mode: PrimitiveType, indices: impl Into<IndexBuffer>) -> Self {
        Self {
            mode,
            indices: indices.into(),
            instances: 1,
            primitive_restart: false,
        }
    }

    /// Set the instance count
    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances.max(1);
        self
    }

    /// Enable primitive restart
    pub fn with_primitive_restart(mut self, enabled: bool) -> Self {
        self.primitive_restart = enabled;
        self
    }
}

/// Indexed draw with a driver hint of the referenced vertex range
#[derive(Debug, Clone)]
pub struct DrawRangeElements {
    /// Topology
    pub mode: PrimitiveType,
    /// Indices
    pub indices: IndexBuffer,
    /// `[start, end]` hint, computed from the indices when `None`
    pub range: Option<(u32, u32)>,
    /// Instance count
    pub instances: u32,
    /// Restart strips at the maximum index value
    pub primitive_restart: bool,
}

impl DrawRangeElements {
    /// Draw every index, computing the range hint
    pub fn new(mode: PrimitiveType, indices: impl Into<IndexBuffer>) -> Self {
        Self {
            mode,
            indices: indices.into(),
            range: None,
            instances: 1,
            primitive_restart: false,
        }
    }

    /// Set the instance count
    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances.max(1);
        self
    }

    /// Supply the range hint
    pub fn with_range(mut self, start: u32, end: u32) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Enable primitive restart
    pub fn with_primitive_restart(mut self, enabled: bool) -> Self {
        self.primitive_restart = enabled;
        self
    }

    /// The range hint to pass to the driver
    pub fn effective_range(&self) -> Option<(u32, u32)> {
        self.range.or_else(|| self.indices.data().min_max(self.primitive_restart))
    }
}

/// Several independent index sub-ranges drawn by one native call
#[derive(Debug, Clone)]
pub struct MultiDrawElements {
    /// Topology
    pub mode: PrimitiveType,
    /// Indices shared by every sub-range
    pub indices: IndexBuffer,
    /// Sub-ranges, in indices
    pub ranges: Vec<IndexRange>,
    /// Instance count, applied to every sub-range
    pub instances: u32,
    /// Restart strips at the maximum index value
    pub primitive_restart: bool,
}

impl MultiDrawElements {
    /// Draw the given sub-ranges of `indices`
    pub fn new(mode: PrimitiveType, indices: impl Into<IndexBuffer>, ranges: Vec<IndexRange>) -> Self {
        Self {
            mode,
            indices: indices.into(),
            ranges,
            instances: 1,
            primitive_restart: false,
        }
    }

    /// Set the instance count
    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances.max(1);
        self
    }

    /// Enable primitive restart
    pub fn with_primitive_restart(mut self, enabled: bool) -> Self {
        self.primitive_restart = enabled;
        self
    }
}

/// A draw-call encoder
#[derive(Debug, Clone)]
pub enum DrawCall {
    /// Sequential vertices
    Arrays(DrawArrays),
    /// Whole index buffer
    Elements(DrawElements),
    /// Index buffer with range hint
    RangeElements(DrawRangeElements),
    /// Several index sub-ranges
    MultiElements(MultiDrawElements),
}

impl From<DrawArrays> for DrawCall {
    fn from(call: DrawArrays) -> Self {
        Self::Arrays(call)
    }
}

impl From<DrawElements> for DrawCall {
    fn from(call: DrawElements) -> Self {
        Self::Elements(call)
    }
}

impl From<DrawRangeElements> for DrawCall {
    fn from(call: DrawRangeElements) -> Self {
        Self::RangeElements(call)
    }
}

impl From<MultiDrawElements> for DrawCall {
    fn from(call: MultiDrawElements) -> Self {
        Self::MultiElements(call)
    }
}

impl DrawCall {
    /// Topology
    pub fn mode(&self) -> PrimitiveType {
        match self {
            Self::Arrays(c) => c.mode,
            Self::Elements(c) => c.mode,
            Self::RangeElements(c) => c.mode,
            Self::MultiElements(c) => c.mode,
        }
    }

    /// Instance count
    pub fn instances(&self) -> u32 {
        match self {
            Self::Arrays(c) => c.instances,
            Self::Elements(c) => c.instances,
            Self::RangeElements(c) => c.instances,
            Self::MultiElements(c) => c.instances,
        }
    }

    /// Whether primitive restart is on
    pub fn primitive_restart(&self) -> bool {
        match self {
            Self::Arrays(_) => false,
            Self::Elements(c) => c.primitive_restart,
            Self::RangeElements(c) => c.primitive_restart,
            Self::MultiElements(c) => c.primitive_restart,
        }
    }

    /// Indices, for indexed encoders
    pub fn indices(&self) -> Option<&IndexBuffer> {
        match self {
            Self::Arrays(_) => None,
            Self::Elements(c) => Some(&c.indices),
            Self::RangeElements(c) => Some(&c.indices),
            Self::MultiElements(c) => Some(&c.indices),
        }
    }

    fn indices_mut(&mut self) -> Option<&mut IndexBuffer> {
        match self {
            Self::Arrays(_) => None,
            Self::Elements(c) => Some(&mut c.indices),
            Self::RangeElements(c) => Some(&mut c.indices),
            Self::MultiElements(c) => Some(&mut c.indices),
        }
    }

    /// Sum `count` over every vertex run the call draws, or [`COUNT_UNKNOWN`]
    fn count_with(&self, count: fn(PrimitiveType, i64) -> i64) -> i64 {
        if self.primitive_restart() {
            return COUNT_UNKNOWN;
        }
        let mode = self.mode();
        let per_instance = match self {
            Self::Arrays(c) => count(mode, i64::from(c.count)),
            Self::Elements(c) => count(mode, c.indices.data().len() as i64),
            Self::RangeElements(c) => count(mode, c.indices.data().len() as i64),
            Self::MultiElements(c) => c.ranges.iter().map(|r| count(mode, i64::from(r.count))).sum(),
        };
        per_instance * i64::from(self.instances())
    }

    /// Triangles drawn, or [`COUNT_UNKNOWN`] with primitive restart
    pub fn triangle_count(&self) -> i64 {
        self.count_with(triangles)
    }

    /// Lines drawn, or [`COUNT_UNKNOWN`] with primitive restart
    pub fn line_count(&self) -> i64 {
        self.count_with(lines)
    }

    /// Points drawn, or [`COUNT_UNKNOWN`] with primitive restart
    pub fn point_count(&self) -> i64 {
        self.count_with(points)
    }

    /// Upload the index buffer, if any
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        match self.indices_mut() {
            Some(indices) => indices.upload(device),
            None => Ok(()),
        }
    }

    /// Release the index buffer object, if any
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(indices) = self.indices_mut() {
            indices.release(device);
        }
    }

    /// Issue the native draw
    ///
    /// Draws with no indices, or whose every index is a restart index, issue
    /// nothing.
    pub fn encode(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let Some(indices) = self.indices() else {
            let Self::Arrays(c) = self else {
                return Ok(());
            };
            if c.count > 0 {
                device.draw_arrays(c.mode, c.start, c.count, c.instances)?;
            }
            return Ok(());
        };

        let data = indices.data();
        if data.is_empty() {
            log::trace!("Skipping indexed draw with no indices");
            return Ok(());
        }
        let range = match self {
            Self::RangeElements(c) => match c.effective_range() {
                Some(range) => Some(range),
                None => return Ok(()),
            },
            _ => None,
        };

        let restart = self.primitive_restart();
        let index_type = data.index_type();
        let (source, buffer) = indices.source();

        device.bind_index_buffer(buffer);
        if restart {
            device.set_primitive_restart(true);
        }
        let count = data.len() as u32;
        let result = match self {
            Self::Elements(c) => device.draw_elements(c.mode, count, index_type, source, c.instances),
            Self::RangeElements(c) => {
                let (start, end) = range.unwrap_or((0, 0));
                device.draw_range_elements(c.mode, start, end, count, index_type, source, c.instances)
            }
            Self::MultiElements(c) => device.multi_draw_elements(c.mode, index_type, source, &c.ranges, c.instances),
            Self::Arrays(_) => Ok(()),
        };
        if restart {
            device.set_primitive_restart(false);
        }
        if buffer.is_some() {
            device.bind_index_buffer(None);
        }
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};
    use crate::render::draw::IndexData;

    fn elements(mode: PrimitiveType, indices: &[u32]) -> DrawCall {
        DrawElements::new(mode, IndexData::compact(indices)).into()
    }

    #[test]
    fn test_primitive_counts() {
        let list = elements(PrimitiveType::Triangles, &[0, 1, 2, 2, 1, 3]);
        assert_eq!(list.triangle_count(), 2);
        assert_eq!(list.line_count(), 0);

        let strip = elements(PrimitiveType::TriangleStrip, &[0, 1, 2, 3, 4]);
        assert_eq!(strip.triangle_count(), 3);

        let fan = DrawCall::from(DrawArrays::new(PrimitiveType::LineStrip, 0, 4).with_instances(3));
        assert_eq!(fan.line_count(), 9);

        let dots = DrawCall::from(DrawArrays::new(PrimitiveType::Points, 0, 7));
        assert_eq!(dots.point_count(), 7);
    }

    #[test]
    fn test_multi_draw_counts_each_range_once() {
        let call = DrawCall::from(MultiDrawElements::new(
            PrimitiveType::TriangleStrip,
            IndexData::compact(&[0, 1, 2, 3, 4, 5, 6, 7, 8]),
            vec![IndexRange { first: 0, count: 3 }, IndexRange { first: 3, count: 6 }],
        ));
        assert_eq!(call.triangle_count(), 1 + 4);
        assert_eq!(call.line_count(), 0);
    }

    #[test]
    fn test_restart_makes_every_count_unknown() {
        let call = DrawCall::from(
            DrawElements::new(PrimitiveType::TriangleStrip, IndexData::U16(vec![0, 1, 2, u16::MAX, 3, 4, 5]))
                .with_primitive_restart(true),
        );
        assert_eq!(call.triangle_count(), COUNT_UNKNOWN);
        assert_eq!(call.line_count(), COUNT_UNKNOWN);
        assert_eq!(call.point_count(), COUNT_UNKNOWN);
    }

    #[test]
    fn test_encode_issues_one_draw_and_unbinds() {
        let mut device = HeadlessDevice::new();
        let mut call = elements(PrimitiveType::Triangles, &[0, 1, 2]);
        call.upload(&mut device).unwrap();
        device.clear_calls();

        call.encode(&mut device).unwrap();
        assert_eq!(device.draw_count(), 1);
        assert_eq!(device.bound_index_buffer(), None);
        assert!(matches!(
            device.calls().last(),
            Some(DeviceCall::BindIndexBuffer(None))
        ));
    }

    #[test]
    fn test_client_side_indices() {
        let mut device = HeadlessDevice::new();
        let call = elements(PrimitiveType::Triangles, &[0, 1, 2]);
        call.encode(&mut device).unwrap();
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DrawElements { from_buffer: false, count: 3, .. })),
            1
        );
        assert_eq!(device.bound_index_buffer(), None);
    }

    #[test]
    fn test_restart_wraps_the_draw() {
        let mut device = HeadlessDevice::new();
        let call = DrawCall::from(
            DrawElements::new(PrimitiveType::LineStrip, IndexData::U8(vec![0, 1, u8::MAX, 2, 3]))
                .with_primitive_restart(true),
        );
        call.encode(&mut device).unwrap();
        let calls = device.calls();
        let draw = calls.iter().position(DeviceCall::is_draw).unwrap();
        assert_eq!(calls[draw - 1], DeviceCall::PrimitiveRestart(true));
        assert_eq!(calls[draw + 1], DeviceCall::PrimitiveRestart(false));
        assert!(!device.primitive_restart_enabled());
    }

    #[test]
    fn test_range_is_computed_without_restart_index() {
        let mut device = HeadlessDevice::new();
        let call = DrawCall::from(
            DrawRangeElements::new(PrimitiveType::TriangleStrip, IndexData::U16(vec![5, 6, 7, u16::MAX, 9, 8, 7]))
                .with_primitive_restart(true),
        );
        call.encode(&mut device).unwrap();
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DrawRangeElements { start: 5, end: 9, count: 7, .. })),
            1
        );
    }

    #[test]
    fn test_instanced_range_and_multi_draw_counts() {
        let range = DrawCall::from(
            DrawRangeElements::new(PrimitiveType::Triangles, IndexData::compact(&[0, 1, 2, 2, 1, 3])).with_instances(4),
        );
        assert_eq!(range.instances(), 4);
        assert_eq!(range.triangle_count(), 8);

        let multi = DrawCall::from(
            MultiDrawElements::new(
                PrimitiveType::Lines,
                IndexData::compact(&[0, 1, 2, 3, 4, 5]),
                vec![IndexRange { first: 0, count: 2 }, IndexRange { first: 2, count: 4 }],
            )
            .with_instances(3),
        );
        assert_eq!(multi.instances(), 3);
        assert_eq!(multi.line_count(), (1 + 2) * 3);
    }

    #[test]
    fn test_instances_reach_the_device() {
        let mut device = HeadlessDevice::new();
        let range = DrawCall::from(
            DrawRangeElements::new(PrimitiveType::Triangles, IndexData::compact(&[3, 4, 5])).with_instances(2),
        );
        range.encode(&mut device).unwrap();
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DrawRangeElements { start: 3, end: 5, instances: 2, .. })),
            1
        );

        let multi = DrawCall::from(
            MultiDrawElements::new(
                PrimitiveType::Triangles,
                IndexData::compact(&[0, 1, 2, 2, 1, 3]),
                vec![IndexRange { first: 0, count: 3 }, IndexRange { first: 3, count: 3 }],
            )
            .with_instances(5),
        );
        multi.encode(&mut device).unwrap();
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::MultiDrawElements { instances: 5, .. })),
            1
        );
    }

    #[test]
    fn test_empty_indices_skip_the_draw() {
        let mut device = HeadlessDevice::new();
        let call = elements(PrimitiveType::Triangles, &[]);
        call.encode(&mut device).unwrap();
        assert_eq!(device.draw_count(), 0);
        assert_eq!(call.triangle_count(), 0);
    }
}
