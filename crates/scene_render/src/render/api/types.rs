//! Value types shared by the device boundary and the state model
//!
//! These mirror the native API's enumerations one-to-one so that a backend
//! can translate them with a single `match`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Pixel rectangle used for viewports and scissor regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge in pixels
    pub x: i32,
    /// Bottom edge in pixels
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle anchored at the origin
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Width over height, `1.0` for degenerate rectangles
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0 {
            self.width as f32 / self.height as f32
        } else {
            1.0
        }
    }

    /// Whether the rectangle covers no pixels
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Pixel area
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width) * i64::from(self.height)
        }
    }
}

/// Primitive topology of a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// Independent points
    Points,
    /// Independent line segments
    Lines,
    /// Closed line strip
    LineLoop,
    /// Connected line segments
    LineStrip,
    /// Independent triangles
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
    /// Independent quads (compatibility profiles only)
    Quads,
    /// Quad strip (compatibility profiles only)
    QuadStrip,
    /// Single convex polygon (compatibility profiles only)
    Polygon,
    /// Lines with adjacency
    LinesAdjacency,
    /// Line strip with adjacency
    LineStripAdjacency,
    /// Triangles with adjacency
    TrianglesAdjacency,
    /// Triangle strip with adjacency
    TriangleStripAdjacency,
    /// Tessellation patches
    Patches,
}

/// Width of the indices in an index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// 8-bit indices
    U8,
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size of one index in bytes
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Reserved index that restarts the current strip when primitive restart is on
    ///
    /// Fixed-index restart: always the largest value the type can hold.
    pub const fn restart_index(self) -> u32 {
        match self {
            Self::U8 => u8::MAX as u32,
            Self::U16 => u16::MAX as u32,
            Self::U32 => u32::MAX,
        }
    }
}

/// Depth, stencil and alpha comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunc {
    /// Never passes
    Never,
    /// Passes if incoming < stored
    Less,
    /// Passes if incoming == stored
    Equal,
    /// Passes if incoming <= stored
    LessEqual,
    /// Passes if incoming > stored
    Greater,
    /// Passes if incoming != stored
    NotEqual,
    /// Passes if incoming >= stored
    GreaterEqual,
    /// Always passes
    Always,
}

/// Blend factor
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendEquation {
    /// `src + dst`
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// Component-wise minimum
    Min,
    /// Component-wise maximum
    Max,
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolygonRasterMode {
    /// Vertices only
    Point,
    /// Outlines
    Line,
    /// Filled
    Fill,
}

/// Polygon face selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    /// Front faces
    Front,
    /// Back faces
    Back,
    /// Both faces
    FrontAndBack,
}

/// Front-face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winding {
    /// Counter-clockwise
    Ccw,
    /// Clockwise
    Cw,
}

/// Stencil buffer operation
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Incr,
    IncrWrap,
    Decr,
    DecrWrap,
    Invert,
}

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStageKind {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
    /// Geometry shader
    Geometry,
    /// Tessellation control shader
    TessControl,
    /// Tessellation evaluation shader
    TessEvaluation,
}

/// Texture binding target
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureTarget {
    Texture1D,
    Texture2D,
    Texture3D,
    Texture2DArray,
    Rectangle,
    CubeMap,
}

/// Texel storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 8-bit RGB
    Rgb8,
    /// Half-float RGBA
    Rgba16F,
    /// Float RGBA
    Rgba32F,
    /// Float RG
    Rg32F,
    /// Float depth
    Depth32F,
}

/// Texture allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Binding target
    pub target: TextureTarget,
    /// Texel format
    pub format: TextureFormat,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
}

impl TextureDesc {
    /// Describe a 2D texture without mipmaps
    pub const fn texture_2d(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            format,
            width,
            height,
        }
    }
}

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Colour attachment `n`
    Color(u32),
    /// Depth attachment
    Depth,
}

/// Buffer object usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Vertex attribute data
    Vertex,
    /// Element indices
    Index,
}

bitflags! {
    /// Buffers cleared by [`GraphicsDevice::clear`](super::GraphicsDevice::clear)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Colour buffer
        const COLOR = 1 << 0;
        /// Depth buffer
        const DEPTH = 1 << 1;
        /// Stencil buffer
        const STENCIL = 1 << 2;
    }
}

/// Fixed-function material parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Ambient reflectance
    pub ambient: [f32; 4],
    /// Diffuse reflectance
    pub diffuse: [f32; 4],
    /// Specular reflectance
    pub specular: [f32; 4],
    /// Emitted colour
    pub emission: [f32; 4],
    /// Specular exponent
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            emission: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.0,
        }
    }
}

/// Fixed-function light parameters
///
/// `position` uses homogeneous coordinates: `w == 0` is a directional light.
/// Values handed to the device are already in eye space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Position (or direction when `w == 0`)
    pub position: [f32; 4],
    /// Ambient intensity
    pub ambient: [f32; 4],
    /// Diffuse intensity
    pub diffuse: [f32; 4],
    /// Specular intensity
    pub specular: [f32; 4],
    /// Spot direction
    pub spot_direction: [f32; 3],
    /// Spot cutoff angle in degrees, `180` disables the cone
    pub spot_cutoff: f32,
    /// Constant, linear and quadratic attenuation
    pub attenuation: [f32; 3],
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.0, 0.0],
            ambient: [0.0, 0.0, 0.0, 1.0],
            diffuse: [1.0, 1.0, 1.0, 1.0],
            specular: [1.0, 1.0, 1.0, 1.0],
            spot_direction: [0.0, 0.0, -1.0],
            spot_cutoff: 180.0,
            attenuation: [1.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_index_is_type_max() {
        assert_eq!(IndexType::U8.restart_index(), 255);
        assert_eq!(IndexType::U16.restart_index(), 65_535);
        assert_eq!(IndexType::U32.restart_index(), u32::MAX);
    }

    #[test]
    fn test_rect_area_and_aspect() {
        let rect = Rect::from_size(640, 480);
        assert_eq!(rect.area(), 307_200);
        assert!((rect.aspect_ratio() - 4.0 / 3.0).abs() < 1e-6);
        assert_eq!(Rect::new(0, 0, -1, 10).area(), 0);
    }
}
