//! # OpenGL Backend
//!
//! [`GraphicsDevice`] over a `glow` context. Targets OpenGL 3.3 core; the
//! fixed-function entry points keep their `Unsupported` defaults.
//!
//! ## Handles
//!
//! Native objects are kept in maps keyed by the crate's own handle types so
//! the rest of the renderer never sees a `glow` type. Uniform locations are
//! indices into a per-program table filled at link time.
//!
//! ## Fallbacks
//!
//! - Range draws are issued as plain indexed draws.
//! - Multi-draws are issued as a loop of indexed draws.
//! - Client-side indices are streamed through a scratch element buffer.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use glow::HasContext;

use crate::render::api::{
    ActiveUniform, Attachment, BlendEquation, BlendFactor, BufferId, BufferKind, ClearFlags,
    CompareFunc, DeviceCapabilities, DeviceError, DeviceResult, Face, FramebufferId,
    GraphicsDevice, IndexRange, IndexSource, IndexType, PolygonRasterMode, PrimitiveType,
    ProgramId, QueryId, Rect, ShaderId, ShaderStageKind, StencilOp, TextureDesc, TextureFormat,
    TextureId, TextureTarget, UniformLocation, VertexAttribLayout, Winding,
};
use crate::render::program::{ScalarKind, UniformData, UniformType};
use crate::render::state::Capability;

/// OpenGL device backed by a `glow` context
pub struct GlowDevice {
    gl: Arc<glow::Context>,
    caps: DeviceCapabilities,
    current: bool,
    next_id: u32,
    programs: HashMap<ProgramId, glow::NativeProgram>,
    shaders: HashMap<ShaderId, glow::NativeShader>,
    buffers: HashMap<BufferId, glow::NativeBuffer>,
    textures: HashMap<TextureId, (glow::NativeTexture, TextureDesc)>,
    framebuffers: HashMap<FramebufferId, glow::NativeFramebuffer>,
    queries: HashMap<QueryId, glow::NativeQuery>,
    locations: HashMap<ProgramId, Vec<glow::NativeUniformLocation>>,
    bound_program: Option<ProgramId>,
    bound_index_buffer: Option<BufferId>,
    scratch_indices: Option<glow::NativeBuffer>,
}

impl std::fmt::Debug for GlowDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowDevice")
            .field("caps", &self.caps)
            .field("programs", &self.programs.len())
            .field("textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}

fn native(message: String) -> DeviceError {
    DeviceError::Native(message)
}

impl GlowDevice {
    /// Wrap a context that is current on the calling thread
    pub fn new(gl: Arc<glow::Context>) -> Self {
        let max_texture_units = unsafe { gl.get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS) };
        let max_clip_planes = unsafe { gl.get_parameter_i32(glow::MAX_CLIP_DISTANCES) };
        let caps = DeviceCapabilities {
            max_texture_units: max_texture_units.max(0) as u32,
            max_lights: 0,
            max_clip_planes: max_clip_planes.max(0) as u32,
            fixed_function: false,
            occlusion_query: true,
            double_precision_uniforms: false,
        };
        log::info!("OpenGL device: {:?}", caps);
        Self {
            gl,
            caps,
            current: true,
            next_id: 1,
            programs: HashMap::new(),
            shaders: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            queries: HashMap::new(),
            locations: HashMap::new(),
            bound_program: None,
            bound_index_buffer: None,
            scratch_indices: None,
        }
    }

    /// Record whether the context is current on the calling thread
    pub fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    /// The wrapped context
    pub fn gl(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn program(&self, id: ProgramId) -> DeviceResult<glow::NativeProgram> {
        self.programs
            .get(&id)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", id)))
    }

    fn shader(&self, id: ShaderId) -> DeviceResult<glow::NativeShader> {
        self.shaders
            .get(&id)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", id)))
    }

    fn buffer(&self, id: BufferId) -> DeviceResult<glow::NativeBuffer> {
        self.buffers
            .get(&id)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", id)))
    }

    fn texture(&self, id: TextureId) -> DeviceResult<glow::NativeTexture> {
        self.textures
            .get(&id)
            .map(|(texture, _)| *texture)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", id)))
    }

    fn location(&self, location: UniformLocation) -> DeviceResult<glow::NativeUniformLocation> {
        let program = self
            .bound_program
            .ok_or_else(|| native("uniform upload with no program bound".into()))?;
        self.locations
            .get(&program)
            .and_then(|table| table.get(location.0 as usize))
            .cloned()
            .ok_or_else(|| native(format!("invalid uniform location {}", location.0)))
    }

    /// Byte offset to pass to an indexed draw, staging client indices first
    fn index_offset(&mut self, source: IndexSource<'_>) -> DeviceResult<i32> {
        match source {
            IndexSource::Bound { offset } => {
                if self.bound_index_buffer.is_none() {
                    return Err(native("indexed draw with no element buffer bound".into()));
                }
                Ok(offset as i32)
            }
            IndexSource::Client(bytes) => {
                let scratch = match self.scratch_indices {
                    Some(buffer) => buffer,
                    None => {
                        let buffer = unsafe { self.gl.create_buffer() }.map_err(native)?;
                        self.scratch_indices = Some(buffer);
                        buffer
                    }
                };
                unsafe {
                    self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(scratch));
                    self.gl.buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, bytes, glow::STREAM_DRAW);
                }
                Ok(0)
            }
        }
    }

    /// Rebind the caller's element buffer after a client-index draw
    fn restore_index_binding(&mut self, source: IndexSource<'_>) {
        if matches!(source, IndexSource::Client(_)) {
            let bound = self.bound_index_buffer.and_then(|id| self.buffers.get(&id).copied());
            unsafe { self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, bound) };
        }
    }
}

fn capability(cap: Capability) -> Option<u32> {
    Some(match cap {
        Capability::Blend => glow::BLEND,
        Capability::ColorLogicOp => glow::COLOR_LOGIC_OP,
        Capability::CullFace => glow::CULL_FACE,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::DepthClamp => glow::DEPTH_CLAMP,
        Capability::Dither => glow::DITHER,
        Capability::LineSmooth => glow::LINE_SMOOTH,
        Capability::PolygonSmooth => glow::POLYGON_SMOOTH,
        Capability::PolygonOffsetFill => glow::POLYGON_OFFSET_FILL,
        Capability::PolygonOffsetLine => glow::POLYGON_OFFSET_LINE,
        Capability::PolygonOffsetPoint => glow::POLYGON_OFFSET_POINT,
        Capability::StencilTest => glow::STENCIL_TEST,
        Capability::Multisample => glow::MULTISAMPLE,
        Capability::SampleAlphaToCoverage => glow::SAMPLE_ALPHA_TO_COVERAGE,
        Capability::SampleAlphaToOne => glow::SAMPLE_ALPHA_TO_ONE,
        Capability::SampleCoverage => glow::SAMPLE_COVERAGE,
        Capability::ProgramPointSize => glow::PROGRAM_POINT_SIZE,
        Capability::RasterizerDiscard => glow::RASTERIZER_DISCARD,
        Capability::FramebufferSrgb => glow::FRAMEBUFFER_SRGB,
        Capability::TextureCubeMapSeamless => glow::TEXTURE_CUBE_MAP_SEAMLESS,
        _ => return None,
    })
}

fn compare_func(func: CompareFunc) -> u32 {
    match func {
        CompareFunc::Never => glow::NEVER,
        CompareFunc::Less => glow::LESS,
        CompareFunc::Equal => glow::EQUAL,
        CompareFunc::LessEqual => glow::LEQUAL,
        CompareFunc::Greater => glow::GREATER,
        CompareFunc::NotEqual => glow::NOTEQUAL,
        CompareFunc::GreaterEqual => glow::GEQUAL,
        CompareFunc::Always => glow::ALWAYS,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => glow::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => glow::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => glow::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => glow::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => glow::SRC_ALPHA_SATURATE,
    }
}

fn blend_equation(equation: BlendEquation) -> u32 {
    match equation {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendEquation::Min => glow::MIN,
        BlendEquation::Max => glow::MAX,
    }
}

fn face(face: Face) -> u32 {
    match face {
        Face::Front => glow::FRONT,
        Face::Back => glow::BACK,
        Face::FrontAndBack => glow::FRONT_AND_BACK,
    }
}

fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => glow::KEEP,
        StencilOp::Zero => glow::ZERO,
        StencilOp::Replace => glow::REPLACE,
        StencilOp::Incr => glow::INCR,
        StencilOp::IncrWrap => glow::INCR_WRAP,
        StencilOp::Decr => glow::DECR,
        StencilOp::DecrWrap => glow::DECR_WRAP,
        StencilOp::Invert => glow::INVERT,
    }
}

fn primitive(mode: PrimitiveType) -> DeviceResult<u32> {
    Ok(match mode {
        PrimitiveType::Points => glow::POINTS,
        PrimitiveType::Lines => glow::LINES,
        PrimitiveType::LineLoop => glow::LINE_LOOP,
        PrimitiveType::LineStrip => glow::LINE_STRIP,
        PrimitiveType::Triangles => glow::TRIANGLES,
        PrimitiveType::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveType::TriangleFan => glow::TRIANGLE_FAN,
        PrimitiveType::LinesAdjacency => glow::LINES_ADJACENCY,
        PrimitiveType::LineStripAdjacency => glow::LINE_STRIP_ADJACENCY,
        PrimitiveType::TrianglesAdjacency => glow::TRIANGLES_ADJACENCY,
        PrimitiveType::TriangleStripAdjacency => glow::TRIANGLE_STRIP_ADJACENCY,
        PrimitiveType::Patches => glow::PATCHES,
        PrimitiveType::Quads | PrimitiveType::QuadStrip | PrimitiveType::Polygon => {
            return Err(DeviceError::Unsupported(format!("{:?} on a core context", mode)))
        }
    })
}

fn index_type(ty: IndexType) -> u32 {
    match ty {
        IndexType::U8 => glow::UNSIGNED_BYTE,
        IndexType::U16 => glow::UNSIGNED_SHORT,
        IndexType::U32 => glow::UNSIGNED_INT,
    }
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture1D => glow::TEXTURE_1D,
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::Texture3D => glow::TEXTURE_3D,
        TextureTarget::Texture2DArray => glow::TEXTURE_2D_ARRAY,
        TextureTarget::Rectangle => glow::TEXTURE_RECTANGLE,
        TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
    }
}

fn internal_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgba8 => glow::RGBA8,
        TextureFormat::Rgb8 => glow::RGB8,
        TextureFormat::Rgba16F => glow::RGBA16F,
        TextureFormat::Rgba32F => glow::RGBA32F,
        TextureFormat::Rg32F => glow::RG32F,
        TextureFormat::Depth32F => glow::DEPTH_COMPONENT32F,
    }
}

fn uniform_type(gl_type: u32) -> UniformType {
    match gl_type {
        glow::INT | glow::BOOL => UniformType::Int,
        glow::INT_VEC2 | glow::BOOL_VEC2 => UniformType::IntVec2,
        glow::INT_VEC3 | glow::BOOL_VEC3 => UniformType::IntVec3,
        glow::INT_VEC4 | glow::BOOL_VEC4 => UniformType::IntVec4,
        glow::UNSIGNED_INT => UniformType::UInt,
        glow::UNSIGNED_INT_VEC2 => UniformType::UIntVec2,
        glow::UNSIGNED_INT_VEC3 => UniformType::UIntVec3,
        glow::UNSIGNED_INT_VEC4 => UniformType::UIntVec4,
        glow::FLOAT => UniformType::Float,
        glow::FLOAT_VEC2 => UniformType::FloatVec2,
        glow::FLOAT_VEC3 => UniformType::FloatVec3,
        glow::FLOAT_VEC4 => UniformType::FloatVec4,
        glow::FLOAT_MAT2 => UniformType::FloatMat2,
        glow::FLOAT_MAT3 => UniformType::FloatMat3,
        glow::FLOAT_MAT4 => UniformType::FloatMat4,
        glow::DOUBLE => UniformType::Double,
        glow::DOUBLE_VEC2 => UniformType::DoubleVec2,
        glow::DOUBLE_VEC3 => UniformType::DoubleVec3,
        glow::DOUBLE_VEC4 => UniformType::DoubleVec4,
        // Samplers and images are integer uniforms
        _ => UniformType::Int,
    }
}

impl GraphicsDevice for GlowDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    fn is_current(&self) -> bool {
        self.current
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn check_error(&mut self) -> DeviceResult<()> {
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            glow::OUT_OF_MEMORY => Err(DeviceError::OutOfResources("GL_OUT_OF_MEMORY".into())),
            code => Err(native(format!("GL error 0x{:04X}", code))),
        }
    }

    fn set_capability(&mut self, cap: Capability, enabled: bool) -> DeviceResult<()> {
        let native_cap = capability(cap)
            .ok_or_else(|| DeviceError::Unsupported(format!("{:?} on a core context", cap)))?;
        unsafe {
            if enabled {
                self.gl.enable(native_cap);
            } else {
                self.gl.disable(native_cap);
            }
        }
        Ok(())
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::SCISSOR_TEST);
            } else {
                self.gl.disable(glow::SCISSOR_TEST);
            }
        }
    }

    fn set_primitive_restart(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::PRIMITIVE_RESTART_FIXED_INDEX);
            } else {
                self.gl.disable(glow::PRIMITIVE_RESTART_FIXED_INDEX);
            }
        }
    }

    fn blend_func(&mut self, src_rgb: BlendFactor, dst_rgb: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) -> DeviceResult<()> {
        unsafe {
            self.gl.blend_func_separate(
                blend_factor(src_rgb),
                blend_factor(dst_rgb),
                blend_factor(src_alpha),
                blend_factor(dst_alpha),
            )
        };
        Ok(())
    }

    fn blend_equation(&mut self, rgb: BlendEquation, alpha: BlendEquation) -> DeviceResult<()> {
        unsafe { self.gl.blend_equation_separate(blend_equation(rgb), blend_equation(alpha)) };
        Ok(())
    }

    fn blend_color(&mut self, color: [f32; 4]) -> DeviceResult<()> {
        unsafe { self.gl.blend_color(color[0], color[1], color[2], color[3]) };
        Ok(())
    }

    fn depth_func(&mut self, func: CompareFunc) -> DeviceResult<()> {
        unsafe { self.gl.depth_func(compare_func(func)) };
        Ok(())
    }

    fn depth_mask(&mut self, write: bool) -> DeviceResult<()> {
        unsafe { self.gl.depth_mask(write) };
        Ok(())
    }

    fn depth_range(&mut self, near: f64, far: f64) -> DeviceResult<()> {
        unsafe { self.gl.depth_range_f64(near, far) };
        Ok(())
    }

    fn color_mask(&mut self, mask: [bool; 4]) -> DeviceResult<()> {
        unsafe { self.gl.color_mask(mask[0], mask[1], mask[2], mask[3]) };
        Ok(())
    }

    fn polygon_mode(&mut self, face_sel: Face, mode: PolygonRasterMode) -> DeviceResult<()> {
        if face_sel != Face::FrontAndBack {
            return Err(DeviceError::Unsupported("per-face polygon mode on a core context".into()));
        }
        let mode = match mode {
            PolygonRasterMode::Point => glow::POINT,
            PolygonRasterMode::Line => glow::LINE,
            PolygonRasterMode::Fill => glow::FILL,
        };
        unsafe { self.gl.polygon_mode(face(face_sel), mode) };
        Ok(())
    }

    fn cull_face(&mut self, face_sel: Face) -> DeviceResult<()> {
        unsafe { self.gl.cull_face(face(face_sel)) };
        Ok(())
    }

    fn front_face(&mut self, winding: Winding) -> DeviceResult<()> {
        let winding = match winding {
            Winding::Ccw => glow::CCW,
            Winding::Cw => glow::CW,
        };
        unsafe { self.gl.front_face(winding) };
        Ok(())
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) -> DeviceResult<()> {
        unsafe { self.gl.polygon_offset(factor, units) };
        Ok(())
    }

    fn line_width(&mut self, width: f32) -> DeviceResult<()> {
        unsafe { self.gl.line_width(width) };
        Ok(())
    }

    fn point_size(&mut self, size: f32) -> DeviceResult<()> {
        if (size - 1.0).abs() > f32::EPSILON {
            return Err(DeviceError::Unsupported("fixed point size; write gl_PointSize instead".into()));
        }
        Ok(())
    }

    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32) -> DeviceResult<()> {
        unsafe { self.gl.stencil_func(compare_func(func), reference, mask) };
        Ok(())
    }

    fn stencil_op(&mut self, sfail: StencilOp, dpfail: StencilOp, dppass: StencilOp) -> DeviceResult<()> {
        unsafe { self.gl.stencil_op(stencil_op(sfail), stencil_op(dpfail), stencil_op(dppass)) };
        Ok(())
    }

    fn stencil_mask(&mut self, mask: u32) -> DeviceResult<()> {
        unsafe { self.gl.stencil_mask(mask) };
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, target: TextureTarget, texture: Option<TextureId>) -> DeviceResult<()> {
        let texture = texture.map(|id| self.texture(id)).transpose()?;
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(texture_target(target), texture);
        }
        Ok(())
    }

    fn create_program(&mut self) -> DeviceResult<ProgramId> {
        let program = unsafe { self.gl.create_program() }.map_err(DeviceError::OutOfResources)?;
        let id = ProgramId(self.alloc_id());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(native_program) = self.programs.remove(&program) {
            unsafe { self.gl.delete_program(native_program) };
        }
        self.locations.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    fn create_shader(&mut self, kind: ShaderStageKind) -> DeviceResult<ShaderId> {
        let stage = match kind {
            ShaderStageKind::Vertex => glow::VERTEX_SHADER,
            ShaderStageKind::Fragment => glow::FRAGMENT_SHADER,
            ShaderStageKind::Geometry => glow::GEOMETRY_SHADER,
            ShaderStageKind::TessControl => glow::TESS_CONTROL_SHADER,
            ShaderStageKind::TessEvaluation => glow::TESS_EVALUATION_SHADER,
        };
        let shader = unsafe { self.gl.create_shader(stage) }.map_err(DeviceError::OutOfResources)?;
        let id = ShaderId(self.alloc_id());
        self.shaders.insert(id, shader);
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if let Some(native_shader) = self.shaders.remove(&shader) {
            unsafe { self.gl.delete_shader(native_shader) };
        }
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> DeviceResult<()> {
        let native_shader = self.shader(shader)?;
        unsafe {
            self.gl.shader_source(native_shader, source);
            self.gl.compile_shader(native_shader);
            if !self.gl.get_shader_compile_status(native_shader) {
                return Err(DeviceError::CompileFailed { log: self.gl.get_shader_info_log(native_shader) });
            }
        }
        Ok(())
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> DeviceResult<()> {
        let (native_program, native_shader) = (self.program(program)?, self.shader(shader)?);
        unsafe { self.gl.attach_shader(native_program, native_shader) };
        Ok(())
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) -> DeviceResult<()> {
        let (native_program, native_shader) = (self.program(program)?, self.shader(shader)?);
        unsafe { self.gl.detach_shader(native_program, native_shader) };
        Ok(())
    }

    fn bind_attrib_location(&mut self, program: ProgramId, index: u32, name: &str) -> DeviceResult<()> {
        let native_program = self.program(program)?;
        unsafe { self.gl.bind_attrib_location(native_program, index, name) };
        Ok(())
    }

    fn link_program(&mut self, program: ProgramId) -> DeviceResult<()> {
        let native_program = self.program(program)?;
        self.locations.remove(&program);
        unsafe {
            self.gl.link_program(native_program);
            if !self.gl.get_program_link_status(native_program) {
                return Err(DeviceError::LinkFailed { log: self.gl.get_program_info_log(native_program) });
            }
        }
        Ok(())
    }

    fn active_uniforms(&mut self, program: ProgramId) -> DeviceResult<Vec<ActiveUniform>> {
        let native_program = self.program(program)?;
        let count = unsafe { self.gl.get_active_uniforms(native_program) };
        Ok((0..count)
            .filter_map(|index| unsafe { self.gl.get_active_uniform(native_program, index) })
            .map(|u| ActiveUniform {
                name: u.name,
                ty: uniform_type(u.utype),
                count: u.size.max(1) as usize,
            })
            .collect())
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let native_program = self.programs.get(&program).copied()?;
        let location = unsafe { self.gl.get_uniform_location(native_program, name) }?;
        let table = self.locations.entry(program).or_default();
        let index = match table.iter().position(|l| *l == location) {
            Some(index) => index,
            None => {
                table.push(location);
                table.len() - 1
            }
        };
        Some(UniformLocation(index as i32))
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<u32> {
        let native_program = self.programs.get(&program).copied()?;
        unsafe { self.gl.get_attrib_location(native_program, name) }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        let native_program = program.and_then(|id| self.programs.get(&id).copied());
        unsafe { self.gl.use_program(native_program) };
        self.bound_program = program.filter(|_| native_program.is_some());
    }

    fn bound_program(&self) -> Option<ProgramId> {
        self.bound_program
    }

    fn set_uniform(&mut self, location: UniformLocation, ty: UniformType, data: &UniformData) -> DeviceResult<()> {
        let loc = self.location(location)?;
        let loc = Some(&loc);
        let gl = &self.gl;
        unsafe {
            match (ty, data) {
                (UniformType::Int, UniformData::Int(v)) => gl.uniform_1_i32_slice(loc, v),
                (UniformType::IntVec2, UniformData::Int(v)) => gl.uniform_2_i32_slice(loc, v),
                (UniformType::IntVec3, UniformData::Int(v)) => gl.uniform_3_i32_slice(loc, v),
                (UniformType::IntVec4, UniformData::Int(v)) => gl.uniform_4_i32_slice(loc, v),
                (UniformType::UInt, UniformData::UInt(v)) => gl.uniform_1_u32_slice(loc, v),
                (UniformType::UIntVec2, UniformData::UInt(v)) => gl.uniform_2_u32_slice(loc, v),
                (UniformType::UIntVec3, UniformData::UInt(v)) => gl.uniform_3_u32_slice(loc, v),
                (UniformType::UIntVec4, UniformData::UInt(v)) => gl.uniform_4_u32_slice(loc, v),
                (UniformType::Float, UniformData::Float(v)) => gl.uniform_1_f32_slice(loc, v),
                (UniformType::FloatVec2, UniformData::Float(v)) => gl.uniform_2_f32_slice(loc, v),
                (UniformType::FloatVec3, UniformData::Float(v)) => gl.uniform_3_f32_slice(loc, v),
                (UniformType::FloatVec4, UniformData::Float(v)) => gl.uniform_4_f32_slice(loc, v),
                (UniformType::FloatMat2, UniformData::Float(v)) => gl.uniform_matrix_2_f32_slice(loc, false, v),
                (UniformType::FloatMat3, UniformData::Float(v)) => gl.uniform_matrix_3_f32_slice(loc, false, v),
                (UniformType::FloatMat4, UniformData::Float(v)) => gl.uniform_matrix_4_f32_slice(loc, false, v),
                _ => {
                    return Err(DeviceError::Unsupported(format!(
                        "{} uniforms on this backend",
                        ty.glsl_name()
                    )))
                }
            }
        }
        Ok(())
    }

    fn get_uniform(&mut self, program: ProgramId, location: UniformLocation, ty: UniformType, count: usize) -> DeviceResult<UniformData> {
        let native_program = self.program(program)?;
        let loc = self
            .locations
            .get(&program)
            .and_then(|table| table.get(location.0 as usize))
            .cloned()
            .ok_or_else(|| native(format!("invalid uniform location {}", location.0)))?;
        if count > 1 {
            return Err(DeviceError::Unsupported("array read-back on this backend".into()));
        }
        let len = ty.components();
        unsafe {
            match ty.scalar() {
                ScalarKind::Int => {
                    let mut values = vec![0; len];
                    self.gl.get_uniform_i32(native_program, &loc, &mut values);
                    Ok(UniformData::Int(values))
                }
                ScalarKind::Float => {
                    let mut values = vec![0.0; len];
                    self.gl.get_uniform_f32(native_program, &loc, &mut values);
                    Ok(UniformData::Float(values))
                }
                _ => Err(DeviceError::Unsupported(format!("{} read-back on this backend", ty.glsl_name()))),
            }
        }
    }

    fn create_buffer(&mut self) -> DeviceResult<BufferId> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(DeviceError::OutOfResources)?;
        let id = BufferId(self.alloc_id());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(native_buffer) = self.buffers.remove(&buffer) {
            unsafe { self.gl.delete_buffer(native_buffer) };
        }
        if self.bound_index_buffer == Some(buffer) {
            self.bound_index_buffer = None;
        }
    }

    fn upload_buffer(&mut self, buffer: BufferId, kind: BufferKind, data: &[u8]) -> DeviceResult<()> {
        let native_buffer = self.buffer(buffer)?;
        let target = match kind {
            BufferKind::Vertex => glow::ARRAY_BUFFER,
            BufferKind::Index => glow::ELEMENT_ARRAY_BUFFER,
        };
        unsafe {
            self.gl.bind_buffer(target, Some(native_buffer));
            self.gl.buffer_data_u8_slice(target, data, glow::STATIC_DRAW);
            if kind == BufferKind::Index {
                let bound = self.bound_index_buffer.and_then(|id| self.buffers.get(&id).copied());
                self.gl.bind_buffer(target, bound);
            } else {
                self.gl.bind_buffer(target, None);
            }
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>) {
        let native_buffer = buffer.and_then(|id| self.buffers.get(&id).copied());
        unsafe { self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, native_buffer) };
        self.bound_index_buffer = buffer.filter(|_| native_buffer.is_some());
    }

    fn bound_index_buffer(&self) -> Option<BufferId> {
        self.bound_index_buffer
    }

    fn enable_vertex_attrib(&mut self, index: u32, layout: &VertexAttribLayout) -> DeviceResult<()> {
        let native_buffer = self.buffer(layout.buffer)?;
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(native_buffer));
            self.gl.vertex_attrib_pointer_f32(
                index,
                i32::from(layout.components),
                glow::FLOAT,
                false,
                layout.stride as i32,
                layout.offset as i32,
            );
            self.gl.enable_vertex_attrib_array(index);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
        Ok(())
    }

    fn disable_vertex_attrib(&mut self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) };
    }

    fn set_vertex_attrib_constant(&mut self, index: u32, value: [f32; 4]) {
        unsafe { self.gl.vertex_attrib_4_f32(index, value[0], value[1], value[2], value[3]) };
    }

    fn draw_arrays(&mut self, mode: PrimitiveType, first: u32, count: u32, instances: u32) -> DeviceResult<()> {
        let mode = primitive(mode)?;
        unsafe {
            if instances > 1 {
                self.gl.draw_arrays_instanced(mode, first as i32, count as i32, instances as i32);
            } else {
                self.gl.draw_arrays(mode, first as i32, count as i32);
            }
        }
        Ok(())
    }

    fn draw_elements(&mut self, mode: PrimitiveType, count: u32, ty: IndexType, source: IndexSource<'_>, instances: u32) -> DeviceResult<()> {
        let mode = primitive(mode)?;
        let offset = self.index_offset(source)?;
        unsafe {
            if instances > 1 {
                self.gl.draw_elements_instanced(mode, count as i32, index_type(ty), offset, instances as i32);
            } else {
                self.gl.draw_elements(mode, count as i32, index_type(ty), offset);
            }
        }
        self.restore_index_binding(source);
        Ok(())
    }

    fn draw_range_elements(&mut self, mode: PrimitiveType, start: u32, end: u32, count: u32, ty: IndexType, source: IndexSource<'_>, instances: u32) -> DeviceResult<()> {
        if instances > 1 {
            return self.draw_elements(mode, count, ty, source, instances);
        }
        let gl_mode = primitive(mode)?;
        let offset = self.index_offset(source)?;
        unsafe { self.gl.draw_range_elements(gl_mode, start, end, count as i32, index_type(ty), offset) };
        self.restore_index_binding(source);
        Ok(())
    }

    fn multi_draw_elements(&mut self, mode: PrimitiveType, ty: IndexType, source: IndexSource<'_>, ranges: &[IndexRange], instances: u32) -> DeviceResult<()> {
        let gl_mode = primitive(mode)?;
        let base = self.index_offset(source)?;
        for range in ranges {
            let offset = base + (range.first as usize * ty.size_bytes()) as i32;
            unsafe {
                if instances > 1 {
                    self.gl.draw_elements_instanced(gl_mode, range.count as i32, index_type(ty), offset, instances as i32);
                } else {
                    self.gl.draw_elements(gl_mode, range.count as i32, index_type(ty), offset);
                }
            }
        }
        self.restore_index_binding(source);
        Ok(())
    }

    fn set_viewport(&mut self, rect: Rect) {
        unsafe { self.gl.viewport(rect.x, rect.y, rect.width, rect.height) };
    }

    fn set_scissor(&mut self, rect: Rect) {
        unsafe { self.gl.scissor(rect.x, rect.y, rect.width, rect.height) };
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f64) {
        let mut mask = 0;
        if flags.contains(ClearFlags::COLOR) {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::DEPTH) {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::STENCIL) {
            mask |= glow::STENCIL_BUFFER_BIT;
        }
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear_depth_f32(depth as f32);
            self.gl.clear(mask);
        }
    }

    fn clear_color_buffer(&mut self, draw_buffer: u32, color: [f32; 4]) {
        unsafe { self.gl.clear_buffer_f32_slice(glow::COLOR, draw_buffer, &color) };
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> DeviceResult<TextureId> {
        let target = match desc.target {
            TextureTarget::Texture2D | TextureTarget::Rectangle => texture_target(desc.target),
            other => return Err(DeviceError::Unsupported(format!("{:?} render targets", other))),
        };
        let texture = unsafe { self.gl.create_texture() }.map_err(DeviceError::OutOfResources)?;
        unsafe {
            self.gl.bind_texture(target, Some(texture));
            self.gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.gl.tex_storage_2d(target, 1, internal_format(desc.format), desc.width as i32, desc.height as i32);
            self.gl.bind_texture(target, None);
        }
        if unsafe { self.gl.get_error() } == glow::OUT_OF_MEMORY {
            unsafe { self.gl.delete_texture(texture) };
            return Err(DeviceError::OutOfResources(format!("{}x{} {:?}", desc.width, desc.height, desc.format)));
        }
        let id = TextureId(self.alloc_id());
        self.textures.insert(id, (texture, *desc));
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some((native_texture, _)) = self.textures.remove(&texture) {
            unsafe { self.gl.delete_texture(native_texture) };
        }
    }

    fn create_framebuffer(&mut self) -> DeviceResult<FramebufferId> {
        let framebuffer = unsafe { self.gl.create_framebuffer() }.map_err(DeviceError::OutOfResources)?;
        let id = FramebufferId(self.alloc_id());
        self.framebuffers.insert(id, framebuffer);
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(native_framebuffer) = self.framebuffers.remove(&framebuffer) {
            unsafe { self.gl.delete_framebuffer(native_framebuffer) };
        }
    }

    fn attach_texture(&mut self, framebuffer: FramebufferId, attachment: Attachment, texture: Option<TextureId>) -> DeviceResult<()> {
        let native_framebuffer = self
            .framebuffers
            .get(&framebuffer)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", framebuffer)))?;
        let (native_texture, target) = match texture {
            Some(id) => {
                let (tex, desc) = self
                    .textures
                    .get(&id)
                    .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", id)))?;
                (Some(*tex), texture_target(desc.target))
            }
            None => (None, glow::TEXTURE_2D),
        };
        let point = match attachment {
            Attachment::Color(index) => glow::COLOR_ATTACHMENT0 + index,
            Attachment::Depth => glow::DEPTH_ATTACHMENT,
        };
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(native_framebuffer));
            self.gl.framebuffer_texture_2d(glow::FRAMEBUFFER, point, target, native_texture, 0);
        }
        Ok(())
    }

    fn check_framebuffer(&mut self, framebuffer: FramebufferId) -> DeviceResult<()> {
        let native_framebuffer = self
            .framebuffers
            .get(&framebuffer)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", framebuffer)))?;
        let status = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(native_framebuffer));
            self.gl.check_framebuffer_status(glow::FRAMEBUFFER)
        };
        if status == glow::FRAMEBUFFER_COMPLETE {
            Ok(())
        } else {
            Err(native(format!("framebuffer incomplete: 0x{:04X}", status)))
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let native_framebuffer = framebuffer.and_then(|id| self.framebuffers.get(&id).copied());
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native_framebuffer) };
    }

    fn set_draw_buffers(&mut self, attachments: &[u32]) -> DeviceResult<()> {
        let buffers: Vec<u32> = attachments.iter().map(|&a| glow::COLOR_ATTACHMENT0 + a).collect();
        unsafe { self.gl.draw_buffers(&buffers) };
        Ok(())
    }

    fn create_query(&mut self) -> DeviceResult<QueryId> {
        let query = unsafe { self.gl.create_query() }.map_err(DeviceError::OutOfResources)?;
        let id = QueryId(self.alloc_id());
        self.queries.insert(id, query);
        Ok(id)
    }

    fn delete_query(&mut self, query: QueryId) {
        if let Some(native_query) = self.queries.remove(&query) {
            unsafe { self.gl.delete_query(native_query) };
        }
    }

    fn begin_occlusion_query(&mut self, query: QueryId) -> DeviceResult<()> {
        let native_query = self
            .queries
            .get(&query)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", query)))?;
        unsafe { self.gl.begin_query(glow::SAMPLES_PASSED, native_query) };
        Ok(())
    }

    fn end_occlusion_query(&mut self) -> DeviceResult<()> {
        unsafe { self.gl.end_query(glow::SAMPLES_PASSED) };
        Ok(())
    }

    fn occlusion_query_result(&mut self, query: QueryId) -> DeviceResult<u64> {
        let native_query = self
            .queries
            .get(&query)
            .copied()
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", query)))?;
        let samples = unsafe { self.gl.get_query_parameter_u32(native_query, glow::QUERY_RESULT) };
        Ok(u64::from(samples))
    }
}
