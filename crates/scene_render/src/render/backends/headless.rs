//! # Headless Device
//!
//! A [`GraphicsDevice`] that keeps the native state in plain Rust data and
//! records every call. It drives the test suite and the demo binary, and
//! doubles as a reference for what a backend must validate.
//!
//! ## Simulated Driver Behaviour
//!
//! - Sources containing `#error` fail to compile.
//! - Programs without a `main(` in any stage fail to link, as do programs
//!   containing the configured failure marker.
//! - `uniform <type> <name>[N];` declarations in attached sources become the
//!   active uniforms after a link, with locations assigned in order.
//! - Occlusion queries return scripted sample counts, then a default.
//! - Fixed-function calls report `Unsupported` unless the capabilities say
//!   otherwise.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::foundation::math::{Mat4, Vec4};
use crate::render::api::{
    ActiveUniform, Attachment, BlendEquation, BlendFactor, BufferId, BufferKind, ClearFlags,
    CompareFunc, DeviceCapabilities, DeviceError, DeviceResult, Face, FramebufferId,
    GraphicsDevice, IndexRange, IndexSource, IndexType, Light, Material, PolygonRasterMode,
    PrimitiveType, ProgramId, QueryId, Rect, ShaderId, ShaderStageKind, StencilOp, TextureDesc,
    TextureId, TextureTarget, UniformLocation, VertexAttribLayout, Winding,
};
use crate::render::program::{ScalarKind, UniformData, UniformType};
use crate::render::state::Capability;

/// One recorded native call
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetCapability { cap: Capability, enabled: bool },
    ScissorTest(bool),
    PrimitiveRestart(bool),

    BlendFunc { src_rgb: BlendFactor, dst_rgb: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor },
    BlendEquation { rgb: BlendEquation, alpha: BlendEquation },
    BlendColor([f32; 4]),
    AlphaFunc { func: CompareFunc, reference: f32 },
    DepthFunc(CompareFunc),
    DepthMask(bool),
    DepthRange { near: f64, far: f64 },
    ColorMask([bool; 4]),
    PolygonMode { face: Face, mode: PolygonRasterMode },
    CullFace(Face),
    FrontFace(Winding),
    PolygonOffset { factor: f32, units: f32 },
    LineWidth(f32),
    PointSize(f32),
    StencilFunc { func: CompareFunc, reference: i32, mask: u32 },
    StencilOp { sfail: StencilOp, dpfail: StencilOp, dppass: StencilOp },
    StencilMask(u32),
    Material(Option<Material>),
    Light { index: u32, light: Option<Light> },
    ClipPlane { index: u32, equation: Option<[f32; 4]> },
    BindTexture { unit: u32, target: TextureTarget, texture: Option<TextureId> },
    LoadMatrices,

    CreateProgram(ProgramId),
    DeleteProgram(ProgramId),
    CreateShader(ShaderId),
    DeleteShader(ShaderId),
    CompileShader(ShaderId),
    AttachShader { program: ProgramId, shader: ShaderId },
    DetachShader { program: ProgramId, shader: ShaderId },
    BindAttribLocation { program: ProgramId, index: u32, name: String },
    LinkProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    SetUniform { location: UniformLocation, ty: UniformType },

    CreateBuffer(BufferId),
    DeleteBuffer(BufferId),
    UploadBuffer { buffer: BufferId, kind: BufferKind, len: usize },
    BindIndexBuffer(Option<BufferId>),
    EnableVertexAttrib(u32),
    DisableVertexAttrib(u32),
    VertexAttribConstant { index: u32, value: [f32; 4] },

    DrawArrays { mode: PrimitiveType, first: u32, count: u32, instances: u32 },
    DrawElements { mode: PrimitiveType, count: u32, index_type: IndexType, from_buffer: bool, instances: u32 },
    DrawRangeElements { mode: PrimitiveType, start: u32, end: u32, count: u32, index_type: IndexType, instances: u32 },
    MultiDrawElements { mode: PrimitiveType, index_type: IndexType, ranges: Vec<IndexRange>, instances: u32 },

    Viewport(Rect),
    Scissor(Rect),
    Clear(ClearFlags),
    ClearColorBuffer { draw_buffer: u32, color: [f32; 4] },
    CreateTexture { texture: TextureId, desc: TextureDesc },
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    AttachTexture { framebuffer: FramebufferId, attachment: Attachment, texture: Option<TextureId> },
    BindFramebuffer(Option<FramebufferId>),
    DrawBuffers(Vec<u32>),

    CreateQuery(QueryId),
    DeleteQuery(QueryId),
    BeginQuery(QueryId),
    EndQuery,
    QueryResult { query: QueryId, samples: u64 },
}

impl DeviceCall {
    /// Whether the call draws primitives
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawArrays { .. }
                | Self::DrawElements { .. }
                | Self::DrawRangeElements { .. }
                | Self::MultiDrawElements { .. }
        )
    }
}

#[derive(Debug)]
struct ShaderRecord {
    source: String,
    compiled: bool,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    attached: Vec<ShaderId>,
    linked: bool,
    uniforms: Vec<(ActiveUniform, i32)>,
    values: HashMap<i32, (UniformType, UniformData)>,
    attribs: HashMap<String, u32>,
}

impl ProgramRecord {
    fn find(&self, location: i32) -> Option<&(ActiveUniform, i32)> {
        self.uniforms
            .iter()
            .find(|(u, base)| location >= *base && location < *base + u.count as i32)
    }
}

/// In-memory graphics device that records every call
#[derive(Debug)]
pub struct HeadlessDevice {
    caps: DeviceCapabilities,
    current: bool,
    calls: Vec<DeviceCall>,
    next_id: u32,

    enabled: HashSet<Capability>,
    scissor_test: bool,
    primitive_restart: bool,
    viewport: Rect,
    scissor: Rect,

    shaders: HashMap<ShaderId, ShaderRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    bound_program: Option<ProgramId>,

    buffers: HashMap<BufferId, Vec<u8>>,
    bound_index_buffer: Option<BufferId>,
    enabled_attribs: HashSet<u32>,

    textures: HashMap<TextureId, TextureDesc>,
    framebuffers: HashMap<FramebufferId, HashMap<Attachment, TextureId>>,
    bound_framebuffer: Option<FramebufferId>,

    queries: HashMap<QueryId, Option<u64>>,
    active_query: Option<QueryId>,
    occlusion_script: VecDeque<u64>,
    default_samples: u64,

    link_failure_marker: Option<String>,
    fail_allocations: bool,
    pending_error: Option<DeviceError>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Core-profile device with double-precision uniforms
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            double_precision_uniforms: true,
            ..DeviceCapabilities::default()
        })
    }

    /// Compatibility-profile device with the fixed-function pipeline
    pub fn fixed_function() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            fixed_function: true,
            double_precision_uniforms: true,
            ..DeviceCapabilities::default()
        })
    }

    /// Device with explicit capabilities
    pub fn with_capabilities(caps: DeviceCapabilities) -> Self {
        Self {
            caps,
            current: true,
            calls: Vec::new(),
            next_id: 1,
            enabled: HashSet::new(),
            scissor_test: false,
            primitive_restart: false,
            viewport: Rect::default(),
            scissor: Rect::default(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            bound_program: None,
            buffers: HashMap::new(),
            bound_index_buffer: None,
            enabled_attribs: HashSet::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_framebuffer: None,
            queries: HashMap::new(),
            active_query: None,
            occlusion_script: VecDeque::new(),
            default_samples: 1,
            link_failure_marker: None,
            fail_allocations: false,
            pending_error: None,
        }
    }

    // === Recording ===

    /// Every call recorded so far
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Forget recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Take the recorded calls
    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of recorded calls matching `pred`
    pub fn count_calls(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    /// Number of recorded draw calls
    pub fn draw_count(&self) -> usize {
        self.count_calls(DeviceCall::is_draw)
    }

    // === Scripting ===

    /// Pretend the context is (not) current on this thread
    pub fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    /// Queue sample counts returned by successive occlusion queries
    pub fn script_occlusion_samples(&mut self, samples: impl IntoIterator<Item = u64>) {
        self.occlusion_script.extend(samples);
    }

    /// Sample count returned once the script is exhausted
    pub fn set_default_occlusion_samples(&mut self, samples: u64) {
        self.default_samples = samples;
    }

    /// Fail every link whose sources contain `marker`
    pub fn fail_link_when_source_contains(&mut self, marker: impl Into<String>) {
        self.link_failure_marker = Some(marker.into());
    }

    /// Make texture allocation fail
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Report `error` from the next [`GraphicsDevice::check_error`]
    pub fn inject_error(&mut self, error: DeviceError) {
        self.pending_error = Some(error);
    }

    // === Inspection ===

    /// Whether a capability is enabled
    pub fn is_capability_enabled(&self, cap: Capability) -> bool {
        self.enabled.contains(&cap)
    }

    /// Whether the scissor test is enabled
    pub fn scissor_test_enabled(&self) -> bool {
        self.scissor_test
    }

    /// Whether primitive restart is enabled
    pub fn primitive_restart_enabled(&self) -> bool {
        self.primitive_restart
    }

    /// Current scissor rectangle
    pub fn scissor(&self) -> Rect {
        self.scissor
    }

    /// Current viewport
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Vertex attribute arrays currently enabled
    pub fn enabled_vertex_attribs(&self) -> usize {
        self.enabled_attribs.len()
    }

    /// Live textures and their descriptions
    pub fn textures(&self) -> impl Iterator<Item = (TextureId, &TextureDesc)> {
        self.textures.iter().map(|(id, desc)| (*id, desc))
    }

    /// Number of live textures
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffers
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of live programs
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Bound framebuffer
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    fn record(&mut self, call: DeviceCall) {
        log::trace!("headless: {:?}", call);
        self.calls.push(call);
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_fixed_function(&mut self, what: &str, call: DeviceCall) -> DeviceResult<()> {
        if self.caps.fixed_function {
            self.record(call);
            Ok(())
        } else {
            Err(DeviceError::Unsupported(format!("{} requires the fixed-function pipeline", what)))
        }
    }

    fn program_record(&self, program: ProgramId) -> DeviceResult<&ProgramRecord> {
        self.programs
            .get(&program)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", program)))
    }

    fn check_index_source(
        &self,
        source: IndexSource<'_>,
        needed_bytes: usize,
    ) -> DeviceResult<bool> {
        match source {
            IndexSource::Bound { offset } => {
                let buffer = self
                    .bound_index_buffer
                    .ok_or_else(|| DeviceError::Native("indexed draw with no element buffer bound".into()))?;
                let len = self.buffers.get(&buffer).map_or(0, Vec::len);
                if offset + needed_bytes > len {
                    return Err(DeviceError::Native(format!(
                        "index read of {} bytes at offset {} overruns a {} byte buffer",
                        needed_bytes, offset, len
                    )));
                }
                Ok(true)
            }
            IndexSource::Client(bytes) => {
                if needed_bytes > bytes.len() {
                    return Err(DeviceError::Native(format!(
                        "index read of {} bytes overruns {} client bytes",
                        needed_bytes,
                        bytes.len()
                    )));
                }
                Ok(false)
            }
        }
    }

    fn link_sources(&self, record: &ProgramRecord) -> Vec<&str> {
        record
            .attached
            .iter()
            .filter_map(|id| self.shaders.get(id))
            .map(|shader| shader.source.as_str())
            .collect()
    }
}

/// Parse `uniform <type> <name>[N], ...;` declarations
fn parse_uniforms(source: &str) -> Vec<ActiveUniform> {
    const QUALIFIERS: [&str; 5] = ["lowp", "mediump", "highp", "flat", "const"];
    let mut uniforms = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("uniform ") else {
            continue;
        };
        let declaration = rest.split(';').next().unwrap_or("");
        let mut words = declaration
            .split_whitespace()
            .filter(|word| !QUALIFIERS.contains(word));
        let Some(ty) = words.next().and_then(UniformType::from_glsl) else {
            continue;
        };
        let names: String = words.collect::<Vec<_>>().join("");
        for name in names.split(',').filter(|n| !n.is_empty()) {
            let (base, count) = match name.split_once('[') {
                Some((base, len)) => {
                    let count = len.trim_end_matches(']').parse::<usize>().unwrap_or(1).max(1);
                    (format!("{}[0]", base), count)
                }
                None => (name.to_string(), 1),
            };
            uniforms.push(ActiveUniform { name: base, ty, count });
        }
    }
    uniforms
}

fn zeros(ty: UniformType, len: usize) -> UniformData {
    match ty.scalar() {
        ScalarKind::None => UniformData::None,
        ScalarKind::Int => UniformData::Int(vec![0; len]),
        ScalarKind::UInt => UniformData::UInt(vec![0; len]),
        ScalarKind::Float => UniformData::Float(vec![0.0; len]),
        ScalarKind::Double => UniformData::Double(vec![0.0; len]),
    }
}

fn truncate(data: &UniformData, len: usize) -> UniformData {
    match data {
        UniformData::None => UniformData::None,
        UniformData::Int(v) => UniformData::Int(v.iter().copied().take(len).collect()),
        UniformData::UInt(v) => UniformData::UInt(v.iter().copied().take(len).collect()),
        UniformData::Float(v) => UniformData::Float(v.iter().copied().take(len).collect()),
        UniformData::Double(v) => UniformData::Double(v.iter().copied().take(len).collect()),
    }
}

impl GraphicsDevice for HeadlessDevice {
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
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn set_capability(&mut self, cap: Capability, enabled: bool) -> DeviceResult<()> {
        if cap.is_fixed_function() && !self.caps.fixed_function {
            return Err(DeviceError::Unsupported(format!("{:?} requires the fixed-function pipeline", cap)));
        }
        if enabled {
            self.enabled.insert(cap);
        } else {
            self.enabled.remove(&cap);
        }
        self.record(DeviceCall::SetCapability { cap, enabled });
        Ok(())
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.scissor_test = enabled;
        self.record(DeviceCall::ScissorTest(enabled));
    }

    fn set_primitive_restart(&mut self, enabled: bool) {
        self.primitive_restart = enabled;
        self.record(DeviceCall::PrimitiveRestart(enabled));
    }

    fn blend_func(&mut self, src_rgb: BlendFactor, dst_rgb: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) -> DeviceResult<()> {
        self.record(DeviceCall::BlendFunc { src_rgb, dst_rgb, src_alpha, dst_alpha });
        Ok(())
    }

    fn blend_equation(&mut self, rgb: BlendEquation, alpha: BlendEquation) -> DeviceResult<()> {
        self.record(DeviceCall::BlendEquation { rgb, alpha });
        Ok(())
    }

    fn blend_color(&mut self, color: [f32; 4]) -> DeviceResult<()> {
        self.record(DeviceCall::BlendColor(color));
        Ok(())
    }

    fn alpha_func(&mut self, func: CompareFunc, reference: f32) -> DeviceResult<()> {
        self.record_fixed_function("alpha test", DeviceCall::AlphaFunc { func, reference })
    }

    fn depth_func(&mut self, func: CompareFunc) -> DeviceResult<()> {
        self.record(DeviceCall::DepthFunc(func));
        Ok(())
    }

    fn depth_mask(&mut self, write: bool) -> DeviceResult<()> {
        self.record(DeviceCall::DepthMask(write));
        Ok(())
    }

    fn depth_range(&mut self, near: f64, far: f64) -> DeviceResult<()> {
        self.record(DeviceCall::DepthRange { near, far });
        Ok(())
    }

    fn color_mask(&mut self, mask: [bool; 4]) -> DeviceResult<()> {
        self.record(DeviceCall::ColorMask(mask));
        Ok(())
    }

    fn polygon_mode(&mut self, face: Face, mode: PolygonRasterMode) -> DeviceResult<()> {
        if face != Face::FrontAndBack && !self.caps.fixed_function {
            return Err(DeviceError::Unsupported("per-face polygon mode".into()));
        }
        self.record(DeviceCall::PolygonMode { face, mode });
        Ok(())
    }

    fn cull_face(&mut self, face: Face) -> DeviceResult<()> {
        self.record(DeviceCall::CullFace(face));
        Ok(())
    }

    fn front_face(&mut self, winding: Winding) -> DeviceResult<()> {
        self.record(DeviceCall::FrontFace(winding));
        Ok(())
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) -> DeviceResult<()> {
        self.record(DeviceCall::PolygonOffset { factor, units });
        Ok(())
    }

    fn line_width(&mut self, width: f32) -> DeviceResult<()> {
        if width <= 0.0 {
            return Err(DeviceError::Native(format!("invalid line width {}", width)));
        }
        self.record(DeviceCall::LineWidth(width));
        Ok(())
    }

    fn point_size(&mut self, size: f32) -> DeviceResult<()> {
        if size <= 0.0 {
            return Err(DeviceError::Native(format!("invalid point size {}", size)));
        }
        self.record(DeviceCall::PointSize(size));
        Ok(())
    }

    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32) -> DeviceResult<()> {
        self.record(DeviceCall::StencilFunc { func, reference, mask });
        Ok(())
    }

    fn stencil_op(&mut self, sfail: StencilOp, dpfail: StencilOp, dppass: StencilOp) -> DeviceResult<()> {
        self.record(DeviceCall::StencilOp { sfail, dpfail, dppass });
        Ok(())
    }

    fn stencil_mask(&mut self, mask: u32) -> DeviceResult<()> {
        self.record(DeviceCall::StencilMask(mask));
        Ok(())
    }

    fn set_material(&mut self, material: Option<&Material>) -> DeviceResult<()> {
        self.record_fixed_function("materials", DeviceCall::Material(material.copied()))
    }

    fn set_light(&mut self, index: u32, light: Option<&Light>) -> DeviceResult<()> {
        if index >= self.caps.max_lights {
            return Err(DeviceError::Native(format!("light {} out of range", index)));
        }
        self.record_fixed_function("lights", DeviceCall::Light { index, light: light.copied() })
    }

    fn set_clip_plane(&mut self, index: u32, equation: Option<Vec4>) -> DeviceResult<()> {
        if index >= self.caps.max_clip_planes {
            return Err(DeviceError::Native(format!("clip plane {} out of range", index)));
        }
        let equation = equation.map(|e| [e.x, e.y, e.z, e.w]);
        self.record_fixed_function("clip planes", DeviceCall::ClipPlane { index, equation })
    }

    fn bind_texture(&mut self, unit: u32, target: TextureTarget, texture: Option<TextureId>) -> DeviceResult<()> {
        if unit >= self.caps.max_texture_units {
            return Err(DeviceError::Native(format!("texture unit {} out of range", unit)));
        }
        self.record(DeviceCall::BindTexture { unit, target, texture });
        Ok(())
    }

    fn load_matrices(&mut self, _model_view: &Mat4, _projection: &Mat4) -> DeviceResult<()> {
        self.record_fixed_function("fixed-function matrices", DeviceCall::LoadMatrices)
    }

    fn create_program(&mut self) -> DeviceResult<ProgramId> {
        let id = ProgramId(self.alloc_id());
        self.programs.insert(id, ProgramRecord::default());
        self.record(DeviceCall::CreateProgram(id));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.record(DeviceCall::DeleteProgram(program));
    }

    fn create_shader(&mut self, _kind: ShaderStageKind) -> DeviceResult<ShaderId> {
        let id = ShaderId(self.alloc_id());
        self.shaders.insert(id, ShaderRecord { source: String::new(), compiled: false });
        self.record(DeviceCall::CreateShader(id));
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
        self.record(DeviceCall::DeleteShader(shader));
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> DeviceResult<()> {
        let record = self
            .shaders
            .get_mut(&shader)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", shader)))?;
        record.source = source.to_string();
        record.compiled = false;

        let failure = source
            .lines()
            .enumerate()
            .find(|(_, line)| line.trim_start().starts_with("#error"));
        if let Some((line, text)) = failure {
            let message = text.trim_start().trim_start_matches("#error").trim();
            return Err(DeviceError::CompileFailed {
                log: format!("ERROR: 0:{}: '#error' : {}", line + 1, message),
            });
        }
        record.compiled = true;
        self.record(DeviceCall::CompileShader(shader));
        Ok(())
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> DeviceResult<()> {
        if !self.shaders.contains_key(&shader) {
            return Err(DeviceError::InvalidHandle(format!("{:?}", shader)));
        }
        let record = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", program)))?;
        if !record.attached.contains(&shader) {
            record.attached.push(shader);
        }
        self.record(DeviceCall::AttachShader { program, shader });
        Ok(())
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) -> DeviceResult<()> {
        let record = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", program)))?;
        record.attached.retain(|s| *s != shader);
        self.record(DeviceCall::DetachShader { program, shader });
        Ok(())
    }

    fn bind_attrib_location(&mut self, program: ProgramId, index: u32, name: &str) -> DeviceResult<()> {
        let record = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", program)))?;
        record.attribs.insert(name.to_string(), index);
        self.record(DeviceCall::BindAttribLocation { program, index, name: name.to_string() });
        Ok(())
    }

    fn link_program(&mut self, program: ProgramId) -> DeviceResult<()> {
        self.record(DeviceCall::LinkProgram(program));
        let record = self.program_record(program)?;

        let failure = if record.attached.is_empty() {
            Some("no shaders attached".to_string())
        } else if record
            .attached
            .iter()
            .any(|id| self.shaders.get(id).map_or(true, |s| !s.compiled))
        {
            Some("attached shader is not compiled".to_string())
        } else {
            let sources = self.link_sources(record);
            if !sources.iter().any(|s| s.contains("main(")) {
                Some("error: no definition of main".to_string())
            } else {
                self.link_failure_marker
                    .as_ref()
                    .filter(|marker| sources.iter().any(|s| s.contains(marker.as_str())))
                    .map(|marker| format!("error: unresolved symbol near '{}'", marker))
            }
        };

        let uniforms = {
            let mut seen = HashSet::new();
            let mut location = 0i32;
            let mut out = Vec::new();
            for source in self.link_sources(record) {
                for uniform in parse_uniforms(source) {
                    if seen.insert(uniform.name.clone()) {
                        let count = uniform.count as i32;
                        out.push((uniform, location));
                        location += count;
                    }
                }
            }
            out
        };

        let record = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", program)))?;
        record.values.clear();
        if let Some(log) = failure {
            record.linked = false;
            record.uniforms.clear();
            return Err(DeviceError::LinkFailed { log });
        }
        record.linked = true;
        record.uniforms = uniforms;
        Ok(())
    }

    fn active_uniforms(&mut self, program: ProgramId) -> DeviceResult<Vec<ActiveUniform>> {
        let record = self.program_record(program)?;
        Ok(record.uniforms.iter().map(|(u, _)| u.clone()).collect())
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let record = self.programs.get(&program).filter(|r| r.linked)?;
        let (base, element) = match name.split_once('[') {
            Some((base, rest)) => (base, rest.trim_end_matches(']').parse::<i32>().ok()?),
            None => (name, 0),
        };
        record.uniforms.iter().find_map(|(u, location)| {
            let declared = u.name.strip_suffix("[0]").unwrap_or(&u.name);
            (declared == base && element < u.count as i32).then_some(UniformLocation(location + element))
        })
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<u32> {
        let record = self.programs.get(&program).filter(|r| r.linked)?;
        record.attribs.get(name).copied()
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.bound_program = program.filter(|p| self.programs.get(p).is_some_and(|r| r.linked));
        self.record(DeviceCall::UseProgram(program));
    }

    fn bound_program(&self) -> Option<ProgramId> {
        self.bound_program
    }

    fn set_uniform(&mut self, location: UniformLocation, ty: UniformType, data: &UniformData) -> DeviceResult<()> {
        let program = self
            .bound_program
            .ok_or_else(|| DeviceError::Native("uniform upload with no program bound".into()))?;
        if ty.scalar() == ScalarKind::Double && !self.caps.double_precision_uniforms {
            return Err(DeviceError::Unsupported("double-precision uniforms".into()));
        }
        if !data.matches(ty) {
            return Err(DeviceError::Native(format!("data does not fit {}", ty.glsl_name())));
        }
        let record = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", program)))?;
        let (declared, _) = record
            .find(location.0)
            .ok_or_else(|| DeviceError::Native(format!("invalid uniform location {}", location.0)))?;
        if declared.ty != ty {
            return Err(DeviceError::Native(format!(
                "uniform '{}' is {}, not {}",
                declared.name,
                declared.ty.glsl_name(),
                ty.glsl_name()
            )));
        }
        record.values.insert(location.0, (ty, data.clone()));
        self.record(DeviceCall::SetUniform { location, ty });
        Ok(())
    }

    fn get_uniform(&mut self, program: ProgramId, location: UniformLocation, ty: UniformType, count: usize) -> DeviceResult<UniformData> {
        let record = self.program_record(program)?;
        let (declared, _) = record
            .find(location.0)
            .ok_or_else(|| DeviceError::Native(format!("invalid uniform location {}", location.0)))?;
        if declared.ty != ty {
            return Err(DeviceError::Native(format!("uniform '{}' is not {}", declared.name, ty.glsl_name())));
        }
        let len = count * ty.components();
        Ok(match record.values.get(&location.0) {
            Some((_, data)) => truncate(data, len),
            None => zeros(ty, len),
        })
    }

    fn create_buffer(&mut self) -> DeviceResult<BufferId> {
        let id = BufferId(self.alloc_id());
        self.buffers.insert(id, Vec::new());
        self.record(DeviceCall::CreateBuffer(id));
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        if self.bound_index_buffer == Some(buffer) {
            self.bound_index_buffer = None;
        }
        self.record(DeviceCall::DeleteBuffer(buffer));
    }

    fn upload_buffer(&mut self, buffer: BufferId, kind: BufferKind, data: &[u8]) -> DeviceResult<()> {
        let storage = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", buffer)))?;
        storage.clear();
        storage.extend_from_slice(data);
        self.record(DeviceCall::UploadBuffer { buffer, kind, len: data.len() });
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>) {
        self.bound_index_buffer = buffer;
        self.record(DeviceCall::BindIndexBuffer(buffer));
    }

    fn bound_index_buffer(&self) -> Option<BufferId> {
        self.bound_index_buffer
    }

    fn enable_vertex_attrib(&mut self, index: u32, layout: &VertexAttribLayout) -> DeviceResult<()> {
        if !self.buffers.contains_key(&layout.buffer) {
            return Err(DeviceError::InvalidHandle(format!("{:?}", layout.buffer)));
        }
        if !(1..=4).contains(&layout.components) {
            return Err(DeviceError::Native(format!("{} components per attribute", layout.components)));
        }
        self.enabled_attribs.insert(index);
        self.record(DeviceCall::EnableVertexAttrib(index));
        Ok(())
    }

    fn disable_vertex_attrib(&mut self, index: u32) {
        self.enabled_attribs.remove(&index);
        self.record(DeviceCall::DisableVertexAttrib(index));
    }

    fn set_vertex_attrib_constant(&mut self, index: u32, value: [f32; 4]) {
        self.record(DeviceCall::VertexAttribConstant { index, value });
    }

    fn draw_arrays(&mut self, mode: PrimitiveType, first: u32, count: u32, instances: u32) -> DeviceResult<()> {
        if instances == 0 {
            return Err(DeviceError::Native("zero instances".into()));
        }
        self.record(DeviceCall::DrawArrays { mode, first, count, instances });
        Ok(())
    }

    fn draw_elements(&mut self, mode: PrimitiveType, count: u32, index_type: IndexType, source: IndexSource<'_>, instances: u32) -> DeviceResult<()> {
        if instances == 0 {
            return Err(DeviceError::Native("zero instances".into()));
        }
        let from_buffer = self.check_index_source(source, count as usize * index_type.size_bytes())?;
        self.record(DeviceCall::DrawElements { mode, count, index_type, from_buffer, instances });
        Ok(())
    }

    fn draw_range_elements(&mut self, mode: PrimitiveType, start: u32, end: u32, count: u32, index_type: IndexType, source: IndexSource<'_>, instances: u32) -> DeviceResult<()> {
        if instances == 0 {
            return Err(DeviceError::Native("zero instances".into()));
        }
        if end < start {
            return Err(DeviceError::Native(format!("range end {} before start {}", end, start)));
        }
        self.check_index_source(source, count as usize * index_type.size_bytes())?;
        self.record(DeviceCall::DrawRangeElements { mode, start, end, count, index_type, instances });
        Ok(())
    }

    fn multi_draw_elements(&mut self, mode: PrimitiveType, index_type: IndexType, source: IndexSource<'_>, ranges: &[IndexRange], instances: u32) -> DeviceResult<()> {
        if instances == 0 {
            return Err(DeviceError::Native("zero instances".into()));
        }
        let needed = ranges
            .iter()
            .map(|r| (r.first + r.count) as usize * index_type.size_bytes())
            .max()
            .unwrap_or(0);
        self.check_index_source(source, needed)?;
        self.record(DeviceCall::MultiDrawElements { mode, index_type, ranges: ranges.to_vec(), instances });
        Ok(())
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = rect;
        self.record(DeviceCall::Viewport(rect));
    }

    fn set_scissor(&mut self, rect: Rect) {
        self.scissor = rect;
        self.record(DeviceCall::Scissor(rect));
    }

    fn clear(&mut self, flags: ClearFlags, _color: [f32; 4], _depth: f64) {
        self.record(DeviceCall::Clear(flags));
    }

    fn clear_color_buffer(&mut self, draw_buffer: u32, color: [f32; 4]) {
        self.record(DeviceCall::ClearColorBuffer { draw_buffer, color });
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> DeviceResult<TextureId> {
        if self.fail_allocations {
            return Err(DeviceError::OutOfResources(format!("{}x{} {:?}", desc.width, desc.height, desc.format)));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Native("zero-sized texture".into()));
        }
        let texture = TextureId(self.alloc_id());
        self.textures.insert(texture, *desc);
        self.record(DeviceCall::CreateTexture { texture, desc: *desc });
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        for attachments in self.framebuffers.values_mut() {
            attachments.retain(|_, t| *t != texture);
        }
        self.record(DeviceCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> DeviceResult<FramebufferId> {
        let framebuffer = FramebufferId(self.alloc_id());
        self.framebuffers.insert(framebuffer, HashMap::new());
        self.record(DeviceCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
        self.record(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn attach_texture(&mut self, framebuffer: FramebufferId, attachment: Attachment, texture: Option<TextureId>) -> DeviceResult<()> {
        if let Some(id) = texture {
            if !self.textures.contains_key(&id) {
                return Err(DeviceError::InvalidHandle(format!("{:?}", id)));
            }
        }
        let attachments = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", framebuffer)))?;
        match texture {
            Some(id) => {
                attachments.insert(attachment, id);
            }
            None => {
                attachments.remove(&attachment);
            }
        }
        self.record(DeviceCall::AttachTexture { framebuffer, attachment, texture });
        Ok(())
    }

    fn check_framebuffer(&mut self, framebuffer: FramebufferId) -> DeviceResult<()> {
        let attachments = self
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| DeviceError::InvalidHandle(format!("{:?}", framebuffer)))?;
        let mut sizes = attachments
            .values()
            .filter_map(|t| self.textures.get(t))
            .map(|d| (d.width, d.height));
        let Some(first) = sizes.next() else {
            return Err(DeviceError::Native("framebuffer has no attachments".into()));
        };
        if sizes.any(|size| size != first) {
            return Err(DeviceError::Native("framebuffer attachments differ in size".into()));
        }
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound_framebuffer = framebuffer;
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn set_draw_buffers(&mut self, attachments: &[u32]) -> DeviceResult<()> {
        if self.bound_framebuffer.is_none() && attachments.iter().any(|&a| a > 0) {
            return Err(DeviceError::Native("default framebuffer has a single draw buffer".into()));
        }
        self.record(DeviceCall::DrawBuffers(attachments.to_vec()));
        Ok(())
    }

    fn create_query(&mut self) -> DeviceResult<QueryId> {
        if !self.caps.occlusion_query {
            return Err(DeviceError::Unsupported("occlusion queries".into()));
        }
        let query = QueryId(self.alloc_id());
        self.queries.insert(query, None);
        self.record(DeviceCall::CreateQuery(query));
        Ok(query)
    }

    fn delete_query(&mut self, query: QueryId) {
        self.queries.remove(&query);
        self.record(DeviceCall::DeleteQuery(query));
    }

    fn begin_occlusion_query(&mut self, query: QueryId) -> DeviceResult<()> {
        if self.active_query.is_some() {
            return Err(DeviceError::Native("an occlusion query is already active".into()));
        }
        if !self.queries.contains_key(&query) {
            return Err(DeviceError::InvalidHandle(format!("{:?}", query)));
        }
        self.active_query = Some(query);
        self.record(DeviceCall::BeginQuery(query));
        Ok(())
    }

    fn end_occlusion_query(&mut self) -> DeviceResult<()> {
        let query = self
            .active_query
            .take()
            .ok_or_else(|| DeviceError::Native("no occlusion query is active".into()))?;
        let samples = self.occlusion_script.pop_front().unwrap_or(self.default_samples);
        self.queries.insert(query, Some(samples));
        self.record(DeviceCall::EndQuery);
        Ok(())
    }

    fn occlusion_query_result(&mut self, query: QueryId) -> DeviceResult<u64> {
        let samples = self
            .queries
            .get(&query)
            .copied()
            .flatten()
            .ok_or_else(|| DeviceError::Native(format!("{:?} has no result", query)))?;
        self.record(DeviceCall::QueryResult { query, samples });
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uniform_declarations() {
        let uniforms = parse_uniforms(
            "uniform highp mat4 u_MVP;\nuniform vec3 u_A, u_B[2];\n  uniform sampler2DRect u_Tex;\nin vec3 x;",
        );
        let names: Vec<_> = uniforms.iter().map(|u| (u.name.as_str(), u.count)).collect();
        assert_eq!(names, vec![("u_MVP", 1), ("u_A", 1), ("u_B[0]", 2), ("u_Tex", 1)]);
        assert_eq!(uniforms[3].ty, UniformType::Int);
    }

    #[test]
    fn test_array_element_locations() {
        let mut device = HeadlessDevice::new();
        let program = device.create_program().unwrap();
        let shader = device.create_shader(ShaderStageKind::Vertex).unwrap();
        device
            .compile_shader(shader, "uniform float u_X;\nuniform vec4 u_Arr[4];\nvoid main() {}")
            .unwrap();
        device.attach_shader(program, shader).unwrap();
        device.link_program(program).unwrap();

        let base = device.uniform_location(program, "u_Arr").unwrap();
        assert_eq!(device.uniform_location(program, "u_Arr[0]"), Some(base));
        assert_eq!(device.uniform_location(program, "u_Arr[3]"), Some(UniformLocation(base.0 + 3)));
        assert_eq!(device.uniform_location(program, "u_Arr[4]"), None);
    }

    #[test]
    fn test_occlusion_script_then_default() {
        let mut device = HeadlessDevice::new();
        device.script_occlusion_samples([5]);
        device.set_default_occlusion_samples(0);
        let query = device.create_query().unwrap();
        let mut results = Vec::new();
        for _ in 0..2 {
            device.begin_occlusion_query(query).unwrap();
            device.end_occlusion_query().unwrap();
            results.push(device.occlusion_query_result(query).unwrap());
        }
        assert_eq!(results, vec![5, 0]);
    }
}
