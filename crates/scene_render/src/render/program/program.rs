//! # Shader Programs
//!
//! A [`ShaderProgram`] owns a set of [`ShaderStage`]s, links them into one
//! native program and resolves uniform names to locations.
//!
//! ## Lifecycle
//!
//! - The native program is created lazily by the first attach or link.
//! - Attaching compiles the stage and marks the program dirty.
//! - [`ShaderProgram::link`] is a no-op while linked and clean.
//! - Every successful link rebuilds the uniform location table and the
//!   standard transform locations, so per-frame code only checks for
//!   `Some(location)` instead of asking the driver.

use std::collections::HashMap;

use crate::foundation::math::{Mat4, Mat4Ext};
use crate::render::api::{DeviceError, GraphicsDevice, ProgramId, UniformLocation};
use crate::render::scene::Camera;
use crate::render::{RenderError, RenderResult};

use super::stage::ShaderStage;
use super::uniform::{UniformData, UniformSet, UniformType};

/// Conventional vertex attributes and the locations they are bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardAttribute {
    /// `a_Position`
    Position,
    /// `a_Normal`
    Normal,
    /// `a_Color`
    Color,
    /// `a_TexCoord0`
    TexCoord0,
    /// `a_TexCoord1`
    TexCoord1,
}

impl StandardAttribute {
    /// Every standard attribute
    pub const ALL: [Self; 5] = [
        Self::Position,
        Self::Normal,
        Self::Color,
        Self::TexCoord0,
        Self::TexCoord1,
    ];

    /// Attribute name in GLSL
    pub const fn name(self) -> &'static str {
        match self {
            Self::Position => "a_Position",
            Self::Normal => "a_Normal",
            Self::Color => "a_Color",
            Self::TexCoord0 => "a_TexCoord0",
            Self::TexCoord1 => "a_TexCoord1",
        }
    }

    /// Bound attribute location
    pub const fn location(self) -> u32 {
        self as u32
    }
}

/// Model-view matrix uniform
pub const MODEL_VIEW_MATRIX: &str = "u_ModelViewMatrix";
/// Projection matrix uniform
pub const PROJECTION_MATRIX: &str = "u_ProjectionMatrix";
/// Combined model-view-projection matrix uniform
pub const MODEL_VIEW_PROJECTION_MATRIX: &str = "u_ModelViewProjectionMatrix";
/// Normal matrix uniform
pub const NORMAL_MATRIX: &str = "u_NormalMatrix";

/// Locations of the transform uniforms, resolved at link time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandardLocations {
    /// `u_ModelViewMatrix`
    pub model_view: Option<UniformLocation>,
    /// `u_ProjectionMatrix`
    pub projection: Option<UniformLocation>,
    /// `u_ModelViewProjectionMatrix`
    pub model_view_projection: Option<UniformLocation>,
    /// `u_NormalMatrix`
    pub normal_matrix: Option<UniformLocation>,
}

impl StandardLocations {
    /// Whether any transform uniform is active
    pub fn any(&self) -> bool {
        self.model_view.is_some()
            || self.projection.is_some()
            || self.model_view_projection.is_some()
            || self.normal_matrix.is_some()
    }
}

/// A linked set of shader stages
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    name: String,
    handle: Option<ProgramId>,
    stages: Vec<ShaderStage>,
    linked: bool,
    dirty: bool,
    uniform_locations: HashMap<String, UniformLocation>,
    auto_attrib_locations: Vec<(String, u32)>,
    standard: StandardLocations,
}

impl ShaderProgram {
    /// Create an empty program
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
            stages: Vec::new(),
            linked: false,
            dirty: true,
            uniform_locations: HashMap::new(),
            auto_attrib_locations: Vec::new(),
            standard: StandardLocations::default(),
        }
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native program, once created
    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    /// Whether the last link succeeded and nothing changed since
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Whether stages or attribute bindings changed since the last link
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of attached stages
    pub fn shader_count(&self) -> usize {
        self.stages.len()
    }

    /// Attached stages
    pub fn stages(&self) -> &[ShaderStage] {
        &self.stages
    }

    /// Transform uniform locations
    pub fn standard_locations(&self) -> &StandardLocations {
        &self.standard
    }

    /// Location of a uniform by name
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_locations.get(name).copied()
    }

    /// Request an attribute location applied at the next link
    pub fn add_auto_attrib_location(&mut self, name: impl Into<String>, index: u32) {
        let name = name.into();
        self.auto_attrib_locations.retain(|(n, _)| *n != name);
        self.auto_attrib_locations.push((name, index));
        self.dirty = true;
    }

    fn create(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<ProgramId> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let handle = device.create_program()?;
        log::debug!("Created program '{}' ({:?})", self.name, handle);
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Attach a stage, compiling it if needed
    ///
    /// An equal stage already attached is replaced, so attaching the same
    /// stage twice leaves one copy.
    pub fn attach_shader(&mut self, device: &mut dyn GraphicsDevice, mut stage: ShaderStage) -> RenderResult<()> {
        let program = self.create(device)?;
        if let Some(pos) = self.stages.iter().position(|s| *s == stage) {
            let mut previous = self.stages.remove(pos);
            if let Some(shader) = previous.handle() {
                device.detach_shader(program, shader)?;
            }
            previous.release(device);
        }

        self.dirty = true;
        self.linked = false;
        stage.compile(device)?;
        if let Some(shader) = stage.handle() {
            device.attach_shader(program, shader)?;
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Detach and release a stage; detaching a stage that is not attached does nothing
    pub fn detach_shader(&mut self, device: &mut dyn GraphicsDevice, stage: &ShaderStage) -> RenderResult<()> {
        let Some(pos) = self.stages.iter().position(|s| s == stage) else {
            return Ok(());
        };
        let mut removed = self.stages.remove(pos);
        if let (Some(program), Some(shader)) = (self.handle, removed.handle()) {
            device.detach_shader(program, shader)?;
        }
        removed.release(device);
        self.dirty = true;
        self.linked = false;
        Ok(())
    }

    /// Release every stage's native object while keeping the program linked
    ///
    /// The stage sources are dropped too; re-attach to rebuild.
    pub fn discard_all_shaders(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for mut stage in self.stages.drain(..) {
            if let (Some(program), Some(shader)) = (self.handle, stage.handle()) {
                device.detach_shader(program, shader)?;
            }
            stage.release(device);
        }
        Ok(())
    }

    /// Link the attached stages
    ///
    /// Does nothing when already linked, clean and not forced. Linking with
    /// no stages attached is a contract violation.
    pub fn link(&mut self, device: &mut dyn GraphicsDevice, force: bool) -> RenderResult<()> {
        if self.linked && !self.dirty && !force {
            return Ok(());
        }
        if self.stages.is_empty() {
            return Err(RenderError::contract(format!(
                "program '{}' linked with no shader stages attached",
                self.name
            )));
        }

        let program = self.create(device)?;
        for stage in &mut self.stages {
            if !stage.is_compiled() {
                stage.compile(device)?;
                if let Some(shader) = stage.handle() {
                    device.attach_shader(program, shader)?;
                }
            }
        }

        for attribute in StandardAttribute::ALL {
            device.bind_attrib_location(program, attribute.location(), attribute.name())?;
        }
        for (name, index) in &self.auto_attrib_locations {
            device.bind_attrib_location(program, *index, name)?;
        }

        self.linked = false;
        match device.link_program(program) {
            Ok(()) => {}
            Err(DeviceError::LinkFailed { log }) => {
                log::error!("Program '{}' failed to link:\n{}", self.name, log);
                return Err(RenderError::LinkFailed {
                    name: self.name.clone(),
                    log,
                });
            }
            Err(err) => return Err(err.into()),
        }

        self.linked = true;
        self.dirty = false;
        self.rebuild_locations(device, program)?;
        log::info!(
            "Linked program '{}' with {} stages, {} active uniforms",
            self.name,
            self.stages.len(),
            self.uniform_locations.len()
        );
        Ok(())
    }

    fn rebuild_locations(&mut self, device: &mut dyn GraphicsDevice, program: ProgramId) -> RenderResult<()> {
        self.uniform_locations.clear();
        for active in device.active_uniforms(program)? {
            let Some(location) = device.uniform_location(program, &active.name) else {
                continue;
            };
            if let Some(base) = active.name.strip_suffix("[0]") {
                self.uniform_locations.insert(base.to_string(), location);
            }
            self.uniform_locations.insert(active.name, location);
        }

        self.standard = StandardLocations {
            model_view: self.uniform_location(MODEL_VIEW_MATRIX),
            projection: self.uniform_location(PROJECTION_MATRIX),
            model_view_projection: self.uniform_location(MODEL_VIEW_PROJECTION_MATRIX),
            normal_matrix: self.uniform_location(NORMAL_MATRIX),
        };
        Ok(())
    }

    fn ensure_bound(&self, device: &dyn GraphicsDevice, operation: &str) -> RenderResult<()> {
        if !self.linked {
            return Err(RenderError::contract(format!(
                "{} on program '{}' which is not linked",
                operation, self.name
            )));
        }
        if self.handle.is_none() || device.bound_program() != self.handle {
            return Err(RenderError::contract(format!(
                "{} on program '{}' which is not bound",
                operation, self.name
            )));
        }
        Ok(())
    }

    /// Upload every uniform of `set` that the program uses
    ///
    /// The program must be linked and bound. Uniforms the linker removed are
    /// skipped. A uniform with no value, declared by the program or not, is reported as a contract violation
    /// after the rest of the set has been uploaded. Returns the number of
    /// uniforms uploaded.
    pub fn apply_uniform_set(&self, device: &mut dyn GraphicsDevice, set: &UniformSet) -> RenderResult<usize> {
        self.ensure_bound(device, "uniform upload")?;

        let mut uploaded = 0;
        let mut undeclared = Vec::new();
        for uniform in set.iter() {
            if uniform.ty() == UniformType::None || uniform.data().is_empty() {
                undeclared.push(uniform.name().to_string());
                continue;
            }
            let Some(location) = self.uniform_location(uniform.name()) else {
                log::debug!("Program '{}' has no active uniform '{}', skipped", self.name, uniform.name());
                continue;
            };
            match device.set_uniform(location, uniform.ty(), uniform.data()) {
                Ok(()) => uploaded += 1,
                Err(err) => log::warn!("Uniform '{}' not uploaded: {}", uniform.name(), err),
            }
        }

        if undeclared.is_empty() {
            Ok(uploaded)
        } else {
            Err(RenderError::contract(format!(
                "uniforms with no value bound to program '{}': {}",
                self.name,
                undeclared.join(", ")
            )))
        }
    }

    /// Upload the transform uniforms the program declares
    ///
    /// Returns whether anything was uploaded.
    pub fn upload_transform(&self, device: &mut dyn GraphicsDevice, world: &Mat4, camera: &Camera) -> RenderResult<bool> {
        self.ensure_bound(device, "transform upload")?;
        if !self.standard.any() {
            return Ok(false);
        }

        let model_view = camera.get_view_matrix() * world;
        let projection = camera.get_projection_matrix();
        let mut upload = |location: Option<UniformLocation>, ty: UniformType, values: &[f32]| -> RenderResult<()> {
            if let Some(location) = location {
                device.set_uniform(location, ty, &UniformData::Float(values.to_vec()))?;
            }
            Ok(())
        };

        upload(self.standard.model_view, UniformType::FloatMat4, model_view.as_slice())?;
        upload(self.standard.projection, UniformType::FloatMat4, projection.as_slice())?;
        if self.standard.model_view_projection.is_some() {
            let mvp = projection * model_view;
            upload(self.standard.model_view_projection, UniformType::FloatMat4, mvp.as_slice())?;
        }
        if self.standard.normal_matrix.is_some() {
            let normal = model_view.normal_matrix();
            upload(self.standard.normal_matrix, UniformType::FloatMat3, normal.as_slice())?;
        }
        Ok(true)
    }

    /// Read back `count` elements of a uniform
    pub fn get_uniform(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        ty: UniformType,
        count: usize,
    ) -> RenderResult<UniformData> {
        let (Some(program), Some(location)) = (self.handle, self.uniform_location(name)) else {
            return Err(RenderError::MissingResource(format!(
                "program '{}' has no active uniform '{}'",
                self.name, name
            )));
        };
        Ok(device.get_uniform(program, location, ty, count)?)
    }

    /// Release the native program and every stage
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for stage in &mut self.stages {
            stage.release(device);
        }
        if let Some(handle) = self.handle.take() {
            if device.bound_program() == Some(handle) {
                device.use_program(None);
            }
            device.delete_program(handle);
            log::debug!("Destroyed program '{}'", self.name);
        }
        self.linked = false;
        self.dirty = true;
        self.uniform_locations.clear();
        self.standard = StandardLocations::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};
    use crate::render::program::{ScalarKind, Uniform};

    const VERTEX: &str = "uniform mat4 u_ModelViewProjectionMatrix;\nuniform float u_Scale;\nvoid main() {}";
    const FRAGMENT: &str = "uniform vec4 u_Colors[3];\nvoid main() {}";

    fn linked_program(device: &mut HeadlessDevice) -> ShaderProgram {
        let mut program = ShaderProgram::new("test");
        program.attach_shader(device, ShaderStage::vertex(VERTEX)).unwrap();
        program.attach_shader(device, ShaderStage::fragment(FRAGMENT)).unwrap();
        program.link(device, false).unwrap();
        program
    }

    #[test]
    fn test_link_with_no_stages_is_contract_violation() {
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new("empty");
        let err = program.link(&mut device, false).unwrap_err();
        assert!(matches!(err, RenderError::ContractViolation(_)));
        assert!(!program.is_linked());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new("twice");
        program.attach_shader(&mut device, ShaderStage::vertex(VERTEX)).unwrap();
        program.attach_shader(&mut device, ShaderStage::vertex(VERTEX)).unwrap();
        assert_eq!(program.shader_count(), 1);
        assert!(program.is_dirty());
    }

    #[test]
    fn test_link_is_noop_when_clean() {
        let mut device = HeadlessDevice::new();
        let mut program = linked_program(&mut device);
        device.clear_calls();
        program.link(&mut device, false).unwrap();
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::LinkProgram(_))), 0);
        program.link(&mut device, true).unwrap();
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::LinkProgram(_))), 1);
    }

    #[test]
    fn test_link_resolves_standard_and_array_locations() {
        let mut device = HeadlessDevice::new();
        let program = linked_program(&mut device);
        let standard = program.standard_locations();
        assert!(standard.model_view_projection.is_some());
        assert!(standard.model_view.is_none());
        assert!(program.uniform_location("u_Colors").is_some());
        assert_eq!(program.uniform_location("u_Colors"), program.uniform_location("u_Colors[0]"));
    }

    #[test]
    fn test_link_failure_leaves_program_unlinked() {
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new("no-main");
        program.attach_shader(&mut device, ShaderStage::vertex("uniform float x;")).unwrap();
        let err = program.link(&mut device, false).unwrap_err();
        assert!(matches!(err, RenderError::LinkFailed { .. }));
        assert!(!program.is_linked());
    }

    #[test]
    fn test_detach_unattached_is_noop() {
        let mut device = HeadlessDevice::new();
        let mut program = linked_program(&mut device);
        program
            .detach_shader(&mut device, &ShaderStage::fragment("void main() { discard; }"))
            .unwrap();
        assert!(program.is_linked());
        assert_eq!(program.shader_count(), 2);
    }

    #[test]
    fn test_discard_keeps_link_state() {
        let mut device = HeadlessDevice::new();
        let mut program = linked_program(&mut device);
        program.discard_all_shaders(&mut device).unwrap();
        assert_eq!(program.shader_count(), 0);
        assert!(program.is_linked());
        assert!(program.handle().is_some());
    }

    #[test]
    fn test_uniform_set_requires_binding() {
        let mut device = HeadlessDevice::new();
        let program = linked_program(&mut device);
        let set = UniformSet::new().with(Uniform::float("u_Scale", 2.0));
        assert!(matches!(
            program.apply_uniform_set(&mut device, &set),
            Err(RenderError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_missing_uniform_is_skipped_and_none_typed_is_violation() {
        let mut device = HeadlessDevice::new();
        let program = linked_program(&mut device);
        device.use_program(program.handle());

        let set = UniformSet::new()
            .with(Uniform::float("u_Scale", 2.0))
            .with(Uniform::float("u_NotThere", 1.0));
        assert_eq!(program.apply_uniform_set(&mut device, &set).unwrap(), 1);

        let bad = set.with(Uniform::new("u_Colors"));
        assert!(matches!(
            program.apply_uniform_set(&mut device, &bad),
            Err(RenderError::ContractViolation(_))
        ));
        let scale = program.get_uniform(&mut device, "u_Scale", UniformType::Float, 1).unwrap();
        assert_eq!(scale, UniformData::Float(vec![2.0]));
    }
    #[test]
    fn test_valueless_uniform_is_violation_even_when_undeclared() {
        let mut device = HeadlessDevice::new();
        let program = linked_program(&mut device);
        device.use_program(program.handle());

        let set = UniformSet::new()
            .with(Uniform::float("u_Scale", 3.0))
            .with(Uniform::new("u_DeclaredNowhere"));
        let err = program.apply_uniform_set(&mut device, &set).unwrap_err();
        assert!(matches!(err, RenderError::ContractViolation(ref msg) if msg.contains("u_DeclaredNowhere")));
        let scale = program.get_uniform(&mut device, "u_Scale", UniformType::Float, 1).unwrap();
        assert_eq!(scale, UniformData::Float(vec![3.0]));
    }

    #[test]
    fn test_every_uniform_type_reads_back_what_was_uploaded() {
        let mut device = HeadlessDevice::new();
        let fragment: String = UniformType::ALL_DATA
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("uniform {} u_Value{};\n", ty.glsl_name(), i))
            .chain(std::iter::once("void main() {}".to_string()))
            .collect();
        let mut program = ShaderProgram::new("every-type");
        program.attach_shader(&mut device, ShaderStage::vertex(VERTEX)).unwrap();
        program.attach_shader(&mut device, ShaderStage::fragment(fragment)).unwrap();
        program.link(&mut device, false).unwrap();
        device.use_program(program.handle());

        let expected: Vec<(String, UniformType, UniformData)> = UniformType::ALL_DATA
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                let n = ty.components();
                let data = match ty.scalar() {
                    ScalarKind::Int => UniformData::Int((0..n).map(|c| c as i32 - 7 * i as i32).collect()),
                    ScalarKind::UInt => UniformData::UInt((0..n).map(|c| (c + 100 * i) as u32).collect()),
                    ScalarKind::Float => UniformData::Float((0..n).map(|c| c as f32 * 0.25 + i as f32).collect()),
                    ScalarKind::Double => {
                        UniformData::Double((0..n).map(|c| c as f64 / 3.0 - i as f64).collect())
                    }
                    ScalarKind::None => UniformData::None,
                };
                (format!("u_Value{}", i), ty, data)
            })
            .collect();

        let set = expected.iter().fold(UniformSet::new(), |set, (name, ty, data)| {
            set.with(Uniform::from_data(name.clone(), *ty, data.clone()).unwrap())
        });
        assert_eq!(program.apply_uniform_set(&mut device, &set).unwrap(), UniformType::ALL_DATA.len());

        for (name, ty, data) in &expected {
            let read = program.get_uniform(&mut device, name, *ty, 1).unwrap();
            assert_eq!(&read, data, "{}", ty.glsl_name());
        }
    }
}
