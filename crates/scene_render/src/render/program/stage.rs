//! Individual shader stages

use crate::render::api::{DeviceError, GraphicsDevice, ShaderId, ShaderStageKind};
use crate::render::{RenderError, RenderResult};

/// One shader stage: source text plus its native object once compiled
///
/// Two stages are equal when their kind and source match; the native handle
/// does not take part.
#[derive(Debug, Clone)]
pub struct ShaderStage {
    kind: ShaderStageKind,
    source: String,
    name: String,
    handle: Option<ShaderId>,
    compiled: bool,
}

impl PartialEq for ShaderStage {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.source == other.source
    }
}

impl ShaderStage {
    /// Create a stage from source
    pub fn new(kind: ShaderStageKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            name: format!("{:?}", kind).to_lowercase(),
            handle: None,
            compiled: false,
        }
    }

    /// Builder-style name used in diagnostics
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Vertex stage
    pub fn vertex(source: impl Into<String>) -> Self {
        Self::new(ShaderStageKind::Vertex, source)
    }

    /// Fragment stage
    pub fn fragment(source: impl Into<String>) -> Self {
        Self::new(ShaderStageKind::Fragment, source)
    }

    /// Pipeline stage
    pub fn kind(&self) -> ShaderStageKind {
        self.kind
    }

    /// Source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native object, once created
    pub fn handle(&self) -> Option<ShaderId> {
        self.handle
    }

    /// Whether the current source compiled successfully
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Replace the source, requiring a recompile
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.compiled = false;
    }

    /// Compile the source if it is not compiled yet
    ///
    /// On failure the info log and a line-numbered copy of the source are
    /// logged.
    pub fn compile(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        if self.compiled {
            return Ok(());
        }
        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let handle = device.create_shader(self.kind)?;
                self.handle = Some(handle);
                handle
            }
        };

        match device.compile_shader(handle, &self.source) {
            Ok(()) => {
                self.compiled = true;
                log::debug!("Compiled {} shader '{}'", self.kind_label(), self.name);
                Ok(())
            }
            Err(DeviceError::CompileFailed { log }) => {
                log::error!(
                    "{} shader '{}' failed to compile:\n{}\n{}",
                    self.kind_label(),
                    self.name,
                    log,
                    numbered_source(&self.source)
                );
                Err(RenderError::CompileFailed {
                    name: self.name.clone(),
                    log,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Delete the native object; the source is kept for a later recompile
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(handle) = self.handle.take() {
            device.delete_shader(handle);
        }
        self.compiled = false;
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            ShaderStageKind::Vertex => "Vertex",
            ShaderStageKind::Fragment => "Fragment",
            ShaderStageKind::Geometry => "Geometry",
            ShaderStageKind::TessControl => "Tessellation control",
            ShaderStageKind::TessEvaluation => "Tessellation evaluation",
        }
    }
}

fn numbered_source(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:4}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::HeadlessDevice;

    #[test]
    fn test_equality_ignores_handle() {
        let mut device = HeadlessDevice::new();
        let mut a = ShaderStage::vertex("void main() {}");
        let b = ShaderStage::vertex("void main() {}");
        a.compile(&mut device).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ShaderStage::fragment("void main() {}"));
    }

    #[test]
    fn test_compile_failure_reports_log() {
        let mut device = HeadlessDevice::new();
        let mut stage = ShaderStage::fragment("#error broken\nvoid main() {}").with_name("broken");
        let err = stage.compile(&mut device).unwrap_err();
        assert!(matches!(err, RenderError::CompileFailed { ref name, .. } if name == "broken"));
        assert!(!stage.is_compiled());
    }

    #[test]
    fn test_numbered_source() {
        assert_eq!(numbered_source("a\nb"), "   1: a\n   2: b");
    }
}
