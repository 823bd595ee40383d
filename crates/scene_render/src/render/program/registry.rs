//! Arena of shader programs addressed by stable keys

use slotmap::{new_key_type, SlotMap};

use crate::render::api::GraphicsDevice;
use crate::render::{RenderError, RenderResult};

use super::program::ShaderProgram;

new_key_type! {
    /// Stable handle to a program in a [`ProgramRegistry`]
    pub struct ProgramKey;
}

/// Owner of every shader program of a context
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    programs: SlotMap<ProgramKey, ShaderProgram>,
}

impl ProgramRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a program
    pub fn insert(&mut self, program: ShaderProgram) -> ProgramKey {
        self.programs.insert(program)
    }

    /// Program by key
    pub fn get(&self, key: ProgramKey) -> Option<&ShaderProgram> {
        self.programs.get(key)
    }

    /// Program by key, mutably
    pub fn get_mut(&mut self, key: ProgramKey) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(key)
    }

    /// Whether the key names a live program
    pub fn contains(&self, key: ProgramKey) -> bool {
        self.programs.contains_key(key)
    }

    /// Number of programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Programs with their keys
    pub fn iter(&self) -> impl Iterator<Item = (ProgramKey, &ShaderProgram)> {
        self.programs.iter()
    }

    /// Link `key` if it is dirty or unlinked
    pub fn ensure_linked(&mut self, key: ProgramKey, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let program = self
            .programs
            .get_mut(key)
            .ok_or_else(|| RenderError::MissingResource(format!("program {:?}", key)))?;
        if program.is_linked() && !program.is_dirty() {
            return Ok(());
        }
        program.link(device, false)
    }

    /// Destroy and remove a program
    pub fn remove(&mut self, key: ProgramKey, device: &mut dyn GraphicsDevice) -> Option<ShaderProgram> {
        let mut program = self.programs.remove(key)?;
        program.destroy(device);
        Some(program)
    }

    /// Destroy every program
    pub fn destroy_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, mut program) in self.programs.drain() {
            program.destroy(device);
        }
    }
}
