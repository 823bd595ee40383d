//! Effects: per-LOD lists of shader passes

use crate::render::lod::LodEvaluator;

use super::ShaderKey;

/// Shader passes for each level of detail
///
/// Level 0 is the most detailed. Each level holds one shader per pass; more
/// than one shader makes a multi-pass effect.
#[derive(Debug)]
pub struct Effect {
    lods: Vec<Vec<ShaderKey>>,
    lod_evaluator: Option<Box<dyn LodEvaluator>>,
    render_rank: i32,
    enable_mask: u32,
}

impl Default for Effect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect {
    /// Effect with no levels
    pub fn new() -> Self {
        Self {
            lods: Vec::new(),
            lod_evaluator: None,
            render_rank: 0,
            enable_mask: u32::MAX,
        }
    }

    /// Single-pass, single-level effect
    pub fn single(shader: ShaderKey) -> Self {
        Self::new().with_lod(vec![shader])
    }

    /// Append a level with the given passes
    pub fn with_lod(mut self, passes: Vec<ShaderKey>) -> Self {
        self.lods.push(passes);
        self
    }

    /// Replace the passes of `level`, growing the level list as needed
    pub fn set_lod(&mut self, level: usize, passes: Vec<ShaderKey>) {
        if self.lods.len() <= level {
            self.lods.resize_with(level + 1, Vec::new);
        }
        self.lods[level] = passes;
    }

    /// Passes of `level`
    pub fn lod(&self, level: usize) -> &[ShaderKey] {
        self.lods.get(level).map_or(&[], Vec::as_slice)
    }

    /// Number of levels
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// Builder-style LOD evaluator choosing the shader level
    pub fn with_lod_evaluator(mut self, evaluator: impl LodEvaluator + 'static) -> Self {
        self.lod_evaluator = Some(Box::new(evaluator));
        self
    }

    /// LOD evaluator, if any
    pub fn lod_evaluator(&self) -> Option<&dyn LodEvaluator> {
        self.lod_evaluator.as_deref()
    }

    /// Builder-style render rank; lower ranks render first
    pub fn with_render_rank(mut self, rank: i32) -> Self {
        self.render_rank = rank;
        self
    }

    /// Render rank
    pub fn render_rank(&self) -> i32 {
        self.render_rank
    }

    /// Builder-style enable mask
    pub fn with_enable_mask(mut self, mask: u32) -> Self {
        self.enable_mask = mask;
        self
    }

    /// Enable mask matched against the queue builder's mask
    pub fn enable_mask(&self) -> u32 {
        self.enable_mask
    }
}
