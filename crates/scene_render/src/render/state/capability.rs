//! Enable flags and ordered, duplicate-free flag sets

use serde::{Deserialize, Serialize};

/// A boolean GPU capability toggled with enable/disable
///
/// The scissor test is not listed: the renderer owns it for per-actor
/// scissoring.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    Blend,
    ColorLogicOp,
    CullFace,
    DepthTest,
    DepthClamp,
    Dither,
    LineSmooth,
    PolygonSmooth,
    PolygonOffsetFill,
    PolygonOffsetLine,
    PolygonOffsetPoint,
    StencilTest,
    Multisample,
    SampleAlphaToCoverage,
    SampleAlphaToOne,
    SampleCoverage,
    ProgramPointSize,
    RasterizerDiscard,
    FramebufferSrgb,
    TextureCubeMapSeamless,
    // Fixed-function only
    AlphaTest,
    Lighting,
    Normalize,
    RescaleNormal,
    Fog,
    ColorMaterial,
    PointSmooth,
    PointSprite,
}

impl Capability {
    /// Number of capabilities
    pub const COUNT: usize = 28;

    /// Every capability in declaration order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Blend,
        Self::ColorLogicOp,
        Self::CullFace,
        Self::DepthTest,
        Self::DepthClamp,
        Self::Dither,
        Self::LineSmooth,
        Self::PolygonSmooth,
        Self::PolygonOffsetFill,
        Self::PolygonOffsetLine,
        Self::PolygonOffsetPoint,
        Self::StencilTest,
        Self::Multisample,
        Self::SampleAlphaToCoverage,
        Self::SampleAlphaToOne,
        Self::SampleCoverage,
        Self::ProgramPointSize,
        Self::RasterizerDiscard,
        Self::FramebufferSrgb,
        Self::TextureCubeMapSeamless,
        Self::AlphaTest,
        Self::Lighting,
        Self::Normalize,
        Self::RescaleNormal,
        Self::Fog,
        Self::ColorMaterial,
        Self::PointSmooth,
        Self::PointSprite,
    ];

    /// Dense table index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Only available on compatibility contexts
    pub const fn is_fixed_function(self) -> bool {
        matches!(
            self,
            Self::AlphaTest
                | Self::Lighting
                | Self::Normalize
                | Self::RescaleNormal
                | Self::Fog
                | Self::ColorMaterial
                | Self::PointSmooth
                | Self::PointSprite
        )
    }
}

/// Ordered collection of distinct capabilities to turn on
///
/// Absence means "off". Insertion order is kept so diffs are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnableSet {
    flags: Vec<Capability>,
}

impl EnableSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`EnableSet::enable`]
    pub fn with(mut self, cap: Capability) -> Self {
        self.enable(cap);
        self
    }

    /// Add a capability, ignoring duplicates
    pub fn enable(&mut self, cap: Capability) {
        if !self.flags.contains(&cap) {
            self.flags.push(cap);
        }
    }

    /// Remove a capability
    pub fn disable(&mut self, cap: Capability) {
        self.flags.retain(|&c| c != cap);
    }

    /// Whether the capability is in the set
    pub fn contains(&self, cap: Capability) -> bool {
        self.flags.contains(&cap)
    }

    /// Capabilities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.flags.iter().copied()
    }

    /// Number of capabilities
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Remove every capability
    pub fn clear(&mut self) {
        self.flags.clear();
    }
}

impl FromIterator<Capability> for EnableSet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::new();
        for cap in iter {
            set.enable(cap);
        }
        set
    }
}

impl<'a> IntoIterator for &'a EnableSet {
    type Item = Capability;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Capability>>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_table_order() {
        for (i, cap) in Capability::ALL.iter().enumerate() {
            assert_eq!(cap.index(), i);
        }
    }

    #[test]
    fn test_enable_set_rejects_duplicates_and_keeps_order() {
        let set: EnableSet = [Capability::Blend, Capability::DepthTest, Capability::Blend]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Capability::Blend, Capability::DepthTest]);
    }
}
