//! Per-frame counters collected by the renderers

/// Statistics for rendering performance monitoring
///
/// Only filled in when collection is enabled in the renderer configuration.
/// Primitive counts that are unknown (primitive restart) are left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStatistics {
    /// Distinct actors drawn
    pub objects: usize,
    /// Passes drawn, multi-pass continuations included
    pub passes: usize,
    /// Renderable submissions
    pub draw_calls: usize,
    /// Triangles drawn
    pub triangles: u64,
    /// Lines drawn
    pub lines: u64,
    /// Points drawn
    pub points: u64,
    /// Peel iterations run by a depth-peeling renderer
    pub peel_passes: usize,
}

impl RenderStatistics {
    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add one draw with the renderable's reported counts
    ///
    /// Negative counts mean unknown and are skipped.
    pub fn record_draw(&mut self, triangles: i64, lines: i64, points: i64) {
        self.draw_calls += 1;
        self.triangles += u64::try_from(triangles).unwrap_or(0);
        self.lines += u64::try_from(lines).unwrap_or(0);
        self.points += u64::try_from(points).unwrap_or(0);
    }

    /// Sum of two statistics
    pub fn merge(&mut self, other: &Self) {
        self.objects += other.objects;
        self.passes += other.passes;
        self.draw_calls += other.draw_calls;
        self.triangles += other.triangles;
        self.lines += other.lines;
        self.points += other.points;
        self.peel_passes += other.peel_passes;
    }

    /// Average draws per object
    pub fn avg_passes_per_object(&self) -> f32 {
        if self.objects == 0 {
            0.0
        } else {
            self.passes as f32 / self.objects as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_counts_are_not_accumulated() {
        let mut stats = RenderStatistics::default();
        stats.record_draw(3, -1, 0);
        stats.record_draw(-1, 2, -1);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.triangles, 3);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.points, 0);
    }

    #[test]
    fn test_merge_and_reset() {
        let mut a = RenderStatistics { objects: 2, passes: 3, ..Default::default() };
        let b = RenderStatistics { objects: 1, passes: 1, peel_passes: 4, ..Default::default() };
        a.merge(&b);
        assert_eq!(a.objects, 3);
        assert_eq!(a.peel_passes, 4);
        assert!((a.avg_passes_per_object() - 4.0 / 3.0).abs() < 1e-6);
        a.reset();
        assert_eq!(a, RenderStatistics::default());
    }
}
