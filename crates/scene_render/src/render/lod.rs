//! # Level of Detail
//!
//! Evaluators pick a detail level from a camera-dependent metric and an
//! ascending threshold list. Level 0 is the most detailed.
//!
//! The result may exceed the levels an actor or effect actually defines;
//! consumers pass it through [`clamp_lod`] before indexing.

use std::fmt::Debug;

use crate::foundation::math::Aabb;
use crate::render::scene::Camera;

/// Strategy selecting a detail level for a bounding volume
pub trait LodEvaluator: Debug {
    /// Detail level for world-space `bounds` seen from `camera`
    fn evaluate(&self, bounds: &Aabb, camera: &Camera) -> usize;
}

/// Index of the first threshold above `metric`, or the threshold count
///
/// Non-decreasing in `metric` for an ascending list.
pub fn lookup(thresholds: &[f32], metric: f32) -> usize {
    thresholds.iter().position(|&t| metric < t).unwrap_or(thresholds.len())
}

/// Clamp `level` to the highest of `available` levels, `None` if there are none
pub fn clamp_lod(level: usize, available: usize) -> Option<usize> {
    available.checked_sub(1).map(|highest| level.min(highest))
}

fn sorted(mut thresholds: Vec<f32>) -> Vec<f32> {
    thresholds.sort_by(f32::total_cmp);
    thresholds
}

/// Selects coarser levels as the eye moves away from the bounds' center
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceLodEvaluator {
    thresholds: Vec<f32>,
}

impl DistanceLodEvaluator {
    /// Evaluator over the given distances; they are sorted ascending
    pub fn new(thresholds: Vec<f32>) -> Self {
        Self {
            thresholds: sorted(thresholds),
        }
    }

    /// Distance thresholds, ascending
    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }
}

impl LodEvaluator for DistanceLodEvaluator {
    fn evaluate(&self, bounds: &Aabb, camera: &Camera) -> usize {
        if bounds.is_null() {
            return 0;
        }
        lookup(&self.thresholds, camera.distance_to(bounds.center()))
    }
}

/// Selects finer levels as the bounds cover more of the viewport
///
/// Thresholds are given as pixel areas. The metric is inverse coverage,
/// `1 / pixels`, which grows as the bounds shrink on screen, so the usual
/// ascending lookup applies to the reciprocal thresholds. Coverage above
/// every threshold selects level 0; coverage below every threshold (or none
/// at all) selects the threshold count.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelLodEvaluator {
    thresholds: Vec<f32>,
    inverse: Vec<f32>,
}

impl PixelLodEvaluator {
    /// Evaluator over the given pixel areas; they are sorted ascending
    pub fn new(thresholds: Vec<f32>) -> Self {
        let inverse = sorted(thresholds.iter().map(|t| t.recip()).collect());
        Self {
            thresholds: sorted(thresholds),
            inverse,
        }
    }

    /// Inverse pixel coverage of `bounds`, infinite when nothing is visible
    pub fn metric(bounds: &Aabb, camera: &Camera) -> f32 {
        Self::pixel_coverage(bounds, camera).recip()
    }

    /// Pixel thresholds, ascending
    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    /// Approximate window area covered by `bounds`
    ///
    /// The projected corners' 2D bounding rectangle, clipped to the viewport.
    /// Bounds reaching behind the eye cover the whole viewport.
    pub fn pixel_coverage(bounds: &Aabb, camera: &Camera) -> f32 {
        let viewport = camera.viewport();
        if bounds.is_null() || viewport.is_empty() {
            return 0.0;
        }
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for corner in bounds.corners() {
            let Some(window) = camera.project_to_window(corner) else {
                return viewport.area() as f32;
            };
            min_x = min_x.min(window.x);
            min_y = min_y.min(window.y);
            max_x = max_x.max(window.x);
            max_y = max_y.max(window.y);
        }
        let left = min_x.max(viewport.x as f32);
        let bottom = min_y.max(viewport.y as f32);
        let right = max_x.min((viewport.x + viewport.width) as f32);
        let top = max_y.min((viewport.y + viewport.height) as f32);
        (right - left).max(0.0) * (top - bottom).max(0.0)
    }
}

impl LodEvaluator for PixelLodEvaluator {
    fn evaluate(&self, bounds: &Aabb, camera: &Camera) -> usize {
        lookup(&self.inverse, Self::metric(bounds, camera))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::api::Rect;
    use approx::assert_relative_eq;

    fn camera_at(z: f32) -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, z), 60.0, Rect::from_size(800, 600), 0.1, 1000.0)
    }

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_lookup_boundaries() {
        let t = [10.0, 20.0, 40.0];
        assert_eq!(lookup(&t, 0.0), 0);
        assert_eq!(lookup(&t, 9.99), 0);
        assert_eq!(lookup(&t, 10.0), 1);
        assert_eq!(lookup(&t, 39.0), 2);
        assert_eq!(lookup(&t, 400.0), 3);
        assert_eq!(lookup(&[], 5.0), 0);
    }

    #[test]
    fn test_lookup_is_monotonic() {
        let t = [1.0, 2.5, 2.5, 7.0, 100.0];
        let mut last = 0;
        for i in 0..2000 {
            let level = lookup(&t, i as f32 * 0.1);
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn test_clamp_lod() {
        assert_eq!(clamp_lod(0, 3), Some(0));
        assert_eq!(clamp_lod(5, 3), Some(2));
        assert_eq!(clamp_lod(1, 0), None);
    }

    #[test]
    fn test_distance_evaluator() {
        let lod = DistanceLodEvaluator::new(vec![50.0, 10.0]);
        assert_eq!(lod.thresholds(), &[10.0, 50.0]);
        assert_eq!(lod.evaluate(&unit_box(), &camera_at(5.0)), 0);
        assert_eq!(lod.evaluate(&unit_box(), &camera_at(20.0)), 1);
        assert_eq!(lod.evaluate(&unit_box(), &camera_at(80.0)), 2);
    }

    #[test]
    fn test_pixel_coverage_shrinks_with_distance() {
        let near = PixelLodEvaluator::pixel_coverage(&unit_box(), &camera_at(3.0));
        let far = PixelLodEvaluator::pixel_coverage(&unit_box(), &camera_at(30.0));
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn test_pixel_coverage_behind_eye_is_full_viewport() {
        let coverage = PixelLodEvaluator::pixel_coverage(&unit_box(), &camera_at(0.2));
        assert_relative_eq!(coverage, 800.0 * 600.0);
    }

    #[test]
    fn test_pixel_evaluator_prefers_detail_when_large() {
        let lod = PixelLodEvaluator::new(vec![100.0, 10_000.0]);
        assert_eq!(lod.evaluate(&unit_box(), &camera_at(0.2)), 0);
        assert_eq!(lod.evaluate(&unit_box(), &camera_at(500.0)), 2);
        let mut last = 0;
        for z in [2.0, 5.0, 20.0, 80.0, 300.0, 900.0] {
            let level = lod.evaluate(&unit_box(), &camera_at(z));
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn test_pixel_evaluator_is_monotonic_in_inverse_coverage() {
        let lod = PixelLodEvaluator::new(vec![500.0, 50.0, 5_000.0]);
        let mut samples: Vec<(f32, usize)> = [0.2, 1.0, 3.0, 10.0, 40.0, 150.0, 600.0, 2000.0]
            .into_iter()
            .map(|z| {
                let camera = camera_at(z);
                (PixelLodEvaluator::metric(&unit_box(), &camera), lod.evaluate(&unit_box(), &camera))
            })
            .collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert!(samples.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(samples.first().map(|s| s.1), Some(0));
        assert_eq!(samples.last().map(|s| s.1), Some(3));
    }
}
