use crate::shot::ShotDescriptor;
use rayon::prelude::*;

/// A putative match between an object point and a scene point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub object_index: usize,
    pub scene_index: usize,
    /// Squared descriptor distance.
    pub distance: f32,
}

impl Correspondence {
    pub fn new(object_index: usize, scene_index: usize, distance: f32) -> Self {
        Self {
            object_index,
            scene_index,
            distance,
        }
    }
}

/// Nearest-neighbour matcher in descriptor space.
///
/// Every valid scene descriptor is paired with its closest valid object
/// descriptor and kept when their squared distance is below the threshold.
#[derive(Debug, Clone)]
pub struct Matcher {
    max_squared_distance: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            max_squared_distance: 0.25,
        }
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_squared_distance(mut self, threshold: f32) -> Self {
        self.max_squared_distance = threshold;
        self
    }

    /// Correspondences ordered by scene index. Invalid descriptors on either
    /// side are skipped; ties go to the lowest object index.
    pub fn match_descriptors(&self, object: &[ShotDescriptor], scene: &[ShotDescriptor]) -> Vec<Correspondence> {
        let candidates: Vec<(usize, &ShotDescriptor)> =
            object.iter().enumerate().filter(|(_, d)| d.is_valid()).collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let matches: Vec<Correspondence> = scene
            .par_iter()
            .enumerate()
            .filter(|(_, d)| d.is_valid())
            .filter_map(|(scene_idx, s_desc)| {
                let mut best: Option<(usize, f32)> = None;
                for &(object_idx, o_desc) in &candidates {
                    let distance = s_desc.squared_distance(o_desc);
                    if best.map_or(true, |(_, best_dist)| distance < best_dist) {
                        best = Some((object_idx, distance));
                    }
                }
                let (object_idx, distance) = best?;
                (distance < self.max_squared_distance).then(|| Correspondence::new(object_idx, scene_idx, distance))
            })
            .collect();

        tracing::debug!(
            object = object.len(),
            scene = scene.len(),
            correspondences = matches.len(),
            "descriptor matching"
        );
        matches
    }
}

/// [`Matcher::match_descriptors`] with the given squared-distance threshold.
pub fn find_correspondences(
    object: &[ShotDescriptor],
    scene: &[ShotDescriptor],
    max_squared_distance: f32,
) -> Vec<Correspondence> {
    Matcher::new()
        .with_max_squared_distance(max_squared_distance)
        .match_descriptors(object, scene)
}
