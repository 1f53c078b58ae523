//! SHOT (Signature of Histograms of OrienTations) descriptors.
//!
//! Each descriptor is built in a local frame computed from a distance
//! weighted covariance of the support sphere. The sphere is split into 32
//! volumes (8 azimuth x 2 elevation x 2 radial) and each volume holds an
//! 11-bin histogram of the cosine between a neighbour's normal and the frame
//! z axis. Votes are spread quadrilinearly over adjacent bins and volumes and
//! the full 352-vector is L2 normalised.

use crate::reference_frame::ReferenceFrame;
use crate::{FeatureError, Result};
use cv_core::{is_finite_point, PointCloud};
use cv_point_cloud::SpatialIndex;
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

const AZIMUTH_DIVISIONS: usize = 8;
const ELEVATION_DIVISIONS: usize = 2;
const RADIAL_DIVISIONS: usize = 2;
const COSINE_BINS: usize = 11;

pub const SHOT_DESCRIPTOR_LEN: usize = AZIMUTH_DIVISIONS * ELEVATION_DIVISIONS * RADIAL_DIVISIONS * COSINE_BINS;

#[derive(Debug, Clone)]
pub struct ShotDescriptor {
    pub histogram: Vec<f32>,
    pub frame: ReferenceFrame,
}

impl ShotDescriptor {
    fn invalid() -> Self {
        Self {
            histogram: vec![f32::NAN; SHOT_DESCRIPTOR_LEN],
            frame: ReferenceFrame::nan(),
        }
    }

    /// `false` for descriptors that could not be computed (NaN entries).
    pub fn is_valid(&self) -> bool {
        self.histogram.first().map_or(false, |v| v.is_finite())
    }

    pub fn squared_distance(&self, other: &ShotDescriptor) -> f32 {
        self.histogram
            .iter()
            .zip(&other.histogram)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct ShotEstimator {
    radius: f32,
    min_neighbors: usize,
}

impl Default for ShotEstimator {
    fn default() -> Self {
        Self {
            radius: 0.02,
            min_neighbors: 5,
        }
    }
}

impl ShotEstimator {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    /// Support spheres with fewer points than this yield an invalid descriptor.
    pub fn with_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// One descriptor per point of `keypoints`, gathering support from
    /// `surface`, which must carry normals.
    pub fn compute(&self, keypoints: &PointCloud, surface: &PointCloud) -> Result<Vec<ShotDescriptor>> {
        if surface.normals.is_none() {
            return Err(FeatureError::DescriptorError(
                "SHOT needs a search surface with normals".to_string(),
            ));
        }
        let index = SpatialIndex::new(&surface.points);
        Ok(keypoints
            .points
            .par_iter()
            .map(|p| self.describe(p, surface, &index))
            .collect())
    }

    fn describe(&self, p: &Point3<f32>, surface: &PointCloud, index: &SpatialIndex) -> ShotDescriptor {
        if !is_finite_point(p) {
            return ShotDescriptor::invalid();
        }
        let neighbors = index.within_radius(p, self.radius);
        if neighbors.len() < self.min_neighbors.max(3) {
            return ShotDescriptor::invalid();
        }
        let Some(frame) = self.local_frame(p, &neighbors, surface) else {
            return ShotDescriptor::invalid();
        };

        let to_local = frame.to_local();
        let mut histogram = vec![0.0f32; SHOT_DESCRIPTOR_LEN];
        for &(j, d2) in &neighbors {
            let d = d2.sqrt();
            if d < 1e-9 {
                continue;
            }
            let Some(normal) = surface.normal(j) else {
                continue;
            };
            let local = to_local * (surface.points[j] - p);
            let cos = normal.dot(&frame.z_axis).clamp(-1.0, 1.0);

            let cos_pos = (1.0 + cos) * 0.5 * COSINE_BINS as f32 - 0.5;
            let radial_pos = d / self.radius * RADIAL_DIVISIONS as f32 - 0.5;
            let elevation = (local.z / d).clamp(-1.0, 1.0).asin();
            let elevation_pos = elevation / FRAC_PI_2 + 0.5;
            let azimuth_pos = (local.y.atan2(local.x) + PI) / (TAU / AZIMUTH_DIVISIONS as f32) - 0.5;

            let bins = split(cos_pos, COSINE_BINS, false);
            let shells = split(radial_pos, RADIAL_DIVISIONS, false);
            let layers = split(elevation_pos, ELEVATION_DIVISIONS, false);
            let sectors = split(azimuth_pos, AZIMUTH_DIVISIONS, true);

            for &(a, wa) in &sectors {
                for &(e, we) in &layers {
                    for &(r, wr) in &shells {
                        let volume = (a * ELEVATION_DIVISIONS + e) * RADIAL_DIVISIONS + r;
                        for &(b, wb) in &bins {
                            let w = wa * we * wr * wb;
                            if w > 0.0 {
                                histogram[volume * COSINE_BINS + b] += w;
                            }
                        }
                    }
                }
            }
        }

        let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
        if !norm.is_finite() || norm < 1e-12 {
            return ShotDescriptor::invalid();
        }
        histogram.iter_mut().for_each(|v| *v /= norm);

        ShotDescriptor { histogram, frame }
    }

    /// Eigenvectors of the distance weighted scatter around `p`, each axis
    /// pointed toward the majority of the support.
    fn local_frame(&self, p: &Point3<f32>, neighbors: &[(usize, f32)], surface: &PointCloud) -> Option<ReferenceFrame> {
        let origin = Vector3::new(p.x as f64, p.y as f64, p.z as f64);
        let offsets: Vec<Vector3<f64>> = neighbors
            .iter()
            .map(|&(i, _)| {
                let q = surface.points[i];
                Vector3::new(q.x as f64, q.y as f64, q.z as f64) - origin
            })
            .collect();

        let mut cov = Matrix3::<f64>::zeros();
        let mut total = 0.0f64;
        for (offset, &(_, d2)) in offsets.iter().zip(neighbors) {
            let w = (self.radius - d2.sqrt()) as f64;
            cov += offset * offset.transpose() * w;
            total += w;
        }
        if total <= 0.0 {
            return None;
        }
        cov /= total;

        let eigen = SymmetricEigen::new(cov);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        if eigen.eigenvalues[order[2]].is_nan() || eigen.eigenvalues[order[2]] <= 0.0 {
            return None;
        }

        let mut x = eigen.eigenvectors.column(order[2]).into_owned();
        let mut z = eigen.eigenvectors.column(order[0]).into_owned();
        if majority_negative(&offsets, &x) {
            x = -x;
        }
        if majority_negative(&offsets, &z) {
            z = -z;
        }

        let frame = ReferenceFrame::new(x.cast::<f32>().normalize(), z.cast::<f32>().normalize());
        frame.is_finite().then_some(frame)
    }
}

fn majority_negative(offsets: &[Vector3<f64>], axis: &Vector3<f64>) -> bool {
    let positive = offsets.iter().filter(|o| o.dot(axis) >= 0.0).count();
    positive * 2 < offsets.len()
}

/// Linear split of a continuous bin position over its two nearest bins.
fn split(pos: f32, bins: usize, circular: bool) -> [(usize, f32); 2] {
    let lo = pos.floor();
    let frac = pos - lo;
    let lo = lo as isize;
    let n = bins as isize;
    if circular {
        return [
            (lo.rem_euclid(n) as usize, 1.0 - frac),
            ((lo + 1).rem_euclid(n) as usize, frac),
        ];
    }
    if lo < 0 {
        [(0, 1.0), (0, 0.0)]
    } else if lo >= n - 1 {
        [(bins - 1, 1.0), (bins - 1, 0.0)]
    } else {
        [(lo as usize, 1.0 - frac), (lo as usize + 1, frac)]
    }
}
