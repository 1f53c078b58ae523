use cv_core::{is_finite_point, Error, PointCloud, Result};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

/// Coordinate a pass-through filter tests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAxis {
    X,
    Y,
    Z,
}

impl FilterAxis {
    fn value(&self, p: &Point3<f32>) -> f32 {
        match self {
            FilterAxis::X => p.x,
            FilterAxis::Y => p.y,
            FilterAxis::Z => p.z,
        }
    }
}

/// Keep finite points whose `axis` coordinate lies in `[min, max]`.
///
/// The output is always unorganized and dense; NaN measurements from an
/// organized sensor frame are dropped here. Relative order is preserved.
pub fn pass_through(cloud: &PointCloud, axis: FilterAxis, min: f32, max: f32) -> PointCloud {
    let kept: Vec<usize> = cloud
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            if !is_finite_point(p) {
                return false;
            }
            let v = axis.value(p);
            v >= min && v <= max
        })
        .map(|(i, _)| i)
        .collect();
    cloud.select(&kept)
}

/// Downsample a point cloud with a voxel grid.
/// Returns a new point cloud with one point per occupied voxel (the centroid
/// of the finite points that fell into it). Normals, if present, are
/// averaged the same way.
pub fn voxel_down_sample(cloud: &PointCloud, leaf_size: f32) -> Result<PointCloud> {
    if !(leaf_size.is_finite() && leaf_size > 0.0) {
        return Err(Error::InvalidInput(format!(
            "Voxel leaf size must be positive, got {leaf_size}"
        )));
    }

    // 1. Compute indices
    let mut indices: Vec<(i64, i64, i64, usize)> = cloud
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| is_finite_point(p))
        .map(|(i, p)| {
            (
                (p.x / leaf_size).floor() as i64,
                (p.y / leaf_size).floor() as i64,
                (p.z / leaf_size).floor() as i64,
                i,
            )
        })
        .collect();

    if indices.is_empty() {
        return Ok(PointCloud::default());
    }

    // 2. Sort by voxel index
    // Parallel sort if large enough, otherwise sequential
    if indices.len() > 10000 {
        indices.par_sort_unstable();
    } else {
        indices.sort_unstable();
    }

    // 3. Aggregate
    let source_normals = cloud.normals.as_ref();
    let mut new_points = Vec::new();
    let mut new_normals = source_normals.map(|_| Vec::new());

    let mut start = 0;
    while start < indices.len() {
        let voxel = (indices[start].0, indices[start].1, indices[start].2);
        let mut end = start;
        let mut sum_p = Vector3::<f64>::zeros();
        let mut sum_n = Vector3::<f32>::zeros();
        while end < indices.len() && (indices[end].0, indices[end].1, indices[end].2) == voxel {
            let idx = indices[end].3;
            let p = cloud.points[idx];
            sum_p += Vector3::new(p.x as f64, p.y as f64, p.z as f64);
            if let Some(ns) = source_normals {
                if ns[idx].iter().all(|v| v.is_finite()) {
                    sum_n += ns[idx];
                }
            }
            end += 1;
        }

        let c = sum_p / (end - start) as f64;
        new_points.push(Point3::new(c.x as f32, c.y as f32, c.z as f32));
        if let Some(nn) = &mut new_normals {
            let n = if sum_n.norm_squared() > 1e-12 {
                sum_n.normalize()
            } else {
                Vector3::repeat(f32::NAN)
            };
            nn.push(n);
        }
        start = end;
    }

    let mut out = PointCloud::new(new_points);
    out.normals = new_normals;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                points.push(Point3::new(i as f32 * 0.01, j as f32 * 0.01, 0.001));
            }
        }
        PointCloud::new(points)
    }

    #[test]
    fn test_pass_through_range_and_nan() {
        let cloud = PointCloud::new(vec![
            Point3::new(0.0, 0.0, -0.5),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f32::NAN, f32::NAN, f32::NAN),
            Point3::new(0.0, 0.0, 2.5),
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 5.1),
        ]);
        let out = pass_through(&cloud, FilterAxis::Z, 0.0, 5.0);
        let zs: Vec<f32> = out.points.iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![0.0, 2.5, 5.0]);
        assert!(out.is_dense);
        assert_eq!(out.height, 1);
    }

    #[test]
    fn test_voxel_down_sample() {
        let pc = grid();

        // 0.00..0.09 falls inside one 0.2 voxel
        let down = voxel_down_sample(&pc, 0.2).unwrap();
        assert_eq!(down.len(), 1);
        assert!((down.points[0].x - 0.045).abs() < 1e-5);

        // 0.00..0.04 -> bin 0, 0.05..0.09 -> bin 1, in both x and y
        let down = voxel_down_sample(&pc, 0.05).unwrap();
        assert_eq!(down.len(), 4);
    }

    #[test]
    fn test_voxel_down_sample_is_stable_when_repeated() {
        let once = voxel_down_sample(&grid(), 0.03).unwrap();
        let twice = voxel_down_sample(&once, 0.03).unwrap();
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn test_voxel_down_sample_rejects_bad_leaf() {
        assert!(voxel_down_sample(&grid(), 0.0).is_err());
        assert!(voxel_down_sample(&grid(), f32::NAN).is_err());
    }

    #[test]
    fn test_voxel_down_sample_empty_and_nan() {
        let empty = voxel_down_sample(&PointCloud::default(), 0.01).unwrap();
        assert!(empty.is_empty());

        let cloud = PointCloud::new(vec![Point3::new(f32::NAN, 0.0, 0.0), Point3::new(0.1, 0.1, 0.1)]);
        let down = voxel_down_sample(&cloud, 0.01).unwrap();
        assert_eq!(down.len(), 1);
    }
}
