use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// A point cloud buffer.
///
/// Points are stored in order; `width * height == len()` always holds. A
/// `height` of 1 marks an unorganized list. Invalid (missing) measurements are
/// stored as NaN coordinates, and `is_dense` is only `true` when every point
/// is finite. Normals, when present, are attached 1:1 by index and use NaN
/// for points whose neighbourhood was degenerate.
#[derive(Debug, Clone)]
pub struct PointCloud {
    pub points: Vec<Point3<f32>>,
    pub normals: Option<Vec<Vector3<f32>>>,
    pub width: usize,
    pub height: usize,
    pub is_dense: bool,
}

impl Default for PointCloud {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            normals: None,
            width: 0,
            height: 1,
            is_dense: true,
        }
    }
}

impl PointCloud {
    /// Create an unorganized cloud (`height == 1`).
    pub fn new(points: Vec<Point3<f32>>) -> Self {
        let is_dense = points.iter().all(is_finite_point);
        Self {
            width: points.len(),
            height: 1,
            is_dense,
            points,
            normals: None,
        }
    }

    /// Create an organized cloud laid out as `height` rows of `width` points.
    pub fn organized(points: Vec<Point3<f32>>, width: usize, height: usize) -> crate::Result<Self> {
        if width * height != points.len() {
            return Err(crate::Error::InvalidInput(format!(
                "Organized size {}x{} does not match point count {}",
                width,
                height,
                points.len()
            )));
        }
        let is_dense = points.iter().all(is_finite_point);
        Ok(Self {
            points,
            normals: None,
            width,
            height,
            is_dense,
        })
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<f32>>) -> crate::Result<Self> {
        if normals.len() == self.points.len() {
            self.normals = Some(normals);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Normal count {} does not match point count {}",
                normals.len(),
                self.points.len()
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_organized(&self) -> bool {
        self.height > 1
    }

    pub fn is_finite(&self, index: usize) -> bool {
        self.points.get(index).map(is_finite_point).unwrap_or(false)
    }

    /// Normal at `index`, `None` when the cloud carries no normals or the
    /// normal there is NaN.
    pub fn normal(&self, index: usize) -> Option<Vector3<f32>> {
        let n = *self.normals.as_ref()?.get(index)?;
        if n.iter().all(|v| v.is_finite()) {
            Some(n)
        } else {
            None
        }
    }

    /// Copy out the points at `indices` (in the given order) into a new
    /// unorganized cloud. Normals are carried along.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        let points: Vec<Point3<f32>> = indices.iter().map(|&i| self.points[i]).collect();
        let normals = self
            .normals
            .as_ref()
            .map(|ns| indices.iter().map(|&i| ns[i]).collect());
        let mut cloud = PointCloud::new(points);
        cloud.normals = normals;
        cloud
    }

    /// Copy out every point whose index is NOT in `indices`, keeping order.
    pub fn select_inverse(&self, indices: &[usize]) -> PointCloud {
        let mut removed = vec![false; self.len()];
        for &i in indices {
            if i < removed.len() {
                removed[i] = true;
            }
        }
        let kept: Vec<usize> = (0..self.len()).filter(|&i| !removed[i]).collect();
        self.select(&kept)
    }

    /// Drop NaN / infinite points. Returns the dense cloud and the source
    /// index of every kept point.
    pub fn remove_non_finite(&self) -> (PointCloud, Vec<usize>) {
        let kept: Vec<usize> = (0..self.len()).filter(|&i| self.is_finite(i)).collect();
        (self.select(&kept), kept)
    }

    /// Apply a rigid transform to every point (and normal). The input is left
    /// untouched.
    pub fn transformed(&self, transform: &Matrix4<f32>) -> PointCloud {
        let rotation: Matrix3<f32> = transform.fixed_view::<3, 3>(0, 0).into_owned();
        let points = self
            .points
            .iter()
            .map(|p| transform.transform_point(p))
            .collect();
        let normals = self
            .normals
            .as_ref()
            .map(|ns| ns.iter().map(|n| rotation * n).collect());
        PointCloud {
            points,
            normals,
            width: self.width,
            height: self.height,
            is_dense: self.is_dense,
        }
    }

    /// Mean of the finite points.
    pub fn centroid(&self) -> Option<Point3<f32>> {
        let mut sum = Vector3::<f64>::zeros();
        let mut count = 0usize;
        for p in self.points.iter().filter(|p| is_finite_point(p)) {
            sum += Vector3::new(p.x as f64, p.y as f64, p.z as f64);
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let c = sum / count as f64;
        Some(Point3::new(c.x as f32, c.y as f32, c.z as f32))
    }
}

pub fn is_finite_point(p: &Point3<f32>) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracks_density() {
        let dense = PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        assert!(dense.is_dense);
        assert_eq!(dense.width, 2);
        assert_eq!(dense.height, 1);

        let sparse = PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f32::NAN, 0.0, 0.0),
        ]);
        assert!(!sparse.is_dense);

        let (clean, kept) = sparse.remove_non_finite();
        assert_eq!(clean.len(), 1);
        assert_eq!(kept, vec![0]);
        assert!(clean.is_dense);
    }

    #[test]
    fn test_organized_size_check() {
        let points = vec![Point3::origin(); 6];
        assert!(PointCloud::organized(points.clone(), 3, 2).is_ok());
        let err = PointCloud::organized(points, 4, 2).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_select_inverse_keeps_order() {
        let points: Vec<_> = (0..5).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect();
        let cloud = PointCloud::new(points);
        let rest = cloud.select_inverse(&[1, 3]);
        let xs: Vec<f32> = rest.points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_transformed_rotates_normals() {
        let cloud = PointCloud::new(vec![Point3::new(1.0, 0.0, 0.0)])
            .with_normals(vec![Vector3::new(1.0, 0.0, 0.0)])
            .unwrap();
        let mut t = Matrix4::identity();
        // 90 degrees about z, then shift by +1 in z
        t[(0, 0)] = 0.0;
        t[(0, 1)] = -1.0;
        t[(1, 0)] = 1.0;
        t[(1, 1)] = 0.0;
        t[(2, 3)] = 1.0;

        let moved = cloud.transformed(&t);
        assert!((moved.points[0] - Point3::new(0.0, 1.0, 1.0)).norm() < 1e-6);
        let n = moved.normal(0).unwrap();
        assert!((n - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-6);
        // source untouched
        assert_eq!(cloud.points[0], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_nan_normal_is_none() {
        let cloud = PointCloud::new(vec![Point3::origin()])
            .with_normals(vec![Vector3::new(f32::NAN, f32::NAN, f32::NAN)])
            .unwrap();
        assert!(cloud.normal(0).is_none());
    }
}
