use cv_core::{
    estimate_rigid_transform, is_finite_point, rotation_angle, rotation_part, translation_part, Error, PointCloud,
    Result, Termination,
};
use cv_point_cloud::SpatialIndex;
use nalgebra::{Matrix4, Point3};
use rayon::prelude::*;

/// Stopping rules for ICP.
///
/// The loop stops at `max_iterations`, or earlier (converged) when the last
/// incremental step moved less than `transformation_epsilon` (squared
/// translation and squared rotation angle), when the mean squared error
/// changed by less than `fitness_epsilon`, or when it stopped decreasing.
#[derive(Debug, Clone)]
pub struct ICPCriteria {
    pub max_iterations: usize,
    /// Pairs farther apart than this are ignored.
    pub max_correspondence_distance: f32,
    pub transformation_epsilon: f64,
    pub fitness_epsilon: f64,
}

impl Default for ICPCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            max_correspondence_distance: f32::INFINITY,
            transformation_epsilon: 1e-10,
            fitness_epsilon: 1e-12,
        }
    }
}

/// ICP (Iterative Closest Point) registration result
#[derive(Debug, Clone)]
pub struct ICPResult {
    /// Transform taking the source onto the target.
    pub transformation: Matrix4<f32>,
    /// Mean squared distance from each moved source point to its nearest
    /// target point, over pairs within the correspondence distance.
    pub fitness_score: f32,
    pub num_iterations: usize,
    pub termination: Termination,
}

impl ICPResult {
    pub fn has_converged(&self) -> bool {
        self.termination.converged()
    }
}

/// Point-to-point ICP registration.
///
/// Each iteration pairs every moved source point with its nearest target
/// point, solves the least-squares rigid step for those pairs (SVD) and
/// composes it onto the running transform. Running out of iterations is not
/// an error: the last transform is returned tagged `MaxIterations`.
pub fn registration_icp_point_to_point(
    source: &PointCloud,
    target: &PointCloud,
    init_transformation: &Matrix4<f32>,
    criteria: &ICPCriteria,
) -> Result<ICPResult> {
    let source_points: Vec<Point3<f32>> = source.points.iter().copied().filter(is_finite_point).collect();
    if source_points.len() < 3 {
        return Err(Error::EmptyCloud(format!(
            "ICP source needs at least 3 finite points, got {}",
            source_points.len()
        )));
    }
    let target_nn = SpatialIndex::new(&target.points);
    if target_nn.len() < 3 {
        return Err(Error::EmptyCloud(format!(
            "ICP target needs at least 3 finite points, got {}",
            target_nn.len()
        )));
    }

    let mut transformation = *init_transformation;
    // The transform `previous_mse` was measured at
    let mut previous_transformation = transformation;
    let mut previous_mse = f64::INFINITY;
    let mut termination = Termination::MaxIterations;
    let mut num_iterations = 0;

    for iter in 0..criteria.max_iterations {
        let (moved, matched, mse) = correspondences(&source_points, target, &target_nn, &transformation, criteria);
        if moved.len() < 3 {
            return Err(Error::Numerical(format!(
                "ICP found only {} correspondences within {}",
                moved.len(),
                criteria.max_correspondence_distance
            )));
        }

        // The last step made things worse: keep the transform before it
        if mse > previous_mse {
            transformation = previous_transformation;
            num_iterations -= 1;
            termination = Termination::Converged;
            break;
        }
        // Already aligned, or no longer improving
        if mse < criteria.fitness_epsilon || (previous_mse - mse).abs() < criteria.fitness_epsilon {
            termination = Termination::Converged;
            break;
        }

        let step = estimate_rigid_transform(&moved, &matched)
            .ok_or_else(|| Error::Numerical("ICP step has no rigid solution".to_string()))?;
        previous_transformation = transformation;
        transformation = step * transformation;
        num_iterations = iter + 1;
        previous_mse = mse;

        let translation_sq = translation_part(&step).norm_squared() as f64;
        let angle = rotation_angle(&rotation_part(&step)) as f64;
        if translation_sq < criteria.transformation_epsilon && angle * angle < criteria.transformation_epsilon {
            termination = Termination::Converged;
            break;
        }
    }

    let (_, _, fitness) = correspondences(&source_points, target, &target_nn, &transformation, criteria);
    tracing::debug!(
        iterations = num_iterations,
        fitness,
        termination = ?termination,
        "icp"
    );

    Ok(ICPResult {
        transformation,
        fitness_score: fitness as f32,
        num_iterations,
        termination,
    })
}

/// Moved source points, their nearest target points and the mean squared
/// distance over the accepted pairs.
fn correspondences(
    source: &[Point3<f32>],
    target: &PointCloud,
    target_nn: &SpatialIndex,
    transformation: &Matrix4<f32>,
    criteria: &ICPCriteria,
) -> (Vec<Point3<f32>>, Vec<Point3<f32>>, f64) {
    let max_sq = criteria.max_correspondence_distance * criteria.max_correspondence_distance;
    let pairs: Vec<(Point3<f32>, Point3<f32>, f32)> = source
        .par_iter()
        .filter_map(|p| {
            let moved = transformation.transform_point(p);
            let (idx, dist_sq) = target_nn.nearest(&moved)?;
            (dist_sq <= max_sq).then(|| (moved, target.points[idx], dist_sq))
        })
        .collect();

    if pairs.is_empty() {
        return (Vec::new(), Vec::new(), f64::INFINITY);
    }
    let mse = pairs.iter().map(|p| p.2 as f64).sum::<f64>() / pairs.len() as f64;
    let (moved, matched): (Vec<_>, Vec<_>) = pairs.into_iter().map(|(m, t, _)| (m, t)).unzip();
    (moved, matched, mse)
}
