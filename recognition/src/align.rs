use crate::config::IcpConfig;
use cv_core::{PointCloud, Result, Transform};
use cv_registration::{registration_icp_point_to_point, ICPCriteria, ICPResult};
use nalgebra::Matrix4;

/// Coarse pose, its ICP correction and their composition.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub coarse: Transform,
    pub refinement: ICPResult,
    /// `refinement * coarse`: the coarse pose is applied first.
    pub combined: Transform,
}

impl From<&IcpConfig> for ICPCriteria {
    fn from(config: &IcpConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_correspondence_distance: config.max_correspondence_distance.unwrap_or(f32::INFINITY),
            transformation_epsilon: config.transformation_epsilon,
            fitness_epsilon: config.fitness_epsilon,
        }
    }
}

/// Refine `coarse` by aligning the coarsely placed object to the cluster.
pub fn refine_pose(object: &PointCloud, cluster: &PointCloud, coarse: &Transform, config: &IcpConfig) -> Result<Alignment> {
    let placed = object.transformed(coarse);
    let refinement = registration_icp_point_to_point(&placed, cluster, &Matrix4::identity(), &ICPCriteria::from(config))?;
    let combined = refinement.transformation * coarse;

    tracing::info!(
        iterations = refinement.num_iterations,
        fitness = refinement.fitness_score,
        converged = refinement.has_converged(),
        "icp refinement"
    );

    Ok(Alignment {
        coarse: *coarse,
        refinement,
        combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{rigid_from_axis_angle, rotation_error_deg, translation_error};
    use cv_point_cloud::synthetic::{merge, sample_box};
    use nalgebra::{Point3, Vector3};

    fn object() -> PointCloud {
        let body = sample_box(Point3::new(0.0, 0.0, 0.8), Vector3::new(0.06, 0.04, 0.08), 0.005);
        let knob = sample_box(Point3::new(0.045, 0.01, 0.79), Vector3::new(0.02, 0.02, 0.02), 0.005);
        merge(&[&body, &knob])
    }

    #[test]
    fn test_refinement_corrects_coarse_pose() {
        let object = object();
        let truth = rigid_from_axis_angle(&Vector3::z(), 0.4, &Vector3::new(0.05, 0.0, 0.3));
        let cluster = object.transformed(&truth);
        let coarse = rigid_from_axis_angle(&Vector3::new(1.0, 1.0, 0.0), 0.02, &Vector3::new(0.002, -0.002, 0.0)) * truth;

        let alignment = refine_pose(&object, &cluster, &coarse, &IcpConfig::default()).unwrap();
        assert!(rotation_error_deg(&alignment.combined, &truth) < 0.5);
        assert!(translation_error(&alignment.combined, &truth) < 1e-3);
    }

    #[test]
    fn test_combined_equals_two_step_application() {
        let object = object();
        let truth = rigid_from_axis_angle(&Vector3::z(), 0.3, &Vector3::new(0.0, 0.02, 0.1));
        let cluster = object.transformed(&truth);
        let coarse = rigid_from_axis_angle(&Vector3::x(), 0.01, &Vector3::zeros()) * truth;

        let alignment = refine_pose(&object, &cluster, &coarse, &IcpConfig::default()).unwrap();
        let two_step = object
            .transformed(&alignment.coarse)
            .transformed(&alignment.refinement.transformation);
        let one_step = object.transformed(&alignment.combined);
        for (a, b) in two_step.points.iter().zip(&one_step.points) {
            assert!((a - b).norm() < 1e-5);
        }
    }
}
