use cv_core::{compose_rigid, rotation_error_deg, translation_error, PointCloud, Transform};
use cv_features::{find_correspondences, BoardEstimator, ReferenceFrame, ShotEstimator};
use cv_point_cloud::with_estimated_normals;
use cv_registration::*;
use nalgebra::{Matrix4, Point3, Rotation3, Vector3};

struct Described {
    cloud: PointCloud,
    frames: Vec<ReferenceFrame>,
}

fn saddle_patch() -> PointCloud {
    let mut points = Vec::new();
    for i in -15..=15 {
        for j in -15..=15 {
            let x = i as f32 * 0.0025;
            let y = j as f32 * 0.0025;
            let z = 1.0 - 12.0 * x * x + 6.0 * y * y + 5.0 * x * y + 90.0 * x * x * y + 60.0 * y * y * y;
            points.push(Point3::new(x, y, z));
        }
    }
    PointCloud::new(points)
}

fn describe(cloud: &PointCloud) -> (Described, Vec<cv_features::ShotDescriptor>) {
    let with_normals = with_estimated_normals(cloud, 10, Some(&Point3::origin()));
    let frames = BoardEstimator::new(0.015).compute(&with_normals).unwrap();
    let descriptors = ShotEstimator::new(0.02).compute(&with_normals, &with_normals).unwrap();
    (
        Described {
            cloud: with_normals,
            frames,
        },
        descriptors,
    )
}

fn truth() -> Transform {
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.5);
    compose_rigid(rotation.matrix(), &Vector3::new(0.0, 0.0, 0.25))
}

fn strongest(hypotheses: &[PoseHypothesis]) -> &PoseHypothesis {
    hypotheses
        .iter()
        .max_by_key(|h| h.correspondences.len())
        .expect("at least one hypothesis")
}

fn check_grouper(grouper: &dyn CorrespondenceGrouping) {
    let object = saddle_patch();
    let scene = object.transformed(&truth());
    let (object, object_desc) = describe(&object);
    let (scene, scene_desc) = describe(&scene);
    let corrs = find_correspondences(&object_desc, &scene_desc, 0.25);

    let input = GroupingInput {
        object: &object.cloud,
        scene: &scene.cloud,
        object_frames: &object.frames,
        scene_frames: &scene.frames,
        correspondences: &corrs,
    };
    let hypotheses = grouper.recognize(&input).unwrap();
    assert!(!hypotheses.is_empty(), "{} found nothing", grouper.name());

    let best = strongest(&hypotheses);
    assert!(best.correspondences.len() >= 3);
    assert!(rotation_error_deg(&best.transform, &truth()) < 5.0);
    assert!(translation_error(&best.transform, &truth()) < 0.01);
}

#[test]
fn test_hough_recovers_rigid_copy() {
    check_grouper(&Hough3DGrouping::default());
}

#[test]
fn test_geometric_consistency_recovers_rigid_copy() {
    check_grouper(&GeometricConsistencyGrouping::default());
}

#[test]
fn test_hypotheses_come_from_groups() {
    let object = saddle_patch();
    let scene = object.transformed(&truth());
    let (object, object_desc) = describe(&object);
    let (scene, scene_desc) = describe(&scene);
    let corrs = find_correspondences(&object_desc, &scene_desc, 0.25);
    let input = GroupingInput {
        object: &object.cloud,
        scene: &scene.cloud,
        object_frames: &object.frames,
        scene_frames: &scene.frames,
        correspondences: &corrs,
    };

    let grouper = Hough3DGrouping::default();
    let groups = grouper.cluster_correspondences(&input).unwrap();
    let hypotheses = grouper.recognize(&input).unwrap();
    assert!(hypotheses.len() <= groups.len());
    for h in &hypotheses {
        assert!(groups.iter().any(|g| h.correspondences.iter().all(|c| g.contains(c))));
    }
}

#[test]
fn test_icp_polishes_coarse_pose() {
    let object = saddle_patch();
    let scene = object.transformed(&truth());
    // Coarse pose a little off the true one
    let nudge = compose_rigid(
        Rotation3::from_axis_angle(&Vector3::x_axis(), 0.01).matrix(),
        &Vector3::new(0.001, 0.0, -0.001),
    );
    let coarse = nudge * truth();
    let moved = object.transformed(&coarse);

    let refinement = registration_icp_point_to_point(&moved, &scene, &Matrix4::identity(), &ICPCriteria::default())
        .unwrap();
    let combined = refinement.transformation * coarse;
    assert!(rotation_error_deg(&combined, &truth()) < rotation_error_deg(&coarse, &truth()));
    assert!(translation_error(&combined, &truth()) < 1e-3);
}
