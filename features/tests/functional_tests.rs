use cv_core::{compose_rigid, PointCloud};
use cv_features::*;
use cv_point_cloud::normals::with_estimated_normals;
use nalgebra::{Point3, Rotation3, Vector3};

fn curved_patch() -> PointCloud {
    let mut points = Vec::new();
    for i in -15..=15 {
        for j in -15..=15 {
            let x = i as f32 * 0.0025;
            let y = j as f32 * 0.0025;
            let z = 1.0 - 12.0 * x * x - 6.0 * y * y + 5.0 * x * y + 90.0 * x * x * y + 60.0 * y * y * y;
            points.push(Point3::new(x, y, z));
        }
    }
    PointCloud::new(points)
}

fn describe(cloud: &PointCloud) -> Vec<ShotDescriptor> {
    let origin = Point3::origin();
    let surface = with_estimated_normals(cloud, 10, Some(&origin));
    ShotEstimator::new(0.02).compute(&surface, &surface).unwrap()
}

#[test]
fn test_matching_recovers_rigid_copy() {
    let object = curved_patch();
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.5);
    let motion = compose_rigid(rotation.matrix(), &Vector3::new(0.0, 0.0, 0.25));
    let scene = object.transformed(&motion);

    let object_desc = describe(&object);
    let scene_desc = describe(&scene);
    let corrs = find_correspondences(&object_desc, &scene_desc, 0.25);
    assert!(!corrs.is_empty());

    // Scene order is preserved
    assert!(corrs.windows(2).all(|w| w[0].scene_index < w[1].scene_index));
    assert!(corrs.iter().all(|c| c.distance < 0.25));

    // Most matches land on or right next to the true twin
    let close = corrs
        .iter()
        .filter(|c| (object.points[c.object_index] - object.points[c.scene_index]).norm() < 0.006)
        .count();
    assert!(close * 2 >= corrs.len(), "{close} of {} matches are near their twin", corrs.len());
}

#[test]
fn test_frames_and_descriptors_cover_every_point() {
    let cloud = with_estimated_normals(&curved_patch(), 10, Some(&Point3::origin()));
    let frames = BoardEstimator::new(0.015).compute(&cloud).unwrap();
    let descriptors = ShotEstimator::new(0.02).compute(&cloud, &cloud).unwrap();
    assert_eq!(frames.len(), cloud.len());
    assert_eq!(descriptors.len(), cloud.len());
    assert!(descriptors.iter().filter(|d| d.is_valid()).count() > cloud.len() / 2);
}

#[test]
fn test_features_need_normals() {
    let bare = curved_patch();
    assert!(BoardEstimator::default().compute(&bare).is_err());
    assert!(ShotEstimator::default().compute(&bare, &bare).is_err());
}
