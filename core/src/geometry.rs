//! Rigid transform helpers.
//!
//! Transforms are 4x4 homogeneous matrices (`Matrix4<f32>`): the upper-left
//! 3x3 block is the rotation and the last column holds the translation.
//! Composition is matrix multiplication, so `b * a` applies `a` first.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

pub type Transform = Matrix4<f32>;

pub fn compose_rigid(rotation: &Matrix3<f32>, translation: &Vector3<f32>) -> Transform {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

pub fn rotation_part(transform: &Transform) -> Matrix3<f32> {
    transform.fixed_view::<3, 3>(0, 0).into_owned()
}

pub fn translation_part(transform: &Transform) -> Vector3<f32> {
    transform.fixed_view::<3, 1>(0, 3).into_owned()
}

pub fn invert_rigid(transform: &Transform) -> Transform {
    let r_inv = rotation_part(transform).transpose();
    let t_inv = -r_inv * translation_part(transform);
    compose_rigid(&r_inv, &t_inv)
}

/// Rotation about `axis` by `angle` radians followed by `translation`.
pub fn rigid_from_axis_angle(axis: &Vector3<f32>, angle: f32, translation: &Vector3<f32>) -> Transform {
    let rotation = nalgebra::Rotation3::from_axis_angle(&nalgebra::Unit::new_normalize(*axis), angle);
    compose_rigid(rotation.matrix(), translation)
}

/// Least-squares rigid transform mapping `source[i]` onto `target[i]`
/// (SVD of the cross-covariance, reflection corrected).
///
/// Returns `None` for fewer than 3 pairs, mismatched lengths, or a failed
/// decomposition.
pub fn estimate_rigid_transform(source: &[Point3<f32>], target: &[Point3<f32>]) -> Option<Transform> {
    if source.len() != target.len() || source.len() < 3 {
        return None;
    }

    let n = source.len() as f64;
    let mut source_centroid = Vector3::<f64>::zeros();
    let mut target_centroid = Vector3::<f64>::zeros();
    for (s, t) in source.iter().zip(target) {
        source_centroid += to_f64(s);
        target_centroid += to_f64(t);
    }
    source_centroid /= n;
    target_centroid /= n;

    let mut covariance = Matrix3::<f64>::zeros();
    for (s, t) in source.iter().zip(target) {
        let src = to_f64(s) - source_centroid;
        let tgt = to_f64(t) - target_centroid;
        covariance += tgt * src.transpose();
    }

    let svd = covariance.svd(true, true);
    let u = svd.u?;
    let vt = svd.v_t?;

    let mut rotation = u * vt;
    if rotation.determinant() < 0.0 {
        let mut u_corrected = u;
        u_corrected.set_column(2, &(u.column(2) * -1.0));
        rotation = u_corrected * vt;
    }

    let translation = target_centroid - rotation * source_centroid;
    if !rotation.iter().chain(translation.iter()).all(|v| v.is_finite()) {
        return None;
    }

    Some(compose_rigid(&rotation.cast::<f32>(), &translation.cast::<f32>()))
}

/// Angle in radians of the rotation block.
pub fn rotation_angle(rotation: &Matrix3<f32>) -> f32 {
    let cos = ((rotation.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    cos.acos()
}

/// Angle in degrees of the relative rotation between two transforms.
pub fn rotation_error_deg(a: &Transform, b: &Transform) -> f32 {
    let relative = rotation_part(a).transpose() * rotation_part(b);
    rotation_angle(&relative).to_degrees()
}

pub fn translation_error(a: &Transform, b: &Transform) -> f32 {
    (translation_part(a) - translation_part(b)).norm()
}

/// Render a transform as a rotation block and translation vector.
#[rustfmt::skip]
pub fn format_transform(transform: &Transform) -> String {
    let m = transform;
    format!(
        "            | {:6.3} {:6.3} {:6.3} |\n        R = | {:6.3} {:6.3} {:6.3} |\n            | {:6.3} {:6.3} {:6.3} |\n\n        t = < {:.3}, {:.3}, {:.3} >",
        m[(0, 0)], m[(0, 1)], m[(0, 2)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)],
        m[(0, 3)], m[(1, 3)], m[(2, 3)],
    )
}

fn to_f64(p: &Point3<f32>) -> Vector3<f64> {
    Vector3::new(p.x as f64, p.y as f64, p.z as f64)
}
