//! Deterministic surface samplers.
//!
//! Used to build object models and cluttered scenes without sensor data.
//! Every sampler places points on a regular grid of the given spacing, so a
//! rigidly moved copy of a sampled shape has exactly the same point layout.

use cv_core::PointCloud;
use nalgebra::{Point3, Vector3};

fn steps(length: f32, spacing: f32) -> usize {
    ((length / spacing).round() as usize).max(1)
}

/// Grid over the rectangle `origin + s*u + t*v`, `s, t` in `[0, 1]`.
fn sample_rectangle(origin: Point3<f32>, u: Vector3<f32>, v: Vector3<f32>, spacing: f32, out: &mut Vec<Point3<f32>>) {
    let nu = steps(u.norm(), spacing);
    let nv = steps(v.norm(), spacing);
    for i in 0..=nu {
        for j in 0..=nv {
            let s = i as f32 / nu as f32;
            let t = j as f32 / nv as f32;
            out.push(origin + u * s + v * t);
        }
    }
}

/// Surface of an axis-aligned box with the given center and edge lengths.
/// Edge points shared by two faces appear once per face.
pub fn sample_box(center: Point3<f32>, size: Vector3<f32>, spacing: f32) -> PointCloud {
    let half = size * 0.5;
    let min = center - half;
    let (ex, ey, ez) = (Vector3::x() * size.x, Vector3::y() * size.y, Vector3::z() * size.z);

    let mut points = Vec::new();
    sample_rectangle(min, ex, ey, spacing, &mut points);
    sample_rectangle(min + ez, ex, ey, spacing, &mut points);
    sample_rectangle(min, ex, ez, spacing, &mut points);
    sample_rectangle(min + ey, ex, ez, spacing, &mut points);
    sample_rectangle(min, ey, ez, spacing, &mut points);
    sample_rectangle(min + ex, ey, ez, spacing, &mut points);
    PointCloud::new(points)
}

/// Side wall and top cap of a cylinder standing on `base_center` along +z.
pub fn sample_cylinder(base_center: Point3<f32>, radius: f32, height: f32, spacing: f32) -> PointCloud {
    let mut points = Vec::new();
    let around = steps(std::f32::consts::TAU * radius, spacing).max(3);
    let up = steps(height, spacing);

    for k in 0..=up {
        let z = base_center.z + height * k as f32 / up as f32;
        for a in 0..around {
            let theta = std::f32::consts::TAU * a as f32 / around as f32;
            points.push(Point3::new(
                base_center.x + radius * theta.cos(),
                base_center.y + radius * theta.sin(),
                z,
            ));
        }
    }

    let rings = steps(radius, spacing);
    let top = base_center.z + height;
    points.push(Point3::new(base_center.x, base_center.y, top));
    for r in 1..rings {
        let rr = radius * r as f32 / rings as f32;
        let count = steps(std::f32::consts::TAU * rr, spacing).max(3);
        for a in 0..count {
            let theta = std::f32::consts::TAU * a as f32 / count as f32;
            points.push(Point3::new(base_center.x + rr * theta.cos(), base_center.y + rr * theta.sin(), top));
        }
    }
    PointCloud::new(points)
}

/// Rectangle of `extent_x` by `extent_y` centered on `center`, lying in the
/// plane `z = center.z`.
pub fn sample_plane(center: Point3<f32>, extent_x: f32, extent_y: f32, spacing: f32) -> PointCloud {
    let origin = center - Vector3::new(extent_x * 0.5, extent_y * 0.5, 0.0);
    let mut points = Vec::new();
    sample_rectangle(origin, Vector3::x() * extent_x, Vector3::y() * extent_y, spacing, &mut points);
    PointCloud::new(points)
}

/// Concatenate clouds, dropping normals.
pub fn merge(clouds: &[&PointCloud]) -> PointCloud {
    PointCloud::new(clouds.iter().flat_map(|c| c.points.iter().copied()).collect())
}
