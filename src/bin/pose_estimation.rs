//! Pose estimation demo
//!
//! Loads an object model and a scene (PCD files or a generated scene),
//! recognizes the object and prints the recognition and refined transforms.

use clap::Parser;
use cv_pose::core::{format_transform, rigid_from_axis_angle, Error, PointCloud, Result, Transform};
use cv_pose::point_cloud::synthetic::{merge, sample_box, sample_cylinder, sample_plane};
use cv_pose::recognition::{GroupingMethod, Recognition};
use cv_pose::{EstimatorConfig, PoseEstimator};
use nalgebra::{Point3, Vector3};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pose_estimation")]
#[command(about = "Find a known object in a point cloud scene and estimate its pose", long_about = None)]
struct Args {
    /// Object model PCD file
    #[arg(long, default_value = "pcd/milk.pcd")]
    object: PathBuf,

    /// Scene PCD file
    #[arg(long, default_value = "pcd/milk_cartoon_all_small_clorox.pcd")]
    scene: PathBuf,

    /// JSON pipeline configuration; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use a generated object and scene instead of PCD files
    #[arg(long)]
    synthetic: bool,

    /// Move the scene by a known transform (45 degrees about Z, 0.4 along Z)
    #[arg(long)]
    apply_test_transform: bool,

    /// Verify with geometric consistency instead of Hough voting
    #[arg(long)]
    geometric_consistency: bool,

    /// Worker threads for the parallel stages
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn test_transform() -> Transform {
    rigid_from_axis_angle(&Vector3::z(), std::f32::consts::FRAC_PI_4, &Vector3::new(0.0, 0.0, 0.4))
}

fn load_config(args: &Args) -> Result<EstimatorConfig> {
    let mut config: EstimatorConfig = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?
        }
        None => EstimatorConfig::default(),
    };
    if args.geometric_consistency {
        config.verification.method = GroupingMethod::GeometricConsistency;
    }
    Ok(config)
}

fn synthetic_clouds() -> (PointCloud, PointCloud) {
    let spacing = 0.0045;
    let body = sample_box(Point3::new(0.0, 0.0, 0.8), Vector3::new(0.063, 0.045, 0.081), spacing);
    let knob = sample_box(Point3::new(0.05175, 0.009, 0.782), Vector3::new(0.0225, 0.0225, 0.0315), spacing);
    let object = merge(&[&body, &knob]);

    let can = sample_cylinder(Point3::new(-0.15, 0.1, 0.85), 0.03, 0.08, spacing);
    let wall = sample_plane(Point3::new(0.0, 0.0, 1.6), 0.5, 0.5, 0.005);
    let scene = merge(&[&object, &can, &wall]);
    (object, scene)
}

fn run(args: Args) -> Result<bool> {
    cv_pose::init_thread_pool(args.threads)?;
    let mut config = load_config(&args)?;

    let (object, mut scene) = if args.synthetic {
        // Generated clouds keep their grid layout only with fine voxels
        config.preprocess.leaf_size = config.preprocess.leaf_size.min(0.002);
        synthetic_clouds()
    } else {
        (
            cv_pose::io::read_pcd_file(&args.object)?,
            cv_pose::io::read_pcd_file(&args.scene)?,
        )
    };
    info!(object = object.len(), scene = scene.len(), "clouds loaded");

    if args.apply_test_transform {
        scene = scene.transformed(&test_transform());
        println!("Real transformation:\n{}\n", format_transform(&test_transform()));
    }

    let estimator = PoseEstimator::new(config);
    match estimator.estimate(&object, &scene)? {
        Recognition::Found(estimate) => {
            println!("Recognition transformation:\n{}\n", format_transform(&estimate.coarse));
            println!("Precise transformation:\n{}", format_transform(&estimate.combined));
            info!(
                cluster = estimate.cluster_index,
                icp_iterations = estimate.icp.num_iterations,
                icp_fitness = estimate.icp.fitness_score,
                "done"
            );
            Ok(true)
        }
        Recognition::NotFound { reason, evaluations } => {
            warn!(clusters = evaluations.len(), "object not found: {reason}");
            println!("Object not found: {reason}");
            Ok(false)
        }
    }
}
