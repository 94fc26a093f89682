//! bodyik - Humanoid full-body IK demo
//!
//! Drives a procedural reference humanoid with a moving head target and logs
//! how closely the solved pose follows it.

use clap::Parser;
use glam::{Quat, Vec3};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bodyik::{
    BodyIk, JointName, Pose, References, Rig, SolverConfig, Target, Targets, TrackingPreset, Transform,
};

/// bodyik - Humanoid full-body IK solver demo
#[derive(Parser, Debug)]
#[command(name = "bodyik", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 300)]
    frames: u32,

    /// Seconds per frame
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Level of detail (overrides config)
    #[arg(long)]
    lod: Option<u8>,

    /// Tracking preset: five_target, six_target, ten_target or all_target
    #[arg(short, long)]
    preset: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", bodyik::NAME, bodyik::VERSION);

    // Load configuration
    let mut config = if let Some(ref path) = args.config {
        SolverConfig::from_file(path)?
    } else {
        SolverConfig::load()?
    };

    // Apply CLI overrides
    let preset = match args.preset.as_deref() {
        Some(name) => match TrackingPreset::from_str(name) {
            Some(preset) => Some(preset),
            None => anyhow::bail!("Unknown preset: {}", name),
        },
        None => None,
    };
    if let Some(preset) = preset {
        preset.apply(&mut config);
        info!("Preset: {}", preset.as_str());
    }
    if let Some(lod) = args.lod {
        config.solver.lod = lod;
    }
    config.validate()?;

    info!("LOD: {}", config.solver.lod);
    info!("Plant feet: {}", config.solver.plant_feet);
    info!("Locomotion weight: {}", config.locomotion.weight);

    let rig = Rig::reference_humanoid();
    let refs = References::from_rig_names(&rig);
    let bind = Pose::from_rig(&rig, &refs);
    let mut ik = BodyIk::from_rig(config, &rig, &refs)?;

    let mut root = bind.get(JointName::Root).unwrap_or_default();
    let mut steps = 0usize;
    let mut max_head_error = 0.0f32;

    for frame in 0..args.frames {
        let time = frame as f32 * args.dt;

        // The solver returns root motion; carry the animated pose along with it
        let mut input = bind.clone();
        input.rebase(root);

        let targets = demo_targets(&bind, preset, time);
        let output = ik.solve(&input, &targets, args.dt)?;

        for event in &output.events {
            steps += 1;
            debug!("Frame {}: {} foot planted", frame, event.side().as_str());
        }

        if let Some(head) = targets.head {
            let error = output.pose.position(JointName::Head).distance(head.position);
            max_head_error = max_head_error.max(error);
        }

        if frame % 60 == 0 {
            log_frame(frame, &output.pose, &targets);
        }

        root = output.pose.get(JointName::Root).unwrap_or(root);
    }

    info!(
        "Simulated {} frames: {} steps, max head error {:.3} m",
        args.frames, steps, max_head_error
    );
    Ok(())
}

/// Head walks forward with a gentle sway; with a preset the hands and feet
/// are tracked too.
fn demo_targets(bind: &Pose, preset: Option<TrackingPreset>, time: f32) -> Targets {
    let sway = Vec3::new((time * 2.0).sin() * 0.05, (time * 4.0).sin().abs() * -0.02, time * 0.4);
    let turn = Quat::from_rotation_y((time * 0.5).sin() * 0.3);

    let head = bind.get(JointName::Head).unwrap_or_default();
    let mut targets = Targets {
        head: Some(Target::new(head.position + sway, turn * head.rotation)),
        ..Default::default()
    };

    let Some(preset) = preset else {
        return targets;
    };

    let tracked = Targets::from_pose(bind);
    let carry = |t: Option<Target>| {
        t.map(|t| Transform::new(t.position + Vec3::new(0.0, 0.0, sway.z), t.rotation))
    };
    targets.pelvis = carry(tracked.pelvis);
    targets.left_hand = carry(tracked.left_hand).map(|mut t| {
        t.position += Vec3::new(0.1, -0.1 + (time * 3.0).sin() * 0.1, 0.2);
        t
    });
    targets.right_hand = carry(tracked.right_hand).map(|mut t| {
        t.position += Vec3::new(-0.1, -0.1 - (time * 3.0).sin() * 0.1, 0.2);
        t
    });
    targets.left_foot = carry(tracked.left_foot);
    targets.right_foot = carry(tracked.right_foot);

    preset.filter_targets(&targets)
}

fn log_frame(frame: u32, pose: &Pose, targets: &Targets) {
    let error = |joint: JointName, target: Option<Target>| {
        target.map(|t| pose.position(joint).distance(t.position))
    };
    info!(
        "Frame {}: root {:?}, head error {:?}, hand errors {:?}/{:?}, foot errors {:?}/{:?}",
        frame,
        pose.position(JointName::Root),
        error(JointName::Head, targets.head),
        error(JointName::LeftHand, targets.left_hand),
        error(JointName::RightHand, targets.right_hand),
        error(foot_end(pose, JointName::LeftToes, JointName::LeftFoot), targets.left_foot),
        error(foot_end(pose, JointName::RightToes, JointName::RightFoot), targets.right_foot),
    );
}

/// Foot targets drive the toes when the skeleton has them.
fn foot_end(pose: &Pose, toes: JointName, foot: JointName) -> JointName {
    if pose.get(toes).is_some() {
        toes
    } else {
        foot
    }
}
