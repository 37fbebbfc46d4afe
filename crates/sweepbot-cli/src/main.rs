//! `sweepbot-cli` – Sweepbot command line runner
//!
//! This binary wires the sweep engine to the in-process simulator and runs
//! it. It:
//!
//! 1. Loads `~/.sweepbot/config.toml`, writing the defaults on first run.
//! 2. Builds the simulated robot and scripts a few objects into its field.
//! 3. Runs the supervised heading-correction loop beside the navigation
//!    controller until the sweep is stopped, faults, or reaches
//!    `max_cycles`.
//! 4. Intercepts **Ctrl-C** to stop the robot and exit cleanly.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use sweepbot_hal::Classification;
use sweepbot_hal::sim::{SimRobot, arc_points};
use sweepbot_kernel::{ActuationGate, HeadingTracker, MeasurementSessions, Watchdog};
use sweepbot_perception::heading::HeadingFilter;
use sweepbot_perception::odometry::Odometer;
use sweepbot_perception::scan::ScanClusterer;
use sweepbot_runtime::{
    HeadingCorrectionLoop, MotionExecutor, NavigationController, NavigationState, spawn_supervised,
};
use sweepbot_types::RoverError;

fn main() {
    // Hold the guard until exit so pending spans are flushed.
    let _telemetry = sweepbot_runtime::telemetry::init_tracing("sweepbot");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => first_run_config(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Shared stop flag ──────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let stop_ctrlc = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        stop_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the sweep can only end on its own");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            std::process::exit(1);
        }
    };

    println!(
        "  Sweeping a {} × {} cm area{}\n",
        cfg.navigation.perimeter_x_cm,
        cfg.navigation.perimeter_y_cm,
        cfg.max_cycles
            .map(|n| format!(" for {n} cycle(s)"))
            .unwrap_or_default()
    );

    match runtime.block_on(run_sweep(cfg, stop)) {
        Ok((cycles, state)) => {
            println!(
                "\n  {} {} cycle(s), {} lane(s) completed",
                "✓".green().bold(),
                cycles,
                state.lanes_completed
            );
        }
        Err(e) => {
            println!("\n  {}: {}", "Sweep fault".red().bold(), e);
            std::process::exit(2);
        }
    }
}

fn first_run_config() -> config::Config {
    let mut cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweep
// ─────────────────────────────────────────────────────────────────────────────

async fn run_sweep(cfg: config::Config, stop: Arc<AtomicBool>) -> Result<(u64, NavigationState), RoverError> {
    cfg.navigation.validate()?;

    let (left, right) = cfg.calibration.channels();
    let robot = SimRobot::new(cfg.sim.clone(), cfg.calibration.cm_per_pulse(), left.clone(), right.clone());
    script_demo_field(&robot);

    let physics_stop = Arc::new(AtomicBool::new(false));
    let physics = robot.spawn_physics(physics_stop.clone());

    let tracker = Arc::new(HeadingTracker::new(HeadingFilter::new(cfg.heading), robot.gyro()));
    let sessions = Arc::new(MeasurementSessions::new(
        Odometer::new(left, right, &cfg.calibration),
        tracker,
    ));
    let executor = MotionExecutor::new(ActuationGate::new(robot.drive()), sessions, cfg.motion.clone())
        .with_stop_flag(stop.clone());

    let correction = Arc::new(HeadingCorrectionLoop::new(
        cfg.correction.clone(),
        executor.clone(),
        Arc::new(Watchdog::new()),
    ));
    let supervised = spawn_supervised(correction, stop.clone());

    let mut controller = NavigationController::new(
        cfg.navigation.clone(),
        executor,
        robot.peripherals(),
        ScanClusterer::new(cfg.scan.clone()),
    );
    let outcome = controller.run(stop.clone(), cfg.max_cycles).await;

    // The correction loop runs until the shared flag is raised.
    stop.store(true, Ordering::SeqCst);
    match supervised.handle.await {
        Ok(restarts) => info!(restarts, "heading correction stopped"),
        Err(e) => warn!(error = %e, "heading correction supervisor ended abnormally"),
    }

    physics_stop.store(true, Ordering::SeqCst);
    if let Err(e) = physics.await {
        warn!(error = %e, "simulator physics task ended abnormally");
    }

    outcome.map(|cycles| (cycles, controller.state().clone()))
}

/// Seed the simulator with a short scene: a piece of garbage straight
/// ahead, an off-path object the classifier rejects, and a tall obstacle on
/// the path. After that the field is empty.
fn script_demo_field(robot: &SimRobot) {
    for _ in 0..4 {
        robot.push_revolution(arc_points(270.0, 120.0, 9, 4.0));
    }
    robot.push_verdict(Some(Classification {
        garbage: true,
        confidence: 0.92,
    }));

    for _ in 0..4 {
        robot.push_revolution(arc_points(240.0, 180.0, 7, 3.0));
    }
    robot.push_verdict(Some(Classification {
        garbage: false,
        confidence: 0.81,
    }));

    for _ in 0..4 {
        robot.push_revolution(arc_points(272.0, 160.0, 9, 4.0));
    }
    robot.push_verdict(Some(Classification {
        garbage: true,
        confidence: 0.7,
    }));
    robot.push_tall_verdict(Some(true));
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____                      __        __ "#.bold().green());
    println!("{}", r#"  / __/    _____ ___ ___    / /  ___  / /_"#.bold().green());
    println!("{}", r#" _\ \| |/|/ / -_) -_) _ \  / _ \/ _ \/ __/"#.bold().green());
    println!("{}", r#"/___/|__,__/\__/\__/ .__/ /_.__/\___/\__/ "#.bold().green());
    println!("{}", r#"                  /_/                       "#.bold().green());
    println!();
    println!("  {} {}", "Sweepbot".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Autonomous floor-sweeping robot (simulated hardware)");
    println!();
}
