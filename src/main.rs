//! Ratha daemon entry point
//!
//! Wires the configured hardware backend to the avoidance controller,
//! then runs the control panel, the color launch trigger and the
//! line-crossing shutdown trigger on their own threads until Ctrl-C.

use log::{error, info, warn};
use ratha::actuators::SteeringServo;
use ratha::config::CarConfig;
use ratha::hw;
use ratha::nav::control_loop::ControlLoop;
use ratha::nav::controller::{NavController, Telemetry};
use ratha::panel::ControlPanel;
use ratha::sensors::line::LineMonitor;
use ratha::sensors::rgb::ColorLaunchMonitor;
use ratha::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/ratha.toml";

fn parse_config_path() -> String {
    std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Short full-range sweep so a watcher can see the steering is alive
/// before anything drives
fn steering_sweep(steering: &mut SteeringServo) -> Result<()> {
    let settle = Duration::from_millis(300);
    steering.center()?;
    std::thread::sleep(settle);
    steering.set_absolute(0.0)?;
    std::thread::sleep(settle);
    steering.center()?;
    std::thread::sleep(settle);
    steering.set_absolute(90.0)?;
    std::thread::sleep(settle);
    steering.center()?;
    std::thread::sleep(settle);
    steering.disable()?;
    info!("Steering sweep complete");
    Ok(())
}

fn run() -> Result<()> {
    let config_path = parse_config_path();
    let (config, from_file) = if std::path::Path::new(&config_path).exists() {
        (CarConfig::from_file(&config_path)?, true)
    } else {
        (CarConfig::default(), false)
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.logging.level),
    )
    .init();
    if from_file {
        info!("Starting with config {}", config_path);
    } else {
        warn!("Config {} not found, using defaults", config_path);
    }
    config.validate()?;

    let set = hw::create_hardware(&config)?;
    info!("Hardware backend '{}' ready", config.hardware.backend);

    let mut steering = set.steering;
    steering_sweep(&mut steering)?;

    let telemetry = Arc::new(Telemetry::new());
    let cancel = Arc::new(AtomicBool::new(false));
    let control = ControlLoop::new(
        config.nav.clone(),
        set.drive,
        steering,
        set.front,
        set.left,
        set.right,
        Arc::clone(&telemetry),
        Arc::clone(&cancel),
    );
    let controller = Arc::new(NavController::new(control, telemetry, cancel));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Interrupt received, shutting down");
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| Error::Other(format!("signal handler: {}", e)))?;
    }

    let panel = ControlPanel::new(&config.panel, Arc::clone(&controller), Arc::clone(&running));
    let panel_handle = std::thread::Builder::new()
        .name("panel".to_string())
        .spawn(move || {
            if let Err(e) = panel.run() {
                error!("Control panel failed: {}", e);
            }
        })
        .map_err(|e| Error::Other(format!("failed to spawn panel thread: {}", e)))?;

    // Launch trigger: green in front of the color sensor starts the car.
    // A dead color sensor only costs the trigger, not the daemon.
    let mut launch_monitor = ColorLaunchMonitor::new(set.rgb, &config.launch);
    let launch_handle = match launch_monitor.calibrate() {
        Ok(()) => {
            let controller = Arc::clone(&controller);
            let running = Arc::clone(&running);
            let handle = std::thread::Builder::new()
                .name("launch-monitor".to_string())
                .spawn(move || {
                    launch_monitor.run(&running, move || {
                        if let Err(e) = controller.start() {
                            error!("Launch failed: {}", e);
                        }
                    });
                })
                .map_err(|e| Error::Other(format!("failed to spawn launch monitor: {}", e)))?;
            Some(handle)
        }
        Err(e) => {
            warn!("Color sensor unavailable ({}), launch trigger disabled", e);
            None
        }
    };

    // Shutdown trigger: crossing the track boundary line too often stops
    // the car
    let mut line_monitor = LineMonitor::new(set.line_input, &config.line);
    let line_handle = {
        let controller = Arc::clone(&controller);
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("line-monitor".to_string())
            .spawn(move || {
                line_monitor.run(&running, move || controller.shutdown());
            })
            .map_err(|e| Error::Other(format!("failed to spawn line monitor: {}", e)))?
    };

    info!("Ready; waiting for a launch trigger or panel command");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("Stopping");
    controller.stop();
    if panel_handle.join().is_err() {
        error!("Panel thread panicked");
    }
    if let Some(handle) = launch_handle {
        let _ = handle.join();
    }
    let _ = line_handle.join();
    info!("Stopped");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        // The logger may not be up yet when config loading fails
        eprintln!("ratha: {}", e);
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
