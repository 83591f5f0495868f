//! Control loop lifecycle and shared telemetry
//!
//! [`NavController`] owns the control loop behind a mutex and runs it on
//! a named thread. `start` is idempotent, `stop` interrupts any wait and
//! joins. Telemetry (last clearances, estimated speed) is published
//! through lock-free atomics so the panel never blocks on a maneuver in
//! progress and keeps the last known values through transient sensor
//! failures.

use crate::error::{Error, Result};
use crate::nav::control_loop::ControlLoop;
use crate::nav::Distances;
use log::{error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// f64 stored bit-cast in an AtomicU64
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Last known clearances and estimated speed, readable from any thread
pub struct Telemetry {
    front_cm: AtomicF64,
    left_cm: AtomicF64,
    right_cm: AtomicF64,
    speed: AtomicF64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            front_cm: AtomicF64::new(0.0),
            left_cm: AtomicF64::new(0.0),
            right_cm: AtomicF64::new(0.0),
            speed: AtomicF64::new(0.0),
        }
    }

    pub fn set_front(&self, cm: f64) {
        self.front_cm.store(cm);
    }

    pub fn set_left(&self, cm: f64) {
        self.left_cm.store(cm);
    }

    pub fn set_right(&self, cm: f64) {
        self.right_cm.store(cm);
    }

    pub fn set_speed(&self, speed: f64) {
        self.speed.store(speed);
    }

    pub fn distances(&self) -> Distances {
        Distances {
            front: self.front_cm.load(),
            left: self.left_cm.load(),
            right: self.right_cm.load(),
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed.load()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread lifecycle around a [`ControlLoop`]
pub struct NavController {
    control: Arc<Mutex<ControlLoop>>,
    telemetry: Arc<Telemetry>,
    cancel: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NavController {
    /// `cancel` and `telemetry` must be the same instances the control
    /// loop was built with.
    pub fn new(
        control: ControlLoop,
        telemetry: Arc<Telemetry>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            control: Arc::new(Mutex::new(control)),
            telemetry,
            cancel,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Launch the avoidance loop on its own thread. A second call while
    /// it runs is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Avoidance loop already running");
            return Ok(());
        }
        self.cancel.store(false, Ordering::SeqCst);

        let control = Arc::clone(&self.control);
        let running = Arc::clone(&self.running);
        let spawn = std::thread::Builder::new()
            .name("nav-control".to_string())
            .spawn(move || {
                let mut guard = control.lock();
                if let Err(e) = guard.run() {
                    error!("Control thread exited with error: {}", e);
                }
                drop(guard);
                running.store(false, Ordering::SeqCst);
            });
        match spawn {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(Error::Other(format!("failed to spawn control thread: {}", e)))
            }
        }
    }

    /// Interrupt the loop (or any running choreography) and wait for the
    /// control thread to finish. Safe to call repeatedly and before
    /// `start`; the loop's own exit path has already parked the
    /// actuators by the time this returns.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Control thread panicked");
            }
        }
    }

    /// Full shutdown: identical to `stop` today, kept separate so the
    /// shutdown triggers read as intent.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Last known clearances (cm); transient sensor failures keep the
    /// previous values.
    pub fn get_distances(&self) -> Distances {
        self.telemetry.distances()
    }

    /// Current estimated speed
    pub fn get_speed(&self) -> f64 {
        self.telemetry.speed()
    }

    /// Run a choreography on the caller's thread. Refused while the
    /// avoidance loop holds the actuators.
    pub fn with_actuators<F>(&self, what: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut ControlLoop) -> Result<()>,
    {
        if self.is_running() {
            return Err(Error::InvalidCommand(format!(
                "cannot run {} while the avoidance loop is active",
                what
            )));
        }
        let mut guard = self.control.try_lock().ok_or_else(|| {
            Error::InvalidCommand(format!("actuators busy, cannot run {}", what))
        })?;
        self.cancel.store(false, Ordering::SeqCst);
        f(&mut guard)
    }
}
