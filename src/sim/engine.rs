//! Fixed-rate simulation stepper
//!
//! Advances every servo in the fleet on a single dedicated thread at a fixed
//! tick rate (20 kHz by default). The loop schedule is drift-free: the next
//! wake target advances by the nominal period each tick, so jitter is
//! absorbed without long-term phase drift, and missed deadlines collapse
//! into a sleep-zero burst that catches up deterministically.

use crate::sim::Servo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default simulation tick rate in Hz
pub const DEFAULT_FREQUENCY_HZ: f64 = 20_000.0;

/// Drives all servos at a fixed tick rate on one thread
pub struct SimulationEngine {
    servos: Vec<Arc<Servo>>,
    frequency_hz: f64,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationEngine {
    /// Create an engine at the default 20 kHz tick rate
    pub fn new() -> Self {
        Self::with_frequency(DEFAULT_FREQUENCY_HZ)
    }

    /// Create an engine with a custom tick rate
    pub fn with_frequency(frequency_hz: f64) -> Self {
        Self {
            servos: Vec::new(),
            frequency_hz,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Add a servo to the stepped set
    ///
    /// The set is immutable once the engine is running; late additions are
    /// rejected with a warning.
    pub fn add_servo(&mut self, servo: Arc<Servo>) {
        if self.running.load(Ordering::Relaxed) {
            log::warn!(
                "Ignoring servo '{}' added while the simulation is running",
                servo.name()
            );
            return;
        }
        self.servos.push(servo);
    }

    /// Number of servos in the stepped set
    pub fn servo_count(&self) -> usize {
        self.servos.len()
    }

    /// Access a servo by index
    pub fn servo(&self, index: usize) -> Option<&Arc<Servo>> {
        self.servos.get(index)
    }

    /// Simulation tick rate in Hz
    pub fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    /// Whether the stepper thread is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the stepper thread
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        let servos = self.servos.clone();
        let running = Arc::clone(&self.running);
        let period = Duration::from_secs_f64(1.0 / self.frequency_hz);
        let dt = 1.0 / self.frequency_hz;

        let handle = thread::Builder::new()
            .name("sim-engine".to_string())
            .spawn(move || {
                log::info!(
                    "Simulation stepper started: {} servo(s), dt={:.1}us",
                    servos.len(),
                    dt * 1e6
                );

                let mut next = Instant::now();
                while running.load(Ordering::Relaxed) {
                    for servo in &servos {
                        servo.step(dt);
                    }
                    next += period;
                    let wait = next.saturating_duration_since(Instant::now());
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                }

                log::info!("Simulation stepper exiting");
            })
            .expect("failed to spawn simulation stepper thread");

        self.handle = Some(handle);
    }

    /// Stop the stepper thread and zero every servo's control signal
    ///
    /// Idempotent and safe to call from a different thread than `start`.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);

        for servo in &self.servos {
            servo.set_control_signal(0);
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
