//! Fleet orchestration
//!
//! Builds N servos and N boards from configuration, wires them to the
//! simulation stepper, and owns the lifecycle: servos and the stepper come
//! up first, boards attach on top, and teardown runs in reverse
//! construction order so no board ever outlives its servo.

use crate::board::Board;
use crate::config::ServoConfig;
use crate::error::{Error, Result};
use crate::sim::{Servo, SimulationEngine};
use std::sync::Arc;

/// A complete simulated fleet: stepper, servos and their CAN boards
pub struct Fleet {
    engine: SimulationEngine,
    servos: Vec<Arc<Servo>>,
    boards: Vec<Board>,
    running: bool,
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("servos", &self.servos.len())
            .field("boards", &self.boards.len())
            .field("running", &self.running)
            .finish()
    }
}

impl Fleet {
    /// Build a fleet from validated servo configurations
    ///
    /// Refuses an empty configuration.
    pub fn from_configs(configs: &[ServoConfig]) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::Config(
                "refusing to start with a zero-servo fleet".to_string(),
            ));
        }

        let mut engine = SimulationEngine::new();
        let mut servos = Vec::with_capacity(configs.len());
        let mut boards = Vec::with_capacity(configs.len());

        for config in configs {
            config.validate()?;
            let servo = Arc::new(Servo::from_config(config));
            engine.add_servo(Arc::clone(&servo));
            boards.push(Board::new(
                Arc::clone(&servo),
                config.can_id,
                &config.can_interface,
            ));
            servos.push(servo);
        }

        Ok(Self {
            engine,
            servos,
            boards,
            running: false,
        })
    }

    /// Start the stepper, then every board
    ///
    /// Board CAN failures degrade the individual board; they never abort
    /// the fleet.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;

        self.engine.start();
        for board in &mut self.boards {
            board.start();
        }

        log::info!("Fleet started: {} servo(s)", self.servos.len());
    }

    /// Stop every board in reverse construction order, then the stepper
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        for board in self.boards.iter_mut().rev() {
            board.stop();
        }
        self.engine.stop();

        log::info!("Fleet stopped");
    }

    /// Number of servos in the fleet
    pub fn servo_count(&self) -> usize {
        self.servos.len()
    }

    /// Whether the fleet has been started
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulation tick rate in Hz
    pub fn simulation_frequency(&self) -> f64 {
        self.engine.frequency()
    }

    /// Access a servo by index
    pub fn servo(&self, index: usize) -> Result<&Arc<Servo>> {
        self.servos
            .get(index)
            .ok_or_else(|| Error::Config(format!("servo index {} out of range", index)))
    }

    /// Access a board by index
    pub fn board(&self, index: usize) -> Result<&Board> {
        self.boards
            .get(index)
            .ok_or_else(|| Error::Config(format!("servo index {} out of range", index)))
    }

    /// Latch a control value on one board, as a bus command would
    pub fn set_control(&self, index: usize, value: i8) -> Result<()> {
        self.board(index)?.set_control(value);
        Ok(())
    }

    /// Latch the stop-without-hold sentinel on one board
    pub fn stop_servo(&self, index: usize) -> Result<()> {
        self.set_control(index, 1)
    }
}

impl Drop for Fleet {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn degraded_configs(count: usize) -> Vec<ServoConfig> {
        (0..count)
            .map(|i| ServoConfig {
                name: format!("servo{}", i),
                can_id: 0x10 + i as u16,
                can_interface: "can-test-none".to_string(),
                time_constant: 0.01,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_empty_fleet_is_refused() {
        let err = Fleet::from_configs(&[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_entry_is_refused() {
        let mut configs = degraded_configs(1);
        configs[0].can_id = 0x800;
        assert!(Fleet::from_configs(&configs).is_err());
    }

    #[test]
    fn test_control_flows_from_board_to_motor() {
        let mut fleet = Fleet::from_configs(&degraded_configs(2)).unwrap();
        fleet.start();

        fleet.set_control(1, 90).unwrap();
        thread::sleep(Duration::from_millis(100));

        let servo = fleet.servo(1).unwrap();
        assert_eq!(servo.motor().control_signal(), 90);
        assert!(servo.motor().angular_velocity() > 0.0);
        // The untouched servo still holds its boot sentinel
        assert_eq!(fleet.servo(0).unwrap().motor().control_signal(), 0);

        fleet.stop_servo(1).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(servo.motor().control_signal(), 0);

        fleet.stop();
    }

    #[test]
    fn test_out_of_range_index() {
        let fleet = Fleet::from_configs(&degraded_configs(1)).unwrap();
        assert!(fleet.set_control(5, 10).is_err());
        assert!(fleet.servo(1).is_err());
    }

    #[test]
    fn test_shutdown_joins_every_thread_promptly() {
        let mut fleet = Fleet::from_configs(&degraded_configs(7)).unwrap();
        fleet.start();
        assert!(fleet.is_running());
        thread::sleep(Duration::from_millis(100));

        let begin = Instant::now();
        fleet.stop();
        // 7 boards x 3 tasks + stepper, all joined well inside a second
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert!(!fleet.is_running());

        // Idempotent
        fleet.stop();
    }
}
