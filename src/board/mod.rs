//! CAN board firmware emulator
//!
//! Emulates the microcontroller board attached to one servo. The board runs
//! the same periodic duties real firmware would schedule from hardware
//! timers, plus a receive dispatcher fed by the CAN socket's background
//! thread:
//!
//! | Task | Rate | Duty |
//! |------|------|------|
//! | `encoder_read` | 300 Hz | snapshot the encoder into a register cache |
//! | `control_update` | 300 Hz | latch the last received effort into the servo |
//! | `can_transmit` | 100 Hz | emit one telemetry frame |
//!
//! # Thread Model
//!
//! ```text
//!                       ┌──────────────┐
//!   CAN RX thread ─────▶│ latched      │─────▶ control_update ──▶ servo
//!   (socket-owned)      │ control (i8) │        (300 Hz)
//!                       └──────────────┘
//!   encoder_read ──────▶┌──────────────┐
//!     (300 Hz)          │ cached steps │─────▶ can_transmit ──▶ CAN TX
//!                       └──────────────┘        (100 Hz)
//! ```
//!
//! Each shared cell is one atomic with a single writer, so no task ever
//! blocks another. Intermediate commands may be dropped (latest wins),
//! which matches real hardware latching.
//!
//! # Degraded Mode
//!
//! A board whose CAN interface cannot be opened logs the failure and keeps
//! running its local tasks; telemetry transmission silently no-ops until
//! the socket is open. This mirrors a real board whose transceiver lost the
//! bus: the firmware keeps sampling and latching regardless.

pub mod protocol;

use crate::can::{CanFilter, CanFrame, CanSocket};
use crate::sim::Servo;
use self::protocol::{decode, telemetry_frame, InboundMessage};
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Encoder sampling rate
const ENCODER_READ_HZ: f64 = 300.0;
/// Control latch rate
const CONTROL_UPDATE_HZ: f64 = 300.0;
/// Telemetry transmit rate
const CAN_TRANSMIT_HZ: f64 = 100.0;

/// Periodic firmware duty hosted by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    EncoderRead,
    ControlUpdate,
    CanTransmit,
}

/// One periodic task slot: name, period and enable flag
struct TaskSpec {
    name: &'static str,
    period: Duration,
    enabled: bool,
    kind: TaskKind,
}

/// State shared between the task threads and the RX dispatcher
struct BoardShared {
    servo: Arc<Servo>,
    socket: Arc<CanSocket>,
    can_id: u16,
    /// Last sampled encoder reading (written by encoder_read, read by can_transmit)
    cached_encoder_steps: AtomicU32,
    /// Last received effort command (written by the RX thread, read by control_update)
    latched_control: AtomicI8,
    running: AtomicBool,
    unknown_type_logged: AtomicBool,
}

impl BoardShared {
    fn encoder_read(&self) {
        self.cached_encoder_steps
            .store(self.servo.encoder().position_steps(), Ordering::Relaxed);
    }

    fn control_update(&self) {
        let latched = self.latched_control.load(Ordering::Relaxed);
        // +1/-1 are protocol sentinels (stop without position hold), never
        // control magnitudes. Position hold for 0 is not implemented; the
        // motor coasts to zero either way.
        // TODO: replace the sentinel-0 path with actual position hold
        if latched == 1 || latched == -1 {
            self.servo.set_control_signal(0);
        } else {
            self.servo.set_control_signal(i32::from(latched));
        }
    }

    fn can_transmit(&self) {
        if !self.socket.is_open() {
            return;
        }
        let frame = telemetry_frame(
            self.can_id,
            self.cached_encoder_steps.load(Ordering::Relaxed),
            self.servo.motor().angular_velocity(),
            self.latched_control.load(Ordering::Relaxed),
        );
        match frame {
            Ok(frame) => {
                if let Err(e) = self.socket.send(&frame) {
                    log::warn!("Board[0x{:03X}]: telemetry send failed: {}", self.can_id, e);
                }
            }
            Err(e) => {
                log::error!("Board[0x{:03X}]: telemetry encode failed: {}", self.can_id, e);
            }
        }
    }

    fn run_task(&self, kind: TaskKind) {
        match kind {
            TaskKind::EncoderRead => self.encoder_read(),
            TaskKind::ControlUpdate => self.control_update(),
            TaskKind::CanTransmit => self.can_transmit(),
        }
    }

    fn handle_frame(&self, frame: &CanFrame) {
        match decode(frame) {
            InboundMessage::Effort(value) => {
                self.latched_control.store(value, Ordering::Relaxed);
            }
            InboundMessage::Empty | InboundMessage::Malformed => {}
            InboundMessage::Unknown(msg_type) => {
                if !self.unknown_type_logged.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "Board[0x{:03X}]: ignoring unknown message type 0x{:02X}",
                        self.can_id,
                        msg_type
                    );
                }
            }
        }
    }
}

/// Firmware emulator bound to one servo
///
/// The board holds an `Arc` to its servo; the fleet owns both and tears
/// boards down before the servos they reference.
pub struct Board {
    shared: Arc<BoardShared>,
    tasks: Vec<TaskSpec>,
    handles: Vec<JoinHandle<()>>,
}

impl Board {
    /// Create a board bound to a servo, with the default task set
    ///
    /// The control latch powers up holding the stop-without-hold sentinel,
    /// so the motor stays at zero until the first bus command arrives.
    pub fn new(servo: Arc<Servo>, can_id: u16, can_interface: &str) -> Self {
        let shared = Arc::new(BoardShared {
            servo,
            socket: Arc::new(CanSocket::new(can_interface)),
            can_id,
            cached_encoder_steps: AtomicU32::new(0),
            latched_control: AtomicI8::new(1),
            running: AtomicBool::new(false),
            unknown_type_logged: AtomicBool::new(false),
        });

        let tasks = vec![
            TaskSpec {
                name: "encoder_read",
                period: Duration::from_secs_f64(1.0 / ENCODER_READ_HZ),
                enabled: true,
                kind: TaskKind::EncoderRead,
            },
            TaskSpec {
                name: "control_update",
                period: Duration::from_secs_f64(1.0 / CONTROL_UPDATE_HZ),
                enabled: true,
                kind: TaskKind::ControlUpdate,
            },
            TaskSpec {
                name: "can_transmit",
                period: Duration::from_secs_f64(1.0 / CAN_TRANSMIT_HZ),
                enabled: true,
                kind: TaskKind::CanTransmit,
            },
        ];

        Self {
            shared,
            tasks,
            handles: Vec::new(),
        }
    }

    /// Board CAN identifier
    pub fn can_id(&self) -> u16 {
        self.shared.can_id
    }

    /// Whether the task threads are running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Whether the board has a live CAN socket
    pub fn has_can(&self) -> bool {
        self.shared.socket.is_open()
    }

    /// Latch a control value as if it had arrived over the bus
    ///
    /// Thread-safe entry point for local tooling; the sentinel values
    /// (`0`, `+1`, `-1`) keep their protocol meaning.
    pub fn set_control(&self, value: i8) {
        self.shared.latched_control.store(value, Ordering::Relaxed);
    }

    /// Currently latched control value
    pub fn control(&self) -> i8 {
        self.shared.latched_control.load(Ordering::Relaxed)
    }

    /// Last encoder reading sampled by the `encoder_read` task
    pub fn cached_encoder_steps(&self) -> u32 {
        self.shared.cached_encoder_steps.load(Ordering::Relaxed)
    }

    /// Enable or disable a task by name; effective before `start`
    pub fn set_task_enabled(&mut self, name: &str, enabled: bool) {
        if self.is_running() {
            log::warn!(
                "Board[0x{:03X}]: task '{}' cannot be toggled while running",
                self.shared.can_id,
                name
            );
            return;
        }
        for task in &mut self.tasks {
            if task.name == name {
                task.enabled = enabled;
                return;
            }
        }
        log::warn!(
            "Board[0x{:03X}]: no task named '{}'",
            self.shared.can_id,
            name
        );
    }

    /// Open the CAN socket, install the board filter, start the receive
    /// dispatcher, and spawn every enabled task thread
    ///
    /// A CAN setup failure is logged and leaves the board in degraded mode;
    /// local tasks run either way.
    pub fn start(&mut self) {
        if self.shared.running.swap(true, Ordering::Relaxed) {
            return;
        }

        match self.shared.socket.open() {
            Ok(()) => {
                // Only frames addressed to this board reach the dispatcher.
                if let Err(e) = self
                    .shared
                    .socket
                    .set_filters(&[CanFilter::exact(self.shared.can_id)])
                {
                    log::error!("Board[0x{:03X}]: {}", self.shared.can_id, e);
                }

                let dispatcher = Arc::clone(&self.shared);
                if let Err(e) = self
                    .shared
                    .socket
                    .start_receiving(Box::new(move |frame| dispatcher.handle_frame(&frame)))
                {
                    log::error!("Board[0x{:03X}]: {}", self.shared.can_id, e);
                }
            }
            Err(e) => {
                log::warn!(
                    "Board[0x{:03X}]: CAN unavailable ({}), continuing without CAN",
                    self.shared.can_id,
                    e
                );
            }
        }

        for task in self.tasks.iter().filter(|t| t.enabled) {
            let shared = Arc::clone(&self.shared);
            let kind = task.kind;
            let period = task.period;
            let handle = thread::Builder::new()
                .name(format!("board-{:03x}-{}", self.shared.can_id, task.name))
                .spawn(move || {
                    let mut next = Instant::now();
                    while shared.running.load(Ordering::Relaxed) {
                        shared.run_task(kind);
                        next += period;
                        let wait = next.saturating_duration_since(Instant::now());
                        if !wait.is_zero() {
                            thread::sleep(wait);
                        }
                    }
                })
                .expect("failed to spawn board task thread");
            self.handles.push(handle);
        }

        log::info!(
            "Board[0x{:03X}]: started ({} task(s), CAN {})",
            self.shared.can_id,
            self.handles.len(),
            if self.has_can() { "up" } else { "down" }
        );
    }

    /// Stop the board: close the socket (which joins its receive thread),
    /// then join every task thread
    ///
    /// Idempotent. After `stop` returns no frame is sent and the receive
    /// dispatcher is no longer invoked.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shared.socket.close();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }

        log::info!("Board[0x{:03X}]: stopped", self.shared.can_id);
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServoConfig;

    // Boards under test use an interface name that cannot exist, so they
    // start in degraded mode deterministically on any host.
    const NO_IFACE: &str = "can-test-none";

    fn test_board() -> Board {
        let servo = Arc::new(Servo::from_config(&ServoConfig::default()));
        Board::new(servo, 0x10, NO_IFACE)
    }

    fn settle() {
        // A few control_update periods (300 Hz)
        thread::sleep(Duration::from_millis(25));
    }

    #[test]
    fn test_default_task_set() {
        let board = test_board();
        assert_eq!(board.tasks.len(), 3);
        assert!(board.tasks.iter().all(|t| t.enabled));
        assert_eq!(
            board.tasks[0].period,
            Duration::from_secs_f64(1.0 / 300.0)
        );
        assert_eq!(
            board.tasks[2].period,
            Duration::from_secs_f64(1.0 / 100.0)
        );
    }

    #[test]
    fn test_degraded_start_runs_local_tasks() {
        let mut board = test_board();
        board.start();
        assert!(board.is_running());
        assert!(!board.has_can());

        // Boot state: the latch holds the stop sentinel, so the control
        // task must drive the servo to zero.
        settle();
        assert_eq!(board.shared.servo.motor().control_signal(), 0);
        board.stop();
    }

    #[test]
    fn test_effort_command_reaches_motor() {
        let mut board = test_board();
        board.start();
        settle();

        let frame = CanFrame::new(0x10, &[protocol::MSG_EFFORT, 0xCE]).unwrap();
        board.shared.handle_frame(&frame);
        assert_eq!(board.shared.latched_control.load(Ordering::Relaxed), -50);

        settle();
        assert_eq!(board.shared.servo.motor().control_signal(), -50);
        board.stop();
    }

    #[test]
    fn test_sentinel_stops_motor() {
        let mut board = test_board();
        board.start();

        let frame = CanFrame::new(0x10, &[protocol::MSG_EFFORT, 0x32]).unwrap();
        board.shared.handle_frame(&frame);
        settle();
        assert_eq!(board.shared.servo.motor().control_signal(), 50);

        // Stop without hold: the sentinel must not drive the motor
        let frame = CanFrame::new(0x10, &[protocol::MSG_EFFORT, 0x01]).unwrap();
        board.shared.handle_frame(&frame);
        settle();
        assert_eq!(board.shared.servo.motor().control_signal(), 0);
        board.stop();
    }

    #[test]
    fn test_encoder_read_caches_position() {
        let mut board = test_board();
        let servo = Arc::clone(&board.shared.servo);

        // Advance the servo directly, as the stepper would
        servo.set_control_signal(100);
        for _ in 0..50_000 {
            servo.step(1.0 / 20_000.0);
        }
        let position = servo.encoder().position_steps();
        assert_ne!(position, 0);

        board.start();
        settle();
        let cached = board.shared.cached_encoder_steps.load(Ordering::Relaxed);
        assert_eq!(cached, position);
        board.stop();
    }

    #[test]
    fn test_malformed_and_unknown_frames_ignored() {
        let board = test_board();
        let before = board.shared.latched_control.load(Ordering::Relaxed);

        board
            .shared
            .handle_frame(&CanFrame::new(0x10, &[]).unwrap());
        board
            .shared
            .handle_frame(&CanFrame::new(0x10, &[protocol::MSG_EFFORT]).unwrap());
        board
            .shared
            .handle_frame(&CanFrame::new(0x10, &[0x55, 0x01]).unwrap());

        assert_eq!(board.shared.latched_control.load(Ordering::Relaxed), before);
        assert!(board.shared.unknown_type_logged.load(Ordering::Relaxed));
    }

    #[test]
    fn test_stop_is_idempotent_and_joins() {
        let mut board = test_board();
        board.start();
        settle();
        board.stop();
        assert!(!board.is_running());
        assert!(board.handles.is_empty());
        board.stop();
    }

    #[test]
    fn test_disabled_task_not_spawned() {
        let mut board = test_board();
        board.set_task_enabled("can_transmit", false);
        board.start();
        assert_eq!(board.handles.len(), 2);
        board.stop();
    }
}
