//! Interactive terminal command processor
//!
//! Reads line commands from stdin and drives the fleet the way a bench
//! operator would: latch efforts, inspect servo state, reset, quit. The UI
//! owns stdout; everything else in the daemon logs through the `log`
//! facade so operator output and diagnostics stay separable.
//!
//! Control values go through the board latch, exactly like an effort
//! command arriving over the bus, so the sentinel values keep their
//! protocol meaning: `0` stop with hold, `+1`/`-1` stop without hold.

use crate::fleet::Fleet;
use crate::sim::motor::rad_s_to_rpm;
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stdin-driven terminal frontend for a running fleet
pub struct TerminalUi {
    fleet: Arc<Mutex<Fleet>>,
    running: Arc<AtomicBool>,
}

impl TerminalUi {
    pub fn new(fleet: Arc<Mutex<Fleet>>, running: Arc<AtomicBool>) -> Self {
        Self { fleet, running }
    }

    /// Print the banner and fleet parameters, then process stdin commands
    /// until `quit`, EOF, or an external shutdown
    pub fn run(&self) {
        self.print_welcome();
        self.print_fleet_info();
        self.print_help();
        self.print_prompt();

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            let Ok(line) = line else { break };
            if !self.process_command(line.trim()) {
                break;
            }
            self.print_prompt();
        }
    }

    fn print_welcome(&self) {
        let frequency = self.fleet.lock().simulation_frequency();
        println!("==========================");
        println!("= CAN Servo Simulator    =");
        println!("==========================");
        println!("Simulation frequency: {} kHz", frequency / 1000.0);
    }

    fn print_fleet_info(&self) {
        let fleet = self.fleet.lock();
        println!("\nFleet: {} servo(s)", fleet.servo_count());
        for index in 0..fleet.servo_count() {
            let Ok(servo) = fleet.servo(index) else { continue };
            let Ok(board) = fleet.board(index) else { continue };
            let motor = servo.motor();
            let encoder = servo.encoder();
            println!(
                "  [{}] '{}': CAN 0x{:03X} ({}), max {:.0} RPM, signal \u{00b1}{}, tau {}s, \
                 encoder {} bits{}",
                index,
                servo.name(),
                board.can_id(),
                if board.has_can() { "up" } else { "down" },
                rad_s_to_rpm(motor.max_angular_velocity()),
                motor.max_control_signal(),
                motor.time_constant(),
                encoder.bit_resolution(),
                if encoder.is_direction_inverted() {
                    ", inverted"
                } else {
                    ""
                },
            );
        }
    }

    fn print_help(&self) {
        println!("\nAvailable commands:");
        println!("  control <servo> <value>  - Latch an effort (-127..127; 0/\u{00b1}1 = stop)");
        println!("  stop [servo]             - Stop one servo, or all of them");
        println!("  status [servo]           - Show servo state");
        println!("  list                     - Show fleet summary");
        println!("  reset <servo>            - Reset motor and encoder state");
        println!("  help                     - Show this help message");
        println!("  quit/exit                - Shut the simulator down");
    }

    fn print_status(&self, index: usize) {
        let fleet = self.fleet.lock();
        let (servo, board) = match (fleet.servo(index), fleet.board(index)) {
            (Ok(servo), Ok(board)) => (servo, board),
            _ => {
                println!("No servo {}", index);
                return;
            }
        };

        let velocity = servo.motor().angular_velocity();
        println!("====== Servo {} '{}' ======", index, servo.name());
        println!(
            "Position: {} steps ({:.3} rad)",
            servo.encoder().position_steps(),
            servo.encoder().position_radians()
        );
        println!(
            "Velocity: {:.3} RPM ({:.3} rad/s)",
            rad_s_to_rpm(velocity),
            velocity
        );
        println!(
            "Control: motor {} / latched {}",
            servo.motor().control_signal(),
            board.control()
        );
        println!(
            "CAN: 0x{:03X} {}, cached encoder {} steps",
            board.can_id(),
            if board.has_can() { "up" } else { "down" },
            board.cached_encoder_steps()
        );
    }

    fn print_prompt(&self) {
        print!("servo> ");
        let _ = io::stdout().flush();
    }

    /// Handle one command line; returns false when the loop should exit
    fn process_command(&self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return true;
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "control" => self.handle_control(&args),
            "stop" => self.handle_stop(&args),
            "status" => {
                let index = args.first().and_then(|a| a.parse().ok()).unwrap_or(0);
                self.print_status(index);
            }
            "list" => self.print_fleet_info(),
            "reset" => self.handle_reset(&args),
            "help" => self.print_help(),
            "quit" | "exit" => {
                println!("Shutting down...");
                self.running.store(false, Ordering::Relaxed);
                return false;
            }
            unknown => {
                println!("Unknown command: {}", unknown);
                println!("Type 'help' for available commands");
            }
        }
        true
    }

    fn handle_control(&self, args: &[&str]) {
        let (Some(index), Some(value)) = (
            args.first().and_then(|a| a.parse::<usize>().ok()),
            args.get(1).and_then(|a| a.parse::<i8>().ok()),
        ) else {
            println!("Usage: control <servo> <value>  (value in -127..127)");
            return;
        };

        match self.fleet.lock().set_control(index, value) {
            Ok(()) => println!("Servo {}: latched control {}", index, value),
            Err(e) => println!("{}", e),
        }
    }

    fn handle_stop(&self, args: &[&str]) {
        let fleet = self.fleet.lock();
        match args.first() {
            Some(arg) => match arg.parse::<usize>() {
                Ok(index) => match fleet.stop_servo(index) {
                    Ok(()) => println!("Servo {} stopped", index),
                    Err(e) => println!("{}", e),
                },
                Err(_) => println!("Usage: stop [servo]"),
            },
            None => {
                for index in 0..fleet.servo_count() {
                    let _ = fleet.stop_servo(index);
                }
                println!("All servos stopped");
            }
        }
    }

    fn handle_reset(&self, args: &[&str]) {
        let Some(index) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
            println!("Usage: reset <servo>");
            return;
        };

        let fleet = self.fleet.lock();
        match fleet.servo(index) {
            Ok(servo) => {
                // Park the latch first so the motor does not re-spin on the
                // next control_update tick.
                let _ = fleet.stop_servo(index);
                servo.reset();
                println!("Servo {} reset", index);
            }
            Err(e) => println!("{}", e),
        }
    }
}
