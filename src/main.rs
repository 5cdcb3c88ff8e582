//! ServoSim - Multi-servo CAN board simulator daemon

use parking_lot::Mutex;
use servosim::ui::TerminalUi;
use servosim::{config, Fleet, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("ServoSim v{} starting...", env!("CARGO_PKG_VERSION"));

    // Get config path from args or default
    let config_path = env::args().nth(1).unwrap_or_else(|| "servos.json".to_string());
    log::info!("Using fleet config: {}", config_path);

    let configs = config::load_fleet(&config_path)?;

    let mut fleet = Fleet::from_configs(&configs)?;
    fleet.start();
    let fleet = Arc::new(Mutex::new(fleet));

    let running = Arc::new(AtomicBool::new(true));

    // Signal handler thread for graceful shutdown
    let signal_running = Arc::clone(&running);
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {:?}, initiating shutdown...", signal);
                signal_running.store(false, Ordering::Relaxed);
            }
        })?;

    // Terminal frontend on its own thread; it may stay parked on stdin
    // after a signal-driven shutdown, which is fine because the process
    // exits once the stop sequence below completes.
    let ui = TerminalUi::new(Arc::clone(&fleet), Arc::clone(&running));
    thread::Builder::new()
        .name("terminal-ui".to_string())
        .spawn(move || ui.run())?;

    // Main loop - wait for quit command or signal
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    fleet.lock().stop();
    log::info!("ServoSim stopped");

    Ok(())
}
