//! Main AUV-side executable entry point.
//!
//! # Architecture
//!
//! The executable wires up the process-wide services (bus, clock, entity
//! registry, maneuver lock, active-loop mask) and spawns one OS thread per
//! task:
//!
//!     - Vehicle supervisor (operating mode arbitration)
//!     - Entity monitor (health aggregation)
//!     - Path controller with optional bottom tracker
//!     - Maneuver tasks: Loiter, StationKeeping, Goto, Idle
//!
//! All cross-task communication goes over the in-process bus. Sensor and
//! actuator driver tasks are external collaborators and attach to the same
//! bus in deployments that carry them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use auv_exec::{app::App, config::Config};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(name = "auv_exec", about = "Onboard AUV control runtime")]
struct Opt {
    /// Path to the configuration file.
    #[structopt(parse(from_os_str))]
    config: PathBuf,

    /// Configuration profile to apply (e.g. "Simulation" or "Hardware").
    #[structopt(short, long)]
    profile: Option<String>,

    /// Run for this many seconds then shut down in order; zero runs until
    /// interrupted.
    #[structopt(short, long, default_value = "0")]
    duration: f64,
}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Poll period of the main wait loop.
const WAIT_POLL_PERIOD_MS: u64 = 200;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("auv_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Triton AUV Executable");
    info!("Running on: {}", host::get_platform());
    info!("Session directory: {:?}", session.session_root);

    // ---- LOAD CONFIGURATION ----

    let config = Config::load(&opt.config, opt.profile.as_deref())
        .wrap_err("Could not load the configuration")?;

    info!(
        "Configuration loaded from {:?} (profile: {})",
        opt.config,
        opt.profile.as_deref().unwrap_or("none")
    );

    // ---- INSTALL SIGNAL HANDLER ----

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        })
        .wrap_err("Failed to install the interrupt handler")?;
    }

    // ---- SPAWN TASKS ----

    let app = App::start(&config);

    info!("All tasks spawned, system id {}", config.system_id);

    // ---- RUN ----

    let deadline = if opt.duration > 0.0 {
        Some(Instant::now() + Duration::from_secs_f64(opt.duration))
    } else {
        None
    };

    loop {
        if interrupted.load(Ordering::Relaxed) {
            info!("Interrupt received, shutting down");
            break;
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!("Requested duration elapsed, shutting down");
                break;
            }
        }

        thread::sleep(Duration::from_millis(WAIT_POLL_PERIOD_MS));
    }

    // Tasks unwind in reverse start order
    app.stop();

    info!("End of execution");

    Ok(())
}
