//! # Loong Simulation Binary
//!
//! Runs the driver substrate end to end against a simulated bus: device
//! slots are wired from `driver.toml`, the cycle thread exchanges process
//! data and services the mailbox channel, and an application thread drives
//! the motors and polls their temperatures.
//!
//! # Usage
//!
//! ```bash
//! # Run until Ctrl-C
//! loong_sim --config loong_driver/config/driver.toml
//!
//! # Run 5000 cycles with verbose logging
//! loong_sim -c loong_driver/config/driver.toml --cycles 5000 -v
//!
//! # JSON logs
//! loong_sim -c loong_driver/config/driver.toml --json
//! ```

#![deny(warnings)]

use clap::Parser;
use loong_common::bus::Bus;
use loong_common::config::{ConfigLoader, LogLevel};
use loong_common::consts::DEFAULT_CONFIG_PATH;
use loong_common::driver_config::DriverConfig;
use loong_driver::channel::MailboxChannel;
use loong_driver::domain::Domain;
use loong_driver::mailbox::MailboxState;
use loong_driver::sim::{CONTROL_ENABLE, SimBus, SimDevice, count_on_bus};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Loong simulation - drive the data exchange substrate against a simulated bus
#[derive(Parser, Debug)]
#[command(name = "loong_sim")]
#[command(version)]
#[command(about = "Drive the Loong data exchange substrate against a simulated bus")]
#[command(long_about = None)]
struct Args {
    /// Path to the driver configuration file (driver.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stop after this many cycles (default: run until Ctrl-C)
    #[arg(long)]
    cycles: Option<u64>,

    /// Busy polls before a simulated mailbox answers
    #[arg(long, default_value_t = 2)]
    ack_latency: u32,

    /// Application thread period in milliseconds
    #[arg(long, default_value_t = 10)]
    app_period_ms: u64,

    /// Application periods between temperature reads
    #[arg(long, default_value_t = 50)]
    read_every: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = DriverConfig::load(&args.config);
    let log_level = loaded
        .as_ref()
        .map(|config| config.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("Loong simulation v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = loaded?;
    config.validate()?;
    info!(
        "Loaded {:?} ({}): {} devices, {} motors calibrated, {} descriptors",
        args.config,
        config.shared.service_name,
        config.devices.len(),
        config.motors.len(),
        config.descriptors.len()
    );

    let channel = MailboxChannel::new(config.mailbox)?;
    let mut servicer = channel.servicer()?;
    let mut bus = SimBus::new(&config, args.ack_latency);
    let devices = bus.wire(&config)?;
    let domains: Vec<Domain> = bus.domains().cloned().collect();
    info!(
        "Wired {} device slots ({} on ECAT)",
        devices.len(),
        count_on_bus(bus.placements(), Bus::Ecat)
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let running = bus.running_flag();
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let app = {
        let channel = Arc::clone(&channel);
        let shutdown = Arc::clone(&shutdown);
        let period = Duration::from_millis(args.app_period_ms);
        let read_every = args.read_every.max(1);
        std::thread::Builder::new()
            .name("loong-app".into())
            .spawn(move || {
                application(devices, &domains, &channel, &shutdown, period, read_every)
            })?
    };

    let result = bus.run(&mut servicer, args.cycles);
    shutdown.store(true, Ordering::SeqCst);
    if app.join().is_err() {
        error!("Application thread panicked");
    }
    let timing = result?;

    let stats = channel.stats();
    info!(
        cycles = timing.cycle_count,
        violations = timing.timing_violations,
        max_cycle_us = timing.max_cycle_time_us,
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "Loong simulation shutdown complete"
    );
    Ok(())
}

/// Application thread: command motors, request temperatures, log answers.
fn application(
    mut devices: Vec<SimDevice>,
    domains: &[Domain],
    channel: &MailboxChannel,
    shutdown: &AtomicBool,
    period: Duration,
    read_every: u64,
) {
    for motor in devices.iter_mut().filter_map(SimDevice::as_motor_mut) {
        if let Err(e) = motor.set_enabled(true) {
            warn!("Cannot enable motor: {}", e);
        }
    }

    let mut tick: u64 = 0;
    while !shutdown.load(Ordering::SeqCst) {
        for motor in devices.iter_mut().filter_map(SimDevice::as_motor_mut) {
            if !motor.is_enabled() {
                continue;
            }
            let rx = motor.rx_mut();
            rx.control_word = CONTROL_ENABLE;
            rx.target_position = ((tick % 1000) as i32) * 100;
            rx.target_velocity = 0;
            rx.target_torque = 0;

            if tick % read_every == 0 {
                let actual = { motor.tx().actual_position };
                let alias = motor.identity().map_or(0, |id| id.alias);
                debug!(alias, actual, "Motor position");

                if let Some(mailbox) = motor.parameters().and_then(|p| p.mailbox) {
                    if let Err(e) = channel.submit(mailbox.temperature) {
                        warn!(alias, "Temperature request dropped: {}", e);
                    }
                }
            }
        }
        for domain in domains {
            domain.commit_rx();
        }

        while let Some(response) = channel.poll_response() {
            match response.state {
                MailboxState::Completed => info!(
                    alias = response.alias,
                    index = format_args!("{:#06x}", response.index),
                    subindex = response.subindex,
                    value = response.value,
                    "Mailbox transaction completed"
                ),
                _ => warn!(
                    alias = response.alias,
                    index = format_args!("{:#06x}", response.index),
                    failure = ?response.failure,
                    "Mailbox transaction failed"
                ),
            }
        }

        tick += 1;
        std::thread::sleep(period);
    }
    debug!("Application thread stopped after {} periods", tick);
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let directive: Directive = if args.verbose {
        Level::DEBUG.into()
    } else {
        log_level
            .as_directive()
            .parse()
            .unwrap_or_else(|_| Level::INFO.into())
    };

    let filter = EnvFilter::from_default_env().add_directive(directive);

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
