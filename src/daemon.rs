use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

use deskflow::clock::Clock;
use deskflow::config::Config;
use deskflow::scheduler::{Job, Scheduler};

use crate::commands::Service;

/// Run the scheduler in the foreground until SIGINT or SIGTERM.
pub fn run(service: &Service, config: &Config) -> Result<()> {
    let schedule = config.schedule()?;
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("Failed to register signal handler")?;
    }

    let mut scheduler = Scheduler::new(&schedule, service.clock().now());
    if let Some(due) = scheduler.next_due(Job::AutoClose) {
        println!(
            "Scheduler running: sweep every {} min, auto-close daily at {} UTC (next {})",
            schedule.sweep_every.num_minutes(),
            schedule.auto_close_at.format("%H:%M"),
            due.format("%Y-%m-%d %H:%M")
        );
    }

    scheduler.run(service, &shutdown);
    info!("daemon exiting");
    Ok(())
}
