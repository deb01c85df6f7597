//! `hemobank daemon`: Run the assignment cycle on its cron schedule.

use std::sync::Arc;

use hemobank_workflow::{CronExpr, DailyTrigger};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::{CliResult, Runtime, assign};

pub async fn run() -> CliResult {
    let rt = Runtime::load().await?;

    if !rt.config.scheduler.enabled {
        println!("Scheduler is disabled in config; nothing to run.");
        println!("Use `hemobank assign` for a one-off cycle.");
        return Ok(());
    }

    let schedule = CronExpr::parse(&rt.config.scheduler.schedule)?;
    println!("HemoBank Daemon — starting");
    println!("   Store:    {}", rt.store.name());
    println!("   Schedule: {schedule}");

    let mut events = rt.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(?event, "Domain event"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trigger = DailyTrigger::new(Arc::new(assign::scheduler(&rt)), schedule);
    let handle = trigger.start(shutdown_rx);
    info!("Daily trigger started");

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    let _ = shutdown_tx.send(true);
    handle.await?;

    println!("HemoBank Daemon — stopped");
    Ok(())
}
