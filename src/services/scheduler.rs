//! Daily generation scheduler
//!
//! Optional background task that runs a full batch generation pass at the
//! refresh hour every day. Sleeps until the next refresh instant, runs,
//! then recomputes the next instant; a failed run is logged and the loop
//! keeps going.

use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::services::generator::{shared_expiry, GenerationTarget, GeneratorService};

/// Spawn the daily generation loop
pub fn spawn_generation_task(generator: Arc<GeneratorService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = shared_expiry(Local::now());
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            info!(next_run = %next, "Scheduler sleeping until next refresh");
            tokio::time::sleep(wait).await;

            match generator.generate(GenerationTarget::Batch).await {
                Ok(report) => {
                    info!(processed = report.processed, "Scheduled generation run complete");
                }
                Err(e) => {
                    error!(error = %e, "Scheduled generation run failed");
                }
            }
        }
    })
}
