// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::{db::jobdb::JobExt, AppState};

/// Completes delivered, paid jobs whose approval window has passed. Catches
/// jobs whose delayed task was lost to a restart.
pub async fn start_auto_approve_sweep(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.auto_approve_sweep_secs.max(1)));

    loop {
        interval.tick().await;

        let candidates = match app_state
            .db_client
            .get_auto_approve_candidates(app_state.env.auto_approve_delay_secs)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("Auto-approve sweep failed to load jobs: {}", e);
                continue;
            }
        };

        if candidates.is_empty() {
            continue;
        }

        tracing::info!("Auto-approve sweep at {} found {} jobs", Utc::now(), candidates.len());

        for job in candidates {
            match app_state.job_service.auto_approve(job.id).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!("Job {} no longer eligible for auto-approval", job.display_id),
                Err(e) => tracing::error!("Auto-approval of {} failed: {}", job.display_id, e),
            }
        }
    }
}

/// One-off reconciliation of push payments left pending by a restart.
pub async fn reconcile_pending_payments(app_state: Arc<AppState>) {
    match app_state.settlement_service.reconcile_pending_pushes().await {
        Ok(0) => tracing::debug!("No pending push payments to reconcile"),
        Ok(resolved) => tracing::info!("Reconciled {} pending push payments", resolved),
        Err(e) => tracing::error!("Payment reconciliation failed: {}", e),
    }
}
