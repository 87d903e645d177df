//! Background reconciliation of stale pending payments.
//!
//! Callbacks can be lost (browser closed before the return URL, IPN
//! delivery failure), leaving a payment pending forever. The sweeper
//! periodically asks the provider about every pending payment older
//! than the reconcile window and settles the ones it has an answer for.

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vigil_db::repositories::PaymentRepository;

use crate::AppState;

/// Runs the reconciliation sweep on a fixed interval, forever. Spawn
/// this once at startup.
pub async fn run_sweeper(state: AppState) {
    let every = state
        .vnpay
        .reconcile_after()
        .to_std()
        .unwrap_or_else(|_| std::time::Duration::from_secs(900));

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep(&state).await;
    }
}

/// One sweep: query the provider for every stale pending payment and
/// settle those it recognizes.
async fn sweep(state: &AppState) {
    let payments = PaymentRepository::new((*state.db).clone());
    let now = Utc::now();
    let cutoff = now - state.vnpay.reconcile_after();

    let stale = match payments.find_stale_pending(cutoff).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to list stale pending payments");
            return;
        }
    };
    if stale.is_empty() {
        return;
    }

    info!(count = stale.len(), "Reconciling stale pending payments");

    for payment in stale {
        let created_at = payment.created_at.with_timezone(&Utc);
        match state
            .vnpay
            .query_transaction(&payment.provider_ref, created_at, now)
            .await
        {
            Ok(Some(code)) => {
                match payments
                    .resolve_from_provider(&payment.provider_ref, &code, now)
                    .await
                {
                    Ok(settled) => info!(
                        provider_ref = %settled.provider_ref,
                        response_code = %code,
                        "Stale payment settled from provider"
                    ),
                    Err(e) => error!(
                        error = %e,
                        provider_ref = %payment.provider_ref,
                        "Failed to settle stale payment"
                    ),
                }
            }
            // Provider answered but does not know the transaction yet;
            // the next sweep retries.
            Ok(None) => debug!(
                provider_ref = %payment.provider_ref,
                "Provider has no answer for stale payment yet"
            ),
            Err(e) => {
                warn!(error = %e, "Provider unavailable; abandoning this sweep");
                return;
            }
        }
    }
}
