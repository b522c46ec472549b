use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::{PaymentGateway, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5 * 60),
            max_consecutive_failures: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// Emitted for the first status and whenever it differs from the last one.
    StatusChanged(TransactionStatus),
    GaveUp { failures: u32 },
    TimedOut,
}

/// Poll `transaction_id` until a terminal status, the failure threshold or
/// the overall timeout, whichever comes first.
///
/// `emit` returning `false` stops the loop. The first poll happens one
/// interval after the call. Both timers live in this future, so dropping or
/// aborting it cancels them together.
pub async fn poll_transaction<F>(
    gateway: Arc<dyn PaymentGateway>,
    transaction_id: String,
    config: PollConfig,
    mut emit: F,
) where
    F: FnMut(PollEvent) -> bool + Send,
{
    let started = Instant::now();
    let deadline = started + config.timeout;
    let timeout = tokio::time::sleep_until(deadline);
    tokio::pin!(timeout);
    let mut ticker = tokio::time::interval_at(started + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last: Option<TransactionStatus> = None;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = &mut timeout => {
                tracing::info!(%transaction_id, "payment polling timed out");
                emit(PollEvent::TimedOut);
                return;
            }
            _ = ticker.tick() => {}
        }

        let polled = tokio::time::timeout_at(
            deadline,
            gateway.transaction_status(&transaction_id),
        )
        .await;
        let result = match polled {
            Ok(result) => result,
            Err(_) => {
                tracing::info!(%transaction_id, "payment polling timed out mid-request");
                emit(PollEvent::TimedOut);
                return;
            }
        };

        match result {
            Ok(status) => {
                failures = 0;
                if last.as_ref() == Some(&status) {
                    continue;
                }
                tracing::debug!(%transaction_id, status = status.as_str(), "payment status changed");
                last = Some(status.clone());
                let terminal = status.is_terminal();
                if !emit(PollEvent::StatusChanged(status)) || terminal {
                    return;
                }
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(%transaction_id, failures, %err, "payment status poll failed");
                // Only transport and 5xx failures are worth another attempt.
                if !err.is_transient() || failures >= config.max_consecutive_failures {
                    emit(PollEvent::GaveUp { failures });
                    return;
                }
            }
        }
    }
}
