// retention.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::store::{StoreError, VoteLedger};

/// Deletes ledger entries older than `retention` as of `now`.
///
/// A non-positive retention would put the cutoff at or after `now` and wipe
/// live duplicate protection, so it purges nothing.
pub async fn sweep_once<L: VoteLedger>(
    ledger: &L,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    if retention <= chrono::Duration::zero() {
        warn!(%retention, "Non-positive vote retention, skipping sweep");
        return Ok(0);
    }
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        debug!(%retention, "Retention reaches past the earliest timestamp, nothing to purge");
        return Ok(0);
    };
    let purged = ledger.purge_older_than(cutoff).await?;
    if purged > 0 {
        info!(purged, %cutoff, "Purged expired vote records");
    } else {
        debug!(%cutoff, "No vote records to purge");
    }
    Ok(purged)
}

/// Runs [`sweep_once`] every `every` until the task is aborted.
///
/// Poll counters are independent running totals, so purging never touches
/// them.
pub fn spawn_retention_task<L: VoteLedger>(
    ledger: Arc<L>,
    retention: chrono::Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(ledger.as_ref(), retention, Utc::now()).await {
                error!(error = %e, "Vote retention sweep failed");
            }
        }
    })
}
