use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::core::state::AppState;
use crate::models::peer::InfoHash;
use crate::stores::access_list::ListKind;
use crate::wal::wal::{compact, WalOperation};

/// Summary of what a WAL replay restored
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub operations: usize,
    pub completed_swarms: usize,
    pub access_changes: usize,
    /// Lines left in the log after compaction
    pub retained: usize,
}

// this runs at boot time, before any listener is bound
pub async fn apply_wal_operations(
    state: &AppState,
    operations: &[WalOperation],
) -> Result<ReplaySummary> {
    let mut completed: HashMap<InfoHash, u64> = HashMap::new();
    let mut access_changes = 0;
    let lists = state.access.lists();

    // Access changes are replayed in log order; completions only need their totals
    for op in operations {
        match op {
            WalOperation::Completed { info_hash } => {
                *completed.entry(*info_hash).or_insert(0) += 1;
            }
            WalOperation::CompletedTotal { info_hash, count } => {
                *completed.entry(*info_hash).or_insert(0) += count;
            }
            WalOperation::Allow { ip } => {
                lists
                    .insert(ListKind::Allow, *ip)
                    .await
                    .with_context(|| format!("Failed to replay ALLOW for {}", ip))?;
                access_changes += 1;
            }
            WalOperation::Deny { ip } => {
                lists
                    .insert(ListKind::Deny, *ip)
                    .await
                    .with_context(|| format!("Failed to replay DENY for {}", ip))?;
                access_changes += 1;
            }
            WalOperation::RemoveAccess { ip } => {
                lists
                    .remove(*ip)
                    .await
                    .with_context(|| format!("Failed to replay REMOVE_ACCESS for {}", ip))?;
                access_changes += 1;
            }
        }
    }

    for (info_hash, count) in &completed {
        state
            .swarm_store
            .restore_completed(*info_hash, *count)
            .await
            .with_context(|| format!("Failed to restore completed counter for {}", info_hash))?;
    }

    let summary = ReplaySummary {
        operations: operations.len(),
        completed_swarms: completed.len(),
        access_changes,
        retained: operations.len(),
    };

    info!(
        operations_replayed = summary.operations,
        completed_swarms = summary.completed_swarms,
        access_changes = summary.access_changes,
        "WAL replay applied"
    );

    Ok(summary)
}

/// Read the state's WAL, apply it, then rewrite it in compacted form
pub async fn restore_from_wal(state: &AppState) -> Result<ReplaySummary> {
    let operations = state.wal.replay().context("Failed to replay WAL")?;
    let mut summary = apply_wal_operations(state, &operations).await?;

    let compacted = compact(&operations);
    if compacted.len() < operations.len() {
        // State is already restored; a failed rewrite leaves the full log in place
        match state.wal.rewrite(&compacted) {
            Ok(()) => {
                summary.retained = compacted.len();
                info!(
                    before = operations.len(),
                    after = compacted.len(),
                    "WAL compacted"
                );
            }
            Err(e) => warn!(error = %e, "Failed to compact WAL"),
        }
    }

    Ok(summary)
}
