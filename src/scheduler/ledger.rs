//! Per-pass record of effective status transitions.

use std::collections::HashMap;

use crate::model::{Deployment, DeploymentStatus};

/// Accumulates `deployment_id -> (original_status, current_status)` over one
/// scheduling pass. An entry whose transition nets out to its starting
/// status is dropped, so the flushed batch carries only effective changes.
///
/// The original side is the status the deployment held when it first entered
/// the pass, not the status at its latest mutation; a deployment demoted and
/// re-promoted within one pass therefore cancels out entirely.
#[derive(Debug, Default)]
pub struct StatusLedger {
    changes: HashMap<i64, (DeploymentStatus, DeploymentStatus)>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an intended transition of `deployment` to `new_status`.
    pub fn record(&mut self, deployment: &Deployment, new_status: DeploymentStatus) {
        let original = self
            .changes
            .get(&deployment.id)
            .map(|(original, _)| *original)
            .unwrap_or(deployment.status);
        if original == new_status {
            self.changes.remove(&deployment.id);
        } else {
            self.changes.insert(deployment.id, (original, new_status));
        }
    }

    /// The `(id, final_status)` batch to flush to the store.
    pub fn updates(&self) -> Vec<(i64, DeploymentStatus)> {
        self.changes
            .iter()
            .map(|(id, (_, current))| (*id, *current))
            .collect()
    }

    /// The recorded transition for one deployment, if any.
    pub fn get(&self, deployment_id: i64) -> Option<(DeploymentStatus, DeploymentStatus)> {
        self.changes.get(&deployment_id).copied()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::Deployment;

    fn deployment(id: i64, status: DeploymentStatus) -> Deployment {
        Deployment {
            id,
            name: format!("d{id}"),
            image_path: "registry/app:latest".to_string(),
            cpu_required: 1,
            ram_required: 1,
            gpu_required: 1,
            priority: id,
            cluster_id: 1,
            status,
        }
    }

    #[test]
    fn first_record_captures_entry_status() {
        let mut ledger = StatusLedger::new();
        let running = deployment(7, DeploymentStatus::Running);

        ledger.record(&running, DeploymentStatus::Pending);

        assert_eq!(
            ledger.get(7),
            Some((DeploymentStatus::Running, DeploymentStatus::Pending))
        );
    }

    #[test]
    fn roundtrip_transition_cancels_out() {
        let mut ledger = StatusLedger::new();
        let running = deployment(7, DeploymentStatus::Running);

        ledger.record(&running, DeploymentStatus::Pending);
        // The deployment was parsed back off the pending queue; its entry
        // status here is Pending, but the ledger must keep the original.
        let pending = deployment(7, DeploymentStatus::Pending);
        ledger.record(&pending, DeploymentStatus::Running);

        assert!(ledger.is_empty());
    }

    #[test]
    fn updates_carry_the_final_status() {
        let mut ledger = StatusLedger::new();
        ledger.record(
            &deployment(1, DeploymentStatus::Running),
            DeploymentStatus::Pending,
        );
        ledger.record(
            &deployment(2, DeploymentStatus::Pending),
            DeploymentStatus::Running,
        );

        let mut updates = ledger.updates();
        updates.sort_by_key(|(id, _)| *id);
        assert_eq!(
            updates,
            vec![
                (1, DeploymentStatus::Pending),
                (2, DeploymentStatus::Running)
            ]
        );
    }
}
