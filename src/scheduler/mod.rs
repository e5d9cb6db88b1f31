//! Priority-preemption scheduling core.
//!
//! Drives admission and completion passes over one cluster: the preemption
//! loop, the double-buffered pending drain (backfill), and the per-pass
//! status ledger. Queue membership lives in the queue store; the cluster
//! aggregate is mutated in memory and committed by the caller, together with
//! the ledger, in a single store transaction.

pub mod ledger;
pub mod queue;
pub mod resources;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{Cluster, Deployment, DeploymentStatus};

pub use ledger::StatusLedger;
pub use queue::{ClusterQueues, MemoryQueueStore, QueueStore, RedisQueueStore};

/// Serializes scheduling passes per cluster.
///
/// The lock must be taken before the cluster row is loaded and held until
/// the store commit finishes; concurrent passes over the same cluster could
/// otherwise double-release capacity. Passes over different clusters run in
/// parallel, since every set name and row a pass touches is scoped to one
/// cluster id.
#[derive(Debug, Default)]
struct ClusterLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ClusterLocks {
    async fn acquire(&self, cluster_id: i64) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(cluster_id).or_default().clone();
        lock.lock_owned().await
    }
}

/// The scheduling engine.
pub struct Scheduler {
    queues: Arc<dyn QueueStore>,
    locks: ClusterLocks,
}

impl Scheduler {
    pub fn new(queues: Arc<dyn QueueStore>) -> Self {
        Self {
            queues,
            locks: ClusterLocks::default(),
        }
    }

    /// Take the per-cluster pass lock. Callers hold the guard from before
    /// loading the cluster row until the store commit completes.
    pub async fn lock_cluster(&self, cluster_id: i64) -> OwnedMutexGuard<()> {
        self.locks.acquire(cluster_id).await
    }

    /// Admission pass for a newly persisted deployment.
    ///
    /// If the deployment fits as-is it starts running immediately. Otherwise
    /// running deployments of strictly lower priority are preempted, lowest
    /// first, until the newcomer fits or none remain; a newcomer that still
    /// does not fit waits in the pending queue. The pass ends with a backfill
    /// drain that promotes whatever pending work now fits.
    ///
    /// Returns the ledger of effective status changes. The newcomer itself is
    /// not routed through the ledger unless backfill promotes it; its own row
    /// is committed directly from the mutated entity.
    #[instrument(
        skip(self, cluster, deployment),
        fields(cluster_id = cluster.id, deployment_id = deployment.id, priority = deployment.priority)
    )]
    pub async fn new_deploy(
        &self,
        cluster: &mut Cluster,
        deployment: &mut Deployment,
    ) -> HypervisorResult<StatusLedger> {
        let queues = ClusterQueues::resolve(self.queues.as_ref(), cluster.id).await?;
        let mut ledger = StatusLedger::new();

        if resources::fits(cluster, deployment) {
            resources::reserve(cluster, deployment);
            self.queues
                .add(&queues.running, &queue::encode_key(deployment), deployment.priority)
                .await?;
            info!("admitted without preemption");
            return Ok(ledger);
        }

        let mut placed = false;
        while self.queues.size(&queues.running).await? > 0 {
            let (victim_key, victim_priority) = self.pop_or_bail(&queues.running, false).await?;

            if victim_priority > deployment.priority {
                // The cheapest running deployment already outranks the
                // newcomer; nothing below it is preemptible either.
                self.queues
                    .add(&queues.running, &victim_key, victim_priority)
                    .await?;
                self.queues
                    .add(
                        &queues.pending_active,
                        &queue::encode_key(deployment),
                        deployment.priority,
                    )
                    .await?;
                placed = true;
                debug!("outranked by all running work; enqueued as pending");
                break;
            }

            let mut victim = queue::parse_key(&victim_key)?;
            resources::release(cluster, &victim);
            ledger.record(&victim, DeploymentStatus::Pending);
            victim.status = DeploymentStatus::Pending;
            self.queues
                .add(
                    &queues.pending_active,
                    &queue::encode_key(&victim),
                    victim.priority,
                )
                .await?;
            debug!(
                victim_id = victim.id,
                victim_priority = victim.priority,
                "preempted running deployment"
            );

            if resources::fits(cluster, deployment) {
                resources::reserve(cluster, deployment);
                self.queues
                    .add(&queues.running, &queue::encode_key(deployment), deployment.priority)
                    .await?;
                placed = true;
                info!("admitted after preemption");
                break;
            }
        }

        if !placed {
            // The running set drained entirely without freeing enough
            // capacity; the newcomer still has to wait its turn.
            self.queues
                .add(
                    &queues.pending_active,
                    &queue::encode_key(deployment),
                    deployment.priority,
                )
                .await?;
        }

        self.drain_pending(cluster, &queues, &mut ledger).await?;
        Ok(ledger)
    }

    /// Completion pass: retire a running deployment and promote pending work
    /// into the capacity it frees.
    ///
    /// A deployment with no running-queue entry (already completed, or never
    /// admitted) leaves the cluster untouched; the membership guard keeps a
    /// repeated completion call from releasing capacity twice.
    #[instrument(
        skip(self, cluster, deployment),
        fields(cluster_id = cluster.id, deployment_id = deployment.id)
    )]
    pub async fn complete_deploy(
        &self,
        cluster: &mut Cluster,
        deployment: &mut Deployment,
    ) -> HypervisorResult<StatusLedger> {
        let queues = ClusterQueues::resolve(self.queues.as_ref(), cluster.id).await?;
        let mut ledger = StatusLedger::new();

        let removed = self
            .queues
            .remove(&queues.running, &queue::encode_key(deployment))
            .await?;
        if removed == 0 {
            debug!("no running-queue entry; nothing to release");
            return Ok(ledger);
        }

        deployment.status = DeploymentStatus::Completed;
        resources::release(cluster, deployment);
        info!("deployment completed");

        self.drain_pending(cluster, &queues, &mut ledger).await?;
        Ok(ledger)
    }

    /// Run a standalone backfill pass over a cluster.
    ///
    /// Immediately after an admission or completion pass this is a fixed
    /// point: it returns an empty ledger and changes nothing.
    pub async fn backfill(&self, cluster: &mut Cluster) -> HypervisorResult<StatusLedger> {
        let queues = ClusterQueues::resolve(self.queues.as_ref(), cluster.id).await?;
        let mut ledger = StatusLedger::new();
        self.drain_pending(cluster, &queues, &mut ledger).await?;
        Ok(ledger)
    }

    /// Drain the active pending set in descending priority order, promoting
    /// every entry that fits and parking the rest in the other pending set,
    /// which becomes the active one for the next pass.
    async fn drain_pending(
        &self,
        cluster: &mut Cluster,
        queues: &ClusterQueues,
        ledger: &mut StatusLedger,
    ) -> HypervisorResult<()> {
        while self.queues.size(&queues.pending_active).await? > 0 {
            let (key, _) = self.pop_or_bail(&queues.pending_active, true).await?;
            let mut candidate = queue::parse_key(&key)?;

            if resources::fits(cluster, &candidate) {
                ledger.record(&candidate, DeploymentStatus::Running);
                resources::reserve(cluster, &mut candidate);
                self.queues
                    .add(
                        &queues.running,
                        &queue::encode_key(&candidate),
                        candidate.priority,
                    )
                    .await?;
                debug!(
                    deployment_id = candidate.id,
                    priority = candidate.priority,
                    "promoted pending deployment"
                );
            } else {
                self.queues
                    .add(&queues.pending_temp, &key, candidate.priority)
                    .await?;
            }
        }
        Ok(())
    }

    /// Pop one entry from a set that was just observed non-empty. The pass
    /// holds the cluster lock, so an empty pop means the queue store state
    /// changed underneath us.
    async fn pop_or_bail(&self, set: &str, max: bool) -> HypervisorResult<(String, i64)> {
        let popped = if max {
            self.queues.pop_max(set).await?
        } else {
            self.queues.pop_min(set).await?
        };
        popped.ok_or_else(|| {
            HypervisorError::InvariantViolation(format!(
                "Ordered set {set} emptied out mid-pass"
            ))
        })
    }
}
