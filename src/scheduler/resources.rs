//! Resource accounting for a cluster aggregate.
//!
//! Pure arithmetic over the in-memory cluster; no I/O. The scheduler is
//! responsible for checking `fits` before calling `reserve`.

use crate::model::{Cluster, Deployment, DeploymentStatus};

/// Whether the cluster's current availability covers every dimension of the
/// deployment's demand.
pub fn fits(cluster: &Cluster, deployment: &Deployment) -> bool {
    cluster.available_ram >= deployment.ram_required
        && cluster.available_cpu >= deployment.cpu_required
        && cluster.available_gpu >= deployment.gpu_required
}

/// Claim the deployment's demand from the cluster and mark it Running.
pub fn reserve(cluster: &mut Cluster, deployment: &mut Deployment) {
    cluster.available_ram -= deployment.ram_required;
    cluster.available_cpu -= deployment.cpu_required;
    cluster.available_gpu -= deployment.gpu_required;
    deployment.status = DeploymentStatus::Running;
}

/// Return a previously reserved demand to the cluster. The deployment's
/// status is left for the caller to decide (Pending on preemption,
/// Completed on retirement).
pub fn release(cluster: &mut Cluster, deployment: &Deployment) {
    cluster.available_ram += deployment.ram_required;
    cluster.available_cpu += deployment.cpu_required;
    cluster.available_gpu += deployment.gpu_required;
}
