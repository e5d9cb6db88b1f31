//! Entity model shared by the store, the scheduler, and the HTTP surface.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::HypervisorError;

/// Lifecycle state of a deployment.
///
/// `Completed` is terminal; a completed deployment holds no resources and no
/// queue entry. The string form of each variant is part of the queue-key
/// wire format, so the `Display`/`FromStr` pair must stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "PascalCase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeploymentStatus::Pending => "Pending",
            DeploymentStatus::Running => "Running",
            DeploymentStatus::Completed => "Completed",
        };
        f.write_str(label)
    }
}

impl FromStr for DeploymentStatus {
    type Err = HypervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(DeploymentStatus::Pending),
            "Running" => Ok(DeploymentStatus::Running),
            "Completed" => Ok(DeploymentStatus::Completed),
            other => Err(HypervisorError::InvariantViolation(format!(
                "Unknown deployment status: {other}"
            ))),
        }
    }
}

/// Registered operator account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// PHC-format password hash; never serialized out
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub organization_id: Option<i64>,
}

/// Tenant organization joined by invite code
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub invite_code: String,
}

/// A capacity envelope in three resource dimensions.
///
/// `total_*` is immutable after creation; `available_*` is mutated only by
/// the resource accountant and always satisfies `0 <= available <= total`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub total_cpu: i64,
    pub total_ram: i64,
    pub total_gpu: i64,
    pub available_cpu: i64,
    pub available_ram: i64,
    pub available_gpu: i64,
}

/// A named workload descriptor with integer resource demands and a globally
/// unique priority (higher value preempts lower).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Deployment {
    pub id: i64,
    pub name: String,
    pub image_path: String,
    pub cpu_required: i64,
    pub ram_required: i64,
    pub gpu_required: i64,
    pub priority: i64,
    pub cluster_id: i64,
    pub status: DeploymentStatus,
}
