//! API request and response models
//!
//! Also maps `HypervisorError` onto HTTP responses with a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::HypervisorError;
use crate::model::{Cluster, Deployment, DeploymentStatus, Organization, User};

/// Username/password credentials for registration and login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub organization_id: Option<i64>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            organization_id: user.organization_id,
        }
    }
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub id: i64,
    pub username: String,
    pub access_token: String,
    pub token_type: String,
}

/// Create organization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

/// Organization details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationResponse {
    pub id: i64,
    pub name: String,
    pub invite_code: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(organization: Organization) -> Self {
        Self {
            id: organization.id,
            name: organization.name,
            invite_code: organization.invite_code,
        }
    }
}

/// Join organization query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct JoinOrganizationParams {
    pub invite_code: String,
}

/// Join organization outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinOrganizationResponse {
    pub message: String,
}

/// Create cluster request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    pub total_ram: i64,
    pub total_cpu: i64,
    pub total_gpu: i64,
}

/// Cluster details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResponse {
    pub id: i64,
    pub name: String,
    pub total_ram: i64,
    pub total_cpu: i64,
    pub total_gpu: i64,
    pub available_ram: i64,
    pub available_cpu: i64,
    pub available_gpu: i64,
}

impl From<Cluster> for ClusterResponse {
    fn from(cluster: Cluster) -> Self {
        Self {
            id: cluster.id,
            name: cluster.name,
            total_ram: cluster.total_ram,
            total_cpu: cluster.total_cpu,
            total_gpu: cluster.total_gpu,
            available_ram: cluster.available_ram,
            available_cpu: cluster.available_cpu,
            available_gpu: cluster.available_gpu,
        }
    }
}

/// Create deployment request. All resource quantities are integers; the
/// deserializer rejects anything else at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    pub name: String,
    pub image_path: String,
    pub cpu_required: i64,
    pub ram_required: i64,
    pub gpu_required: i64,
    pub priority: i64,
    pub cluster_id: i64,
}

/// Deployment details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResponse {
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

impl From<Deployment> for DeploymentResponse {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id,
            name: deployment.name,
            image_path: deployment.image_path,
            cpu_required: deployment.cpu_required,
            ram_required: deployment.ram_required,
            gpu_required: deployment.gpu_required,
            priority: deployment.priority,
            cluster_id: deployment.cluster_id,
            status: deployment.status,
        }
    }
}

/// Lookup parameters shared by the get/complete endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct EntityLookupParams {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for HypervisorError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            HypervisorError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            HypervisorError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            HypervisorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            HypervisorError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            HypervisorError::CapacityExceeded(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "capacity_exceeded")
            }
            HypervisorError::QueueStoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "queue_store_unavailable")
            }
            HypervisorError::Store(_)
            | HypervisorError::InvariantViolation(_)
            | HypervisorError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ApiError {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
