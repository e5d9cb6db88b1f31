//! REST API server

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::models::*;
use crate::auth;
use crate::config::AppConfig;
use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{DeploymentStatus, User};
use crate::scheduler::Scheduler;
use crate::store::{NewDeployment, Store};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<AppConfig>,
}

/// REST API server
pub struct RestApiServer {
    state: AppState,
}

impl RestApiServer {
    /// Create a new REST API server
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::root))
            .route("/users/register", post(Self::register_user))
            .route("/users/login", post(Self::login_user))
            .route("/organizations/create", post(Self::create_organization))
            .route("/organizations/join", post(Self::join_organization))
            .route("/clusters/create", post(Self::create_cluster))
            .route("/clusters/get_cluster", get(Self::get_cluster))
            .route("/deployments/create", post(Self::create_deployment))
            .route("/deployments/get_deployment", get(Self::get_deployment))
            .route("/deployments/complete", post(Self::finish_deployment))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    async fn root() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "message": "Welcome to the Hypervisor service" }))
    }

    /// Resolve the bearer token to a registered user.
    async fn authorize(state: &AppState, headers: &HeaderMap) -> HypervisorResult<User> {
        let token = auth::bearer_token(headers)?;
        let claims = auth::verify_token(token, &state.config.auth)?;
        state
            .store
            .find_user_by_username(&claims.sub)
            .await?
            .ok_or_else(|| HypervisorError::NotFound("User".to_string()))
    }

    // --- users ---

    async fn register_user(
        State(state): State<AppState>,
        Json(request): Json<UserCredentials>,
    ) -> HypervisorResult<Json<UserResponse>> {
        let hashed = auth::hash_password(&request.password)?;
        let user = state.store.create_user(&request.username, &hashed).await?;
        Ok(Json(user.into()))
    }

    async fn login_user(
        State(state): State<AppState>,
        Json(request): Json<UserCredentials>,
    ) -> HypervisorResult<Json<TokenResponse>> {
        let user = state
            .store
            .find_user_by_username(&request.username)
            .await?
            .ok_or_else(|| HypervisorError::NotFound("User".to_string()))?;
        if !auth::verify_password(&request.password, &user.hashed_password)? {
            return Err(HypervisorError::Unauthorized(
                "Invalid credentials".to_string(),
            ));
        }
        let access_token = auth::issue_token(&user.username, &state.config.auth)?;
        Ok(Json(TokenResponse {
            id: user.id,
            username: user.username,
            access_token,
            token_type: "bearer".to_string(),
        }))
    }

    // --- organizations ---

    async fn create_organization(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(request): Json<CreateOrganizationRequest>,
    ) -> HypervisorResult<Json<OrganizationResponse>> {
        Self::authorize(&state, &headers).await?;
        let invite_code = format!("org-{}", Uuid::new_v4());
        let organization = state
            .store
            .create_organization(&request.name, &invite_code)
            .await?;
        Ok(Json(organization.into()))
    }

    async fn join_organization(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(params): Query<JoinOrganizationParams>,
    ) -> HypervisorResult<Json<JoinOrganizationResponse>> {
        let user = Self::authorize(&state, &headers).await?;
        let organization = state
            .store
            .find_organization_by_invite(&params.invite_code)
            .await?
            .ok_or_else(|| HypervisorError::Validation("Invalid invite code".to_string()))?;
        state
            .store
            .set_user_organization(user.id, organization.id)
            .await?;
        Ok(Json(JoinOrganizationResponse {
            message: format!(
                "User {} joined organization {}",
                user.username, organization.name
            ),
        }))
    }

    // --- clusters ---

    async fn create_cluster(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(request): Json<CreateClusterRequest>,
    ) -> HypervisorResult<Json<ClusterResponse>> {
        Self::authorize(&state, &headers).await?;
        if request.total_ram < 0 || request.total_cpu < 0 || request.total_gpu < 0 {
            return Err(HypervisorError::Validation(
                "Cluster capacities must be non-negative".to_string(),
            ));
        }
        let cluster = state
            .store
            .create_cluster(
                &request.name,
                request.total_ram,
                request.total_cpu,
                request.total_gpu,
            )
            .await?;
        Ok(Json(cluster.into()))
    }

    async fn get_cluster(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(params): Query<EntityLookupParams>,
    ) -> HypervisorResult<Json<ClusterResponse>> {
        if params.id.is_none() && params.name.is_none() {
            return Err(HypervisorError::Validation(
                "Either 'id' or 'name' must be provided".to_string(),
            ));
        }
        Self::authorize(&state, &headers).await?;
        let cluster = state
            .store
            .find_cluster(params.id, params.name.as_deref())
            .await?
            .ok_or_else(|| HypervisorError::NotFound("Cluster".to_string()))?;
        if let (Some(id), Some(name)) = (params.id, params.name.as_deref()) {
            if cluster.id != id || cluster.name != name {
                return Err(HypervisorError::Validation(
                    "Given cluster id and cluster name do not correspond to the same cluster"
                        .to_string(),
                ));
            }
        }
        Ok(Json(cluster.into()))
    }

    // --- deployments ---

    async fn create_deployment(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(request): Json<CreateDeploymentRequest>,
    ) -> HypervisorResult<Json<DeploymentResponse>> {
        Self::authorize(&state, &headers).await?;
        Self::validate_deployment_request(&request)?;

        // Serialize against every other pass over this cluster; held until
        // the pass outcome is committed.
        let _guard = state.scheduler.lock_cluster(request.cluster_id).await;

        let mut cluster = state
            .store
            .find_cluster(Some(request.cluster_id), None)
            .await?
            .ok_or_else(|| HypervisorError::NotFound("Cluster".to_string()))?;
        if request.ram_required > cluster.total_ram
            || request.cpu_required > cluster.total_cpu
            || request.gpu_required > cluster.total_gpu
        {
            return Err(HypervisorError::CapacityExceeded(
                "Not enough resources on the cluster for this deployment".to_string(),
            ));
        }

        let mut deployment = state
            .store
            .create_deployment(&NewDeployment {
                name: request.name,
                image_path: request.image_path,
                cpu_required: request.cpu_required,
                ram_required: request.ram_required,
                gpu_required: request.gpu_required,
                priority: request.priority,
                cluster_id: request.cluster_id,
            })
            .await?;

        let ledger = state
            .scheduler
            .new_deploy(&mut cluster, &mut deployment)
            .await?;
        state
            .store
            .apply_pass(&cluster, &deployment, &ledger)
            .await?;

        // Re-read: backfill may have promoted the newcomer after parking it.
        let deployment = state
            .store
            .find_deployment(Some(deployment.id), None)
            .await?
            .ok_or_else(|| {
                HypervisorError::Internal("Deployment vanished after commit".to_string())
            })?;
        Ok(Json(deployment.into()))
    }

    async fn get_deployment(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(params): Query<EntityLookupParams>,
    ) -> HypervisorResult<Json<DeploymentResponse>> {
        if params.id.is_none() && params.name.is_none() {
            return Err(HypervisorError::Validation(
                "Either 'id' or 'name' must be provided".to_string(),
            ));
        }
        Self::authorize(&state, &headers).await?;
        let deployment = state
            .store
            .find_deployment(params.id, params.name.as_deref())
            .await?
            .ok_or_else(|| HypervisorError::NotFound("Deployment".to_string()))?;
        Ok(Json(deployment.into()))
    }

    async fn finish_deployment(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(params): Query<EntityLookupParams>,
    ) -> HypervisorResult<Json<DeploymentResponse>> {
        if params.id.is_none() && params.name.is_none() {
            return Err(HypervisorError::Validation(
                "Either 'id' or 'name' must be provided".to_string(),
            ));
        }
        Self::authorize(&state, &headers).await?;

        // First read only locates the target cluster.
        let located = state
            .store
            .find_deployment(params.id, params.name.as_deref())
            .await?
            .ok_or_else(|| HypervisorError::NotFound("Deployment".to_string()))?;

        let _guard = state.scheduler.lock_cluster(located.cluster_id).await;

        // Re-read under the cluster lock; the status may have moved.
        let mut deployment = state
            .store
            .find_deployment(Some(located.id), None)
            .await?
            .ok_or_else(|| HypervisorError::NotFound("Deployment".to_string()))?;
        if deployment.status != DeploymentStatus::Running {
            return Err(HypervisorError::Conflict(
                "Only running deployments can be completed".to_string(),
            ));
        }
        let mut cluster = state
            .store
            .find_cluster(Some(deployment.cluster_id), None)
            .await?
            .ok_or_else(|| HypervisorError::NotFound("Cluster".to_string()))?;

        let ledger = state
            .scheduler
            .complete_deploy(&mut cluster, &mut deployment)
            .await?;
        state
            .store
            .apply_pass(&cluster, &deployment, &ledger)
            .await?;
        Ok(Json(deployment.into()))
    }

    fn validate_deployment_request(request: &CreateDeploymentRequest) -> HypervisorResult<()> {
        if request.name.contains('|') || request.image_path.contains('|') {
            return Err(HypervisorError::Validation(
                "Name and image path must not contain '|'".to_string(),
            ));
        }
        if request.ram_required < 0 || request.cpu_required < 0 || request.gpu_required < 0 {
            return Err(HypervisorError::Validation(
                "Resource demands must be non-negative".to_string(),
            ));
        }
        if request.priority <= 0 {
            return Err(HypervisorError::Validation(
                "Priority must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
