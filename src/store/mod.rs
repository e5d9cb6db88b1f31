//! Relational persistence over SQLite.
//!
//! All queries are runtime-prepared so the crate builds without a live
//! database. The schema is created on connect; every statement is idempotent.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{Cluster, Deployment, DeploymentStatus, Organization, User};
use crate::scheduler::StatusLedger;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        organization_id INTEGER REFERENCES organizations(id)
    )",
    "CREATE TABLE IF NOT EXISTS organizations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        invite_code TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS clusters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        total_cpu INTEGER NOT NULL,
        total_ram INTEGER NOT NULL,
        total_gpu INTEGER NOT NULL,
        available_cpu INTEGER NOT NULL,
        available_ram INTEGER NOT NULL,
        available_gpu INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS deployments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        image_path TEXT NOT NULL,
        cpu_required INTEGER NOT NULL,
        ram_required INTEGER NOT NULL,
        gpu_required INTEGER NOT NULL,
        priority INTEGER NOT NULL UNIQUE,
        cluster_id INTEGER NOT NULL REFERENCES clusters(id),
        status TEXT NOT NULL
    )",
];

/// Parameters for a new deployment row.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub name: String,
    pub image_path: String,
    pub cpu_required: i64,
    pub ram_required: i64,
    pub gpu_required: i64,
    pub priority: i64,
    pub cluster_id: i64,
}

/// Entity store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the database and create the schema if needed.
    pub async fn connect(url: &str) -> HypervisorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> HypervisorResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // --- users ---

    pub async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
    ) -> HypervisorResult<User> {
        let result = sqlx::query("INSERT INTO users (username, hashed_password) VALUES (?, ?)")
            .bind(username)
            .bind(hashed_password)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_as(e, "Username already exists"))?;
        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            hashed_password: hashed_password.to_string(),
            organization_id: None,
        })
    }

    pub async fn find_user_by_username(&self, username: &str) -> HypervisorResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, hashed_password, organization_id FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn set_user_organization(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> HypervisorResult<()> {
        sqlx::query("UPDATE users SET organization_id = ? WHERE id = ?")
            .bind(organization_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- organizations ---

    pub async fn create_organization(
        &self,
        name: &str,
        invite_code: &str,
    ) -> HypervisorResult<Organization> {
        let result = sqlx::query("INSERT INTO organizations (name, invite_code) VALUES (?, ?)")
            .bind(name)
            .bind(invite_code)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_as(e, "Organization with the given name already exists"))?;
        Ok(Organization {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            invite_code: invite_code.to_string(),
        })
    }

    pub async fn find_organization_by_invite(
        &self,
        invite_code: &str,
    ) -> HypervisorResult<Option<Organization>> {
        let organization = sqlx::query_as::<_, Organization>(
            "SELECT id, name, invite_code FROM organizations WHERE invite_code = ?",
        )
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(organization)
    }

    // --- clusters ---

    pub async fn create_cluster(
        &self,
        name: &str,
        total_ram: i64,
        total_cpu: i64,
        total_gpu: i64,
    ) -> HypervisorResult<Cluster> {
        let result = sqlx::query(
            "INSERT INTO clusters
                (name, total_cpu, total_ram, total_gpu, available_cpu, available_ram, available_gpu)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(total_cpu)
        .bind(total_ram)
        .bind(total_gpu)
        .bind(total_cpu)
        .bind(total_ram)
        .bind(total_gpu)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_as(e, "Cluster with the given name already exists"))?;
        Ok(Cluster {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            total_cpu,
            total_ram,
            total_gpu,
            available_cpu: total_cpu,
            available_ram: total_ram,
            available_gpu: total_gpu,
        })
    }

    /// Look a cluster up by id, name, or both.
    pub async fn find_cluster(
        &self,
        id: Option<i64>,
        name: Option<&str>,
    ) -> HypervisorResult<Option<Cluster>> {
        let cluster = sqlx::query_as::<_, Cluster>(
            "SELECT id, name, total_cpu, total_ram, total_gpu,
                    available_cpu, available_ram, available_gpu
             FROM clusters WHERE id = ? OR name = ?",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cluster)
    }

    // --- deployments ---

    /// Insert a deployment in the Pending state.
    pub async fn create_deployment(&self, new: &NewDeployment) -> HypervisorResult<Deployment> {
        let status = DeploymentStatus::Pending;
        let result = sqlx::query(
            "INSERT INTO deployments
                (name, image_path, cpu_required, ram_required, gpu_required,
                 priority, cluster_id, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.image_path)
        .bind(new.cpu_required)
        .bind(new.ram_required)
        .bind(new.gpu_required)
        .bind(new.priority)
        .bind(new.cluster_id)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_as(e, "Priority should be unique"))?;
        Ok(Deployment {
            id: result.last_insert_rowid(),
            name: new.name.clone(),
            image_path: new.image_path.clone(),
            cpu_required: new.cpu_required,
            ram_required: new.ram_required,
            gpu_required: new.gpu_required,
            priority: new.priority,
            cluster_id: new.cluster_id,
            status,
        })
    }

    /// Look a deployment up by id, name, or both.
    pub async fn find_deployment(
        &self,
        id: Option<i64>,
        name: Option<&str>,
    ) -> HypervisorResult<Option<Deployment>> {
        let deployment = sqlx::query_as::<_, Deployment>(
            "SELECT id, name, image_path, cpu_required, ram_required, gpu_required,
                    priority, cluster_id, status
             FROM deployments WHERE id = ? OR name = ?",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deployment)
    }

    /// Commit the outcome of one scheduling pass in a single transaction:
    /// the cluster's availability, the scheduled deployment's own row, and
    /// the ledger's batch of status updates. The ledger is applied last and
    /// wins when it covers the same deployment.
    pub async fn apply_pass(
        &self,
        cluster: &Cluster,
        deployment: &Deployment,
        ledger: &StatusLedger,
    ) -> HypervisorResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE clusters SET available_cpu = ?, available_ram = ?, available_gpu = ?
             WHERE id = ?",
        )
        .bind(cluster.available_cpu)
        .bind(cluster.available_ram)
        .bind(cluster.available_gpu)
        .bind(cluster.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE deployments SET status = ? WHERE id = ?")
            .bind(deployment.status)
            .bind(deployment.id)
            .execute(&mut *tx)
            .await?;

        for (deployment_id, status) in ledger.updates() {
            sqlx::query("UPDATE deployments SET status = ? WHERE id = ?")
                .bind(status)
                .bind(deployment_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Map a unique-constraint violation to a conflict with a caller-facing
/// message; pass every other database error through unchanged.
fn conflict_as(err: sqlx::Error, message: &str) -> HypervisorError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            HypervisorError::Conflict(message.to_string())
        }
        _ => err.into(),
    }
}
