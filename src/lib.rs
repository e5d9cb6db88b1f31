//! Multi-tenant cluster workload scheduler control plane
//!
//! This crate provides an HTTP control plane that:
//! - Registers compute clusters with fixed RAM/CPU/GPU capacities
//! - Admits named deployments with integer demands and unique priorities
//! - Preempts lower-priority running work when a higher-priority deployment
//!   arrives, and backfills pending work whenever capacity frees up
//! - Commits each scheduling pass (cluster availability + status changes)
//!   to the relational store in one transaction
//! - Manages users and organizations behind bearer-token authentication

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod store;

pub use config::AppConfig;
pub use error::{HypervisorError, HypervisorResult};
pub use model::{Cluster, Deployment, DeploymentStatus, Organization, User};
pub use scheduler::{Scheduler, StatusLedger};
pub use store::Store;
