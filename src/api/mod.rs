//! HTTP transport layer
//!
//! Request/response models plus the REST router. The transport validates
//! inputs, loads entities, invokes the scheduler under the cluster lock, and
//! commits the pass outcome in one store transaction.

pub mod models;
pub mod rest;

pub use rest::{AppState, RestApiServer};
