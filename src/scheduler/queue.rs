//! Queue store adapter: ordered sets keyed by serialized deployments.
//!
//! Each cluster owns three sets (running, pending-a, pending-b). The member
//! is the pipe-joined serialization of the deployment; the score is its
//! priority. Priorities are strictly unique, so min/max pops never tie.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{HypervisorError, HypervisorResult};
use crate::model::Deployment;

/// Number of pipe-joined fields in a queue member.
const KEY_FIELDS: usize = 9;

/// Serialize a deployment into its queue member form.
///
/// Free-text fields must not contain `|`; the transport layer rejects such
/// input before it can reach a queue.
pub fn encode_key(deployment: &Deployment) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}",
        deployment.id,
        deployment.image_path,
        deployment.cpu_required,
        deployment.ram_required,
        deployment.gpu_required,
        deployment.priority,
        deployment.cluster_id,
        deployment.status,
        deployment.name,
    )
}

/// Parse a queue member back into a deployment.
pub fn parse_key(key: &str) -> HypervisorResult<Deployment> {
    let fields: Vec<&str> = key.split('|').collect();
    if fields.len() != KEY_FIELDS {
        return Err(HypervisorError::InvariantViolation(format!(
            "Queue key has {} fields, expected {KEY_FIELDS}: {key}",
            fields.len()
        )));
    }
    let int_field = |index: usize, label: &str| {
        fields[index].parse::<i64>().map_err(|_| {
            HypervisorError::InvariantViolation(format!(
                "Queue key field {label} is not an integer: {}",
                fields[index]
            ))
        })
    };
    Ok(Deployment {
        id: int_field(0, "id")?,
        image_path: fields[1].to_string(),
        cpu_required: int_field(2, "cpu_required")?,
        ram_required: int_field(3, "ram_required")?,
        gpu_required: int_field(4, "gpu_required")?,
        priority: int_field(5, "priority")?,
        cluster_id: int_field(6, "cluster_id")?,
        status: crate::model::DeploymentStatus::from_str(fields[7])?,
        name: fields[8].to_string(),
    })
}

/// Ordered-set names for one cluster's scheduler state.
///
/// The pending sets are double-buffered: backfill drains the active one into
/// the other, which becomes the active set for the next pass. Which set is
/// active is observed, never stored.
#[derive(Debug, Clone)]
pub struct ClusterQueues {
    pub running: String,
    pub pending_active: String,
    pub pending_temp: String,
}

impl ClusterQueues {
    /// Resolve the set names for `cluster_id`, observing which pending set
    /// currently holds entries. When both are empty, pending-a is active.
    pub async fn resolve(store: &dyn QueueStore, cluster_id: i64) -> HypervisorResult<Self> {
        let running = format!("cluster:{cluster_id}:running");
        let pending_a = format!("cluster:{cluster_id}:pending-a");
        let pending_b = format!("cluster:{cluster_id}:pending-b");
        if store.size(&pending_b).await? > 0 {
            Ok(Self {
                running,
                pending_active: pending_b,
                pending_temp: pending_a,
            })
        } else {
            Ok(Self {
                running,
                pending_active: pending_a,
                pending_temp: pending_b,
            })
        }
    }
}

/// Ordered-set facade backing the running and pending queues.
///
/// Entries are `(member, score)` pairs with the deployment's priority as the
/// score. Every operation is atomic on its own; the scheduler never needs a
/// multi-operation transaction.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Number of entries in the set.
    async fn size(&self, set: &str) -> HypervisorResult<u64>;
    /// Insert the member, or update its score if already present.
    async fn add(&self, set: &str, member: &str, score: i64) -> HypervisorResult<()>;
    /// Remove the member, returning how many entries were removed (0 or 1).
    async fn remove(&self, set: &str, member: &str) -> HypervisorResult<u64>;
    /// Remove and return the highest-scored entry.
    async fn pop_max(&self, set: &str) -> HypervisorResult<Option<(String, i64)>>;
    /// Remove and return the lowest-scored entry.
    async fn pop_min(&self, set: &str) -> HypervisorResult<Option<(String, i64)>>;
}

/// Redis-backed queue store.
#[derive(Clone)]
pub struct RedisQueueStore {
    connection: ConnectionManager,
}

impl RedisQueueStore {
    /// Connect and build a managed connection.
    pub async fn connect(url: &str) -> HypervisorResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn size(&self, set: &str) -> HypervisorResult<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.zcard(set).await?;
        Ok(count)
    }

    async fn add(&self, set: &str, member: &str, score: i64) -> HypervisorResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.zadd(set, member, score).await?;
        Ok(())
    }

    async fn remove(&self, set: &str, member: &str) -> HypervisorResult<u64> {
        let mut conn = self.connection.clone();
        let removed: u64 = conn.zrem(set, member).await?;
        Ok(removed)
    }

    async fn pop_max(&self, set: &str) -> HypervisorResult<Option<(String, i64)>> {
        let mut conn = self.connection.clone();
        let popped: Vec<(String, i64)> = conn.zpopmax(set, 1).await?;
        Ok(popped.into_iter().next())
    }

    async fn pop_min(&self, set: &str) -> HypervisorResult<Option<(String, i64)>> {
        let mut conn = self.connection.clone();
        let popped: Vec<(String, i64)> = conn.zpopmin(set, 1).await?;
        Ok(popped.into_iter().next())
    }
}

/// In-memory queue store for tests and single-node development runs.
///
/// Scores map to members one-to-one because priorities are unique.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    sets: Mutex<HashMap<String, BTreeMap<i64, String>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a set's `(member, score)` entries in ascending score order.
    pub fn members(&self, set: &str) -> Vec<(String, i64)> {
        let sets = self.sets.lock();
        sets.get(set)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn size(&self, set: &str) -> HypervisorResult<u64> {
        let sets = self.sets.lock();
        Ok(sets.get(set).map_or(0, |entries| entries.len() as u64))
    }

    async fn add(&self, set: &str, member: &str, score: i64) -> HypervisorResult<()> {
        let mut sets = self.sets.lock();
        let entries = sets.entry(set.to_string()).or_default();
        entries.retain(|_, existing| existing != member);
        entries.insert(score, member.to_string());
        Ok(())
    }

    async fn remove(&self, set: &str, member: &str) -> HypervisorResult<u64> {
        let mut sets = self.sets.lock();
        let Some(entries) = sets.get_mut(set) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|_, existing| existing != member);
        Ok((before - entries.len()) as u64)
    }

    async fn pop_max(&self, set: &str) -> HypervisorResult<Option<(String, i64)>> {
        let mut sets = self.sets.lock();
        let Some(entries) = sets.get_mut(set) else {
            return Ok(None);
        };
        Ok(entries.pop_last().map(|(score, member)| (member, score)))
    }

    async fn pop_min(&self, set: &str) -> HypervisorResult<Option<(String, i64)>> {
        let mut sets = self.sets.lock();
        let Some(entries) = sets.get_mut(set) else {
            return Ok(None);
        };
        Ok(entries.pop_first().map(|(score, member)| (member, score)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::DeploymentStatus;
    use proptest::prelude::*;

    fn deployment() -> Deployment {
        Deployment {
            id: 42,
            name: "billing-api".to_string(),
            image_path: "registry.internal/billing:v3".to_string(),
            cpu_required: 4,
            ram_required: 16,
            gpu_required: 0,
            priority: 7,
            cluster_id: 3,
            status: DeploymentStatus::Running,
        }
    }

    #[test]
    fn key_roundtrip() {
        let original = deployment();
        let parsed = parse_key(&encode_key(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn key_field_order_is_stable() {
        assert_eq!(
            encode_key(&deployment()),
            "42|registry.internal/billing:v3|4|16|0|7|3|Running|billing-api"
        );
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(parse_key("1|2|3").is_err());
        assert!(parse_key("x|img|1|1|1|1|1|Running|name").is_err());
        assert!(parse_key("1|img|1|1|1|1|1|Sleeping|name").is_err());
    }

    #[tokio::test]
    async fn memory_store_pops_in_score_order() {
        let store = MemoryQueueStore::new();
        store.add("s", "low", 1).await.unwrap();
        store.add("s", "high", 9).await.unwrap();
        store.add("s", "mid", 5).await.unwrap();

        assert_eq!(store.size("s").await.unwrap(), 3);
        assert_eq!(
            store.pop_max("s").await.unwrap(),
            Some(("high".to_string(), 9))
        );
        assert_eq!(
            store.pop_min("s").await.unwrap(),
            Some(("low".to_string(), 1))
        );
        assert_eq!(store.size("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_store_remove_reports_count() {
        let store = MemoryQueueStore::new();
        store.add("s", "member", 1).await.unwrap();

        assert_eq!(store.remove("s", "member").await.unwrap(), 1);
        assert_eq!(store.remove("s", "member").await.unwrap(), 0);
        assert_eq!(store.remove("absent", "member").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_store_add_moves_existing_member() {
        let store = MemoryQueueStore::new();
        store.add("s", "member", 1).await.unwrap();
        store.add("s", "member", 8).await.unwrap();

        assert_eq!(store.size("s").await.unwrap(), 1);
        assert_eq!(
            store.pop_max("s").await.unwrap(),
            Some(("member".to_string(), 8))
        );
    }

    proptest! {
        // Round-trip law over the nine serialized fields, for any free-text
        // fields the transport would accept (no pipes).
        #[test]
        fn key_roundtrip_holds(
            id in 0i64..1_000_000,
            image in "[a-zA-Z0-9_./:-]{1,40}",
            cpu in 0i64..10_000,
            ram in 0i64..10_000,
            gpu in 0i64..10_000,
            priority in 1i64..1_000_000,
            cluster_id in 0i64..10_000,
            name in "[a-zA-Z0-9_.-]{1,40}",
            status_index in 0usize..3,
        ) {
            let status = [
                DeploymentStatus::Pending,
                DeploymentStatus::Running,
                DeploymentStatus::Completed,
            ][status_index];
            let original = Deployment {
                id,
                name,
                image_path: image,
                cpu_required: cpu,
                ram_required: ram,
                gpu_required: gpu,
                priority,
                cluster_id,
                status,
            };
            let parsed = parse_key(&encode_key(&original)).unwrap();
            prop_assert_eq!(parsed, original);
        }
    }
}
