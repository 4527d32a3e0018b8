//! Connection pool - bounded, recycled sessions per expert
//!
//! Each expert gets a lazily created slot holding a semaphore sized to
//! `max_sessions_per_expert` and a stack of idle connections. A [`Lease`]
//! owns both the connection and its permit, so a connection is held by at
//! most one caller and an expert never has more than `cap` sessions out.

use chrono::{DateTime, Utc};
use conclave_core::ExpertId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::config::PoolSettings;
use crate::connector::ExpertConnector;
use crate::registry::ExpertRegistry;
use crate::{GatewayError, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Active,
    Broken,
}

/// A session to one expert
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub expert_id: ExpertId,
    pub state: ConnectionState,
    /// Caller-supplied tag of the current (or last) holder
    pub tag: String,
    pub created_at: DateTime<Utc>,
    last_used: Instant,
}

impl Connection {
    fn open(expert_id: &ExpertId, tag: &str) -> Self {
        Self {
            id: format!("conn-{}-{}", expert_id, Uuid::new_v4().simple()),
            expert_id: expert_id.clone(),
            state: ConnectionState::Active,
            tag: tag.to_string(),
            created_at: Utc::now(),
            last_used: Instant::now(),
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }
}

/// Exclusive use of one pooled connection. Return it with
/// [`ConnectionPool::release`]; dropping a lease destroys the connection.
#[derive(Debug)]
pub struct Lease {
    connection: Connection,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn id(&self) -> &str {
        &self.connection.id
    }

    pub fn expert_id(&self) -> &ExpertId {
        &self.connection.expert_id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The session failed mid-use; it will be evicted instead of reused
    pub fn mark_broken(&mut self) {
        self.connection.state = ConnectionState::Broken;
    }
}

struct ExpertSlot {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
    created: AtomicU64,
    evicted: AtomicU64,
    reused: AtomicU64,
}

impl ExpertSlot {
    fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(Vec::new()),
            created: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Pop the most recently used healthy connection, evicting stale ones
    fn take_idle(&self, idle_timeout: Duration) -> Option<Connection> {
        let mut idle = self.idle.lock();
        while let Some(conn) = idle.pop() {
            if conn.state == ConnectionState::Broken || conn.idle_for() > idle_timeout {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Evicting connection {} ({:?})", conn.id, conn.state);
                continue;
            }
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Some(conn);
        }
        None
    }
}

/// Per-expert pool statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub expert_id: ExpertId,
    pub active: usize,
    pub idle: usize,
    pub capacity: usize,
    pub created: u64,
    pub evicted: u64,
    pub reused: u64,
}

impl PoolStats {
    pub fn is_saturated(&self) -> bool {
        self.active >= self.capacity
    }
}

/// Connection pool shared by the planner and the handoff coordinator
pub struct ConnectionPool {
    registry: Arc<ExpertRegistry>,
    connector: Arc<dyn ExpertConnector>,
    settings: PoolSettings,
    connect_timeout: Duration,
    slots: Mutex<HashMap<ExpertId, Arc<ExpertSlot>>>,
}

impl ConnectionPool {
    pub fn new(
        registry: Arc<ExpertRegistry>,
        connector: Arc<dyn ExpertConnector>,
        settings: PoolSettings,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connector,
            settings,
            connect_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `expert_id` is a registered expert
    pub fn knows(&self, expert_id: &ExpertId) -> bool {
        self.registry.contains(expert_id)
    }

    pub fn capacity(&self) -> usize {
        self.settings.max_sessions_per_expert
    }

    fn slot(&self, expert_id: &ExpertId) -> Arc<ExpertSlot> {
        self.slots
            .lock()
            .entry(expert_id.clone())
            .or_insert_with(|| Arc::new(ExpertSlot::new(self.settings.max_sessions_per_expert)))
            .clone()
    }

    /// Acquire a session to `expert_id`, waiting up to the acquire timeout
    /// for a free slot
    pub async fn acquire(&self, expert_id: &ExpertId, tag: &str) -> Result<Lease> {
        let expert = self
            .registry
            .get(expert_id)
            .ok_or_else(|| GatewayError::UnknownExpert(expert_id.to_string()))?;

        let slot = self.slot(expert_id);
        let permit = match tokio::time::timeout(
            self.settings.acquire_timeout(),
            slot.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(GatewayError::Internal(format!(
                    "pool slot for {} closed",
                    expert_id
                )))
            }
            Err(_) => {
                tracing::warn!("Pool exhausted for {} (tag {})", expert_id, tag);
                return Err(GatewayError::PoolExhausted {
                    expert: expert_id.to_string(),
                    capacity: self.capacity(),
                });
            }
        };

        if let Some(mut connection) = slot.take_idle(self.settings.idle_timeout()) {
            connection.state = ConnectionState::Active;
            connection.tag = tag.to_string();
            connection.last_used = Instant::now();
            tracing::debug!("Reusing connection {} for {}", connection.id, tag);
            return Ok(Lease {
                connection,
                _permit: permit,
            });
        }

        match tokio::time::timeout(self.connect_timeout, self.connector.open(expert)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(GatewayError::ExpertTimeout {
                    expert: expert_id.to_string(),
                    timeout: self.connect_timeout,
                })
            }
        }

        slot.created.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::open(expert_id, tag);
        tracing::debug!(
            "Opened connection {} via {} connector",
            connection.id,
            self.connector.name()
        );
        Ok(Lease {
            connection,
            _permit: permit,
        })
    }

    /// Return a lease. Broken connections are parked and evicted on the
    /// next acquire for the same expert.
    pub fn release(&self, lease: Lease) {
        let Lease {
            mut connection,
            _permit,
        } = lease;
        if connection.state != ConnectionState::Broken {
            connection.state = ConnectionState::Idle;
        }
        connection.last_used = Instant::now();

        let slot = self.slot(&connection.expert_id);
        slot.idle.lock().push(connection);
        // permit drops here, after the connection is visible to the next acquirer
    }

    /// Destroy all idle connections of an expert
    pub fn evict_expert(&self, expert_id: &ExpertId) -> usize {
        let Some(slot) = self.slots.lock().get(expert_id).cloned() else {
            return 0;
        };
        let evicted = {
            let mut idle = slot.idle.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        slot.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        if evicted > 0 {
            tracing::info!("Evicted {} idle connections for {}", evicted, expert_id);
        }
        evicted
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        let slots: Vec<_> = self
            .slots
            .lock()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut stats: Vec<_> = slots
            .into_iter()
            .map(|(expert_id, slot)| PoolStats {
                expert_id,
                active: self
                    .capacity()
                    .saturating_sub(slot.semaphore.available_permits()),
                idle: slot.idle.lock().len(),
                capacity: self.capacity(),
                created: slot.created.load(Ordering::Relaxed),
                evicted: slot.evicted.load(Ordering::Relaxed),
                reused: slot.reused.load(Ordering::Relaxed),
            })
            .collect();
        stats.sort_by(|a, b| a.expert_id.cmp(&b.expert_id));
        stats
    }
}
