//! Shared fixtures and assertion helpers for the integration tests.
//!
//! The assertion helpers are pure: they take a snapshot of directory records
//! and report what is wrong with it, if anything.

#![allow(dead_code)]

use duet_relay::config::{Backend as StorageBackend, Config, StorageConfig};
use duet_relay::notifier::MockNotifier;
use duet_relay::storage::{Directory, MemoryDirectory, SqliteDirectory};
use duet_relay::PairRelay;
use duet_types::{PeerState, UserId, UserRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Which directory backend a fixture runs on.
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Sqlite,
}

pub const BACKENDS: [Backend; 2] = [Backend::Memory, Backend::Sqlite];

pub async fn relay_on(backend: Backend) -> (Arc<PairRelay>, MockNotifier) {
    let directory: Arc<dyn Directory> = match backend {
        Backend::Memory => Arc::new(MemoryDirectory::new()),
        Backend::Sqlite => Arc::new(SqliteDirectory::in_memory().await.unwrap()),
    };
    let notifier = MockNotifier::new();
    let relay = PairRelay::new(Config::default(), directory, Arc::new(notifier.clone()));
    (Arc::new(relay), notifier)
}

/// A relay over a SQLite file with a real connection pool, so directory
/// transactions interleave. Keep the returned dir alive for the test.
pub async fn relay_on_file(max_connections: u32) -> (Arc<PairRelay>, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage = StorageConfig {
        backend: StorageBackend::Sqlite,
        database: dir.path().join("duet.db"),
        max_connections,
    };
    let directory = SqliteDirectory::new(&config.storage).await.unwrap();
    let relay = PairRelay::new(config, Arc::new(directory), Arc::new(MockNotifier::new()));
    (Arc::new(relay), dir)
}

pub fn uid(n: i64) -> UserId {
    UserId::new(n)
}

pub async fn record(relay: &PairRelay, id: UserId) -> UserRecord {
    relay
        .directory()
        .get(id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no record for {id}"))
}

pub async fn snapshot(relay: &PairRelay, ids: impl IntoIterator<Item = UserId>) -> Vec<UserRecord> {
    let mut records = Vec::new();
    for id in ids {
        if let Some(r) = relay.directory().get(id).await.unwrap() {
            records.push(r);
        }
    }
    records
}

/// Every pairing points both ways, nobody partners themself, and only
/// paired users carry a partner.
pub fn check_pairing_symmetry(records: &[UserRecord]) -> Result<(), String> {
    let by_id: HashMap<UserId, &UserRecord> = records.iter().map(|r| (r.id, r)).collect();

    for r in records {
        r.check_local_invariants().map_err(|e| e.to_string())?;
        match (r.state, r.partner_id) {
            (PeerState::Paired, Some(p)) => {
                let other = by_id
                    .get(&p)
                    .ok_or_else(|| format!("{} paired with unknown {}", r.id, p))?;
                if !other.is_paired_with(r.id) {
                    return Err(format!(
                        "{} -> {} but {} is {} with partner {:?}",
                        r.id, p, p, other.state, other.partner_id
                    ));
                }
            }
            (PeerState::Paired, None) => return Err(format!("{} paired without partner", r.id)),
            (_, Some(p)) => return Err(format!("{} is {} but has partner {}", r.id, r.state, p)),
            (_, None) => {}
        }
    }
    Ok(())
}

/// Number of records in `state`.
pub fn count(records: &[UserRecord], state: PeerState) -> usize {
    records.iter().filter(|r| r.state == state).count()
}
