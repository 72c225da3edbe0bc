//! Durable seed records and the storage seam behind the seed manager.

use crate::errors::DiceResult;
use crate::types::OwnerId;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle of the active server seed: `Secret -> Revealed -> Secret(new)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeedState {
    /// Committed and in use; plaintext never leaves the store
    Secret,
    /// Plaintext has been disclosed; the next roll must rotate first
    Revealed,
}

/// Seed pair as persisted. The server seed is only ever held sealed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSeed {
    pub sealed_server_seed: String,
    pub server_seed_commitment: String,
    pub client_seed: String,
    pub nonce: u64,
    pub state: SeedState,
    /// Every commitment issued to this owner, current one included
    #[serde(default)]
    pub issued_commitments: BTreeSet<String>,
}

/// Persistence for seed pairs.
///
/// `save` must be durable when it returns: the manager hands out a nonce or
/// a rotated pair only after the write succeeds.
#[async_trait]
pub trait SeedStore: Send + Sync {
    async fn load(&self, owner: &OwnerId) -> DiceResult<Option<StoredSeed>>;

    async fn save(&self, owner: &OwnerId, record: &StoredSeed) -> DiceResult<()>;
}

/// Process-local store for tests, simulations, and the CLI
#[derive(Default)]
pub struct InMemorySeedStore {
    records: DashMap<OwnerId, StoredSeed>,
}

impl InMemorySeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SeedStore for InMemorySeedStore {
    async fn load(&self, owner: &OwnerId) -> DiceResult<Option<StoredSeed>> {
        Ok(self.records.get(owner).map(|entry| entry.value().clone()))
    }

    async fn save(&self, owner: &OwnerId, record: &StoredSeed) -> DiceResult<()> {
        self.records.insert(owner.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(nonce: u64) -> StoredSeed {
        StoredSeed {
            sealed_server_seed: "00ff".to_string(),
            server_seed_commitment: "abc".to_string(),
            client_seed: "client".to_string(),
            nonce,
            state: SeedState::Secret,
            issued_commitments: BTreeSet::from(["abc".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemorySeedStore::new();
        let owner = OwnerId::new("alice");
        assert!(store.load(&owner).await.unwrap().is_none());

        store.save(&owner, &record(3)).await.unwrap();
        assert_eq!(store.load(&owner).await.unwrap(), Some(record(3)));

        store.save(&owner, &record(4)).await.unwrap();
        assert_eq!(store.load(&owner).await.unwrap().map(|r| r.nonce), Some(4));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_serializes_without_plaintext_fields() {
        let json = serde_json::to_value(record(0)).unwrap();
        assert!(json.get("server_seed").is_none());
        assert_eq!(json["state"], "secret");
    }
}
