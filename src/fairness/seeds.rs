//! Seed commitment / reveal lifecycle per owner.
//!
//! Each owner has exactly one seed pair. Mutations run under a per-owner
//! async lock and are persisted through the [`SeedStore`] before any value
//! derived from them is handed out, so a `(server_seed, client_seed, nonce)`
//! triple can never be produced twice.

use crate::config::SeedConfig;
use crate::errors::{DiceError, DiceResult};
use crate::fairness::cipher::SeedCipher;
use crate::fairness::roll::commitment_for;
use crate::fairness::store::{SeedState, SeedStore, StoredSeed};
use crate::types::OwnerId;
use dashmap::DashMap;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

const SERVER_SEED_BYTES: usize = 32;

/// Public view of an owner's seed pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedPair {
    pub server_seed_commitment: String,
    pub client_seed: String,
    pub nonce: u64,
    pub state: SeedState,
    /// Present only once the seed has been revealed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_server_seed: Option<String>,
}

impl SeedPair {
    pub fn revealed(&self) -> bool {
        self.state == SeedState::Revealed
    }
}

/// Seed pair ready for rolling. Holds the plaintext server seed.
#[derive(Clone)]
pub struct ActiveSeedPair {
    server_seed: String,
    pub server_seed_commitment: String,
    pub client_seed: String,
    pub nonce: u64,
}

impl ActiveSeedPair {
    pub(crate) fn server_seed(&self) -> &str {
        &self.server_seed
    }
}

impl fmt::Debug for ActiveSeedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSeedPair")
            .field("server_seed", &"<secret>")
            .field("server_seed_commitment", &self.server_seed_commitment)
            .field("client_seed", &self.client_seed)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Result of a reveal: the plaintext and the commitment it must hash to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealedSeed {
    pub server_seed: String,
    pub server_seed_commitment: String,
    /// Nonce reached with this seed, i.e. the number of rolls it produced
    pub final_nonce: u64,
}

/// Owns every owner's seed pair
pub struct SeedManager {
    store: Arc<dyn SeedStore>,
    cipher: SeedCipher,
    locks: DashMap<OwnerId, Arc<Mutex<()>>>,
    lock_timeout: Duration,
    client_seed_bytes: usize,
}

impl SeedManager {
    pub fn new(store: Arc<dyn SeedStore>, cipher: SeedCipher, config: &SeedConfig) -> Self {
        Self {
            store,
            cipher,
            locks: DashMap::new(),
            lock_timeout: config.lock_timeout(),
            client_seed_bytes: config.default_client_seed_bytes.max(1),
        }
    }

    /// Build from configuration, decoding the seed encryption key
    pub fn from_config(store: Arc<dyn SeedStore>, config: &SeedConfig) -> DiceResult<Self> {
        let cipher = SeedCipher::new(config.encryption_key()?);
        Ok(Self::new(store, cipher, config))
    }

    /// Provision the seed pair for a new owner. Returns the existing pair if one is already there.
    pub async fn create(&self, owner: &OwnerId) -> DiceResult<SeedPair> {
        let _guard = self.acquire(owner).await?;

        if let Some(existing) = self.store.load(owner).await? {
            tracing::debug!(%owner, "Seed pair already provisioned");
            return self.public_view(&existing);
        }

        let plaintext = random_hex(SERVER_SEED_BYTES);
        let commitment = commitment_for(&plaintext);
        let record = StoredSeed {
            sealed_server_seed: self.cipher.seal(&plaintext)?,
            server_seed_commitment: commitment.clone(),
            client_seed: random_hex(self.client_seed_bytes),
            nonce: 0,
            state: SeedState::Secret,
            issued_commitments: BTreeSet::from([commitment]),
        };
        self.store.save(owner, &record).await?;

        tracing::info!(%owner, commitment = %record.server_seed_commitment, "Provisioned seed pair");
        self.public_view(&record)
    }

    /// Take the owner's seed lock for a sequence of operations
    pub async fn session(&self, owner: &OwnerId) -> DiceResult<SeedSession<'_>> {
        let guard = self.acquire(owner).await?;
        let record = self
            .store
            .load(owner)
            .await?
            .ok_or_else(|| DiceError::UnknownOwner(owner.clone()))?;

        Ok(SeedSession {
            manager: self,
            owner: owner.clone(),
            record,
            _guard: guard,
        })
    }

    /// Pair usable for rolling; rotates first if the current seed was revealed
    pub async fn get_active_seed_pair(&self, owner: &OwnerId) -> DiceResult<ActiveSeedPair> {
        self.session(owner).await?.active_pair().await
    }

    /// Replace the server seed with `new_seed` or a fresh random one
    pub async fn rotate_server_seed(&self, owner: &OwnerId, new_seed: Option<String>) -> DiceResult<SeedPair> {
        let mut session = self.session(owner).await?;
        session.rotate(new_seed).await?;
        session.snapshot()
    }

    /// Store a new client seed. The nonce keeps counting.
    pub async fn set_client_seed(&self, owner: &OwnerId, value: &str) -> DiceResult<SeedPair> {
        let mut session = self.session(owner).await?;
        session.set_client_seed(value).await?;
        session.snapshot()
    }

    /// Disclose the current server seed and mark it revealed. Idempotent.
    pub async fn reveal(&self, owner: &OwnerId) -> DiceResult<RevealedSeed> {
        let mut session = self.session(owner).await?;
        let server_seed = self.cipher.open(&session.record.sealed_server_seed)?;

        if session.record.state == SeedState::Secret {
            let mut next = session.record.clone();
            next.state = SeedState::Revealed;
            session.persist(next).await?;
            tracing::info!(
                %owner,
                commitment = %session.record.server_seed_commitment,
                final_nonce = session.record.nonce,
                "Server seed revealed"
            );
        }

        Ok(RevealedSeed {
            server_seed,
            server_seed_commitment: session.record.server_seed_commitment.clone(),
            final_nonce: session.record.nonce,
        })
    }

    /// Current commitment; always safe to publish
    pub async fn commitment(&self, owner: &OwnerId) -> DiceResult<String> {
        Ok(self.session(owner).await?.record.server_seed_commitment.clone())
    }

    /// Consume one nonce and return the new counter value
    pub async fn advance_nonce(&self, owner: &OwnerId) -> DiceResult<u64> {
        let mut session = self.session(owner).await?;
        session.reserve_nonce().await?;
        Ok(session.nonce())
    }

    /// Public view of the owner's seed pair
    pub async fn snapshot(&self, owner: &OwnerId) -> DiceResult<SeedPair> {
        self.session(owner).await?.snapshot()
    }

    async fn acquire(&self, owner: &OwnerId) -> DiceResult<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%owner, timeout_ms = self.lock_timeout.as_millis() as u64, "Seed lock timed out");
                DiceError::ConcurrencyConflict { owner: owner.clone() }
            })
    }

    fn public_view(&self, record: &StoredSeed) -> DiceResult<SeedPair> {
        let revealed_server_seed = match record.state {
            SeedState::Revealed => Some(self.cipher.open(&record.sealed_server_seed)?),
            SeedState::Secret => None,
        };

        Ok(SeedPair {
            server_seed_commitment: record.server_seed_commitment.clone(),
            client_seed: record.client_seed.clone(),
            nonce: record.nonce,
            state: record.state,
            revealed_server_seed,
        })
    }
}

/// Exclusive access to one owner's seed pair.
///
/// Batches hold a session for their whole run so that rolls of one owner
/// are strictly nonce-ordered.
pub struct SeedSession<'a> {
    manager: &'a SeedManager,
    owner: OwnerId,
    record: StoredSeed,
    _guard: OwnedMutexGuard<()>,
}

impl<'a> SeedSession<'a> {
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn nonce(&self) -> u64 {
        self.record.nonce
    }

    pub fn commitment(&self) -> &str {
        &self.record.server_seed_commitment
    }

    pub fn snapshot(&self) -> DiceResult<SeedPair> {
        self.manager.public_view(&self.record)
    }

    /// Decrypted pair for rolling, rotating away from a revealed seed first
    pub async fn active_pair(&mut self) -> DiceResult<ActiveSeedPair> {
        if self.record.state == SeedState::Revealed {
            tracing::info!(owner = %self.owner, "Active seed was revealed, rotating before use");
            self.rotate(None).await?;
        }

        Ok(ActiveSeedPair {
            server_seed: self.manager.cipher.open(&self.record.sealed_server_seed)?,
            server_seed_commitment: self.record.server_seed_commitment.clone(),
            client_seed: self.record.client_seed.clone(),
            nonce: self.record.nonce,
        })
    }

    /// Persist the incremented counter and return the nonce the caller may roll with
    pub async fn reserve_nonce(&mut self) -> DiceResult<u64> {
        if self.record.state == SeedState::Revealed {
            return Err(DiceError::InvalidSeed(
                "server seed has been revealed; rotate before rolling".to_string(),
            ));
        }

        let used = self.record.nonce;
        let mut next = self.record.clone();
        next.nonce = used
            .checked_add(1)
            .ok_or_else(|| DiceError::InvalidSeed("nonce space exhausted; rotate the server seed".to_string()))?;
        self.persist(next).await?;

        Ok(used)
    }

    pub async fn set_client_seed(&mut self, value: &str) -> DiceResult<()> {
        if value.trim().is_empty() {
            return Err(DiceError::InvalidSeed("client seed must not be empty".to_string()));
        }

        let mut next = self.record.clone();
        next.client_seed = value.to_string();
        self.persist(next).await?;

        tracing::info!(owner = %self.owner, nonce = self.record.nonce, "Client seed updated");
        Ok(())
    }

    /// Install a new server seed; resets the nonce and the revealed state
    pub async fn rotate(&mut self, new_seed: Option<String>) -> DiceResult<()> {
        let plaintext = match new_seed {
            Some(seed) if seed.trim().is_empty() => {
                return Err(DiceError::InvalidSeed("server seed must not be empty".to_string()));
            }
            Some(seed) => {
                if self.record.issued_commitments.contains(&commitment_for(&seed)) {
                    return Err(DiceError::InvalidSeed("server seed was already used".to_string()));
                }
                seed
            }
            None => loop {
                let candidate = random_hex(SERVER_SEED_BYTES);
                if !self.record.issued_commitments.contains(&commitment_for(&candidate)) {
                    break candidate;
                }
            },
        };

        let commitment = commitment_for(&plaintext);
        let mut next = self.record.clone();
        next.sealed_server_seed = self.manager.cipher.seal(&plaintext)?;
        next.server_seed_commitment = commitment.clone();
        next.nonce = 0;
        next.state = SeedState::Secret;
        next.issued_commitments.insert(commitment);
        self.persist(next).await?;

        tracing::info!(
            owner = %self.owner,
            commitment = %self.record.server_seed_commitment,
            "Server seed rotated"
        );
        Ok(())
    }

    async fn persist(&mut self, next: StoredSeed) -> DiceResult<()> {
        self.manager.store.save(&self.owner, &next).await?;
        self.record = next;
        Ok(())
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
