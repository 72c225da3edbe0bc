//! Dice casino facade.
//!
//! Wires the seed manager, ledger, and batch executor together from one
//! [`DiceConfig`] and exposes the operations offered to the account, request,
//! and history collaborators.

use crate::config::DiceConfig;
use crate::errors::DiceResult;
use crate::fairness::{InMemorySeedStore, RevealedSeed, SeedManager, SeedPair, SeedStore};
use crate::games::{BatchRequest, BatchResult, BetBatchExecutor};
use crate::ledger::Ledger;
use crate::types::{AccountId, Amount, Currency, OwnerId};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct DiceCasino {
    config: DiceConfig,
    seeds: Arc<SeedManager>,
    ledger: Arc<Ledger>,
    executor: BetBatchExecutor,
}

impl DiceCasino {
    /// Casino backed by an in-memory seed store
    pub fn new(config: DiceConfig) -> DiceResult<Self> {
        Self::with_store(config, Arc::new(InMemorySeedStore::new()))
    }

    pub fn with_store(config: DiceConfig, store: Arc<dyn SeedStore>) -> DiceResult<Self> {
        config.validate()?;

        let seeds = Arc::new(SeedManager::from_config(store, &config.seeds)?);
        let ledger = Arc::new(Ledger::from_config(&config.accounts)?);
        let executor = BetBatchExecutor::new(seeds.clone(), ledger.clone(), &config.game)?;

        tracing::info!(
            house_edge_bp = config.game.house_edge_bp,
            policy = ?config.game.settlement_policy,
            "Dice casino ready"
        );

        Ok(Self {
            config,
            seeds,
            ledger,
            executor,
        })
    }

    pub fn config(&self) -> &DiceConfig {
        &self.config
    }

    pub fn seeds(&self) -> &Arc<SeedManager> {
        &self.seeds
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Provision a new player: seed pair plus welcome balances. Safe to call again.
    pub async fn open_account(&self, owner: &OwnerId) -> DiceResult<SeedPair> {
        let pair = self.seeds.create(owner).await?;
        self.ledger.open_account(owner)?;
        Ok(pair)
    }

    pub fn deposit(&self, owner: &OwnerId, currency: Currency, amount: Amount) -> DiceResult<Amount> {
        self.ledger.deposit(&AccountId::player(owner), currency, amount)
    }

    pub fn balance(&self, owner: &OwnerId, currency: Currency) -> DiceResult<Amount> {
        self.ledger.balance(&AccountId::player(owner), currency)
    }

    pub fn house_balance(&self, currency: Currency) -> DiceResult<Amount> {
        self.ledger.balance(&AccountId::House, currency)
    }

    pub async fn process_batch(&self, request: &BatchRequest) -> DiceResult<BatchResult> {
        self.executor.process_batch(request).await
    }

    pub async fn process_batch_cancellable(
        &self,
        request: &BatchRequest,
        cancel: &AtomicBool,
    ) -> DiceResult<BatchResult> {
        self.executor.process_batch_cancellable(request, cancel).await
    }

    /// Disclose the current server seed; the next batch rotates to a fresh one
    pub async fn reveal_seed(&self, owner: &OwnerId) -> DiceResult<RevealedSeed> {
        self.seeds.reveal(owner).await
    }

    /// Install a new server seed and return its commitment
    pub async fn rotate_seed(&self, owner: &OwnerId, new_seed: Option<String>) -> DiceResult<String> {
        Ok(self.seeds.rotate_server_seed(owner, new_seed).await?.server_seed_commitment)
    }

    pub async fn get_commitment(&self, owner: &OwnerId) -> DiceResult<String> {
        self.seeds.commitment(owner).await
    }

    pub async fn set_client_seed(&self, owner: &OwnerId, client_seed: &str) -> DiceResult<SeedPair> {
        self.seeds.set_client_seed(owner, client_seed).await
    }

    pub async fn seed_pair(&self, owner: &OwnerId) -> DiceResult<SeedPair> {
        self.seeds.snapshot(owner).await
    }
}
