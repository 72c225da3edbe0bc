use crate::fairness::RollValue;
use crate::games::dice::{BetParameters, Direction, WinChance};
use crate::types::{Amount, Currency, OwnerId, SignedAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One batch of identical dice bets, already authenticated and decoded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchRequest {
    pub owner: OwnerId,
    /// Replaces the stored client seed before the first roll
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_seed_override: Option<String>,
    pub win_chance: WinChance,
    pub direction: Direction,
    pub bet_amount: Amount,
    pub currency: Currency,
    pub count: u32,
}

impl BatchRequest {
    pub fn new(
        owner: OwnerId,
        win_chance: WinChance,
        direction: Direction,
        bet_amount: Amount,
        currency: Currency,
        count: u32,
    ) -> Self {
        Self {
            owner,
            client_seed_override: None,
            win_chance,
            direction,
            bet_amount,
            currency,
            count,
        }
    }

    pub fn with_client_seed(mut self, client_seed: impl Into<String>) -> Self {
        self.client_seed_override = Some(client_seed.into());
        self
    }
}

/// How a batch ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every requested bet was placed
    Completed,
    /// Stopped because the player or the house could not cover the next bet
    HaltedInsufficientFunds,
    /// Stopped by the caller between two bets
    Cancelled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::HaltedInsufficientFunds => write!(f, "halted_insufficient_funds"),
            BatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single placed bet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetRecord {
    /// 1-based position in the batch
    pub index: u32,
    pub nonce: u64,
    pub roll: RollValue,
    pub won: bool,
    /// Player-perspective result of this bet
    pub delta: SignedAmount,
}

/// Outcome of a batch, carrying everything needed to verify it after a reveal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub owner: OwnerId,
    pub currency: Currency,
    pub bet_amount: Amount,
    pub wins: u32,
    pub losses: u32,
    pub net_amount: SignedAmount,
    pub stopped_early: bool,
    /// 1-based ordinal of the first bet that was not placed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_index: Option<u32>,
    pub status: BatchStatus,
    pub params: BetParameters,
    pub server_seed_commitment: String,
    pub client_seed: String,
    /// Nonce of the first roll; rolls used `first_nonce..first_nonce + bets_placed()`
    pub first_nonce: u64,
    pub rolls: Vec<BetRecord>,
    pub settled_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn bets_placed(&self) -> u32 {
        self.wins + self.losses
    }

    /// Nonces consumed by this batch, in order
    pub fn nonces(&self) -> impl Iterator<Item = u64> + '_ {
        self.rolls.iter().map(|bet| bet.nonce)
    }
}
