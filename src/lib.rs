//! Fairdice - Provably Fair Dice Betting Core
//!
//! Commit/reveal server seeds, HMAC-derived rolls, dice payout setup,
//! batched bet execution, and an atomic player/house ledger.
//!
//! ```no_run
//! use fairdice::{BatchRequest, Currency, DiceCasino, DiceConfig, Direction, OwnerId};
//!
//! # async fn demo() -> fairdice::DiceResult<()> {
//! let casino = DiceCasino::new(DiceConfig::development())?;
//! let owner = OwnerId::new("alice");
//! casino.open_account(&owner).await?;
//!
//! let request = BatchRequest::new(owner, "49.5".parse()?, Direction::RollUnder, "1".parse()?, Currency::Play, 10);
//! let result = casino.process_batch(&request).await?;
//! println!("net {} after {} bets", result.net_amount, result.bets_placed());
//! # Ok(())
//! # }
//! ```

pub mod casino;
pub mod config;
pub mod errors;
pub mod fairness;
pub mod games;
pub mod ledger;
pub mod types;

pub use casino::DiceCasino;
pub use config::{ConfigLoader, DiceConfig, SettlementPolicy};
pub use errors::{ConfigurationError, DiceError, DiceResult};
pub use fairness::{
    verify_commitment, verify_roll, FairRollEngine, RevealedSeed, RollOutcome, RollValue, SeedManager, SeedPair,
    SeedState,
};
pub use games::{
    BatchRequest, BatchResult, BatchStatus, BetBatchExecutor, BetParameters, BetRecord, DiceSetupCalculator,
    Direction, PayoutMultiplier, WinChance,
};
pub use ledger::{Ledger, Reservation};
pub use types::{AccountId, Amount, Currency, OwnerId, SignedAmount};
