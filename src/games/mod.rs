//! Dice game: bet setup, batch request/result types, and the batch executor.

pub mod batch;
pub mod dice;
pub mod types;

pub use batch::BetBatchExecutor;
pub use dice::{BetParameters, DiceSetupCalculator, Direction, PayoutMultiplier, WinChance};
pub use types::*;
