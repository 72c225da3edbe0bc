//! Provably fair rolling: seed commitments, reveal, and roll derivation.

pub mod cipher;
pub mod roll;
pub mod seeds;
pub mod store;

pub use cipher::SeedCipher;
pub use roll::{commitment_for, verify_commitment, verify_roll, FairRollEngine, RollOutcome, RollValue, ROLL_DOMAIN};
pub use seeds::{ActiveSeedPair, RevealedSeed, SeedManager, SeedPair, SeedSession};
pub use store::{InMemorySeedStore, SeedState, SeedStore, StoredSeed};
