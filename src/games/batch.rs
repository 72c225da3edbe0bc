//! Batch executor: runs N identical dice bets against one seed pair.
//!
//! Per bet: exposure hold, nonce reservation, roll, classification,
//! accumulation. The owner's seed session is held for the whole batch, so
//! batches of one owner never interleave and the nonces of a batch are
//! exactly `k..k+placed`.

use crate::config::{GameConfig, SettlementPolicy};
use crate::errors::{DiceError, DiceResult};
use crate::fairness::{ActiveSeedPair, FairRollEngine, SeedManager, SeedSession};
use crate::games::dice::{BetParameters, DiceSetupCalculator};
use crate::games::types::{BatchRequest, BatchResult, BatchStatus, BetRecord};
use crate::ledger::{Ledger, Reservation};
use crate::types::{AccountId, Amount, SignedAmount};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Executes bet batches and settles them against the house
pub struct BetBatchExecutor {
    seeds: Arc<SeedManager>,
    ledger: Arc<Ledger>,
    calculator: DiceSetupCalculator,
    policy: SettlementPolicy,
    max_bets_per_batch: u32,
    house: AccountId,
}

impl BetBatchExecutor {
    pub fn new(seeds: Arc<SeedManager>, ledger: Arc<Ledger>, config: &GameConfig) -> DiceResult<Self> {
        Ok(Self {
            seeds,
            ledger,
            calculator: DiceSetupCalculator::from_config(config)?,
            policy: config.settlement_policy,
            max_bets_per_batch: config.max_bets_per_batch,
            house: AccountId::House,
        })
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    pub fn calculator(&self) -> &DiceSetupCalculator {
        &self.calculator
    }

    /// Run a batch to completion or to its early-stop point
    pub async fn process_batch(&self, request: &BatchRequest) -> DiceResult<BatchResult> {
        self.process_batch_cancellable(request, &AtomicBool::new(false)).await
    }

    /// Like [`Self::process_batch`], but stops before the next bet once `cancel` is set.
    /// Bets already drawn are settled.
    pub async fn process_batch_cancellable(
        &self,
        request: &BatchRequest,
        cancel: &AtomicBool,
    ) -> DiceResult<BatchResult> {
        self.validate(request)?;

        let params = self.calculator.compute(request.win_chance, request.direction)?;
        let win_profit = params.win_profit(request.bet_amount)?;
        let player = AccountId::player(&request.owner);

        let mut session = self.seeds.session(&request.owner).await?;
        if let Some(client_seed) = &request.client_seed_override {
            session.set_client_seed(client_seed).await?;
        }
        let pair = session.active_pair().await?;

        tracing::debug!(
            owner = %request.owner,
            count = request.count,
            bet = %request.bet_amount,
            currency = %request.currency,
            params = ?params,
            "Starting batch"
        );

        let mut progress = BatchProgress {
            reservation: self.ledger.reservation(&player, &self.house, request.currency),
            win_profit,
            net: SignedAmount::ZERO,
            unsettled: SignedAmount::ZERO,
            rolls: Vec::with_capacity(request.count as usize),
            wins: 0,
            losses: 0,
        };
        let outcome = self
            .run_bets(request, &params, &pair, &mut session, &mut progress, cancel)
            .await;

        // Drawn bets are settled on every path, including a failed draw
        self.ledger.settle_reserved(&mut progress.reservation, progress.unsettled)?;
        drop(session);

        let (status, stop_index) = match outcome {
            Ok(stop) => stop,
            Err(err) => {
                tracing::error!(
                    owner = %request.owner,
                    currency = %request.currency,
                    bets_settled = progress.rolls.len(),
                    net = %progress.net,
                    error = %err,
                    "Batch interrupted after settling drawn bets"
                );
                return Err(err);
            }
        };

        tracing::info!(
            owner = %request.owner,
            currency = %request.currency,
            wins = progress.wins,
            losses = progress.losses,
            net = %progress.net,
            status = %status,
            "Batch settled"
        );

        Ok(BatchResult {
            batch_id: Uuid::new_v4(),
            owner: request.owner.clone(),
            currency: request.currency,
            bet_amount: request.bet_amount,
            wins: progress.wins,
            losses: progress.losses,
            net_amount: progress.net,
            stopped_early: status != BatchStatus::Completed,
            stop_index,
            status,
            params,
            server_seed_commitment: pair.server_seed_commitment.clone(),
            client_seed: pair.client_seed.clone(),
            first_nonce: pair.nonce,
            rolls: progress.rolls,
            settled_at: chrono::Utc::now(),
        })
    }

    /// Draw bets until the batch completes, stops early, or fails.
    ///
    /// Each bet's worst case is held on the ledger before its nonce is
    /// reserved, so a drawn bet can always be settled.
    async fn run_bets(
        &self,
        request: &BatchRequest,
        params: &BetParameters,
        pair: &ActiveSeedPair,
        session: &mut SeedSession<'_>,
        progress: &mut BatchProgress,
        cancel: &AtomicBool,
    ) -> DiceResult<(BatchStatus, Option<u32>)> {
        for index in 1..=request.count {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!(owner = %request.owner, stop_index = index, "Batch cancelled");
                return Ok((BatchStatus::Cancelled, Some(index)));
            }

            let player_exposure = exposure(SignedAmount::gain(request.bet_amount), progress.unsettled, true)?;
            let house_exposure = exposure(SignedAmount::gain(progress.win_profit), progress.unsettled, false)?;
            if !self
                .ledger
                .hold(&mut progress.reservation, player_exposure, house_exposure)?
            {
                tracing::warn!(
                    owner = %request.owner,
                    currency = %request.currency,
                    stop_index = index,
                    net = %progress.net,
                    "Insufficient funds for next bet, stopping batch early"
                );
                return Ok((BatchStatus::HaltedInsufficientFunds, Some(index)));
            }

            let nonce = session.reserve_nonce().await?;
            let outcome = FairRollEngine::roll(pair.server_seed(), &pair.client_seed, nonce)?;
            let won = params.is_win(outcome.roll);
            let delta = if won {
                SignedAmount::gain(progress.win_profit)
            } else {
                SignedAmount::loss(request.bet_amount)
            };
            progress.record(BetRecord {
                index,
                nonce,
                roll: outcome.roll,
                won,
                delta,
            })?;
            tracing::debug!(owner = %request.owner, nonce, roll = %outcome.roll, won, "Bet resolved");

            if self.policy == SettlementPolicy::SettleAsYouGo {
                self.ledger.settle_reserved(&mut progress.reservation, progress.unsettled)?;
                progress.unsettled = SignedAmount::ZERO;
            }
        }

        Ok((BatchStatus::Completed, None))
    }

    fn validate(&self, request: &BatchRequest) -> DiceResult<()> {
        if request.count == 0 || request.count > self.max_bets_per_batch {
            return Err(DiceError::InvalidAmount(format!(
                "bet count {} must be within 1..={}",
                request.count, self.max_bets_per_batch
            )));
        }
        if request.bet_amount.is_zero() {
            return Err(DiceError::InvalidAmount("bet amount must be > 0".to_string()));
        }
        Ok(())
    }

}

/// Bets drawn so far and the exposure held for them
struct BatchProgress {
    reservation: Reservation,
    win_profit: Amount,
    net: SignedAmount,
    /// Drawn but not yet written to the ledger
    unsettled: SignedAmount,
    rolls: Vec<BetRecord>,
    wins: u32,
    losses: u32,
}

impl BatchProgress {
    fn record(&mut self, bet: BetRecord) -> DiceResult<()> {
        self.net = self.net.checked_add(bet.delta).ok_or_else(net_overflow)?;
        self.unsettled = self.unsettled.checked_add(bet.delta).ok_or_else(net_overflow)?;
        if bet.won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.rolls.push(bet);
        Ok(())
    }
}

/// Worst-case amount one side owes after the next bet, given the unsettled
/// player-perspective result so far. Zero when that side is ahead.
fn exposure(next_bet: SignedAmount, unsettled: SignedAmount, player_side: bool) -> DiceResult<Amount> {
    let owed = if player_side {
        SignedAmount::from_atomic(-unsettled.atomic())
    } else {
        unsettled
    };
    let worst = owed.checked_add(next_bet).ok_or_else(net_overflow)?;
    if worst.is_negative() {
        Ok(Amount::ZERO)
    } else {
        worst.magnitude()
    }
}

fn net_overflow() -> DiceError {
    DiceError::InvalidAmount("batch net amount overflows".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedConfig;
    use crate::fairness::{InMemorySeedStore, RollValue, SeedCipher, SeedStore, StoredSeed};
    use crate::games::dice::{Direction, WinChance};
    use crate::types::{Currency, OwnerId};
    use async_trait::async_trait;

    const SERVER_SEED: &str = "batch-test-server-seed";
    const CLIENT_SEED: &str = "batch-test-client-seed";

    struct Fixture {
        executor: BetBatchExecutor,
        seeds: Arc<SeedManager>,
        ledger: Arc<Ledger>,
        owner: OwnerId,
    }

    /// Store that runs a callback before persisting a given nonce; an error from the callback fails the save
    struct HookedStore {
        inner: InMemorySeedStore,
        at_nonce: u64,
        hook: Box<dyn Fn() -> DiceResult<()> + Send + Sync>,
    }

    impl HookedStore {
        fn new(at_nonce: u64, hook: impl Fn() -> DiceResult<()> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemorySeedStore::new(),
                at_nonce,
                hook: Box::new(hook),
            })
        }
    }

    #[async_trait]
    impl SeedStore for HookedStore {
        async fn load(&self, owner: &OwnerId) -> DiceResult<Option<StoredSeed>> {
            self.inner.load(owner).await
        }

        async fn save(&self, owner: &OwnerId, record: &StoredSeed) -> DiceResult<()> {
            if record.nonce == self.at_nonce {
                (self.hook)()?;
            }
            self.inner.save(owner, record).await
        }
    }

    fn funded_ledger(player_funds: Amount, house_funds: Amount) -> Arc<Ledger> {
        let ledger = Arc::new(Ledger::new(vec![(Currency::Play, player_funds)]));
        ledger.deposit(&AccountId::House, Currency::Play, house_funds).unwrap();
        ledger
    }

    async fn fixture(policy: SettlementPolicy, player_funds: Amount, house_funds: Amount) -> Fixture {
        let ledger = funded_ledger(player_funds, house_funds);
        fixture_on(policy, ledger, Arc::new(InMemorySeedStore::new())).await
    }

    async fn fixture_on(policy: SettlementPolicy, ledger: Arc<Ledger>, store: Arc<dyn SeedStore>) -> Fixture {
        let seeds = Arc::new(SeedManager::new(store, SeedCipher::new([5u8; 32]), &SeedConfig::default()));

        let owner = OwnerId::new("alice");
        seeds.create(&owner).await.unwrap();
        seeds.rotate_server_seed(&owner, Some(SERVER_SEED.to_string())).await.unwrap();
        seeds.set_client_seed(&owner, CLIENT_SEED).await.unwrap();
        ledger.open_account(&owner).unwrap();

        let config = GameConfig {
            settlement_policy: policy,
            ..Default::default()
        };
        let executor = BetBatchExecutor::new(seeds.clone(), ledger.clone(), &config).unwrap();
        Fixture {
            executor,
            seeds,
            ledger,
            owner,
        }
    }

    fn rolls_for(nonces: std::ops::Range<u64>) -> Vec<RollValue> {
        nonces
            .map(|nonce| FairRollEngine::roll(SERVER_SEED, CLIENT_SEED, nonce).unwrap().roll)
            .collect()
    }

    /// A chance and direction under which every given roll loses
    fn losing_setup(rolls: &[RollValue]) -> (WinChance, Direction) {
        let lowest = rolls.iter().map(|r| r.hundredths()).min().unwrap();
        if lowest > 0 {
            return (WinChance::from_hundredths(lowest.min(9_800)).unwrap(), Direction::RollUnder);
        }
        let highest = rolls.iter().map(|r| r.hundredths()).max().unwrap();
        let chance = (9_999 - highest).clamp(1, 9_800);
        (WinChance::from_hundredths(chance).unwrap(), Direction::RollOver)
    }

    fn request(fx: &Fixture, chance: WinChance, direction: Direction, bet: u64, count: u32) -> BatchRequest {
        BatchRequest::new(
            fx.owner.clone(),
            chance,
            direction,
            Amount::from_whole(bet),
            Currency::Play,
            count,
        )
    }

    fn player_balance(fx: &Fixture) -> Amount {
        fx.ledger
            .balance(&AccountId::player(&fx.owner), Currency::Play)
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_losses_net_minus_fifty() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(100), Amount::from_whole(1_000_000)).await;
        let (chance, direction) = losing_setup(&rolls_for(0..5));

        let result = fx.executor.process_batch(&request(&fx, chance, direction, 10, 5)).await.unwrap();

        assert_eq!(result.wins, 0);
        assert_eq!(result.losses, 5);
        assert_eq!(result.net_amount, SignedAmount::loss(Amount::from_whole(50)));
        assert_eq!(result.status, BatchStatus::Completed);
        assert!(!result.stopped_early);
        assert_eq!(result.stop_index, None);
        assert_eq!(player_balance(&fx), Amount::from_whole(50));
        assert_eq!(
            fx.ledger.balance(&AccountId::House, Currency::Play).unwrap(),
            Amount::from_whole(1_000_050)
        );
    }

    #[tokio::test]
    async fn test_early_stop_settle_as_you_go() {
        let fx = fixture(SettlementPolicy::SettleAsYouGo, Amount::from_whole(30), Amount::from_whole(1_000_000)).await;
        let (chance, direction) = losing_setup(&rolls_for(0..3));

        let result = fx.executor.process_batch(&request(&fx, chance, direction, 10, 10)).await.unwrap();

        assert!(result.stopped_early);
        assert_eq!(result.stop_index, Some(4));
        assert_eq!(result.status, BatchStatus::HaltedInsufficientFunds);
        assert_eq!(result.losses, 3);
        assert_eq!(result.net_amount, SignedAmount::loss(Amount::from_whole(30)));
        assert_eq!(player_balance(&fx), Amount::ZERO);

        // The unplaced bet consumed no nonce
        assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().nonce, 3);
    }

    #[tokio::test]
    async fn test_early_stop_settle_at_end_matches() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(30), Amount::from_whole(1_000_000)).await;
        let (chance, direction) = losing_setup(&rolls_for(0..3));

        let result = fx.executor.process_batch(&request(&fx, chance, direction, 10, 10)).await.unwrap();

        assert_eq!(result.stop_index, Some(4));
        assert_eq!(result.net_amount, SignedAmount::loss(Amount::from_whole(30)));
        assert_eq!(player_balance(&fx), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_results_match_independent_rolls() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(1_000), Amount::from_whole(100_000)).await;
        let chance: WinChance = "49.5".parse().unwrap();
        let params = fx.executor.calculator().compute(chance, Direction::RollUnder).unwrap();
        let profit = params.win_profit(Amount::from_whole(1)).unwrap();

        let result = fx
            .executor
            .process_batch(&request(&fx, chance, Direction::RollUnder, 1, 40))
            .await
            .unwrap();

        let expected = rolls_for(0..40);
        let expected_wins = expected.iter().filter(|r| params.is_win(**r)).count() as u32;
        assert_eq!(result.wins, expected_wins);
        assert_eq!(result.losses, 40 - expected_wins);
        assert_eq!(
            result.net_amount.atomic(),
            i128::from(expected_wins) * i128::from(profit.atomic())
                - i128::from(40 - expected_wins) * i128::from(Amount::from_whole(1).atomic())
        );
        for (bet, roll) in result.rolls.iter().zip(&expected) {
            assert_eq!(bet.roll, *roll);
        }
    }

    #[tokio::test]
    async fn test_nonces_are_contiguous_across_batches() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(1_000), Amount::from_whole(100_000)).await;
        let chance: WinChance = "50".parse().unwrap();

        let first = fx.executor.process_batch(&request(&fx, chance, Direction::RollOver, 1, 7)).await.unwrap();
        let second = fx.executor.process_batch(&request(&fx, chance, Direction::RollOver, 1, 5)).await.unwrap();

        assert_eq!(first.first_nonce, 0);
        assert_eq!(first.nonces().collect::<Vec<_>>(), (0..7).collect::<Vec<_>>());
        assert_eq!(second.first_nonce, 7);
        assert_eq!(second.nonces().collect::<Vec<_>>(), (7..12).collect::<Vec<_>>());
        assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().nonce, 12);
    }

    #[tokio::test]
    async fn test_settlement_conserves_supply() {
        for policy in [SettlementPolicy::SettleAtEnd, SettlementPolicy::SettleAsYouGo] {
            let fx = fixture(policy, Amount::from_whole(200), Amount::from_whole(5_000)).await;
            let supply = fx.ledger.total_supply(Currency::Play).unwrap();
            let before = player_balance(&fx);

            let result = fx
                .executor
                .process_batch(&request(&fx, "33.33".parse().unwrap(), Direction::RollUnder, 3, 50))
                .await
                .unwrap();

            assert_eq!(fx.ledger.total_supply(Currency::Play).unwrap(), supply);
            assert_eq!(Some(player_balance(&fx)), before.checked_apply(result.net_amount));
        }
    }

    #[tokio::test]
    async fn test_house_shortfall_stops_before_first_bet() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(100), Amount::from_whole(5)).await;

        let result = fx
            .executor
            .process_batch(&request(&fx, "49.5".parse().unwrap(), Direction::RollUnder, 10, 3))
            .await
            .unwrap();

        assert_eq!(result.stop_index, Some(1));
        assert_eq!(result.bets_placed(), 0);
        assert_eq!(result.net_amount, SignedAmount::ZERO);
        assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().nonce, 0);
        assert_eq!(player_balance(&fx), Amount::from_whole(100));
    }

    #[tokio::test]
    async fn test_revealed_seed_rotates_before_batch() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(100), Amount::from_whole(1_000)).await;
        fx.executor
            .process_batch(&request(&fx, "50".parse().unwrap(), Direction::RollUnder, 1, 2))
            .await
            .unwrap();
        let revealed = fx.seeds.reveal(&fx.owner).await.unwrap();

        let result = fx
            .executor
            .process_batch(&request(&fx, "50".parse().unwrap(), Direction::RollUnder, 1, 2))
            .await
            .unwrap();

        assert_ne!(result.server_seed_commitment, revealed.server_seed_commitment);
        assert_eq!(result.first_nonce, 0);
        assert_eq!(result.client_seed, CLIENT_SEED);
    }

    #[tokio::test]
    async fn test_client_seed_override_applies_before_rolls() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(100), Amount::from_whole(1_000)).await;
        let batch = request(&fx, "50".parse().unwrap(), Direction::RollUnder, 1, 3).with_client_seed("override");

        let result = fx.executor.process_batch(&batch).await.unwrap();

        assert_eq!(result.client_seed, "override");
        for bet in &result.rolls {
            let expected = FairRollEngine::roll(SERVER_SEED, "override", bet.nonce).unwrap();
            assert_eq!(bet.roll, expected.roll);
        }
        assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().client_seed, "override");
    }

    #[tokio::test]
    async fn test_cancelled_batch_places_nothing() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(100), Amount::from_whole(1_000)).await;
        let cancel = AtomicBool::new(true);

        let result = fx
            .executor
            .process_batch_cancellable(&request(&fx, "50".parse().unwrap(), Direction::RollUnder, 1, 10), &cancel)
            .await
            .unwrap();

        assert_eq!(result.status, BatchStatus::Cancelled);
        assert!(result.stopped_early);
        assert_eq!(result.stop_index, Some(1));
        assert!(result.rolls.is_empty());
        assert_eq!(player_balance(&fx), Amount::from_whole(100));
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_settles_drawn_bets() {
        for policy in [SettlementPolicy::SettleAtEnd, SettlementPolicy::SettleAsYouGo] {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            // Raised while the third bet reserves its nonce
            let store = HookedStore::new(3, move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
            let fx = fixture_on(policy, funded_ledger(Amount::from_whole(100), Amount::from_whole(1_000_000)), store).await;
            let supply = fx.ledger.total_supply(Currency::Play).unwrap();

            let result = fx
                .executor
                .process_batch_cancellable(&request(&fx, "50".parse().unwrap(), Direction::RollUnder, 1, 10), &cancel)
                .await
                .unwrap();

            assert_eq!(result.status, BatchStatus::Cancelled);
            assert!(result.stopped_early);
            assert_eq!(result.stop_index, Some(4));
            assert_eq!(result.rolls.len(), 3);
            assert_eq!(result.nonces().collect::<Vec<_>>(), vec![0, 1, 2]);
            for (bet, roll) in result.rolls.iter().zip(rolls_for(0..3)) {
                assert_eq!(bet.roll, roll);
            }
            assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().nonce, 3);
            assert_eq!(
                Some(player_balance(&fx)),
                Amount::from_whole(100).checked_apply(result.net_amount)
            );
            assert_eq!(fx.ledger.total_supply(Currency::Play).unwrap(), supply);
        }
    }

    #[tokio::test]
    async fn test_house_drained_mid_batch_still_settles() {
        for policy in [SettlementPolicy::SettleAtEnd, SettlementPolicy::SettleAsYouGo] {
            let ledger = funded_ledger(Amount::from_whole(100), Amount::from_whole(1_000));
            let drain = ledger.clone();
            let bob = AccountId::player(&OwnerId::new("bob"));
            // Another player takes every unheld house coin while the third bet reserves its nonce
            let store = HookedStore::new(3, move || {
                let free = drain.available(&AccountId::House, Currency::Play)?;
                drain.transfer(&AccountId::House, &bob, Currency::Play, free)
            });
            let fx = fixture_on(policy, ledger, store).await;
            let supply = fx.ledger.total_supply(Currency::Play).unwrap();

            let result = fx
                .executor
                .process_batch(&request(&fx, "98".parse().unwrap(), Direction::RollUnder, 10, 5))
                .await
                .unwrap();

            assert!(result.bets_placed() >= 3);
            if result.stopped_early {
                assert_eq!(result.status, BatchStatus::HaltedInsufficientFunds);
                assert_eq!(result.stop_index, Some(result.bets_placed() + 1));
            }
            assert_eq!(
                fx.seeds.snapshot(&fx.owner).await.unwrap().nonce,
                u64::from(result.bets_placed())
            );
            assert_eq!(
                Some(player_balance(&fx)),
                Amount::from_whole(100).checked_apply(result.net_amount)
            );
            assert_eq!(fx.ledger.total_supply(Currency::Play).unwrap(), supply);
            assert_eq!(
                fx.ledger.available(&AccountId::House, Currency::Play).unwrap(),
                fx.ledger.balance(&AccountId::House, Currency::Play).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_store_failure_settles_bets_already_drawn() {
        let store = HookedStore::new(3, || Err(DiceError::Storage("disk full".to_string())));
        let fx = fixture_on(
            SettlementPolicy::SettleAtEnd,
            funded_ledger(Amount::from_whole(100), Amount::from_whole(1_000)),
            store,
        )
        .await;
        let chance: WinChance = "49.5".parse().unwrap();
        let params = fx.executor.calculator().compute(chance, Direction::RollUnder).unwrap();
        let profit = params.win_profit(Amount::from_whole(10)).unwrap();

        let result = fx
            .executor
            .process_batch(&request(&fx, chance, Direction::RollUnder, 10, 5))
            .await;
        assert!(matches!(result, Err(DiceError::Storage(_))));

        let expected = rolls_for(0..2).into_iter().fold(SignedAmount::ZERO, |net, roll| {
            let delta = if params.is_win(roll) {
                SignedAmount::gain(profit)
            } else {
                SignedAmount::loss(Amount::from_whole(10))
            };
            net.checked_add(delta).unwrap()
        });
        assert_eq!(Some(player_balance(&fx)), Amount::from_whole(100).checked_apply(expected));
        assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().nonce, 2);
        assert_eq!(
            fx.ledger.available(&AccountId::House, Currency::Play).unwrap(),
            fx.ledger.balance(&AccountId::House, Currency::Play).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(100), Amount::from_whole(1_000)).await;
        let chance: WinChance = "50".parse().unwrap();

        let zero_count = request(&fx, chance, Direction::RollUnder, 1, 0);
        assert!(matches!(
            fx.executor.process_batch(&zero_count).await,
            Err(DiceError::InvalidAmount(_))
        ));

        let zero_bet = request(&fx, chance, Direction::RollUnder, 0, 1);
        assert!(matches!(
            fx.executor.process_batch(&zero_bet).await,
            Err(DiceError::InvalidAmount(_))
        ));

        let too_likely = request(&fx, "99".parse().unwrap(), Direction::RollUnder, 1, 1);
        assert!(matches!(
            fx.executor.process_batch(&too_likely).await,
            Err(DiceError::InvalidProbability { .. })
        ));

        assert_eq!(fx.seeds.snapshot(&fx.owner).await.unwrap().nonce, 0);
    }

    #[tokio::test]
    async fn test_concurrent_batches_of_one_owner_serialize() {
        let fx = fixture(SettlementPolicy::SettleAtEnd, Amount::from_whole(1_000), Amount::from_whole(100_000)).await;
        let executor = Arc::new(fx.executor);
        let batch = BatchRequest::new(
            fx.owner.clone(),
            "50".parse().unwrap(),
            Direction::RollOver,
            Amount::from_whole(1),
            Currency::Play,
            25,
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let executor = executor.clone();
                let batch = batch.clone();
                tokio::spawn(async move { executor.process_batch(&batch).await })
            })
            .collect();

        let mut nonces = Vec::new();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            nonces.extend(result.nonces());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (0..100).collect::<Vec<_>>());
    }
}
