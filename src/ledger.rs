//! Player and house balances.
//!
//! All balances live behind a single lock. Every mutation, including both
//! legs of a transfer, is applied under one write guard, so a reader never
//! sees a half-applied transfer and a failed operation changes nothing.
//!
//! A running batch sets its worst-case exposure aside as a [`Reservation`].
//! Held funds stay in the account's balance but no other debit can spend
//! them, so settling the batch cannot fail for lack of funds.

use crate::config::AccountsConfig;
use crate::errors::{DiceError, DiceResult};
use crate::types::{AccountId, Amount, Currency, OwnerId, SignedAmount};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Books {
    balances: HashMap<(AccountId, Currency), Amount>,
    held: HashMap<(AccountId, Currency), Amount>,
    opened: HashSet<OwnerId>,
}

impl Books {
    fn balance(&self, account: &AccountId, currency: Currency) -> Amount {
        self.balances
            .get(&(account.clone(), currency))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn held(&self, account: &AccountId, currency: Currency) -> Amount {
        self.held
            .get(&(account.clone(), currency))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn available(&self, account: &AccountId, currency: Currency) -> Amount {
        self.balance(account, currency)
            .checked_sub(self.held(account, currency))
            .unwrap_or(Amount::ZERO)
    }

    fn checked_debit(&self, account: &AccountId, currency: Currency, amount: Amount) -> DiceResult<Amount> {
        let available = self.available(account, currency);
        match self.balance(account, currency).checked_sub(amount) {
            Some(next) if available >= amount => Ok(next),
            _ => Err(DiceError::InsufficientFunds {
                account: account.clone(),
                currency,
                requested: amount,
                available,
            }),
        }
    }

    /// Total held on `account` once one holder's share moves from `current` to `target`,
    /// or `None` if the balance cannot back it
    fn resized_hold(&self, account: &AccountId, currency: Currency, current: Amount, target: Amount) -> Option<Amount> {
        let others = self.held(account, currency).checked_sub(current)?;
        let total = others.checked_add(target)?;
        (total <= self.balance(account, currency)).then_some(total)
    }

    fn set_held(&mut self, account: &AccountId, currency: Currency, total: Amount) {
        if total.is_zero() {
            self.held.remove(&(account.clone(), currency));
        } else {
            self.held.insert((account.clone(), currency), total);
        }
    }

    fn release(&mut self, account: &AccountId, currency: Currency, amount: Amount) {
        let total = self.held(account, currency).checked_sub(amount).unwrap_or(Amount::ZERO);
        self.set_held(account, currency, total);
    }

    fn restore(&mut self, account: &AccountId, currency: Currency, amount: Amount) {
        if let Some(total) = self.held(account, currency).checked_add(amount) {
            self.set_held(account, currency, total);
        }
    }

    fn checked_credit(&self, account: &AccountId, currency: Currency, amount: Amount) -> DiceResult<Amount> {
        self.balance(account, currency)
            .checked_add(amount)
            .ok_or_else(|| DiceError::InvalidAmount(format!("balance of {} {} would overflow", account, currency)))
    }

    fn set(&mut self, account: &AccountId, currency: Currency, value: Amount) {
        self.balances.insert((account.clone(), currency), value);
    }
}

/// Funds one batch has set aside on the player and the house
#[derive(Debug)]
pub struct Reservation {
    player: AccountId,
    house: AccountId,
    currency: Currency,
    player_held: Amount,
    house_held: Amount,
}

impl Reservation {
    pub fn player_held(&self) -> Amount {
        self.player_held
    }

    pub fn house_held(&self) -> Amount {
        self.house_held
    }
}

/// Balance book for every player and the house bankroll
pub struct Ledger {
    books: RwLock<Books>,
    welcome_balances: Vec<(Currency, Amount)>,
}

impl Ledger {
    /// Empty ledger; `welcome_balances` is credited by [`Ledger::open_account`]
    pub fn new(welcome_balances: Vec<(Currency, Amount)>) -> Self {
        Self {
            books: RwLock::new(Books::default()),
            welcome_balances,
        }
    }

    /// Ledger with the configured welcome balances and the house bankroll already funded
    pub fn from_config(config: &AccountsConfig) -> DiceResult<Self> {
        let ledger = Self::new(config.resolved_welcome_balances()?);
        for (currency, amount) in config.resolved_house_bankroll()? {
            ledger.deposit(&AccountId::House, currency, amount)?;
        }
        tracing::info!(house = %config.house_owner, "Ledger initialized");
        Ok(ledger)
    }

    /// Credit the welcome balances to a new player. Returns false if the account was already open.
    pub fn open_account(&self, owner: &OwnerId) -> DiceResult<bool> {
        let mut books = self.write()?;
        if books.opened.contains(owner) {
            return Ok(false);
        }

        let account = AccountId::player(owner);
        let mut updates = Vec::with_capacity(self.welcome_balances.len());
        for (currency, amount) in &self.welcome_balances {
            updates.push((*currency, books.checked_credit(&account, *currency, *amount)?));
        }
        for (currency, value) in updates {
            books.set(&account, currency, value);
        }
        books.opened.insert(owner.clone());

        tracing::info!(%owner, "Opened player account");
        Ok(true)
    }

    /// Funds entering the system from outside (wallet deposit, bankroll top-up)
    pub fn deposit(&self, account: &AccountId, currency: Currency, amount: Amount) -> DiceResult<Amount> {
        let balance = self.credit(account, currency, amount)?;
        tracing::debug!(%account, %currency, %amount, "Deposit");
        Ok(balance)
    }

    /// Remove `amount`; fails without side effects if the balance does not cover it
    pub fn debit(&self, account: &AccountId, currency: Currency, amount: Amount) -> DiceResult<Amount> {
        let mut books = self.write()?;
        let next = books.checked_debit(account, currency, amount)?;
        books.set(account, currency, next);
        Ok(next)
    }

    pub fn credit(&self, account: &AccountId, currency: Currency, amount: Amount) -> DiceResult<Amount> {
        let mut books = self.write()?;
        let next = books.checked_credit(account, currency, amount)?;
        books.set(account, currency, next);
        Ok(next)
    }

    /// Move `amount` from one account to another, all or nothing
    pub fn transfer(&self, from: &AccountId, to: &AccountId, currency: Currency, amount: Amount) -> DiceResult<()> {
        let mut books = self.write()?;
        Self::transfer_locked(&mut books, from, to, currency, amount)
    }

    /// Apply a player-perspective net result against the house.
    ///
    /// A non-negative `net` pays the player from the house; a negative one
    /// moves the loss from the player to the house.
    pub fn settle_net(
        &self,
        player: &AccountId,
        house: &AccountId,
        currency: Currency,
        net: SignedAmount,
    ) -> DiceResult<()> {
        let mut books = self.write()?;
        Self::settle_locked(&mut books, player, house, currency, net)
    }

    /// Empty reservation for a batch of `player` against `house`
    pub fn reservation(&self, player: &AccountId, house: &AccountId, currency: Currency) -> Reservation {
        Reservation {
            player: player.clone(),
            house: house.clone(),
            currency,
            player_held: Amount::ZERO,
            house_held: Amount::ZERO,
        }
    }

    /// Resize the reservation so it holds `player_exposure` on the player and
    /// `house_exposure` on the house.
    ///
    /// Returns false, and changes nothing, when either side's unheld balance
    /// cannot back its new hold.
    pub fn hold(
        &self,
        reservation: &mut Reservation,
        player_exposure: Amount,
        house_exposure: Amount,
    ) -> DiceResult<bool> {
        let currency = reservation.currency;
        let mut books = self.write()?;

        let player_total =
            books.resized_hold(&reservation.player, currency, reservation.player_held, player_exposure);
        let house_total = books.resized_hold(&reservation.house, currency, reservation.house_held, house_exposure);
        let (Some(player_total), Some(house_total)) = (player_total, house_total) else {
            return Ok(false);
        };

        books.set_held(&reservation.player, currency, player_total);
        books.set_held(&reservation.house, currency, house_total);
        reservation.player_held = player_exposure;
        reservation.house_held = house_exposure;
        Ok(true)
    }

    /// Release the reservation's holds and apply `net` in the same write.
    ///
    /// When `net` lies within the held exposure this cannot fail for lack of
    /// funds. On any failure the holds stay in place.
    pub fn settle_reserved(&self, reservation: &mut Reservation, net: SignedAmount) -> DiceResult<()> {
        let currency = reservation.currency;
        let mut books = self.write()?;

        books.release(&reservation.player, currency, reservation.player_held);
        books.release(&reservation.house, currency, reservation.house_held);
        if let Err(err) = Self::settle_locked(&mut books, &reservation.player, &reservation.house, currency, net) {
            books.restore(&reservation.player, currency, reservation.player_held);
            books.restore(&reservation.house, currency, reservation.house_held);
            return Err(err);
        }

        reservation.player_held = Amount::ZERO;
        reservation.house_held = Amount::ZERO;
        Ok(())
    }

    pub fn balance(&self, account: &AccountId, currency: Currency) -> DiceResult<Amount> {
        Ok(self.read()?.balance(account, currency))
    }

    /// Balance not held by any running batch
    pub fn available(&self, account: &AccountId, currency: Currency) -> DiceResult<Amount> {
        Ok(self.read()?.available(account, currency))
    }

    /// Sum of every balance in `currency`
    pub fn total_supply(&self, currency: Currency) -> DiceResult<Amount> {
        let books = self.read()?;
        books
            .balances
            .iter()
            .filter(|((_, c), _)| *c == currency)
            .try_fold(Amount::ZERO, |total, (_, amount)| total.checked_add(*amount))
            .ok_or_else(|| DiceError::InvalidAmount(format!("total {} supply overflows", currency)))
    }

    pub fn is_open(&self, owner: &OwnerId) -> DiceResult<bool> {
        Ok(self.read()?.opened.contains(owner))
    }

    fn settle_locked(
        books: &mut Books,
        player: &AccountId,
        house: &AccountId,
        currency: Currency,
        net: SignedAmount,
    ) -> DiceResult<()> {
        let magnitude = net.magnitude()?;
        if net.is_negative() {
            Self::transfer_locked(books, player, house, currency, magnitude)
        } else {
            Self::transfer_locked(books, house, player, currency, magnitude)
        }
    }

    fn transfer_locked(
        books: &mut Books,
        from: &AccountId,
        to: &AccountId,
        currency: Currency,
        amount: Amount,
    ) -> DiceResult<()> {
        let debited = books.checked_debit(from, currency, amount)?;
        if from == to {
            return Ok(());
        }
        let credited = books.checked_credit(to, currency, amount)?;

        books.set(from, currency, debited);
        books.set(to, currency, credited);
        Ok(())
    }

    fn read(&self) -> DiceResult<RwLockReadGuard<'_, Books>> {
        self.books
            .read()
            .map_err(|_| DiceError::Storage("ledger lock poisoned".to_string()))
    }

    fn write(&self) -> DiceResult<RwLockWriteGuard<'_, Books>> {
        self.books
            .write()
            .map_err(|_| DiceError::Storage("ledger lock poisoned".to_string()))
    }
}
