//! Custody seam between pool accounting and token movement
//!
//! The pool never holds tokens itself. It tells a [`Custody`] implementation
//! what to pull from or push to a caller, and only commits its accounting if
//! that instruction succeeds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// 20-byte account identifier of a liquidity provider or trader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner(pub [u8; 20]);

impl Owner {
    /// Owner whose every byte is `byte`; handy for fixtures
    pub const fn repeat(byte: u8) -> Self {
        Owner([byte; 20])
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// One asset leg of a custody instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub asset: usize,
    pub amount: u128,
}

impl Transfer {
    /// Non-zero legs of a per-asset amount vector
    pub fn from_amounts(amounts: &[u128]) -> Vec<Transfer> {
        amounts
            .iter()
            .enumerate()
            .filter(|(_, &amount)| amount > 0)
            .map(|(asset, &amount)| Transfer { asset, amount })
            .collect()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Insufficient balance of asset {asset}: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: usize,
        requested: u128,
        available: u128,
    },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Outbound token movement requested by the pool
pub trait Custody {
    /// Move `transfers` from `from` into the pool; all legs or none
    fn collect(&mut self, from: &Owner, transfers: &[Transfer]) -> Result<(), CustodyError>;

    /// Move `transfers` from the pool to `to`; all legs or none
    fn disburse(&mut self, to: &Owner, transfers: &[Transfer]) -> Result<(), CustodyError>;
}

/// Ledger-only custody keeping per-owner balances and the pool's own holdings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryCustody {
    balances: HashMap<Owner, HashMap<usize, u128>>,
    pool: HashMap<usize, u128>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `asset` to an owner's wallet
    pub fn mint(&mut self, owner: Owner, asset: usize, amount: u128) {
        let balance = self.balances.entry(owner).or_default().entry(asset).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, owner: &Owner, asset: usize) -> u128 {
        self.balances
            .get(owner)
            .and_then(|wallet| wallet.get(&asset))
            .copied()
            .unwrap_or(0)
    }

    /// Tokens currently held on behalf of the pool
    pub fn pool_balance(&self, asset: usize) -> u128 {
        self.pool.get(&asset).copied().unwrap_or(0)
    }

    /// Requested amount per asset; repeated legs for one asset add up
    fn per_asset(transfers: &[Transfer]) -> Result<BTreeMap<usize, u128>, CustodyError> {
        let mut totals = BTreeMap::new();
        for transfer in transfers {
            let total: &mut u128 = totals.entry(transfer.asset).or_insert(0);
            *total = total.checked_add(transfer.amount).ok_or_else(|| {
                CustodyError::Rejected(format!("asset {} legs overflow", transfer.asset))
            })?;
        }
        Ok(totals)
    }

    /// Debit `source` and credit `target`; nothing moves unless every asset
    /// is covered
    fn move_legs(
        source: &mut HashMap<usize, u128>,
        target: &mut HashMap<usize, u128>,
        transfers: &[Transfer],
    ) -> Result<(), CustodyError> {
        let mut settled = Vec::new();
        for (asset, amount) in Self::per_asset(transfers)? {
            let available = source.get(&asset).copied().unwrap_or(0);
            let remaining = available
                .checked_sub(amount)
                .ok_or(CustodyError::InsufficientBalance {
                    asset,
                    requested: amount,
                    available,
                })?;
            let credited = target
                .get(&asset)
                .copied()
                .unwrap_or(0)
                .checked_add(amount)
                .ok_or_else(|| CustodyError::Rejected(format!("asset {asset} balance overflow")))?;
            settled.push((asset, remaining, credited));
        }

        for (asset, remaining, credited) in settled {
            source.insert(asset, remaining);
            target.insert(asset, credited);
        }
        Ok(())
    }
}

impl Custody for InMemoryCustody {
    fn collect(&mut self, from: &Owner, transfers: &[Transfer]) -> Result<(), CustodyError> {
        let wallet = self.balances.entry(*from).or_default();
        Self::move_legs(wallet, &mut self.pool, transfers)
    }

    fn disburse(&mut self, to: &Owner, transfers: &[Transfer]) -> Result<(), CustodyError> {
        let wallet = self.balances.entry(*to).or_default();
        Self::move_legs(&mut self.pool, wallet, transfers)
    }
}
