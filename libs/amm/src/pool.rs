//! Pool facade: liquidity, swaps, views, snapshots
//!
//! Every mutation runs inside a [`Transaction`] over a scratch copy of the
//! pool state. The copy replaces the committed state only when the whole
//! closure returns `Ok`, so a failed operation leaves nothing behind.
//! Each operation inside a transaction is itself all-or-nothing: it runs on
//! its own copy of the scratch state, which is swapped in only on success,
//! so a closure that recovers from a failed step sees no partial mutation.
//! Custody instructions are issued from inside the transaction after the
//! accounting they settle, which keeps token movement and bookkeeping in one
//! all-or-nothing unit.
//!
//! A [`Transaction`] holds the only `&mut` to the pool state for its whole
//! lifetime, so no second operation can start while one is in progress.

use crate::consolidation::consolidate;
use crate::custody::{Custody, Owner, Transfer};
use crate::errors::{Result, SphereError};
use crate::fixed_point::FixedPoint;
use crate::global_state::GlobalState;
use crate::invariant::compute_invariant;
use crate::ledger::LiquidityLedger;
use crate::registry::TickRegistry;
use crate::swap_engine::{SwapEngine, SwapReceipt, SwapRequest};
use crate::tick::{Geometry, TickId, TickInfo, TickStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sphere_config::PoolSettings;
use tracing::{debug, info};

/// Canonical, persisted pool state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    settings: PoolSettings,
    geometry: Geometry,
    ledger: LiquidityLedger,
    registry: TickRegistry,
    global: GlobalState,
}

impl PoolState {
    fn new(settings: PoolSettings) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| SphereError::InvalidConfiguration(e.to_string()))?;
        let math = FixedPoint::new(settings.precision_decimals)?;
        let geometry = Geometry::new(math, settings.asset_count, settings.status_tolerance_bps)?;
        Ok(Self {
            ledger: LiquidityLedger::new(settings.first_deposit, math),
            registry: TickRegistry::new(settings.tick_identity, settings.asset_count),
            global: GlobalState::new(settings.asset_count),
            geometry,
            settings,
        })
    }

    fn check_amounts(&self, amounts: &[u128]) -> Result<()> {
        if amounts.len() != self.geometry.asset_count {
            return Err(SphereError::AmountCountMismatch {
                expected: self.geometry.asset_count,
                actual: amounts.len(),
            });
        }
        if amounts.iter().all(|&a| a == 0) {
            return Err(SphereError::ZeroAmount);
        }
        Ok(())
    }

    fn check_asset(&self, asset: usize) -> Result<()> {
        if asset >= self.geometry.asset_count {
            return Err(SphereError::InvalidTokenIndex {
                index: asset,
                asset_count: self.geometry.asset_count,
            });
        }
        Ok(())
    }

    fn reserves_after_deposit(reserves: &[u128], amounts: &[u128]) -> Result<Vec<u128>> {
        reserves
            .iter()
            .zip(amounts)
            .map(|(&r, &a)| r.checked_add(a).ok_or(SphereError::Overflow("deposit reserves")))
            .collect()
    }

    fn refresh_invariant(&mut self) -> Result<()> {
        let consolidated = consolidate(&self.registry, &self.geometry)?;
        self.global.global_invariant =
            compute_invariant(&self.geometry, &consolidated, &self.global.total_reserves)?;
        Ok(())
    }

    fn add_liquidity(
        &mut self,
        owner: Owner,
        plane_constant: u128,
        amounts: &[u128],
    ) -> Result<(TickId, u128)> {
        self.check_amounts(amounts)?;
        let deposit_radius = self.geometry.radius_of(amounts)?;

        let prospective_radius = match self.registry.lookup(deposit_radius, plane_constant) {
            Some(id) => {
                let tick = self.registry.get(id)?;
                self.geometry
                    .radius_of(&Self::reserves_after_deposit(&tick.reserves, amounts)?)?
            }
            None => deposit_radius,
        };
        let tick_id = self.registry.get_or_create(
            &self.geometry,
            deposit_radius,
            plane_constant,
            prospective_radius,
        )?;

        let shares = self.deposit_into(owner, tick_id, amounts)?;
        Ok((tick_id, shares))
    }

    fn deposit_into(&mut self, owner: Owner, tick_id: TickId, amounts: &[u128]) -> Result<u128> {
        self.check_amounts(amounts)?;
        let tick = self.registry.get(tick_id)?;
        let new_reserves = Self::reserves_after_deposit(&tick.reserves, amounts)?;
        let radius_after = self.geometry.radius_of(&new_reserves)?;

        self.geometry
            .validate_plane_constant(tick.plane_constant, radius_after)?;
        let shares = self
            .ledger
            .shares_for_deposit(tick, radius_after, amounts)?;

        let tick = self.registry.get_mut(tick_id)?;
        self.global.update_tick(&self.geometry, tick, |tick| {
            tick.reserves = new_reserves;
            Ok(())
        })?;
        tick.sync_liquidity();
        LiquidityLedger::credit(tick, owner, shares)?;
        let radius = tick.radius;
        let status = tick.status;

        self.refresh_invariant()?;
        info!(
            tick = %tick_id,
            %owner,
            shares,
            radius,
            ?status,
            ?amounts,
            "liquidity added"
        );
        Ok(shares)
    }

    fn remove_liquidity(&mut self, owner: Owner, tick_id: TickId, shares: u128) -> Result<Vec<u128>> {
        let tick = self.registry.get(tick_id)?;
        let amounts = self.ledger.amounts_for_burn(tick, &owner, shares)?;

        let tick = self.registry.get_mut(tick_id)?;
        self.global.update_tick(&self.geometry, tick, |tick| {
            for (reserve, &amount) in tick.reserves.iter_mut().zip(&amounts) {
                *reserve = reserve
                    .checked_sub(amount)
                    .ok_or(SphereError::Overflow("withdraw reserves"))?;
            }
            Ok(())
        })?;
        LiquidityLedger::debit(tick, &owner, shares)?;
        tick.sync_liquidity();
        let radius = tick.radius;

        self.refresh_invariant()?;
        info!(
            tick = %tick_id,
            %owner,
            shares,
            radius,
            ?amounts,
            "liquidity removed"
        );
        Ok(amounts)
    }

    fn swap(&mut self, request: &SwapRequest) -> Result<SwapReceipt> {
        let engine = SwapEngine::new(&self.settings, &self.geometry);
        engine.execute(&mut self.registry, &mut self.global, request)
    }

    fn verify_integrity(&self) -> Result<()> {
        let violation = |msg: String| Err(SphereError::IntegrityViolation(msg));

        for tick in self.registry.iter() {
            let radius = self.geometry.radius_of(&tick.reserves)?;
            if radius.abs_diff(tick.radius) > 1 {
                return violation(format!(
                    "tick {} radius {} but reserves give {}",
                    tick.id, tick.radius, radius
                ));
            }

            let owned = tick
                .lp_share_owners
                .values()
                .try_fold(0u128, |acc, &s| acc.checked_add(s))
                .ok_or(SphereError::Overflow("share sum"))?;
            if owned != tick.total_lp_shares {
                return violation(format!(
                    "tick {} owners hold {} of {} shares",
                    tick.id, owned, tick.total_lp_shares
                ));
            }

            // status is path dependent once swaps flip it; only empty ticks are fixed
            if !tick.is_active() && tick.status != TickStatus::Interior {
                return violation(format!("empty tick {} marked {:?}", tick.id, tick.status));
            }
        }

        let rebuilt = GlobalState::recompute(
            &self.geometry.math,
            self.geometry.asset_count,
            self.registry.iter(),
        )?;
        if rebuilt.total_reserves != self.global.total_reserves
            || rebuilt.sum_squared_reserves != self.global.sum_squared_reserves
        {
            return violation("global reserve mirrors diverge from tick sums".to_string());
        }

        let consolidated = consolidate(&self.registry, &self.geometry)?;
        let invariant =
            compute_invariant(&self.geometry, &consolidated, &self.global.total_reserves)?;
        if invariant != self.global.global_invariant {
            return violation(format!(
                "stored invariant {} but state gives {}",
                self.global.global_invariant, invariant
            ));
        }
        Ok(())
    }
}

/// Mutable handle on a scratch copy of the pool state
pub struct Transaction<'p> {
    state: &'p mut PoolState,
}

impl<'p> Transaction<'p> {
    /// Run one operation on its own copy of the state; keep it only on `Ok`
    fn guarded<T, F>(&mut self, operation: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(&mut PoolState) -> Result<T>,
    {
        let mut working = self.state.clone();
        match body(&mut working) {
            Ok(output) => {
                *self.state = working;
                Ok(output)
            }
            Err(err) => {
                debug!(operation, %err, "operation discarded");
                Err(err)
            }
        }
    }

    /// Deposit into the tick identified by `plane_constant` (and the deposit
    /// radius, depending on the identity policy), creating it if needed
    pub fn add_liquidity(
        &mut self,
        owner: Owner,
        plane_constant: u128,
        amounts: &[u128],
    ) -> Result<(TickId, u128)> {
        self.guarded("add_liquidity", |state| {
            state.add_liquidity(owner, plane_constant, amounts)
        })
    }

    pub fn add_liquidity_to_tick(&mut self, owner: Owner, tick_id: TickId, amounts: &[u128]) -> Result<u128> {
        self.guarded("add_liquidity_to_tick", |state| {
            state.deposit_into(owner, tick_id, amounts)
        })
    }

    pub fn remove_liquidity(&mut self, owner: Owner, tick_id: TickId, shares: u128) -> Result<Vec<u128>> {
        self.guarded("remove_liquidity", |state| {
            state.remove_liquidity(owner, tick_id, shares)
        })
    }

    pub fn swap(&mut self, request: &SwapRequest) -> Result<SwapReceipt> {
        self.guarded("swap", |state| state.swap(request))
    }

    /// Pull tokens from `from` into the pool
    pub fn collect<C>(&mut self, custody: &mut C, from: &Owner, transfers: &[Transfer]) -> Result<()>
    where
        C: Custody + ?Sized,
    {
        self.guarded("collect", |_| Ok(custody.collect(from, transfers)?))
    }

    /// Push tokens from the pool to `to`
    pub fn disburse<C>(&mut self, custody: &mut C, to: &Owner, transfers: &[Transfer]) -> Result<()>
    where
        C: Custody + ?Sized,
    {
        self.guarded("disburse", |_| Ok(custody.disburse(to, transfers)?))
    }

    pub fn tick_info(&self, tick_id: TickId) -> Result<TickInfo> {
        Ok(self.state.registry.get(tick_id)?.info())
    }
}

/// A sphere AMM pool
#[derive(Debug, Clone, PartialEq)]
pub struct SpherePool {
    state: PoolState,
}

impl SpherePool {
    /// Create an empty pool; settings are validated first
    pub fn new(settings: PoolSettings) -> Result<Self> {
        let state = PoolState::new(settings)?;
        info!(
            assets = state.settings.asset_count,
            decimals = state.settings.precision_decimals,
            fee_bps = state.settings.fee_bps,
            "sphere pool created"
        );
        Ok(Self { state })
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.state.settings
    }

    pub fn math(&self) -> FixedPoint {
        self.state.geometry.math
    }

    /// Run `body` against a scratch copy; commit it only if `body` succeeds
    pub fn transaction<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut scratch = self.state.clone();
        let output = body(&mut Transaction {
            state: &mut scratch,
        })?;
        self.state = scratch;
        Ok(output)
    }

    pub fn add_liquidity(&mut self, owner: Owner, plane_constant: u128, amounts: &[u128]) -> Result<(TickId, u128)> {
        self.transaction(|tx| tx.add_liquidity(owner, plane_constant, amounts))
    }

    pub fn add_liquidity_to_tick(&mut self, owner: Owner, tick_id: TickId, amounts: &[u128]) -> Result<u128> {
        self.transaction(|tx| tx.add_liquidity_to_tick(owner, tick_id, amounts))
    }

    pub fn remove_liquidity(&mut self, owner: Owner, tick_id: TickId, shares: u128) -> Result<Vec<u128>> {
        self.transaction(|tx| tx.remove_liquidity(owner, tick_id, shares))
    }

    pub fn swap(&mut self, request: SwapRequest) -> Result<SwapReceipt> {
        self.transaction(|tx| tx.swap(&request))
    }

    /// Add liquidity and collect the deposit from `owner`
    pub fn deposit<C: Custody>(
        &mut self,
        custody: &mut C,
        owner: Owner,
        plane_constant: u128,
        amounts: &[u128],
    ) -> Result<(TickId, u128)> {
        self.transaction(|tx| {
            let minted = tx.add_liquidity(owner, plane_constant, amounts)?;
            tx.collect(custody, &owner, &Transfer::from_amounts(amounts))?;
            Ok(minted)
        })
    }

    /// Burn shares and disburse the withdrawn reserves to `owner`
    pub fn withdraw<C: Custody>(
        &mut self,
        custody: &mut C,
        owner: Owner,
        tick_id: TickId,
        shares: u128,
    ) -> Result<Vec<u128>> {
        self.transaction(|tx| {
            let amounts = tx.remove_liquidity(owner, tick_id, shares)?;
            tx.disburse(custody, &owner, &Transfer::from_amounts(&amounts))?;
            Ok(amounts)
        })
    }

    /// Swap, collecting the input from and paying the output to `owner`
    pub fn trade<C: Custody>(
        &mut self,
        custody: &mut C,
        owner: Owner,
        request: SwapRequest,
    ) -> Result<SwapReceipt> {
        self.transaction(|tx| {
            let receipt = tx.swap(&request)?;
            let paid_in = [Transfer {
                asset: request.token_in,
                amount: request.amount_in,
            }];
            tx.collect(custody, &owner, &paid_in)?;
            let paid_out = [Transfer {
                asset: request.token_out,
                amount: receipt.amount_out,
            }];
            if let Err(err) = tx.disburse(custody, &owner, &paid_out) {
                // hand the input back so custody matches the rolled-back state
                custody.disburse(&owner, &paid_in)?;
                return Err(err);
            }
            Ok(receipt)
        })
    }

    /// Price a swap against a scratch copy without committing it
    pub fn quote(&self, request: SwapRequest) -> Result<SwapReceipt> {
        let mut scratch = self.state.clone();
        Transaction {
            state: &mut scratch,
        }
        .swap(&request)
    }

    pub fn tick_info(&self, tick_id: TickId) -> Result<TickInfo> {
        Ok(self.state.registry.get(tick_id)?.info())
    }

    /// Ids of ticks holding reserves, in creation order
    pub fn active_ticks(&self) -> Vec<TickId> {
        self.state.registry.active_ids()
    }

    pub fn user_shares(&self, tick_id: TickId, owner: &Owner) -> Result<u128> {
        Ok(self.state.registry.get(tick_id)?.shares_of(owner))
    }

    /// Per-asset totals and the last computed invariant
    pub fn global_state(&self) -> (&[u128], u128) {
        (
            &self.state.global.total_reserves,
            self.state.global.global_invariant,
        )
    }

    /// Coarse price proxy: `Σ reserves / reserves[asset]`, scaled
    pub fn price(&self, asset: usize) -> Result<u128> {
        self.state.check_asset(asset)?;
        self.state.global.price(&self.state.geometry.math, asset)
    }

    pub fn price_decimal(&self, asset: usize) -> Result<Decimal> {
        self.state.geometry.math.to_decimal(self.price(asset)?)
    }

    pub fn fee_bps(&self) -> u32 {
        self.state.settings.fee_bps
    }

    /// Re-check radius, share and mirror consistency
    pub fn verify_integrity(&self) -> Result<()> {
        self.state.verify_integrity()
    }

    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.state)?)
    }

    /// Rebuild a pool from [`Self::snapshot`] output
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        let state: PoolState = bincode::deserialize(bytes)?;
        state
            .settings
            .validate()
            .map_err(|e| SphereError::InvalidConfiguration(e.to_string()))?;
        state.verify_integrity()?;
        debug!(ticks = state.registry.len(), "pool restored from snapshot");
        Ok(Self { state })
    }
}
