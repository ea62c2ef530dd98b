//! Pool-wide reserve totals
//!
//! The per-asset totals and sum-of-squares mirrors are updated incrementally
//! from each tick's before/after reserves. Squares are stored scaled
//! (`x²/one`), so a mirror always equals the sum of the per-tick scaled
//! squares exactly and [`GlobalState::recompute`] can audit it.

use crate::errors::{Result, SphereError};
use crate::fixed_point::{self, FixedPoint};
use crate::tick::{Geometry, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub total_reserves: Vec<u128>,
    pub sum_squared_reserves: Vec<u128>,
    /// Last computed torus invariant
    pub global_invariant: u128,
}

impl GlobalState {
    pub fn new(asset_count: usize) -> Self {
        Self {
            total_reserves: vec![0; asset_count],
            sum_squared_reserves: vec![0; asset_count],
            global_invariant: 0,
        }
    }

    /// Move one tick's contribution from `before` to `after`
    pub fn replace_tick_reserves(
        &mut self,
        math: &FixedPoint,
        before: &[u128],
        after: &[u128],
    ) -> Result<()> {
        for (asset, (&old, &new)) in before.iter().zip(after).enumerate() {
            self.total_reserves[asset] = self.total_reserves[asset]
                .checked_sub(old)
                .and_then(|total| total.checked_add(new))
                .ok_or(SphereError::Overflow("total_reserves"))?;

            let old_square = math.mul(old, old)?;
            let new_square = math.mul(new, new)?;
            self.sum_squared_reserves[asset] = self.sum_squared_reserves[asset]
                .checked_sub(old_square)
                .and_then(|total| total.checked_add(new_square))
                .ok_or(SphereError::Overflow("sum_squared_reserves"))?;
        }
        Ok(())
    }

    /// Run `update` on a tick's reserves, then sync the mirrors and the
    /// tick's radius and status; for liquidity events
    pub fn update_tick<F>(&mut self, geometry: &Geometry, tick: &mut Tick, update: F) -> Result<()>
    where
        F: FnOnce(&mut Tick) -> Result<()>,
    {
        self.shift_tick(geometry, tick, update)?;
        tick.refresh(geometry)
    }

    /// Like [`Self::update_tick`] but keeps the tick's status; for swaps
    pub fn shift_tick<F>(&mut self, geometry: &Geometry, tick: &mut Tick, update: F) -> Result<()>
    where
        F: FnOnce(&mut Tick) -> Result<()>,
    {
        let before = tick.reserves.clone();
        update(tick)?;
        self.replace_tick_reserves(&geometry.math, &before, &tick.reserves)?;
        tick.refresh_radius(geometry)
    }

    /// Rebuild the mirrors from scratch; used to audit the incremental copy
    pub fn recompute<'a>(
        math: &FixedPoint,
        asset_count: usize,
        ticks: impl Iterator<Item = &'a Tick>,
    ) -> Result<Self> {
        let mut state = Self::new(asset_count);
        for tick in ticks {
            let empty = vec![0; asset_count];
            state.replace_tick_reserves(math, &empty, &tick.reserves)?;
        }
        Ok(state)
    }

    /// `Σ total_reserves`
    pub fn total_value(&self) -> Result<u128> {
        self.total_reserves
            .iter()
            .try_fold(0u128, |acc, &x| acc.checked_add(x))
            .ok_or(SphereError::Overflow("total_value"))
    }

    /// Coarse price proxy: total value over the asset's own reserve
    pub fn price(&self, math: &FixedPoint, asset: usize) -> Result<u128> {
        let reserve = self.total_reserves[asset];
        fixed_point::mul_div_lossy(self.total_value()?, math.one(), reserve)
    }
}
