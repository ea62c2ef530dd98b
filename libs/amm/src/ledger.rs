//! LP share accounting
//!
//! Shares track a tick's radius: a deposit that grows the radius by a
//! fraction `f` mints `f · total_shares`, and a withdrawal of `s` shares
//! returns `s / total_shares` of every reserve.

use crate::custody::Owner;
use crate::errors::{Result, SphereError};
use crate::fixed_point::{self, FixedPoint};
use crate::tick::Tick;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use sphere_config::FirstDepositShares;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityLedger {
    first_deposit: FirstDepositShares,
    math: FixedPoint,
}

impl LiquidityLedger {
    pub fn new(first_deposit: FirstDepositShares, math: FixedPoint) -> Self {
        Self {
            first_deposit,
            math,
        }
    }

    /// Shares minted for a deposit that moves `tick` to `radius_after`
    pub fn shares_for_deposit(&self, tick: &Tick, radius_after: u128, amounts: &[u128]) -> Result<u128> {
        if tick.radius == 0 || tick.total_lp_shares == 0 {
            return self.first_deposit_shares(radius_after, amounts);
        }

        if radius_after <= tick.radius {
            return Err(SphereError::NoNetDeposit {
                radius_before: tick.radius,
                radius_after,
            });
        }

        let shares = fixed_point::mul_div(
            radius_after - tick.radius,
            tick.total_lp_shares,
            tick.radius,
        )?;
        if shares == 0 {
            return Err(SphereError::NoNetDeposit {
                radius_before: tick.radius,
                radius_after,
            });
        }
        Ok(shares)
    }

    fn first_deposit_shares(&self, radius_after: u128, amounts: &[u128]) -> Result<u128> {
        let shares = match self.first_deposit {
            FirstDepositShares::Radius => radius_after,
            FirstDepositShares::GeometricMean => self.geometric_mean_shares(amounts)?,
        };
        if shares == 0 {
            return Err(SphereError::NoNetDeposit {
                radius_before: 0,
                radius_after,
            });
        }
        Ok(shares)
    }

    /// `geometric_mean(non-zero amounts) · √m`; equals the radius when the
    /// `m` non-zero amounts are equal
    fn geometric_mean_shares(&self, amounts: &[u128]) -> Result<u128> {
        let mut log_sum = Decimal::ZERO;
        let mut count: u32 = 0;
        for &amount in amounts.iter().filter(|&&a| a > 0) {
            let value = self.math.to_decimal(amount)?;
            log_sum += value
                .checked_ln()
                .ok_or(SphereError::Overflow("geometric mean: ln"))?;
            count += 1;
        }
        if count == 0 {
            return Err(SphereError::ZeroAmount);
        }

        let count = Decimal::from(count);
        let mean = (log_sum / count)
            .checked_exp()
            .ok_or(SphereError::Overflow("geometric mean: exp"))?;
        let scale = count.sqrt().ok_or(SphereError::Overflow("geometric mean: sqrt"))?;
        self.math.from_decimal(mean * scale)
    }

    /// Amounts returned for burning `shares` of `tick`, checked against the
    /// owner's balance
    pub fn amounts_for_burn(&self, tick: &Tick, owner: &Owner, shares: u128) -> Result<Vec<u128>> {
        if shares == 0 {
            return Err(SphereError::ZeroAmount);
        }
        let available = tick.shares_of(owner);
        if shares > available {
            return Err(SphereError::InsufficientShares {
                requested: shares,
                available,
            });
        }
        tick.reserves
            .iter()
            .map(|&reserve| fixed_point::mul_div(reserve, shares, tick.total_lp_shares))
            .collect()
    }

    /// Record newly minted shares
    pub fn credit(tick: &mut Tick, owner: Owner, shares: u128) -> Result<()> {
        tick.total_lp_shares = tick
            .total_lp_shares
            .checked_add(shares)
            .ok_or(SphereError::Overflow("total_lp_shares"))?;
        let balance = tick.lp_share_owners.entry(owner).or_insert(0);
        *balance = balance
            .checked_add(shares)
            .ok_or(SphereError::Overflow("owner shares"))?;
        Ok(())
    }

    /// Record burned shares; an owner with a zero balance is dropped
    pub fn debit(tick: &mut Tick, owner: &Owner, shares: u128) -> Result<()> {
        let available = tick.shares_of(owner);
        if shares > available {
            return Err(SphereError::InsufficientShares {
                requested: shares,
                available,
            });
        }
        tick.total_lp_shares = tick
            .total_lp_shares
            .checked_sub(shares)
            .ok_or(SphereError::Overflow("total_lp_shares"))?;
        if available == shares {
            tick.lp_share_owners.remove(owner);
        } else {
            tick.lp_share_owners.insert(*owner, available - shares);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick::{Geometry, TickId};

    const E18: u128 = 1_000_000_000_000_000_000;

    fn funded_tick(geo: &Geometry, reserves: Vec<u128>, owner: Owner) -> Tick {
        let mut tick = Tick::new(TickId(1), 200 * E18, 3);
        tick.reserves = reserves;
        tick.refresh(geo).unwrap();
        tick.sync_liquidity();
        let radius = tick.radius;
        LiquidityLedger::credit(&mut tick, owner, radius).unwrap();
        tick
    }

    fn geometry() -> Geometry {
        Geometry::new(FixedPoint::new(18).unwrap(), 3, 1).unwrap()
    }

    #[test]
    fn test_first_deposit_mints_radius() {
        let geo = geometry();
        let ledger = LiquidityLedger::new(FirstDepositShares::Radius, geo.math);
        let empty = Tick::new(TickId(1), 200 * E18, 3);
        let radius = geo.radius_of(&[100 * E18; 3]).unwrap();
        let shares = ledger
            .shares_for_deposit(&empty, radius, &[100 * E18; 3])
            .unwrap();
        assert_eq!(shares, radius);
    }

    #[test]
    fn test_geometric_mean_matches_radius_when_balanced() {
        let geo = geometry();
        let ledger = LiquidityLedger::new(FirstDepositShares::GeometricMean, geo.math);
        let empty = Tick::new(TickId(1), 200 * E18, 3);
        let radius = geo.radius_of(&[100 * E18; 3]).unwrap();
        let shares = ledger
            .shares_for_deposit(&empty, radius, &[100 * E18; 3])
            .unwrap();
        // within 1e-6 relative
        assert!(shares.abs_diff(radius) < radius / 1_000_000);

        // an unbalanced deposit mints less than its radius
        let skewed = [10 * E18, 1_000 * E18, 0];
        let skewed_radius = geo.radius_of(&skewed).unwrap();
        let shares = ledger
            .shares_for_deposit(&empty, skewed_radius, &skewed)
            .unwrap();
        assert!(shares < skewed_radius);
    }

    #[test]
    fn test_subsequent_deposit_is_proportional() {
        let geo = geometry();
        let ledger = LiquidityLedger::new(FirstDepositShares::Radius, geo.math);
        let alice = Owner::repeat(1);
        let tick = funded_tick(&geo, vec![100 * E18; 3], alice);

        // doubling every reserve doubles the radius and the share supply
        let doubled = geo.radius_of(&[200 * E18; 3]).unwrap();
        let shares = ledger
            .shares_for_deposit(&tick, doubled, &[100 * E18; 3])
            .unwrap();
        assert!(shares.abs_diff(tick.total_lp_shares) <= 2);
    }

    #[test]
    fn test_rejects_deposit_without_radius_growth() {
        let geo = geometry();
        let ledger = LiquidityLedger::new(FirstDepositShares::Radius, geo.math);
        let tick = funded_tick(&geo, vec![100 * E18; 3], Owner::repeat(1));
        let err = ledger
            .shares_for_deposit(&tick, tick.radius, &[0, 0, 0])
            .unwrap_err();
        assert!(matches!(err, SphereError::NoNetDeposit { .. }));
    }

    #[test]
    fn test_burn_checks_balance_and_conserves_shares() {
        let geo = geometry();
        let ledger = LiquidityLedger::new(FirstDepositShares::Radius, geo.math);
        let alice = Owner::repeat(1);
        let bob = Owner::repeat(2);
        let mut tick = funded_tick(&geo, vec![100 * E18; 3], alice);

        let err = ledger.amounts_for_burn(&tick, &bob, 1).unwrap_err();
        assert_eq!(
            err,
            SphereError::InsufficientShares {
                requested: 1,
                available: 0
            }
        );

        let half = tick.total_lp_shares / 2;
        let amounts = ledger.amounts_for_burn(&tick, &alice, half).unwrap();
        for amount in &amounts {
            assert!(amount.abs_diff(50 * E18) <= 1);
        }

        LiquidityLedger::debit(&mut tick, &alice, half).unwrap();
        let owned: u128 = tick.lp_share_owners.values().sum();
        assert_eq!(owned, tick.total_lp_shares);

        let rest = tick.shares_of(&alice);
        LiquidityLedger::debit(&mut tick, &alice, rest).unwrap();
        assert!(tick.lp_share_owners.is_empty());
        assert_eq!(tick.total_lp_shares, 0);
    }
}
