//! Boundary crossing detection
//!
//! The normalized interior projection `α_norm = (x_total·v̂ ⊖ x_bound·v̂) / r_int`
//! must stay inside the band `[max k/L of boundary ticks, min k/L of interior
//! ticks]` for a trade to price against a single consolidated shape. When a
//! trade would leave the band, the detector names the tick whose plane is hit
//! first and estimates how much input reaches it. Rising past an interior
//! tick's plane pins it; falling back below a boundary tick's plane releases
//! it, even when the projection already starts at or below that plane.

use crate::consolidation::Consolidated;
use crate::errors::{Result, SphereError};
use crate::fixed_point;
use crate::registry::TickRegistry;
use crate::tick::{Geometry, TickId, TickStatus};
use rust_decimal::{Decimal, MathematicalOps};
use sphere_config::CrossingEstimate;
use std::collections::HashSet;
use tracing::debug;

/// Secant steps applied after the quadratic fit
const REFINEMENT_STEPS: usize = 3;

/// A tick plane hit part-way through a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub tick_id: TickId,
    /// The tick's `k / L`, which `α_norm` reaches
    pub target_norm: u128,
    /// Input that carries the projection to the plane, in `[1, remaining − 1]`
    pub partial_amount_in: u128,
    /// Status the tick leaves
    pub from: TickStatus,
}

/// Trade checked for a crossing before it is committed
#[derive(Debug, Clone, Copy)]
pub struct PendingTrade<'a> {
    pub totals: &'a [u128],
    pub token_in: usize,
    pub token_out: usize,
    pub amount_in: u128,
    pub amount_out: u128,
}

pub struct BoundaryCrossingDetector<'a> {
    geometry: &'a Geometry,
    registry: &'a TickRegistry,
    consolidated: &'a Consolidated,
    estimate: CrossingEstimate,
    crossed: &'a HashSet<TickId>,
}

impl<'a> BoundaryCrossingDetector<'a> {
    pub fn new(
        geometry: &'a Geometry,
        registry: &'a TickRegistry,
        consolidated: &'a Consolidated,
        estimate: CrossingEstimate,
        crossed: &'a HashSet<TickId>,
    ) -> Self {
        Self {
            geometry,
            registry,
            consolidated,
            estimate,
            crossed,
        }
    }

    /// `α_norm` for a totals vector
    pub fn interior_projection(&self, totals: &[u128]) -> Result<u128> {
        let projection = self.geometry.projection(totals)?;
        let interior = projection.saturating_sub(self.consolidated.boundary.projection);
        self.geometry
            .normalized(interior, self.consolidated.interior.total_liquidity)
    }

    /// Nearest uncrossed plane on each side: lowest interior `k/L` and
    /// highest boundary `k/L`
    fn band(&self) -> Result<(Option<(TickId, u128)>, Option<(TickId, u128)>)> {
        let mut upper: Option<(TickId, u128)> = None;
        let mut lower: Option<(TickId, u128)> = None;
        for tick in self.registry.iter() {
            if !tick.is_active() || tick.liquidity == 0 || self.crossed.contains(&tick.id) {
                continue;
            }
            let norm = tick.plane_norm(self.geometry)?;
            match tick.status {
                TickStatus::Interior => {
                    if upper.map_or(true, |(_, best)| norm < best) {
                        upper = Some((tick.id, norm));
                    }
                }
                TickStatus::Boundary => {
                    if lower.map_or(true, |(_, best)| norm > best) {
                        lower = Some((tick.id, norm));
                    }
                }
            }
        }
        Ok((upper, lower))
    }

    /// Check a trade; `quote` prices any smaller input against the same state
    pub fn detect<F>(&self, trade: PendingTrade<'_>, quote: F) -> Result<Option<Crossing>>
    where
        F: FnMut(u128) -> Result<u128>,
    {
        if self.consolidated.interior.total_liquidity == 0 || trade.amount_in < 2 {
            return Ok(None);
        }

        let before = self.interior_projection(trade.totals)?;
        let after = self.interior_projection(&apply_trade(&trade, trade.amount_in, trade.amount_out)?)?;
        let (upper, lower) = self.band()?;

        let hit = if after > before {
            upper
                .filter(|&(_, norm)| after >= norm)
                .map(|(id, norm)| (id, norm, TickStatus::Interior))
        } else if after < before {
            lower
                .filter(|&(_, norm)| after <= norm)
                .map(|(id, norm)| (id, norm, TickStatus::Boundary))
        } else {
            None
        };

        let Some((tick_id, target_norm, from)) = hit else {
            return Ok(None);
        };

        let already_past = match from {
            TickStatus::Interior => before >= target_norm,
            TickStatus::Boundary => before <= target_norm,
        };
        let partial = match self.estimate {
            // the previous cut landed on the far side of the plane
            _ if already_past => 1,
            CrossingEstimate::Midpoint => trade.amount_in / 2,
            CrossingEstimate::Quadratic => {
                self.quadratic_estimate(&trade, before, after, target_norm, quote)?
            }
        };
        let partial_amount_in = partial.clamp(1, trade.amount_in - 1);

        debug!(
            tick = %tick_id,
            before,
            after,
            target_norm,
            partial_amount_in,
            "boundary crossing detected"
        );

        Ok(Some(Crossing {
            tick_id,
            target_norm,
            partial_amount_in,
            from,
        }))
    }

    /// Fit `g(d) = α_norm(d) − target` through `d = 0, h, 2h` with
    /// `h = amount_in / 2`, take the smallest root in `(0, amount_in)` and
    /// polish it with a few secant steps against the nearest bracketing
    /// sample; falls back to linear interpolation between the end points
    fn quadratic_estimate<F>(
        &self,
        trade: &PendingTrade<'_>,
        before: u128,
        after: u128,
        target: u128,
        mut quote: F,
    ) -> Result<u128>
    where
        F: FnMut(u128) -> Result<u128>,
    {
        let linear = fixed_point::mul_div(
            trade.amount_in,
            before.abs_diff(target),
            before.abs_diff(after),
        )?;

        let half = trade.amount_in / 2;
        let mid_out = quote(half)?;
        let mid = self.interior_projection(&apply_trade(trade, half, mid_out)?)?;

        let math = &self.geometry.math;
        let signed = |value: u128| -> Result<Decimal> {
            let magnitude = math.to_decimal(value.abs_diff(target))?;
            Ok(if value < target { -magnitude } else { magnitude })
        };
        let g0 = signed(before)?;
        let g1 = signed(mid)?;
        let g2 = signed(after)?;
        let h = math.to_decimal(half)?;
        let limit = math.to_decimal(trade.amount_in)?;

        let mut estimate = match smallest_root(g0, g1, g2, h, limit) {
            Some(root) => root,
            None => math.to_decimal(linear)?,
        };
        let mut samples = vec![(Decimal::ZERO, g0), (h, g1), (limit, g2)];

        for _ in 0..REFINEMENT_STEPS {
            let Ok(amount) = math.from_decimal(estimate) else {
                break;
            };
            if amount == 0 || amount >= trade.amount_in {
                break;
            }
            let out = quote(amount)?;
            let g = signed(self.interior_projection(&apply_trade(trade, amount, out)?)?)?;
            if g.is_zero() {
                break;
            }
            let above = g > Decimal::ZERO;
            let Some(&(near_d, near_g)) = samples
                .iter()
                .filter(|&&(_, sample)| (sample > Decimal::ZERO) != above)
                .min_by_key(|&&(d, _)| (d - estimate).abs())
            else {
                break;
            };
            samples.push((estimate, g));

            match secant_step(estimate, g, near_d, near_g) {
                Some(next) if next > Decimal::ZERO && next < limit => estimate = next,
                _ => break,
            }
        }

        Ok(math.from_decimal(estimate).unwrap_or(linear))
    }
}

/// Totals after `amount_in` enters and `amount_out` leaves
fn apply_trade(trade: &PendingTrade<'_>, amount_in: u128, amount_out: u128) -> Result<Vec<u128>> {
    let mut totals = trade.totals.to_vec();
    totals[trade.token_in] = totals[trade.token_in]
        .checked_add(amount_in)
        .ok_or(SphereError::Overflow("crossing: reserve in"))?;
    totals[trade.token_out] = totals[trade.token_out]
        .checked_sub(amount_out)
        .ok_or(SphereError::Overflow("crossing: reserve out"))?;
    Ok(totals)
}

/// Root of the line through `(d, g)` and `(other_d, other_g)`
fn secant_step(d: Decimal, g: Decimal, other_d: Decimal, other_g: Decimal) -> Option<Decimal> {
    let slope_run = d.checked_sub(other_d)?;
    let rise = g.checked_sub(other_g)?;
    if rise.is_zero() {
        return None;
    }
    d.checked_sub(g.checked_mul(slope_run)?.checked_div(rise)?)
}

/// Smallest root in `(0, limit)` of the quadratic through `(0, g0)`,
/// `(h, g1)`, `(2h, g2)`
fn smallest_root(g0: Decimal, g1: Decimal, g2: Decimal, h: Decimal, limit: Decimal) -> Option<Decimal> {
    let two = Decimal::TWO;
    let h_squared = h.checked_mul(h)?;
    let curvature = g2
        .checked_sub(g1.checked_mul(two)?)?
        .checked_add(g0)?
        .checked_div(two.checked_mul(h_squared)?)?;
    let slope = g1
        .checked_sub(g0)?
        .checked_div(h)?
        .checked_sub(curvature.checked_mul(h)?)?;

    let in_range = |d: Decimal| d > Decimal::ZERO && d < limit;

    if curvature.is_zero() {
        if slope.is_zero() {
            return None;
        }
        let root = (-g0).checked_div(slope)?;
        return in_range(root).then_some(root);
    }

    let discriminant = slope
        .checked_mul(slope)?
        .checked_sub(Decimal::from(4).checked_mul(curvature)?.checked_mul(g0)?)?;
    let root_disc = discriminant.sqrt()?;

    // q = −(b + sign(b)·√D) / 2 avoids cancellation when the curvature is tiny
    let q = if slope.is_sign_negative() {
        root_disc.checked_sub(slope)?
    } else {
        -(slope.checked_add(root_disc)?)
    }
    .checked_div(two)?;
    if q.is_zero() {
        return None;
    }

    [q.checked_div(curvature), g0.checked_div(q)]
        .into_iter()
        .flatten()
        .filter(|&d| in_range(d))
        .reduce(Decimal::min)
}
