//! Torus invariant and the Newton solver that prices trades against it
//!
//! ```text
//! term1     = r_int·√n ⊖ (x_total·v̂ ⊖ x_bound·v̂)
//! term2     = ‖w_total‖ ⊖ ‖w_bound‖
//! invariant = (term1² + term2²) / r_int²
//! ```
//!
//! `v̂` is the uniform unit vector, `‖w‖² = Σxᵢ² − (Σxᵢ)²/n` is the part of a
//! reserve vector orthogonal to it, `x_bound` is the consolidated reserve
//! vector of the pinned boundary ticks and `⊖` is saturating subtraction.
//! With only interior ticks the invariant equals `Σ(xᵢ − r_int)² / r_int²`:
//! a sphere centred on `r_int·1`, measured in units of its own radius. Trades
//! only move interior reserves, so the boundary terms are constant within a
//! segment and a tick flipping status leaves the value unchanged.
//!
//! Output grows with input only while the in-asset's interior reserve stays
//! below the sphere centre; past that fold the solver rejects the trade.

use crate::consolidation::Consolidated;
use crate::errors::{Result, SphereError};
use crate::fixed_point::{self, BPS};
use crate::tick::Geometry;
use ethnum::{I256, U256};
use sphere_config::SolverSettings;
use tracing::{debug, warn};

/// Evaluate the invariant for an arbitrary totals vector; zero when no
/// interior liquidity is left
pub fn compute_invariant(
    geometry: &Geometry,
    consolidated: &Consolidated,
    totals: &[u128],
) -> Result<u128> {
    let radius = consolidated.interior.total_liquidity;
    if radius == 0 {
        return Ok(0);
    }
    let boundary = &consolidated.boundary;

    let interior_reach = geometry.math.mul(radius, geometry.sqrt_n)?;
    let projection = geometry.projection(totals)?;
    let term1 = interior_reach.saturating_sub(projection.saturating_sub(boundary.projection));
    let term2 = geometry
        .orthogonal_norm(totals)?
        .saturating_sub(boundary.orthogonal_radius);

    let radius = U256::from(radius);
    let distance = fixed_point::square(term1)
        .checked_add(fixed_point::square(term2))
        .ok_or(SphereError::Overflow("invariant: term1² + term2²"))?;
    let scaled = (distance / radius)
        .checked_mul(U256::from(geometry.math.one()))
        .ok_or(SphereError::Overflow("invariant"))?
        / radius;
    fixed_point::to_u128(scaled, "invariant")
}

/// Result of one output solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveOutcome {
    pub amount_out: u128,
    pub iterations: u32,
    /// False when the discounted constant-product fallback was used
    pub converged: bool,
}

/// Bounded Newton search for the output that restores the invariant
pub struct InvariantSolver<'a> {
    geometry: &'a Geometry,
    consolidated: &'a Consolidated,
    settings: &'a SolverSettings,
}

impl<'a> InvariantSolver<'a> {
    pub fn new(
        geometry: &'a Geometry,
        consolidated: &'a Consolidated,
        settings: &'a SolverSettings,
    ) -> Self {
        Self {
            geometry,
            consolidated,
            settings,
        }
    }

    /// Signed `invariant(after trade) − target`
    fn residual(
        &self,
        totals: &[u128],
        token_in: usize,
        token_out: usize,
        amount_in: u128,
        amount_out: u128,
        target: u128,
    ) -> Result<I256> {
        let mut trial = totals.to_vec();
        trial[token_in] = trial[token_in]
            .checked_add(amount_in)
            .ok_or(SphereError::Overflow("solver: reserve in"))?;
        trial[token_out] = trial[token_out]
            .checked_sub(amount_out)
            .ok_or(SphereError::Overflow("solver: reserve out"))?;
        let value = compute_invariant(self.geometry, self.consolidated, &trial)?;
        Ok(I256::from(value) - I256::from(target))
    }

    /// Output of `amount_in` against `totals` that keeps the invariant
    /// constant, never more than `max_output_bps` of the out-reserve
    pub fn solve_for_output(
        &self,
        token_in: usize,
        token_out: usize,
        amount_in: u128,
        totals: &[u128],
    ) -> Result<SolveOutcome> {
        let radius = self.consolidated.interior.total_liquidity;
        let reserve_in = totals[token_in];
        let reserve_out = totals[token_out];
        if radius == 0 {
            return Err(SphereError::InsufficientLiquidity {
                asset: token_out,
                requested: amount_in,
                available: 0,
            });
        }

        let max_out = fixed_point::apply_bps(reserve_out, self.settings.max_output_bps)?
            .min(reserve_out.saturating_sub(1));
        let denominator = reserve_in
            .checked_add(amount_in)
            .ok_or(SphereError::Overflow("solver: seed"))?;
        let constant_product = fixed_point::mul_div(amount_in, reserve_out, denominator)?;

        if max_out == 0 {
            return Err(SphereError::InsufficientLiquidity {
                asset: token_out,
                requested: constant_product.max(1),
                available: 0,
            });
        }

        let target = compute_invariant(self.geometry, self.consolidated, totals)?;
        let tolerance = I256::from(
            (target / self.settings.tolerance_divisor as u128).max(1),
        );

        let at_limit = self.residual(totals, token_in, token_out, amount_in, max_out, target)?;
        if at_limit < -tolerance {
            return Err(SphereError::InsufficientLiquidity {
                asset: token_out,
                requested: constant_product.max(max_out + 1),
                available: max_out,
            });
        }

        let mut y = constant_product.clamp(1, max_out);
        let mut iterations = 0;
        let mut converged = false;

        // a zero target carries no information about the trade
        while target > 0 && iterations < self.settings.max_iterations {
            iterations += 1;
            let f = self.residual(totals, token_in, token_out, amount_in, y, target)?;

            let epsilon = (y / 1_000).max(self.settings.min_step as u128);
            let lo = y.saturating_sub(epsilon);
            let hi = y.saturating_add(epsilon).min(reserve_out);
            let span = hi - lo;
            if span == 0 {
                break;
            }
            let df = self.residual(totals, token_in, token_out, amount_in, hi, target)?
                - self.residual(totals, token_in, token_out, amount_in, lo, target)?;
            if df == I256::ZERO {
                // flat residual: any output would pass the tolerance
                debug!(iterations, amount_out = y, "invariant flat in the output");
                break;
            }
            if f.abs() <= tolerance {
                converged = true;
                break;
            }

            let raw_step = f * I256::from(span) / df;
            if raw_step == I256::ZERO {
                // root lies within one unit of y
                converged = true;
                break;
            }
            let max_step = I256::from(
                fixed_point::mul_div(y, self.settings.max_step_bps as u128, BPS)?.max(1),
            );
            let step = raw_step.clamp(-max_step, max_step);

            let next = I256::from(y) - step;
            let next = next.clamp(I256::ONE, I256::from(max_out)).as_u128();
            if next == y {
                break;
            }
            y = next;
        }

        let amount_out = if converged {
            debug!(iterations, amount_out = y, "Newton solver converged");
            y
        } else {
            let haircut = BPS - self.settings.fallback_haircut_bps as u128;
            let fallback = fixed_point::mul_div(constant_product, haircut, BPS)?.min(max_out);
            warn!(
                iterations,
                fallback,
                "Newton solver did not converge, using discounted constant-product estimate"
            );
            fallback
        };

        self.check_fold(totals, token_in, token_out, amount_in, amount_out, target)?;
        Ok(SolveOutcome {
            amount_out,
            iterations,
            converged,
        })
    }

    /// Reject a trade whose extra input would raise the invariant: the
    /// in-asset's interior reserve has passed the sphere centre and more
    /// input would buy less output
    fn check_fold(
        &self,
        totals: &[u128],
        token_in: usize,
        token_out: usize,
        amount_in: u128,
        amount_out: u128,
        target: u128,
    ) -> Result<()> {
        let epsilon = (amount_in / 1_000).max(self.settings.min_step as u128);
        let at = self.residual(totals, token_in, token_out, amount_in, amount_out, target)?;
        let beyond = self.residual(
            totals,
            token_in,
            token_out,
            amount_in.saturating_add(epsilon),
            amount_out,
            target,
        )?;
        if beyond <= at {
            return Ok(());
        }

        let radius = self.consolidated.interior.total_liquidity;
        let interior_in =
            totals[token_in].saturating_sub(self.consolidated.boundary.total_reserves[token_in]);
        let headroom = radius.saturating_sub(interior_in);
        debug!(token_in, amount_in, headroom, "trade past the invariant fold");
        Err(SphereError::InsufficientLiquidity {
            asset: token_in,
            requested: amount_in,
            available: headroom,
        })
    }
}
