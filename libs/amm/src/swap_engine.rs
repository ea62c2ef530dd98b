//! Segmented swap execution
//!
//! A swap runs as a small state machine:
//!
//! ```text
//! Pending(remaining) ──▶ Segmenting ──▶ Committing ──▶ Done
//!        ▲                                   │
//!        └────────── crossing found ─────────┘
//! ```
//!
//! Each pass consolidates the active ticks, solves the output for all of the
//! remaining input and asks the crossing detector whether a tick plane is hit
//! first. Without a crossing the whole remainder is committed; with one, only
//! the input up to the plane is committed, the tick's status is flipped and
//! the loop continues. Every crossing retires one tick from the detector's
//! band, so the loop runs at most `active ticks + 1` times.
//!
//! Segments move interior reserves only. Boundary ticks stay pinned to their
//! planes until a crossing releases them, and the last interior tick may not
//! be pinned: a trade that would do so is rejected for lack of liquidity.

use crate::consolidation::consolidate;
use crate::crossing::{BoundaryCrossingDetector, Crossing, PendingTrade};
use crate::errors::{Result, SphereError};
use crate::fixed_point;
use crate::global_state::GlobalState;
use crate::invariant::{compute_invariant, InvariantSolver};
use crate::registry::TickRegistry;
use crate::tick::{Geometry, TickId, TickStatus};
use serde::{Deserialize, Serialize};
use sphere_config::{FeeMode, PoolSettings};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub token_in: usize,
    pub token_out: usize,
    pub amount_in: u128,
    pub min_amount_out: u128,
}

/// One committed piece of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSegment {
    pub amount_in: u128,
    pub amount_out: u128,
    /// Tick whose plane ended this segment
    pub crossed: Option<TickId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub amount_in: u128,
    /// Paid to the caller, after fees
    pub amount_out: u128,
    pub fee: u128,
    pub segments: Vec<SwapSegment>,
    pub invariant_before: u128,
    pub invariant_after: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapPhase {
    Pending(u128),
    Segmenting(u128),
    Committing {
        remaining: u128,
        segment: SwapSegment,
    },
    Done,
}

pub struct SwapEngine<'a> {
    settings: &'a PoolSettings,
    geometry: &'a Geometry,
}

impl<'a> SwapEngine<'a> {
    pub fn new(settings: &'a PoolSettings, geometry: &'a Geometry) -> Self {
        Self { settings, geometry }
    }

    pub fn validate(&self, request: &SwapRequest) -> Result<()> {
        let asset_count = self.geometry.asset_count;
        for index in [request.token_in, request.token_out] {
            if index >= asset_count {
                return Err(SphereError::InvalidTokenIndex { index, asset_count });
            }
        }
        if request.token_in == request.token_out {
            return Err(SphereError::SameTokenSwap);
        }
        if request.amount_in == 0 {
            return Err(SphereError::ZeroAmount);
        }
        Ok(())
    }

    /// Run a swap against `registry` and `global`. Segments are applied as
    /// they are planned, so on error the caller discards both; the pool runs
    /// every swap on a scratch copy for this reason.
    pub fn execute(
        &self,
        registry: &mut TickRegistry,
        global: &mut GlobalState,
        request: &SwapRequest,
    ) -> Result<SwapReceipt> {
        self.validate(request)?;

        let (input_fee, tradable) = match self.settings.fee_mode {
            FeeMode::Input => {
                let fee = fixed_point::apply_bps(request.amount_in, self.settings.fee_bps)?;
                (fee, request.amount_in - fee)
            }
            FeeMode::Output => (0, request.amount_in),
        };

        let invariant_before = global.global_invariant;
        let cap = registry.active_ids().len() + 1;
        let mut crossed: HashSet<TickId> = HashSet::new();
        let mut segments: Vec<SwapSegment> = Vec::new();
        let mut phase = SwapPhase::Pending(tradable);

        loop {
            phase = match phase {
                SwapPhase::Pending(0) => SwapPhase::Done,
                SwapPhase::Pending(remaining) => SwapPhase::Segmenting(remaining),
                SwapPhase::Segmenting(remaining) => {
                    let last = segments.len() + 1 >= cap;
                    let segment = self.plan_segment(registry, global, request, remaining, last, &crossed)?;
                    SwapPhase::Committing { remaining, segment }
                }
                SwapPhase::Committing { remaining, segment } => {
                    self.commit_segment(registry, global, request, &segment)?;
                    segments.push(segment);
                    match segment.crossed {
                        Some(tick_id) => {
                            crossed.insert(tick_id);
                            SwapPhase::Pending(remaining - segment.amount_in)
                        }
                        None => SwapPhase::Done,
                    }
                }
                SwapPhase::Done => break,
            };
        }

        let gross_out: u128 = segments.iter().map(|s| s.amount_out).sum();
        let (fee, amount_out) = match self.settings.fee_mode {
            FeeMode::Input => {
                self.distribute_fee(registry, global, request.token_in, input_fee)?;
                (input_fee, gross_out)
            }
            FeeMode::Output => {
                let fee = fixed_point::apply_bps(gross_out, self.settings.fee_bps)?;
                self.distribute_fee(registry, global, request.token_out, fee)?;
                (fee, gross_out - fee)
            }
        };

        if amount_out < request.min_amount_out {
            return Err(SphereError::SlippageExceeded {
                amount_out,
                min_amount_out: request.min_amount_out,
            });
        }

        let consolidated = consolidate(registry, self.geometry)?;
        global.global_invariant =
            compute_invariant(self.geometry, &consolidated, &global.total_reserves)?;

        info!(
            token_in = request.token_in,
            token_out = request.token_out,
            amount_in = request.amount_in,
            amount_out,
            fee,
            segments = segments.len(),
            "swap executed"
        );

        Ok(SwapReceipt {
            amount_in: request.amount_in,
            amount_out,
            fee,
            segments,
            invariant_before,
            invariant_after: global.global_invariant,
        })
    }

    /// Solve the remaining input and cut it at the first crossing
    fn plan_segment(
        &self,
        registry: &TickRegistry,
        global: &GlobalState,
        request: &SwapRequest,
        remaining: u128,
        last: bool,
        crossed: &HashSet<TickId>,
    ) -> Result<SwapSegment> {
        let consolidated = consolidate(registry, self.geometry)?;
        let solver = InvariantSolver::new(self.geometry, &consolidated, &self.settings.solver);
        let totals = &global.total_reserves;

        let full = solver.solve_for_output(request.token_in, request.token_out, remaining, totals)?;
        if last {
            warn!(
                remaining,
                "segmentation cap reached, committing remainder without crossing check"
            );
            return Ok(SwapSegment {
                amount_in: remaining,
                amount_out: full.amount_out,
                crossed: None,
            });
        }

        let detector = BoundaryCrossingDetector::new(
            self.geometry,
            registry,
            &consolidated,
            self.settings.crossing_estimate,
            crossed,
        );
        let trade = PendingTrade {
            totals,
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: remaining,
            amount_out: full.amount_out,
        };
        let crossing = detector.detect(trade, |amount| {
            solver
                .solve_for_output(request.token_in, request.token_out, amount, totals)
                .map(|outcome| outcome.amount_out)
        })?;

        match crossing {
            None => Ok(SwapSegment {
                amount_in: remaining,
                amount_out: full.amount_out,
                crossed: None,
            }),
            Some(Crossing {
                tick_id,
                partial_amount_in,
                from,
                ..
            }) => {
                let partial = solver.solve_for_output(
                    request.token_in,
                    request.token_out,
                    partial_amount_in,
                    totals,
                )?;
                if from == TickStatus::Interior && consolidated.interior.tick_count == 1 {
                    debug!(
                        tick = %tick_id,
                        reachable = partial.amount_out,
                        "trade would pin the last interior tick"
                    );
                    return Err(SphereError::InsufficientLiquidity {
                        asset: request.token_out,
                        requested: full.amount_out,
                        available: partial.amount_out,
                    });
                }
                debug!(
                    tick = %tick_id,
                    amount_in = partial_amount_in,
                    amount_out = partial.amount_out,
                    remaining,
                    "partial segment up to tick boundary"
                );
                Ok(SwapSegment {
                    amount_in: partial_amount_in,
                    amount_out: partial.amount_out,
                    crossed: Some(tick_id),
                })
            }
        }
    }

    /// Spread a segment over the interior ticks by their share of the
    /// out-asset, then flip the tick whose plane ended it
    fn commit_segment(
        &self,
        registry: &mut TickRegistry,
        global: &mut GlobalState,
        request: &SwapRequest,
        segment: &SwapSegment,
    ) -> Result<()> {
        let out = request.token_out;
        let holders: Vec<(TickId, u128)> = registry
            .iter()
            .filter(|tick| tick.is_active() && tick.status == TickStatus::Interior)
            .map(|tick| (tick.id, tick.reserves[out]))
            .filter(|&(_, reserve)| reserve > 0)
            .collect();

        let total: u128 = holders.iter().map(|&(_, reserve)| reserve).sum();
        if total == 0 || segment.amount_out >= total {
            return Err(SphereError::InsufficientLiquidity {
                asset: out,
                requested: segment.amount_out,
                available: total,
            });
        }

        let shares_in = split_pro_rata(segment.amount_in, &holders, total)?;
        let shares_out = split_pro_rata(segment.amount_out, &holders, total)?;

        for ((&(id, _), &dx), &dy) in holders.iter().zip(&shares_in).zip(&shares_out) {
            let tick = registry.get_mut(id)?;
            global.shift_tick(self.geometry, tick, |tick| {
                tick.reserves[request.token_in] = tick.reserves[request.token_in]
                    .checked_add(dx)
                    .ok_or(SphereError::Overflow("segment reserve in"))?;
                tick.reserves[out] =
                    tick.reserves[out]
                        .checked_sub(dy)
                        .ok_or(SphereError::InsufficientLiquidity {
                            asset: out,
                            requested: dy,
                            available: tick.reserves[out],
                        })?;
                Ok(())
            })?;
        }

        if let Some(id) = segment.crossed {
            let tick = registry.get_mut(id)?;
            let from = tick.status;
            tick.status = from.flipped();
            debug!(tick = %id, ?from, to = ?tick.status, "tick flipped at its plane");
        }
        Ok(())
    }

    /// Book a fee to the ticks' reserves and accrued fees by liquidity share
    fn distribute_fee(
        &self,
        registry: &mut TickRegistry,
        global: &mut GlobalState,
        asset: usize,
        fee: u128,
    ) -> Result<()> {
        if fee == 0 {
            return Ok(());
        }
        let weights: Vec<(TickId, u128)> = registry
            .active_ids()
            .into_iter()
            .map(|id| registry.get(id).map(|tick| (id, tick.liquidity)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|&(_, liquidity)| liquidity > 0)
            .collect();
        let total: u128 = weights.iter().map(|&(_, liquidity)| liquidity).sum();
        if total == 0 {
            return Ok(());
        }

        let portions = split_lossy(fee, &weights, total)?;
        for (&(id, _), &portion) in weights.iter().zip(&portions) {
            let tick = registry.get_mut(id)?;
            tick.accrued_fees = tick
                .accrued_fees
                .checked_add(portion)
                .ok_or(SphereError::Overflow("accrued_fees"))?;
            global.shift_tick(self.geometry, tick, |tick| {
                tick.reserves[asset] = tick.reserves[asset]
                    .checked_add(portion)
                    .ok_or(SphereError::Overflow("fee reserve"))?;
                Ok(())
            })?;
        }
        debug!(asset, fee, ticks = weights.len(), "fee distributed");
        Ok(())
    }
}

/// Exact pro-rata split; the rounding remainder goes to the largest weight
fn split_pro_rata(amount: u128, weights: &[(TickId, u128)], total: u128) -> Result<Vec<u128>> {
    let mut parts = weights
        .iter()
        .map(|&(_, weight)| fixed_point::mul_div(amount, weight, total))
        .collect::<Result<Vec<_>>>()?;
    assign_remainder(amount, weights, &mut parts);
    Ok(parts)
}

/// Pro-rata split that tolerates precision loss on very large amounts
fn split_lossy(amount: u128, weights: &[(TickId, u128)], total: u128) -> Result<Vec<u128>> {
    let mut parts = weights
        .iter()
        .map(|&(_, weight)| fixed_point::mul_div_lossy(amount, weight, total))
        .collect::<Result<Vec<_>>>()?;
    assign_remainder(amount, weights, &mut parts);
    Ok(parts)
}

fn assign_remainder(amount: u128, weights: &[(TickId, u128)], parts: &mut [u128]) {
    let assigned: u128 = parts.iter().sum();
    let remainder = amount.saturating_sub(assigned);
    if let Some(largest) = weights
        .iter()
        .enumerate()
        .max_by_key(|&(_, &(_, weight))| weight)
        .map(|(index, _)| index)
    {
        parts[largest] += remainder;
    }
}
