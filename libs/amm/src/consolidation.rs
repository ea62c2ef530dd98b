//! Per-status aggregation of active ticks
//!
//! Interior ticks combine by adding their sphere sizes. Boundary ticks are
//! pinned, so they enter the invariant through their consolidated reserve
//! vector: its projection onto the uniform direction and the norm of its
//! orthogonal part. The result is rebuilt on every swap step and never
//! stored.

use crate::errors::{Result, SphereError};
use crate::fixed_point::FixedPoint;
use crate::registry::TickRegistry;
use crate::tick::{Geometry, Tick, TickStatus};
use tracing::debug;

/// Aggregate of every active tick sharing one status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedTickData {
    pub total_reserves: Vec<u128>,
    /// Scaled `Σ x²` per asset
    pub sum_squared_reserves: Vec<u128>,
    pub total_liquidity: u128,
    /// `Σ total_reserves / √n`
    pub projection: u128,
    /// `‖w‖` of `total_reserves`
    pub orthogonal_radius: u128,
    /// `Σ k`
    pub total_plane_constant: u128,
    pub tick_count: usize,
}

impl ConsolidatedTickData {
    pub fn empty(asset_count: usize) -> Self {
        Self {
            total_reserves: vec![0; asset_count],
            sum_squared_reserves: vec![0; asset_count],
            total_liquidity: 0,
            projection: 0,
            orthogonal_radius: 0,
            total_plane_constant: 0,
            tick_count: 0,
        }
    }

    fn absorb(&mut self, math: &FixedPoint, tick: &Tick) -> Result<()> {
        for (asset, &x) in tick.reserves.iter().enumerate() {
            self.total_reserves[asset] = self.total_reserves[asset]
                .checked_add(x)
                .ok_or(SphereError::Overflow("consolidate reserves"))?;
            self.sum_squared_reserves[asset] = self.sum_squared_reserves[asset]
                .checked_add(math.mul(x, x)?)
                .ok_or(SphereError::Overflow("consolidate squares"))?;
        }
        self.total_liquidity = self
            .total_liquidity
            .checked_add(tick.liquidity)
            .ok_or(SphereError::Overflow("consolidate liquidity"))?;
        self.total_plane_constant = self
            .total_plane_constant
            .checked_add(tick.plane_constant)
            .ok_or(SphereError::Overflow("consolidate plane constants"))?;
        self.tick_count += 1;
        Ok(())
    }

    /// Derive the shape terms once every tick has been absorbed
    fn seal(&mut self, geometry: &Geometry) -> Result<()> {
        self.projection = geometry.projection(&self.total_reserves)?;
        self.orthogonal_radius = geometry.orthogonal_norm(&self.total_reserves)?;
        Ok(())
    }
}

/// Interior and boundary aggregates taken in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidated {
    pub interior: ConsolidatedTickData,
    pub boundary: ConsolidatedTickData,
}

pub fn consolidate(registry: &TickRegistry, geometry: &Geometry) -> Result<Consolidated> {
    let mut interior = ConsolidatedTickData::empty(geometry.asset_count);
    let mut boundary = ConsolidatedTickData::empty(geometry.asset_count);

    for tick in registry.iter().filter(|t| t.is_active()) {
        match tick.status {
            TickStatus::Interior => interior.absorb(&geometry.math, tick)?,
            TickStatus::Boundary => boundary.absorb(&geometry.math, tick)?,
        }
    }
    interior.seal(geometry)?;
    boundary.seal(geometry)?;

    if boundary.tick_count > 0 {
        // pinned reserves sit on their planes up to the crossing estimate
        debug!(
            pinned = boundary.tick_count,
            projection = boundary.projection,
            planes = boundary.total_plane_constant,
            gap = boundary.projection.abs_diff(boundary.total_plane_constant),
            "boundary ticks consolidated"
        );
    }

    Ok(Consolidated { interior, boundary })
}
