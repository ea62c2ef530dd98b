//! Ticks: concentrated-liquidity positions shaped as spheres in reserve space
//!
//! A tick's `radius` is always the Euclidean norm of its reserve vector. Its
//! `liquidity` is the sphere size the invariant prices against; it is set to
//! the radius on every deposit or withdrawal and held fixed while swaps move
//! the reserves along the surface.
//!
//! Status is reclassified from the reserves on liquidity events only. During
//! a swap it changes solely when the swap engine flips a tick whose plane the
//! trade crosses; a Boundary tick stays pinned until a trade carries the
//! interior projection back below its plane.

use crate::custody::Owner;
use crate::errors::{Result, SphereError};
use crate::fixed_point::{self, FixedPoint};
use ethnum::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable arena index of a tick (first tick is 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TickId(pub u32);

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a tick's reserves sit inside its sphere or are pinned to its plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickStatus {
    Interior,
    Boundary,
}

impl TickStatus {
    pub fn flipped(self) -> Self {
        match self {
            TickStatus::Interior => TickStatus::Boundary,
            TickStatus::Boundary => TickStatus::Interior,
        }
    }
}

/// Pool-wide geometric constants derived once from settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub math: FixedPoint,
    pub asset_count: usize,
    /// Scaled `√n`
    pub sqrt_n: u128,
    /// Scaled tolerance on the normalized projection test
    pub status_tolerance: u128,
}

impl Geometry {
    pub fn new(math: FixedPoint, asset_count: usize, status_tolerance_bps: u32) -> Result<Self> {
        Ok(Self {
            math,
            asset_count,
            sqrt_n: math.sqrt_count(asset_count)?,
            status_tolerance: math.from_bps(status_tolerance_bps)?,
        })
    }

    /// `√(Σ xᵢ²)`
    pub fn radius_of(&self, reserves: &[u128]) -> Result<u128> {
        let mut sum = U256::ZERO;
        for &x in reserves {
            sum = sum
                .checked_add(fixed_point::square(x))
                .ok_or(SphereError::Overflow("radius_of"))?;
        }
        fixed_point::to_u128(fixed_point::sqrt_u256(sum), "radius_of")
    }

    /// Projection onto the uniform unit vector: `Σ xᵢ / √n`
    pub fn projection(&self, reserves: &[u128]) -> Result<u128> {
        let mut sum: u128 = 0;
        for &x in reserves {
            sum = sum
                .checked_add(x)
                .ok_or(SphereError::Overflow("projection"))?;
        }
        self.math.div(sum, self.sqrt_n)
    }

    /// `value / radius` in fixed point
    pub fn normalized(&self, value: u128, radius: u128) -> Result<u128> {
        self.math.div(value, radius)
    }

    /// Admissible plane constants for a radius:
    /// `max((√n − 1)·r, r/√n) ≤ k ≤ 4·r/√n`
    pub fn plane_bounds(&self, radius: u128) -> Result<(u128, u128)> {
        let one = self.math.one();
        let shell = self.math.mul(self.sqrt_n.saturating_sub(one), radius)?;
        let floor = self.math.div(radius, self.sqrt_n)?;
        let ceiling = self.math.div(
            radius
                .checked_mul(4)
                .ok_or(SphereError::Overflow("plane_bounds"))?,
            self.sqrt_n,
        )?;
        Ok((shell.max(floor), ceiling))
    }

    /// Reject (never clamp) a plane constant outside [`Self::plane_bounds`]
    pub fn validate_plane_constant(&self, plane_constant: u128, radius: u128) -> Result<()> {
        let (min, max) = self.plane_bounds(radius)?;
        if plane_constant < min || plane_constant > max {
            return Err(SphereError::InvalidPlaneConstant {
                plane_constant,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Interior iff `α_norm < k_norm` (less the tolerance); an empty tick is Interior
    pub fn classify(&self, reserves: &[u128], radius: u128, plane_constant: u128) -> Result<TickStatus> {
        if radius == 0 {
            return Ok(TickStatus::Interior);
        }
        let alpha_norm = self.normalized(self.projection(reserves)?, radius)?;
        let k_norm = self.normalized(plane_constant, radius)?;
        if alpha_norm.saturating_add(self.status_tolerance) >= k_norm {
            Ok(TickStatus::Boundary)
        } else {
            Ok(TickStatus::Interior)
        }
    }

    /// `‖w‖ = √(Σ xᵢ² − (Σ xᵢ)²/n)`, the part of a reserve vector orthogonal
    /// to the uniform direction
    pub fn orthogonal_norm(&self, reserves: &[u128]) -> Result<u128> {
        let mut sum = U256::ZERO;
        let mut sum_squares = U256::ZERO;
        for &x in reserves {
            sum += U256::from(x);
            sum_squares = sum_squares
                .checked_add(fixed_point::square(x))
                .ok_or(SphereError::Overflow("orthogonal_norm: Σx²"))?;
        }
        let parallel = sum
            .checked_mul(sum)
            .ok_or(SphereError::Overflow("orthogonal_norm: (Σx)²"))?
            / U256::from(self.asset_count as u128);
        fixed_point::to_u128(
            fixed_point::sqrt_u256(sum_squares.saturating_sub(parallel)),
            "orthogonal_norm",
        )
    }
}

/// A single concentrated-liquidity position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub id: TickId,
    /// Fixed at creation
    pub plane_constant: u128,
    pub radius: u128,
    pub liquidity: u128,
    pub reserves: Vec<u128>,
    pub total_lp_shares: u128,
    pub lp_share_owners: HashMap<Owner, u128>,
    pub status: TickStatus,
    pub accrued_fees: u128,
}

impl Tick {
    pub fn new(id: TickId, plane_constant: u128, asset_count: usize) -> Self {
        Self {
            id,
            plane_constant,
            radius: 0,
            liquidity: 0,
            reserves: vec![0; asset_count],
            total_lp_shares: 0,
            lp_share_owners: HashMap::new(),
            status: TickStatus::Interior,
            accrued_fees: 0,
        }
    }

    /// Non-empty ticks take part in consolidation and swaps
    pub fn is_active(&self) -> bool {
        self.radius > 0
    }

    pub fn shares_of(&self, owner: &Owner) -> u128 {
        self.lp_share_owners.get(owner).copied().unwrap_or(0)
    }

    /// Recompute radius and status from the current reserves
    pub fn refresh(&mut self, geometry: &Geometry) -> Result<()> {
        self.refresh_radius(geometry)?;
        self.status = geometry.classify(&self.reserves, self.radius, self.plane_constant)?;
        Ok(())
    }

    /// Recompute the radius only; swaps leave the status to explicit flips
    pub fn refresh_radius(&mut self, geometry: &Geometry) -> Result<()> {
        self.radius = geometry.radius_of(&self.reserves)?;
        Ok(())
    }

    /// Re-anchor the sphere size to the current radius after a liquidity event
    pub fn sync_liquidity(&mut self) {
        self.liquidity = self.radius;
    }

    /// `k / liquidity`, the plane constant in the units the invariant uses
    pub fn plane_norm(&self, geometry: &Geometry) -> Result<u128> {
        geometry.normalized(self.plane_constant, self.liquidity)
    }

    pub fn info(&self) -> TickInfo {
        TickInfo {
            id: self.id,
            radius: self.radius,
            liquidity: self.liquidity,
            plane_constant: self.plane_constant,
            reserves: self.reserves.clone(),
            total_lp_shares: self.total_lp_shares,
            status: self.status,
            accrued_fees: self.accrued_fees,
        }
    }
}

/// Read-only view of a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    pub id: TickId,
    pub radius: u128,
    pub liquidity: u128,
    pub plane_constant: u128,
    pub reserves: Vec<u128>,
    pub total_lp_shares: u128,
    pub status: TickStatus,
    pub accrued_fees: u128,
}
