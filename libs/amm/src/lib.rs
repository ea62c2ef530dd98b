//! # Sphere AMM - Torus Invariant Engine
//!
//! ## Purpose
//!
//! Multi-asset automated market maker whose liquidity positions ("ticks") are
//! spheres in N-dimensional reserve space, each bounded by a hyperplane that
//! caps how far the pool may drift from the balanced point. Ticks are
//! consolidated by status into one interior sphere and a pinned boundary
//! reserve vector, and trades are priced against the torus invariant those
//! two shapes form. Boundary ticks sit out trades until a crossing releases
//! them.
//!
//! ## Integration Points
//!
//! - **Inbound**: `add_liquidity`, `add_liquidity_to_tick`, `remove_liquidity`, `swap`
//!   on [`SpherePool`], or several at once through [`SpherePool::transaction`]
//! - **Outbound**: token movement through the [`Custody`] trait, issued only
//!   inside a transaction after the accounting it settles
//! - **Views**: tick info, active ticks, user shares, global state, price proxy,
//!   side-effect-free quotes through [`AmmPool`]
//! - **Persistence**: [`SpherePool::snapshot`] / [`SpherePool::restore`]
//! - **Configuration**: [`sphere_config::PoolSettings`]
//!
//! ## Architecture Role
//!
//! ```text
//! fixed_point ─▶ tick ─▶ registry ─▶ consolidation ─▶ invariant ─▶ crossing
//!                  │                                       │           │
//!                  └─▶ ledger          global_state ◀──────┴─ swap_engine
//!                                           │                      │
//!                                           └──────── pool ◀───────┘
//! ```
//!
//! All arithmetic is unsigned fixed point with a 256-bit intermediate; there
//! is no floating point anywhere in pricing.

pub mod consolidation;
pub mod crossing;
pub mod custody;
pub mod errors;
pub mod fixed_point;
pub mod global_state;
pub mod invariant;
pub mod ledger;
pub mod pool;
pub mod pool_traits;
pub mod registry;
pub mod swap_engine;
pub mod tick;

pub use custody::{Custody, CustodyError, InMemoryCustody, Owner, Transfer};
pub use errors::{Result, SphereError};
pub use fixed_point::FixedPoint;
pub use pool::{SpherePool, Transaction};
pub use pool_traits::AmmPool;
pub use swap_engine::{SwapReceipt, SwapRequest, SwapSegment};
pub use tick::{TickId, TickInfo, TickStatus};

/// Common types for decimal views
pub use rust_decimal::Decimal;
pub use sphere_config::PoolSettings;
