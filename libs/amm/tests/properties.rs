//! Property-based tests for pool accounting
//!
//! Random deposit, withdrawal and swap sequences must keep every tick's
//! radius, share ledger, status and the global mirrors consistent, and
//! small zero-fee swaps must conserve the invariant.

use proptest::prelude::*;
use sphere_amm::tick::Geometry;
use sphere_amm::{FixedPoint, Owner, PoolSettings, SpherePool, SwapRequest, TickStatus};

const E18: u128 = 1_000_000_000_000_000_000;

fn geometry() -> Geometry {
    Geometry::new(FixedPoint::new(18).unwrap(), 3, 1).unwrap()
}

/// Plane constant at `ratio_bps` of the deposit radius
fn plane_for(amounts: &[u128], ratio_bps: u128) -> u128 {
    geometry().radius_of(amounts).unwrap() / 10_000 * ratio_bps
}

fn zero_fee_pool() -> SpherePool {
    SpherePool::new(PoolSettings {
        fee_bps: 0,
        ..PoolSettings::default()
    })
    .unwrap()
}

fn token_amounts(min: u128, max: u128) -> impl Strategy<Value = Vec<u128>> {
    prop::collection::vec(min * E18..max * E18, 3)
}

#[derive(Debug, Clone)]
enum Op {
    Add {
        owner: u8,
        amounts: Vec<u128>,
        ratio_bps: u128,
    },
    Remove {
        owner: u8,
        tick_index: usize,
        fraction_bps: u128,
    },
    Swap {
        token_in: usize,
        token_out: usize,
        amount_in: u128,
    },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3, token_amounts(1, 500), 7_500u128..22_000).prop_map(|(owner, amounts, ratio_bps)| {
            Op::Add {
                owner,
                amounts,
                ratio_bps,
            }
        }),
        (0u8..3, 0usize..4, 1u128..=10_000).prop_map(|(owner, tick_index, fraction_bps)| {
            Op::Remove {
                owner,
                tick_index,
                fraction_bps,
            }
        }),
        (0usize..3, 0usize..3, E18 / 100..50 * E18).prop_map(|(token_in, token_out, amount_in)| {
            Op::Swap {
                token_in,
                token_out,
                amount_in,
            }
        }),
    ]
}

fn apply(pool: &mut SpherePool, op: &Op) {
    // individual operations may fail; failures must leave state intact
    let _ = match op {
        Op::Add {
            owner,
            amounts,
            ratio_bps,
        } => pool
            .add_liquidity(Owner::repeat(*owner), plane_for(amounts, *ratio_bps), amounts)
            .map(|_| ()),
        Op::Remove {
            owner,
            tick_index,
            fraction_bps,
        } => {
            let ticks = pool.active_ticks();
            match ticks.get(*tick_index) {
                Some(&tick) => {
                    let owner = Owner::repeat(*owner);
                    let held = pool.user_shares(tick, &owner).unwrap_or(0);
                    pool.remove_liquidity(owner, tick, held / 10_000 * fraction_bps)
                        .map(|_| ())
                }
                None => Ok(()),
            }
        }
        Op::Swap {
            token_in,
            token_out,
            amount_in,
        } => pool
            .swap(SwapRequest {
                token_in: *token_in,
                token_out: *token_out,
                amount_in: *amount_in,
                min_amount_out: 0,
            })
            .map(|_| ()),
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_state_stays_consistent(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let mut pool = SpherePool::new(PoolSettings::default()).unwrap();
        for op in &ops {
            apply(&mut pool, op);
            prop_assert!(pool.verify_integrity().is_ok(), "integrity broken after {:?}", op);
        }
    }

    #[test]
    fn prop_failed_operations_leave_no_trace(
        amounts in token_amounts(10, 500),
        greedy in 1u128..1_000,
    ) {
        let mut pool = zero_fee_pool();
        let (tick, shares) = pool
            .add_liquidity(Owner::repeat(1), plane_for(&amounts, 15_000), &amounts)
            .unwrap();
        let before = pool.clone();

        let request = SwapRequest {
            token_in: 0,
            token_out: 1,
            amount_in: E18,
            // more than the out-reserve holds
            min_amount_out: amounts[1] + greedy,
        };
        prop_assert!(pool.swap(request).is_err());
        prop_assert!(pool.remove_liquidity(Owner::repeat(1), tick, shares + 1).is_err());
        prop_assert_eq!(&pool, &before);
    }

    #[test]
    fn prop_sole_provider_round_trip(
        amounts in token_amounts(1, 1_000),
        ratio_bps in 7_500u128..22_000,
    ) {
        let mut pool = zero_fee_pool();
        let owner = Owner::repeat(9);
        let (tick, shares) = pool
            .add_liquidity(owner, plane_for(&amounts, ratio_bps), &amounts)
            .unwrap();

        let info = pool.tick_info(tick).unwrap();
        prop_assert_eq!(shares, info.radius);
        prop_assert_eq!(info.liquidity, info.radius);

        let returned = pool.remove_liquidity(owner, tick, shares).unwrap();
        prop_assert_eq!(returned, amounts);
        prop_assert!(pool.active_ticks().is_empty());
    }

    #[test]
    fn prop_shares_sum_to_total(
        deposits in prop::collection::vec((0u8..4, 1u128..20), 1..8),
    ) {
        // balanced deposits keep the tick shape; the plane stays within bounds
        let mut pool = zero_fee_pool();
        let (tick, _) = pool
            .add_liquidity(Owner::repeat(100), 300 * E18, &[100 * E18; 3])
            .unwrap();
        for (owner, size) in deposits {
            pool.add_liquidity_to_tick(Owner::repeat(owner), tick, &[size * E18; 3])
                .unwrap();
        }

        let info = pool.tick_info(tick).unwrap();
        let held: u128 = [0u8, 1, 2, 3, 100]
            .iter()
            .map(|&b| pool.user_shares(tick, &Owner::repeat(b)).unwrap())
            .sum();
        prop_assert_eq!(held, info.total_lp_shares);
        prop_assert_eq!(info.liquidity, info.radius);
    }

    #[test]
    fn prop_small_swaps_conserve_invariant(
        amounts in token_amounts(100, 1_000),
        size_bps in 1u128..500,
        token_in in 0usize..3,
        offset in 1usize..3,
    ) {
        let mut pool = zero_fee_pool();
        // a plane well past the radius keeps the tick interior throughout
        let (tick, _) = pool
            .add_liquidity(Owner::repeat(1), plane_for(&amounts, 20_000), &amounts)
            .unwrap();

        let token_out = (token_in + offset) % 3;
        let amount_in = amounts[token_in].min(amounts[token_out]) / 10_000 * size_bps;
        let receipt = pool
            .swap(SwapRequest {
                token_in,
                token_out,
                amount_in,
                min_amount_out: 0,
            })
            .unwrap();

        prop_assert_eq!(receipt.segments.len(), 1);
        prop_assert!(receipt.amount_out > 0 && receipt.amount_out < amounts[token_out]);
        let drift = receipt.invariant_after.abs_diff(receipt.invariant_before);
        prop_assert!(
            drift <= receipt.invariant_before / 1_000,
            "invariant moved {} of {}",
            drift,
            receipt.invariant_before
        );
        prop_assert_eq!(pool.tick_info(tick).unwrap().status, TickStatus::Interior);
    }

    #[test]
    fn prop_segments_cover_input(
        ratio_bps in 7_400u128..10_500,
        amount_in in E18..80 * E18,
    ) {
        let mut pool = zero_fee_pool();
        let amounts = [100 * E18; 3];
        pool.add_liquidity(Owner::repeat(1), plane_for(&amounts, ratio_bps), &amounts)
            .unwrap();
        pool.add_liquidity(Owner::repeat(2), 95 * E18, &[50 * E18; 3])
            .unwrap();

        let request = SwapRequest {
            token_in: 0,
            token_out: 2,
            amount_in,
            min_amount_out: 0,
        };
        if let Ok(receipt) = pool.swap(request) {
            let consumed: u128 = receipt.segments.iter().map(|s| s.amount_in).sum();
            prop_assert_eq!(consumed, amount_in);
            prop_assert!(receipt.segments.iter().all(|s| s.amount_in > 0));
            prop_assert!(receipt.segments.len() <= pool.active_ticks().len() + 1);
            prop_assert!(pool.verify_integrity().is_ok());
        }
    }
}
