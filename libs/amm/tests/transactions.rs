//! Transaction, Custody and Snapshot Tests
//!
//! Multi-operation transactions commit as one unit, custody failures roll
//! back the accounting they were settling, and snapshots restore a pool that
//! behaves exactly like the pool it was taken from.

use sphere_amm::{
    Custody, CustodyError, InMemoryCustody, Owner, PoolSettings, SphereError, SpherePool,
    SwapRequest, Transfer,
};

const E18: u128 = 1_000_000_000_000_000_000;

const ALICE: Owner = Owner::repeat(0xa1);
const BOB: Owner = Owner::repeat(0xb0);

fn pool() -> SpherePool {
    SpherePool::new(PoolSettings::default()).unwrap()
}

fn swap_request(amount_in: u128, min_amount_out: u128) -> SwapRequest {
    SwapRequest {
        token_in: 0,
        token_out: 1,
        amount_in,
        min_amount_out,
    }
}

/// Custody that refuses every instruction
struct Frozen;

impl Custody for Frozen {
    fn collect(&mut self, _from: &Owner, _transfers: &[Transfer]) -> Result<(), CustodyError> {
        Err(CustodyError::Rejected("account frozen".to_string()))
    }

    fn disburse(&mut self, _to: &Owner, _transfers: &[Transfer]) -> Result<(), CustodyError> {
        Err(CustodyError::Rejected("account frozen".to_string()))
    }
}

#[test]
fn test_transaction_commits_every_operation() {
    let mut pool = pool();

    let receipt = pool
        .transaction(|tx| {
            let (tick, _) = tx.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3])?;
            tx.add_liquidity_to_tick(BOB, tick, &[10 * E18; 3])?;
            assert_eq!(tx.tick_info(tick)?.reserves, vec![110 * E18; 3]);
            tx.swap(&swap_request(5 * E18, 0))
        })
        .unwrap();

    assert!(receipt.amount_out > 0);
    let (totals, _) = pool.global_state();
    assert_eq!(totals[0], 115 * E18);
    assert_eq!(totals[1], 110 * E18 - receipt.amount_out);
    pool.verify_integrity().unwrap();
}

#[test]
fn test_transaction_rolls_back_on_failure() {
    let mut pool = pool();
    let before = pool.clone();

    let result = pool.transaction(|tx| {
        tx.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3])?;
        tx.swap(&swap_request(10 * E18, 10 * E18))
    });

    assert!(matches!(result, Err(SphereError::SlippageExceeded { .. })));
    assert_eq!(pool, before);
    assert!(pool.active_ticks().is_empty());
}

#[test]
fn test_swallowed_failure_leaves_no_partial_state() {
    let mut pool = pool();
    pool.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3])
        .unwrap();
    let before = pool.clone();

    // the swap fails its slippage check after pricing every segment
    let outcome = pool.transaction(|tx| {
        let refused = tx.swap(&swap_request(10 * E18, 10 * E18));
        assert!(matches!(refused, Err(SphereError::SlippageExceeded { .. })));
        Ok(())
    });

    assert!(outcome.is_ok());
    assert_eq!(pool, before);
    pool.verify_integrity().unwrap();

    // a later swap in the same transaction prices off untouched reserves
    let direct = before.quote(swap_request(5 * E18, 0)).unwrap();
    let receipt = pool
        .transaction(|tx| {
            let _ = tx.swap(&swap_request(10 * E18, 10 * E18));
            tx.swap(&swap_request(5 * E18, 0))
        })
        .unwrap();
    assert_eq!(receipt, direct);
}

#[test]
fn test_deposit_and_withdraw_move_tokens() {
    let mut pool = pool();
    let mut custody = InMemoryCustody::new();
    for asset in 0..3 {
        custody.mint(ALICE, asset, 100 * E18);
    }

    let (tick, shares) = pool
        .deposit(&mut custody, ALICE, 200 * E18, &[100 * E18; 3])
        .unwrap();
    for asset in 0..3 {
        assert_eq!(custody.balance(&ALICE, asset), 0);
        assert_eq!(custody.pool_balance(asset), 100 * E18);
    }

    let returned = pool.withdraw(&mut custody, ALICE, tick, shares).unwrap();
    assert_eq!(returned, vec![100 * E18; 3]);
    for asset in 0..3 {
        assert_eq!(custody.balance(&ALICE, asset), 100 * E18);
        assert_eq!(custody.pool_balance(asset), 0);
    }
    pool.verify_integrity().unwrap();
}

#[test]
fn test_unfunded_deposit_is_rolled_back() {
    let mut pool = pool();
    let mut custody = InMemoryCustody::new();
    custody.mint(BOB, 0, 10 * E18);
    let before = pool.clone();

    let err = pool
        .deposit(&mut custody, BOB, 200 * E18, &[50 * E18; 3])
        .unwrap_err();
    assert_eq!(
        err,
        SphereError::Custody(CustodyError::InsufficientBalance {
            asset: 0,
            requested: 50 * E18,
            available: 10 * E18
        })
    );
    assert_eq!(pool, before);
    assert_eq!(custody.balance(&BOB, 0), 10 * E18);
    assert_eq!(custody.pool_balance(0), 0);
}

#[test]
fn test_rejecting_custody_blocks_withdrawal() {
    let mut pool = pool();
    let (tick, shares) = pool.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3]).unwrap();
    let before = pool.clone();

    let err = pool.withdraw(&mut Frozen, ALICE, tick, shares).unwrap_err();
    assert!(matches!(
        err,
        SphereError::Custody(CustodyError::Rejected(_))
    ));
    assert_eq!(pool, before);
    assert_eq!(pool.user_shares(tick, &ALICE).unwrap(), shares);
}

#[test]
fn test_trade_settles_both_legs() {
    let mut pool = pool();
    let mut custody = InMemoryCustody::new();
    for asset in 0..3 {
        custody.mint(ALICE, asset, 100 * E18);
    }
    pool.deposit(&mut custody, ALICE, 200 * E18, &[100 * E18; 3])
        .unwrap();
    custody.mint(BOB, 0, 10 * E18);

    let receipt = pool
        .trade(&mut custody, BOB, swap_request(10 * E18, 0))
        .unwrap();

    assert_eq!(custody.balance(&BOB, 0), 0);
    assert_eq!(custody.balance(&BOB, 1), receipt.amount_out);
    assert_eq!(custody.pool_balance(0), 110 * E18);
    assert_eq!(custody.pool_balance(1), 100 * E18 - receipt.amount_out);

    // custody holdings track the pool's books
    let (totals, _) = pool.global_state();
    for (asset, &total) in totals.iter().enumerate() {
        assert_eq!(custody.pool_balance(asset), total);
    }
}

#[test]
fn test_failed_payout_refunds_input() {
    let mut pool = pool();
    // liquidity booked without custody, so the payout leg cannot be funded
    pool.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3])
        .unwrap();
    let mut custody = InMemoryCustody::new();
    custody.mint(BOB, 0, 10 * E18);
    let before = pool.clone();

    let err = pool
        .trade(&mut custody, BOB, swap_request(10 * E18, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        SphereError::Custody(CustodyError::InsufficientBalance { asset: 1, .. })
    ));
    assert_eq!(pool, before);
    assert_eq!(custody.balance(&BOB, 0), 10 * E18);
    assert_eq!(custody.pool_balance(0), 0);
}

#[test]
fn test_snapshot_restore_round_trip() -> anyhow::Result<()> {
    let mut pool = pool();
    pool.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3])?;
    pool.add_liquidity(BOB, 95 * E18, &[50 * E18; 3])?;
    pool.swap(swap_request(12 * E18, 0))?;

    let bytes = pool.snapshot()?;
    let mut restored = SpherePool::restore(&bytes)?;
    assert_eq!(restored, pool);
    restored.verify_integrity()?;

    // both copies keep pricing identically
    let request = SwapRequest {
        token_in: 2,
        token_out: 0,
        amount_in: 3 * E18,
        min_amount_out: 0,
    };
    assert_eq!(restored.swap(request)?, pool.swap(request)?);
    Ok(())
}

#[test]
fn test_restore_rejects_corrupt_bytes() {
    let mut pool = pool();
    pool.add_liquidity(ALICE, 200 * E18, &[100 * E18; 3])
        .unwrap();
    let bytes = pool.snapshot().unwrap();

    let truncated = &bytes[..bytes.len() / 2];
    assert!(matches!(
        SpherePool::restore(truncated),
        Err(SphereError::Snapshot(_))
    ));
    assert!(matches!(
        SpherePool::restore(&[]),
        Err(SphereError::Snapshot(_))
    ));
}
