//! Pool trait definitions for a unified quoting interface

use crate::errors::Result;
use crate::pool::SpherePool;
use crate::swap_engine::SwapRequest;

/// Read-only pool interface for routers and strategies
pub trait AmmPool {
    /// Calculate output amount for a given input, fees included
    fn get_amount_out(&self, token_in: usize, token_out: usize, amount_in: u128) -> Result<u128>;

    /// Get current per-asset reserves
    fn get_liquidity(&self) -> Vec<u128>;

    /// Get fee tier
    fn get_fee_bps(&self) -> u32;
}

impl AmmPool for SpherePool {
    fn get_amount_out(&self, token_in: usize, token_out: usize, amount_in: u128) -> Result<u128> {
        let receipt = self.quote(SwapRequest {
            token_in,
            token_out,
            amount_in,
            min_amount_out: 0,
        })?;
        Ok(receipt.amount_out)
    }

    fn get_liquidity(&self) -> Vec<u128> {
        self.global_state().0.to_vec()
    }

    fn get_fee_bps(&self) -> u32 {
        self.fee_bps()
    }
}
