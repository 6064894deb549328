use crate::Q128;
use crate::error::{Error, StateError};
use crate::math::liquidity_math::add_delta;
use crate::math::math_helpers::{low_u128, mul_div};
use alloy_primitives::{Address, U256};

/// Positions are keyed by owner and range; one owner can hold many
/// disjoint or overlapping ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PositionInfo {
    /// liquidity contributed by this position
    pub liquidity: u128,
    /// inside growth snapshots as of the last touch
    pub fee_growth_inside_0_last_x128: U256,
    pub fee_growth_inside_1_last_x128: U256,
    /// credited but uncollected amounts; wrap at 2^128 and must be
    /// collected before that happens
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

/// Credits accrued fees to a position and applies a liquidity delta.
///
/// A zero-delta touch ("poke") of an empty position is rejected. The inside
/// growth deltas are modular, matching the outside-accumulator convention.
pub fn update(
    position: &mut PositionInfo,
    liquidity_delta: i128,
    fee_growth_inside_0_x128: U256,
    fee_growth_inside_1_x128: U256,
) -> Result<(), Error> {
    let liquidity_next = if liquidity_delta == 0 {
        if position.liquidity == 0 {
            return Err(StateError::NoPositionLiquidity.into());
        }
        position.liquidity
    } else {
        add_delta(position.liquidity, liquidity_delta)?
    };

    let tokens_owed_0 = mul_div(
        fee_growth_inside_0_x128.wrapping_sub(position.fee_growth_inside_0_last_x128),
        U256::from(position.liquidity),
        Q128,
    )?;
    let tokens_owed_1 = mul_div(
        fee_growth_inside_1_x128.wrapping_sub(position.fee_growth_inside_1_last_x128),
        U256::from(position.liquidity),
        Q128,
    )?;

    if liquidity_delta != 0 {
        position.liquidity = liquidity_next;
    }
    position.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
    position.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;

    if !tokens_owed_0.is_zero() || !tokens_owed_1.is_zero() {
        position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(low_u128(tokens_owed_0));
        position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(low_u128(tokens_owed_1));
    }

    Ok(())
}
