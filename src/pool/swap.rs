use crate::error::{Error, PaymentError, StateError, SwapError};
use crate::math::liquidity_math::add_delta;
use crate::math::math_helpers::{low_u128, mul_div, mul_div_rounding_up};
use crate::math::swap_math::compute_swap_step;
use crate::math::tick_bitmap::next_initialized_tick_within_one_word;
use crate::math::tick_math::{
    MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK, get_sqrt_ratio_at_tick,
    get_tick_at_sqrt_ratio,
};
use crate::Q128;
use crate::pool::state::{Payer, Pool};
use crate::pool::tick;
use alloy_primitives::{Address, I256, U256};
use std::ops::{Add, Sub};

// values read once at swap entry and carried across the loop
struct SwapCache {
    // in-range liquidity at the start of the swap
    liquidity_start: u128,
    // the protocol fee denominator for the input token
    fee_protocol: u8,
    // latest accumulators, computed lazily on the first tick cross
    seconds_per_liquidity_cumulative_x128: U256,
    tick_cumulative: i64,
    computed_latest_observation: bool,
}

// the top level state of the swap, the results of which are recorded in
// storage at the end
struct SwapState {
    // the amount remaining to be swapped in/out of the input/output asset
    amount_specified_remaining: I256,
    // the amount already swapped out/in of the output/input asset
    amount_calculated: I256,
    // current sqrt(price)
    sqrt_price_x96: U256,
    // the tick associated with the current price
    tick: i32,
    // the fee growth global of the input token
    fee_growth_global_x128: U256,
    // amount of input token paid as protocol fee
    protocol_fee: u128,
    // the current liquidity in range
    liquidity: u128,
}

struct StepComputations {
    // the price at the beginning of the step
    sqrt_price_start_x96: U256,
    // the next tick to swap to from the current tick in the swap direction
    tick_next: i32,
    // whether tick_next is initialized or not
    initialized: bool,
    // sqrt(price) for the next tick (1/0)
    sqrt_price_next_x96: U256,
    // how much is being swapped in in this step
    amount_in: U256,
    // how much is being swapped out
    amount_out: U256,
    // how much fee is being paid in
    fee_amount: U256,
}

impl Default for StepComputations {
    fn default() -> Self {
        Self {
            sqrt_price_start_x96: U256::ZERO,
            tick_next: 0,
            initialized: false,
            sqrt_price_next_x96: U256::ZERO,
            amount_in: U256::ZERO,
            amount_out: U256::ZERO,
            fee_amount: U256::ZERO,
        }
    }
}

impl Pool {
    /// Exchanges one asset for the other along the tick-indexed curve.
    ///
    /// `amount_specified` is positive for exact input and negative for exact
    /// output; the swap stops when it is exhausted or the price reaches
    /// `sqrt_price_limit_x96`. Returns the signed `(amount0, amount1)`
    /// balance deltas: positive amounts are owed to the pool, negative are
    /// paid to `recipient`. The output leg is paid out before the callback,
    /// which must deposit the input leg.
    #[allow(clippy::too_many_arguments)]
    pub fn swap<P: Payer>(
        &mut self,
        payer: &mut P,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: I256,
        sqrt_price_limit_x96: U256,
        data: &[u8],
        time: u32,
    ) -> Result<(I256, I256), Error> {
        if amount_specified.is_zero() {
            return Err(SwapError::AmountSpecifiedIsZero.into());
        }
        self.lock()?;
        let result = self.swap_locked(
            payer,
            recipient,
            zero_for_one,
            amount_specified,
            sqrt_price_limit_x96,
            data,
            time,
        );
        self.unlock();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_locked<P: Payer>(
        &mut self,
        payer: &mut P,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: I256,
        sqrt_price_limit_x96: U256,
        data: &[u8],
        time: u32,
    ) -> Result<(I256, I256), Error> {
        let slot0_start = self.slot0;

        if zero_for_one {
            if sqrt_price_limit_x96 >= slot0_start.sqrt_price_x96
                || sqrt_price_limit_x96 <= MIN_SQRT_RATIO
            {
                return Err(SwapError::SqrtPriceOutOfBounds.into());
            }
        } else if sqrt_price_limit_x96 <= slot0_start.sqrt_price_x96
            || sqrt_price_limit_x96 >= MAX_SQRT_RATIO
        {
            return Err(SwapError::SqrtPriceOutOfBounds.into());
        }

        let exact_input = amount_specified.is_positive();

        let mut cache = SwapCache {
            liquidity_start: self.liquidity,
            fee_protocol: if zero_for_one {
                slot0_start.fee_protocol % 16
            } else {
                slot0_start.fee_protocol >> 4
            },
            seconds_per_liquidity_cumulative_x128: U256::ZERO,
            tick_cumulative: 0,
            computed_latest_observation: false,
        };

        let mut state = SwapState {
            amount_specified_remaining: amount_specified,
            amount_calculated: I256::ZERO,
            sqrt_price_x96: slot0_start.sqrt_price_x96,
            tick: slot0_start.tick,
            fee_growth_global_x128: if zero_for_one {
                self.fee_growth_global_0_x128
            } else {
                self.fee_growth_global_1_x128
            },
            protocol_fee: 0,
            liquidity: cache.liquidity_start,
        };

        while !state.amount_specified_remaining.is_zero()
            && state.sqrt_price_x96 != sqrt_price_limit_x96
        {
            let mut step = StepComputations {
                sqrt_price_start_x96: state.sqrt_price_x96,
                ..StepComputations::default()
            };

            (step.tick_next, step.initialized) = next_initialized_tick_within_one_word(
                &self.bitmap,
                state.tick,
                self.tick_spacing,
                zero_for_one,
            );

            step.tick_next = step.tick_next.clamp(MIN_TICK, MAX_TICK);

            step.sqrt_price_next_x96 = get_sqrt_ratio_at_tick(step.tick_next)?;

            // swap toward the tick boundary, but never past the price limit
            (
                state.sqrt_price_x96,
                step.amount_in,
                step.amount_out,
                step.fee_amount,
            ) = compute_swap_step(
                state.sqrt_price_x96,
                if zero_for_one {
                    if step.sqrt_price_next_x96 < sqrt_price_limit_x96 {
                        sqrt_price_limit_x96
                    } else {
                        step.sqrt_price_next_x96
                    }
                } else if step.sqrt_price_next_x96 > sqrt_price_limit_x96 {
                    sqrt_price_limit_x96
                } else {
                    step.sqrt_price_next_x96
                },
                state.liquidity,
                state.amount_specified_remaining,
                self.fee_pips,
            )?;

            if exact_input {
                state.amount_specified_remaining -=
                    I256::from_raw(step.amount_in + step.fee_amount);
                state.amount_calculated =
                    state.amount_calculated.sub(I256::from_raw(step.amount_out));
            } else {
                state.amount_specified_remaining += I256::from_raw(step.amount_out);
                state.amount_calculated = state
                    .amount_calculated
                    .add(I256::from_raw(step.amount_in + step.fee_amount));
            }

            // the protocol takes its cut before the fee growth credit
            if cache.fee_protocol > 0 {
                let delta = step.fee_amount / U256::from(cache.fee_protocol);
                step.fee_amount -= delta;
                state.protocol_fee = state.protocol_fee.wrapping_add(low_u128(delta));
            }

            if state.liquidity > 0 {
                state.fee_growth_global_x128 = state
                    .fee_growth_global_x128
                    .wrapping_add(mul_div(step.fee_amount, Q128, U256::from(state.liquidity))?);
            }

            if state.sqrt_price_x96 == step.sqrt_price_next_x96 {
                // the boundary was actually reached; cross if initialized
                if step.initialized {
                    if !cache.computed_latest_observation {
                        let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                            self.observations.observe_single(
                                time,
                                0,
                                slot0_start.tick,
                                slot0_start.observation_index,
                                cache.liquidity_start,
                                slot0_start.observation_cardinality,
                            )?;
                        cache.tick_cumulative = tick_cumulative;
                        cache.seconds_per_liquidity_cumulative_x128 =
                            seconds_per_liquidity_cumulative_x128;
                        cache.computed_latest_observation = true;
                    }

                    let (fee_growth_0, fee_growth_1) = if zero_for_one {
                        (state.fee_growth_global_x128, self.fee_growth_global_1_x128)
                    } else {
                        (self.fee_growth_global_0_x128, state.fee_growth_global_x128)
                    };

                    let mut liquidity_net = tick::cross(
                        &mut self.ticks,
                        step.tick_next,
                        fee_growth_0,
                        fee_growth_1,
                        cache.seconds_per_liquidity_cumulative_x128,
                        cache.tick_cumulative,
                        time,
                    );
                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }
                    state.liquidity = add_delta(state.liquidity, liquidity_net)?;

                    log::trace!(
                        "crossed tick {} net={liquidity_net} liquidity={}",
                        step.tick_next,
                        state.liquidity
                    );
                }

                state.tick = if zero_for_one {
                    step.tick_next - 1
                } else {
                    step.tick_next
                };
            } else if state.sqrt_price_x96 != step.sqrt_price_start_x96 {
                state.tick = get_tick_at_sqrt_ratio(state.sqrt_price_x96)?;
            }
        }

        // a single observation per swap, written only when the tick moved
        if state.tick != slot0_start.tick {
            let (observation_index, observation_cardinality) = self.observations.write(
                slot0_start.observation_index,
                time,
                slot0_start.tick,
                cache.liquidity_start,
                slot0_start.observation_cardinality,
                slot0_start.observation_cardinality_next,
            );
            self.slot0.sqrt_price_x96 = state.sqrt_price_x96;
            self.slot0.tick = state.tick;
            self.slot0.observation_index = observation_index;
            self.slot0.observation_cardinality = observation_cardinality;
        } else {
            self.slot0.sqrt_price_x96 = state.sqrt_price_x96;
        }

        if cache.liquidity_start != state.liquidity {
            self.liquidity = state.liquidity;
        }

        if zero_for_one {
            self.fee_growth_global_0_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token0 =
                    self.protocol_fees.token0.wrapping_add(state.protocol_fee);
            }
        } else {
            self.fee_growth_global_1_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token1 =
                    self.protocol_fees.token1.wrapping_add(state.protocol_fee);
            }
        }

        let (amount0, amount1): (I256, I256) = if zero_for_one == exact_input {
            (
                amount_specified - state.amount_specified_remaining,
                state.amount_calculated,
            )
        } else {
            (
                state.amount_calculated,
                amount_specified - state.amount_specified_remaining,
            )
        };

        // pool pays the output leg first; the callback must deposit the
        // input leg, verified by balance diff
        if zero_for_one {
            if amount1.is_negative() {
                payer.transfer1(recipient, (-amount1).into_raw());
            }
            let balance0_before = payer.balance0();
            payer.swap_callback(amount0, amount1, data);
            if balance0_before + amount0.into_raw() > payer.balance0() {
                return Err(PaymentError::InsufficientInputReceived.into());
            }
        } else {
            if amount0.is_negative() {
                payer.transfer0(recipient, (-amount0).into_raw());
            }
            let balance1_before = payer.balance1();
            payer.swap_callback(amount0, amount1, data);
            if balance1_before + amount1.into_raw() > payer.balance1() {
                return Err(PaymentError::InsufficientInputReceived.into());
            }
        }

        log::debug!(
            "swap settled: amount0={amount0} amount1={amount1} tick={} liquidity={}",
            state.tick,
            state.liquidity
        );
        Ok((amount0, amount1))
    }

    /// Lends any portion of the pool balances for the duration of the
    /// callback; the callback must return principal plus fee. The fee, less
    /// any protocol cut, is credited to in-range liquidity.
    pub fn flash<P: Payer>(
        &mut self,
        payer: &mut P,
        recipient: Address,
        amount0: U256,
        amount1: U256,
        data: &[u8],
    ) -> Result<(), Error> {
        self.lock()?;
        let result = self.flash_locked(payer, recipient, amount0, amount1, data);
        self.unlock();
        result
    }

    fn flash_locked<P: Payer>(
        &mut self,
        payer: &mut P,
        recipient: Address,
        amount0: U256,
        amount1: U256,
        data: &[u8],
    ) -> Result<(), Error> {
        let liquidity = self.liquidity;
        if liquidity == 0 {
            return Err(StateError::LiquidityIsZero.into());
        }

        let fee_denominator = U256::from(1_000_000u32);
        let fee0 = mul_div_rounding_up(amount0, U256::from(self.fee_pips), fee_denominator)?;
        let fee1 = mul_div_rounding_up(amount1, U256::from(self.fee_pips), fee_denominator)?;

        let balance0_before = payer.balance0();
        let balance1_before = payer.balance1();

        if !amount0.is_zero() {
            payer.transfer0(recipient, amount0);
        }
        if !amount1.is_zero() {
            payer.transfer1(recipient, amount1);
        }

        payer.flash_callback(fee0, fee1, data);

        let balance0_after = payer.balance0();
        let balance1_after = payer.balance1();

        if balance0_before + fee0 > balance0_after {
            return Err(PaymentError::Token0Underpaid.into());
        }
        if balance1_before + fee1 > balance1_after {
            return Err(PaymentError::Token1Underpaid.into());
        }

        // anything paid beyond principal is fee, protocol cut first
        let paid0 = balance0_after - balance0_before;
        let paid1 = balance1_after - balance1_before;

        if !paid0.is_zero() {
            let fee_protocol_0 = self.slot0.fee_protocol % 16;
            let fees0 = if fee_protocol_0 == 0 {
                U256::ZERO
            } else {
                paid0 / U256::from(fee_protocol_0)
            };
            if !fees0.is_zero() {
                self.protocol_fees.token0 =
                    self.protocol_fees.token0.wrapping_add(low_u128(fees0));
            }
            self.fee_growth_global_0_x128 = self
                .fee_growth_global_0_x128
                .wrapping_add(mul_div(paid0 - fees0, Q128, U256::from(liquidity))?);
        }
        if !paid1.is_zero() {
            let fee_protocol_1 = self.slot0.fee_protocol >> 4;
            let fees1 = if fee_protocol_1 == 0 {
                U256::ZERO
            } else {
                paid1 / U256::from(fee_protocol_1)
            };
            if !fees1.is_zero() {
                self.protocol_fees.token1 =
                    self.protocol_fees.token1.wrapping_add(low_u128(fees1));
            }
            self.fee_growth_global_1_x128 = self
                .fee_growth_global_1_x128
                .wrapping_add(mul_div(paid1 - fees1, Q128, U256::from(liquidity))?);
        }

        log::debug!("flash settled: amount0={amount0} amount1={amount1} paid0={paid0} paid1={paid1}");
        Ok(())
    }
}
