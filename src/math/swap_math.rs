use crate::error::Error;
use crate::math::math_helpers::{mul_div, mul_div_rounding_up};
use crate::math::sqrt_price_math::{
    get_amount_0_delta_base, get_amount_1_delta_base, get_next_sqrt_price_from_input,
    get_next_sqrt_price_from_output,
};
use alloy_primitives::{I256, U256};

const FEE_PIPS_DENOMINATOR: u32 = 1_000_000;

/// Computes the result of swapping within a single tick range: the price
/// reached, the input consumed, the output produced, and the fee charged.
///
/// `amount_remaining` is signed: positive means exact input still to spend,
/// negative means exact output still to deliver. The returned price lies
/// between the current price and `sqrt_ratio_target_x96`, inclusive of the
/// target.
///
/// The fee is taken from the input side. When an exact-input step exhausts
/// the remainder before reaching the target, the entire leftover becomes the
/// fee, so `amount_in + fee_amount` never exceeds the remainder.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: I256,
    fee_pips: u32,
) -> Result<(U256, U256, U256, U256), Error> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = !amount_remaining.is_negative();

    let sqrt_ratio_next_x96: U256;
    let mut amount_in = U256::ZERO;
    let mut amount_out = U256::ZERO;

    if exact_in {
        let amount_remaining_less_fee = mul_div(
            amount_remaining.into_raw(),
            U256::from(FEE_PIPS_DENOMINATOR - fee_pips),
            U256::from(FEE_PIPS_DENOMINATOR),
        )?;

        amount_in = if zero_for_one {
            get_amount_0_delta_base(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?
        } else {
            get_amount_1_delta_base(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                true,
            )
            .map_err(Error::from)?
        };

        sqrt_ratio_next_x96 = if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            get_amount_1_delta_base(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )
            .map_err(Error::from)?
        } else {
            get_amount_0_delta_base(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                false,
            )?
        };

        let amount_out_requested = amount_remaining.unsigned_abs();
        sqrt_ratio_next_x96 = if amount_out_requested >= amount_out {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                amount_out_requested,
                zero_for_one,
            )?
        };
    }

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    // recompute the amounts against the price actually reached
    if zero_for_one {
        if !(max && exact_in) {
            amount_in = get_amount_0_delta_base(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = get_amount_1_delta_base(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )
            .map_err(Error::from)?;
        }
    } else {
        if !(max && exact_in) {
            amount_in = get_amount_1_delta_base(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                true,
            )
            .map_err(Error::from)?;
        }
        if !(max && !exact_in) {
            amount_out = get_amount_0_delta_base(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                false,
            )?;
        }
    }

    // exact output never delivers more than requested, whatever rounding says
    if !exact_in && amount_out > amount_remaining.unsigned_abs() {
        amount_out = amount_remaining.unsigned_abs();
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // the step exhausted the remainder; everything not swapped is fee
        amount_remaining.into_raw() - amount_in
    } else {
        mul_div_rounding_up(
            amount_in,
            U256::from(fee_pips),
            U256::from(FEE_PIPS_DENOMINATOR - fee_pips),
        )?
    };

    Ok((sqrt_ratio_next_x96, amount_in, amount_out, fee_amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick_math::get_sqrt_ratio_at_tick;
    use std::str::FromStr;

    const Q96: U256 = crate::Q96;
    const L: u128 = 1_000_000_000_000_000_000;

    fn sqrt_121_over_100() -> U256 {
        // sqrt price after 0.1 token1 in at price 1: price 1.21
        U256::from_str("87150978765690771352898345369").unwrap()
    }

    #[test]
    fn exact_in_capped_at_target_one_for_zero() {
        let (next, amount_in, amount_out, fee) =
            compute_swap_step(Q96, sqrt_121_over_100(), L, I256::from_raw(U256::from(2e17 as u128)), 3000)
                .unwrap();

        assert_eq!(next, sqrt_121_over_100());
        assert_eq!(amount_in, U256::from(100000000000000000u128));
        assert_eq!(amount_out, U256::from(90909090909090909u128));
        assert_eq!(fee, U256::from(300902708124374u128));
    }

    #[test]
    fn exact_in_partial_fill_consumes_entire_remainder() {
        let remaining = U256::from(10000000000000000u128);
        let (next, amount_in, amount_out, fee) = compute_swap_step(
            Q96,
            sqrt_121_over_100(),
            L,
            I256::from_raw(remaining),
            3000,
        )
        .unwrap();

        assert_eq!(
            next,
            U256::from_str("80018067294531553039351583520").unwrap()
        );
        assert!(next < sqrt_121_over_100());
        assert_eq!(amount_in, U256::from(9970000000000000u128));
        assert_eq!(amount_out, U256::from(9871580343970612u128));
        // everything not swapped becomes fee
        assert_eq!(fee, U256::from(30000000000000u128));
        assert_eq!(amount_in + fee, remaining);
    }

    #[test]
    fn exact_out_partial_fill_zero_for_one() {
        let target = get_sqrt_ratio_at_tick(-6000).unwrap();
        let (next, amount_in, amount_out, fee) =
            compute_swap_step(Q96, target, L, -I256::from_raw(U256::from(1e16 as u128)), 3000)
                .unwrap();

        assert_eq!(
            next,
            U256::from_str("78435880889121694217608510832").unwrap()
        );
        assert!(next > target);
        assert_eq!(amount_in, U256::from(10101010101010102u128));
        assert_eq!(amount_out, U256::from(10000000000000000u128));
        assert_eq!(fee, U256::from(30394212941856u128));
    }

    #[test]
    fn exact_out_capped_at_target() {
        let target = get_sqrt_ratio_at_tick(-6000).unwrap();
        // more output requested than the range can deliver
        let requested = U256::from(259170667702403216u128 + 1_000_000_000_000_000);
        let (next, amount_in, amount_out, fee) =
            compute_swap_step(Q96, target, L, -I256::from_raw(requested), 3000).unwrap();

        assert_eq!(next, target);
        assert_eq!(amount_in, U256::from(349838561195485152u128));
        assert_eq!(amount_out, U256::from(259170667702403216u128));
        assert!(amount_out < requested);
        assert_eq!(fee, U256::from(1052673704700558u128));
    }

    #[test]
    fn exact_out_never_delivers_more_than_requested() {
        let target = get_sqrt_ratio_at_tick(-6000).unwrap();
        for requested in [1u128, 1_000, 1e12 as u128, 1e16 as u128] {
            let (_, _, amount_out, _) =
                compute_swap_step(Q96, target, L, -I256::from_raw(U256::from(requested)), 3000)
                    .unwrap();
            assert!(amount_out <= U256::from(requested));
        }
    }

    #[test]
    fn zero_fee_charges_nothing() {
        let (next, amount_in, amount_out, fee) = compute_swap_step(
            Q96,
            sqrt_121_over_100(),
            L,
            I256::from_raw(U256::from(1e16 as u128)),
            0,
        )
        .unwrap();

        assert_eq!(
            next,
            U256::from_str("80020444139406980969479389839").unwrap()
        );
        assert_eq!(amount_in, U256::from(10000000000000000u128));
        assert_eq!(amount_out, U256::from(9900990099009900u128));
        assert_eq!(fee, U256::ZERO);
    }

    #[test]
    fn at_target_is_a_no_op() {
        let (next, amount_in, amount_out, fee) =
            compute_swap_step(Q96, Q96, L, I256::from_raw(U256::from(1000u64)), 3000).unwrap();
        assert_eq!(next, Q96);
        assert_eq!(amount_in, U256::ZERO);
        assert_eq!(amount_out, U256::ZERO);
        assert_eq!(fee, U256::ZERO);
    }

    #[test]
    fn fee_grows_with_fee_tier_on_capped_steps() {
        let mut last_fee = U256::ZERO;
        for fee_pips in [500u32, 3000, 10000] {
            let (_, _, _, fee) = compute_swap_step(
                Q96,
                sqrt_121_over_100(),
                L,
                I256::from_raw(U256::from(2e17 as u128)),
                fee_pips,
            )
            .unwrap();
            assert!(fee > last_fee);
            last_fee = fee;
        }
    }
}
