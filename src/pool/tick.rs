use crate::FastMap;
use crate::error::{Error, StateError};
use crate::math::liquidity_math::add_delta;
use crate::math::tick_math::{MAX_TICK, MIN_TICK};
use alloy_primitives::U256;

/// Book-keeping record for one initialized tick.
///
/// The `*_outside` accumulators hold growth observed on the side of the tick
/// opposite the current tick. They only have relative meaning; the absolute
/// value depends on when the tick was initialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickInfo {
    /// total position liquidity referencing this tick as an endpoint
    pub liquidity_gross: u128,
    /// net liquidity added when the tick is crossed left to right
    pub liquidity_net: i128,
    pub fee_growth_outside_0_x128: U256,
    pub fee_growth_outside_1_x128: U256,
    pub tick_cumulative_outside: i64,
    pub seconds_per_liquidity_outside_x128: U256,
    pub seconds_outside: u32,
    pub initialized: bool,
}

/// Derives the per-tick liquidity cap from the tick spacing so that the
/// summed gross liquidity of all usable ticks can never overflow a u128.
pub fn tick_spacing_to_max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}

/// Reads a tick entry; absent ticks are all-zero.
pub fn get(ticks: &FastMap<i32, TickInfo>, tick: i32) -> TickInfo {
    ticks.get(&tick).copied().unwrap_or_default()
}

/// Computes the fee growth attributable to the price having been inside
/// `[tick_lower, tick_upper]`, in token0 and token1.
///
/// `inside = global - below(lower) - above(upper)`; the subtractions are
/// modular, which keeps the result correct across accumulator wrap.
pub fn get_fee_growth_inside(
    ticks: &FastMap<i32, TickInfo>,
    tick_lower: i32,
    tick_upper: i32,
    tick_current: i32,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
) -> (U256, U256) {
    let lower = get(ticks, tick_lower);
    let upper = get(ticks, tick_upper);

    let (below_0, below_1) = if tick_current >= tick_lower {
        (
            lower.fee_growth_outside_0_x128,
            lower.fee_growth_outside_1_x128,
        )
    } else {
        (
            fee_growth_global_0_x128.wrapping_sub(lower.fee_growth_outside_0_x128),
            fee_growth_global_1_x128.wrapping_sub(lower.fee_growth_outside_1_x128),
        )
    };

    let (above_0, above_1) = if tick_current < tick_upper {
        (
            upper.fee_growth_outside_0_x128,
            upper.fee_growth_outside_1_x128,
        )
    } else {
        (
            fee_growth_global_0_x128.wrapping_sub(upper.fee_growth_outside_0_x128),
            fee_growth_global_1_x128.wrapping_sub(upper.fee_growth_outside_1_x128),
        )
    };

    (
        fee_growth_global_0_x128
            .wrapping_sub(below_0)
            .wrapping_sub(above_0),
        fee_growth_global_1_x128
            .wrapping_sub(below_1)
            .wrapping_sub(above_1),
    )
}

/// Applies a liquidity delta to one endpoint tick.
///
/// On first initialization the outside accumulators are seeded from the
/// globals when the tick is at or below the current tick; all prior growth
/// is attributed below the tick by convention. Returns whether the tick
/// flipped between initialized and uninitialized.
#[allow(clippy::too_many_arguments)]
pub fn update(
    ticks: &mut FastMap<i32, TickInfo>,
    tick: i32,
    tick_current: i32,
    liquidity_delta: i128,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    seconds_per_liquidity_cumulative_x128: U256,
    tick_cumulative: i64,
    time: u32,
    upper: bool,
    max_liquidity: u128,
) -> Result<bool, Error> {
    let mut info = get(ticks, tick);

    let liquidity_gross_before = info.liquidity_gross;
    let liquidity_gross_after = add_delta(liquidity_gross_before, liquidity_delta)?;

    if liquidity_gross_after > max_liquidity {
        return Err(StateError::LiquidityPerTickOverflow.into());
    }

    let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

    if liquidity_gross_before == 0 {
        if tick <= tick_current {
            info.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
            info.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
            info.seconds_per_liquidity_outside_x128 = seconds_per_liquidity_cumulative_x128;
            info.tick_cumulative_outside = tick_cumulative;
            info.seconds_outside = time;
        }
        info.initialized = true;
    }

    info.liquidity_gross = liquidity_gross_after;
    info.liquidity_net = if upper {
        info.liquidity_net
            .checked_sub(liquidity_delta)
            .ok_or(crate::error::MathError::Overflow)?
    } else {
        info.liquidity_net
            .checked_add(liquidity_delta)
            .ok_or(crate::error::MathError::Overflow)?
    };

    ticks.insert(tick, info);
    Ok(flipped)
}

/// Deletes a tick entry. Callers invoke this only after `update` reported a
/// flip on a liquidity removal.
pub fn clear(ticks: &mut FastMap<i32, TickInfo>, tick: i32) {
    ticks.remove(&tick);
}

/// Transitions a tick as the price moves across it, negating every outside
/// accumulator relative to the globals. Returns the net liquidity to apply
/// for a left-to-right crossing.
pub fn cross(
    ticks: &mut FastMap<i32, TickInfo>,
    tick: i32,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    seconds_per_liquidity_cumulative_x128: U256,
    tick_cumulative: i64,
    time: u32,
) -> i128 {
    let info = ticks.entry(tick).or_default();
    info.fee_growth_outside_0_x128 =
        fee_growth_global_0_x128.wrapping_sub(info.fee_growth_outside_0_x128);
    info.fee_growth_outside_1_x128 =
        fee_growth_global_1_x128.wrapping_sub(info.fee_growth_outside_1_x128);
    info.seconds_per_liquidity_outside_x128 = seconds_per_liquidity_cumulative_x128
        .wrapping_sub(info.seconds_per_liquidity_outside_x128);
    info.tick_cumulative_outside = tick_cumulative.wrapping_sub(info.tick_cumulative_outside);
    info.seconds_outside = time.wrapping_sub(info.seconds_outside);
    info.liquidity_net
}
