use crate::FastMap;
use crate::error::{Error, MathError, PaymentError, StateError};
use crate::math::liquidity_math::add_delta;
use crate::math::math_helpers::low_u128;
use crate::math::sqrt_price_math::{get_amount_0_delta, get_amount_1_delta};
use crate::math::tick_bitmap;
use crate::math::tick_math::{self, MAX_TICK, MIN_TICK};
use crate::pool::oracle::ObservationRing;
use crate::pool::position::{self, PositionInfo, PositionKey};
use crate::pool::tick::{self, TickInfo};
use alloy_primitives::{Address, I256, U160, U256};

/// Host-side payment surface for the pool's inversion-of-control protocol.
///
/// `balance0`/`balance1` report the pool's holdings at the external token
/// contracts; `transfer0`/`transfer1` move pool holdings out. The callbacks
/// are invoked mid-operation and must deposit whatever the pool is owed
/// before returning; the pool verifies by balance diff afterwards.
///
/// Implementations are passed per call and never stored on the pool.
pub trait Payer {
    fn balance0(&self) -> U256;
    fn balance1(&self) -> U256;
    fn transfer0(&mut self, to: Address, amount: U256);
    fn transfer1(&mut self, to: Address, amount: U256);
    fn mint_callback(&mut self, amount0_owed: U256, amount1_owed: U256, data: &[u8]);
    fn swap_callback(&mut self, amount0_delta: I256, amount1_delta: I256, data: &[u8]);
    fn flash_callback(&mut self, fee0: U256, fee1: U256, data: &[u8]);
}

/// The frequently-touched head of the pool state.
#[derive(Clone, Copy, Debug)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub observation_index: u16,
    pub observation_cardinality: u16,
    pub observation_cardinality_next: u16,
    /// two packed 4-bit denominators, token0 in the low nibble
    pub fee_protocol: u8,
    pub unlocked: bool,
}

impl Default for Slot0 {
    fn default() -> Self {
        Self {
            sqrt_price_x96: U256::ZERO,
            tick: 0,
            observation_index: 0,
            observation_cardinality: 0,
            observation_cardinality_next: 0,
            fee_protocol: 0,
            unlocked: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolFees {
    pub token0: u128,
    pub token1: u128,
}

/// Converts an `Address` into its `U160` numeric representation, mainly to
/// compare or sort addresses by value.
#[inline(always)]
pub fn address_to_u160(address: Address) -> U160 {
    address.into()
}

/// Returns the token pair sorted by numeric address, the canonical
/// `(token0, token1)` ordering.
pub fn sort_tokens(token0: Address, token1: Address) -> (Address, Address) {
    if address_to_u160(token0) < address_to_u160(token1) {
        (token0, token1)
    } else {
        (token1, token0)
    }
}

/// A concentrated-liquidity pool of two assets.
///
/// The host owns this value and drives it through the public operations;
/// the host is also expected to provide transactional semantics: a mutating
/// operation that returns `Err` may have touched state, and the value must
/// then be discarded in favor of the pre-call copy.
#[derive(Clone, Debug)]
pub struct Pool {
    pub token0: Address,
    pub token1: Address,
    pub fee_pips: u32,
    pub tick_spacing: i32,
    pub max_liquidity_per_tick: u128,
    /// authorized for protocol-fee administration
    pub owner: Address,

    pub slot0: Slot0,
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,
    pub protocol_fees: ProtocolFees,
    pub liquidity: u128,

    pub ticks: FastMap<i32, TickInfo>,
    pub bitmap: FastMap<i16, U256>,
    pub positions: FastMap<PositionKey, PositionInfo>,
    pub observations: ObservationRing,
}

impl Pool {
    /// Constructs an inert pool; [`Pool::initialize`] must run before any
    /// other operation will accept the lock.
    pub fn new(
        owner: Address,
        token0: Address,
        token1: Address,
        fee_pips: u32,
        tick_spacing: i32,
    ) -> Self {
        let (token0, token1) = sort_tokens(token0, token1);

        Self {
            token0,
            token1,
            fee_pips,
            tick_spacing,
            max_liquidity_per_tick: tick::tick_spacing_to_max_liquidity_per_tick(tick_spacing),
            owner,
            slot0: Slot0::default(),
            fee_growth_global_0_x128: U256::ZERO,
            fee_growth_global_1_x128: U256::ZERO,
            protocol_fees: ProtocolFees::default(),
            liquidity: 0,
            ticks: FastMap::default(),
            bitmap: FastMap::default(),
            positions: FastMap::default(),
            observations: ObservationRing::default(),
        }
    }

    /// Seeds the starting price, derives the tick, and records the first
    /// oracle observation. Callable exactly once.
    pub fn initialize(&mut self, sqrt_price_x96: U256, time: u32) -> Result<i32, Error> {
        if !self.slot0.sqrt_price_x96.is_zero() {
            return Err(StateError::AlreadyInitialized.into());
        }

        let tick = tick_math::get_tick_at_sqrt_ratio(sqrt_price_x96)?;
        let (cardinality, cardinality_next) = self.observations.initialize(time);

        self.slot0 = Slot0 {
            sqrt_price_x96,
            tick,
            observation_index: 0,
            observation_cardinality: cardinality,
            observation_cardinality_next: cardinality_next,
            fee_protocol: 0,
            unlocked: true,
        };

        log::debug!("pool initialized at tick {tick}");
        Ok(tick)
    }

    pub(crate) fn lock(&mut self) -> Result<(), Error> {
        if !self.slot0.unlocked {
            return Err(StateError::Locked.into());
        }
        self.slot0.unlocked = false;
        Ok(())
    }

    pub(crate) fn unlock(&mut self) {
        self.slot0.unlocked = true;
    }

    fn check_ticks(&self, tick_lower: i32, tick_upper: i32) -> Result<(), Error> {
        if tick_lower >= tick_upper {
            return Err(StateError::InvalidTickRange.into());
        }
        if tick_lower < MIN_TICK || tick_upper > MAX_TICK {
            return Err(StateError::TickOutOfBounds.into());
        }
        if tick_lower % self.tick_spacing != 0 || tick_upper % self.tick_spacing != 0 {
            return Err(StateError::TickNotAligned.into());
        }
        Ok(())
    }

    /// Adds liquidity to a position. The payment callback must deposit the
    /// owed amounts before returning; the deposit is verified by balance
    /// diff. Returns the amounts the pool collected.
    pub fn mint<P: Payer>(
        &mut self,
        payer: &mut P,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        data: &[u8],
        time: u32,
    ) -> Result<(U256, U256), Error> {
        self.lock()?;
        let result = self.mint_locked(payer, recipient, tick_lower, tick_upper, amount, data, time);
        self.unlock();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn mint_locked<P: Payer>(
        &mut self,
        payer: &mut P,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        data: &[u8],
        time: u32,
    ) -> Result<(U256, U256), Error> {
        if amount == 0 {
            return Err(StateError::AmountIsZero.into());
        }
        let liquidity_delta = i128::try_from(amount).map_err(|_| MathError::Overflow)?;

        let (amount0_int, amount1_int) =
            self.modify_position(recipient, tick_lower, tick_upper, liquidity_delta, time)?;

        let amount0 = amount0_int.into_raw();
        let amount1 = amount1_int.into_raw();

        let balance0_before = if amount0.is_zero() {
            U256::ZERO
        } else {
            payer.balance0()
        };
        let balance1_before = if amount1.is_zero() {
            U256::ZERO
        } else {
            payer.balance1()
        };

        payer.mint_callback(amount0, amount1, data);

        if !amount0.is_zero() && balance0_before + amount0 > payer.balance0() {
            return Err(PaymentError::Token0Underpaid.into());
        }
        if !amount1.is_zero() && balance1_before + amount1 > payer.balance1() {
            return Err(PaymentError::Token1Underpaid.into());
        }

        log::debug!(
            "mint: owner={recipient} range=[{tick_lower},{tick_upper}] liquidity={amount} \
             amount0={amount0} amount1={amount1}"
        );
        Ok((amount0, amount1))
    }

    /// Removes liquidity from the caller's position. The freed principal is
    /// credited to `tokens_owed` and paid out later through
    /// [`Pool::collect`]. A zero-amount burn acts as a fee poke.
    pub fn burn(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(U256, U256), Error> {
        self.lock()?;
        let result = self.burn_locked(owner, tick_lower, tick_upper, amount, time);
        self.unlock();
        result
    }

    fn burn_locked(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(U256, U256), Error> {
        let liquidity_delta = i128::try_from(amount).map_err(|_| MathError::Overflow)?;

        let (amount0_int, amount1_int) =
            self.modify_position(owner, tick_lower, tick_upper, -liquidity_delta, time)?;

        let amount0 = (-amount0_int).into_raw();
        let amount1 = (-amount1_int).into_raw();

        if !amount0.is_zero() || !amount1.is_zero() {
            let key = PositionKey {
                owner,
                tick_lower,
                tick_upper,
            };
            let position = self.positions.entry(key).or_default();
            position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(low_u128(amount0));
            position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(low_u128(amount1));
        }

        log::debug!(
            "burn: owner={owner} range=[{tick_lower},{tick_upper}] liquidity={amount} \
             amount0={amount0} amount1={amount1}"
        );
        Ok((amount0, amount1))
    }

    /// Pays out accrued fees and burned principal, capping each request at
    /// what the position is owed.
    #[allow(clippy::too_many_arguments)]
    pub fn collect<P: Payer>(
        &mut self,
        payer: &mut P,
        owner: Address,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> Result<(u128, u128), Error> {
        self.lock()?;

        let key = PositionKey {
            owner,
            tick_lower,
            tick_upper,
        };
        let position = self.positions.entry(key).or_default();

        let amount0 = amount0_requested.min(position.tokens_owed_0);
        let amount1 = amount1_requested.min(position.tokens_owed_1);

        position.tokens_owed_0 -= amount0;
        position.tokens_owed_1 -= amount1;

        if amount0 > 0 {
            payer.transfer0(recipient, U256::from(amount0));
        }
        if amount1 > 0 {
            payer.transfer1(recipient, U256::from(amount1));
        }

        log::debug!(
            "collect: owner={owner} range=[{tick_lower},{tick_upper}] \
             amount0={amount0} amount1={amount1}"
        );
        self.unlock();
        Ok((amount0, amount1))
    }

    /// Applies a liquidity delta to a position and computes the token
    /// amounts it moves, depending on where the current price sits relative
    /// to the range. Positive results are owed to the pool, negative to the
    /// position owner.
    fn modify_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        time: u32,
    ) -> Result<(I256, I256), Error> {
        self.check_ticks(tick_lower, tick_upper)?;

        let slot0 = self.slot0;
        self.update_position(owner, tick_lower, tick_upper, liquidity_delta, slot0.tick, time)?;

        let mut amount0 = I256::ZERO;
        let mut amount1 = I256::ZERO;

        if liquidity_delta != 0 {
            if slot0.tick < tick_lower {
                // the range is entirely above the price: all token0
                amount0 = get_amount_0_delta(
                    tick_math::get_sqrt_ratio_at_tick(tick_lower)?,
                    tick_math::get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            } else if slot0.tick < tick_upper {
                // in range: the active liquidity changes, which the oracle
                // must see
                let (observation_index, observation_cardinality) = self.observations.write(
                    slot0.observation_index,
                    time,
                    slot0.tick,
                    self.liquidity,
                    slot0.observation_cardinality,
                    slot0.observation_cardinality_next,
                );
                self.slot0.observation_index = observation_index;
                self.slot0.observation_cardinality = observation_cardinality;

                amount0 = get_amount_0_delta(
                    slot0.sqrt_price_x96,
                    tick_math::get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
                amount1 = get_amount_1_delta(
                    tick_math::get_sqrt_ratio_at_tick(tick_lower)?,
                    slot0.sqrt_price_x96,
                    liquidity_delta,
                )
                .map_err(Error::from)?;

                self.liquidity = add_delta(self.liquidity, liquidity_delta)?;
            } else {
                // entirely below the price: all token1
                amount1 = get_amount_1_delta(
                    tick_math::get_sqrt_ratio_at_tick(tick_lower)?,
                    tick_math::get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )
                .map_err(Error::from)?;
            }
        }

        Ok((amount0, amount1))
    }

    /// Updates the endpoint ticks, the bitmap, and the position record for
    /// a liquidity change.
    fn update_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        current_tick: i32,
        time: u32,
    ) -> Result<(), Error> {
        let mut flipped_lower = false;
        let mut flipped_upper = false;

        if liquidity_delta != 0 {
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.observations.observe_single(
                    time,
                    0,
                    self.slot0.tick,
                    self.slot0.observation_index,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                )?;

            flipped_lower = tick::update(
                &mut self.ticks,
                tick_lower,
                current_tick,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                false,
                self.max_liquidity_per_tick,
            )?;
            flipped_upper = tick::update(
                &mut self.ticks,
                tick_upper,
                current_tick,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                true,
                self.max_liquidity_per_tick,
            )?;

            if flipped_lower {
                tick_bitmap::flip_tick(&mut self.bitmap, tick_lower, self.tick_spacing)?;
            }
            if flipped_upper {
                tick_bitmap::flip_tick(&mut self.bitmap, tick_upper, self.tick_spacing)?;
            }
        }

        let (fee_growth_inside_0_x128, fee_growth_inside_1_x128) = tick::get_fee_growth_inside(
            &self.ticks,
            tick_lower,
            tick_upper,
            current_tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );

        let key = PositionKey {
            owner,
            tick_lower,
            tick_upper,
        };
        let position_entry = self.positions.entry(key).or_default();
        position::update(
            position_entry,
            liquidity_delta,
            fee_growth_inside_0_x128,
            fee_growth_inside_1_x128,
        )?;

        // deinitialized endpoints are deleted on removals
        if liquidity_delta < 0 {
            if flipped_lower {
                tick::clear(&mut self.ticks, tick_lower);
            }
            if flipped_upper {
                tick::clear(&mut self.ticks, tick_upper);
            }
        }

        Ok(())
    }

    /// Reserves oracle ring capacity up to `desired` observations, paid for
    /// by the caller. No-op if the reservation is already at least that big.
    pub fn increase_observation_cardinality_next(&mut self, desired: u16) -> Result<u16, Error> {
        self.lock()?;
        let result = self
            .observations
            .grow(self.slot0.observation_cardinality_next, desired);
        let result = match result {
            Ok(next) => {
                self.slot0.observation_cardinality_next = next;
                Ok(next)
            }
            Err(e) => Err(e.into()),
        };
        self.unlock();
        result
    }

    /// Sets the protocol's cut of swap fees, one denominator per direction,
    /// each 0 (off) or between 1/4 and 1/10.
    pub fn set_fee_protocol(
        &mut self,
        caller: Address,
        fee_protocol_0: u8,
        fee_protocol_1: u8,
    ) -> Result<u8, Error> {
        if caller != self.owner {
            return Err(StateError::Unauthorized.into());
        }
        self.lock()?;

        let valid = |f: u8| f == 0 || (4..=10).contains(&f);
        let result = if valid(fee_protocol_0) && valid(fee_protocol_1) {
            let packed = fee_protocol_0 + (fee_protocol_1 << 4);
            self.slot0.fee_protocol = packed;
            Ok(packed)
        } else {
            Err(StateError::InvalidFeeProtocol.into())
        };

        self.unlock();
        result
    }

    /// Withdraws accrued protocol fees, capped at what has accrued.
    #[allow(clippy::too_many_arguments)]
    pub fn collect_protocol<P: Payer>(
        &mut self,
        payer: &mut P,
        caller: Address,
        recipient: Address,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> Result<(u128, u128), Error> {
        if caller != self.owner {
            return Err(StateError::Unauthorized.into());
        }
        self.lock()?;

        let amount0 = amount0_requested.min(self.protocol_fees.token0);
        let amount1 = amount1_requested.min(self.protocol_fees.token1);

        self.protocol_fees.token0 -= amount0;
        self.protocol_fees.token1 -= amount1;

        if amount0 > 0 {
            payer.transfer0(recipient, U256::from(amount0));
        }
        if amount1 > 0 {
            payer.transfer1(recipient, U256::from(amount1));
        }

        self.unlock();
        Ok((amount0, amount1))
    }

    /// Returns the accumulator values as of `seconds_ago` for each entry,
    /// as `(tick_cumulative, seconds_per_liquidity_cumulative_x128)` pairs.
    pub fn observe(&self, time: u32, seconds_agos: &[u32]) -> Result<Vec<(i64, U256)>, Error> {
        self.observations
            .observe(
                time,
                seconds_agos,
                self.slot0.tick,
                self.slot0.observation_index,
                self.liquidity,
                self.slot0.observation_cardinality,
            )
            .map_err(Error::from)
    }

    /// Snapshot of the cumulative tick, seconds-per-liquidity, and seconds
    /// spent inside a range. Values are only meaningful as differences
    /// between snapshots taken while the range holds liquidity.
    pub fn snapshot_cumulatives_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        time: u32,
    ) -> Result<(i64, U256, u32), Error> {
        self.check_ticks(tick_lower, tick_upper)?;

        let lower = tick::get(&self.ticks, tick_lower);
        let upper = tick::get(&self.ticks, tick_upper);
        if !lower.initialized || !upper.initialized {
            return Err(StateError::TickNotInitialized.into());
        }

        let slot0 = self.slot0;

        if slot0.tick < tick_lower {
            Ok((
                lower
                    .tick_cumulative_outside
                    .wrapping_sub(upper.tick_cumulative_outside),
                lower
                    .seconds_per_liquidity_outside_x128
                    .wrapping_sub(upper.seconds_per_liquidity_outside_x128),
                lower.seconds_outside.wrapping_sub(upper.seconds_outside),
            ))
        } else if slot0.tick < tick_upper {
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.observations.observe_single(
                    time,
                    0,
                    slot0.tick,
                    slot0.observation_index,
                    self.liquidity,
                    slot0.observation_cardinality,
                )?;
            Ok((
                tick_cumulative
                    .wrapping_sub(lower.tick_cumulative_outside)
                    .wrapping_sub(upper.tick_cumulative_outside),
                seconds_per_liquidity_cumulative_x128
                    .wrapping_sub(lower.seconds_per_liquidity_outside_x128)
                    .wrapping_sub(upper.seconds_per_liquidity_outside_x128),
                time.wrapping_sub(lower.seconds_outside)
                    .wrapping_sub(upper.seconds_outside),
            ))
        } else {
            Ok((
                upper
                    .tick_cumulative_outside
                    .wrapping_sub(lower.tick_cumulative_outside),
                upper
                    .seconds_per_liquidity_outside_x128
                    .wrapping_sub(lower.seconds_per_liquidity_outside_x128),
                upper.seconds_outside.wrapping_sub(lower.seconds_outside),
            ))
        }
    }

    /// Reads a position record; absent positions are all-zero.
    pub fn position(&self, owner: Address, tick_lower: i32, tick_upper: i32) -> PositionInfo {
        self.positions
            .get(&PositionKey {
                owner,
                tick_lower,
                tick_upper,
            })
            .copied()
            .unwrap_or_default()
    }
}
