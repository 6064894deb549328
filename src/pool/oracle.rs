use crate::error::OracleError;
use alloy_primitives::U256;

/// Hard capacity bound of the ring; cardinality is a u16 head count.
pub const MAX_CARDINALITY: u16 = u16::MAX;

/// One oracle checkpoint. `tick_cumulative` integrates tick over time;
/// `seconds_per_liquidity_cumulative_x128` integrates 1 / max(liquidity, 1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    pub block_timestamp: u32,
    pub tick_cumulative: i64,
    pub seconds_per_liquidity_cumulative_x128: U256,
    pub initialized: bool,
}

/// Fixed-capacity circular buffer of observations, allocated lazily but
/// indexed as if the full ring existed. Timestamps are cyclic modulo 2^32
/// and compared through [`ObservationRing::lte`].
#[derive(Clone, Debug, Default)]
pub struct ObservationRing {
    slots: Vec<Observation>,
}

impl ObservationRing {
    /// Reads a slot; slots that were never written read as uninitialized.
    pub fn at(&self, index: u16) -> Observation {
        self.slots
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    fn set(&mut self, index: u16, observation: Observation) {
        let index = index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Observation::default());
        }
        self.slots[index] = observation;
    }

    /// Seeds slot 0 at pool initialization. Returns the initial
    /// (cardinality, cardinality_next) pair.
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.set(
            0,
            Observation {
                block_timestamp: time,
                tick_cumulative: 0,
                seconds_per_liquidity_cumulative_x128: U256::ZERO,
                initialized: true,
            },
        );
        (1, 1)
    }

    /// Extends `last` to `block_timestamp`, integrating the accumulators
    /// over the elapsed interval with the given tick and liquidity.
    fn transform(last: &Observation, block_timestamp: u32, tick: i32, liquidity: u128) -> Observation {
        let delta = block_timestamp.wrapping_sub(last.block_timestamp);
        Observation {
            block_timestamp,
            tick_cumulative: last
                .tick_cumulative
                .wrapping_add(tick as i64 * delta as i64),
            seconds_per_liquidity_cumulative_x128: last
                .seconds_per_liquidity_cumulative_x128
                .wrapping_add((U256::from(delta) << 128) / U256::from(liquidity.max(1))),
            initialized: true,
        }
    }

    /// Appends an observation if time has advanced since the last write; at
    /// most one observation is stored per timestamp. Grows the live
    /// cardinality into pre-reserved slots when the write lands on the ring
    /// end. Returns the updated (index, cardinality).
    pub fn write(
        &mut self,
        index: u16,
        block_timestamp: u32,
        tick: i32,
        liquidity: u128,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.at(index);

        if last.block_timestamp == block_timestamp {
            return (index, cardinality);
        }

        let cardinality_updated = if cardinality_next > cardinality && index == cardinality - 1 {
            cardinality_next
        } else {
            cardinality
        };

        let index_updated = (index + 1) % cardinality_updated;
        self.set(
            index_updated,
            Self::transform(&last, block_timestamp, tick, liquidity),
        );
        (index_updated, cardinality_updated)
    }

    /// Reserves ring capacity, pre-dirtying the new slots so later writes
    /// find them allocated. No-op when `next` does not exceed `current`.
    pub fn grow(&mut self, current: u16, next: u16) -> Result<u16, OracleError> {
        if current == 0 {
            return Err(OracleError::NotInitialized);
        }
        if next <= current {
            return Ok(current);
        }
        for i in current..next {
            self.set(
                i,
                Observation {
                    block_timestamp: 1,
                    ..Default::default()
                },
            );
        }
        Ok(next)
    }

    /// 32-bit wrap-aware `a <= b`: any timestamp greater than `time` is
    /// treated as belonging to the previous epoch.
    fn lte(time: u32, a: u32, b: u32) -> bool {
        if a <= time && b <= time {
            return a <= b;
        }
        let a_adjusted = if a > time { a as u64 } else { a as u64 + (1u64 << 32) };
        let b_adjusted = if b > time { b as u64 } else { b as u64 + (1u64 << 32) };
        a_adjusted <= b_adjusted
    }

    /// Finds the pair of initialized observations straddling `target`.
    /// Uninitialized slots (a partially grown ring) are skipped upward.
    /// Preconditions: target is at or after the oldest observation and
    /// strictly before the newest.
    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> (Observation, Observation) {
        let cardinality = cardinality as i64;
        let mut l: i64 = (index as i64 + 1) % cardinality;
        let mut r: i64 = l + cardinality - 1;

        loop {
            let i = (l + r) / 2;

            let before_or_at = self.at((i % cardinality) as u16);
            if !before_or_at.initialized {
                l = i + 1;
                continue;
            }

            let at_or_after = self.at(((i + 1) % cardinality) as u16);

            let target_at_or_after = Self::lte(time, before_or_at.block_timestamp, target);
            if target_at_or_after && Self::lte(time, target, at_or_after.block_timestamp) {
                return (before_or_at, at_or_after);
            }

            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }

    /// Resolves the observations bracketing `target`, synthesizing the upper
    /// bound by transformation when the target is newer than everything
    /// stored. Fails when the target predates the oldest kept observation.
    #[allow(clippy::too_many_arguments)]
    fn get_surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Observation, Observation), OracleError> {
        let mut before_or_at = self.at(index);

        if Self::lte(time, before_or_at.block_timestamp, target) {
            if before_or_at.block_timestamp == target {
                // exact hit, the second half is unused
                return Ok((before_or_at, Observation::default()));
            }
            return Ok((
                before_or_at,
                Self::transform(&before_or_at, target, tick, liquidity),
            ));
        }

        // locate the oldest observation
        before_or_at = self.at((index + 1) % cardinality);
        if !before_or_at.initialized {
            before_or_at = self.at(0);
        }

        if !Self::lte(time, before_or_at.block_timestamp, target) {
            return Err(OracleError::TargetPrecedesOldest);
        }

        Ok(self.binary_search(time, target, index, cardinality))
    }

    /// Returns the accumulator values as of `seconds_ago` before `time`,
    /// interpolating linearly between surrounding observations when the
    /// target falls between checkpoints.
    ///
    /// Returns `(tick_cumulative, seconds_per_liquidity_cumulative_x128)`.
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(i64, U256), OracleError> {
        if cardinality == 0 {
            return Err(OracleError::NotInitialized);
        }

        if seconds_ago == 0 {
            let mut last = self.at(index);
            if last.block_timestamp != time {
                last = Self::transform(&last, time, tick, liquidity);
            }
            return Ok((
                last.tick_cumulative,
                last.seconds_per_liquidity_cumulative_x128,
            ));
        }

        let target = time.wrapping_sub(seconds_ago);

        let (before_or_at, at_or_after) =
            self.get_surrounding_observations(time, target, tick, index, liquidity, cardinality)?;

        if target == before_or_at.block_timestamp {
            Ok((
                before_or_at.tick_cumulative,
                before_or_at.seconds_per_liquidity_cumulative_x128,
            ))
        } else if target == at_or_after.block_timestamp {
            Ok((
                at_or_after.tick_cumulative,
                at_or_after.seconds_per_liquidity_cumulative_x128,
            ))
        } else {
            let observation_time_delta = at_or_after
                .block_timestamp
                .wrapping_sub(before_or_at.block_timestamp) as i64;
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp) as i64;

            let tick_cumulative = before_or_at.tick_cumulative.wrapping_add(
                at_or_after
                    .tick_cumulative
                    .wrapping_sub(before_or_at.tick_cumulative)
                    / observation_time_delta
                    * target_delta,
            );
            let seconds_per_liquidity_cumulative_x128 = before_or_at
                .seconds_per_liquidity_cumulative_x128
                .wrapping_add(
                    at_or_after
                        .seconds_per_liquidity_cumulative_x128
                        .wrapping_sub(before_or_at.seconds_per_liquidity_cumulative_x128)
                        * U256::from(target_delta as u64)
                        / U256::from(observation_time_delta as u64),
                );
            Ok((tick_cumulative, seconds_per_liquidity_cumulative_x128))
        }
    }

    /// Batch form of [`ObservationRing::observe_single`], one result per
    /// entry of `seconds_agos`.
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<Vec<(i64, U256)>, OracleError> {
        if cardinality == 0 {
            return Err(OracleError::NotInitialized);
        }
        seconds_agos
            .iter()
            .map(|&seconds_ago| {
                self.observe_single(time, seconds_ago, tick, index, liquidity, cardinality)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ring with writes at t=100 (tick 100 in effect since t=0) and t=200
    /// (tick -50 in effect since t=100).
    fn three_point_ring() -> (ObservationRing, u16, u16) {
        let mut ring = ObservationRing::default();
        let (cardinality, _) = ring.initialize(0);
        let cardinality_next = ring.grow(1, 4).unwrap();

        let (index, cardinality) = ring.write(0, 100, 100, 1, cardinality, cardinality_next);
        let (index, cardinality) = ring.write(index, 200, -50, 1, cardinality, cardinality_next);
        (ring, index, cardinality)
    }

    #[test]
    fn initialize_seeds_slot_zero() {
        let mut ring = ObservationRing::default();
        let (cardinality, cardinality_next) = ring.initialize(7);
        assert_eq!((cardinality, cardinality_next), (1, 1));

        let obs = ring.at(0);
        assert!(obs.initialized);
        assert_eq!(obs.block_timestamp, 7);
        assert_eq!(obs.tick_cumulative, 0);
    }

    #[test]
    fn write_is_idempotent_within_one_timestamp() {
        let mut ring = ObservationRing::default();
        ring.initialize(10);
        let (index, cardinality) = ring.write(0, 10, 5, 1, 1, 1);
        assert_eq!((index, cardinality), (0, 1));
        assert_eq!(ring.at(0).tick_cumulative, 0);
    }

    #[test]
    fn write_integrates_the_passed_tick_over_the_gap() {
        let mut ring = ObservationRing::default();
        ring.initialize(0);
        let (index, _) = ring.write(0, 100, 100, 1, 1, 1);
        // cardinality 1: the single slot is overwritten in place
        assert_eq!(index, 0);
        assert_eq!(ring.at(0).tick_cumulative, 100 * 100);
    }

    #[test]
    fn write_grows_into_reserved_slots() {
        let (ring, index, cardinality) = three_point_ring();
        assert_eq!(cardinality, 4);
        assert_eq!(index, 2);
        assert_eq!(ring.at(1).tick_cumulative, 10000); // 100 * 100
        assert_eq!(ring.at(2).tick_cumulative, 5000); // 10000 - 50 * 100
    }

    #[test]
    fn grow_requires_initialization_and_is_monotone() {
        let mut ring = ObservationRing::default();
        assert!(matches!(ring.grow(0, 5), Err(OracleError::NotInitialized)));

        ring.initialize(0);
        assert_eq!(ring.grow(1, 4).unwrap(), 4);
        // shrinking or equal requests are no-ops
        assert_eq!(ring.grow(4, 3).unwrap(), 4);
        assert_eq!(ring.grow(4, 4).unwrap(), 4);
        // reserved slots are dirtied but not initialized
        assert_eq!(ring.at(2).block_timestamp, 1);
        assert!(!ring.at(2).initialized);
    }

    #[test]
    fn observe_at_zero_seconds_ago_transforms_to_now() {
        let (ring, index, cardinality) = three_point_ring();
        // 50 more seconds at tick -50
        let (tick_cumulative, _) = ring
            .observe_single(250, 0, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 5000 - 50 * 50);
    }

    #[test]
    fn observe_exact_hits_return_stored_values() {
        let (ring, index, cardinality) = three_point_ring();
        let (at_200, _) = ring.observe_single(200, 0, -50, index, 1, cardinality).unwrap();
        assert_eq!(at_200, 5000);
        let (at_100, _) = ring
            .observe_single(200, 100, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(at_100, 10000);
        let (at_0, _) = ring
            .observe_single(200, 200, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(at_0, 0);
    }

    #[test]
    fn twap_over_full_window() {
        let (ring, index, cardinality) = three_point_ring();
        let results = ring
            .observe(200, &[200, 0], -50, index, 1, cardinality)
            .unwrap();
        let (oldest, newest) = (results[0].0, results[1].0);
        assert_eq!((newest - oldest) / 200, 25);
    }

    #[test]
    fn interpolates_between_observations() {
        let (ring, index, cardinality) = three_point_ring();
        // t = 150 sits halfway between the writes at 100 and 200
        let (tick_cumulative, _) = ring
            .observe_single(200, 50, -50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 10000 + (-50) * 50);
    }

    #[test]
    fn seconds_per_liquidity_integrates_reciprocal_liquidity() {
        let mut ring = ObservationRing::default();
        ring.initialize(0);
        let next = ring.grow(1, 3).unwrap();
        let (index, cardinality) = ring.write(0, 10, 0, 5, 1, next);
        let (tick_cumulative, spl) = ring
            .observe_single(10, 0, 0, index, 5, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 0);
        assert_eq!(spl, (U256::from(10u64) << 128) / U256::from(5u64));
    }

    #[test]
    fn zero_liquidity_integrates_as_one() {
        let mut ring = ObservationRing::default();
        ring.initialize(0);
        let (_, spl) = ring.observe_single(8, 0, 0, 0, 0, 1).unwrap();
        assert_eq!(spl, U256::from(8u64) << 128);
    }

    #[test]
    fn observe_before_oldest_fails() {
        let (ring, index, cardinality) = three_point_ring();
        // ring kept everything back to t=0, so 201 seconds ago is too old
        let result = ring.observe_single(200, 201, -50, index, 1, cardinality);
        assert!(matches!(result, Err(OracleError::TargetPrecedesOldest)));
        // exactly the oldest timestamp still succeeds
        assert!(ring.observe_single(200, 200, -50, index, 1, cardinality).is_ok());
    }

    #[test]
    fn observe_requires_cardinality() {
        let ring = ObservationRing::default();
        assert!(matches!(
            ring.observe_single(0, 0, 0, 0, 0, 0),
            Err(OracleError::NotInitialized)
        ));
        assert!(matches!(
            ring.observe(0, &[0], 0, 0, 0, 0),
            Err(OracleError::NotInitialized)
        ));
    }

    #[test]
    fn ring_wraps_and_evicts_oldest() {
        let mut ring = ObservationRing::default();
        ring.initialize(0);
        let next = ring.grow(1, 3).unwrap();
        let (index, cardinality) = ring.write(0, 10, 1, 1, 1, next);
        let (index, cardinality) = ring.write(index, 20, 2, 1, cardinality, next);
        // cardinality 3 is now full; the next write overwrites slot 0
        let (index, cardinality) = ring.write(index, 30, 3, 1, cardinality, next);
        assert_eq!(index, 0);
        assert_eq!(cardinality, 3);

        // t=0 fell off the ring; oldest is now t=10
        assert!(matches!(
            ring.observe_single(30, 25, 3, index, 1, cardinality),
            Err(OracleError::TargetPrecedesOldest)
        ));
        let (at_10, _) = ring.observe_single(30, 20, 3, index, 1, cardinality).unwrap();
        assert_eq!(at_10, 10); // 1 * 10 over the first interval
    }

    #[test]
    fn initialized_entries_stay_monotone_in_ring_order() {
        // after growth plus wrap, walking the ring from index+1 meets
        // initialized entries in strictly increasing timestamp order
        let mut ring = ObservationRing::default();
        ring.initialize(0);
        let next = ring.grow(1, 5).unwrap();
        let mut index = 0u16;
        let mut cardinality = 1u16;
        for t in [7u32, 19, 23, 42, 55, 61] {
            let (i, c) = ring.write(index, t, 1, 1, cardinality, next);
            index = i;
            cardinality = c;
        }

        let mut last: Option<u32> = None;
        for offset in 1..=cardinality {
            let obs = ring.at((index + offset) % cardinality);
            if !obs.initialized {
                continue;
            }
            if let Some(prev) = last {
                assert!(obs.block_timestamp > prev);
            }
            last = Some(obs.block_timestamp);
        }
    }

    #[test]
    fn timestamp_comparator_handles_wrap() {
        // at time 100, a timestamp of u32::MAX is from the previous epoch
        let (ring, index, cardinality) = three_point_ring();
        let _ = (&ring, index, cardinality);
        assert!(ObservationRing::lte(100, u32::MAX, 0));
        assert!(!ObservationRing::lte(100, 0, u32::MAX));
        assert!(ObservationRing::lte(100, 50, 100));
        assert!(ObservationRing::lte(u32::MAX, 50, 100));
    }
}
