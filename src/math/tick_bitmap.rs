use crate::FastMap;
use crate::U256_1;
use crate::error::StateError;
use crate::math::bit_math::{least_significant_bit, most_significant_bit};
use alloy_primitives::U256;
use std::ops::Shr;

/// Computes the bitmap word index and bit position for a compressed tick.
///
/// Bit b of word w corresponds to compressed tick `w * 256 + b`.
pub fn position(tick: i32) -> (i16, u8) {
    (tick.shr(8) as i16, (tick % 256) as u8)
}

/// Returns the bitmap word stored at `word`, or zero if absent.
///
/// Missing words read as all-uninitialized, which is what the search
/// fallthrough relies on.
pub fn get_word(bitmap: &FastMap<i16, U256>, word: i16) -> U256 {
    *bitmap.get(&word).unwrap_or(&U256::ZERO)
}

/// Toggles the initialized status of a tick in the bitmap.
///
/// The tick must be aligned to `tick_spacing`.
pub fn flip_tick(
    tick_bitmap: &mut FastMap<i16, U256>,
    tick: i32,
    tick_spacing: i32,
) -> Result<(), StateError> {
    if (tick % tick_spacing) != 0 {
        return Err(StateError::TickNotAligned);
    }

    let (word_pos, bit_pos) = position(tick / tick_spacing);
    let mask = U256_1 << bit_pos;
    let word = get_word(tick_bitmap, word_pos);
    tick_bitmap.insert(word_pos, word ^ mask);
    Ok(())
}

/// Searches a single 256-bit bitmap word for the next initialized tick at or
/// below `tick` (`lte = true`) or strictly above it (`lte = false`).
///
/// Returns the candidate tick and whether it is actually initialized. When
/// the word holds no initialized tick in the search direction, the word
/// boundary is returned uninitialized so that a swap loop still makes
/// progress across empty words. With `lte = true` the returned tick can
/// equal the input tick.
pub fn next_initialized_tick_within_one_word(
    bitmap: &FastMap<i16, U256>,
    tick: i32,
    tick_spacing: i32,
    lte: bool,
) -> (i32, bool) {
    let mut compressed: i32 = tick / tick_spacing;

    // round toward negative infinity
    if tick < 0 && tick % tick_spacing != 0 {
        compressed -= 1;
    }

    if lte {
        let (word_pos, bit_pos) = position(compressed);

        let mask: U256 = (U256_1 << bit_pos) - U256_1 + (U256_1 << bit_pos);
        let masked: U256 = get_word(bitmap, word_pos) & mask;

        match most_significant_bit(masked) {
            Ok(msb) => ((compressed - (bit_pos - msb) as i32) * tick_spacing, true),
            Err(_) => ((compressed - bit_pos as i32) * tick_spacing, false),
        }
    } else {
        let (word_pos, bit_pos) = position(compressed + 1);

        let mask: U256 = !((U256_1 << bit_pos) - U256_1);
        let masked: U256 = get_word(bitmap, word_pos) & mask;

        match least_significant_bit(masked) {
            Ok(lsb) => (
                (compressed + 1 + (lsb - bit_pos) as i32) * tick_spacing,
                true,
            ),
            Err(_) => (
                (compressed + 1 + (255u8 - bit_pos) as i32) * tick_spacing,
                false,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_ticks() -> FastMap<i16, U256> {
        let ticks = vec![-200, -55, -4, 70, 78, 84, 139, 240, 535];
        let mut bitmap = FastMap::default();
        for t in ticks {
            flip_tick(&mut bitmap, t, 1).unwrap();
        }
        bitmap
    }

    #[test]
    fn test_position_simple() {
        assert_eq!(position(0), (0, 0));
        assert_eq!(position(1), (0, 1));
        assert_eq!(position(255), (0, 255));
        assert_eq!(position(256), (1, 0));
        assert_eq!(position(300), (1, 44));
    }

    #[test]
    fn test_position_negative() {
        assert_eq!(position(-1), (-1, 255));
        assert_eq!(position(-256), (-1, 0));
        assert_eq!(position(-257), (-2, 255));
    }

    // -----------------------------------------------------------------------------
    // flip_tick
    // -----------------------------------------------------------------------------

    #[test]
    fn test_flip_tick_roundtrip() {
        let mut bm = FastMap::default();
        flip_tick(&mut bm, 78, 1).unwrap();
        let (word, bit) = position(78);
        assert_eq!(get_word(&bm, word), U256_1 << bit);
        flip_tick(&mut bm, 78, 1).unwrap();
        assert_eq!(get_word(&bm, word), U256::ZERO);
    }

    #[test]
    fn test_flip_tick_rejects_unaligned() {
        let mut bm = FastMap::default();
        assert!(matches!(
            flip_tick(&mut bm, 15, 10),
            Err(StateError::TickNotAligned)
        ));
    }

    #[test]
    fn test_flip_tick_spacing_compression() {
        let mut bm = FastMap::default();
        flip_tick(&mut bm, 60, 60).unwrap();
        flip_tick(&mut bm, -60, 60).unwrap();
        // compressed 1 -> word 0 bit 1; compressed -1 -> word -1 bit 255
        assert_eq!(get_word(&bm, 0), U256_1 << 1u8);
        assert_eq!(get_word(&bm, -1), U256_1 << 255u8);
    }

    // -----------------------------------------------------------------------------
    // right search (lte = false)
    // -----------------------------------------------------------------------------

    #[test]
    fn test_right_exact_match_is_excluded() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, 78, 1, false);
        assert_eq!(next, 84);
        assert!(init);
    }

    #[test]
    fn test_right_between_ticks() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, 77, 1, false);
        assert_eq!(next, 78);
        assert!(init);
    }

    #[test]
    fn test_right_negative_between() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, -56, 1, false);
        assert_eq!(next, -55);
        assert!(init);
    }

    #[test]
    fn test_right_empty_word_falls_through_to_boundary() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, 255, 1, false);
        assert_eq!(next, 511);
        assert!(!init);
    }

    #[test]
    fn test_right_find_in_next_word() {
        let mut bm = init_test_ticks();
        flip_tick(&mut bm, 340, 1).unwrap();
        let (next, init) = next_initialized_tick_within_one_word(&bm, 328, 1, false);
        assert_eq!(next, 340);
        assert!(init);
    }

    // -----------------------------------------------------------------------------
    // left search (lte = true)
    // -----------------------------------------------------------------------------

    #[test]
    fn test_left_returns_same_tick_when_initialized() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, 78, 1, true);
        assert_eq!(next, 78);
        assert!(init);
    }

    #[test]
    fn test_left_between_ticks() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, 79, 1, true);
        assert_eq!(next, 78);
        assert!(init);
    }

    #[test]
    fn test_left_empty_word_falls_through_to_boundary() {
        let bm = init_test_ticks();
        // word 2 covers [512, 767]; 535 is set, query below it
        let (next, init) = next_initialized_tick_within_one_word(&bm, 530, 1, true);
        assert_eq!(next, 512);
        assert!(!init);
    }

    #[test]
    fn test_left_negative_ticks() {
        let bm = init_test_ticks();
        let (next, init) = next_initialized_tick_within_one_word(&bm, -5, 1, true);
        assert_eq!(next, -55);
        assert!(init);
    }

    #[test]
    fn test_left_with_spacing_rounds_toward_negative_infinity() {
        let mut bm = FastMap::default();
        flip_tick(&mut bm, -120, 60).unwrap();
        // tick -61 compresses to -2 (floor), so -120 is found at or below it
        let (next, init) = next_initialized_tick_within_one_word(&bm, -61, 60, true);
        assert_eq!(next, -120);
        assert!(init);
    }

    #[test]
    fn test_double_flip_restores_search_result() {
        let mut bm = init_test_ticks();
        let before = next_initialized_tick_within_one_word(&bm, 100, 1, true);
        flip_tick(&mut bm, 90, 1).unwrap();
        flip_tick(&mut bm, 90, 1).unwrap();
        let after = next_initialized_tick_within_one_word(&bm, 100, 1, true);
        assert_eq!(before, after);
    }
}
