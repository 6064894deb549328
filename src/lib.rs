use alloy_primitives::U256;

pub mod error;
mod hash;
pub mod math;
pub mod pool;

pub use hash::FastMap;
pub use pool::state::{Payer, Pool, ProtocolFees, Slot0};

const U256_1: U256 = U256::from_limbs([1, 0, 0, 0]);

const U160_MAX: U256 = U256::from_limbs([u64::MAX, u64::MAX, 4294967295, 0]);

pub const RESOLUTION: u8 = 96;
pub const Q96: U256 = U256::from_limbs([0, 4294967296, 0, 0]);
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);
