use thiserror::Error;

#[derive(Debug, Error)]
pub enum MathError {
    #[error("Math error - overflow")]
    Overflow,
    #[error("Math error - underflow")]
    Underflow,
    #[error("Math error - out of bounds")]
    OutOfBounds,
    #[error("Math error - division by zero")]
    DivisionByZero,
    #[error("BitMath error - zero input value")]
    ZeroValue,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("State error - pool already initialized")]
    AlreadyInitialized,
    #[error("State error - reentrancy lock held")]
    Locked,
    #[error("State error - sqrtPrice out of bounds")]
    SqrtPriceOutOfBounds,
    #[error("State error - sqrtPrice is 0")]
    SqrtPriceIsZero,
    #[error("State error - sqrtRatio is 0")]
    SqrtRatioIsZero,

    #[error("State error - tick out of bounds")]
    TickOutOfBounds,
    #[error("State error - tick not aligned to tick spacing")]
    TickNotAligned,
    #[error("State error - tick not initialized")]
    TickNotInitialized,
    #[error("State error - lower tick must be below upper tick")]
    InvalidTickRange,

    #[error("State error - amount is 0")]
    AmountIsZero,
    #[error("State error - liquidity is 0")]
    LiquidityIsZero,
    #[error("State error - liquidity per tick cap exceeded")]
    LiquidityPerTickOverflow,
    #[error("State error - position has no liquidity")]
    NoPositionLiquidity,

    #[error("State error - requested amount exceeds pool reserves")]
    InsufficientReserves,

    #[error("State error - caller is not the pool owner")]
    Unauthorized,
    #[error("State error - protocol fee fraction out of range")]
    InvalidFeeProtocol,
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Swap error - amount specified is 0")]
    AmountSpecifiedIsZero,
    #[error("Swap error - sqrtPrice limit out of bounds")]
    SqrtPriceOutOfBounds,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle error - no observations recorded")]
    NotInitialized,
    #[error("Oracle error - target predates the oldest observation")]
    TargetPrecedesOldest,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment error - token0 balance shortfall after callback")]
    Token0Underpaid,
    #[error("Payment error - token1 balance shortfall after callback")]
    Token1Underpaid,
    #[error("Payment error - swap input not received")]
    InsufficientInputReceived,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    MathError(#[from] crate::error::MathError),

    #[error(transparent)]
    StateError(#[from] crate::error::StateError),

    #[error(transparent)]
    SwapError(#[from] crate::error::SwapError),

    #[error(transparent)]
    OracleError(#[from] crate::error::OracleError),

    #[error(transparent)]
    PaymentError(#[from] crate::error::PaymentError),
}
