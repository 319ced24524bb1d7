//! Mathematical constants

/// ln(2π)
pub const LN_2PI: f64 = 1.837_877_066_409_345_3;
/// 0.5 ln(2π)
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;
