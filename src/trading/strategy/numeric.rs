//! 精度处理
//!
//! 价格和数量全程使用Decimal，按交易所步长截断或进位；
//! 所有容差比较统一使用1e-8。

use rust_decimal::Decimal;

/// 统一比较容差 1e-8
pub fn eps() -> Decimal {
    Decimal::new(1, 8)
}

/// 向下取整到步长倍数；步长为0时恒等返回
pub fn round_down(x: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return x;
    }
    (x / step).floor() * step
}

/// 向上取整到步长倍数；步长为0时恒等返回
pub fn round_up(x: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return x;
    }
    (x / step).ceil() * step
}

/// x是否对齐到步长（容差1e-8）；步长为0时恒为true
pub fn is_step_aligned(x: Decimal, step: Decimal) -> bool {
    if step.is_zero() {
        return true;
    }
    let rem = (x % step).abs();
    rem <= eps() || (step.abs() - rem) <= eps()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_down() {
        assert_eq!(round_down(dec!(142.5614), dec!(0.001)), dec!(142.561));
        assert_eq!(round_down(dec!(0.5614), dec!(0.01)), dec!(0.56));
        assert_eq!(round_down(dec!(0.8888), dec!(0.01)), dec!(0.88));
        // 已对齐的值保持不变
        assert_eq!(round_down(dec!(142.500), dec!(0.001)), dec!(142.500));
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(dec!(134.4463), dec!(0.001)), dec!(134.447));
        assert_eq!(round_up(dec!(134.447), dec!(0.001)), dec!(134.447));
        assert_eq!(round_up(dec!(0.001), dec!(0.01)), dec!(0.01));
    }

    #[test]
    fn test_zero_step_is_identity() {
        assert_eq!(round_down(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
        assert_eq!(round_up(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
        assert!(is_step_aligned(dec!(1.2345), Decimal::ZERO));
    }

    #[test]
    fn test_is_step_aligned() {
        assert!(is_step_aligned(dec!(142.500), dec!(0.001)));
        assert!(is_step_aligned(dec!(0.56), dec!(0.01)));
        assert!(!is_step_aligned(dec!(142.5005), dec!(0.001)));
        // 余数落在容差内视为对齐
        assert!(is_step_aligned(dec!(142.500000000001), dec!(0.001)));
    }

    #[test]
    fn test_negative_rounding_toward_floor() {
        // floor语义：负数向更小方向取整
        assert_eq!(round_down(dec!(-0.015), dec!(0.01)), dec!(-0.02));
        assert_eq!(round_up(dec!(-0.015), dec!(0.01)), dec!(-0.01));
    }
}
