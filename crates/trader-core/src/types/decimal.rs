//! 정밀한 금융 계산을 위한 Decimal 유틸리티.

use rust_decimal::{Decimal, RoundingStrategy};

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 양수인지 확인합니다.
    fn is_positive_value(&self) -> bool;

    /// 주어진 단위(step)의 배수로 내림합니다.
    ///
    /// 거래소 수량 단위에 맞추기 위해 사용하며, 결과는 항상 원래 값 이하입니다.
    /// `step`이 0 이하이면 값을 그대로 반환합니다.
    fn floor_to_step(&self, step: Decimal) -> Decimal;
}

impl DecimalExt for Decimal {
    fn is_positive_value(&self) -> bool {
        *self > Decimal::ZERO
    }

    fn floor_to_step(&self, step: Decimal) -> Decimal {
        if step <= Decimal::ZERO {
            return *self;
        }
        let units = (*self / step).round_dp_with_strategy(0, RoundingStrategy::ToZero);
        (units * step).normalize()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// 내림 결과는 원래 값 이하이고, 단위의 배수이며, 차이는 한 단위 미만입니다.
        #[test]
        fn floor_to_step_bounds(units in 0i64..10_000_000, step_exp in 0u32..6) {
            let value = Decimal::new(units, 6);
            let step = Decimal::new(1, step_exp);

            let floored = value.floor_to_step(step);

            prop_assert!(floored <= value);
            prop_assert!(value - floored < step);
            prop_assert!((floored % step).is_zero());
        }
    }
}
