//! 거래소 trait 정의.

use async_trait::async_trait;
use rust_decimal::Decimal;
use trader_core::{OrderResult, PositionSnapshot, Quantity, Side};

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 단일 무기한 선물 마켓에 대한 거래소 인터페이스.
///
/// 구현체는 상태를 갖지 않는 어댑터입니다. 포지션에 대한 믿음은
/// 실행 엔진이 관리하며, 이 trait은 거래소의 현재 상태를 그대로 보고합니다.
///
/// 주문 메서드가 `Ok`를 반환하면 거래소가 체결을 확인한 것입니다.
/// 실패는 반드시 [`ExchangeError`]로 반환되어야 하며, 엔진은
/// [`ExchangeError::kind`]로 재시도 여부를 결정합니다.
#[async_trait]
pub trait PerpExchange: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 거래 대상 심볼 반환.
    fn symbol(&self) -> &str;

    /// 시뮬레이션 거래소 여부.
    fn is_simulated(&self) -> bool {
        false
    }

    /// 권위 있는 현재 포지션 조회.
    async fn get_position(&self) -> ExchangeResult<PositionSnapshot>;

    /// 증거금 자산의 사용 가능 잔고 조회.
    async fn get_balance(&self) -> ExchangeResult<Decimal>;

    /// 주문 수량 계산에 사용할 마크 가격 조회.
    async fn get_mark_price(&self) -> ExchangeResult<Decimal>;

    /// 시장가 주문 제출.
    ///
    /// `client_order_id`는 재시도 시 중복 주문을 식별하는 데 사용됩니다.
    async fn place_market_order(
        &self,
        side: Side,
        size: Quantity,
        client_order_id: &str,
    ) -> ExchangeResult<OrderResult>;

    /// 현재 포지션 전량을 reduce-only 시장가로 청산.
    ///
    /// 포지션이 없으면 주문 없이 체결 수량 0의 성공 결과를 반환합니다.
    async fn close_position(&self, client_order_id: &str) -> ExchangeResult<OrderResult>;
}
