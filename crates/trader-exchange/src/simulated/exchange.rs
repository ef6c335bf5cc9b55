//! 시뮬레이션 거래소 구현.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info};
use trader_core::{OrderResult, PositionSnapshot, Price, Quantity, Side};

use crate::traits::{ExchangeResult, PerpExchange};
use crate::ExchangeError;

/// 시뮬레이션 거래소 설정.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// 거래 심볼
    pub symbol: String,
    /// 초기 증거금 (USDT)
    pub initial_balance: Decimal,
    /// 초기 마크 가격
    pub mark_price: Price,
    /// 거래 수수료율 (예: 0.04%의 경우 0.0004)
    pub fee_rate: Decimal,
}

impl PaperConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            initial_balance: dec!(10000),
            mark_price: dec!(2000),
            fee_rate: dec!(0.0004),
        }
    }

    /// 초기 잔고를 설정합니다.
    pub fn with_initial_balance(mut self, amount: Decimal) -> Self {
        self.initial_balance = amount;
        self
    }

    /// 마크 가격을 설정합니다.
    pub fn with_mark_price(mut self, price: Price) -> Self {
        self.mark_price = price;
        self
    }

    /// 수수료율을 설정합니다.
    pub fn with_fee_rate(mut self, rate: Decimal) -> Self {
        self.fee_rate = rate;
        self
    }
}

/// 장애 주입 대상 작업.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOperation {
    GetPosition,
    GetBalance,
    GetMarkPrice,
    PlaceOrder,
    ClosePosition,
}

/// 주입된 장애가 발생하는 시점.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTiming {
    /// 작업이 반영되기 전에 실패 (거래소 상태 변화 없음)
    BeforeEffect,
    /// 작업이 반영된 후 응답만 유실
    AfterEffect,
}

#[derive(Debug)]
struct Fault {
    operation: PaperOperation,
    timing: FaultTiming,
    error: ExchangeError,
}

/// 내부 계정 상태.
#[derive(Debug)]
struct AccountState {
    /// 지갑 잔고 (실현 손익과 수수료 반영)
    wallet: Decimal,
    /// 부호 있는 포지션 수량 (롱 양수, 숏 음수)
    position: Decimal,
    /// 평균 진입 가격
    entry_price: Price,
    /// 현재 마크 가격
    mark_price: Price,
    /// 주문 번호 카운터
    next_order_id: u64,
    /// 대기 중인 장애
    faults: VecDeque<Fault>,
}

impl AccountState {
    /// 포지션 증거금을 제외한 사용 가능 잔고 (1배 레버리지 기준).
    fn available(&self) -> Decimal {
        let margin = self.position.abs() * self.entry_price;
        (self.wallet - margin).max(Decimal::ZERO)
    }

    fn take_fault(&mut self, operation: PaperOperation) -> Option<Fault> {
        let index = self.faults.iter().position(|f| f.operation == operation)?;
        self.faults.remove(index)
    }

    fn fill(&mut self, signed_qty: Decimal, fee_rate: Decimal) -> OrderResult {
        let price = self.mark_price;
        let qty = signed_qty.abs();

        let same_direction = self.position.is_zero() || signum(self.position) == signum(signed_qty);
        if same_direction {
            let total = self.position.abs() + qty;
            self.entry_price = (self.entry_price * self.position.abs() + price * qty) / total;
        } else {
            // 감소분에 대한 손익 실현
            let closed = qty.min(self.position.abs());
            let pnl = (price - self.entry_price) * closed * signum(self.position);
            self.wallet += pnl;
        }

        let before = self.position;
        self.position += signed_qty;
        if self.position.is_zero() {
            self.entry_price = Decimal::ZERO;
        } else if !same_direction && signum(before) != signum(self.position) {
            // 방향 전환: 남은 수량은 현재 가격에 진입
            self.entry_price = price;
        }
        self.wallet -= price * qty * fee_rate;

        self.next_order_id += 1;
        OrderResult::filled(format!("paper-{}", self.next_order_id), qty, Some(price))
    }
}

fn signum(value: Decimal) -> Decimal {
    if value > Decimal::ZERO {
        Decimal::ONE
    } else if value < Decimal::ZERO {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ZERO
    }
}

/// 시뮬레이션 거래소.
pub struct PaperExchange {
    config: PaperConfig,
    state: Mutex<AccountState>,
}

impl PaperExchange {
    /// 새 시뮬레이션 거래소를 생성합니다.
    pub fn new(config: PaperConfig) -> Self {
        let state = AccountState {
            wallet: config.initial_balance,
            position: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            mark_price: config.mark_price,
            next_order_id: 0,
            faults: VecDeque::new(),
        };

        info!(
            symbol = %config.symbol,
            balance = %config.initial_balance,
            "Paper exchange created"
        );

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// 마크 가격을 변경합니다.
    pub async fn set_mark_price(&self, price: Price) {
        self.state.lock().await.mark_price = price;
    }

    /// 봇 외부에서 포지션이 바뀐 상황(수동 거래 등)을 재현합니다.
    pub async fn set_position(&self, signed_amount: Decimal) {
        let mut state = self.state.lock().await;
        state.position = signed_amount;
        state.entry_price = if signed_amount.is_zero() {
            Decimal::ZERO
        } else {
            state.mark_price
        };
    }

    /// 다음 해당 작업에서 한 번 발생할 장애를 등록합니다.
    pub async fn inject_fault(&self, operation: PaperOperation, timing: FaultTiming, error: ExchangeError) {
        self.state.lock().await.faults.push_back(Fault {
            operation,
            timing,
            error,
        });
    }

    /// 현재 부호 있는 포지션 수량.
    pub async fn signed_position(&self) -> Decimal {
        self.state.lock().await.position
    }

    /// 지갑 잔고 (실현 손익과 수수료 반영).
    pub async fn wallet_balance(&self) -> Decimal {
        self.state.lock().await.wallet
    }

    /// 조회 작업용: 주입된 장애가 있으면 시점과 무관하게 에러 반환.
    fn check_read_fault(state: &mut AccountState, operation: PaperOperation) -> ExchangeResult<()> {
        match state.take_fault(operation) {
            Some(fault) => Err(fault.error),
            None => Ok(()),
        }
    }

    /// 주문 작업을 장애 주입 규칙에 따라 실행합니다.
    fn execute_order(
        &self,
        state: &mut AccountState,
        operation: PaperOperation,
        signed_qty: Decimal,
    ) -> ExchangeResult<OrderResult> {
        let fault = state.take_fault(operation);
        if let Some(Fault {
            timing: FaultTiming::BeforeEffect,
            error,
            ..
        }) = fault
        {
            return Err(error);
        }

        let result = state.fill(signed_qty, self.config.fee_rate);
        debug!(
            operation = ?operation,
            qty = %signed_qty,
            position = %state.position,
            "Paper order filled"
        );

        match fault {
            Some(fault) => Err(fault.error),
            None => Ok(result),
        }
    }
}

#[async_trait]
impl PerpExchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn get_position(&self) -> ExchangeResult<PositionSnapshot> {
        let mut state = self.state.lock().await;
        Self::check_read_fault(&mut state, PaperOperation::GetPosition)?;
        let entry = Some(state.entry_price);
        Ok(PositionSnapshot::from_signed(&self.config.symbol, state.position, entry))
    }

    async fn get_balance(&self) -> ExchangeResult<Decimal> {
        let mut state = self.state.lock().await;
        Self::check_read_fault(&mut state, PaperOperation::GetBalance)?;
        Ok(state.available())
    }

    async fn get_mark_price(&self) -> ExchangeResult<Decimal> {
        let mut state = self.state.lock().await;
        Self::check_read_fault(&mut state, PaperOperation::GetMarkPrice)?;
        Ok(state.mark_price)
    }

    async fn place_market_order(
        &self,
        side: Side,
        size: Quantity,
        _client_order_id: &str,
    ) -> ExchangeResult<OrderResult> {
        if size <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity(format!("수량은 양수여야 합니다: {}", size)));
        }

        let mut state = self.state.lock().await;
        let signed_qty = match side {
            Side::Buy => size,
            Side::Sell => -size,
        };

        // 포지션을 늘리는 주문만 증거금 검사
        let increases = state.position.is_zero() || signum(state.position) == signum(signed_qty);
        let required = size * state.mark_price * (Decimal::ONE + self.config.fee_rate);
        if increases && required > state.available() {
            return Err(ExchangeError::InsufficientBalance(format!(
                "필요 {} > 가용 {}",
                required,
                state.available()
            )));
        }

        self.execute_order(&mut state, PaperOperation::PlaceOrder, signed_qty)
    }

    async fn close_position(&self, _client_order_id: &str) -> ExchangeResult<OrderResult> {
        let mut state = self.state.lock().await;
        if state.position.is_zero() {
            Self::check_read_fault(&mut state, PaperOperation::ClosePosition)?;
            return Ok(OrderResult::nothing_to_do());
        }

        let signed_qty = -state.position;
        self.execute_order(&mut state, PaperOperation::ClosePosition, signed_qty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trader_core::PositionSide;

    fn exchange() -> PaperExchange {
        PaperExchange::new(
            PaperConfig::new("ethusdt")
                .with_initial_balance(dec!(1000))
                .with_mark_price(dec!(100))
                .with_fee_rate(Decimal::ZERO),
        )
    }

    #[tokio::test]
    async fn test_open_and_close_long() {
        let ex = exchange();
        assert_eq!(ex.symbol(), "ETHUSDT");

        let fill = ex.place_market_order(Side::Buy, dec!(5), "a").await.unwrap();
        assert_eq!(fill.filled_size, dec!(5));
        assert_eq!(ex.get_position().await.unwrap().side, PositionSide::Long);
        assert_eq!(ex.get_balance().await.unwrap(), dec!(500));

        ex.set_mark_price(dec!(110)).await;
        let close = ex.close_position("b").await.unwrap();
        assert_eq!(close.filled_size, dec!(5));
        assert!(ex.get_position().await.unwrap().side.is_flat());
        assert_eq!(ex.wallet_balance().await, dec!(1050));
    }

    #[tokio::test]
    async fn test_short_pnl() {
        let ex = exchange();
        ex.place_market_order(Side::Sell, dec!(2), "a").await.unwrap();
        ex.set_mark_price(dec!(90)).await;
        ex.close_position("b").await.unwrap();
        assert_eq!(ex.wallet_balance().await, dec!(1020));
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let ex = exchange();
        let err = ex.place_market_order(Side::Buy, dec!(11), "a").await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance(_)));
        assert!(ex.signed_position().await.is_zero());
    }

    #[tokio::test]
    async fn test_close_when_flat_is_noop() {
        let ex = exchange();
        let result = ex.close_position("a").await.unwrap();
        assert!(result.success);
        assert!(result.order_id.is_none());
    }

    #[tokio::test]
    async fn test_fault_before_effect_leaves_state() {
        let ex = exchange();
        ex.inject_fault(
            PaperOperation::PlaceOrder,
            FaultTiming::BeforeEffect,
            ExchangeError::Timeout("t".into()),
        )
        .await;

        assert!(ex.place_market_order(Side::Buy, dec!(1), "a").await.is_err());
        assert!(ex.signed_position().await.is_zero());
        // 장애는 한 번만 발생
        assert!(ex.place_market_order(Side::Buy, dec!(1), "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_fault_after_effect_applies_order() {
        let ex = exchange();
        ex.inject_fault(
            PaperOperation::PlaceOrder,
            FaultTiming::AfterEffect,
            ExchangeError::Timeout("lost response".into()),
        )
        .await;

        assert!(ex.place_market_order(Side::Sell, dec!(1), "a").await.is_err());
        assert_eq!(ex.signed_position().await, dec!(-1));
    }

    #[tokio::test]
    async fn test_external_position_change() {
        let ex = exchange();
        ex.set_position(dec!(-3)).await;
        let snapshot = ex.get_position().await.unwrap();
        assert_eq!(snapshot.side, PositionSide::Short);
        assert_eq!(snapshot.size, dec!(3));
    }
}
