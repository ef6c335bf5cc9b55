//! 거래소 에러 타입.
//!
//! 실행 엔진은 [`ErrorKind`]만 보고 재시도 여부를 결정하므로,
//! 모든 커넥터는 실패를 반드시 이 분류 중 하나로 매핑해야 합니다.

use thiserror::Error;

/// 재시도 정책이 구분하는 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 인증/권한 실패
    Auth,
    /// 잔고 부족
    InsufficientBalance,
    /// 요청 한도 초과
    RateLimited,
    /// 네트워크 장애 또는 타임아웃
    Network,
    /// 거래소가 주문을 거부함
    Rejected,
    /// 그 외 (응답 파싱 실패 등)
    Other,
}

impl ErrorKind {
    /// 일시적 에러(재시도 대상)인지 확인.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Network)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Network => "network",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 거래소 관련 에러.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 타임스탬프 동기화 에러
    #[error("Timestamp error: {0}")]
    TimestampError(String),

    /// 잔고 부족
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// 유효하지 않은 수량
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// 주문 거부됨
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 일부만 체결되어 포지션이 남음
    #[error("Partially filled: {0}")]
    PartialFill(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 분류되지 않은 API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i64, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExchangeError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::NetworkError(_)
            | ExchangeError::Timeout(_)
            | ExchangeError::TimestampError(_) => ErrorKind::Network,
            ExchangeError::RateLimited(_) => ErrorKind::RateLimited,
            ExchangeError::Unauthorized(_) => ErrorKind::Auth,
            ExchangeError::InsufficientBalance(_) => ErrorKind::InsufficientBalance,
            ExchangeError::InvalidQuantity(_)
            | ExchangeError::OrderRejected(_)
            | ExchangeError::PartialFill(_)
            | ExchangeError::SymbolNotFound(_) => ErrorKind::Rejected,
            ExchangeError::ApiError { .. }
            | ExchangeError::ParseError(_)
            | ExchangeError::Unknown(_) => ErrorKind::Other,
        }
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_transient()
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::NetworkError(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(ExchangeError::Timeout("t".into()).is_retryable());
        assert!(ExchangeError::NetworkError("n".into()).is_retryable());
        assert!(ExchangeError::RateLimited("r".into()).is_retryable());
        assert!(ExchangeError::TimestampError("ts".into()).is_retryable());
    }

    #[test]
    fn test_fatal_kinds() {
        assert_eq!(ExchangeError::Unauthorized("k".into()).kind(), ErrorKind::Auth);
        assert_eq!(
            ExchangeError::InsufficientBalance("b".into()).kind(),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(ExchangeError::OrderRejected("o".into()).kind(), ErrorKind::Rejected);
        assert_eq!(ExchangeError::InvalidQuantity("q".into()).kind(), ErrorKind::Rejected);
        assert_eq!(ExchangeError::PartialFill("p".into()).kind(), ErrorKind::Rejected);
        assert_eq!(
            ExchangeError::ApiError { code: -9999, message: "?".into() }.kind(),
            ErrorKind::Other
        );
        assert!(!ExchangeError::Unauthorized("k".into()).is_retryable());
        assert!(ExchangeError::Unauthorized("k".into()).is_auth_error());
    }

    #[test]
    fn test_parse_error_from_serde() {
        let err: ExchangeError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
