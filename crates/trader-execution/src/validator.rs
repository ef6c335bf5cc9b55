//! 웹훅 시그널 검증.
//!
//! 인증은 두 가지 방식을 지원하며 비교는 모두 상수 시간으로 수행합니다:
//! - 헤더 서명: 원문 바이트의 HMAC-SHA256 (hex, `sha256=` 접두사 허용)
//! - 본문 `passphrase` 필드: HMAC을 계산할 수 없는 알림 플랫폼용
//!
//! 헤더가 있으면 헤더만으로 판단하며, passphrase가 맞더라도 헤더가 틀리면 거부합니다.
//! 검증은 부작용이 없는 순수 함수이며 현재 시각을 인자로 받습니다.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use trader_core::{AuthMethod, Signal, TradeAction, TraderError, TraderResult, WebhookConfig};

use crate::error::ValidationError;

type HmacSha256 = Hmac<Sha256>;

/// 이 값보다 큰 정수 타임스탬프는 밀리초로 해석합니다.
const MILLIS_THRESHOLD: u64 = 1_000_000_000_000;

/// 웹훅 본문.
#[derive(Debug, Deserialize)]
struct RawSignal {
    action: Option<Value>,
    passphrase: Option<String>,
    #[serde(alias = "nonce")]
    id: Option<Value>,
    timestamp: Option<Value>,
}

/// 웹훅 시그널 검증기.
#[derive(Clone)]
pub struct SignalValidator {
    /// 공유 시크릿으로 키가 설정된 HMAC (사용할 때마다 복제)
    mac: HmacSha256,
    /// 설정된 passphrase에 대한 HMAC 태그
    passphrase_tag: Vec<u8>,
    freshness_window: Duration,
    max_future_skew: Duration,
}

impl std::fmt::Debug for SignalValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalValidator")
            .field("secret", &"***REDACTED***")
            .field("freshness_window", &self.freshness_window)
            .field("max_future_skew", &self.max_future_skew)
            .finish()
    }
}

impl SignalValidator {
    /// 공유 시크릿으로 검증기를 생성합니다. 기본 허용 범위는 300초, 미래 오차는 30초입니다.
    pub fn new(secret: &str) -> TraderResult<Self> {
        if secret.is_empty() {
            return Err(TraderError::Config("웹훅 시크릿이 비어 있습니다".to_string()));
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .map_err(|e| TraderError::Config(format!("잘못된 웹훅 시크릿: {}", e)))?;

        let mut tag = mac.clone();
        tag.update(secret.as_bytes());
        let passphrase_tag = tag.finalize().into_bytes().to_vec();

        Ok(Self {
            mac,
            passphrase_tag,
            freshness_window: Duration::seconds(300),
            max_future_skew: Duration::seconds(30),
        })
    }

    /// 웹훅 설정에서 생성합니다.
    pub fn from_config(config: &WebhookConfig) -> TraderResult<Self> {
        let secret = config.secret.as_deref().map(str::trim).unwrap_or_default();

        Ok(Self::new(secret)?
            .with_freshness_window(Duration::seconds(config.freshness_window_secs as i64))
            .with_max_future_skew(Duration::seconds(config.max_future_skew_secs as i64)))
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_max_future_skew(mut self, skew: Duration) -> Self {
        self.max_future_skew = skew;
        self
    }

    /// 페이로드에 대한 hex 서명을 계산합니다.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// 원문 페이로드와 서명을 검증하여 시그널을 반환합니다.
    pub fn validate(
        &self,
        raw: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Signal, ValidationError> {
        let header_auth = match signature.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sig) => {
                self.verify_signature(raw, sig)?;
                true
            }
            None => false,
        };

        let parsed: Result<RawSignal, _> = serde_json::from_slice(raw);
        let body = match parsed {
            Ok(body) => body,
            // 인증되지 않은 요청에는 형식 에러를 알려주지 않음
            Err(_) if !header_auth => return Err(ValidationError::MissingCredentials),
            Err(e) => return Err(ValidationError::MalformedPayload(e.to_string())),
        };

        let auth = if header_auth {
            AuthMethod::HeaderSignature
        } else {
            match body.passphrase.as_deref() {
                Some(passphrase) => {
                    self.verify_passphrase(passphrase)?;
                    AuthMethod::Passphrase
                }
                None => return Err(ValidationError::MissingCredentials),
            }
        };

        let action = Self::parse_action(body.action.as_ref())?;
        let timestamp = body.timestamp.as_ref().map(Self::parse_timestamp).transpose()?;
        if let Some(ts) = timestamp {
            self.check_freshness(ts, now)?;
        }

        let id = Self::signal_id(body.id.as_ref(), timestamp, action, raw);

        Ok(Signal {
            id,
            action,
            timestamp,
            auth,
            received_at: now,
        })
    }

    /// 시그널 파싱 없이 요청 인증만 수행합니다 (운영자 요청용).
    ///
    /// 헤더 서명이 있으면 헤더로, 없으면 JSON 본문의 `passphrase`로 확인합니다.
    pub fn authenticate(&self, raw: &[u8], signature: Option<&str>) -> Result<(), ValidationError> {
        if let Some(sig) = signature.map(str::trim).filter(|s| !s.is_empty()) {
            return self.verify_signature(raw, sig);
        }

        let passphrase = serde_json::from_slice::<Value>(raw)
            .ok()
            .and_then(|v| v.get("passphrase").and_then(Value::as_str).map(str::to_string));
        match passphrase {
            Some(p) => self.verify_passphrase(&p),
            None => Err(ValidationError::MissingCredentials),
        }
    }

    fn verify_signature(&self, raw: &[u8], signature: &str) -> Result<(), ValidationError> {
        let hex_sig = signature.strip_prefix("sha256=").unwrap_or(signature);
        let expected = hex::decode(hex_sig).map_err(|_| ValidationError::InvalidSignature)?;

        let mut mac = self.mac.clone();
        mac.update(raw);
        mac.verify_slice(&expected)
            .map_err(|_| ValidationError::InvalidSignature)
    }

    fn verify_passphrase(&self, passphrase: &str) -> Result<(), ValidationError> {
        // 길이가 같은 HMAC 태그끼리 비교하여 길이 정보도 노출하지 않음
        let mut mac = self.mac.clone();
        mac.update(passphrase.as_bytes());
        mac.verify_slice(&self.passphrase_tag)
            .map_err(|_| ValidationError::InvalidSignature)
    }

    fn parse_action(value: Option<&Value>) -> Result<TradeAction, ValidationError> {
        match value {
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| ValidationError::UnsupportedAction(s.trim().to_string())),
            Some(other) => Err(ValidationError::UnsupportedAction(other.to_string())),
            None => Err(ValidationError::MalformedPayload(
                "action 필드가 없습니다".to_string(),
            )),
        }
    }

    fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, ValidationError> {
        let invalid = || ValidationError::InvalidTimestamp(value.to_string());

        let from_epoch = |n: i64| {
            let parsed = if n.unsigned_abs() > MILLIS_THRESHOLD {
                Utc.timestamp_millis_opt(n)
            } else {
                Utc.timestamp_opt(n, 0)
            };
            parsed.single().ok_or_else(invalid)
        };

        match value {
            Value::Number(n) => match n.as_i64() {
                Some(n) => from_epoch(n),
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .ok_or_else(invalid)
                    .and_then(|f| from_epoch(f as i64)),
            },
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(n) => from_epoch(n),
                    Err(_) => DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|_| invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }

    fn check_freshness(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let age = now - ts;
        if age > self.freshness_window {
            return Err(ValidationError::StaleSignal {
                age_secs: age.num_seconds(),
                window_secs: self.freshness_window.num_seconds(),
            });
        }
        if -age > self.max_future_skew {
            return Err(ValidationError::FutureTimestamp {
                ahead_secs: (-age).num_seconds(),
            });
        }
        Ok(())
    }

    /// 시그널 식별자: 명시적 id, 없으면 타임스탬프+액션, 없으면 원문 해시.
    fn signal_id(
        id: Option<&Value>,
        timestamp: Option<DateTime<Utc>>,
        action: TradeAction,
        raw: &[u8],
    ) -> String {
        let explicit = match id {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        if let Some(id) = explicit {
            return id;
        }
        if let Some(ts) = timestamp {
            return format!("ts:{}:{}", ts.timestamp_millis(), action);
        }
        format!("sha256:{}", hex::encode(Sha256::digest(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "webhook-secret";

    fn validator() -> SignalValidator {
        SignalValidator::new(SECRET).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_header_signature_accepted() {
        let v = validator();
        let body = br#"{"action":"BUY","id":"alert-1"}"#;
        let sig = v.sign(body);

        let signal = v.validate(body, Some(&sig), now()).unwrap();
        assert_eq!(signal.action, TradeAction::Buy);
        assert_eq!(signal.id, "alert-1");
        assert_eq!(signal.auth, AuthMethod::HeaderSignature);

        let prefixed = format!("sha256={}", sig.to_uppercase());
        assert!(v.validate(body, Some(&prefixed), now()).is_ok());
    }

    #[test]
    fn test_header_signature_rejected() {
        let v = validator();
        let body = br#"{"action":"buy"}"#;
        let other = SignalValidator::new("other").unwrap().sign(body);

        assert_eq!(
            v.validate(body, Some(&other), now()).unwrap_err(),
            ValidationError::InvalidSignature
        );
        assert_eq!(
            v.validate(body, Some("not-hex"), now()).unwrap_err(),
            ValidationError::InvalidSignature
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let v = validator();
        let sig = v.sign(br#"{"action":"buy"}"#);
        let err = v.validate(br#"{"action":"sell"}"#, Some(&sig), now()).unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_wrong_header_wins_over_correct_passphrase() {
        let v = validator();
        let body = format!(r#"{{"action":"buy","passphrase":"{}"}}"#, SECRET);
        let err = v.validate(body.as_bytes(), Some("00"), now()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidSignature);
    }

    #[test]
    fn test_passphrase_auth() {
        let v = validator();
        let body = format!(r#"{{"action":"close","passphrase":"{}"}}"#, SECRET);
        let signal = v.validate(body.as_bytes(), None, now()).unwrap();
        assert_eq!(signal.action, TradeAction::Close);
        assert_eq!(signal.auth, AuthMethod::Passphrase);

        let wrong = br#"{"action":"close","passphrase":"guess"}"#;
        assert_eq!(
            v.validate(wrong, None, now()).unwrap_err(),
            ValidationError::InvalidSignature
        );
    }

    #[test]
    fn test_missing_credentials() {
        let v = validator();
        assert_eq!(
            v.validate(br#"{"action":"buy"}"#, None, now()).unwrap_err(),
            ValidationError::MissingCredentials
        );
        assert_eq!(
            v.validate(b"not json", None, now()).unwrap_err(),
            ValidationError::MissingCredentials
        );
    }

    #[test]
    fn test_unsupported_action() {
        let v = validator();
        let body = br#"{"action":"hold"}"#;
        let err = v.validate(body, Some(&v.sign(body)), now()).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedAction("hold".to_string()));
        assert!(!err.is_auth());

        let numeric = br#"{"action":1}"#;
        assert!(matches!(
            v.validate(numeric, Some(&v.sign(numeric)), now()),
            Err(ValidationError::UnsupportedAction(_))
        ));
    }

    #[test]
    fn test_malformed_payload_after_auth() {
        let v = validator();
        let body = b"{broken";
        assert!(matches!(
            v.validate(body, Some(&v.sign(body)), now()),
            Err(ValidationError::MalformedPayload(_))
        ));

        let no_action = br#"{"id":"x"}"#;
        assert!(matches!(
            v.validate(no_action, Some(&v.sign(no_action)), now()),
            Err(ValidationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_timestamp_formats() {
        let ts = now() - Duration::seconds(10);
        let cases = [
            format!(r#"{{"action":"buy","timestamp":{}}}"#, ts.timestamp()),
            format!(r#"{{"action":"buy","timestamp":{}}}"#, ts.timestamp_millis()),
            format!(r#"{{"action":"buy","timestamp":"{}"}}"#, ts.to_rfc3339()),
            format!(r#"{{"action":"buy","timestamp":"{}"}}"#, ts.timestamp()),
        ];

        let v = validator();
        for body in cases {
            let signal = v.validate(body.as_bytes(), Some(&v.sign(body.as_bytes())), now()).unwrap();
            assert_eq!(signal.timestamp, Some(ts), "body: {}", body);
            assert_eq!(signal.id, format!("ts:{}:buy", ts.timestamp_millis()));
        }
    }

    #[test]
    fn test_stale_and_future_timestamps() {
        let v = validator();

        let stale = format!(r#"{{"action":"buy","timestamp":{}}}"#, (now() - Duration::seconds(301)).timestamp());
        assert!(matches!(
            v.validate(stale.as_bytes(), Some(&v.sign(stale.as_bytes())), now()),
            Err(ValidationError::StaleSignal { age_secs: 301, .. })
        ));

        let future = format!(r#"{{"action":"buy","timestamp":{}}}"#, (now() + Duration::seconds(60)).timestamp());
        assert!(matches!(
            v.validate(future.as_bytes(), Some(&v.sign(future.as_bytes())), now()),
            Err(ValidationError::FutureTimestamp { ahead_secs: 60 })
        ));

        let garbage = br#"{"action":"buy","timestamp":"yesterday"}"#;
        assert!(matches!(
            v.validate(garbage, Some(&v.sign(garbage)), now()),
            Err(ValidationError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_out_of_range_timestamps_rejected() {
        let v = validator();
        let bodies = [
            format!(r#"{{"action":"buy","timestamp":{}}}"#, i64::MIN),
            format!(r#"{{"action":"buy","timestamp":"{}"}}"#, i64::MIN),
            format!(r#"{{"action":"buy","timestamp":{}}}"#, i64::MAX),
            r#"{"action":"buy","timestamp":1e300}"#.to_string(),
        ];

        for body in bodies {
            let result = v.validate(body.as_bytes(), Some(&v.sign(body.as_bytes())), now());
            assert!(
                matches!(result, Err(ValidationError::InvalidTimestamp(_))),
                "body: {}, result: {:?}",
                body,
                result
            );
        }
    }

    #[test]
    fn test_signal_id_from_payload_hash_is_stable() {
        let v = validator();
        let body = br#"{"action":"sell"}"#;
        let sig = v.sign(body);
        let first = v.validate(body, Some(&sig), now()).unwrap();
        let second = v.validate(body, Some(&sig), now() + Duration::seconds(5)).unwrap();
        assert!(first.id.starts_with("sha256:"));
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_numeric_id_and_nonce_alias() {
        let v = validator();
        let body = br#"{"action":"buy","nonce":12345}"#;
        let signal = v.validate(body, Some(&v.sign(body)), now()).unwrap();
        assert_eq!(signal.id, "12345");
    }

    #[test]
    fn test_authenticate_without_signal() {
        let v = validator();
        let body = b"{}";
        let sig = v.sign(body);

        assert!(v.authenticate(body, Some(&sig)).is_ok());
        assert_eq!(v.authenticate(body, None), Err(ValidationError::MissingCredentials));
        assert_eq!(
            v.authenticate(br#"{"passphrase":"wrong"}"#, None),
            Err(ValidationError::InvalidSignature)
        );
        let with_pass = format!(r#"{{"passphrase":"{}"}}"#, SECRET);
        assert!(v.authenticate(with_pass.as_bytes(), None).is_ok());
    }

    #[test]
    fn test_from_config_requires_secret() {
        let mut config = WebhookConfig::default();
        assert!(SignalValidator::from_config(&config).is_err());
        assert!(SignalValidator::new("").is_err());

        config.secret = Some("abc".to_string());
        config.freshness_window_secs = 60;
        let v = SignalValidator::from_config(&config).unwrap();
        assert_eq!(v.freshness_window, Duration::seconds(60));
        assert!(!format!("{:?}", v).contains("abc"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn signed_payloads_always_authenticate(id in "[a-z0-9]{1,16}", action in prop::sample::select(vec!["buy", "SELL", "Close"])) {
            let v = SignalValidator::new("prop-secret").unwrap();
            let body = format!(r#"{{"action":"{}","id":"{}"}}"#, action, id);
            let sig = v.sign(body.as_bytes());
            let signal = v.validate(body.as_bytes(), Some(&sig), Utc::now()).unwrap();
            prop_assert_eq!(signal.id, id);
        }

        #[test]
        fn foreign_signatures_never_authenticate(secret in "[a-zA-Z0-9]{1,32}") {
            prop_assume!(secret != "prop-secret");
            let v = SignalValidator::new("prop-secret").unwrap();
            let body = br#"{"action":"buy"}"#;
            let sig = SignalValidator::new(&secret).unwrap().sign(body);
            prop_assert_eq!(v.validate(body, Some(&sig), Utc::now()).unwrap_err(), ValidationError::InvalidSignature);
        }
    }
}
