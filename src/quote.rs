use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QuoteError;
use crate::symbols::AssetClass;

pub const SOURCE_NAME: &str = "Twelve Data";

/// Where a quote's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Returned by the live provider.
    Real,
    /// Produced by a caller-side fallback. The fetcher never emits this.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub price: Decimal,
    pub previous_close: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    pub timestamp: String,
    pub provenance: Provenance,
    pub source: String,
}

impl QuoteResult {
    /// Forex prints as a bare 4-decimal rate, everything else as dollars.
    pub fn display_price(&self) -> String {
        match self.asset_class {
            AssetClass::Forex => format!("{:.4}", self.price.round_dp(4)),
            _ => format!("${:.2}", self.price.round_dp(2)),
        }
    }

    pub fn display_change_percent(&self) -> String {
        let sign = if self.change_percent.is_sign_negative() { "" } else { "+" };
        format!("{}{:.2}%", sign, self.change_percent.round_dp(2))
    }
}

/// Percentage move from `previous` to `current`; zero when `previous` is zero.
///
/// `None` when the move does not fit in a `Decimal`.
pub fn percent_change(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return Some(Decimal::ZERO);
    }
    current
        .checked_sub(previous)?
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Turn a parsed quote body into a result.
///
/// Error payloads are checked first (`error` field, then `status: "error"`),
/// then the body must carry `symbol` and a readable `close`.
pub fn parse_quote(symbol: &str, class: AssetClass, body: &Value) -> Result<QuoteResult, QuoteError> {
    if let Some(err) = body.get("error") {
        let message = match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(QuoteError::Provider {
            code: body.get("code").and_then(Value::as_i64),
            message,
        });
    }
    if body.get("status").and_then(Value::as_str) == Some("error") {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(QuoteError::Provider {
            code: body.get("code").and_then(Value::as_i64),
            message,
        });
    }
    if body.get("symbol").is_none() {
        return Err(QuoteError::MalformedResponse(format!(
            "response for {symbol} has no symbol field"
        )));
    }

    let price = body.get("close").and_then(decimal_field).ok_or_else(|| {
        QuoteError::MalformedResponse(format!("response for {symbol} has no readable close"))
    })?;
    let previous_close = body
        .get("previous_close")
        .and_then(decimal_field)
        .unwrap_or(price);
    let out_of_range = || {
        QuoteError::MalformedResponse(format!(
            "change for {symbol} out of range (close {price}, previous close {previous_close})"
        ))
    };
    let change = price.checked_sub(previous_close).ok_or_else(out_of_range)?;
    let change_percent = percent_change(price, previous_close).ok_or_else(out_of_range)?;
    let volume = body.get("volume").and_then(integer_field);
    let timestamp = body
        .get("datetime")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string());

    Ok(QuoteResult {
        symbol: symbol.to_string(),
        asset_class: class,
        price,
        previous_close,
        change,
        change_percent,
        volume,
        timestamp,
        provenance: Provenance::Real,
        source: SOURCE_NAME.to_string(),
    })
}

// Twelve Data sends numbers as strings ("189.84000"); accept both.
fn decimal_field(v: &Value) -> Option<Decimal> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

fn integer_field(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn zero_previous_close_gives_zero_percent() {
        assert_eq!(percent_change(dec!(100), dec!(0)), Some(Decimal::ZERO));
        let body = json!({"symbol": "AAPL", "close": "100", "previous_close": "0"});
        let q = parse_quote("AAPL", AssetClass::Stock, &body).unwrap();
        assert_eq!(q.change_percent, Decimal::ZERO);
        assert_eq!(q.change, dec!(100));
    }

    #[test]
    fn parses_twelve_data_quote() {
        let body = json!({
            "symbol": "AAPL",
            "name": "Apple Inc",
            "datetime": "2025-03-14",
            "close": "110.00000",
            "previous_close": "100.00000",
            "volume": "52345600"
        });
        let q = parse_quote("AAPL", AssetClass::Stock, &body).unwrap();
        assert_eq!(q.price, dec!(110));
        assert_eq!(q.previous_close, dec!(100));
        assert_eq!(q.change, dec!(10));
        assert_eq!(q.change_percent, dec!(10));
        assert_eq!(q.volume, Some(52_345_600));
        assert_eq!(q.timestamp, "2025-03-14");
        assert_eq!(q.provenance, Provenance::Real);
        assert_eq!(q.source, "Twelve Data");
    }

    #[test]
    fn missing_previous_close_defaults_to_price() {
        let body = json!({"symbol": "EUR/USD", "close": 1.0842});
        let q = parse_quote("EUR/USD", AssetClass::Forex, &body).unwrap();
        assert_eq!(q.previous_close, dec!(1.0842));
        assert_eq!(q.change, Decimal::ZERO);
        assert_eq!(q.change_percent, Decimal::ZERO);
        assert_eq!(q.volume, None);
        assert!(!q.timestamp.is_empty());
    }

    #[test]
    fn error_payloads_become_provider_errors() {
        let e = parse_quote("AAPL", AssetClass::Stock, &json!({"error": "rate limit"})).unwrap_err();
        assert!(matches!(e, QuoteError::Provider { code: None, ref message } if message == "rate limit"));

        let body = json!({"code": 429, "message": "run out of API credits", "status": "error"});
        let e = parse_quote("AAPL", AssetClass::Stock, &body).unwrap_err();
        assert!(matches!(e, QuoteError::Provider { code: Some(429), .. }));
        assert_eq!(e.code(), "rate_limited");

        let e = parse_quote("AAPL", AssetClass::Stock, &json!({"status": "error"})).unwrap_err();
        assert_eq!(e.to_string(), "Provider error: Unknown error");
    }

    #[test]
    fn missing_symbol_or_close_is_malformed() {
        let e = parse_quote("AAPL", AssetClass::Stock, &json!({"close": "1"})).unwrap_err();
        assert!(matches!(e, QuoteError::MalformedResponse(_)));
        let e = parse_quote("AAPL", AssetClass::Stock, &json!([1, 2])).unwrap_err();
        assert!(matches!(e, QuoteError::MalformedResponse(_)));
        let e = parse_quote("AAPL", AssetClass::Stock, &json!({"symbol": "AAPL", "close": "n/a"}))
            .unwrap_err();
        assert!(matches!(e, QuoteError::MalformedResponse(_)));
    }

    #[test]
    fn overflowing_change_is_malformed() {
        let tiny = json!({
            "symbol": "X",
            "close": "79228162514264337593543950335",
            "previous_close": "0.0000000000000000000000000001"
        });
        let e = parse_quote("X", AssetClass::Stock, &tiny).unwrap_err();
        assert!(matches!(e, QuoteError::MalformedResponse(_)), "got {e:?}");

        let opposite = json!({
            "symbol": "X",
            "close": "79228162514264337593543950335",
            "previous_close": "-79228162514264337593543950335"
        });
        let e = parse_quote("X", AssetClass::Stock, &opposite).unwrap_err();
        assert!(matches!(e, QuoteError::MalformedResponse(_)), "got {e:?}");

        assert_eq!(percent_change(Decimal::MAX, Decimal::MIN), None);
    }

    #[test]
    fn display_formats() {
        let body = json!({"symbol": "EUR/USD", "close": "1.08423", "previous_close": "1.07"});
        let fx = parse_quote("EUR/USD", AssetClass::Forex, &body).unwrap();
        assert_eq!(fx.display_price(), "1.0842");
        assert!(fx.display_change_percent().starts_with('+'));

        let body = json!({"symbol": "AAPL", "close": "99", "previous_close": "100"});
        let stock = parse_quote("AAPL", AssetClass::Stock, &body).unwrap();
        assert_eq!(stock.display_price(), "$99.00");
        assert_eq!(stock.display_change_percent(), "-1.00%");
    }
}
