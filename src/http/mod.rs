use crate::config::Config;
use crate::error::QuoteError;
use log::{debug, warn};
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// API credit counters reported by the provider on each response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditMeta {
    pub used: Option<u32>,
    pub left: Option<u32>,
}

/// A response whose body parsed as JSON. Receiving one of these means the
/// request reached the provider and counts against quota.
#[derive(Debug, Clone)]
pub struct QuoteResponse {
    pub status: StatusCode,
    pub credits: Option<CreditMeta>,
    pub body: Value,
}

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(cfg.user_agent.as_str())
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
}

pub fn extract_credits(headers: &HeaderMap) -> Option<CreditMeta> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u32>().ok())
    };
    let used = read("api-credits-used");
    let left = read("api-credits-left");
    if used.is_none() && left.is_none() {
        return None;
    }
    Some(CreditMeta { used, left })
}

/// Error for a non-success status whose body carried no error payload.
pub fn map_status_to_error(status: StatusCode) -> QuoteError {
    let reason = status.canonical_reason().unwrap_or("unexpected status");
    QuoteError::Provider {
        code: Some(i64::from(status.as_u16())),
        message: format!("HTTP {} {}", status.as_u16(), reason),
    }
}

/// Single GET against `<api_url>/quote`. No retries.
///
/// Transport errors and bodies that are not JSON come back as errors; both
/// mean nothing usable was received.
pub async fn get_quote(
    client: &Client,
    cfg: &Config,
    symbol: &str,
    api_key: &str,
) -> Result<QuoteResponse, QuoteError> {
    let url = format!("{}/quote", cfg.api_url);
    let res = client
        .get(&url)
        .query(&[("symbol", symbol), ("apikey", api_key)])
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            warn!("Quote GET {} failed to send: {}", symbol, e);
            QuoteError::Transport(e)
        })?;

    let status = res.status();
    let credits = extract_credits(res.headers());
    if let Some(c) = credits {
        debug!("Provider credits: used={:?} left={:?}", c.used, c.left);
    }
    let text = res.text().await.map_err(|e| {
        warn!("Quote GET {} failed reading body: {}", symbol, e);
        QuoteError::Transport(e)
    })?;

    let body: Value = serde_json::from_str(&text).map_err(|e| {
        warn!("Quote GET {} returned non-JSON body (status {})", symbol, status);
        QuoteError::MalformedResponse(format!("status {status}: {e}"))
    })?;
    Ok(QuoteResponse {
        status,
        credits,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_headers() {
        let mut h = HeaderMap::new();
        assert_eq!(extract_credits(&h), None);
        h.insert("api-credits-used", "3".parse().unwrap());
        h.insert("api-credits-left", "797".parse().unwrap());
        assert_eq!(
            extract_credits(&h),
            Some(CreditMeta {
                used: Some(3),
                left: Some(797)
            })
        );
    }

    #[test]
    fn status_error_mapping() {
        let e = map_status_to_error(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(e.code(), "rate_limited");
        assert!(e.is_retriable());
        let e = map_status_to_error(StatusCode::BAD_GATEWAY);
        assert_eq!(e.code(), "provider_error");
        assert!(e.is_retriable());
        assert_eq!(e.to_string(), "Provider error: HTTP 502 Bad Gateway");
    }
}
