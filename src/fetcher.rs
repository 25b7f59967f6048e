use std::sync::Arc;

use log::{info, warn};
use reqwest::Client;

use crate::config::Config;
use crate::error::QuoteError;
use crate::http::{self, CreditMeta};
use crate::keys::KeyRing;
use crate::quota::{Calendar, LocalCalendar, QuotaTracker};
use crate::quote::{self, QuoteResult};
use crate::symbols::{normalize_symbol, AssetClass};

/// Quote client that owns the quota and key state for one provider account.
///
/// Calls go out one at a time through `&mut self`; each is admitted by the
/// quota tracker, paced by the fixed delay, then attempted exactly once.
pub struct QuoteFetcher {
    client: Client,
    cfg: Config,
    quota: QuotaTracker,
    keys: KeyRing,
    last_credits: Option<CreditMeta>,
}

impl QuoteFetcher {
    pub fn new(cfg: Config) -> reqwest::Result<Self> {
        Self::with_calendar(cfg, Arc::new(LocalCalendar))
    }

    pub fn with_calendar(cfg: Config, calendar: Arc<dyn Calendar>) -> reqwest::Result<Self> {
        let client = http::build_client(&cfg)?;
        let quota = QuotaTracker::with_calendar(cfg.limits.clone(), calendar.clone());
        let keys = KeyRing::with_calendar(cfg.api_keys.clone(), cfg.max_per_key, calendar);
        Ok(Self {
            client,
            cfg,
            quota,
            keys,
            last_credits: None,
        })
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Credit counters from the most recent response that carried them.
    pub fn last_credits(&self) -> Option<CreditMeta> {
        self.last_credits
    }

    pub async fn fetch(&mut self, symbol: &str, class: AssetClass) -> Result<QuoteResult, QuoteError> {
        self.admit().await?;
        let Some(key) = self.keys.checkout().map(str::to_string) else {
            return Err(self.exhausted());
        };
        self.execute(symbol, class, &key).await
    }

    /// Same as [`fetch`](Self::fetch) but with an explicit key, outside rotation.
    pub async fn fetch_with_key(
        &mut self,
        symbol: &str,
        class: AssetClass,
        api_key: &str,
    ) -> Result<QuoteResult, QuoteError> {
        self.admit().await?;
        self.execute(symbol, class, api_key).await
    }

    async fn admit(&mut self) -> Result<(), QuoteError> {
        if self.quota.admit().await {
            Ok(())
        } else {
            Err(self.exhausted())
        }
    }

    fn exhausted(&self) -> QuoteError {
        QuoteError::QuotaExhausted {
            used: self.quota.daily_count(),
            cap: self.quota.limits().per_day,
        }
    }

    async fn execute(
        &mut self,
        symbol: &str,
        class: AssetClass,
        api_key: &str,
    ) -> Result<QuoteResult, QuoteError> {
        self.quota.pace().await;

        let provider_symbol = normalize_symbol(symbol, class).into_owned();
        info!("Fetching {} quote for {}", class, provider_symbol);
        let res = http::get_quote(&self.client, &self.cfg, &provider_symbol, api_key).await?;

        // Any JSON body counts as a round trip, error payloads included.
        self.quota.record();
        if res.credits.is_some() {
            self.last_credits = res.credits;
        }

        // A quote-shaped body on a failed status is still a failure; only the
        // provider's own error payload is more specific than the status.
        let parsed = match quote::parse_quote(&provider_symbol, class, &res.body) {
            Err(e @ QuoteError::Provider { .. }) => Err(e),
            _ if !res.status.is_success() => Err(http::map_status_to_error(res.status)),
            other => other,
        };
        match &parsed {
            Ok(q) => info!(
                "Got {} {} ({})",
                q.symbol,
                q.display_price(),
                q.display_change_percent()
            ),
            Err(e) => warn!("Quote for {} failed: {}", provider_symbol, e),
        }
        parsed
    }
}
