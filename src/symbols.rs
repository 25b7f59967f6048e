use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Stock,
    Forex,
    Crypto,
    Commodity,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stock => "stock",
            AssetClass::Forex => "forex",
            AssetClass::Crypto => "crypto",
            AssetClass::Commodity => "commodity",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" | "equity" => Ok(AssetClass::Stock),
            "forex" | "fx" => Ok(AssetClass::Forex),
            "crypto" => Ok(AssetClass::Crypto),
            "commodity" => Ok(AssetClass::Commodity),
            other => Err(format!(
                "unknown asset class {other:?} (expected stock, forex, crypto or commodity)"
            )),
        }
    }
}

/// Rewrite applied to a symbol before it is sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Known metal aliases map to their canonical pair.
    MetalAlias,
    /// Bare six-letter pair gets a slash after the base currency.
    SplitPair,
    /// Bare crypto ticker is quoted against USD.
    CryptoUsd,
}

/// Asset class to rewrite rules, applied in order; the first that fires wins.
pub const RULES: &[(AssetClass, &[Rewrite])] = &[
    (AssetClass::Forex, &[Rewrite::MetalAlias, Rewrite::SplitPair]),
    (AssetClass::Crypto, &[Rewrite::CryptoUsd]),
];

const METAL_ALIASES: &[(&str, &str)] = &[("XAUUSD", "XAU/USD"), ("XAU/USD", "XAU/USD")];

const CRYPTO_TICKERS: &[&str] = &["BTC", "ETH", "SOL", "XRP", "ADA", "BNB", "DOT", "LTC"];

/// Put `symbol` into the provider's format for `class`.
/// Symbols no rule recognizes are returned unchanged.
pub fn normalize_symbol(symbol: &str, class: AssetClass) -> Cow<'_, str> {
    let rules = RULES
        .iter()
        .find(|(c, _)| *c == class)
        .map(|(_, r)| *r)
        .unwrap_or(&[]);
    for rule in rules {
        if let Some(rewritten) = apply(*rule, symbol) {
            return Cow::Owned(rewritten);
        }
    }
    Cow::Borrowed(symbol)
}

fn apply(rule: Rewrite, symbol: &str) -> Option<String> {
    match rule {
        Rewrite::MetalAlias => METAL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == symbol)
            .map(|(_, canonical)| canonical.to_string()),
        Rewrite::SplitPair => {
            if symbol.len() == 6 && symbol.is_ascii() && !symbol.contains('/') {
                Some(format!("{}/{}", &symbol[..3], &symbol[3..]))
            } else {
                None
            }
        }
        Rewrite::CryptoUsd => CRYPTO_TICKERS
            .contains(&symbol)
            .then(|| format!("{symbol}/USD")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_formats() {
        assert_eq!(normalize_symbol("EURUSD", AssetClass::Forex), "EUR/USD");
        assert_eq!(normalize_symbol("XAUUSD", AssetClass::Forex), "XAU/USD");
        assert_eq!(normalize_symbol("XAU/USD", AssetClass::Forex), "XAU/USD");
        assert_eq!(normalize_symbol("BTC", AssetClass::Crypto), "BTC/USD");
        assert_eq!(normalize_symbol("AAPL", AssetClass::Stock), "AAPL");
    }

    #[test]
    fn unrecognized_passes_through() {
        assert_eq!(normalize_symbol("EUR/USD", AssetClass::Forex), "EUR/USD");
        assert_eq!(normalize_symbol("USDJPYX", AssetClass::Forex), "USDJPYX");
        assert_eq!(normalize_symbol("DOGE", AssetClass::Crypto), "DOGE");
        assert_eq!(normalize_symbol("ETH/EUR", AssetClass::Crypto), "ETH/EUR");
        assert_eq!(normalize_symbol("EURUSD", AssetClass::Stock), "EURUSD");
        assert_eq!(normalize_symbol("XAUUSD", AssetClass::Commodity), "XAUUSD");
        assert!(matches!(
            normalize_symbol("MSFT", AssetClass::Stock),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn asset_class_parsing() {
        assert_eq!("Forex".parse::<AssetClass>().unwrap(), AssetClass::Forex);
        assert_eq!("fx".parse::<AssetClass>().unwrap(), AssetClass::Forex);
        assert_eq!(" crypto ".parse::<AssetClass>().unwrap(), AssetClass::Crypto);
        assert!("bond".parse::<AssetClass>().is_err());
        assert_eq!(AssetClass::Commodity.to_string(), "commodity");
    }
}
