//! Rate-limited market quote client for the Twelve Data API.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod keys;
pub mod quota;
pub mod quote;
pub mod symbols;

pub use config::Config;
pub use error::{ErrorInfo, QuoteError};
pub use fetcher::QuoteFetcher;
pub use quota::{QuotaLimits, QuotaTracker};
pub use quote::{Provenance, QuoteResult};
pub use symbols::AssetClass;
