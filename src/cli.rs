use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use market_quotes::http::CreditMeta;
use market_quotes::keys::mask_key;
use market_quotes::{AssetClass, Config, ErrorInfo, QuoteError, QuoteFetcher, QuoteResult};
use serde::Serialize;

pub fn build_cli() -> Command {
    Command::new("market-quotes")
        .about("Rate-limited market quotes from Twelve Data")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .global(true)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("quote")
                .about("Fetch quotes, in order, under one shared quota")
                .arg(
                    Arg::new("symbols")
                        .value_name("SYMBOL[:CLASS]")
                        .num_args(1..)
                        .required(true)
                        .help("Symbol with optional asset class: stock, forex, crypto, commodity"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .num_args(1)
                        .value_parser(["json", "text"])
                        .default_value("json"),
                ),
        )
        .subcommand(
            Command::new("check-keys")
                .about("Probe every configured API key with one quote request")
                .arg(
                    Arg::new("symbol")
                        .long("symbol")
                        .num_args(1)
                        .default_value("AAPL"),
                ),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, else RUST_LOG, else info.
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    builder.init();
}

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("quote", sub)) => run_quote(sub).await,
        Some(("check-keys", sub)) => run_check_keys(sub).await,
        _ => Err(anyhow!("no command given (try `quote` or `check-keys`)")),
    }
}

/// Split `EURUSD:forex` into symbol and class; the class defaults to stock.
pub fn parse_request(raw: &str) -> anyhow::Result<(String, AssetClass)> {
    let (symbol, class) = match raw.rsplit_once(':') {
        Some((s, c)) => (s, c.parse::<AssetClass>().map_err(|e| anyhow!(e))?),
        None => (raw, AssetClass::Stock),
    };
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(anyhow!("empty symbol in {raw:?}"));
    }
    Ok((symbol.to_string(), class))
}

fn fetcher_from_env() -> anyhow::Result<QuoteFetcher> {
    let cfg = Config::from_env().map_err(|e| anyhow!(e))?;
    QuoteFetcher::new(cfg).context("building HTTP client")
}

#[derive(Debug, Serialize)]
struct QuoteItem {
    requested: String,
    asset_class: AssetClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote: Option<QuoteResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
struct QuoteMeta {
    daily_used: u32,
    daily_cap: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    credits: Option<CreditMeta>,
}

#[derive(Debug, Serialize)]
struct QuoteOutput {
    items: Vec<QuoteItem>,
    meta: QuoteMeta,
}

async fn run_quote(m: &ArgMatches) -> anyhow::Result<()> {
    let requests = m
        .get_many::<String>("symbols")
        .into_iter()
        .flatten()
        .map(|s| parse_request(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut fetcher = fetcher_from_env()?;

    let mut items = Vec::with_capacity(requests.len());
    for (symbol, class) in requests {
        let outcome = fetcher.fetch(&symbol, class).await;
        let (quote, error) = match outcome {
            Ok(q) => (Some(q), None),
            Err(e) => (None, Some(e.to_info())),
        };
        items.push(QuoteItem {
            requested: symbol,
            asset_class: class,
            quote,
            error,
        });
    }

    let output = QuoteOutput {
        items,
        meta: QuoteMeta {
            daily_used: fetcher.quota().daily_count(),
            daily_cap: fetcher.quota().limits().per_day,
            credits: fetcher.last_credits(),
        },
    };
    if m.get_one::<String>("format").map(String::as_str) == Some("text") {
        for item in &output.items {
            println!("{}", text_line(item));
        }
    } else {
        println!("{}", serde_json::to_string(&output)?);
    }
    Ok(())
}

fn text_line(item: &QuoteItem) -> String {
    match (&item.quote, &item.error) {
        (Some(q), _) => format!(
            "{} {} {} ({})",
            q.symbol,
            q.display_price(),
            q.display_change_percent(),
            q.timestamp
        ),
        (None, Some(e)) => format!("{} unavailable: {}", item.requested, e.message),
        (None, None) => format!("{} unavailable", item.requested),
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Working,
    RateLimited,
    Error,
    Unreachable,
    Skipped,
}

#[derive(Debug, Serialize)]
struct KeyReport {
    key: String,
    status: KeyStatus,
    detail: String,
}

pub fn classify_probe(outcome: &Result<QuoteResult, QuoteError>) -> KeyStatus {
    match outcome {
        Ok(_) => KeyStatus::Working,
        Err(QuoteError::Transport(_)) => KeyStatus::Unreachable,
        Err(QuoteError::QuotaExhausted { .. }) => KeyStatus::Skipped,
        Err(QuoteError::Provider { code, message }) => {
            let lower = message.to_ascii_lowercase();
            if *code == Some(429) || lower.contains("limit") || lower.contains("credits") {
                KeyStatus::RateLimited
            } else {
                KeyStatus::Error
            }
        }
        Err(QuoteError::MalformedResponse(_)) => KeyStatus::Error,
    }
}

async fn run_check_keys(m: &ArgMatches) -> anyhow::Result<()> {
    let symbol = m
        .get_one::<String>("symbol")
        .cloned()
        .unwrap_or_else(|| "AAPL".to_string());
    let (symbol, class) = parse_request(&symbol)?;
    let mut fetcher = fetcher_from_env()?;
    let keys = fetcher.keys().keys().to_vec();
    info!("Probing {} API key(s) with {}", keys.len(), symbol);

    let mut reports = Vec::with_capacity(keys.len());
    for key in &keys {
        let outcome = fetcher.fetch_with_key(&symbol, class, key).await;
        let status = classify_probe(&outcome);
        let detail = match &outcome {
            Ok(q) => format!("{} {}", q.symbol, q.display_price()),
            Err(e) => e.to_string(),
        };
        reports.push(KeyReport {
            key: mask_key(key),
            status,
            detail,
        });
    }
    let working = reports
        .iter()
        .filter(|r| r.status == KeyStatus::Working)
        .count();
    info!("Working keys: {}/{}", working, reports.len());
    println!("{}", serde_json::to_string(&reports)?);
    Ok(())
}
