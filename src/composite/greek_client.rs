//! Real-time Greek calculation driven by cache events.
//!
//! A [`GreekClient`] owns a named registry of calculators and subscribes to
//! the cache observers selected by the update-frequency mask:
//!
//! - risk-free-rate update: recompute every contract of every security
//! - security supplementary update (dividend yield): recompute that
//!   security's contracts
//! - equity trade/quote: recompute that security's contracts
//! - options trade/quote: recompute that contract only
//!
//! It also hosts the REST fetchers seeding the cache with the risk-free
//! rate and dividend yields, plus an index-price helper for seeding
//! index-based underlyings that never print equity trades on the feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use crate::equities::{EquityQuote, EquityTrade, MarketSource};
use crate::options::{contract, OptionQuote, OptionRefresh, OptionTrade, OptionUnusualActivity};
use crate::req::HttpClient;

use super::black_scholes::BlackScholesCalculator;
use super::data_cache::{
    take_new_datum, take_new_greek, DataCache, OnOptionsContractGreekDataUpdated,
};
use super::greek::{Greek, GreekUpdateFrequency};
use super::options_contract_data::OptionsContractData;
use super::security_data::SecurityData;

/// Security-scope supplementary key for the trailing dividend yield.
pub const DIVIDEND_YIELD_KEY: &str = "DividendYield";
/// Global-scope supplementary key for the risk-free rate.
pub const RISK_FREE_INTEREST_RATE_KEY: &str = "RiskFreeInterestRate";
/// Registry and Greek-map key of the built-in calculator.
pub const BLACK_SCHOLES_KEY: &str = "IntrinioBlackScholes";

/// Fallback risk-free rate when the cache has none.
pub const DEFAULT_RISK_FREE_INTEREST_RATE: f64 = 0.0416;
/// Fallback dividend yield when the security has none.
pub const DEFAULT_DIVIDEND_YIELD: f64 = 0.0;

/// Seconds per year (365.25 days).
const SECONDS_PER_YEAR: f64 = 31_557_600.0;

const RISK_FREE_RATE_ATTEMPTS: u32 = 10;
const BULK_DIVIDEND_ATTEMPTS: u32 = 5;
const TICKER_DIVIDEND_ATTEMPTS: u32 = 3;
const INDEX_PRICE_ATTEMPTS: u32 = 3;

const API_BASE: &str = "https://api-v2.intrinio.com";

/// A registered Greek calculation. Calculators read market state from the
/// handles and publish through the cache's Greek (preferred) or
/// supplementary setters.
pub type GreekCalculation =
    Arc<dyn Fn(&Arc<OptionsContractData>, &Arc<SecurityData>, &Arc<DataCache>) + Send + Sync>;

pub struct GreekClient {
    cache: Arc<DataCache>,
    calculations: RwLock<HashMap<String, GreekCalculation>>,
    api_key: String,
    http: HttpClient,
    stopped: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct RealtimePriceResponse {
    #[serde(default)]
    last_price: Option<f64>,
}

impl GreekClient {
    /// Build a Greek client over `cache`, registering cache observers for
    /// the enabled frequency flags. Disabled flags leave their observer
    /// slots free for the host. `on_greek`, when supplied, is installed as
    /// the cache's Greek-data observer.
    pub fn new(
        frequency: GreekUpdateFrequency,
        on_greek: Option<OnOptionsContractGreekDataUpdated>,
        api_key: impl Into<String>,
        cache: Arc<DataCache>,
    ) -> Arc<GreekClient> {
        let client = Arc::new(GreekClient {
            cache: Arc::clone(&cache),
            calculations: RwLock::new(HashMap::new()),
            api_key: api_key.into(),
            http: HttpClient::new(),
            stopped: AtomicBool::new(false),
        });

        if frequency.contains(GreekUpdateFrequency::EVERY_OPTIONS_TRADE) {
            let this = Arc::clone(&client);
            cache.on_options_trade_updated(Arc::new(move |contract, cache, security, _trade| {
                this.run_calculations(&contract, &security, &cache);
            }));
        }
        if frequency.contains(GreekUpdateFrequency::EVERY_OPTIONS_QUOTE) {
            let this = Arc::clone(&client);
            cache.on_options_quote_updated(Arc::new(move |contract, cache, security, _quote| {
                this.run_calculations(&contract, &security, &cache);
            }));
        }
        if frequency.contains(GreekUpdateFrequency::EVERY_RISK_FREE_INTEREST_RATE) {
            let this = Arc::clone(&client);
            cache.on_supplemental_datum_updated(Arc::new(move |key, _datum, cache| {
                if key == RISK_FREE_INTEREST_RATE_KEY {
                    this.recompute_all(&cache);
                }
            }));
        }
        if frequency.contains(GreekUpdateFrequency::EVERY_DIVIDEND_YIELD) {
            let this = Arc::clone(&client);
            cache.on_security_supplemental_datum_updated(Arc::new(
                move |_key, _datum, security, cache| {
                    this.recompute_security(&security, &cache);
                },
            ));
        }
        if frequency.contains(GreekUpdateFrequency::EVERY_EQUITY_TRADE) {
            let this = Arc::clone(&client);
            cache.on_equities_trade_updated(Arc::new(move |security, cache, _trade| {
                this.recompute_security(&security, &cache);
            }));
        }
        if frequency.contains(GreekUpdateFrequency::EVERY_EQUITY_QUOTE) {
            let this = Arc::clone(&client);
            cache.on_equities_quote_updated(Arc::new(move |security, cache, _quote| {
                this.recompute_security(&security, &cache);
            }));
        }
        if let Some(on_greek) = on_greek {
            cache.on_options_contract_greek_data_updated(on_greek);
        }
        client
    }

    pub fn start(&self) {}

    /// Flag outstanding fetcher retry loops to wind down.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Feed entry points: wire these as the session callbacks so events
    // flow into the cache (which then drives recomputation).
    // ------------------------------------------------------------------

    pub fn on_equity_trade(&self, trade: EquityTrade) {
        self.cache.set_equity_trade(trade);
    }

    pub fn on_equity_quote(&self, quote: EquityQuote) {
        self.cache.set_equity_quote(quote);
    }

    pub fn on_options_trade(&self, trade: OptionTrade) {
        self.cache.set_options_trade(trade);
    }

    pub fn on_options_quote(&self, quote: OptionQuote) {
        self.cache.set_options_quote(quote);
    }

    pub fn on_options_refresh(&self, refresh: OptionRefresh) {
        self.cache.set_options_refresh(refresh);
    }

    pub fn on_options_unusual_activity(&self, activity: OptionUnusualActivity) {
        self.cache.set_options_unusual_activity(activity);
    }

    // ------------------------------------------------------------------
    // Calculator registry
    // ------------------------------------------------------------------

    /// Register or replace a calculator by name.
    pub fn try_add_or_update_greek_calculation(
        &self,
        name: &str,
        calculation: GreekCalculation,
    ) -> bool {
        self.calculations
            .write()
            .insert(name.to_string(), calculation);
        true
    }

    /// Register the built-in Black-Scholes calculator under
    /// [`BLACK_SCHOLES_KEY`].
    pub fn add_black_scholes(&self) {
        self.add_black_scholes_calculator(BlackScholesCalculator::new());
    }

    /// Register a configured Black-Scholes calculator (e.g. with the
    /// legacy IV switch) under [`BLACK_SCHOLES_KEY`].
    pub fn add_black_scholes_calculator(&self, calculator: BlackScholesCalculator) {
        self.try_add_or_update_greek_calculation(
            BLACK_SCHOLES_KEY,
            Arc::new(move |contract, security, cache| {
                black_scholes_update(&calculator, contract, security, cache);
            }),
        );
    }

    /// Run every registered calculator for one contract under a shared
    /// registry read lock.
    fn run_calculations(
        &self,
        contract: &Arc<OptionsContractData>,
        security: &Arc<SecurityData>,
        cache: &Arc<DataCache>,
    ) {
        let calculations = self.calculations.read();
        for calculation in calculations.values() {
            calculation(contract, security, cache);
        }
    }

    fn recompute_security(&self, security: &Arc<SecurityData>, cache: &Arc<DataCache>) {
        for contract in security.get_all_contracts().values() {
            self.run_calculations(contract, security, cache);
        }
    }

    fn recompute_all(&self, cache: &Arc<DataCache>) {
        for security in cache.get_all_security_data().values() {
            self.recompute_security(security, cache);
        }
    }

    // ------------------------------------------------------------------
    // REST fetchers. Bounded retries, no inter-attempt delay, log and
    // continue on exhaustion; the stop flag is honored between attempts.
    // ------------------------------------------------------------------

    fn keep_trying(&self, attempt: u32, limit: u32) -> bool {
        attempt < limit && !self.stopped.load(Ordering::SeqCst)
    }

    /// Fetch the 3-month T-bill level and store it (scaled from percent)
    /// under [`RISK_FREE_INTEREST_RATE_KEY`].
    pub async fn fetch_risk_free_interest_rate(&self) {
        info!("Greek client - fetching risk free rate");
        let url = format!(
            "{API_BASE}/indices/economic/$DTB3/data_point/level?api_key={}",
            self.api_key
        );
        let mut attempt = 0;
        while self.keep_trying(attempt, RISK_FREE_RATE_ATTEMPTS) {
            attempt += 1;
            match self.http.get_text(&url).await {
                Ok(body) => match body.trim().parse::<f64>() {
                    Ok(rate) => {
                        let adjusted = rate / 100.0;
                        info!(rate = adjusted, "Greek client - setting risk free rate");
                        self.cache.set_supplementary_datum(
                            RISK_FREE_INTEREST_RATE_KEY,
                            adjusted,
                            take_new_datum,
                        );
                        return;
                    }
                    Err(err) => {
                        warn!(attempt, %err, "Greek client - unparsable risk free rate")
                    }
                },
                Err(err) => warn!(attempt, %err, "Greek client - unable to fetch risk free rate"),
            }
        }
    }

    /// Bulk-load company dividend yields, then fill per-ticker for any
    /// security still missing one (ETFs are absent from the bulk page).
    pub async fn fetch_dividend_yields(&self) {
        self.fetch_bulk_company_dividend_yields().await;
        self.fetch_missing_dividend_yields().await;
    }

    pub async fn fetch_missing_dividend_yields(&self) {
        let securities = self.cache.get_all_security_data();
        for security in securities.values() {
            if security.get_supplementary_datum(DIVIDEND_YIELD_KEY).is_some() {
                continue;
            }
            self.fetch_dividend_yield_for_ticker(security.ticker_symbol())
                .await;
        }
    }

    /// Fetch one security's trailing dividend yield. A no-op when the
    /// security already carries one.
    pub async fn fetch_dividend_yield_for_ticker(&self, ticker: &str) {
        if self
            .cache
            .get_security_supplemental_datum(ticker, DIVIDEND_YIELD_KEY)
            .is_some()
        {
            return;
        }
        let url = format!(
            "{API_BASE}/securities/{ticker}/data_point/trailing_dividend_yield?api_key={}",
            self.api_key
        );
        let mut attempt = 0;
        while self.keep_trying(attempt, TICKER_DIVIDEND_ATTEMPTS) {
            attempt += 1;
            match self.http.get_text(&url).await {
                Ok(body) => match body.trim().parse::<f64>() {
                    Ok(dividend_yield) => {
                        self.cache.set_security_supplemental_datum(
                            ticker,
                            DIVIDEND_YIELD_KEY,
                            dividend_yield,
                            take_new_datum,
                        );
                        return;
                    }
                    Err(err) => {
                        warn!(attempt, ticker, %err, "Greek client - unparsable dividend yield")
                    }
                },
                Err(err) => {
                    warn!(attempt, ticker, %err, "Greek client - unable to fetch dividend yield")
                }
            }
        }
    }

    async fn fetch_bulk_company_dividend_yields(&self) {
        let url = format!(
            "{API_BASE}/companies/daily_metrics?page_size=10000&api_key={}",
            self.api_key
        );
        let mut attempt = 0;
        while self.keep_trying(attempt, BULK_DIVIDEND_ATTEMPTS) {
            attempt += 1;
            match self.http.get_text(&url).await {
                Ok(body) => {
                    match serde_json::from_str::<super::types::DailyMetricResponse>(&body) {
                        Ok(page) => {
                            let mut loaded = 0usize;
                            for metric in &page.daily_metrics {
                                let Some(dividend_yield) = metric.yield_value() else {
                                    continue;
                                };
                                if metric.company.ticker.is_empty() {
                                    continue;
                                }
                                self.cache.set_security_supplemental_datum(
                                    &metric.company.ticker,
                                    DIVIDEND_YIELD_KEY,
                                    dividend_yield,
                                    take_new_datum,
                                );
                                loaded += 1;
                            }
                            info!(loaded, "Greek client - bulk dividend yields loaded");
                            return;
                        }
                        Err(err) => {
                            warn!(attempt, %err, "Greek client - unable to parse bulk dividend yields")
                        }
                    }
                }
                Err(err) => {
                    warn!(attempt, %err, "Greek client - unable to fetch bulk dividend yields")
                }
            }
        }
    }

    /// Fetch an index's last trade price and inject it as a synthetic
    /// equity trade under each symbol variant, seeding underlyings (e.g.
    /// SPX and SPXW) that never print on the equities feed.
    pub async fn fetch_index_price(&self, symbol: &str, variants: &[&str]) {
        let url = format!(
            "{API_BASE}/securities/{symbol}/prices/realtime?api_key={}",
            self.api_key
        );
        let mut attempt = 0;
        while self.keep_trying(attempt, INDEX_PRICE_ATTEMPTS) {
            attempt += 1;
            match self.http.get_text(&url).await {
                Ok(body) => {
                    match serde_json::from_str::<RealtimePriceResponse>(&body) {
                        Ok(RealtimePriceResponse {
                            last_price: Some(price),
                        }) => {
                            let timestamp = SystemTime::now()
                                .duration_since(UNIX_EPOCH)
                                .map(|d| d.as_secs_f64())
                                .unwrap_or(0.0);
                            for variant in variants {
                                self.cache.set_equity_trade(EquityTrade {
                                    symbol: variant.to_string(),
                                    source: MarketSource::None,
                                    market_center: '\u{0}',
                                    price,
                                    size: 0,
                                    total_volume: 0,
                                    timestamp,
                                    condition: String::new(),
                                });
                            }
                            return;
                        }
                        Ok(_) => {
                            warn!(attempt, symbol, "Greek client - index price missing");
                        }
                        Err(err) => {
                            warn!(attempt, symbol, %err, "Greek client - unable to parse index price")
                        }
                    }
                }
                Err(err) => {
                    warn!(attempt, symbol, %err, "Greek client - unable to fetch index price")
                }
            }
        }
    }
}

/// "Now" for expiry purposes: the newest option print for the contract,
/// falling back to wall-clock time when neither side carries a timestamp.
fn years_to_expiration(trade: &OptionTrade, quote: &OptionQuote) -> f64 {
    let Some(expiration) = contract::expiration_timestamp(&trade.contract_id) else {
        return 0.0;
    };
    let mut now = trade.timestamp.max(quote.timestamp);
    if now <= 0.0 {
        now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
    }
    ((expiration - now) / SECONDS_PER_YEAR).max(0.0)
}

/// The built-in calculation: mid-quote market price, cache-sourced rate
/// and yield with defaults, publishing through the Greek-data path.
fn black_scholes_update(
    calculator: &BlackScholesCalculator,
    contract_data: &Arc<OptionsContractData>,
    security: &Arc<SecurityData>,
    cache: &Arc<DataCache>,
) {
    let (Some(trade), Some(quote), Some(underlying)) = (
        contract_data.latest_trade(),
        contract_data.latest_quote(),
        security.latest_trade(),
    ) else {
        return;
    };
    let risk_free_rate = cache
        .get_supplementary_datum(RISK_FREE_INTEREST_RATE_KEY)
        .unwrap_or(DEFAULT_RISK_FREE_INTEREST_RATE);
    let dividend_yield = security
        .get_supplementary_datum(DIVIDEND_YIELD_KEY)
        .unwrap_or(DEFAULT_DIVIDEND_YIELD);
    let strike = contract::strike_price(contract_data.contract());
    let is_put = contract::is_put(contract_data.contract());
    let t = years_to_expiration(&trade, &quote);

    let greek = calculator.calculate(
        risk_free_rate,
        dividend_yield,
        underlying.price,
        quote.ask_price,
        quote.bid_price,
        strike,
        is_put,
        t,
    );
    if greek.is_valid {
        cache.set_options_contract_greek_data(
            contract_data.contract(),
            BLACK_SCHOLES_KEY,
            greek,
            take_new_greek,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Exchange;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn equity_trade(symbol: &str, price: f64, ts: f64) -> EquityTrade {
        EquityTrade {
            symbol: symbol.to_string(),
            source: MarketSource::Iex,
            market_center: 'V',
            price,
            size: 100,
            total_volume: 1000,
            timestamp: ts,
            condition: String::new(),
        }
    }

    fn option_trade(contract_id: &str, price: f64, ts: f64) -> OptionTrade {
        OptionTrade {
            contract_id: contract_id.to_string(),
            exchange: Exchange::Cboe,
            price,
            size: 1,
            qualifiers: [0; 4],
            total_volume: 10,
            ask_price_at_execution: price,
            bid_price_at_execution: price,
            underlying_price_at_execution: 0.0,
            timestamp: ts,
        }
    }

    fn option_quote(contract_id: &str, ask: f64, bid: f64, ts: f64) -> OptionQuote {
        OptionQuote {
            contract_id: contract_id.to_string(),
            ask_price: ask,
            bid_price: bid,
            ask_size: 10,
            bid_size: 10,
            timestamp: ts,
        }
    }

    async fn settle(counter: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn seed_contract(cache: &Arc<DataCache>, contract_id: &str, ts: f64) {
        cache.set_options_trade(option_trade(contract_id, 5.0, ts));
        cache.set_options_quote(option_quote(contract_id, 5.1, 4.9, ts));
    }

    #[tokio::test]
    async fn test_risk_free_rate_fans_out_to_every_contract() {
        let cache = DataCache::new();
        let greek_updates = Arc::new(AtomicUsize::new(0));
        let on_greek: OnOptionsContractGreekDataUpdated = {
            let greek_updates = Arc::clone(&greek_updates);
            Arc::new(move |_, _, _, _, _| {
                greek_updates.fetch_add(1, Ordering::SeqCst);
            })
        };
        let client = GreekClient::new(
            GreekUpdateFrequency::EVERY_RISK_FREE_INTEREST_RATE,
            Some(on_greek),
            "key",
            Arc::clone(&cache),
        );
        client.add_black_scholes();

        let ts = 1_700_000_000.0;
        cache.set_equity_trade(equity_trade("AAPL", 150.0, ts));
        cache.set_equity_trade(equity_trade("MSFT", 400.0, ts));
        for contract_id in [
            "AAPL__301219C00150000",
            "AAPL__301219P00150000",
            "AAPL__301219C00160000",
            "MSFT__301219C00400000",
            "MSFT__301219P00400000",
            "MSFT__301219C00420000",
        ] {
            seed_contract(&cache, contract_id, ts);
        }

        assert!(cache.set_supplementary_datum(RISK_FREE_INTEREST_RATE_KEY, 0.05, take_new_datum));
        settle(&greek_updates, 6).await;
        assert_eq!(greek_updates.load(Ordering::SeqCst), 6);
        assert!(cache
            .get_options_contract_greek_data(
                "AAPL",
                "AAPL__301219C00150000",
                BLACK_SCHOLES_KEY
            )
            .is_some());
    }

    #[tokio::test]
    async fn test_options_quote_recomputes_single_contract() {
        let cache = DataCache::new();
        let greek_updates = Arc::new(AtomicUsize::new(0));
        let on_greek: OnOptionsContractGreekDataUpdated = {
            let greek_updates = Arc::clone(&greek_updates);
            Arc::new(move |_, _, _, _, _| {
                greek_updates.fetch_add(1, Ordering::SeqCst);
            })
        };
        let client = GreekClient::new(
            GreekUpdateFrequency::EVERY_OPTIONS_QUOTE,
            Some(on_greek),
            "key",
            Arc::clone(&cache),
        );
        client.add_black_scholes();

        let ts = 1_700_000_000.0;
        cache.set_supplementary_datum(RISK_FREE_INTEREST_RATE_KEY, 0.05, take_new_datum);
        cache.set_equity_trade(equity_trade("AAPL", 150.0, ts));
        cache.set_options_trade(option_trade("AAPL__301219C00150000", 5.0, ts));
        // The sibling contract has no quote, so it must stay untouched.
        cache.set_options_trade(option_trade("AAPL__301219C00160000", 5.0, ts));

        cache.set_options_quote(option_quote("AAPL__301219C00150000", 5.1, 4.9, ts + 1.0));
        settle(&greek_updates, 1).await;
        assert_eq!(greek_updates.load(Ordering::SeqCst), 1);
        assert!(cache
            .get_options_contract_greek_data("AAPL", "AAPL__301219C00160000", BLACK_SCHOLES_KEY)
            .is_none());
    }

    #[tokio::test]
    async fn test_black_scholes_path_recovers_implied_vol() {
        let cache = DataCache::new();
        let client = GreekClient::new(
            GreekUpdateFrequency::EVERY_OPTIONS_QUOTE,
            None,
            "key",
            Arc::clone(&cache),
        );
        client.add_black_scholes();

        let contract_id = "AAPL__301219C00150000";
        let ts = 1_700_000_000.0;
        let expiration = contract::expiration_timestamp(contract_id).unwrap();
        let t = (expiration - ts) / SECONDS_PER_YEAR;
        let calc = BlackScholesCalculator::new();
        let market = calc.price_call(150.0, 150.0, t, 0.05, 0.25, 0.0);

        cache.set_supplementary_datum(RISK_FREE_INTEREST_RATE_KEY, 0.05, take_new_datum);
        cache.set_equity_trade(equity_trade("AAPL", 150.0, ts));
        cache.set_options_trade(option_trade(contract_id, market, ts));
        cache.set_options_quote(option_quote(contract_id, market, market, ts));

        for _ in 0..200 {
            if cache
                .get_options_contract_greek_data("AAPL", contract_id, BLACK_SCHOLES_KEY)
                .is_some()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let greek = cache
            .get_options_contract_greek_data("AAPL", contract_id, BLACK_SCHOLES_KEY)
            .expect("greek stored");
        assert!(greek.is_valid_greek());
        assert!(
            (greek.implied_volatility - 0.25).abs() <= 1e-3,
            "implied vol {}",
            greek.implied_volatility
        );
        assert!(greek.delta > 0.0 && greek.delta < 1.0);
    }

    #[tokio::test]
    async fn test_dividend_yield_update_recomputes_security() {
        let cache = DataCache::new();
        let greek_updates = Arc::new(AtomicUsize::new(0));
        let on_greek: OnOptionsContractGreekDataUpdated = {
            let greek_updates = Arc::clone(&greek_updates);
            Arc::new(move |_, _, _, _, _| {
                greek_updates.fetch_add(1, Ordering::SeqCst);
            })
        };
        let client = GreekClient::new(
            GreekUpdateFrequency::EVERY_DIVIDEND_YIELD,
            Some(on_greek),
            "key",
            Arc::clone(&cache),
        );
        client.add_black_scholes();

        let ts = 1_700_000_000.0;
        cache.set_supplementary_datum(RISK_FREE_INTEREST_RATE_KEY, 0.05, take_new_datum);
        cache.set_equity_trade(equity_trade("AAPL", 150.0, ts));
        cache.set_equity_trade(equity_trade("MSFT", 400.0, ts));
        seed_contract(&cache, "AAPL__301219C00150000", ts);
        seed_contract(&cache, "AAPL__301219P00150000", ts);
        seed_contract(&cache, "MSFT__301219C00400000", ts);

        cache.set_security_supplemental_datum("AAPL", DIVIDEND_YIELD_KEY, 0.012, take_new_datum);
        settle(&greek_updates, 2).await;
        // Only AAPL's two contracts recompute; MSFT is untouched.
        assert_eq!(greek_updates.load(Ordering::SeqCst), 2);
        assert!(cache
            .get_options_contract_greek_data("MSFT", "MSFT__301219C00400000", BLACK_SCHOLES_KEY)
            .is_none());
    }

    #[test]
    fn test_years_to_expiration_uses_latest_print() {
        let contract_id = "AAPL__301219C00150000";
        let expiration = contract::expiration_timestamp(contract_id).unwrap();
        let trade = option_trade(contract_id, 5.0, expiration - SECONDS_PER_YEAR);
        let quote = option_quote(contract_id, 5.1, 4.9, expiration - SECONDS_PER_YEAR / 2.0);
        let t = years_to_expiration(&trade, &quote);
        assert!((t - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_years_to_expiration_floors_at_zero() {
        let contract_id = "AAPL__201016C00150000";
        let expiration = contract::expiration_timestamp(contract_id).unwrap();
        let trade = option_trade(contract_id, 5.0, expiration + 100.0);
        let quote = option_quote(contract_id, 5.1, 4.9, expiration + 50.0);
        assert_eq!(years_to_expiration(&trade, &quote), 0.0);
    }
}
