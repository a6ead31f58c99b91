//! Three-level snapshot cache: global supplementary data, securities, and
//! options contracts, each lazily created on first reference and never
//! removed during a session.
//!
//! Every `set_*` returns whether the value passed its gate and committed.
//! A committed write schedules the registered observer for that event kind
//! on the runtime, isolated so an observer panic cannot crash the pipeline.
//! Observers install once; replacement is undefined. Bulk getters return
//! snapshot copies, never live references.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::warn;

use crate::equities::{EquityQuote, EquityTrade};
use crate::options::{
    contract, OptionQuote, OptionRefresh, OptionTrade, OptionUnusualActivity,
};

use super::greek::Greek;
use super::options_contract_data::OptionsContractData;
use super::security_data::SecurityData;
use super::types::{
    OptionsQuoteCandleStick, OptionsTradeCandleStick, QuoteCandleStick, TradeCandleStick,
};

/// Default supplementary merge: take the incoming value.
pub fn take_new_datum(_key: &str, _old: Option<f64>, new: f64) -> f64 {
    new
}

/// Default Greek merge: take the incoming value.
pub fn take_new_greek(_key: &str, _old: Option<Greek>, new: Greek) -> Greek {
    new
}

pub type OnSupplementalDatumUpdated = Arc<dyn Fn(String, f64, Arc<DataCache>) + Send + Sync>;
pub type OnSecuritySupplementalDatumUpdated =
    Arc<dyn Fn(String, f64, Arc<SecurityData>, Arc<DataCache>) + Send + Sync>;
pub type OnOptionsContractSupplementalDatumUpdated = Arc<
    dyn Fn(String, f64, Arc<OptionsContractData>, Arc<SecurityData>, Arc<DataCache>) + Send + Sync,
>;
pub type OnOptionsContractGreekDataUpdated = Arc<
    dyn Fn(String, Greek, Arc<OptionsContractData>, Arc<SecurityData>, Arc<DataCache>)
        + Send
        + Sync,
>;

pub type OnEquitiesTradeUpdated =
    Arc<dyn Fn(Arc<SecurityData>, Arc<DataCache>, EquityTrade) + Send + Sync>;
pub type OnEquitiesQuoteUpdated =
    Arc<dyn Fn(Arc<SecurityData>, Arc<DataCache>, EquityQuote) + Send + Sync>;
pub type OnEquitiesTradeCandleUpdated =
    Arc<dyn Fn(Arc<SecurityData>, Arc<DataCache>, TradeCandleStick) + Send + Sync>;
pub type OnEquitiesQuoteCandleUpdated =
    Arc<dyn Fn(Arc<SecurityData>, Arc<DataCache>, QuoteCandleStick) + Send + Sync>;

pub type OnOptionsTradeUpdated = Arc<
    dyn Fn(Arc<OptionsContractData>, Arc<DataCache>, Arc<SecurityData>, OptionTrade) + Send + Sync,
>;
pub type OnOptionsQuoteUpdated = Arc<
    dyn Fn(Arc<OptionsContractData>, Arc<DataCache>, Arc<SecurityData>, OptionQuote) + Send + Sync,
>;
pub type OnOptionsRefreshUpdated = Arc<
    dyn Fn(Arc<OptionsContractData>, Arc<DataCache>, Arc<SecurityData>, OptionRefresh)
        + Send
        + Sync,
>;
pub type OnOptionsUnusualActivityUpdated = Arc<
    dyn Fn(Arc<OptionsContractData>, Arc<DataCache>, Arc<SecurityData>, OptionUnusualActivity)
        + Send
        + Sync,
>;
pub type OnOptionsTradeCandleUpdated = Arc<
    dyn Fn(Arc<OptionsContractData>, Arc<DataCache>, Arc<SecurityData>, OptionsTradeCandleStick)
        + Send
        + Sync,
>;
pub type OnOptionsQuoteCandleUpdated = Arc<
    dyn Fn(Arc<OptionsContractData>, Arc<DataCache>, Arc<SecurityData>, OptionsQuoteCandleStick)
        + Send
        + Sync,
>;

#[derive(Default)]
struct Observers {
    supplemental_datum: OnceLock<OnSupplementalDatumUpdated>,
    security_supplemental_datum: OnceLock<OnSecuritySupplementalDatumUpdated>,
    options_contract_supplemental_datum: OnceLock<OnOptionsContractSupplementalDatumUpdated>,
    options_contract_greek_data: OnceLock<OnOptionsContractGreekDataUpdated>,
    equities_trade: OnceLock<OnEquitiesTradeUpdated>,
    equities_quote: OnceLock<OnEquitiesQuoteUpdated>,
    equities_trade_candle: OnceLock<OnEquitiesTradeCandleUpdated>,
    equities_quote_candle: OnceLock<OnEquitiesQuoteCandleUpdated>,
    options_trade: OnceLock<OnOptionsTradeUpdated>,
    options_quote: OnceLock<OnOptionsQuoteUpdated>,
    options_refresh: OnceLock<OnOptionsRefreshUpdated>,
    options_unusual_activity: OnceLock<OnOptionsUnusualActivityUpdated>,
    options_trade_candle: OnceLock<OnOptionsTradeCandleUpdated>,
    options_quote_candle: OnceLock<OnOptionsQuoteCandleUpdated>,
}

/// Run an observer invocation off the hot path with panic isolation.
fn spawn_observer(invoke: impl FnOnce() + Send + 'static) {
    let guarded = move || {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(invoke)).is_err() {
            warn!("Cache - observer panicked; continuing");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { guarded() });
        }
        Err(_) => guarded(),
    }
}

pub struct DataCache {
    securities: RwLock<HashMap<String, Arc<SecurityData>>>,
    supplementary: RwLock<HashMap<String, f64>>,
    observers: Observers,
}

impl DataCache {
    pub fn new() -> Arc<DataCache> {
        Arc::new(DataCache {
            securities: RwLock::new(HashMap::new()),
            supplementary: RwLock::new(HashMap::new()),
            observers: Observers::default(),
        })
    }

    // ------------------------------------------------------------------
    // Global supplementary data
    // ------------------------------------------------------------------

    pub fn get_supplementary_datum(&self, key: &str) -> Option<f64> {
        self.supplementary.read().get(key).copied()
    }

    /// Snapshot copy of the global supplementary map.
    pub fn get_all_supplementary_data(&self) -> HashMap<String, f64> {
        self.supplementary.read().clone()
    }

    pub fn set_supplementary_datum(
        self: &Arc<Self>,
        key: &str,
        datum: f64,
        update: impl Fn(&str, Option<f64>, f64) -> f64,
    ) -> bool {
        let committed = {
            let mut map = self.supplementary.write();
            let old = map.get(key).copied();
            let merged = update(key, old, datum);
            if old == Some(merged) {
                None
            } else {
                map.insert(key.to_string(), merged);
                Some(merged)
            }
        };
        match committed {
            Some(merged) => {
                if let Some(callback) = self.observers.supplemental_datum.get() {
                    let callback = Arc::clone(callback);
                    let cache = Arc::clone(self);
                    let key = key.to_string();
                    spawn_observer(move || callback(key, merged, cache));
                }
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Securities
    // ------------------------------------------------------------------

    pub fn get_security_data(&self, ticker: &str) -> Option<Arc<SecurityData>> {
        self.securities.read().get(ticker).cloned()
    }

    /// Snapshot copy of the securities map.
    pub fn get_all_security_data(&self) -> HashMap<String, Arc<SecurityData>> {
        self.securities.read().clone()
    }

    fn get_or_create_security(&self, ticker: &str) -> Arc<SecurityData> {
        if let Some(security) = self.get_security_data(ticker) {
            return security;
        }
        let mut securities = self.securities.write();
        Arc::clone(
            securities
                .entry(ticker.to_string())
                .or_insert_with(|| Arc::new(SecurityData::new(ticker))),
        )
    }

    pub fn get_security_supplemental_datum(&self, ticker: &str, key: &str) -> Option<f64> {
        self.get_security_data(ticker)?.get_supplementary_datum(key)
    }

    pub fn set_security_supplemental_datum(
        self: &Arc<Self>,
        ticker: &str,
        key: &str,
        datum: f64,
        update: impl Fn(&str, Option<f64>, f64) -> f64,
    ) -> bool {
        if ticker.is_empty() {
            return false;
        }
        let security = self.get_or_create_security(ticker);
        match security.set_supplementary_datum(key, datum, update) {
            Some(merged) => {
                if let Some(callback) = self.observers.security_supplemental_datum.get() {
                    let callback = Arc::clone(callback);
                    let cache = Arc::clone(self);
                    let key = key.to_string();
                    spawn_observer(move || callback(key, merged, security, cache));
                }
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Equity events
    // ------------------------------------------------------------------

    pub fn get_latest_equity_trade(&self, ticker: &str) -> Option<EquityTrade> {
        self.get_security_data(ticker)?.latest_trade()
    }

    pub fn set_equity_trade(self: &Arc<Self>, trade: EquityTrade) -> bool {
        if trade.symbol.is_empty() {
            return false;
        }
        let security = self.get_or_create_security(&trade.symbol);
        if !security.set_trade(trade.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.equities_trade.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(security, cache, trade));
        }
        true
    }

    pub fn get_latest_equity_ask_quote(&self, ticker: &str) -> Option<EquityQuote> {
        self.get_security_data(ticker)?.latest_ask_quote()
    }

    pub fn get_latest_equity_bid_quote(&self, ticker: &str) -> Option<EquityQuote> {
        self.get_security_data(ticker)?.latest_bid_quote()
    }

    pub fn set_equity_quote(self: &Arc<Self>, quote: EquityQuote) -> bool {
        if quote.symbol.is_empty() {
            return false;
        }
        let security = self.get_or_create_security(&quote.symbol);
        if !security.set_quote(quote.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.equities_quote.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(security, cache, quote));
        }
        true
    }

    pub fn get_latest_equity_trade_candle(&self, ticker: &str) -> Option<TradeCandleStick> {
        self.get_security_data(ticker)?.latest_trade_candle()
    }

    pub fn set_equity_trade_candle(self: &Arc<Self>, candle: TradeCandleStick) -> bool {
        if candle.symbol.is_empty() {
            return false;
        }
        let security = self.get_or_create_security(&candle.symbol);
        if !security.set_trade_candle(candle.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.equities_trade_candle.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(security, cache, candle));
        }
        true
    }

    pub fn get_latest_equity_ask_quote_candle(&self, ticker: &str) -> Option<QuoteCandleStick> {
        self.get_security_data(ticker)?.latest_ask_quote_candle()
    }

    pub fn get_latest_equity_bid_quote_candle(&self, ticker: &str) -> Option<QuoteCandleStick> {
        self.get_security_data(ticker)?.latest_bid_quote_candle()
    }

    pub fn set_equity_quote_candle(self: &Arc<Self>, candle: QuoteCandleStick) -> bool {
        if candle.symbol.is_empty() {
            return false;
        }
        let security = self.get_or_create_security(&candle.symbol);
        if !security.set_quote_candle(candle.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.equities_quote_candle.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(security, cache, candle));
        }
        true
    }

    // ------------------------------------------------------------------
    // Options events. The owning security is derived from the contract id;
    // both levels populate lazily.
    // ------------------------------------------------------------------

    fn security_and_contract(
        &self,
        contract_id: &str,
    ) -> Option<(Arc<SecurityData>, Arc<OptionsContractData>)> {
        let ticker = contract::underlying_symbol(contract_id);
        if ticker.is_empty() {
            return None;
        }
        let security = self.get_or_create_security(ticker);
        let contract = security.get_or_create_contract(contract_id);
        Some((security, contract))
    }

    pub fn get_options_contract_data(
        &self,
        ticker: &str,
        contract: &str,
    ) -> Option<Arc<OptionsContractData>> {
        self.get_security_data(ticker)?.get_contract(contract)
    }

    /// Snapshot copy of one security's contract map.
    pub fn get_all_options_contract_data(
        &self,
        ticker: &str,
    ) -> HashMap<String, Arc<OptionsContractData>> {
        self.get_security_data(ticker)
            .map(|s| s.get_all_contracts())
            .unwrap_or_default()
    }

    pub fn get_latest_options_trade(&self, ticker: &str, contract: &str) -> Option<OptionTrade> {
        self.get_options_contract_data(ticker, contract)?.latest_trade()
    }

    pub fn set_options_trade(self: &Arc<Self>, trade: OptionTrade) -> bool {
        let Some((security, contract)) = self.security_and_contract(&trade.contract_id) else {
            return false;
        };
        if !contract.set_trade(trade.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.options_trade.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(contract, cache, security, trade));
        }
        true
    }

    pub fn get_latest_options_quote(&self, ticker: &str, contract: &str) -> Option<OptionQuote> {
        self.get_options_contract_data(ticker, contract)?.latest_quote()
    }

    pub fn set_options_quote(self: &Arc<Self>, quote: OptionQuote) -> bool {
        let Some((security, contract)) = self.security_and_contract(&quote.contract_id) else {
            return false;
        };
        if !contract.set_quote(quote.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.options_quote.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(contract, cache, security, quote));
        }
        true
    }

    pub fn get_latest_options_refresh(&self, ticker: &str, contract: &str) -> Option<OptionRefresh> {
        self.get_options_contract_data(ticker, contract)?.latest_refresh()
    }

    pub fn set_options_refresh(self: &Arc<Self>, refresh: OptionRefresh) -> bool {
        let Some((security, contract)) = self.security_and_contract(&refresh.contract_id) else {
            return false;
        };
        if !contract.set_refresh(refresh.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.options_refresh.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(contract, cache, security, refresh));
        }
        true
    }

    pub fn get_latest_options_unusual_activity(
        &self,
        ticker: &str,
        contract: &str,
    ) -> Option<OptionUnusualActivity> {
        self.get_options_contract_data(ticker, contract)?
            .latest_unusual_activity()
    }

    pub fn set_options_unusual_activity(
        self: &Arc<Self>,
        activity: OptionUnusualActivity,
    ) -> bool {
        let Some((security, contract)) = self.security_and_contract(&activity.contract_id) else {
            return false;
        };
        if !contract.set_unusual_activity(activity.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.options_unusual_activity.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(contract, cache, security, activity));
        }
        true
    }

    pub fn get_latest_options_trade_candle(
        &self,
        ticker: &str,
        contract: &str,
    ) -> Option<OptionsTradeCandleStick> {
        self.get_options_contract_data(ticker, contract)?.latest_trade_candle()
    }

    pub fn set_options_trade_candle(self: &Arc<Self>, candle: OptionsTradeCandleStick) -> bool {
        let Some((security, contract)) = self.security_and_contract(&candle.contract) else {
            return false;
        };
        if !contract.set_trade_candle(candle.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.options_trade_candle.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(contract, cache, security, candle));
        }
        true
    }

    pub fn get_latest_options_ask_quote_candle(
        &self,
        ticker: &str,
        contract: &str,
    ) -> Option<OptionsQuoteCandleStick> {
        self.get_options_contract_data(ticker, contract)?
            .latest_ask_quote_candle()
    }

    pub fn get_latest_options_bid_quote_candle(
        &self,
        ticker: &str,
        contract: &str,
    ) -> Option<OptionsQuoteCandleStick> {
        self.get_options_contract_data(ticker, contract)?
            .latest_bid_quote_candle()
    }

    pub fn set_options_quote_candle(self: &Arc<Self>, candle: OptionsQuoteCandleStick) -> bool {
        let Some((security, contract)) = self.security_and_contract(&candle.contract) else {
            return false;
        };
        if !contract.set_quote_candle(candle.clone()) {
            return false;
        }
        if let Some(callback) = self.observers.options_quote_candle.get() {
            let callback = Arc::clone(callback);
            let cache = Arc::clone(self);
            spawn_observer(move || callback(contract, cache, security, candle));
        }
        true
    }

    // ------------------------------------------------------------------
    // Per-contract supplementary and Greek data
    // ------------------------------------------------------------------

    pub fn get_options_contract_supplemental_datum(
        &self,
        ticker: &str,
        contract: &str,
        key: &str,
    ) -> Option<f64> {
        self.get_options_contract_data(ticker, contract)?
            .get_supplementary_datum(key)
    }

    pub fn set_options_contract_supplemental_datum(
        self: &Arc<Self>,
        contract_id: &str,
        key: &str,
        datum: f64,
        update: impl Fn(&str, Option<f64>, f64) -> f64,
    ) -> bool {
        let Some((security, contract)) = self.security_and_contract(contract_id) else {
            return false;
        };
        match contract.set_supplementary_datum(key, datum, update) {
            Some(merged) => {
                if let Some(callback) = self.observers.options_contract_supplemental_datum.get() {
                    let callback = Arc::clone(callback);
                    let cache = Arc::clone(self);
                    let key = key.to_string();
                    spawn_observer(move || callback(key, merged, contract, security, cache));
                }
                true
            }
            None => false,
        }
    }

    pub fn get_options_contract_greek_data(
        &self,
        ticker: &str,
        contract: &str,
        key: &str,
    ) -> Option<Greek> {
        self.get_options_contract_data(ticker, contract)?.get_greek_data(key)
    }

    /// Store a computed Greek. Invalid or non-finite values are rejected.
    pub fn set_options_contract_greek_data(
        self: &Arc<Self>,
        contract_id: &str,
        key: &str,
        datum: Greek,
        update: impl Fn(&str, Option<Greek>, Greek) -> Greek,
    ) -> bool {
        let Some((security, contract)) = self.security_and_contract(contract_id) else {
            return false;
        };
        match contract.set_greek_data(key, datum, update) {
            Some(merged) => {
                if let Some(callback) = self.observers.options_contract_greek_data.get() {
                    let callback = Arc::clone(callback);
                    let cache = Arc::clone(self);
                    let key = key.to_string();
                    spawn_observer(move || callback(key, merged, contract, security, cache));
                }
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Observer registration. One observer per event kind, installed once;
    // a second installation is rejected.
    // ------------------------------------------------------------------

    pub fn on_supplemental_datum_updated(&self, callback: OnSupplementalDatumUpdated) -> bool {
        self.observers.supplemental_datum.set(callback).is_ok()
    }

    pub fn on_security_supplemental_datum_updated(
        &self,
        callback: OnSecuritySupplementalDatumUpdated,
    ) -> bool {
        self.observers
            .security_supplemental_datum
            .set(callback)
            .is_ok()
    }

    pub fn on_options_contract_supplemental_datum_updated(
        &self,
        callback: OnOptionsContractSupplementalDatumUpdated,
    ) -> bool {
        self.observers
            .options_contract_supplemental_datum
            .set(callback)
            .is_ok()
    }

    pub fn on_options_contract_greek_data_updated(
        &self,
        callback: OnOptionsContractGreekDataUpdated,
    ) -> bool {
        self.observers
            .options_contract_greek_data
            .set(callback)
            .is_ok()
    }

    pub fn on_equities_trade_updated(&self, callback: OnEquitiesTradeUpdated) -> bool {
        self.observers.equities_trade.set(callback).is_ok()
    }

    pub fn on_equities_quote_updated(&self, callback: OnEquitiesQuoteUpdated) -> bool {
        self.observers.equities_quote.set(callback).is_ok()
    }

    pub fn on_equities_trade_candle_updated(&self, callback: OnEquitiesTradeCandleUpdated) -> bool {
        self.observers.equities_trade_candle.set(callback).is_ok()
    }

    pub fn on_equities_quote_candle_updated(&self, callback: OnEquitiesQuoteCandleUpdated) -> bool {
        self.observers.equities_quote_candle.set(callback).is_ok()
    }

    pub fn on_options_trade_updated(&self, callback: OnOptionsTradeUpdated) -> bool {
        self.observers.options_trade.set(callback).is_ok()
    }

    pub fn on_options_quote_updated(&self, callback: OnOptionsQuoteUpdated) -> bool {
        self.observers.options_quote.set(callback).is_ok()
    }

    pub fn on_options_refresh_updated(&self, callback: OnOptionsRefreshUpdated) -> bool {
        self.observers.options_refresh.set(callback).is_ok()
    }

    pub fn on_options_unusual_activity_updated(
        &self,
        callback: OnOptionsUnusualActivityUpdated,
    ) -> bool {
        self.observers.options_unusual_activity.set(callback).is_ok()
    }

    pub fn on_options_trade_candle_updated(&self, callback: OnOptionsTradeCandleUpdated) -> bool {
        self.observers.options_trade_candle.set(callback).is_ok()
    }

    pub fn on_options_quote_candle_updated(&self, callback: OnOptionsQuoteCandleUpdated) -> bool {
        self.observers.options_quote_candle.set(callback).is_ok()
    }
}
