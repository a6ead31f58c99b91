//! Latest-per-kind snapshot store for one security, plus its options
//! contract map. Contracts are created lazily on first reference and live
//! for the rest of the session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::equities::{EquityQuote, EquityTrade, QuoteType};

use super::options_contract_data::OptionsContractData;
use super::types::{QuoteCandleStick, TradeCandleStick};

pub struct SecurityData {
    ticker: String,
    latest_trade: RwLock<Option<EquityTrade>>,
    latest_ask_quote: RwLock<Option<EquityQuote>>,
    latest_bid_quote: RwLock<Option<EquityQuote>>,
    latest_trade_candle: RwLock<Option<TradeCandleStick>>,
    latest_ask_quote_candle: RwLock<Option<QuoteCandleStick>>,
    latest_bid_quote_candle: RwLock<Option<QuoteCandleStick>>,
    contracts: RwLock<HashMap<String, Arc<OptionsContractData>>>,
    supplementary: RwLock<HashMap<String, f64>>,
}

impl SecurityData {
    pub(crate) fn new(ticker: impl Into<String>) -> SecurityData {
        SecurityData {
            ticker: ticker.into(),
            latest_trade: RwLock::new(None),
            latest_ask_quote: RwLock::new(None),
            latest_bid_quote: RwLock::new(None),
            latest_trade_candle: RwLock::new(None),
            latest_ask_quote_candle: RwLock::new(None),
            latest_bid_quote_candle: RwLock::new(None),
            contracts: RwLock::new(HashMap::new()),
            supplementary: RwLock::new(HashMap::new()),
        }
    }

    pub fn ticker_symbol(&self) -> &str {
        &self.ticker
    }

    pub fn latest_trade(&self) -> Option<EquityTrade> {
        self.latest_trade.read().clone()
    }

    pub fn latest_ask_quote(&self) -> Option<EquityQuote> {
        self.latest_ask_quote.read().clone()
    }

    pub fn latest_bid_quote(&self) -> Option<EquityQuote> {
        self.latest_bid_quote.read().clone()
    }

    pub fn latest_trade_candle(&self) -> Option<TradeCandleStick> {
        self.latest_trade_candle.read().clone()
    }

    pub fn latest_ask_quote_candle(&self) -> Option<QuoteCandleStick> {
        self.latest_ask_quote_candle.read().clone()
    }

    pub fn latest_bid_quote_candle(&self) -> Option<QuoteCandleStick> {
        self.latest_bid_quote_candle.read().clone()
    }

    pub(crate) fn set_trade(&self, trade: EquityTrade) -> bool {
        let mut slot = self.latest_trade.write();
        match slot.as_ref() {
            Some(latest) if trade.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(trade);
                true
            }
        }
    }

    /// The record's type selects the ask or bid slot.
    pub(crate) fn set_quote(&self, quote: EquityQuote) -> bool {
        let slot = match quote.quote_type {
            QuoteType::Ask => &self.latest_ask_quote,
            QuoteType::Bid => &self.latest_bid_quote,
        };
        let mut slot = slot.write();
        match slot.as_ref() {
            Some(latest) if quote.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(quote);
                true
            }
        }
    }

    pub(crate) fn set_trade_candle(&self, candle: TradeCandleStick) -> bool {
        let mut slot = self.latest_trade_candle.write();
        match slot.as_ref() {
            Some(latest) if candle.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(candle);
                true
            }
        }
    }

    pub(crate) fn set_quote_candle(&self, candle: QuoteCandleStick) -> bool {
        let slot = match candle.quote_type {
            QuoteType::Ask => &self.latest_ask_quote_candle,
            QuoteType::Bid => &self.latest_bid_quote_candle,
        };
        let mut slot = slot.write();
        match slot.as_ref() {
            Some(latest) if candle.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(candle);
                true
            }
        }
    }

    pub fn get_supplementary_datum(&self, key: &str) -> Option<f64> {
        self.supplementary.read().get(key).copied()
    }

    /// Snapshot copy of the supplementary map.
    pub fn get_all_supplementary_data(&self) -> HashMap<String, f64> {
        self.supplementary.read().clone()
    }

    pub(crate) fn set_supplementary_datum(
        &self,
        key: &str,
        datum: f64,
        update: impl Fn(&str, Option<f64>, f64) -> f64,
    ) -> Option<f64> {
        let mut map = self.supplementary.write();
        let old = map.get(key).copied();
        let merged = update(key, old, datum);
        if old == Some(merged) {
            return None;
        }
        map.insert(key.to_string(), merged);
        Some(merged)
    }

    pub fn get_contract(&self, contract: &str) -> Option<Arc<OptionsContractData>> {
        self.contracts.read().get(contract).cloned()
    }

    /// Snapshot copy of the contract map.
    pub fn get_all_contracts(&self) -> HashMap<String, Arc<OptionsContractData>> {
        self.contracts.read().clone()
    }

    pub fn contract_names(&self) -> Vec<String> {
        self.contracts.read().keys().cloned().collect()
    }

    pub(crate) fn get_or_create_contract(&self, contract: &str) -> Arc<OptionsContractData> {
        if let Some(data) = self.get_contract(contract) {
            return data;
        }
        let mut contracts = self.contracts.write();
        Arc::clone(
            contracts
                .entry(contract.to_string())
                .or_insert_with(|| Arc::new(OptionsContractData::new(contract))),
        )
    }
}
