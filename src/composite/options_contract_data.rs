//! Latest-per-kind snapshot store for one options contract.
//!
//! Every `latest*` slot is gated on a strictly increasing timestamp; a
//! write carrying an older or equal timestamp is a no-op. Refresh is the
//! exception: the feed emits it as an unordered session snapshot, so the
//! newest arrival always wins.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::equities::QuoteType;
use crate::options::{OptionQuote, OptionRefresh, OptionTrade, OptionUnusualActivity};

use super::greek::Greek;
use super::types::{OptionsQuoteCandleStick, OptionsTradeCandleStick};

pub struct OptionsContractData {
    contract: String,
    latest_trade: RwLock<Option<OptionTrade>>,
    latest_quote: RwLock<Option<OptionQuote>>,
    latest_refresh: RwLock<Option<OptionRefresh>>,
    latest_unusual_activity: RwLock<Option<OptionUnusualActivity>>,
    latest_trade_candle: RwLock<Option<OptionsTradeCandleStick>>,
    latest_ask_quote_candle: RwLock<Option<OptionsQuoteCandleStick>>,
    latest_bid_quote_candle: RwLock<Option<OptionsQuoteCandleStick>>,
    supplementary: RwLock<HashMap<String, f64>>,
    greeks: RwLock<HashMap<String, Greek>>,
}

impl OptionsContractData {
    pub(crate) fn new(contract: impl Into<String>) -> OptionsContractData {
        OptionsContractData {
            contract: contract.into(),
            latest_trade: RwLock::new(None),
            latest_quote: RwLock::new(None),
            latest_refresh: RwLock::new(None),
            latest_unusual_activity: RwLock::new(None),
            latest_trade_candle: RwLock::new(None),
            latest_ask_quote_candle: RwLock::new(None),
            latest_bid_quote_candle: RwLock::new(None),
            supplementary: RwLock::new(HashMap::new()),
            greeks: RwLock::new(HashMap::new()),
        }
    }

    /// Canonical 21-byte contract id.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn latest_trade(&self) -> Option<OptionTrade> {
        self.latest_trade.read().clone()
    }

    pub fn latest_quote(&self) -> Option<OptionQuote> {
        self.latest_quote.read().clone()
    }

    pub fn latest_refresh(&self) -> Option<OptionRefresh> {
        self.latest_refresh.read().clone()
    }

    pub fn latest_unusual_activity(&self) -> Option<OptionUnusualActivity> {
        self.latest_unusual_activity.read().clone()
    }

    pub fn latest_trade_candle(&self) -> Option<OptionsTradeCandleStick> {
        self.latest_trade_candle.read().clone()
    }

    pub fn latest_ask_quote_candle(&self) -> Option<OptionsQuoteCandleStick> {
        self.latest_ask_quote_candle.read().clone()
    }

    pub fn latest_bid_quote_candle(&self) -> Option<OptionsQuoteCandleStick> {
        self.latest_bid_quote_candle.read().clone()
    }

    pub(crate) fn set_trade(&self, trade: OptionTrade) -> bool {
        let mut slot = self.latest_trade.write();
        match slot.as_ref() {
            Some(latest) if trade.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(trade);
                true
            }
        }
    }

    pub(crate) fn set_quote(&self, quote: OptionQuote) -> bool {
        let mut slot = self.latest_quote.write();
        match slot.as_ref() {
            Some(latest) if quote.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(quote);
                true
            }
        }
    }

    /// Refreshes carry no ordering; always overwrite.
    pub(crate) fn set_refresh(&self, refresh: OptionRefresh) -> bool {
        *self.latest_refresh.write() = Some(refresh);
        true
    }

    pub(crate) fn set_unusual_activity(&self, activity: OptionUnusualActivity) -> bool {
        let mut slot = self.latest_unusual_activity.write();
        match slot.as_ref() {
            Some(latest) if activity.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(activity);
                true
            }
        }
    }

    pub(crate) fn set_trade_candle(&self, candle: OptionsTradeCandleStick) -> bool {
        let mut slot = self.latest_trade_candle.write();
        match slot.as_ref() {
            Some(latest) if candle.timestamp <= latest.timestamp => false,
            _ => {
                *slot = Some(candle);
                true
            }
        }
    }

    pub(crate) fn set_quote_candle(&self, candle: OptionsQuoteCandleStick) -> bool {
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

    pub fn get_greek_data(&self, key: &str) -> Option<Greek> {
        self.greeks.read().get(key).copied()
    }

    /// Snapshot copy of the Greek map.
    pub fn get_all_greek_data(&self) -> HashMap<String, Greek> {
        self.greeks.read().clone()
    }

    pub(crate) fn set_greek_data(
        &self,
        key: &str,
        datum: Greek,
        update: impl Fn(&str, Option<Greek>, Greek) -> Greek,
    ) -> Option<Greek> {
        let mut map = self.greeks.write();
        let old = map.get(key).copied();
        let merged = update(key, old, datum);
        if !merged.is_valid_greek() || old == Some(merged) {
            return None;
        }
        map.insert(key.to_string(), merged);
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(ts: f64) -> OptionTrade {
        OptionTrade {
            contract_id: "AAPL__240119C00150000".to_string(),
            exchange: crate::options::Exchange::Cboe,
            price: 1.0,
            size: 1,
            qualifiers: [0; 4],
            total_volume: 1,
            ask_price_at_execution: 1.0,
            bid_price_at_execution: 1.0,
            underlying_price_at_execution: 150.0,
            timestamp: ts,
        }
    }

    #[test]
    fn test_trade_timestamp_gate() {
        let data = OptionsContractData::new("AAPL__240119C00150000");
        assert!(data.set_trade(trade(100.0)));
        assert!(!data.set_trade(trade(90.0)));
        assert!(!data.set_trade(trade(100.0)));
        assert!(data.set_trade(trade(101.0)));
        assert_eq!(data.latest_trade().unwrap().timestamp, 101.0);
    }

    #[test]
    fn test_refresh_always_overwrites() {
        let data = OptionsContractData::new("AAPL__240119C00150000");
        let refresh = |oi: u32| OptionRefresh {
            contract_id: "AAPL__240119C00150000".to_string(),
            open_interest: oi,
            open_price: 1.0,
            close_price: 1.0,
            high_price: 1.0,
            low_price: 1.0,
        };
        assert!(data.set_refresh(refresh(10)));
        assert!(data.set_refresh(refresh(5)));
        assert_eq!(data.latest_refresh().unwrap().open_interest, 5);
    }

    #[test]
    fn test_invalid_greek_not_stored() {
        let data = OptionsContractData::new("AAPL__240119C00150000");
        let take_new = |_: &str, _: Option<Greek>, new: Greek| new;
        assert!(data
            .set_greek_data("IntrinioBlackScholes", Greek::invalid(), take_new)
            .is_none());
        let valid = Greek::new(0.2, 0.5, 0.01, -0.02, 0.1, true);
        assert!(data
            .set_greek_data("IntrinioBlackScholes", valid, take_new)
            .is_some());
        assert_eq!(data.get_greek_data("IntrinioBlackScholes"), Some(valid));
    }

    #[test]
    fn test_supplementary_merge_no_op_on_same_value() {
        let data = OptionsContractData::new("AAPL__240119C00150000");
        let take_new = |_: &str, _: Option<f64>, new: f64| new;
        assert_eq!(data.set_supplementary_datum("Vol", 1.5, take_new), Some(1.5));
        assert_eq!(data.set_supplementary_datum("Vol", 1.5, take_new), None);
        assert_eq!(data.set_supplementary_datum("Vol", 2.0, take_new), Some(2.0));
        assert_eq!(data.get_supplementary_datum("Vol"), Some(2.0));
    }
}
