//! Composite-layer value types: candlesticks aggregated from the feeds and
//! the JSON payloads of the bulk company-metrics endpoint.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::equities::QuoteType;

/// An equities trade candlestick. Timestamps are wall-clock instants.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeCandleStick {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
    pub interval: String,
}

/// An equities quote candlestick; ask and bid aggregate separately.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteCandleStick {
    pub symbol: String,
    pub quote_type: QuoteType,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
    pub interval: String,
}

/// An options trade candlestick. Timestamps are seconds since epoch, like
/// the option events they aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsTradeCandleStick {
    pub contract: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timestamp: f64,
    pub interval: String,
}

/// An options quote candlestick.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsQuoteCandleStick {
    pub contract: String,
    pub quote_type: QuoteType,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub timestamp: f64,
    pub interval: String,
}

/// One page of the bulk company daily-metrics endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DailyMetricResponse {
    #[serde(default)]
    pub daily_metrics: Vec<DailyMetric>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DailyMetric {
    /// Arrives as a number, a quoted number, or null depending on listing.
    #[serde(default)]
    pub dividend_yield: Option<serde_json::Value>,
    pub company: CompanySummary,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompanySummary {
    #[serde(default)]
    pub ticker: String,
}

impl DailyMetric {
    /// Coerce the yield to a float; anything unparsable means "no value".
    pub(crate) fn yield_value(&self) -> Option<f64> {
        match self.dividend_yield.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_metric_yield_coercion() {
        let page: DailyMetricResponse = serde_json::from_str(
            r#"{"daily_metrics":[
                {"dividend_yield":"0.0123","company":{"ticker":"AAPL"}},
                {"dividend_yield":0.02,"company":{"ticker":"MSFT"}},
                {"dividend_yield":null,"company":{"ticker":"GOOG"}},
                {"dividend_yield":"n/a","company":{"ticker":"BRK.A"}}
            ]}"#,
        )
        .unwrap();
        let yields: Vec<Option<f64>> = page.daily_metrics.iter().map(|m| m.yield_value()).collect();
        assert_eq!(yields[0], Some(0.0123));
        assert_eq!(yields[1], Some(0.02));
        assert_eq!(yields[2], None);
        assert_eq!(yields[3], None);
    }
}
