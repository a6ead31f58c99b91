//! Real-time equities and options market data client.
//!
//! Two long-lived WebSocket sessions (equities and options) demultiplex
//! dense binary frame batches into typed per-instrument events. The
//! [`composite`] layer caches the latest snapshot per instrument and
//! recomputes option Greeks in response to configurable cache events.
//!
//! The common deployment wires one equities client and one options client
//! into a shared [`composite::DataCache`] through a
//! [`composite::GreekClient`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use intrinio_realtime::composite::{DataCache, GreekClient, GreekUpdateFrequency};
//! use intrinio_realtime::{Client, Config, OptionsHandlers, Provider};
//!
//! # async fn run() -> intrinio_realtime::Result<()> {
//! let config = Config::new("api-key", Provider::Opra);
//! let cache = DataCache::new();
//! let greeks = GreekClient::new(
//!     GreekUpdateFrequency::EVERY_OPTIONS_QUOTE
//!         | GreekUpdateFrequency::EVERY_RISK_FREE_INTEREST_RATE,
//!     None,
//!     config.api_key.clone(),
//!     Arc::clone(&cache),
//! );
//! greeks.add_black_scholes();
//! greeks.fetch_risk_free_interest_rate().await;
//!
//! let handlers = OptionsHandlers {
//!     on_quote: Some({
//!         let greeks = Arc::clone(&greeks);
//!         Arc::new(move |quote| greeks.on_options_quote(quote))
//!     }),
//!     ..Default::default()
//! };
//! let client = Client::options(config, handlers)?;
//! client.start().await?;
//! client.join("AAPL").await?;
//! # Ok(())
//! # }
//! ```

// Core modules
mod client;
mod config;
mod dispatch;
mod errors;
mod logging;
mod req;

// Wire codecs
pub mod equities;
pub mod options;

// Composite cache + Greek engine
pub mod composite;

// Re-exports
pub use client::{Client, SessionState, FIREHOSE_CHANNEL};
pub use config::{Config, Provider};
pub use equities::{EquityHandlers, EquityQuote, EquityTrade, MarketSource, QuoteType};
pub use errors::{ConfigError, Error, FrameError, Result};
pub use logging::{init_logging, LogConfig};
pub use options::{
    ContractEvent, Exchange, OptionQuote, OptionRefresh, OptionTrade, OptionUnusualActivity,
    OptionsHandlers, UaSentiment, UaType,
};
