//! Composite layer: the three-level data cache and the Greek engine that
//! consumes its events.

mod black_scholes;
mod data_cache;
mod greek;
mod greek_client;
mod options_contract_data;
mod security_data;
mod types;

pub use black_scholes::BlackScholesCalculator;
pub use data_cache::{
    take_new_datum, take_new_greek, DataCache, OnEquitiesQuoteCandleUpdated,
    OnEquitiesQuoteUpdated, OnEquitiesTradeCandleUpdated, OnEquitiesTradeUpdated,
    OnOptionsContractGreekDataUpdated, OnOptionsContractSupplementalDatumUpdated,
    OnOptionsQuoteCandleUpdated, OnOptionsQuoteUpdated, OnOptionsRefreshUpdated,
    OnOptionsTradeCandleUpdated, OnOptionsTradeUpdated, OnOptionsUnusualActivityUpdated,
    OnSecuritySupplementalDatumUpdated, OnSupplementalDatumUpdated,
};
pub use greek::{Greek, GreekUpdateFrequency};
pub use greek_client::{
    GreekCalculation, GreekClient, BLACK_SCHOLES_KEY, DEFAULT_DIVIDEND_YIELD,
    DEFAULT_RISK_FREE_INTEREST_RATE, DIVIDEND_YIELD_KEY, RISK_FREE_INTEREST_RATE_KEY,
};
pub use options_contract_data::OptionsContractData;
pub use security_data::SecurityData;
pub use types::{
    OptionsQuoteCandleStick, OptionsTradeCandleStick, QuoteCandleStick, TradeCandleStick,
};
