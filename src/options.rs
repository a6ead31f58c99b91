//! Options feed wire codec.
//!
//! The feed delivers batches of fixed-size binary records:
//! `[recordCount:u8][record…]`. Every record starts with a one-byte symbol
//! length followed by a 21-byte symbol area holding the compact textual
//! contract id; the record kind discriminator sits at offset 22 (trade = 0,
//! quote = 1, refresh = 2, unusual activity >= 3). All integers are
//! little-endian. Prices travel as unsigned integers paired with a one-byte
//! price type indexing the divisor table.
//!
//! Contract ids have two forms:
//! - the canonical 21-byte form `SSSSSSYYMMDDTNNNNNFFF` (symbol right-padded
//!   with `_`, strike as five integer digits plus three fractional digits)
//! - the compact textual form used on the wire, e.g. `AAPL_251219C255.75`
//!
//! [`contract`] converts between the two and extracts strike, expiration,
//! put/call flag and underlying symbol.

use crate::errors::FrameError;

/// Canonical (21-byte) contract id length.
pub const CONTRACT_ID_SIZE: usize = 21;

pub(crate) const TRADE_MSG_SIZE: usize = 72;
pub(crate) const QUOTE_MSG_SIZE: usize = 52;
pub(crate) const REFRESH_MSG_SIZE: usize = 52;
pub(crate) const UA_MSG_SIZE: usize = 74;

/// Offset of the record-kind discriminator: length byte + symbol area.
const MSG_TYPE_OFFSET: usize = 1 + CONTRACT_ID_SIZE;

/// Divisor table indexed by the wire price type. Index 10 is a binary
/// fraction used by some index feeds; 11..14 are unassigned; 15 marks an
/// unpriced field.
pub(crate) const PRICE_TYPE_DIVISORS: [f64; 16] = [
    1.0,
    10.0,
    100.0,
    1_000.0,
    10_000.0,
    100_000.0,
    1_000_000.0,
    10_000_000.0,
    100_000_000.0,
    1_000_000_000.0,
    512.0,
    0.0,
    0.0,
    0.0,
    0.0,
    f64::NAN,
];

pub(crate) fn extract_u32_price(bytes: &[u8], price_type: u8) -> f64 {
    let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    raw as f64 / PRICE_TYPE_DIVISORS[(price_type & 0x0F) as usize]
}

pub(crate) fn extract_u64_price(bytes: &[u8], price_type: u8) -> f64 {
    let raw = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    raw as f64 / PRICE_TYPE_DIVISORS[(price_type & 0x0F) as usize]
}

/// Nanoseconds since epoch on the wire; seconds in the cache.
pub(crate) fn scale_timestamp(timestamp: u64) -> f64 {
    timestamp as f64 / 1_000_000_000.0
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// OPRA participant exchange, keyed by the wire exchange byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    NyseAmerican,
    Boston,
    Cboe,
    MiamiEmerald,
    BatsEdgx,
    IseGemini,
    Ise,
    Mercury,
    Miami,
    MiamiPearl,
    NyseArca,
    Nasdaq,
    NasdaqBx,
    Memx,
    CboeC2,
    Phlx,
    BatsBzx,
    Unknown(u8),
}

impl From<u8> for Exchange {
    fn from(byte: u8) -> Self {
        match byte {
            b'A' => Exchange::NyseAmerican,
            b'B' => Exchange::Boston,
            b'C' => Exchange::Cboe,
            b'D' => Exchange::MiamiEmerald,
            b'E' => Exchange::BatsEdgx,
            b'H' => Exchange::IseGemini,
            b'I' => Exchange::Ise,
            b'J' => Exchange::Mercury,
            b'M' => Exchange::Miami,
            b'O' => Exchange::MiamiPearl,
            b'P' => Exchange::NyseArca,
            b'Q' => Exchange::Nasdaq,
            b'T' => Exchange::NasdaqBx,
            b'U' => Exchange::Memx,
            b'W' => Exchange::CboeC2,
            b'X' => Exchange::Phlx,
            b'Z' => Exchange::BatsBzx,
            other => Exchange::Unknown(other),
        }
    }
}

/// Unusual activity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UaType {
    Block,
    Sweep,
    Large,
    UnusualSweep,
}

impl UaType {
    fn from_discriminator(byte: u8) -> Option<UaType> {
        match byte {
            3 => Some(UaType::Block),
            4 => Some(UaType::Sweep),
            5 => Some(UaType::Large),
            6 => Some(UaType::UnusualSweep),
            _ => None,
        }
    }
}

/// Unusual activity sentiment annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UaSentiment {
    Neutral,
    Bullish,
    Bearish,
}

impl From<u8> for UaSentiment {
    fn from(byte: u8) -> Self {
        match byte {
            1 => UaSentiment::Bullish,
            2 => UaSentiment::Bearish,
            _ => UaSentiment::Neutral,
        }
    }
}

/// Contract-id helpers shared by every options event kind.
pub mod contract {
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    use crate::errors::FrameError;

    use super::CONTRACT_ID_SIZE;

    /// Convert a compact textual contract id (e.g. `AAPL_251219C255.75`)
    /// into the canonical 21-byte form. Channel names that do not look like
    /// contract ids (plain tickers, `$FIREHOSE`) fail with
    /// [`FrameError::MalformedContractId`].
    pub fn to_old_format(new_id: &str) -> Result<String, FrameError> {
        let malformed = || FrameError::MalformedContractId(new_id.to_string());
        let underscore = new_id.find('_').ok_or_else(malformed)?;
        let (symbol, rest) = new_id.split_at(underscore);
        let rest = &rest[1..];
        if symbol.is_empty() || symbol.len() > 6 || rest.len() < 8 {
            return Err(malformed());
        }
        let (expiration, rest) = rest.split_at(6);
        if !expiration.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let put_call = rest.as_bytes()[0];
        if put_call != b'C' && put_call != b'P' {
            return Err(malformed());
        }
        let strike = &rest[1..];
        let dot = strike.find('.').ok_or_else(malformed)?;
        let (whole, fraction) = (&strike[..dot], &strike[dot + 1..]);
        if whole.is_empty()
            || whole.len() > 5
            || fraction.is_empty()
            || fraction.len() > 3
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        let mut old = String::with_capacity(CONTRACT_ID_SIZE);
        old.push_str(symbol);
        for _ in symbol.len()..6 {
            old.push('_');
        }
        old.push_str(expiration);
        old.push(put_call as char);
        for _ in whole.len()..5 {
            old.push('0');
        }
        old.push_str(whole);
        old.push_str(fraction);
        for _ in fraction.len()..3 {
            old.push('0');
        }
        Ok(old)
    }

    /// Convert a canonical 21-byte contract id into the compact textual
    /// form. Inputs that are not old-format ids (plain tickers, the
    /// firehose channel, already-converted ids) pass through unchanged so
    /// that channel names can be fed directly into join/leave composition.
    pub fn to_new_format(old_id: &str) -> String {
        if old_id.len() < 13 || old_id.find('.').is_some_and(|i| i > 9) {
            return old_id.to_string();
        }
        if old_id.len() != CONTRACT_ID_SIZE || !old_id.is_ascii() {
            return old_id.to_string();
        }
        let symbol = old_id[..6].trim_end_matches('_');
        let expiration = &old_id[6..12];
        let put_call = &old_id[12..13];
        let mut whole = old_id[13..18].trim_start_matches('0');
        if whole.is_empty() {
            whole = "0";
        }
        let fraction = &old_id[18..21];
        let fraction = if fraction.ends_with('0') {
            &fraction[..2]
        } else {
            fraction
        };
        format!("{symbol}_{expiration}{put_call}{whole}.{fraction}")
    }

    /// Underlying ticker: first six bytes, trailing `_` padding stripped.
    pub fn underlying_symbol(contract_id: &str) -> &str {
        let end = contract_id.len().min(6);
        contract_id[..end].trim_end_matches('_')
    }

    pub fn is_put(contract_id: &str) -> bool {
        contract_id.as_bytes().get(12) == Some(&b'P')
    }

    pub fn is_call(contract_id: &str) -> bool {
        contract_id.as_bytes().get(12) == Some(&b'C')
    }

    /// Strike price: five integer digits at bytes 13..18 and three
    /// fractional digits at bytes 18..21 scaled by 0.001.
    pub fn strike_price(contract_id: &str) -> f64 {
        let bytes = contract_id.as_bytes();
        if bytes.len() < CONTRACT_ID_SIZE {
            return 0.0;
        }
        let digit = |i: usize| (bytes[i].wrapping_sub(b'0')) as f64;
        let whole = digit(13) * 10_000.0
            + digit(14) * 1_000.0
            + digit(15) * 100.0
            + digit(16) * 10.0
            + digit(17);
        let part = digit(18) * 0.1 + digit(19) * 0.01 + digit(20) * 0.001;
        whole + part
    }

    /// Expiration date parsed as `YYMMDD` in America/New_York.
    pub fn expiration_date(contract_id: &str) -> Option<chrono::NaiveDate> {
        let bytes = contract_id.as_bytes();
        if bytes.len() < 12 || !bytes[6..12].iter().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let num = |i: usize| (bytes[i] - b'0') as u32 * 10 + (bytes[i + 1] - b'0') as u32;
        let (year, month, day) = (2000 + num(6) as i32, num(8), num(10));
        chrono::NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Expiration instant as seconds since the Unix epoch: midnight of the
    /// expiration date in America/New_York.
    pub fn expiration_timestamp(contract_id: &str) -> Option<f64> {
        let date = expiration_date(contract_id)?;
        let midnight = date.and_hms_opt(0, 0, 0)?;
        New_York
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.timestamp() as f64)
    }
}

/// Common accessors for every event kind carrying a contract id.
pub trait ContractEvent {
    fn contract_id(&self) -> &str;

    fn strike_price(&self) -> f64 {
        contract::strike_price(self.contract_id())
    }

    fn is_put(&self) -> bool {
        contract::is_put(self.contract_id())
    }

    fn is_call(&self) -> bool {
        contract::is_call(self.contract_id())
    }

    fn expiration_date(&self) -> Option<chrono::NaiveDate> {
        contract::expiration_date(self.contract_id())
    }

    fn underlying_symbol(&self) -> &str {
        contract::underlying_symbol(self.contract_id())
    }
}

/// An options trade report.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionTrade {
    pub contract_id: String,
    pub exchange: Exchange,
    pub price: f64,
    pub size: u32,
    pub qualifiers: [u8; 4],
    pub total_volume: u64,
    pub ask_price_at_execution: f64,
    pub bid_price_at_execution: f64,
    pub underlying_price_at_execution: f64,
    /// Seconds since epoch.
    pub timestamp: f64,
}

impl ContractEvent for OptionTrade {
    fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

/// A top-of-book options quote.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionQuote {
    pub contract_id: String,
    pub ask_price: f64,
    pub bid_price: f64,
    pub ask_size: u32,
    pub bid_size: u32,
    pub timestamp: f64,
}

impl ContractEvent for OptionQuote {
    fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

/// Periodic intraday snapshot: session open/close/high/low and open
/// interest. Carries no timestamp; the latest refresh always wins.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRefresh {
    pub contract_id: String,
    pub open_interest: u32,
    pub open_price: f64,
    pub close_price: f64,
    pub high_price: f64,
    pub low_price: f64,
}

impl ContractEvent for OptionRefresh {
    fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

/// A classified block/sweep/large event with sentiment annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionUnusualActivity {
    pub contract_id: String,
    pub activity_type: UaType,
    pub sentiment: UaSentiment,
    pub total_value: f64,
    pub total_size: u32,
    pub average_price: f64,
    pub ask_price_at_execution: f64,
    pub bid_price_at_execution: f64,
    pub underlying_price_at_execution: f64,
    pub timestamp: f64,
}

impl ContractEvent for OptionUnusualActivity {
    fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

fn extract_contract_id(record: &[u8]) -> Result<String, FrameError> {
    let len = record[0] as usize;
    if len == 0 || len > CONTRACT_ID_SIZE || record.len() < 1 + len {
        return Err(FrameError::Truncated {
            needed: 1 + len,
            got: record.len(),
        });
    }
    let symbol = std::str::from_utf8(&record[1..1 + len])
        .map_err(|_| FrameError::MalformedContractId(format!("{:?}", &record[1..1 + len])))?;
    contract::to_old_format(symbol)
}

pub(crate) fn parse_trade(record: &[u8]) -> Result<OptionTrade, FrameError> {
    if record.len() < TRADE_MSG_SIZE {
        return Err(FrameError::Truncated {
            needed: TRADE_MSG_SIZE,
            got: record.len(),
        });
    }
    let price_type = record[23];
    let underlying_price_type = record[24];
    Ok(OptionTrade {
        contract_id: extract_contract_id(record)?,
        price: extract_u32_price(&record[25..29], price_type),
        size: read_u32(&record[29..33]),
        timestamp: scale_timestamp(read_u64(&record[33..41])),
        total_volume: read_u64(&record[41..49]),
        ask_price_at_execution: extract_u32_price(&record[49..53], price_type),
        bid_price_at_execution: extract_u32_price(&record[53..57], price_type),
        underlying_price_at_execution: extract_u32_price(&record[57..61], underlying_price_type),
        qualifiers: [record[61], record[62], record[63], record[64]],
        exchange: Exchange::from(record[65]),
    })
}

pub(crate) fn parse_quote(record: &[u8]) -> Result<OptionQuote, FrameError> {
    if record.len() < QUOTE_MSG_SIZE {
        return Err(FrameError::Truncated {
            needed: QUOTE_MSG_SIZE,
            got: record.len(),
        });
    }
    let price_type = record[23];
    Ok(OptionQuote {
        contract_id: extract_contract_id(record)?,
        ask_price: extract_u32_price(&record[24..28], price_type),
        ask_size: read_u32(&record[28..32]),
        bid_price: extract_u32_price(&record[32..36], price_type),
        bid_size: read_u32(&record[36..40]),
        timestamp: scale_timestamp(read_u64(&record[40..48])),
    })
}

pub(crate) fn parse_refresh(record: &[u8]) -> Result<OptionRefresh, FrameError> {
    if record.len() < REFRESH_MSG_SIZE {
        return Err(FrameError::Truncated {
            needed: REFRESH_MSG_SIZE,
            got: record.len(),
        });
    }
    let price_type = record[23];
    Ok(OptionRefresh {
        contract_id: extract_contract_id(record)?,
        open_interest: read_u32(&record[24..28]),
        open_price: extract_u32_price(&record[28..32], price_type),
        close_price: extract_u32_price(&record[32..36], price_type),
        high_price: extract_u32_price(&record[36..40], price_type),
        low_price: extract_u32_price(&record[40..44], price_type),
    })
}

pub(crate) fn parse_unusual_activity(record: &[u8]) -> Result<OptionUnusualActivity, FrameError> {
    if record.len() < UA_MSG_SIZE {
        return Err(FrameError::Truncated {
            needed: UA_MSG_SIZE,
            got: record.len(),
        });
    }
    let activity_type =
        UaType::from_discriminator(record[22]).ok_or(FrameError::InvalidMessageType(record[22]))?;
    let price_type = record[24];
    let underlying_price_type = record[25];
    Ok(OptionUnusualActivity {
        contract_id: extract_contract_id(record)?,
        activity_type,
        sentiment: UaSentiment::from(record[23]),
        total_value: extract_u64_price(&record[26..34], price_type),
        total_size: read_u32(&record[34..38]),
        average_price: extract_u32_price(&record[38..42], underlying_price_type),
        ask_price_at_execution: extract_u32_price(&record[42..46], price_type),
        bid_price_at_execution: extract_u32_price(&record[46..50], price_type),
        underlying_price_at_execution: extract_u32_price(&record[50..54], underlying_price_type),
        timestamp: scale_timestamp(read_u64(&record[54..62])),
    })
}

/// Typed callbacks for the options feed. A `None` slot suppresses decoding
/// of that record kind (the batch walker still advances past it).
#[derive(Clone, Default)]
pub struct OptionsHandlers {
    pub on_trade: Option<std::sync::Arc<dyn Fn(OptionTrade) + Send + Sync>>,
    pub on_quote: Option<std::sync::Arc<dyn Fn(OptionQuote) + Send + Sync>>,
    pub on_refresh: Option<std::sync::Arc<dyn Fn(OptionRefresh) + Send + Sync>>,
    pub on_unusual_activity: Option<std::sync::Arc<dyn Fn(OptionUnusualActivity) + Send + Sync>>,
}

impl std::fmt::Debug for OptionsHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsHandlers")
            .field("on_trade", &self.on_trade.is_some())
            .field("on_quote", &self.on_quote.is_some())
            .field("on_refresh", &self.on_refresh.is_some())
            .field("on_unusual_activity", &self.on_unusual_activity.is_some())
            .finish()
    }
}

/// Walk one batch, dispatching each record to its handler. A truncated or
/// unrecognizable record aborts the remainder of the batch; the caller logs
/// the returned error and drops the rest.
pub(crate) fn work_on_options(data: &[u8], handlers: &OptionsHandlers) -> Result<(), FrameError> {
    if data.is_empty() {
        return Ok(());
    }
    let count = data[0] as usize;
    let mut index = 1usize;
    for _ in 0..count {
        if data.len() < index + MSG_TYPE_OFFSET + 1 {
            return Err(FrameError::Truncated {
                needed: index + MSG_TYPE_OFFSET + 1,
                got: data.len(),
            });
        }
        let msg_type = data[index + MSG_TYPE_OFFSET];
        let size = match msg_type {
            0 => TRADE_MSG_SIZE,
            1 => QUOTE_MSG_SIZE,
            2 => REFRESH_MSG_SIZE,
            3..=6 => UA_MSG_SIZE,
            other => return Err(FrameError::InvalidMessageType(other)),
        };
        if data.len() < index + size {
            return Err(FrameError::Truncated {
                needed: index + size,
                got: data.len(),
            });
        }
        let record = &data[index..index + size];
        match msg_type {
            0 => {
                if let Some(on_trade) = &handlers.on_trade {
                    on_trade(parse_trade(record)?);
                }
            }
            1 => {
                if let Some(on_quote) = &handlers.on_quote {
                    on_quote(parse_quote(record)?);
                }
            }
            2 => {
                if let Some(on_refresh) = &handlers.on_refresh {
                    on_refresh(parse_refresh(record)?);
                }
            }
            _ => {
                if let Some(on_ua) = &handlers.on_unusual_activity {
                    on_ua(parse_unusual_activity(record)?);
                }
            }
        }
        index += size;
    }
    Ok(())
}

/// Compose a join frame: `[74, mask] || channel`, where the mask selects
/// trade/quote/refresh/UA delivery and the channel is the compact contract
/// id (or a plain ticker / `$FIREHOSE`).
pub(crate) fn compose_join_msg(
    use_trade: bool,
    use_quote: bool,
    use_refresh: bool,
    use_ua: bool,
    channel: &str,
) -> Vec<u8> {
    let symbol = contract::to_new_format(channel);
    let mut mask = 0u8;
    if use_trade {
        mask |= 1;
    }
    if use_quote {
        mask |= 2;
    }
    if use_refresh {
        mask |= 4;
    }
    if use_ua {
        mask |= 8;
    }
    let mut message = Vec::with_capacity(symbol.len() + 2);
    message.push(74);
    message.push(mask);
    message.extend_from_slice(symbol.as_bytes());
    message
}

/// Compose a leave frame: `[76, 0] || channel`.
pub(crate) fn compose_leave_msg(channel: &str) -> Vec<u8> {
    let symbol = contract::to_new_format(channel);
    let mut message = Vec::with_capacity(symbol.len() + 2);
    message.push(76);
    message.push(0);
    message.extend_from_slice(symbol.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
        buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn put_symbol(buf: &mut [u8], new_id: &str) {
        buf[0] = new_id.len() as u8;
        buf[1..1 + new_id.len()].copy_from_slice(new_id.as_bytes());
    }

    fn trade_record(new_id: &str, price: u32, price_type: u8, ts_ns: u64) -> [u8; TRADE_MSG_SIZE] {
        let mut buf = [0u8; TRADE_MSG_SIZE];
        put_symbol(&mut buf, new_id);
        buf[22] = 0;
        buf[23] = price_type;
        buf[24] = 2;
        put_u32(&mut buf, 25, price);
        put_u32(&mut buf, 29, 10);
        put_u64(&mut buf, 33, ts_ns);
        put_u64(&mut buf, 41, 999);
        put_u32(&mut buf, 49, price + 1);
        put_u32(&mut buf, 53, price.saturating_sub(1));
        put_u32(&mut buf, 57, 40_000);
        buf[61..65].copy_from_slice(b"abcd");
        buf[65] = b'C';
        buf
    }

    fn quote_record(new_id: &str, ask: u32, bid: u32, price_type: u8, ts_ns: u64) -> [u8; QUOTE_MSG_SIZE] {
        let mut buf = [0u8; QUOTE_MSG_SIZE];
        put_symbol(&mut buf, new_id);
        buf[22] = 1;
        buf[23] = price_type;
        put_u32(&mut buf, 24, ask);
        put_u32(&mut buf, 28, 5);
        put_u32(&mut buf, 32, bid);
        put_u32(&mut buf, 36, 7);
        put_u64(&mut buf, 40, ts_ns);
        buf
    }

    #[test]
    fn test_old_new_round_trip() {
        for id in [
            "AAPL__201016C00123456",
            "AAPL__201016P00100000",
            "SPY___230227C00400000",
            "SPXW__240119P05432100",
            "A_____250620C00012500",
        ] {
            let new_id = contract::to_new_format(id);
            assert_eq!(contract::to_old_format(&new_id).unwrap(), id, "{id} via {new_id}");
        }
    }

    #[test]
    fn test_to_new_format_compacts_strike() {
        assert_eq!(
            contract::to_new_format("AAPL__201016C00123456"),
            "AAPL_201016C123.456"
        );
        assert_eq!(
            contract::to_new_format("SPY___230227C00400000"),
            "SPY_230227C400.00"
        );
    }

    #[test]
    fn test_to_new_format_passes_plain_channels() {
        assert_eq!(contract::to_new_format("AAPL"), "AAPL");
        assert_eq!(contract::to_new_format("$FIREHOSE"), "$FIREHOSE");
        assert_eq!(
            contract::to_new_format("AAPL_201016C123.456"),
            "AAPL_201016C123.456"
        );
    }

    #[test]
    fn test_strike_price_parse() {
        assert_eq!(contract::strike_price("AAPL__201016C00123456"), 123.456);
        assert_eq!(contract::strike_price("SPY___230227C00400000"), 400.0);
    }

    #[test]
    fn test_put_call_and_underlying() {
        assert!(contract::is_put("AAPL__201016P00100000"));
        assert!(!contract::is_call("AAPL__201016P00100000"));
        assert!(contract::is_call("SPY___230227C00400000"));
        assert_eq!(contract::underlying_symbol("SPY___230227C00400000"), "SPY");
        assert_eq!(contract::underlying_symbol("AAPL__201016P00100000"), "AAPL");
    }

    #[test]
    fn test_expiration_date_new_york() {
        let date = contract::expiration_date("SPY___230227C00400000").unwrap();
        assert_eq!(date, chrono::NaiveDate::from_ymd_opt(2023, 2, 27).unwrap());
        let ts = contract::expiration_timestamp("SPY___230227C00400000").unwrap();
        // 2023-02-27 00:00 America/New_York == 05:00 UTC
        assert_eq!(ts, 1677474000.0);
    }

    #[test]
    fn test_price_divisors() {
        assert_eq!(extract_u32_price(&123456u32.to_le_bytes(), 3), 123.456);
        assert_eq!(extract_u32_price(&1024u32.to_le_bytes(), 10), 2.0);
        assert!(extract_u32_price(&1u32.to_le_bytes(), 15).is_nan());
    }

    #[test]
    fn test_parse_trade_fields() {
        let record = trade_record("AAPL_240119C150.00", 12345, 2, 100_000_000_000);
        let trade = parse_trade(&record).unwrap();
        assert_eq!(trade.contract_id, "AAPL__240119C00150000");
        assert_eq!(trade.price, 123.45);
        assert_eq!(trade.size, 10);
        assert_eq!(trade.timestamp, 100.0);
        assert_eq!(trade.total_volume, 999);
        assert_eq!(trade.exchange, Exchange::Cboe);
        assert_eq!(trade.underlying_price_at_execution, 400.0);
    }

    #[test]
    fn test_parse_quote_fields() {
        let record = quote_record("AAPL_240119C150.00", 1200, 1100, 2, 90_000_000_000);
        let quote = parse_quote(&record).unwrap();
        assert_eq!(quote.contract_id, "AAPL__240119C00150000");
        assert_eq!(quote.ask_price, 12.0);
        assert_eq!(quote.bid_price, 11.0);
        assert_eq!(quote.ask_size, 5);
        assert_eq!(quote.bid_size, 7);
        assert_eq!(quote.timestamp, 90.0);
    }

    #[test]
    fn test_parse_refresh_fields() {
        let mut buf = [0u8; REFRESH_MSG_SIZE];
        put_symbol(&mut buf, "SPY_230227C400.00");
        buf[22] = 2;
        buf[23] = 2;
        put_u32(&mut buf, 24, 777);
        put_u32(&mut buf, 28, 100);
        put_u32(&mut buf, 32, 200);
        put_u32(&mut buf, 36, 300);
        put_u32(&mut buf, 40, 50);
        let refresh = parse_refresh(&buf).unwrap();
        assert_eq!(refresh.contract_id, "SPY___230227C00400000");
        assert_eq!(refresh.open_interest, 777);
        assert_eq!(refresh.open_price, 1.0);
        assert_eq!(refresh.low_price, 0.5);
    }

    #[test]
    fn test_parse_unusual_activity_fields() {
        let mut buf = [0u8; UA_MSG_SIZE];
        put_symbol(&mut buf, "SPY_230227C400.00");
        buf[22] = 4; // sweep
        buf[23] = 1; // bullish
        buf[24] = 2;
        buf[25] = 3;
        put_u64(&mut buf, 26, 1_000_000);
        put_u32(&mut buf, 34, 250);
        put_u32(&mut buf, 38, 5_000);
        put_u32(&mut buf, 42, 130);
        put_u32(&mut buf, 46, 120);
        put_u32(&mut buf, 50, 400_123);
        put_u64(&mut buf, 54, 42_000_000_000);
        let ua = parse_unusual_activity(&buf).unwrap();
        assert_eq!(ua.activity_type, UaType::Sweep);
        assert_eq!(ua.sentiment, UaSentiment::Bullish);
        assert_eq!(ua.total_value, 10_000.0);
        assert_eq!(ua.total_size, 250);
        assert_eq!(ua.average_price, 5.0);
        assert_eq!(ua.underlying_price_at_execution, 400.123);
        assert_eq!(ua.timestamp, 42.0);
    }

    #[test]
    fn test_batch_dispatch_and_counts() {
        let trade = trade_record("AAPL_240119C150.00", 100, 2, 1);
        let quote = quote_record("AAPL_240119C150.00", 100, 90, 2, 2);
        let mut batch = vec![2u8];
        batch.extend_from_slice(&trade);
        batch.extend_from_slice(&quote);

        let trades = Arc::new(AtomicUsize::new(0));
        let quotes = Arc::new(AtomicUsize::new(0));
        let handlers = OptionsHandlers {
            on_trade: Some(Arc::new({
                let trades = trades.clone();
                move |_| {
                    trades.fetch_add(1, Ordering::SeqCst);
                }
            })),
            on_quote: Some(Arc::new({
                let quotes = quotes.clone();
                move |_| {
                    quotes.fetch_add(1, Ordering::SeqCst);
                }
            })),
            ..Default::default()
        };
        work_on_options(&batch, &handlers).unwrap();
        assert_eq!(trades.load(Ordering::SeqCst), 1);
        assert_eq!(quotes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_null_handler_skips_kind() {
        let quote = quote_record("AAPL_240119C150.00", 100, 90, 2, 2);
        let trade = trade_record("AAPL_240119C150.00", 100, 2, 3);
        let mut batch = vec![2u8];
        batch.extend_from_slice(&quote);
        batch.extend_from_slice(&trade);

        let trades = Arc::new(AtomicUsize::new(0));
        let handlers = OptionsHandlers {
            on_trade: Some(Arc::new({
                let trades = trades.clone();
                move |_| {
                    trades.fetch_add(1, Ordering::SeqCst);
                }
            })),
            ..Default::default()
        };
        // Quote has no handler; the walker must still advance past it.
        work_on_options(&batch, &handlers).unwrap();
        assert_eq!(trades.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_aborts_on_invalid_type() {
        let trade = trade_record("AAPL_240119C150.00", 100, 2, 1);
        let mut bad = trade;
        bad[22] = 9;
        let mut batch = vec![2u8];
        batch.extend_from_slice(&bad);
        batch.extend_from_slice(&trade_record("AAPL_240119C150.00", 100, 2, 2));

        let err = work_on_options(&batch, &OptionsHandlers::default()).unwrap_err();
        assert_eq!(err, FrameError::InvalidMessageType(9));
    }

    #[test]
    fn test_batch_aborts_on_truncation() {
        let trade = trade_record("AAPL_240119C150.00", 100, 2, 1);
        let mut batch = vec![1u8];
        batch.extend_from_slice(&trade[..40]);
        assert!(work_on_options(&batch, &OptionsHandlers::default()).is_err());
    }

    #[test]
    fn test_compose_join_mask() {
        let msg = compose_join_msg(true, true, false, true, "AAPL__240119C00150000");
        assert_eq!(msg[0], 74);
        assert_eq!(msg[1], 1 | 2 | 8);
        assert_eq!(&msg[2..], b"AAPL_240119C150.00");
    }

    #[test]
    fn test_compose_leave_plain_channel() {
        let msg = compose_leave_msg("$FIREHOSE");
        assert_eq!(msg[0], 76);
        assert_eq!(msg[1], 0);
        assert_eq!(&msg[2..], b"$FIREHOSE");
    }
}
