//! Equities feed wire codec (v2 record format).
//!
//! Batches share the options envelope `[recordCount:u8][record…]` but the
//! records are variable length: the kind discriminator sits at byte 0
//! (trade = 0, ask quote = 1, bid quote = 2) and the symbol length at
//! byte 1. The body carries the reporting source, the market center as a
//! u16 code point, an IEEE-754 price, size, nanosecond timestamp, the
//! running total volume (trades only) and an optional condition string.

use crate::errors::FrameError;

/// Fixed body size after the symbol for a trade record, excluding the
/// condition length byte: source + market center + price + size +
/// timestamp + total volume.
const TRADE_BODY_SIZE: usize = 1 + 2 + 4 + 4 + 8 + 4;
/// Same for quotes, which carry no total volume.
const QUOTE_BODY_SIZE: usize = 1 + 2 + 4 + 4 + 8;

/// Which consolidated feed reported the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSource {
    None,
    CtaA,
    CtaB,
    Utp,
    Otc,
    NasdaqBasic,
    Iex,
    CboeOne,
}

impl From<u8> for MarketSource {
    fn from(byte: u8) -> Self {
        match byte {
            1 => MarketSource::CtaA,
            2 => MarketSource::CtaB,
            3 => MarketSource::Utp,
            4 => MarketSource::Otc,
            5 => MarketSource::NasdaqBasic,
            6 => MarketSource::Iex,
            7 => MarketSource::CboeOne,
            _ => MarketSource::None,
        }
    }
}

/// Ask or bid, from the record discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteType {
    Ask = 1,
    Bid = 2,
}

/// An equities trade report.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityTrade {
    pub symbol: String,
    pub source: MarketSource,
    pub market_center: char,
    pub price: f64,
    pub size: u32,
    pub total_volume: u32,
    /// Seconds since epoch.
    pub timestamp: f64,
    pub condition: String,
}

/// A top-of-book equities quote; ask and bid arrive as separate records.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityQuote {
    pub quote_type: QuoteType,
    pub symbol: String,
    pub source: MarketSource,
    pub market_center: char,
    pub price: f64,
    pub size: u32,
    /// Seconds since epoch.
    pub timestamp: f64,
    pub condition: String,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        if self.data.len() < self.pos + n {
            return Err(FrameError::Truncated {
                needed: self.pos + n,
                got: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FrameError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, FrameError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32(&mut self) -> Result<f32, FrameError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, n: usize) -> Result<String, FrameError> {
        let b = self.take(n)?;
        Ok(String::from_utf8_lossy(b).into_owned())
    }
}

fn market_center(code: u16) -> char {
    char::from_u32(code as u32).unwrap_or('\u{0}')
}

/// Parse one trade record starting at the discriminator byte. Returns the
/// event and the total record length consumed.
pub(crate) fn parse_trade(record: &[u8]) -> Result<(EquityTrade, usize), FrameError> {
    let mut cursor = Cursor::new(record);
    cursor.u8()?; // discriminator, already inspected by the walker
    let symbol_len = cursor.u8()? as usize;
    let symbol = cursor.string(symbol_len)?;
    let source = MarketSource::from(cursor.u8()?);
    let center = market_center(cursor.u16()?);
    let price = cursor.f32()? as f64;
    let size = cursor.u32()?;
    let timestamp = cursor.u64()? as f64 / 1_000_000_000.0;
    let total_volume = cursor.u32()?;
    let condition_len = cursor.u8()? as usize;
    let condition = cursor.string(condition_len)?;
    Ok((
        EquityTrade {
            symbol,
            source,
            market_center: center,
            price,
            size,
            total_volume,
            timestamp,
            condition,
        },
        cursor.pos,
    ))
}

/// Parse one quote record starting at the discriminator byte.
pub(crate) fn parse_quote(record: &[u8]) -> Result<(EquityQuote, usize), FrameError> {
    let mut cursor = Cursor::new(record);
    let quote_type = match cursor.u8()? {
        1 => QuoteType::Ask,
        2 => QuoteType::Bid,
        other => return Err(FrameError::InvalidMessageType(other)),
    };
    let symbol_len = cursor.u8()? as usize;
    let symbol = cursor.string(symbol_len)?;
    let source = MarketSource::from(cursor.u8()?);
    let center = market_center(cursor.u16()?);
    let price = cursor.f32()? as f64;
    let size = cursor.u32()?;
    let timestamp = cursor.u64()? as f64 / 1_000_000_000.0;
    let condition_len = cursor.u8()? as usize;
    let condition = cursor.string(condition_len)?;
    Ok((
        EquityQuote {
            quote_type,
            symbol,
            source,
            market_center: center,
            price,
            size,
            timestamp,
            condition,
        },
        cursor.pos,
    ))
}

/// Typed callbacks for the equities feed. A `None` slot suppresses decoding
/// of that record kind.
#[derive(Clone, Default)]
pub struct EquityHandlers {
    pub on_trade: Option<std::sync::Arc<dyn Fn(EquityTrade) + Send + Sync>>,
    pub on_quote: Option<std::sync::Arc<dyn Fn(EquityQuote) + Send + Sync>>,
}

impl std::fmt::Debug for EquityHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquityHandlers")
            .field("on_trade", &self.on_trade.is_some())
            .field("on_quote", &self.on_quote.is_some())
            .finish()
    }
}

/// Record length without parsing, so suppressed kinds can be skipped:
/// discriminator + length byte + symbol + fixed body + condition.
fn record_len(data: &[u8], index: usize, body: usize) -> Result<usize, FrameError> {
    let symbol_len = data[index + 1] as usize;
    let condition_at = index + 2 + symbol_len + body;
    if data.len() < condition_at + 1 {
        return Err(FrameError::Truncated {
            needed: condition_at + 1,
            got: data.len(),
        });
    }
    Ok(2 + symbol_len + body + 1 + data[condition_at] as usize)
}

/// Walk one batch, dispatching each record to its handler. Truncation or an
/// unknown discriminator aborts the remainder of the batch.
pub(crate) fn work_on_equities(data: &[u8], handlers: &EquityHandlers) -> Result<(), FrameError> {
    if data.is_empty() {
        return Ok(());
    }
    let count = data[0] as usize;
    let mut index = 1usize;
    for _ in 0..count {
        if data.len() < index + 2 {
            return Err(FrameError::Truncated {
                needed: index + 2,
                got: data.len(),
            });
        }
        match data[index] {
            0 => {
                let len = record_len(data, index, TRADE_BODY_SIZE)?;
                if data.len() < index + len {
                    return Err(FrameError::Truncated {
                        needed: index + len,
                        got: data.len(),
                    });
                }
                if let Some(on_trade) = &handlers.on_trade {
                    let (trade, _) = parse_trade(&data[index..index + len])?;
                    on_trade(trade);
                }
                index += len;
            }
            1 | 2 => {
                let len = record_len(data, index, QUOTE_BODY_SIZE)?;
                if data.len() < index + len {
                    return Err(FrameError::Truncated {
                        needed: index + len,
                        got: data.len(),
                    });
                }
                if let Some(on_quote) = &handlers.on_quote {
                    let (quote, _) = parse_quote(&data[index..index + len])?;
                    on_quote(quote);
                }
                index += len;
            }
            other => return Err(FrameError::InvalidMessageType(other)),
        }
    }
    Ok(())
}

/// Compose a join frame: `[74, tradesOnly] || symbol`.
pub(crate) fn compose_join_msg(use_trade: bool, use_quote: bool, symbol: &str) -> Vec<u8> {
    let _ = use_trade;
    let trades_only: u8 = if use_quote { 0 } else { 1 };
    let mut message = Vec::with_capacity(symbol.len() + 2);
    message.push(74);
    message.push(trades_only);
    message.extend_from_slice(symbol.as_bytes());
    message
}

/// Compose a leave frame: `[76, 0] || symbol`.
pub(crate) fn compose_leave_msg(symbol: &str) -> Vec<u8> {
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

    fn trade_record(symbol: &str, price: f32, ts_ns: u64, condition: &str) -> Vec<u8> {
        let mut buf = vec![0u8, symbol.len() as u8];
        buf.extend_from_slice(symbol.as_bytes());
        buf.push(6); // IEX
        buf.extend_from_slice(&(b'V' as u16).to_le_bytes());
        buf.extend_from_slice(&price.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&ts_ns.to_le_bytes());
        buf.extend_from_slice(&55_555u32.to_le_bytes());
        buf.push(condition.len() as u8);
        buf.extend_from_slice(condition.as_bytes());
        buf
    }

    fn quote_record(quote_type: u8, symbol: &str, price: f32, ts_ns: u64) -> Vec<u8> {
        let mut buf = vec![quote_type, symbol.len() as u8];
        buf.extend_from_slice(symbol.as_bytes());
        buf.push(1); // CTA A
        buf.extend_from_slice(&(b'N' as u16).to_le_bytes());
        buf.extend_from_slice(&price.to_le_bytes());
        buf.extend_from_slice(&200u32.to_le_bytes());
        buf.extend_from_slice(&ts_ns.to_le_bytes());
        buf.push(0);
        buf
    }

    #[test]
    fn test_parse_trade_fields() {
        let record = trade_record("AAPL", 150.25, 2_000_000_000, "@T");
        let (trade, consumed) = parse_trade(&record).unwrap();
        assert_eq!(consumed, record.len());
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.source, MarketSource::Iex);
        assert_eq!(trade.market_center, 'V');
        assert_eq!(trade.price, 150.25);
        assert_eq!(trade.size, 100);
        assert_eq!(trade.total_volume, 55_555);
        assert_eq!(trade.timestamp, 2.0);
        assert_eq!(trade.condition, "@T");
    }

    #[test]
    fn test_parse_quote_ask_and_bid() {
        let (ask, _) = parse_quote(&quote_record(1, "MSFT", 410.5, 1_000_000_000)).unwrap();
        assert_eq!(ask.quote_type, QuoteType::Ask);
        assert_eq!(ask.symbol, "MSFT");
        assert_eq!(ask.market_center, 'N');
        let (bid, _) = parse_quote(&quote_record(2, "MSFT", 410.0, 1_000_000_000)).unwrap();
        assert_eq!(bid.quote_type, QuoteType::Bid);
    }

    #[test]
    fn test_batch_walks_variable_records() {
        let mut batch = vec![3u8];
        batch.extend_from_slice(&trade_record("AAPL", 150.0, 1, ""));
        batch.extend_from_slice(&quote_record(1, "AAPL", 150.1, 2));
        batch.extend_from_slice(&quote_record(2, "GOOG", 2800.0, 3));

        let trades = Arc::new(AtomicUsize::new(0));
        let quotes = Arc::new(AtomicUsize::new(0));
        let handlers = EquityHandlers {
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
        };
        work_on_equities(&batch, &handlers).unwrap();
        assert_eq!(trades.load(Ordering::SeqCst), 1);
        assert_eq!(quotes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_batch_skips_suppressed_kind() {
        let mut batch = vec![2u8];
        batch.extend_from_slice(&quote_record(1, "AAPL", 150.1, 2));
        batch.extend_from_slice(&trade_record("AAPL", 150.0, 3, ""));

        let trades = Arc::new(AtomicUsize::new(0));
        let handlers = EquityHandlers {
            on_trade: Some(Arc::new({
                let trades = trades.clone();
                move |_| {
                    trades.fetch_add(1, Ordering::SeqCst);
                }
            })),
            on_quote: None,
        };
        work_on_equities(&batch, &handlers).unwrap();
        assert_eq!(trades.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_aborts_on_invalid_type() {
        let mut batch = vec![1u8];
        let mut bad = trade_record("AAPL", 150.0, 1, "");
        bad[0] = 7;
        batch.extend_from_slice(&bad);
        let err = work_on_equities(&batch, &EquityHandlers::default()).unwrap_err();
        assert_eq!(err, FrameError::InvalidMessageType(7));
    }

    #[test]
    fn test_batch_aborts_on_truncation() {
        let record = trade_record("AAPL", 150.0, 1, "");
        let mut batch = vec![1u8];
        batch.extend_from_slice(&record[..10]);
        assert!(work_on_equities(&batch, &EquityHandlers::default()).is_err());
    }

    #[test]
    fn test_compose_join_trades_only_flag() {
        let msg = compose_join_msg(true, false, "AAPL");
        assert_eq!(msg[0], 74);
        assert_eq!(msg[1], 1);
        assert_eq!(&msg[2..], b"AAPL");
        let msg = compose_join_msg(true, true, "AAPL");
        assert_eq!(msg[1], 0);
    }

    #[test]
    fn test_compose_leave() {
        let msg = compose_leave_msg("AAPL");
        assert_eq!(msg[0], 76);
        assert_eq!(msg[1], 0);
        assert_eq!(&msg[2..], b"AAPL");
    }
}
