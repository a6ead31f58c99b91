//! The Greek result tuple and the update-frequency bitmask that selects
//! which cache events trigger recomputation.

use std::ops::{BitOr, BitOrAssign};

/// Implied volatility and sensitivities for one options contract, as
/// produced by a registered calculator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Greek {
    pub implied_volatility: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub is_valid: bool,
}

impl Greek {
    pub fn new(
        implied_volatility: f64,
        delta: f64,
        gamma: f64,
        theta: f64,
        vega: f64,
        is_valid: bool,
    ) -> Greek {
        Greek {
            implied_volatility,
            delta,
            gamma,
            theta,
            vega,
            is_valid,
        }
    }

    /// The canonical "no result" value.
    pub fn invalid() -> Greek {
        Greek::default()
    }

    /// Valid and every component finite. Only values passing this gate are
    /// stored in the cache.
    pub fn is_valid_greek(&self) -> bool {
        self.is_valid
            && self.implied_volatility.is_finite()
            && self.delta.is_finite()
            && self.gamma.is_finite()
            && self.theta.is_finite()
            && self.vega.is_finite()
    }
}

/// Bitmask of cache events that trigger Greek recomputation. Disabled
/// flags leave the corresponding cache observer slot free for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GreekUpdateFrequency(u32);

impl GreekUpdateFrequency {
    pub const EVERY_OPTIONS_TRADE: GreekUpdateFrequency = GreekUpdateFrequency(1);
    pub const EVERY_OPTIONS_QUOTE: GreekUpdateFrequency = GreekUpdateFrequency(1 << 1);
    pub const EVERY_RISK_FREE_INTEREST_RATE: GreekUpdateFrequency = GreekUpdateFrequency(1 << 2);
    pub const EVERY_DIVIDEND_YIELD: GreekUpdateFrequency = GreekUpdateFrequency(1 << 3);
    pub const EVERY_EQUITY_TRADE: GreekUpdateFrequency = GreekUpdateFrequency(1 << 4);
    pub const EVERY_EQUITY_QUOTE: GreekUpdateFrequency = GreekUpdateFrequency(1 << 5);

    pub fn contains(&self, flag: GreekUpdateFrequency) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: GreekUpdateFrequency) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: GreekUpdateFrequency) {
        self.0 &= !flag.0;
    }
}

impl BitOr for GreekUpdateFrequency {
    type Output = GreekUpdateFrequency;

    fn bitor(self, rhs: GreekUpdateFrequency) -> GreekUpdateFrequency {
        GreekUpdateFrequency(self.0 | rhs.0)
    }
}

impl BitOrAssign for GreekUpdateFrequency {
    fn bitor_assign(&mut self, rhs: GreekUpdateFrequency) {
        self.0 |= rhs.0;
    }
}
